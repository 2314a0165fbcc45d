//! Integration tests for the Up/Down bot.
//!
//! `scenarios` runs the full tick path against in-memory collaborators.
//! `live` talks to the real Polymarket APIs and is ignored by default:
//! run with `cargo test --test integration -- --ignored`.

mod live;
mod scenarios;
