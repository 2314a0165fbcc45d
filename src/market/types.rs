//! Market-related types for binary Up/Down prediction markets.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// One of the two complementary outcome tokens of a market.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Leg {
    /// Price goes up (YES token).
    #[strum(
        to_string = "UP",
        serialize = "up",
        serialize = "Up",
        serialize = "yes",
        serialize = "YES",
        serialize = "Yes"
    )]
    #[default]
    Up,
    /// Price goes down (NO token).
    #[strum(
        to_string = "DOWN",
        serialize = "down",
        serialize = "Down",
        serialize = "no",
        serialize = "NO",
        serialize = "No"
    )]
    Down,
}

impl Leg {
    /// Get the complementary leg.
    pub fn opposite(&self) -> Self {
        match self {
            Leg::Up => Leg::Down,
            Leg::Down => Leg::Up,
        }
    }
}

/// A tradeable Up/Down market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    /// Condition ID (0x-prefixed hex), the market identifier.
    pub condition_id: String,
    /// Market slug (e.g., "bitcoin-up-or-down-february-22-9pm-et").
    pub slug: String,
    /// UP token ID for CLOB.
    pub up_token_id: String,
    /// DOWN token ID for CLOB.
    pub down_token_id: String,
    /// When the market resolves.
    pub close_time: OffsetDateTime,
    /// Market question text.
    pub question: Option<String>,
}

impl Market {
    /// Get the token ID for a given leg.
    pub fn token_id(&self, leg: Leg) -> &str {
        match leg {
            Leg::Up => &self.up_token_id,
            Leg::Down => &self.down_token_id,
        }
    }

    /// Find which leg a token belongs to.
    pub fn leg_of(&self, token_id: &str) -> Option<Leg> {
        if token_id == self.up_token_id {
            Some(Leg::Up)
        } else if token_id == self.down_token_id {
            Some(Leg::Down)
        } else {
            None
        }
    }

    /// Minutes until close at `now` (negative once closed).
    pub fn minutes_to_close_at(&self, now: OffsetDateTime) -> f64 {
        (self.close_time - now).as_seconds_f64() / 60.0
    }

    /// Minutes until close.
    pub fn minutes_to_close(&self) -> f64 {
        self.minutes_to_close_at(OffsetDateTime::now_utc())
    }

    /// Check if the market is closed.
    pub fn is_closed(&self) -> bool {
        OffsetDateTime::now_utc() >= self.close_time
    }

    /// Format remaining time as "Xm Ys" string.
    pub fn time_remaining_str(&self) -> String {
        let secs = (self.close_time - OffsetDateTime::now_utc()).whole_seconds();
        if secs <= 0 {
            return "CLOSED".to_string();
        }
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
