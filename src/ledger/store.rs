//! JSON persistence for the ledger.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::{info, warn};

use super::entry::LedgerEntry;
use crate::error::LedgerError;

/// Persisted document: market ID → entry.
pub type LedgerDocument = BTreeMap<String, LedgerEntry>;

/// Load the ledger file. A missing or unreadable file yields an empty ledger.
pub fn load(path: &Path) -> LedgerDocument {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no ledger file, starting empty");
            return LedgerDocument::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read ledger, starting empty");
            return LedgerDocument::new();
        }
    };

    match serde_json::from_str::<LedgerDocument>(&raw) {
        Ok(mut entries) => {
            for (id, entry) in entries.iter_mut() {
                if entry.condition_id.is_empty() {
                    entry.condition_id = id.clone();
                }
            }
            info!(path = %path.display(), markets = entries.len(), "ledger loaded");
            entries
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt ledger file, starting empty");
            LedgerDocument::new()
        }
    }
}

/// Write the full document, replacing the file atomically.
pub fn save(path: &Path, entries: &LedgerDocument) -> Result<(), LedgerError> {
    let json = serde_json::to_string_pretty(entries)?;
    let persist_err = |source: std::io::Error| LedgerError::Persist {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(persist_err)?;
    }

    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp).map_err(persist_err)?;
        file.write_all(json.as_bytes()).map_err(persist_err)?;
        file.sync_all().map_err(persist_err)?;
    }
    fs::rename(&tmp, path).map_err(persist_err)?;

    Ok(())
}
