//! Best-effort JSON document store backing the song catalog.
//!
//! The whole document is read once at startup and rewritten in full on every
//! mutation. A missing or unreadable file means "start empty"; write failures
//! are logged and never surfaced to the caller.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The single persisted document. The song catalog lives under the
/// `"allsongs"` key; unrelated keys written by older versions are dropped on
/// the next save.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataDocument {
    #[serde(default, rename = "allsongs")]
    pub all_songs: Vec<String>,
}

pub struct DataStore {
    path: PathBuf,
}

impl DataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Synchronous startup load. Failure is never fatal.
    pub fn load(&self) -> DataDocument {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(document) => document,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "data file is unreadable, starting empty");
                    DataDocument::default()
                }
            },
            Err(_) => {
                info!(path = %self.path.display(), "could not load data file, starting empty");
                DataDocument::default()
            }
        }
    }

    /// Spawns a full-document write. The returned handle is only awaited by
    /// tests; production callers fire and forget.
    pub fn persist(&self, document: DataDocument) -> JoinHandle<()> {
        let path = self.path.clone();
        tokio::spawn(async move {
            let text = match serde_json::to_string_pretty(&document) {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "could not serialize data document");
                    return;
                }
            };
            if let Err(e) = tokio::fs::write(&path, text).await {
                error!(path = %path.display(), error = %e, "could not save data document");
            }
        })
    }
}
