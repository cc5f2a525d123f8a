//! Change detection and the keyed result cache.
//!
//! ```text
//!   local workbook                 remote snapshot
//!        │ mtime                         │ bytes
//!        ▼                               ▼
//!   ┌────────────────────┐     ┌────────────────┐
//!   │ ModificationWatcher│     │ DigestWatcher   │  sha256 + expiry epoch
//!   └────────────────────┘     └────────────────┘
//!        │ Marker                        │ Marker
//!        └──────────────┬────────────────┘
//!                       ▼
//!               ┌──────────────┐
//!               │ MarkerCache   │  (key, marker) → payload
//!               └──────────────┘
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod detect;
pub mod store;

pub use detect::{ChangeStatus, DigestWatcher, ModificationWatcher};
pub use store::{CacheEntry, MarkerCache};

/// Opaque comparable value deciding whether a cache entry is stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Modification time of the accepted workbook.
    Modified(SystemTime),
    /// Content digest plus the expiry period it was observed in.
    Digest { sha256: String, epoch: u64 },
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Modified(t) => match t.duration_since(UNIX_EPOCH) {
                Ok(d) => write!(f, "mtime {}.{:03}", d.as_secs(), d.subsec_millis()),
                Err(_) => write!(f, "mtime <before epoch>"),
            },
            Marker::Digest { sha256, epoch } => {
                let short = sha256.get(..12).unwrap_or(sha256);
                write!(f, "sha256 {short}… epoch {epoch}")
            }
        }
    }
}
