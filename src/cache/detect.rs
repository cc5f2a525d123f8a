use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use log::{info, warn};
use sha2::{Digest, Sha256};

use super::Marker;
use crate::error::{PipelineError, Result};

/// Outcome of polling a watched workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Unchanged,
    /// The source was modified; nothing is swapped until the operator
    /// confirms.
    PendingUpdate { modified: SystemTime },
}

fn modified(path: &Path) -> std::io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

fn copy_into_place(source: &Path, working: &Path) -> Result<()> {
    let location = working.display().to_string();
    if let Some(parent) = working.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::unavailable(&location, e))?;
    }
    std::fs::copy(source, working).map_err(|e| PipelineError::unavailable(&location, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Modification-marker strategy
// ---------------------------------------------------------------------------

/// Watches an exported workbook by modification time and only swaps the
/// working copy when told to.
#[derive(Debug)]
pub struct ModificationWatcher {
    source: PathBuf,
    working: PathBuf,
    accepted: SystemTime,
    pending: Option<SystemTime>,
}

impl ModificationWatcher {
    /// Start watching `source`.
    ///
    /// A missing working copy is created from the source right away. An
    /// existing working copy older than the source starts out with a
    /// pending update.
    pub fn new(source: impl Into<PathBuf>, working: impl Into<PathBuf>) -> Result<Self> {
        let source = source.into();
        let working = working.into();
        let source_mtime = modified(&source)
            .map_err(|e| PipelineError::unavailable(source.display().to_string(), e))?;

        let (accepted, pending) = match modified(&working) {
            Ok(working_mtime) if working_mtime < source_mtime => {
                info!(
                    "{} is older than {}, update pending",
                    working.display(),
                    source.display()
                );
                (working_mtime, Some(source_mtime))
            }
            Ok(_) => (source_mtime, None),
            Err(_) => {
                copy_into_place(&source, &working)?;
                info!("copied {} to {}", source.display(), working.display());
                (source_mtime, None)
            }
        };

        Ok(Self {
            source,
            working,
            accepted,
            pending,
        })
    }

    /// Compare the source's mtime with the accepted marker.
    ///
    /// A failed metadata read is reported as `Unchanged`.
    pub fn poll(&mut self) -> ChangeStatus {
        match modified(&self.source) {
            Ok(mtime) if mtime != self.accepted => {
                if self.pending != Some(mtime) {
                    info!("{} changed on disk, update pending", self.source.display());
                }
                self.pending = Some(mtime);
                ChangeStatus::PendingUpdate { modified: mtime }
            }
            Ok(_) => {
                self.pending = None;
                ChangeStatus::Unchanged
            }
            Err(e) => {
                warn!(
                    "cannot stat {}: {e}; keeping current data",
                    self.source.display()
                );
                ChangeStatus::Unchanged
            }
        }
    }

    pub fn pending(&self) -> Option<SystemTime> {
        self.pending
    }

    /// Operator accepted the pending update: copy the source over the
    /// working copy and advance the marker. Returns `false` when nothing was
    /// pending.
    pub fn confirm(&mut self) -> Result<bool> {
        if self.pending.is_none() {
            return Ok(false);
        }
        let mtime = modified(&self.source)
            .map_err(|e| PipelineError::unavailable(self.source.display().to_string(), e))?;
        copy_into_place(&self.source, &self.working)?;
        info!(
            "accepted update of {} into {}",
            self.source.display(),
            self.working.display()
        );
        self.accepted = mtime;
        self.pending = None;
        Ok(true)
    }

    /// Marker of the data currently in the working copy.
    pub fn marker(&self) -> Marker {
        Marker::Modified(self.accepted)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn working_copy(&self) -> &Path {
        &self.working
    }
}

// ---------------------------------------------------------------------------
// Content-digest strategy
// ---------------------------------------------------------------------------

/// Hex SHA-256 of a byte buffer.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Digests fetched snapshot bytes and folds in a fixed-interval expiry.
///
/// The expiry is an epoch counter (`elapsed / interval`), so a marker goes
/// stale when either the content or the epoch changes.
#[derive(Debug)]
pub struct DigestWatcher {
    interval: Duration,
    started: Instant,
    last: Option<String>,
}

impl DigestWatcher {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, started: Instant) -> Self {
        Self {
            interval,
            started,
            last: None,
        }
    }

    pub fn epoch_at(&self, now: Instant) -> u64 {
        let interval = self.interval.as_millis().max(1);
        (now.saturating_duration_since(self.started).as_millis() / interval) as u64
    }

    pub fn observe(&mut self, data: &[u8]) -> Marker {
        self.observe_at(data, Instant::now())
    }

    pub fn observe_at(&mut self, data: &[u8], now: Instant) -> Marker {
        let sha256 = sha256_hex(data);
        match &self.last {
            Some(prev) if *prev != sha256 => info!("snapshot content changed"),
            None => info!("first snapshot digest {}", &sha256[..12]),
            _ => {}
        }
        self.last = Some(sha256.clone());
        Marker::Digest {
            sha256,
            epoch: self.epoch_at(now),
        }
    }

    pub fn last_digest(&self) -> Option<&str> {
        self.last.as_deref()
    }
}
