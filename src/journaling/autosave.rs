use std::time::{Duration, Instant};

use anyhow::Result;
use time::OffsetDateTime;

use crate::config::AutoSaveConfig;
use crate::store::{SaveStatus, Store};

#[derive(Debug, Clone)]
pub enum AutoSaveEvent {
    Saved {
        edits: u32,
        timestamp: OffsetDateTime,
    },
    Error {
        message: String,
        retry_at: Instant,
    },
}

/// The single pending write. Dropping it is the cancel operation.
#[derive(Debug, Clone, Copy)]
pub struct PendingWrite {
    pub deadline: Instant,
    pub edits: u32,
}

/// Coalesces bursts of edits into one durable write.
///
/// Every edit flips the store to `saving` and pushes the deadline out to
/// `debounce` after that edit. Once a poll observes the deadline has passed,
/// the store is committed and flipped to `saved`.
#[derive(Debug)]
pub struct AutoSave {
    debounce: Duration,
    pending: Option<PendingWrite>,
}

impl AutoSave {
    pub fn new(config: &AutoSaveConfig) -> Self {
        Self::with_debounce(config.debounce_duration())
    }

    pub fn with_debounce(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn record_edit_at(&mut self, store: &mut Store, now: Instant) {
        let deadline = now + self.debounce;
        self.pending = Some(match self.pending.take() {
            Some(pending) => PendingWrite {
                deadline,
                edits: pending.edits.saturating_add(1),
            },
            None => PendingWrite { deadline, edits: 1 },
        });
        if store.save_status() != SaveStatus::Saving {
            store.set_save_status(SaveStatus::Saving);
        }
    }

    pub fn poll(&mut self, store: &mut Store) -> Option<AutoSaveEvent> {
        self.poll_at(store, Instant::now())
    }

    /// Performs the coalesced write once the quiet period has elapsed.
    pub fn poll_at(&mut self, store: &mut Store, now: Instant) -> Option<AutoSaveEvent> {
        let ready = self
            .pending
            .map(|pending| now >= pending.deadline)
            .unwrap_or(false);
        if !ready {
            return None;
        }
        self.write(store, now)
    }

    /// Writes immediately if anything is pending, ignoring the deadline.
    pub fn flush_now(&mut self, store: &mut Store) -> Option<AutoSaveEvent> {
        if self.pending.is_none() {
            return None;
        }
        self.write(store, Instant::now())
    }

    /// Drops the pending write without performing it.
    pub fn cancel(&mut self) -> Option<PendingWrite> {
        let pending = self.pending.take();
        if let Some(pending) = &pending {
            tracing::debug!(edits = pending.edits, "pending autosave cancelled");
        }
        pending
    }

    fn write(&mut self, store: &mut Store, now: Instant) -> Option<AutoSaveEvent> {
        let pending = self.pending.take()?;
        match store.commit() {
            Ok(()) => {
                store.set_save_status(SaveStatus::Saved);
                let timestamp = OffsetDateTime::now_utc();
                tracing::debug!(edits = pending.edits, "autosave flushed");
                Some(AutoSaveEvent::Saved {
                    edits: pending.edits,
                    timestamp,
                })
            }
            Err(err) => {
                let retry_at = now + self.debounce;
                self.pending = Some(PendingWrite {
                    deadline: retry_at,
                    ..pending
                });
                tracing::warn!(?err, "autosave failed, retrying after debounce window");
                Some(AutoSaveEvent::Error {
                    message: format!("{err:#}"),
                    retry_at,
                })
            }
        }
    }
}

impl Drop for AutoSave {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::warn!(edits = pending.edits, "autosave dropped with an unwritten edit");
        }
    }
}

/// Convenience for callers that treat a failed flush as a hard error.
pub fn flush_or_fail(auto_save: &mut AutoSave, store: &mut Store) -> Result<()> {
    match auto_save.flush_now(store) {
        Some(AutoSaveEvent::Error { message, .. }) => anyhow::bail!("saving changes: {message}"),
        _ => {
            if store.is_dirty() {
                store.commit()?;
                store.set_save_status(SaveStatus::Saved);
            }
            Ok(())
        }
    }
}
