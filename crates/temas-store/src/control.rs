//! Control flag service: the singleton automation switch.
//!
//! The flag lives in one well-known document and defaults to active. It is
//! created lazily on first use, and a creation race between two callers
//! resolves to a single document because the write carries `MustNotExist`.
//! Toggling is a compare-and-set on the value the caller read, retried a
//! bounded number of times, so two concurrent toggles compose into a net
//! double flip instead of one of them vanishing.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use temas_core::defaults::{
    ACTIVE_FIELD, CONTROL_FLAG_DOC_ID, FLAG_TOGGLE_MAX_RETRIES, SETTINGS_COLLECTION,
};
use temas_core::{
    ControlFlag, DocSnapshot, Document, DocumentStore, Error, Precondition, Result, WriteMode,
};

/// A decoded point-in-time view of the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagSnapshot {
    pub active: bool,
    pub revision: u64,
}

/// Live feed of flag states.
///
/// Yields the stored value on every write to the flag document, including
/// the caller's own toggles; consumers render what arrives and nothing else.
pub struct FlagFeed {
    pub initial: FlagSnapshot,
    updates: broadcast::Receiver<DocSnapshot>,
}

impl FlagFeed {
    pub async fn recv(&mut self) -> Result<FlagSnapshot> {
        loop {
            match self.updates.recv().await {
                Ok(snapshot) => return decode_snapshot(snapshot),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "flag feed lagged, resuming at newest snapshot");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(Error::Transport(
                        "control flag subscription closed".to_string(),
                    ))
                }
            }
        }
    }
}

fn decode_snapshot(snapshot: DocSnapshot) -> Result<FlagSnapshot> {
    Ok(FlagSnapshot {
        active: decode_flag(snapshot.doc.as_ref())?.active,
        revision: snapshot.revision,
    })
}

/// A missing document reads as the default flag.
fn decode_flag(doc: Option<&Document>) -> Result<ControlFlag> {
    match doc {
        Some(doc) => doc.decode::<ControlFlag>(),
        None => Ok(ControlFlag::default()),
    }
}

/// Service over the singleton flag document.
#[derive(Clone)]
pub struct ControlFlagService {
    store: Arc<dyn DocumentStore>,
    max_retries: u32,
}

impl ControlFlagService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            max_retries: FLAG_TOGGLE_MAX_RETRIES,
        }
    }

    /// Override the toggle retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Read the current flag value without creating the document.
    pub async fn current(&self) -> Result<bool> {
        let doc = self
            .store
            .get(SETTINGS_COLLECTION, CONTROL_FLAG_DOC_ID)
            .await?;
        Ok(decode_flag(doc.as_ref())?.active)
    }

    /// Subscribe to the flag, creating it with its default value if absent.
    pub async fn subscribe(&self) -> Result<FlagFeed> {
        self.ensure_initialized().await?;
        let subscription = self
            .store
            .subscribe_doc(SETTINGS_COLLECTION, CONTROL_FLAG_DOC_ID)
            .await?;
        Ok(FlagFeed {
            initial: decode_snapshot(subscription.initial)?,
            updates: subscription.updates,
        })
    }

    /// Flip the flag and return the value that was written.
    ///
    /// Each attempt writes the inverse of the value it just read, guarded by
    /// that value. A conflict means another writer got there first; the next
    /// attempt re-reads and flips from the fresh value.
    pub async fn toggle(&self) -> Result<bool> {
        self.ensure_initialized().await?;

        for attempt in 1..=self.max_retries {
            let current = self.current().await?;
            let next = !current;

            match self
                .store
                .put(
                    SETTINGS_COLLECTION,
                    CONTROL_FLAG_DOC_ID,
                    json!({ ACTIVE_FIELD: next }),
                    WriteMode::Merge,
                    Precondition::FieldEquals(ACTIVE_FIELD.to_string(), json!(current)),
                )
                .await
            {
                Ok(_) => {
                    info!(active = next, "control flag toggled");
                    return Ok(next);
                }
                Err(Error::Conflict(_)) => {
                    warn!(attempt, "control flag toggle conflicted, retrying");
                    continue;
                }
                // The document vanished between read and write; recreate
                // the default and retry the flip against it.
                Err(Error::NotFound(_)) => {
                    self.ensure_initialized().await?;
                    continue;
                }
                Err(other) => return Err(other),
            }
        }

        Err(Error::Conflict(format!(
            "control flag toggle contended for {} attempts",
            self.max_retries
        )))
    }

    async fn ensure_initialized(&self) -> Result<()> {
        let existing = self
            .store
            .get(SETTINGS_COLLECTION, CONTROL_FLAG_DOC_ID)
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        let result = self
            .store
            .put(
                SETTINGS_COLLECTION,
                CONTROL_FLAG_DOC_ID,
                serde_json::to_value(ControlFlag::default())?,
                WriteMode::Replace,
                Precondition::MustNotExist,
            )
            .await;
        match result {
            Ok(_) => {
                debug!(active = true, "control flag initialized");
                Ok(())
            }
            // Another caller created it between our read and write
            Err(Error::Conflict(_)) => Ok(()),
            Err(other) => Err(other),
        }
    }
}
