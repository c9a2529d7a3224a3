//! Lead repository: typed access to the `leads` collection.
//!
//! Every mutation that depends on a prior read carries a `FieldEquals`
//! precondition on the value it read, so concurrent operators cannot
//! silently overwrite each other. Status changes go through the transition
//! table in `temas_core::status`; the repository never writes a status the
//! table rejects.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info};

use temas_core::defaults::{FIRST_CONTACT_FIELD, LEADS_COLLECTION, STATUS_FIELD};
use temas_core::{
    validate_transition, DocumentStore, Error, Lead, LeadStatus, NewLead, Precondition, Query,
    QuerySnapshot, Result, SessionNote, SortOrder, SortSpec, WriteMode,
};

/// A decoded, ordered view of the leads a feed is tracking.
#[derive(Debug, Clone)]
pub struct LeadSnapshot {
    pub leads: Vec<Lead>,
    pub revision: u64,
}

/// Live feed of lead snapshots for one query.
///
/// `initial` holds the result set as of subscription time; `recv` yields a
/// complete replacement set per matching change. A lagged receiver skips
/// straight to the newest snapshot, which is complete on its own.
pub struct LeadFeed {
    pub initial: LeadSnapshot,
    updates: broadcast::Receiver<QuerySnapshot>,
}

impl LeadFeed {
    pub async fn recv(&mut self) -> Result<LeadSnapshot> {
        loop {
            match self.updates.recv().await {
                Ok(snapshot) => return decode_snapshot(snapshot),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "lead feed lagged, resuming at newest snapshot");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(Error::Transport("lead subscription closed".to_string()))
                }
            }
        }
    }
}

fn decode_snapshot(snapshot: QuerySnapshot) -> Result<LeadSnapshot> {
    Ok(LeadSnapshot {
        leads: snapshot.decode_all::<Lead>()?,
        revision: snapshot.revision,
    })
}

/// Repository over the `leads` collection.
#[derive(Clone)]
pub struct LeadRepository {
    store: Arc<dyn DocumentStore>,
}

impl LeadRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Subscribe to every lead, ordered by first contact time.
    pub async fn subscribe_all(&self, order: SortOrder) -> Result<LeadFeed> {
        let sort = match order {
            SortOrder::Asc => SortSpec::asc(FIRST_CONTACT_FIELD),
            SortOrder::Desc => SortSpec::desc(FIRST_CONTACT_FIELD),
        };
        let query = Query::all(LEADS_COLLECTION).with_sort(sort);
        self.subscribe(query).await
    }

    /// Subscribe to leads in one status, newest first contact first.
    pub async fn subscribe_by_status(&self, status: LeadStatus) -> Result<LeadFeed> {
        let query = Query::all(LEADS_COLLECTION)
            .with_filter(temas_core::FieldFilter::new(
                STATUS_FIELD,
                serde_json::to_value(status)?,
            ))
            .with_sort(SortSpec::desc(FIRST_CONTACT_FIELD));
        self.subscribe(query).await
    }

    async fn subscribe(&self, query: Query) -> Result<LeadFeed> {
        let subscription = self.store.subscribe(query).await?;
        debug!(doc_count = subscription.initial.docs.len(), "lead feed opened");
        Ok(LeadFeed {
            initial: decode_snapshot(subscription.initial)?,
            updates: subscription.updates,
        })
    }

    /// Register a lead with a fresh id, `new` status, and the current time
    /// as first contact.
    pub async fn create(&self, new_lead: NewLead) -> Result<Lead> {
        let handle = new_lead.handle.trim().to_string();
        if handle.is_empty() {
            return Err(Error::Validation(
                "lead handle must not be empty".to_string(),
            ));
        }

        let lead = Lead {
            id: String::new(),
            handle,
            status: LeadStatus::initial(),
            first_contact_at: Utc::now(),
            profile_summary: new_lead.profile_summary,
            tags: new_lead.tags,
            session_notes: Vec::new(),
            last_seen_at: None,
            message_history: Vec::new(),
            processed_message_ids: Vec::new(),
        };
        let doc = self
            .store
            .create(LEADS_COLLECTION, serde_json::to_value(&lead)?)
            .await?;
        let created = doc.decode::<Lead>()?;
        info!(lead_id = %created.id, handle = %created.handle, "lead created");
        Ok(created)
    }

    pub async fn fetch(&self, id: &str) -> Result<Lead> {
        match self.store.get(LEADS_COLLECTION, id).await? {
            Some(doc) => doc.decode::<Lead>(),
            None => Err(Error::LeadNotFound(id.to_string())),
        }
    }

    /// Move a lead to `to`, provided the transition table allows it and the
    /// status has not changed since it was read.
    pub async fn advance_status(&self, id: &str, to: LeadStatus) -> Result<Lead> {
        let lead = self.fetch(id).await?;
        validate_transition(lead.status, to)?;

        let doc = match self
            .store
            .put(
                LEADS_COLLECTION,
                id,
                json!({ STATUS_FIELD: to }),
                WriteMode::Merge,
                Precondition::FieldEquals(
                    STATUS_FIELD.to_string(),
                    serde_json::to_value(lead.status)?,
                ),
            )
            .await
        {
            Ok(doc) => doc,
            Err(Error::NotFound(_)) => return Err(Error::LeadNotFound(id.to_string())),
            Err(other) => return Err(other),
        };

        info!(lead_id = %id, from = %lead.status, to = %to, "lead status advanced");
        doc.decode::<Lead>()
    }

    /// Record the closing session note and mark the lead done, in a single
    /// write guarded by the status as read. Notes are append-only; the full
    /// appended list and the terminal status land together or not at all.
    pub async fn append_note_and_complete(&self, id: &str, note: &str) -> Result<Lead> {
        let note = note.trim();
        if note.is_empty() {
            return Err(Error::Validation(
                "session note must not be empty".to_string(),
            ));
        }

        let lead = self.fetch(id).await?;
        validate_transition(lead.status, LeadStatus::SessionDone)?;

        let mut notes = lead.session_notes.clone();
        notes.push(SessionNote {
            note: note.to_string(),
            at: Utc::now(),
        });

        let doc = match self
            .store
            .put(
                LEADS_COLLECTION,
                id,
                json!({
                    STATUS_FIELD: LeadStatus::SessionDone,
                    "session_notes": serde_json::to_value(&notes)?,
                }),
                WriteMode::Merge,
                Precondition::FieldEquals(
                    STATUS_FIELD.to_string(),
                    serde_json::to_value(lead.status)?,
                ),
            )
            .await
        {
            Ok(doc) => doc,
            Err(Error::NotFound(_)) => return Err(Error::LeadNotFound(id.to_string())),
            Err(other) => return Err(other),
        };

        info!(lead_id = %id, note_count = notes.len(), "session completed");
        doc.decode::<Lead>()
    }
}
