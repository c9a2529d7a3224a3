//! Channel message intake.
//!
//! Batches of inbound messages from the social channel land here, in
//! arrival order but with possible redeliveries. A message for an unknown
//! handle creates the lead; a message for a known lead appends to its
//! transcript. Both paths are idempotent on the channel message id, so a
//! redelivered batch settles to the same store state.
//!
//! Intake writes only the contact fields it owns. The pipeline fields that
//! operators drive (`status`, `session_notes`) and the immutable
//! `first_contact_at` are never touched when appending to an existing lead.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use temas_core::defaults::{
    HANDLE_FIELD, INTAKE_MAX_RETRIES, LEADS_COLLECTION, PROCESSED_IDS_FIELD,
};
use temas_core::{
    ChannelMessage, DocumentStore, Error, FieldFilter, Lead, LeadStatus, MessageSender,
    Precondition, Query, Result, WriteMode,
};

/// One message delivered from the external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Channel-assigned id, unique per message; the idempotency key
    pub message_id: String,
    /// Sender's channel username
    pub handle: String,
    pub body: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(
        message_id: impl Into<String>,
        handle: impl Into<String>,
        body: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            handle: handle.into(),
            body: body.into(),
            at,
        }
    }
}

/// Tally of what one intake batch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeReport {
    /// Leads created from a first contact
    pub created: usize,
    /// Messages appended to existing leads
    pub appended: usize,
    /// Redeliveries skipped without a write
    pub duplicates: usize,
}

enum Outcome {
    Created,
    Appended,
    Duplicate,
}

/// Ingests channel message batches into the lead collection.
#[derive(Clone)]
pub struct IntakeService {
    store: Arc<dyn DocumentStore>,
    max_retries: u32,
}

impl IntakeService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            max_retries: INTAKE_MAX_RETRIES,
        }
    }

    /// Set how many times a contended append is retried before giving up.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Ingest one batch of channel messages.
    ///
    /// The whole batch is validated before any write, so a malformed
    /// message rejects the batch without partial effects. Messages are then
    /// applied in order.
    pub async fn ingest(&self, messages: &[IncomingMessage]) -> Result<IntakeReport> {
        for message in messages {
            validate(message)?;
        }

        let mut report = IntakeReport::default();
        for message in messages {
            match self.ingest_one(message).await? {
                Outcome::Created => report.created += 1,
                Outcome::Appended => report.appended += 1,
                Outcome::Duplicate => report.duplicates += 1,
            }
        }

        info!(
            created = report.created,
            appended = report.appended,
            duplicates = report.duplicates,
            "Intake batch processed"
        );
        Ok(report)
    }

    async fn ingest_one(&self, message: &IncomingMessage) -> Result<Outcome> {
        let handle = message.handle.trim();

        for attempt in 1..=self.max_retries {
            let query = Query::all(LEADS_COLLECTION)
                .with_filter(FieldFilter::new(HANDLE_FIELD, json!(handle)));
            let docs = self.store.query(query).await?;

            let doc = match docs.into_iter().next() {
                Some(doc) => doc,
                None => {
                    let lead = first_contact_lead(handle, message);
                    let created = self
                        .store
                        .create(LEADS_COLLECTION, serde_json::to_value(&lead)?)
                        .await?;
                    info!(
                        lead_id = %created.id,
                        handle = %handle,
                        "Lead created from first contact"
                    );
                    return Ok(Outcome::Created);
                }
            };

            let lead = doc.decode::<Lead>()?;
            if lead.has_processed(&message.message_id) {
                debug!(
                    lead_id = %lead.id,
                    message_id = %message.message_id,
                    "Message already ingested, skipping"
                );
                return Ok(Outcome::Duplicate);
            }

            // Guard on the processed-ids field exactly as read, Null when the
            // field has never been written. A concurrent append changes the
            // field and forces a re-read here.
            let guard = doc
                .field(PROCESSED_IDS_FIELD)
                .cloned()
                .unwrap_or(JsonValue::Null);

            let mut history = lead.message_history.clone();
            history.push(channel_message(message));
            let mut processed = lead.processed_message_ids.clone();
            processed.push(message.message_id.clone());

            let result = self
                .store
                .put(
                    LEADS_COLLECTION,
                    &lead.id,
                    json!({
                        PROCESSED_IDS_FIELD: serde_json::to_value(&processed)?,
                        "message_history": serde_json::to_value(&history)?,
                        "last_seen_at": message.at.timestamp_millis(),
                    }),
                    WriteMode::Merge,
                    Precondition::FieldEquals(PROCESSED_IDS_FIELD.to_string(), guard),
                )
                .await;

            match result {
                Ok(_) => {
                    debug!(
                        lead_id = %lead.id,
                        message_id = %message.message_id,
                        "Message appended to lead"
                    );
                    return Ok(Outcome::Appended);
                }
                Err(Error::Conflict(_)) | Err(Error::NotFound(_)) => {
                    warn!(lead_id = %lead.id, attempt, "Intake write contended, retrying");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }

        Err(Error::Conflict(format!(
            "intake contended for {} attempts",
            self.max_retries
        )))
    }
}

fn validate(message: &IncomingMessage) -> Result<()> {
    if message.message_id.trim().is_empty() {
        return Err(Error::Validation(
            "message id must not be empty".to_string(),
        ));
    }
    if message.handle.trim().is_empty() {
        return Err(Error::Validation(
            "message handle must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn channel_message(message: &IncomingMessage) -> ChannelMessage {
    ChannelMessage {
        sender: MessageSender::Lead,
        body: message.body.clone(),
        at: message.at,
    }
}

fn first_contact_lead(handle: &str, message: &IncomingMessage) -> Lead {
    Lead {
        id: String::new(),
        handle: handle.to_string(),
        status: LeadStatus::initial(),
        first_contact_at: message.at,
        profile_summary: None,
        tags: Vec::new(),
        session_notes: Vec::new(),
        last_seen_at: Some(message.at),
        message_history: vec![channel_message(message)],
        processed_message_ids: vec![message.message_id.clone()],
    }
}
