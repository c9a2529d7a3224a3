//! Test fixtures for store and panel tests.
//!
//! Provides a fluent builder for lead documents with known timestamps and a
//! seeding helper that fills a store with one lead per pipeline stage.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use temas_store::memory::MemoryStore;
//! use temas_store::test_fixtures::{lead_doc, seed_pipeline};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let store = MemoryStore::new();
//!     let ids = seed_pipeline(&store).await;
//!
//!     // Run your tests...
//! }
//! ```

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use temas_core::defaults::LEADS_COLLECTION;
use temas_core::{
    ChannelMessage, DocumentStore, Lead, LeadStatus, MessageSender, Precondition, SessionNote,
    WriteMode,
};

use crate::memory::MemoryStore;

/// Millisecond epoch the seeded pipeline starts at.
pub const SEED_BASE_MS: i64 = 1_756_000_000_000;

/// Convert a millisecond epoch into the timestamp type leads carry.
pub fn millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).expect("timestamp in range")
}

/// Start building a lead document with explicit identity and timing.
pub fn lead_doc(
    id: &str,
    handle: &str,
    status: LeadStatus,
    first_contact_ms: i64,
) -> LeadDocBuilder {
    LeadDocBuilder {
        lead: Lead {
            id: id.to_string(),
            handle: handle.to_string(),
            status,
            first_contact_at: millis(first_contact_ms),
            profile_summary: None,
            tags: Vec::new(),
            session_notes: Vec::new(),
            last_seen_at: None,
            message_history: Vec::new(),
            processed_message_ids: Vec::new(),
        },
    }
}

/// Fluent builder over a [`Lead`] for tests.
pub struct LeadDocBuilder {
    lead: Lead,
}

impl LeadDocBuilder {
    pub fn with_profile(mut self, summary: &str) -> Self {
        self.lead.profile_summary = Some(summary.to_string());
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.lead.tags.push(tag.to_string());
        self
    }

    /// Append a session note timestamped at the lead's first contact.
    pub fn with_note(mut self, note: &str) -> Self {
        self.lead.session_notes.push(SessionNote {
            note: note.to_string(),
            at: self.lead.first_contact_at,
        });
        self
    }

    /// Record a channel message and mark its id processed.
    pub fn with_message(mut self, message_id: &str, sender: MessageSender, body: &str) -> Self {
        let at = self.lead.first_contact_at;
        self.lead.message_history.push(ChannelMessage {
            sender,
            body: body.to_string(),
            at,
        });
        self.lead.processed_message_ids.push(message_id.to_string());
        self.lead.last_seen_at = Some(at);
        self
    }

    pub fn build(self) -> Lead {
        self.lead
    }

    pub fn into_value(self) -> JsonValue {
        serde_json::to_value(self.lead).expect("lead serializes")
    }
}

/// Write one lead per pipeline stage into the store, first contact times
/// one minute apart, oldest first. Returns the ids in insertion order.
pub async fn seed_pipeline(store: &MemoryStore) -> Vec<String> {
    let stages = [
        ("seed-new", "ays_krmzgl", LeadStatus::New),
        ("seed-appt", "mehmet.duru", LeadStatus::AppointmentSet),
        ("seed-follow", "selin_atlas", LeadStatus::FollowUp),
        ("seed-done", "kaan.derin", LeadStatus::SessionDone),
    ];

    let mut ids = Vec::with_capacity(stages.len());
    for (index, (id, handle, status)) in stages.into_iter().enumerate() {
        let first_contact = SEED_BASE_MS + index as i64 * 60_000;
        let mut builder = lead_doc(id, handle, status, first_contact);
        if status == LeadStatus::SessionDone {
            builder = builder.with_note("session complete, sleep plan shared");
        }
        store
            .put(
                LEADS_COLLECTION,
                id,
                builder.into_value(),
                WriteMode::Replace,
                Precondition::None,
            )
            .await
            .expect("seed write");
        ids.push(id.to_string());
    }
    ids
}
