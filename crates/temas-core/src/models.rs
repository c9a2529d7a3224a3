//! Core data models for the temas engine.
//!
//! These types are shared across all temas crates and represent the
//! documents held by the store. Timestamps serialize as epoch milliseconds
//! so sort keys compare numerically on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::LeadStatus;

// =============================================================================
// LEAD TYPES
// =============================================================================

/// A tracked prospective client acquired through the social channel.
///
/// The store assigns `id` on creation and the id is carried inside the
/// document fields, so a decoded lead is self-describing. Supplemental
/// fields written by the intake path default when absent so documents
/// created before intake existed still decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    /// External-channel username, immutable after creation
    pub handle: String,
    pub status: LeadStatus,
    /// Primary sort key, newest first; immutable once set
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub first_contact_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Append-only; entries are never rewritten or reordered
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_notes: Vec<SessionNote>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Append-only channel transcript maintained by intake
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_history: Vec<ChannelMessage>,
    /// Channel message ids already ingested, for idempotent intake
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processed_message_ids: Vec<String>,
}

impl Lead {
    /// Whether intake has already recorded this channel message id.
    pub fn has_processed(&self, message_id: &str) -> bool {
        self.processed_message_ids
            .iter()
            .any(|id| id == message_id)
    }
}

/// One operator note taken during or after a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionNote {
    pub note: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
}

/// One inbound or outbound message on the external channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub sender: MessageSender,
    pub body: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
}

/// Who authored a channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    Lead,
    Operator,
}

impl std::fmt::Display for MessageSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lead => write!(f, "lead"),
            Self::Operator => write!(f, "operator"),
        }
    }
}

/// Request payload for creating a lead by hand from the console.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLead {
    pub handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl NewLead {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            ..Default::default()
        }
    }
}

// =============================================================================
// CONTROL FLAG
// =============================================================================

/// Singleton boolean gating the external automation worker.
///
/// Lives at a well-known document path and is lazily created with the
/// default on first read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlag {
    pub active: bool,
}

impl Default for ControlFlag {
    fn default() -> Self {
        // Automation runs unless an operator switches it off.
        Self { active: true }
    }
}
