//! Lead workflow states and the transition table.
//!
//! Every status write is validated against an explicit table before it
//! reaches the store. The observed workflow is outreach-and-recovery:
//! a new lead either gets an appointment or is marked for follow-up,
//! a followed-up lead can still be won back to an appointment, and a
//! completed session is terminal.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Workflow state of a [`Lead`](crate::models::Lead).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// First contact recorded, no operator action yet
    New,
    /// Appointment booked, awaiting the session
    AppointmentSet,
    /// Went quiet, queued for recovery outreach
    FollowUp,
    /// Session held and note taken (terminal)
    SessionDone,
}

impl LeadStatus {
    /// State assigned to a freshly created lead.
    pub fn initial() -> Self {
        LeadStatus::New
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LeadStatus::SessionDone)
    }

    /// Targets reachable from this state.
    pub fn allowed_targets(&self) -> &'static [LeadStatus] {
        match self {
            LeadStatus::New => &[LeadStatus::AppointmentSet, LeadStatus::FollowUp],
            LeadStatus::AppointmentSet => &[LeadStatus::SessionDone],
            LeadStatus::FollowUp => &[LeadStatus::AppointmentSet],
            LeadStatus::SessionDone => &[],
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::AppointmentSet => write!(f, "appointment_set"),
            Self::FollowUp => write!(f, "follow_up"),
            Self::SessionDone => write!(f, "session_done"),
        }
    }
}

/// Whether `from -> to` is a defined workflow edge.
///
/// Self-transitions are not edges; re-asserting the current status is a no-op
/// the caller should skip, not a write.
pub fn can_transition(from: LeadStatus, to: LeadStatus) -> bool {
    from.allowed_targets().contains(&to)
}

/// Validate `from -> to`, rejecting undefined edges.
pub fn validate_transition(from: LeadStatus, to: LeadStatus) -> Result<()> {
    if can_transition(from, to) {
        return Ok(());
    }
    Err(Error::InvalidTransition { from, to })
}
