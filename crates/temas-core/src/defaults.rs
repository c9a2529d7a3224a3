//! Centralized default constants for the temas system.
//!
//! **This module is the single source of truth** for shared default values
//! and well-known store names. All crates reference these constants instead
//! of defining their own magic numbers.

// =============================================================================
// STORE NAMES
// =============================================================================

/// Collection holding one document per lead.
pub const LEADS_COLLECTION: &str = "leads";

/// Collection holding system-wide singleton documents.
pub const SETTINGS_COLLECTION: &str = "system_settings";

/// Well-known id of the singleton control flag document.
pub const CONTROL_FLAG_DOC_ID: &str = "main_controls";

/// Field carrying the automation flag value.
pub const ACTIVE_FIELD: &str = "active";

/// Field carrying a lead's workflow status.
pub const STATUS_FIELD: &str = "status";

/// Field carrying a lead's creation timestamp, the primary sort key.
pub const FIRST_CONTACT_FIELD: &str = "first_contact_at";

/// Field carrying a lead's external-channel handle.
pub const HANDLE_FIELD: &str = "handle";

/// Field carrying the ingested-message id set.
pub const PROCESSED_IDS_FIELD: &str = "processed_message_ids";

// =============================================================================
// CHANNELS
// =============================================================================

/// Broadcast capacity for per-query snapshot channels.
///
/// Snapshots are complete result sets, so a lagged receiver skips straight
/// to the newest push without losing state; the buffer only needs to absorb
/// short bursts.
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Broadcast capacity for panel event channels.
pub const PANEL_EVENT_CAPACITY: usize = 64;

// =============================================================================
// RETRIES
// =============================================================================

/// Bounded retry budget for the control flag's compare-and-swap toggle.
pub const FLAG_TOGGLE_MAX_RETRIES: u32 = 5;

/// Bounded retry budget for intake's compare-and-swap message append.
pub const INTAKE_MAX_RETRIES: u32 = 5;

// =============================================================================
// RESUBSCRIBE BACKOFF
// =============================================================================

/// First delay before re-establishing a dropped subscription.
pub const RESYNC_BACKOFF_BASE_MS: u64 = 250;

/// Upper bound on the exponential resubscribe delay.
pub const RESYNC_BACKOFF_CAP_MS: u64 = 30_000;

/// Fraction of the computed delay added or removed as random jitter.
pub const RESYNC_BACKOFF_JITTER: f64 = 0.2;
