//! Structured logging schema and field name constants for temas.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Retry budget exhausted, panel supervision giving up |
//! | WARN  | Recoverable issue (CAS retry, resubscribe attempt) |
//! | INFO  | Lifecycle events (panel start/stop), state changes applied |
//! | DEBUG | Decision points, snapshot deliveries, config choices |
//! | TRACE | Per-document iteration inside snapshot assembly |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "store", "leads", "control", "panel", "intake", "gate"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "memory_store", "supervisor", "flag_service"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "advance_status", "toggle", "ingest", "resubscribe"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Collection a store operation touches.
pub const COLLECTION: &str = "collection";

/// Document id being operated on.
pub const DOC_ID: &str = "doc_id";

/// Lead id being operated on.
pub const LEAD_ID: &str = "lead_id";

/// External-channel handle of a lead.
pub const HANDLE: &str = "handle";

/// Workflow status value involved in an operation.
pub const STATUS: &str = "status";

/// Panel name ("leads", "sessions", "automation").
pub const PANEL: &str = "panel";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Store revision carried by a snapshot.
pub const REVISION: &str = "revision";

/// Number of documents in a pushed snapshot.
pub const DOC_COUNT: &str = "doc_count";

/// Retry or reconnect attempt number, starting at 1.
pub const ATTEMPT: &str = "attempt";

/// Backoff delay before the next attempt, in milliseconds.
pub const BACKOFF_MS: &str = "backoff_ms";

/// Live query subscriptions currently registered in the store.
pub const LIVE_QUERIES: &str = "live_queries";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
