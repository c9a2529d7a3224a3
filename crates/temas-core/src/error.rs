//! Error types for the temas engine.

use thiserror::Error;

use crate::status::LeadStatus;

/// Result type alias using the temas Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for temas operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected before any store call (empty note, blank handle)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lead not found
    #[error("Lead not found: {0}")]
    LeadNotFound(String),

    /// Status edge rejected by the workflow table
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: LeadStatus, to: LeadStatus },

    /// Write precondition failed (concurrent writer got there first)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store unreachable or subscription channel dropped
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
