//! # temas-core
//!
//! Core types, traits, and abstractions for the temas lead console.
//!
//! This crate provides the domain model, the document store contract, and
//! the error taxonomy that the other temas crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod status;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use status::{can_transition, validate_transition, LeadStatus};
pub use traits::*;
