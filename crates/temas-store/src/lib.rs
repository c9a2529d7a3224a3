//! # temas-store
//!
//! Document store layer for temas.
//!
//! This crate provides:
//! - The in-memory reference [`DocumentStore`] with live query subscriptions
//! - The lead repository with transition-checked, write-guarded mutations
//! - The control flag service for the singleton automation switch
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use temas_store::{MemoryStore, NewLead, Store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::new(Arc::new(MemoryStore::new()));
//!
//!     let lead = store.leads.create(NewLead::new("ayse_k")).await?;
//!     println!("Created lead: {}", lead.id);
//!     Ok(())
//! }
//! ```
pub mod control;
pub mod leads;
pub mod memory;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use the builders
pub mod test_fixtures;

// Re-export core types
pub use temas_core::*;

pub use control::{ControlFlagService, FlagFeed, FlagSnapshot};
pub use leads::{LeadFeed, LeadRepository, LeadSnapshot};
pub use memory::MemoryStore;

use std::sync::Arc;

/// Combined store context with all repositories.
#[derive(Clone)]
pub struct Store {
    /// The underlying document store.
    pub documents: Arc<dyn DocumentStore>,
    /// Lead repository for pipeline operations.
    pub leads: LeadRepository,
    /// Control flag service for the automation switch.
    pub control: ControlFlagService,
}

impl Store {
    /// Create a new Store instance over a document store.
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            leads: LeadRepository::new(documents.clone()),
            control: ControlFlagService::new(documents.clone()),
            documents,
        }
    }
}
