//! # temas-sync
//!
//! View synchronization and channel intake for temas.
//!
//! This crate provides:
//! - Supervised panel tasks that mirror live store subscriptions
//! - Automatic resubscribe with jittered exponential backoff
//! - Panel events via broadcast channels, view state via watch channels
//! - Channel message intake with idempotent redelivery handling
//! - The automation gate the worker polls between actions
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use temas_store::{MemoryStore, Store};
//! use temas_sync::{LeadsSource, Panel, PanelConfig};
//!
//! let store = Store::new(Arc::new(MemoryStore::new()));
//!
//! // Start the leads panel
//! let panel = Panel::new(LeadsSource::new(store.leads.clone()), PanelConfig::default());
//! let handle = panel.start();
//!
//! // Listen for sync events
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod gate;
pub mod intake;
pub mod panel;
pub mod supervisor;

// Re-export core types
pub use temas_core::*;

// Re-export panel types
pub use panel::{
    AutomationSource, LeadsSource, Panel, PanelConfig, PanelEvent, PanelHandle, PanelName,
    PanelSource, Pushed, SessionsSource, ViewState,
};

// Re-export intake and gate types
pub use gate::AutomationGate;
pub use intake::{IncomingMessage, IntakeReport, IntakeService};
pub use supervisor::Backoff;

/// Default first resubscribe delay (milliseconds).
pub const DEFAULT_RESYNC_BASE_MS: u64 = temas_core::defaults::RESYNC_BACKOFF_BASE_MS;

/// Default resubscribe delay ceiling (milliseconds).
pub const DEFAULT_RESYNC_CAP_MS: u64 = temas_core::defaults::RESYNC_BACKOFF_CAP_MS;
