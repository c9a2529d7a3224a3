//! Worker-facing automation gate.
//!
//! The external polling worker consults this gate on its hot path before
//! every automated action. The gate mirrors the latest pushed Control Flag
//! value into an `AtomicBool`, so the check is a lock-free load with no
//! await. The engine only guarantees that the flag's current value is
//! visible here; worker timing is the worker's own business.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::panel::ViewState;

/// Shared on/off switch for the automation worker.
///
/// Clones share the same underlying state.
#[derive(Clone)]
pub struct AutomationGate {
    active: Arc<AtomicBool>,
}

impl AutomationGate {
    /// New gate in the active state, matching the flag's default.
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether automation may run. Lock-free, safe to call per message.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Mirror a pushed flag value into the gate.
    pub fn apply(&self, active: bool) {
        let was_active = self.active.swap(active, Ordering::SeqCst);
        if was_active != active {
            if active {
                info!("Automation enabled");
            } else {
                info!("Automation disabled");
            }
        }
    }

    /// Spawn a task that keeps this gate in step with the automation
    /// panel's view state.
    ///
    /// The task ends when the panel stops; the gate then holds the last
    /// value it saw.
    pub fn follow(&self, mut state: watch::Receiver<ViewState<bool>>) -> JoinHandle<()> {
        let gate = self.clone();
        tokio::spawn(async move {
            if let ViewState::Ready { value, .. } = &*state.borrow() {
                gate.apply(*value);
            }
            while state.changed().await.is_ok() {
                let pushed = match &*state.borrow() {
                    ViewState::Ready { value, .. } => Some(*value),
                    ViewState::Loading => None,
                };
                if let Some(active) = pushed {
                    gate.apply(active);
                }
            }
        })
    }
}

impl Default for AutomationGate {
    fn default() -> Self {
        Self::new()
    }
}
