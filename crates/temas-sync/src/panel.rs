//! Supervised view panels over live subscriptions.
//!
//! A panel owns exactly one store subscription and a typed view state that
//! is replaced wholesale on every pushed snapshot. Nothing mutates the view
//! locally: an operator action goes to the repository, and the resulting
//! state comes back through the store's fan-out like every other client's
//! writes. When the feed drops, the panel re-subscribes with exponential
//! backoff and resumes from a full fresh snapshot.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use temas_core::defaults::{
    PANEL_EVENT_CAPACITY, RESYNC_BACKOFF_BASE_MS, RESYNC_BACKOFF_CAP_MS, RESYNC_BACKOFF_JITTER,
};
use temas_core::{Error, Lead, LeadStatus, Result, SortOrder};
use temas_store::{ControlFlagService, FlagFeed, LeadFeed, LeadRepository};

use crate::supervisor::Backoff;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Configuration for panel supervision.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// First resubscribe delay in milliseconds.
    pub resync_base_ms: u64,
    /// Upper bound on the resubscribe delay in milliseconds.
    pub resync_cap_ms: u64,
    /// Symmetric jitter fraction applied to each delay.
    pub resync_jitter: f64,
    /// Capacity of the panel event channel.
    pub event_capacity: usize,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            resync_base_ms: RESYNC_BACKOFF_BASE_MS,
            resync_cap_ms: RESYNC_BACKOFF_CAP_MS,
            resync_jitter: RESYNC_BACKOFF_JITTER,
            event_capacity: PANEL_EVENT_CAPACITY,
        }
    }
}

impl PanelConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TEMAS_RESYNC_BASE_MS` | `250` | First resubscribe delay |
    /// | `TEMAS_RESYNC_CAP_MS` | `30000` | Resubscribe delay ceiling |
    /// | `TEMAS_RESYNC_JITTER` | `0.2` | Jitter fraction (0..=1) |
    /// | `TEMAS_PANEL_EVENT_CAPACITY` | `64` | Panel event channel capacity |
    pub fn from_env() -> Self {
        let resync_base_ms = std::env::var("TEMAS_RESYNC_BASE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(RESYNC_BACKOFF_BASE_MS);

        let resync_cap_ms = std::env::var("TEMAS_RESYNC_CAP_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(RESYNC_BACKOFF_CAP_MS);

        let resync_jitter = std::env::var("TEMAS_RESYNC_JITTER")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(RESYNC_BACKOFF_JITTER)
            .clamp(0.0, 1.0);

        let event_capacity = std::env::var("TEMAS_PANEL_EVENT_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(PANEL_EVENT_CAPACITY)
            .max(1);

        Self {
            resync_base_ms,
            resync_cap_ms,
            resync_jitter,
            event_capacity,
        }
    }

    /// Set the first resubscribe delay.
    pub fn with_resync_base_ms(mut self, ms: u64) -> Self {
        self.resync_base_ms = ms;
        self
    }

    /// Set the resubscribe delay ceiling.
    pub fn with_resync_cap_ms(mut self, ms: u64) -> Self {
        self.resync_cap_ms = ms;
        self
    }

    /// Set the jitter fraction.
    pub fn with_resync_jitter(mut self, jitter: f64) -> Self {
        self.resync_jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.resync_base_ms),
            Duration::from_millis(self.resync_cap_ms),
            self.resync_jitter,
        )
    }
}

// =============================================================================
// VIEW STATE
// =============================================================================

/// Typed state a panel renders from.
///
/// `Loading` until the first snapshot lands; afterwards always the latest
/// pushed snapshot in full.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loading,
    Ready {
        value: T,
        refreshed_at: DateTime<Utc>,
        revision: u64,
    },
}

impl<T> ViewState<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, ViewState::Ready { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            ViewState::Ready { value, .. } => Some(value),
            ViewState::Loading => None,
        }
    }

    pub fn revision(&self) -> Option<u64> {
        match self {
            ViewState::Ready { revision, .. } => Some(*revision),
            ViewState::Loading => None,
        }
    }
}

/// Panel identity for events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelName {
    Leads,
    Sessions,
    Automation,
}

impl fmt::Display for PanelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelName::Leads => write!(f, "leads"),
            PanelName::Sessions => write!(f, "sessions"),
            PanelName::Automation => write!(f, "automation"),
        }
    }
}

/// Event emitted by a panel task.
#[derive(Debug, Clone)]
pub enum PanelEvent {
    /// A fresh snapshot replaced the view state.
    Synced { panel: PanelName, revision: u64 },
    /// The live feed dropped; a resync will follow.
    Desynced { panel: PanelName, error: String },
    /// A resubscribe attempt is scheduled.
    Resyncing {
        panel: PanelName,
        attempt: u32,
        backoff_ms: u64,
    },
    /// The panel stopped.
    Stopped { panel: PanelName },
}

// =============================================================================
// PANEL SOURCES
// =============================================================================

/// A value as delivered by one push.
#[derive(Debug, Clone)]
pub struct Pushed<T> {
    pub value: T,
    pub revision: u64,
}

/// One subscription shape a panel can supervise.
#[async_trait]
pub trait PanelSource: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;
    type Feed: Send + 'static;

    fn panel(&self) -> PanelName;

    /// Open a fresh subscription; returns the state as of now plus the feed.
    async fn connect(&self) -> Result<(Pushed<Self::Value>, Self::Feed)>;

    /// Wait for the next pushed state on the feed.
    async fn next(&self, feed: &mut Self::Feed) -> Result<Pushed<Self::Value>>;
}

/// Source for the leads panel: every lead, newest first contact first.
#[derive(Clone)]
pub struct LeadsSource {
    repo: LeadRepository,
}

impl LeadsSource {
    pub fn new(repo: LeadRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl PanelSource for LeadsSource {
    type Value = Vec<Lead>;
    type Feed = LeadFeed;

    fn panel(&self) -> PanelName {
        PanelName::Leads
    }

    async fn connect(&self) -> Result<(Pushed<Vec<Lead>>, LeadFeed)> {
        let feed = self.repo.subscribe_all(SortOrder::Desc).await?;
        let initial = Pushed {
            value: feed.initial.leads.clone(),
            revision: feed.initial.revision,
        };
        Ok((initial, feed))
    }

    async fn next(&self, feed: &mut LeadFeed) -> Result<Pushed<Vec<Lead>>> {
        let snapshot = feed.recv().await?;
        Ok(Pushed {
            value: snapshot.leads,
            revision: snapshot.revision,
        })
    }
}

/// Source for the sessions panel: leads with an appointment on the books.
#[derive(Clone)]
pub struct SessionsSource {
    repo: LeadRepository,
}

impl SessionsSource {
    pub fn new(repo: LeadRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl PanelSource for SessionsSource {
    type Value = Vec<Lead>;
    type Feed = LeadFeed;

    fn panel(&self) -> PanelName {
        PanelName::Sessions
    }

    async fn connect(&self) -> Result<(Pushed<Vec<Lead>>, LeadFeed)> {
        let feed = self
            .repo
            .subscribe_by_status(LeadStatus::AppointmentSet)
            .await?;
        let initial = Pushed {
            value: feed.initial.leads.clone(),
            revision: feed.initial.revision,
        };
        Ok((initial, feed))
    }

    async fn next(&self, feed: &mut LeadFeed) -> Result<Pushed<Vec<Lead>>> {
        let snapshot = feed.recv().await?;
        Ok(Pushed {
            value: snapshot.leads,
            revision: snapshot.revision,
        })
    }
}

/// Source for the automation panel: the Control Flag.
#[derive(Clone)]
pub struct AutomationSource {
    service: ControlFlagService,
}

impl AutomationSource {
    pub fn new(service: ControlFlagService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl PanelSource for AutomationSource {
    type Value = bool;
    type Feed = FlagFeed;

    fn panel(&self) -> PanelName {
        PanelName::Automation
    }

    async fn connect(&self) -> Result<(Pushed<bool>, FlagFeed)> {
        let feed = self.service.subscribe().await?;
        let initial = Pushed {
            value: feed.initial.active,
            revision: feed.initial.revision,
        };
        Ok((initial, feed))
    }

    async fn next(&self, feed: &mut FlagFeed) -> Result<Pushed<bool>> {
        let snapshot = feed.recv().await?;
        Ok(Pushed {
            value: snapshot.active,
            revision: snapshot.revision,
        })
    }
}

// =============================================================================
// PANEL TASK
// =============================================================================

/// A supervised panel over one source.
pub struct Panel<S: PanelSource> {
    source: S,
    config: PanelConfig,
    event_tx: broadcast::Sender<PanelEvent>,
    state_tx: watch::Sender<ViewState<S::Value>>,
}

impl<S: PanelSource> Panel<S> {
    pub fn new(source: S, config: PanelConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let (state_tx, _) = watch::channel(ViewState::Loading);
        Self {
            source,
            config,
            event_tx,
            state_tx,
        }
    }

    /// Start the panel task and return a handle for control.
    pub fn start(self) -> PanelHandle<S::Value> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();
        let state_rx = self.state_tx.subscribe();

        tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });

        PanelHandle {
            shutdown_tx,
            event_rx,
            state_rx,
        }
    }

    async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        let panel = self.source.panel();
        info!(panel = %panel, "Panel started");
        let mut backoff = self.config.backoff();

        'outer: loop {
            // Connect phase: keep trying until a subscription opens
            let (initial, mut feed) = loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break 'outer,
                    connected = self.source.connect() => match connected {
                        Ok(pair) => break pair,
                        Err(error) => {
                            let delay = backoff.next_delay();
                            let backoff_ms = delay.as_millis() as u64;
                            warn!(
                                panel = %panel,
                                attempt = backoff.attempt(),
                                backoff_ms,
                                error = %error,
                                "Panel subscribe failed, will retry"
                            );
                            let _ = self.event_tx.send(PanelEvent::Resyncing {
                                panel,
                                attempt: backoff.attempt(),
                                backoff_ms,
                            });
                            tokio::select! {
                                _ = shutdown_rx.recv() => break 'outer,
                                _ = sleep(delay) => {}
                            }
                        }
                    }
                }
            };
            backoff.reset();
            self.apply(panel, initial);

            // Stream phase: replace state per push until the feed drops
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break 'outer,
                    pushed = self.source.next(&mut feed) => match pushed {
                        Ok(pushed) => self.apply(panel, pushed),
                        Err(error) => {
                            warn!(panel = %panel, error = %error, "Panel feed dropped, resyncing");
                            let _ = self.event_tx.send(PanelEvent::Desynced {
                                panel,
                                error: error.to_string(),
                            });
                            break;
                        }
                    }
                }
            }
        }

        let _ = self.event_tx.send(PanelEvent::Stopped { panel });
        info!(panel = %panel, "Panel stopped");
    }

    fn apply(&self, panel: PanelName, pushed: Pushed<S::Value>) {
        let revision = pushed.revision;
        self.state_tx.send_replace(ViewState::Ready {
            value: pushed.value,
            refreshed_at: Utc::now(),
            revision,
        });
        debug!(panel = %panel, revision, "Panel state replaced");
        let _ = self.event_tx.send(PanelEvent::Synced { panel, revision });
    }
}

/// Handle for observing and stopping a running panel.
///
/// Dropping the handle also stops the panel: the shutdown channel closes
/// and the task tears its subscription down.
pub struct PanelHandle<T> {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<PanelEvent>,
    state_rx: watch::Receiver<ViewState<T>>,
}

impl<T: Clone> PanelHandle<T> {
    /// Signal the panel to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send panel shutdown signal".into()))
    }

    /// Get a receiver for panel events.
    pub fn events(&self) -> broadcast::Receiver<PanelEvent> {
        self.event_rx.resubscribe()
    }

    /// Watch the panel's view state.
    pub fn state(&self) -> watch::Receiver<ViewState<T>> {
        self.state_rx.clone()
    }

    /// The view state as of now.
    pub fn current(&self) -> ViewState<T> {
        self.state_rx.borrow().clone()
    }
}
