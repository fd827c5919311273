//! Discovery bridges importing records from external registries

use async_trait::async_trait;
use discovery_api::Record;
use futures::future::join_all;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::AbortHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::metrics::DiscoveryMetrics;
use crate::{DiscoveryError, Result};

/// Publication surface handed to bridges
#[async_trait]
pub trait ServicePublisher: Send + Sync {
    /// Publish a record, returning it with its registration id
    async fn publish(&self, record: Record) -> Result<Record>;

    /// Un-publish the record registered under `registration`
    async fn unpublish(&self, registration: &str) -> Result<()>;
}

/// Environment a bridge runs in
#[derive(Clone)]
pub struct BridgeContext {
    /// Name of the discovery instance hosting the bridge
    pub discovery_name: String,
    /// Bus carrying announcements and usage events
    pub bus: Arc<dyn EventBus>,
}

/// Adapter mapping an external registry into this one
#[async_trait]
pub trait DiscoveryBridge: Send + Sync {
    /// Name used in logs and reports
    fn name(&self) -> &str {
        "bridge"
    }

    /// Start importing, typically by publishing the external records
    async fn start(
        &self,
        context: &BridgeContext,
        discovery: Arc<dyn ServicePublisher>,
        config: Value,
    ) -> Result<()>;

    /// Stop importing. The bridge un-publishes the records it owns.
    async fn stop(&self, context: &BridgeContext, discovery: Arc<dyn ServicePublisher>) -> Result<()>;
}

/// Lifecycle state of a registered bridge
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Registered,
    Starting,
    Running,
    Stopping,
    Removed,
}

/// How a bridge left the active set on close
#[derive(Debug)]
pub enum BridgeStopOutcome {
    Stopped,
    Failed(DiscoveryError),
    /// The bridge did not stop before the shutdown deadline
    ForceRemoved,
}

/// Result of stopping one bridge
#[derive(Debug)]
pub struct BridgeReport {
    pub id: String,
    pub name: String,
    pub outcome: BridgeStopOutcome,
}

impl fmt::Display for BridgeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            BridgeStopOutcome::Stopped => write!(f, "{} stopped", self.name),
            BridgeStopOutcome::Failed(e) => write!(f, "{} failed: {}", self.name, e),
            BridgeStopOutcome::ForceRemoved => write!(f, "{} force-removed", self.name),
        }
    }
}

struct BridgeEntry {
    id: String,
    name: String,
    bridge: Arc<dyn DiscoveryBridge>,
    state: BridgeState,
    // Set while the start task is in flight
    start_task: Option<AbortHandle>,
}

/// Supervises the bridges of a discovery instance
pub struct BridgeManager {
    context: BridgeContext,
    publisher: Arc<dyn ServicePublisher>,
    bridges: Mutex<Vec<BridgeEntry>>,
    // Signalled whenever a bridge leaves the Starting state
    started: Notify,
    stop_timeout: Duration,
    closed: AtomicBool,
    metrics: DiscoveryMetrics,
}

impl BridgeManager {
    pub fn new(
        context: BridgeContext,
        publisher: Arc<dyn ServicePublisher>,
        stop_timeout: Duration,
        metrics: DiscoveryMetrics,
    ) -> Self {
        Self {
            context,
            publisher,
            bridges: Mutex::new(Vec::new()),
            started: Notify::new(),
            stop_timeout,
            closed: AtomicBool::new(false),
            metrics,
        }
    }

    /// Start a bridge and add it to the active set once running.
    ///
    /// Returns the id of the running bridge. A bridge that finishes starting
    /// while the manager closes is stopped by `close` and reported there.
    pub async fn register(&self, bridge: Arc<dyn DiscoveryBridge>, config: Value) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let name = bridge.name().to_string();

        let task = {
            let mut bridges = self.bridges.lock().await;
            // Checked under the lock so close either sees this entry or refuses it
            if self.closed.load(Ordering::SeqCst) {
                return Err(DiscoveryError::Closed);
            }

            let context = self.context.clone();
            let publisher = self.publisher.clone();
            let task_bridge = bridge.clone();
            let task = tokio::spawn(async move {
                task_bridge.start(&context, publisher, config).await
            });

            bridges.push(BridgeEntry {
                id: id.clone(),
                name: name.clone(),
                bridge,
                state: BridgeState::Registered,
                start_task: Some(task.abort_handle()),
            });
            set_state(&mut bridges, &id, BridgeState::Starting);
            task
        };

        let outcome = match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("start task aborted: {}", e)),
        };

        let mut bridges = self.bridges.lock().await;
        let Some(entry) = bridges.iter_mut().find(|entry| entry.id == id) else {
            // Force-removed by close before the start completed
            return Err(DiscoveryError::Closed);
        };
        entry.start_task = None;

        if let Err(reason) = outcome {
            bridges.retain(|entry| entry.id != id);
            drop(bridges);
            self.started.notify_waiters();
            warn!("Bridge {} failed to start: {}", name, reason);
            return Err(DiscoveryError::BridgeStart { name, reason });
        }

        set_state(&mut bridges, &id, BridgeState::Running);
        self.metrics.bridges_active.inc();
        let closing = self.closed.load(Ordering::SeqCst);
        drop(bridges);
        self.started.notify_waiters();

        if closing {
            warn!("Bridge {} finished starting during close", name);
            return Err(DiscoveryError::Closed);
        }

        info!("Bridge {} running ({})", name, id);
        Ok(id)
    }

    /// Stop every bridge within the shutdown deadline and clear the active
    /// set. Starts still in flight are awaited first. Records published by
    /// bridges are left to the bridges.
    pub async fn close(&self) -> Result<Vec<BridgeReport>> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(DiscoveryError::Closed);
        }

        let deadline = self.deadline();
        let abandoned = self.await_starts(deadline).await;

        let running: Vec<(String, String, Arc<dyn DiscoveryBridge>)> = {
            let mut bridges = self.bridges.lock().await;
            bridges
                .iter_mut()
                .filter(|entry| entry.state == BridgeState::Running)
                .map(|entry| {
                    entry.state = BridgeState::Stopping;
                    debug!("Bridge {} stopping", entry.name);
                    (entry.id.clone(), entry.name.clone(), entry.bridge.clone())
                })
                .collect()
        };

        let mut reports = join_all(
            running
                .into_iter()
                .map(|(id, name, bridge)| self.stop_bridge(id, name, bridge, deadline)),
        )
        .await;

        let mut bridges = self.bridges.lock().await;
        for report in &reports {
            set_state(&mut bridges, &report.id, BridgeState::Removed);
            bridges.retain(|entry| entry.id != report.id);
            self.metrics.bridges_active.dec();
            match report.outcome {
                BridgeStopOutcome::Stopped => debug!("Bridge {} removed", report.name),
                BridgeStopOutcome::Failed(_) => error!("Bridge {}", report),
                BridgeStopOutcome::ForceRemoved => {
                    warn!("Bridge {} did not stop within {:?}", report.name, self.stop_timeout)
                }
            }
        }

        reports.extend(abandoned);
        Ok(reports)
    }

    fn deadline(&self) -> Instant {
        let now = Instant::now();
        // Saturate timeouts too large to represent
        now.checked_add(self.stop_timeout)
            .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
    }

    /// Wait until no bridge is starting or the deadline passes. Starts still
    /// pending at the deadline are aborted and reported force-removed.
    async fn await_starts(&self, deadline: Instant) -> Vec<BridgeReport> {
        loop {
            let notified = self.started.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let bridges = self.bridges.lock().await;
                if !bridges.iter().any(|entry| entry.state == BridgeState::Starting) {
                    return Vec::new();
                }
            }

            if time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }

        let mut reports = Vec::new();
        let mut bridges = self.bridges.lock().await;
        bridges.retain_mut(|entry| {
            if entry.state != BridgeState::Starting {
                return true;
            }
            if let Some(task) = entry.start_task.take() {
                task.abort();
            }
            warn!("Bridge {} did not finish starting within {:?}", entry.name, self.stop_timeout);
            reports.push(BridgeReport {
                id: entry.id.clone(),
                name: entry.name.clone(),
                outcome: BridgeStopOutcome::ForceRemoved,
            });
            false
        });
        reports
    }

    async fn stop_bridge(
        &self,
        id: String,
        name: String,
        bridge: Arc<dyn DiscoveryBridge>,
        deadline: Instant,
    ) -> BridgeReport {
        let context = self.context.clone();
        let publisher = self.publisher.clone();
        let mut task = tokio::spawn(async move { bridge.stop(&context, publisher).await });

        let outcome = match time::timeout_at(deadline, &mut task).await {
            Ok(Ok(Ok(()))) => BridgeStopOutcome::Stopped,
            Ok(Ok(Err(e))) => BridgeStopOutcome::Failed(DiscoveryError::BridgeStop {
                name: name.clone(),
                reason: e.to_string(),
            }),
            Ok(Err(e)) => BridgeStopOutcome::Failed(DiscoveryError::BridgeStop {
                name: name.clone(),
                reason: format!("stop task aborted: {}", e),
            }),
            Err(_) => {
                task.abort();
                BridgeStopOutcome::ForceRemoved
            }
        };

        BridgeReport { id, name, outcome }
    }

    /// Number of running bridges
    pub async fn bridge_count(&self) -> usize {
        let bridges = self.bridges.lock().await;
        bridges
            .iter()
            .filter(|entry| entry.state == BridgeState::Running)
            .count()
    }

    /// State of every bridge in the active set
    pub async fn states(&self) -> Vec<(String, BridgeState)> {
        let bridges = self.bridges.lock().await;
        bridges
            .iter()
            .map(|entry| (entry.name.clone(), entry.state))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn set_state(bridges: &mut [BridgeEntry], id: &str, state: BridgeState) {
    if let Some(entry) = bridges.iter_mut().find(|entry| entry.id == id) {
        debug!("Bridge {} {:?} -> {:?}", entry.name, entry.state, state);
        entry.state = state;
    }
}
