use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::application::connectivity::Connectivity;
use crate::domain::models::Dataset;
use crate::domain::mutation::{Mutation, PendingMutation, Sequence};
use crate::error::{RemoteError, SyncError};
use crate::infrastructure::mutation_log::{AppendHook, MutationLog};
use crate::infrastructure::remote::RemoteAuthority;

const EVENT_CAPACITY: usize = 64;

/// Progress notifications for monitoring collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    Enqueued { sequence: Sequence },
    Delivered { sequence: Sequence, id: String },
    /// Delivery failed for a reason that may clear up; the item is pending again.
    Deferred { sequence: Sequence, reason: String },
    /// The remote refused the payload. The mutation stays in the log until
    /// someone deals with it.
    Rejected { sequence: Sequence, error: RemoteError },
    DrainFinished { delivered: usize, remaining: usize },
}

/// Why a drain stopped before the log was empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainHalt {
    Failed { sequence: Sequence, error: RemoteError },
    WentOffline { sequence: Option<Sequence> },
}

/// Why a drain did not run at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainSkip {
    Offline,
    /// Another drain was running; it has been asked to take one more pass.
    AlreadyRunning,
    /// No remote authority is configured.
    NoRemote,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrainReport {
    /// Acknowledged sequences, in delivery order.
    pub delivered: Vec<Sequence>,
    pub halted: Option<DrainHalt>,
    pub skipped: Option<DrainSkip>,
    /// In-flight rows found at drain start and returned to pending.
    pub recovered: u64,
    /// Latest authoritative dataset returned with an acknowledgment.
    #[serde(skip)]
    pub dataset: Option<Dataset>,
}

impl DrainReport {
    fn skipped(reason: DrainSkip) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_none() && self.halted.is_none()
    }
}

/// Durable, ordered queue of local mutations replayed to the remote authority.
///
/// Only one drain runs at a time. Items are delivered strictly head first and
/// a failure stops the drain, so nothing is ever delivered ahead of an
/// earlier mutation.
pub struct SyncQueue {
    log: Arc<dyn MutationLog>,
    remote: Option<Arc<dyn RemoteAuthority>>,
    connectivity: watch::Receiver<Connectivity>,
    submit_timeout: Duration,
    drain_lock: tokio::sync::Mutex<()>,
    rerun: AtomicBool,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncQueue {
    pub fn new(
        log: Arc<dyn MutationLog>,
        remote: Option<Arc<dyn RemoteAuthority>>,
        connectivity: watch::Receiver<Connectivity>,
        submit_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            log,
            remote,
            connectivity,
            submit_timeout,
            drain_lock: tokio::sync::Mutex::new(()),
            rerun: AtomicBool::new(false),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow() == Connectivity::Online
    }

    pub fn remote(&self) -> Option<&Arc<dyn RemoteAuthority>> {
        self.remote.as_ref()
    }

    /// Persists the mutation before returning.
    pub async fn enqueue(&self, mutation: Mutation) -> Result<PendingMutation, SyncError> {
        let item = self.log.append(&mutation).await?;
        announce(&self.events, &item);
        Ok(item)
    }

    /// Hook for writers that append to the log inside their own transaction
    /// (see `mutation_log::append_on`), so their items are announced like
    /// enqueued ones.
    pub fn append_hook(&self) -> AppendHook {
        let events = self.events.clone();
        Arc::new(move |item: &PendingMutation| announce(&events, item))
    }

    /// Retained mutations, oldest first.
    pub async fn pending(&self) -> Result<Vec<PendingMutation>, SyncError> {
        self.log.list().await
    }

    pub async fn len(&self) -> Result<usize, SyncError> {
        self.log.len().await
    }

    pub async fn is_empty(&self) -> Result<bool, SyncError> {
        Ok(self.len().await? == 0)
    }

    /// User-triggered retry.
    pub async fn manual_drain(&self) -> Result<DrainReport, SyncError> {
        tracing::info!("manual sync requested");
        self.drain().await
    }

    /// Delivers the log to the remote authority, head first.
    ///
    /// A call made while another drain runs returns at once with
    /// [`DrainSkip::AlreadyRunning`]; the running drain then takes one more
    /// pass before it finishes.
    pub async fn drain(&self) -> Result<DrainReport, SyncError> {
        self.rerun.store(true, Ordering::SeqCst);
        let mut report = DrainReport::default();
        let mut passes = 0usize;

        loop {
            let Ok(guard) = self.drain_lock.try_lock() else {
                if passes == 0 {
                    tracing::debug!("drain already running, flagged for another pass");
                    return Ok(DrainReport::skipped(DrainSkip::AlreadyRunning));
                }
                break;
            };
            if !self.rerun.swap(false, Ordering::SeqCst) {
                break;
            }

            self.drain_pass(&mut report).await?;
            passes += 1;
            drop(guard);

            if report.skipped.is_some() || report.halted.is_some() || !self.rerun.load(Ordering::SeqCst) {
                break;
            }
        }

        let remaining = self.log.len().await?;
        tracing::info!(
            "drain finished: {} delivered, {} remaining",
            report.delivered.len(),
            remaining
        );
        self.emit(SyncEvent::DrainFinished {
            delivered: report.delivered.len(),
            remaining,
        });
        Ok(report)
    }

    async fn drain_pass(&self, report: &mut DrainReport) -> Result<(), SyncError> {
        let Some(remote) = self.remote.as_ref() else {
            report.skipped = Some(DrainSkip::NoRemote);
            return Ok(());
        };
        if !self.is_online() {
            tracing::debug!("offline, drain skipped");
            report.skipped = Some(DrainSkip::Offline);
            return Ok(());
        }

        let recovered = self.log.reset_in_flight().await?;
        if recovered > 0 {
            tracing::warn!("{recovered} in-flight mutations returned to pending");
            report.recovered += recovered;
        }

        while let Some(item) = self.log.head().await? {
            if !self.is_online() {
                report.halted = Some(DrainHalt::WentOffline { sequence: None });
                return Ok(());
            }

            self.log.mark_in_flight(item.sequence).await?;
            let envelope = item.envelope();

            let mut offline = self.connectivity.clone();
            let outcome = tokio::select! {
                result = tokio::time::timeout(self.submit_timeout, remote.submit(&envelope)) => {
                    Some(result.unwrap_or_else(|_| {
                        Err(RemoteError::Timeout(self.submit_timeout.as_millis() as u64))
                    }))
                }
                _ = wait_offline(&mut offline) => None,
            };

            match outcome {
                Some(Ok(ack)) => {
                    self.log.acknowledge(item.sequence).await?;
                    tracing::debug!("mutation #{} acknowledged", item.sequence);
                    report.delivered.push(item.sequence);
                    if ack.dataset.is_some() {
                        report.dataset = ack.dataset;
                    }
                    self.emit(SyncEvent::Delivered {
                        sequence: item.sequence,
                        id: item.id.clone(),
                    });
                }
                Some(Err(error)) => {
                    self.log
                        .release_to_pending(item.sequence, Some(&error.to_string()))
                        .await?;
                    if error.is_permanent() {
                        tracing::error!(
                            "mutation #{} rejected by remote, kept for review: {error}",
                            item.sequence
                        );
                        self.emit(SyncEvent::Rejected {
                            sequence: item.sequence,
                            error: error.clone(),
                        });
                    } else {
                        tracing::warn!("mutation #{} deferred: {error}", item.sequence);
                        self.emit(SyncEvent::Deferred {
                            sequence: item.sequence,
                            reason: error.to_string(),
                        });
                    }
                    report.halted = Some(DrainHalt::Failed {
                        sequence: item.sequence,
                        error,
                    });
                    return Ok(());
                }
                None => {
                    self.log
                        .release_to_pending(item.sequence, Some("connectivity lost"))
                        .await?;
                    tracing::warn!("connectivity lost while submitting #{}", item.sequence);
                    self.emit(SyncEvent::Deferred {
                        sequence: item.sequence,
                        reason: "connectivity lost".to_string(),
                    });
                    report.halted = Some(DrainHalt::WentOffline {
                        sequence: Some(item.sequence),
                    });
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn emit(&self, event: SyncEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

fn announce(events: &broadcast::Sender<SyncEvent>, item: &PendingMutation) {
    tracing::debug!(
        "enqueued #{} {} {} for {}",
        item.sequence,
        item.entity_type().as_str(),
        item.action().as_str(),
        item.mutation.person_code()
    );
    let _ = events.send(SyncEvent::Enqueued { sequence: item.sequence });
}

async fn wait_offline(rx: &mut watch::Receiver<Connectivity>) {
    if rx.wait_for(|c| *c == Connectivity::Offline).await.is_err() {
        // monitor gone: the state can no longer change
        std::future::pending::<()>().await;
    }
}
