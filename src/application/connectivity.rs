use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::application::sync_queue::SyncQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn from_online(online: bool) -> Self {
        if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }
}

/// Online/offline signal fed by whatever observes the network.
pub struct ConnectivityMonitor {
    tx: watch::Sender<Connectivity>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current() == Connectivity::Online
    }

    /// Records the new state. Returns `true` when it differs from the last one.
    pub fn set_online(&self, online: bool) -> bool {
        let next = Connectivity::from_online(online);
        let changed = self.tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            tracing::info!("connectivity changed: {next:?}");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}

/// Drains `queue` on every offline -> online transition, and every
/// `retry_interval` while online when one is given.
///
/// The task ends when the monitor is dropped.
pub fn spawn_sync_on_reconnect(
    queue: Arc<SyncQueue>,
    mut rx: watch::Receiver<Connectivity>,
    retry_interval: Option<Duration>,
) -> JoinHandle<()> {
    // state at call time; everything after arrives through `changed`
    let mut last = *rx.borrow_and_update();
    tokio::spawn(async move {
        let mut ticker = retry_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now = *rx.borrow_and_update();
                    if last == Connectivity::Offline && now == Connectivity::Online {
                        spawn_drain(queue.clone(), "reconnect");
                    }
                    last = now;
                }
                _ = tick(&mut ticker) => {
                    if last == Connectivity::Online {
                        spawn_drain(queue.clone(), "retry interval");
                    }
                }
            }
        }
        tracing::debug!("connectivity binding stopped");
    })
}

// Runs detached so the binding keeps observing transitions during a drain.
fn spawn_drain(queue: Arc<SyncQueue>, trigger: &'static str) {
    tokio::spawn(async move {
        tracing::debug!("drain triggered by {trigger}");
        if let Err(e) = queue.drain().await {
            tracing::error!("drain triggered by {trigger} failed: {e}");
        }
    });
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
