pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;

use application::connectivity::{spawn_sync_on_reconnect, Connectivity, ConnectivityMonitor};
use application::sync_queue::SyncQueue;
use config::AppConfig;
use infrastructure::mutation_log::SqliteMutationLog;
use infrastructure::remote::{HttpRemoteAuthority, RemoteAuthority};
use infrastructure::schedule_store::ScheduleStore;

// Container handed to every command
pub struct AppServices {
    pub schedule: ScheduleStore,
    pub sync: Arc<SyncQueue>,
    pub connectivity: ConnectivityMonitor,
    retry_interval: Option<std::time::Duration>,
}

impl AppServices {
    /// Starts offline; whoever watches the network calls
    /// `connectivity.set_online`.
    pub fn new(pool: SqlitePool, config: &AppConfig, remote: Option<Arc<dyn RemoteAuthority>>) -> Self {
        let connectivity = ConnectivityMonitor::new(Connectivity::Offline);
        let sync = SyncQueue::new(
            Arc::new(SqliteMutationLog::new(pool.clone())),
            remote,
            connectivity.subscribe(),
            config.sync.request_timeout(),
        );
        // local writes and their log entries share one transaction
        let schedule = ScheduleStore::new(pool, config.schedule.default_entry_date)
            .with_outbox(sync.append_hook());

        Self {
            schedule,
            sync: Arc::new(sync),
            connectivity,
            retry_interval: config.sync.retry_interval(),
        }
    }

    /// Opens the configured database and, when an endpoint is set, the HTTP
    /// remote authority.
    pub async fn open(config: &AppConfig) -> error::Result<Self> {
        let pool = infrastructure::db::connect(&config.database).await?;

        let remote = match &config.sync.endpoint {
            Some(endpoint) => {
                let http = HttpRemoteAuthority::new(endpoint, config.sync.request_timeout())?;
                tracing::info!("remote authority at {}", http.endpoint());
                Some(Arc::new(http) as Arc<dyn RemoteAuthority>)
            }
            None => {
                tracing::info!("no remote endpoint configured, mutations stay queued");
                None
            }
        };

        Ok(Self::new(pool, config, remote))
    }

    /// Background task draining the queue whenever connectivity returns.
    pub fn spawn_sync_binding(&self) -> JoinHandle<()> {
        spawn_sync_on_reconnect(self.sync.clone(), self.connectivity.subscribe(), self.retry_interval)
    }
}
