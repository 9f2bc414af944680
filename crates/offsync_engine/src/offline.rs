//! Wiring of the store, cache, queue, engine and gateway.

use crate::cache::ResponseCache;
use crate::client::ApiClient;
use crate::config::SyncConfig;
use crate::connectivity::{AutoSync, ConnectivityMonitor};
use crate::credentials::CredentialStore;
use crate::diagnostics::{DiagnosticsSink, TracingSink};
use crate::engine::{BackgroundScheduler, DrainReport, SyncEngine};
use crate::error::SyncResult;
use crate::gateway::{Gateway, GatewayResponse};
use crate::queue::MutationQueue;
use crate::transport::Transport;
use crate::types::LogicalRequest;
use offsync_store::{app_schema, LocalStore};
use std::sync::Arc;

/// Everything an application needs, built once at start-up.
///
/// # Example
///
/// ```no_run
/// use offsync_engine::{LogicalRequest, MockTransport, OfflineClient, SyncConfig};
///
/// # async fn run() -> offsync_engine::SyncResult<()> {
/// let config = SyncConfig::default().with_store_path("/tmp/offsync");
/// let client = OfflineClient::open(&config, MockTransport::new())?;
/// let categories = client.request(LogicalRequest::get("/api/categories")).await?;
/// println!("{}", categories.body());
/// # Ok(())
/// # }
/// ```
pub struct OfflineClient<T: Transport> {
    config: SyncConfig,
    store: Arc<LocalStore>,
    connectivity: ConnectivityMonitor,
    cache: Arc<ResponseCache>,
    queue: Arc<MutationQueue>,
    credentials: CredentialStore,
    diagnostics: Arc<TracingSink>,
    engine: Arc<SyncEngine<T>>,
    gateway: Gateway<T>,
}

impl<T: Transport> OfflineClient<T> {
    /// Opens the store (the configured path, else the platform data
    /// directory) and wires every component.
    pub fn open(config: &SyncConfig, transport: T) -> SyncResult<Self> {
        config.validate()?;
        let store = match &config.store_path {
            Some(path) => LocalStore::open(path)?,
            None => LocalStore::open_default()?,
        };
        Self::with_store(config, Arc::new(store), transport)
    }

    /// Wires every component over an existing store.
    pub fn with_store(config: &SyncConfig, store: Arc<LocalStore>, transport: T) -> SyncResult<Self> {
        let plan = store.upgrade(&app_schema())?;
        if !plan.is_noop() {
            tracing::info!(
                from = plan.from_version,
                to = plan.to_version,
                steps = plan.steps.len(),
                "store schema upgraded"
            );
        }

        let diagnostics = Arc::new(TracingSink::default());
        let sink: Arc<dyn DiagnosticsSink> = diagnostics.clone();
        let connectivity = ConnectivityMonitor::new(true);
        let credentials = CredentialStore::new(store.clone());
        let cache = Arc::new(ResponseCache::new(store.clone()));
        let queue = Arc::new(MutationQueue::new(store.clone(), config.max_retries)?);
        let client = Arc::new(ApiClient::new(config, transport, credentials.clone()));
        let engine = Arc::new(SyncEngine::new(
            client.clone(),
            queue.clone(),
            connectivity.clone(),
            sink.clone(),
        ));
        let gateway = Gateway::new(client, cache.clone(), queue.clone(), connectivity.clone(), sink);

        Ok(Self {
            config: config.clone(),
            store,
            connectivity,
            cache,
            queue,
            credentials,
            diagnostics,
            engine,
            gateway,
        })
    }

    /// Issues a request through the gateway.
    pub async fn request(&self, request: LogicalRequest) -> SyncResult<GatewayResponse> {
        self.gateway.request(request).await
    }

    /// Drains the mutation queue now.
    pub async fn sync_now(&self) -> SyncResult<DrainReport> {
        self.engine.drain().await
    }

    /// Starts the reconnect and interval triggers.
    pub fn start_auto_sync(&self) -> AutoSync {
        self.connectivity
            .spawn_auto_sync(self.engine.clone(), self.config.sync_interval)
    }

    /// Registers background sync under the configured tag.
    pub fn register_background(&self, scheduler: &dyn BackgroundScheduler) -> bool {
        self.engine
            .register_background(scheduler, &self.config.background_tag)
    }

    /// Configuration in effect.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The local store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Connectivity state; feed platform online/offline signals here.
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// The response cache.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// The mutation queue.
    pub fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    /// Stored credentials.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Absorbed internal failures.
    pub fn diagnostics(&self) -> &TracingSink {
        &self.diagnostics
    }

    /// The sync engine.
    pub fn engine(&self) -> &Arc<SyncEngine<T>> {
        &self.engine
    }
}

impl<T: Transport> std::fmt::Debug for OfflineClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineClient")
            .field("store", &self.store)
            .field("online", &self.connectivity.is_online())
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
