//! Builder for assembling an [`Engine`] instance.
//!
//! Initializes production defaults (in-process change feed, in-memory
//! query cache, the record store named by the configuration) and lets
//! callers override any component before `build()`:
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let engine = EngineBuilder::init(settings, shutdown_rx)
//!     .cache(custom_cache)  // Optional override
//!     .build()
//!     .start_metrics_server(shutdown_tx.subscribe())
//!     .start_webhook_server()
//!     .ready()?;
//! ```

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;
use tracing::info;

use crate::init_sled_billing_db;
use crate::metrics;
use crate::webhook;
use crate::BillingStore;
use crate::BillingStoreKind;
use crate::ChangeFeed;
use crate::CustomerDirectory;
use crate::Engine;
use crate::LocalChangeFeed;
use crate::MemoryBillingStore;
use crate::MemoryQueryCache;
use crate::PlanCatalog;
use crate::QueryCache;
use crate::Reconciler;
use crate::Result;
use crate::Settings;
use crate::SledBillingStore;
use crate::StaticDirectory;
use crate::SubscriptionRouter;
use crate::SystemError;
use crate::WebhookVerifier;

/// Fluent assembly of the sync core's components.
pub struct EngineBuilder {
    pub(super) settings: Settings,
    pub(super) feed: Option<Arc<dyn ChangeFeed>>,
    pub(super) cache: Option<Arc<dyn QueryCache>>,
    pub(super) store: Option<Arc<dyn BillingStore>>,
    pub(super) directory: Option<Arc<dyn CustomerDirectory>>,
    pub(super) shutdown_signal: watch::Receiver<()>,

    pub(super) engine: Option<Arc<Engine>>,
}

impl EngineBuilder {
    /// Creates a builder with configuration loaded from the default
    /// config paths, optionally overridden by a deployment file.
    pub fn new(
        config_path: Option<&str>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Self> {
        if let Some(p) = config_path {
            info!("loading deployment config from: {}", p);
        }
        let settings = Settings::load(config_path)?;
        Ok(Self::init(settings, shutdown_signal))
    }

    /// Core initialization shared by all construction paths
    pub fn init(
        settings: Settings,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            settings,
            feed: None,
            cache: None,
            store: None,
            directory: None,
            shutdown_signal,
            engine: None,
        }
    }

    /// Sets a custom change-feed implementation
    pub fn feed(
        mut self,
        feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Sets a custom query-cache implementation
    pub fn cache(
        mut self,
        cache: Arc<dyn QueryCache>,
    ) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets a custom billing record store
    pub fn store(
        mut self,
        store: Arc<dyn BillingStore>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets a custom customer-to-workspace directory
    pub fn directory(
        mut self,
        directory: Arc<dyn CustomerDirectory>,
    ) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Finalizes the builder and constructs the engine.
    ///
    /// Initializes default implementations for any unconfigured
    /// components and starts the router's channel machinery.
    ///
    /// # Panics
    /// Panics if the configured sled database cannot be opened
    pub fn build(mut self) -> Self {
        let settings = self.settings.clone();

        let feed = self
            .feed
            .take()
            .unwrap_or_else(|| Arc::new(LocalChangeFeed::from_config(&settings.feed)));

        let cache = self
            .cache
            .take()
            .unwrap_or_else(|| Arc::new(MemoryQueryCache::from_config(&settings.cache)));

        let store = self.store.take().unwrap_or_else(|| match settings.billing.store {
            BillingStoreKind::Memory => Arc::new(MemoryBillingStore::new()) as Arc<dyn BillingStore>,
            BillingStoreKind::Sled => {
                let db = init_sled_billing_db(&settings.billing.store_path)
                    .expect("init_sled_billing_db successfully.");
                Arc::new(
                    SledBillingStore::new(Arc::new(db)).expect("Init billing record store successfully."),
                )
            }
        });

        let directory = self
            .directory
            .take()
            .unwrap_or_else(|| Arc::new(StaticDirectory::from_config(&settings.billing)));

        let router = SubscriptionRouter::new(
            feed,
            cache,
            settings.retry.feed_connect,
            self.shutdown_signal.clone(),
        );

        let reconciler = Arc::new(Reconciler::new(
            WebhookVerifier::from_config(&settings.billing),
            PlanCatalog::from_config(&settings.billing),
            store,
            directory,
        ));

        self.engine = Some(Arc::new(Engine {
            router,
            reconciler,
            ready: AtomicBool::new(false),
            settings: Arc::new(settings),
            shutdown_signal: self.shutdown_signal.clone(),
        }));
        self
    }

    /// Starts the Prometheus exporter when monitoring is enabled.
    pub fn start_metrics_server(
        self,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        if !self.settings.monitoring.prometheus_enabled {
            debug!("prometheus exporter disabled, skipping");
            return self;
        }
        let port = self.settings.monitoring.prometheus_port;
        tokio::spawn(async move {
            metrics::start_server(port, shutdown_signal).await;
        });
        self
    }

    /// Starts the webhook intake server on the configured listen port.
    ///
    /// # Panics
    /// Panics if the engine hasn't been built
    pub fn start_webhook_server(self) -> Self {
        if let Some(ref engine) = self.engine {
            let reconciler = engine.reconciler.clone();
            let port = self.settings.server.listen_port;
            let shutdown_signal = self.shutdown_signal.clone();
            tokio::spawn(async move {
                webhook::start_webhook_server(port, reconciler, shutdown_signal).await;
            });
            self
        } else {
            panic!("failed to start webhook server: engine not built");
        }
    }

    /// Returns the built engine.
    ///
    /// # Errors
    /// Returns `SystemError::StartupFailed` if `build()` hasn't run
    pub fn ready(self) -> Result<Arc<Engine>> {
        self.engine
            .ok_or_else(|| SystemError::StartupFailed("check engine ready failed".to_string()).into())
    }
}
