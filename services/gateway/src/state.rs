use std::sync::Arc;

use market_data::SymbolBookCache;
use types::errors::StreamError;

use crate::audit::{AuditSink, NoopAudit};
use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::metrics::ServiceMetrics;
use crate::session::{SessionRegistry, SubscriptionRouter};

/// Shared handles for every handler and session task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub cache: Arc<SymbolBookCache>,
    pub router: Arc<SubscriptionRouter>,
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    /// Wire up the cache, router, registry and dispatcher.
    ///
    /// Fails only if the configured allowlist contains an invalid symbol.
    pub fn new(config: GatewayConfig, audit: Arc<dyn AuditSink>) -> Result<Self, StreamError> {
        let metrics = Arc::new(ServiceMetrics::new());
        let cache = Arc::new(SymbolBookCache::new(config.max_depth));
        let router = Arc::new(SubscriptionRouter::new(config.allowlist()?));
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&router),
            Arc::clone(&audit),
            Arc::clone(&metrics),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&cache),
            Arc::clone(&router),
            Arc::clone(&registry),
            audit,
            Arc::clone(&metrics),
        ));

        Ok(Self {
            config: Arc::new(config),
            cache,
            router,
            registry,
            dispatcher,
            metrics,
        })
    }

    /// State with no audit journal.
    pub fn with_config(config: GatewayConfig) -> Result<Self, StreamError> {
        Self::new(config, Arc::new(NoopAudit))
    }
}
