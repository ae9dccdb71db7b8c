//! HTTP adapter over the routing core.

pub mod routes;

use std::sync::Arc;

use crate::capabilities::CapabilityDirectory;
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::gateway::ProcessGateway;
use crate::registry::WorkerRegistry;
use crate::router::{Classifier, ConversationRouter};
use crate::session::ConversationStore;

pub use routes::{gateway_routes, status_for};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ConversationRouter>,
    pub directory: Arc<CapabilityDirectory>,
}

impl AppState {
    /// Load the worker configuration named by `config` and wire everything.
    pub fn load(config: &GatewayConfig) -> Result<Self> {
        let registry = WorkerRegistry::load(&config.workers_path)?;
        Ok(Self::new(registry, config))
    }

    /// Wire the gateway, directory, store and router with the default routing table.
    pub fn new(registry: WorkerRegistry, config: &GatewayConfig) -> Self {
        Self::with_classifier(registry, config, Classifier::default_rules())
    }

    /// The directory's known ids are exactly the workers `classifier` can select.
    pub fn with_classifier(
        registry: WorkerRegistry,
        config: &GatewayConfig,
        classifier: Classifier,
    ) -> Self {
        let gateway = Arc::new(ProcessGateway::from_config(Arc::new(registry), config));
        let directory = Arc::new(CapabilityDirectory::for_workers(
            classifier.worker_ids(),
            gateway,
        ));
        let store = ConversationStore::from_config(config);
        let router = Arc::new(ConversationRouter::new(
            store,
            Arc::clone(&directory),
            Arc::new(classifier),
        ));
        Self { router, directory }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        self.router.store()
    }
}
