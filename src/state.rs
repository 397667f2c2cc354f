//! Shared application state: the resource registry and the store it is served from.

use crate::config::ResourceRegistry;
use crate::store::EntityStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ResourceRegistry>,
    pub store: Arc<dyn EntityStore>,
}

impl AppState {
    pub fn new(registry: ResourceRegistry, store: impl EntityStore + 'static) -> Self {
        AppState {
            registry: Arc::new(registry),
            store: Arc::new(store),
        }
    }
}
