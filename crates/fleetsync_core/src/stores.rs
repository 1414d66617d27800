//! The store bundle the engines operate on.

use crate::model::{Application, Config, Node, Secret};
use fleetsync_store::{InMemoryStore, ResourceStore};
use std::sync::Arc;

/// One store per record kind.
#[derive(Clone)]
pub struct Stores {
    /// Node records.
    pub nodes: Arc<dyn ResourceStore<Node>>,
    /// Application records.
    pub apps: Arc<dyn ResourceStore<Application>>,
    /// Configuration records.
    pub configs: Arc<dyn ResourceStore<Config>>,
    /// Secret records.
    pub secrets: Arc<dyn ResourceStore<Secret>>,
}

impl Stores {
    /// Bundles four stores.
    pub fn new(
        nodes: Arc<dyn ResourceStore<Node>>,
        apps: Arc<dyn ResourceStore<Application>>,
        configs: Arc<dyn ResourceStore<Config>>,
        secrets: Arc<dyn ResourceStore<Secret>>,
    ) -> Self {
        Self {
            nodes,
            apps,
            configs,
            secrets,
        }
    }

    /// Creates empty in-memory stores.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryStore::<Node>::new()),
            Arc::new(InMemoryStore::<Application>::new()),
            Arc::new(InMemoryStore::<Config>::new()),
            Arc::new(InMemoryStore::<Secret>::new()),
        )
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
