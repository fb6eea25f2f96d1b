//! Registry of cost sources, iterated in name order.

use std::fmt;
use std::sync::Arc;

use super::source::CostSource;

/// Name-sorted set of cost sources.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    sources: Vec<Arc<dyn CostSource>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source. A source with the same name replaces the earlier one.
    pub fn register(&mut self, source: Arc<dyn CostSource>) {
        match self
            .sources
            .binary_search_by(|s| s.name().cmp(source.name()))
        {
            Ok(idx) => {
                tracing::warn!("Plugin {} registered twice; keeping the latest", source.name());
                self.sources[idx] = source;
            }
            Err(idx) => self.sources.insert(idx, source),
        }
    }

    pub fn with(mut self, source: Arc<dyn CostSource>) -> Self {
        self.register(source);
        self
    }

    pub fn sources(&self) -> &[Arc<dyn CostSource>] {
        &self.sources
    }

    /// Sources that declare support for `provider`, in name order.
    ///
    /// Sources without metadata are asked about every provider.
    pub fn sources_for(&self, provider: &str) -> Vec<Arc<dyn CostSource>> {
        self.sources
            .iter()
            .filter(|s| s.supports_provider(provider))
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CostSource>> {
        self.sources
            .binary_search_by(|s| s.name().cmp(name))
            .ok()
            .map(|idx| Arc::clone(&self.sources[idx]))
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
