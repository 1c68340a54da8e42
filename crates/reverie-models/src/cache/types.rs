//! Core data types for the dream cache.

use burn::tensor::backend::AutodiffBackend;
use reverie_abstraction::FeatureExtractor;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::optimizer::DreamOptimizer;
use crate::registry::ModelConfig;

/// A built model: its extractor and the optimizer bound to it.
///
/// Cloning is cheap and every clone shares the same extractor and optimizer.
pub struct CachedDreamer<B: AutodiffBackend> {
    /// The registry entry this dreamer was built from.
    pub config: &'static ModelConfig,
    /// The feature extractor.
    pub extractor: Arc<dyn FeatureExtractor<B>>,
    /// The optimizer bound to `extractor`.
    pub optimizer: Arc<DreamOptimizer<B>>,
    /// When the build finished.
    pub built_at: Instant,
}

impl<B: AutodiffBackend> CachedDreamer<B> {
    /// Bundles `extractor` with a freshly bound optimizer.
    pub fn new(config: &'static ModelConfig, extractor: Arc<dyn FeatureExtractor<B>>) -> Self {
        let optimizer = Arc::new(DreamOptimizer::new(Arc::clone(&extractor)));
        Self { config, extractor, optimizer, built_at: Instant::now() }
    }
}

impl<B: AutodiffBackend> Clone for CachedDreamer<B> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            extractor: Arc::clone(&self.extractor),
            optimizer: Arc::clone(&self.optimizer),
            built_at: self.built_at,
        }
    }
}

impl<B: AutodiffBackend> std::fmt::Debug for CachedDreamer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedDreamer")
            .field("model_id", &self.extractor.model_id())
            .field("layers", &self.extractor.layers())
            .field("built_at", &self.built_at)
            .finish()
    }
}

/// Cache statistics for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Requests served by an already built model.
    pub total_hits: u64,
    /// Requests that found no built model and waited for or ran a build.
    pub total_misses: u64,
    /// Successful builds.
    pub total_builds: u64,
    /// Failed builds. Failures are not cached.
    pub total_build_failures: u64,
    /// Number of built models currently held.
    pub cache_size: usize,
}

impl CacheStats {
    /// Fraction of requests served without waiting for a build.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_hits + self.total_misses;
        if total == 0 { 0.0 } else { self.total_hits as f64 / total as f64 }
    }
}
