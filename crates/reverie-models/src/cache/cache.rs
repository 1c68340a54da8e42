//! DreamCache implementation with per-key lazy initialization.

use burn::tensor::backend::AutodiffBackend;
use once_cell::sync::OnceCell;
use reverie_abstraction::{DreamResult, WeightProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, error, info};

use super::types::{CacheStats, CachedDreamer};
use crate::extractor::TappedExtractor;
use crate::registry::{ModelConfig, ModelRegistry, ModelType};

type Slot<B> = Arc<OnceCell<CachedDreamer<B>>>;

/// Cache of built dream models, keyed by model type.
///
/// Each key owns a once-cell. The first caller for a key runs the build while
/// later callers block on the same cell, so a model is built at most once.
/// A failed build leaves the cell empty and the next request retries it.
/// Entries are never evicted.
pub struct DreamCache<B: AutodiffBackend> {
    provider: Arc<dyn WeightProvider<B>>,
    device: B::Device,
    slots: RwLock<HashMap<ModelType, Slot<B>>>,
    stats: Mutex<CacheStats>,
}

impl<B: AutodiffBackend> DreamCache<B> {
    /// Create an empty cache that loads networks from `provider` onto `device`.
    pub fn new(provider: Arc<dyn WeightProvider<B>>, device: B::Device) -> Self {
        Self {
            provider,
            device,
            slots: RwLock::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Get the extractor and optimizer for `model_id`, building them on first use.
    ///
    /// # Errors
    /// Returns `DreamError::ConfigurationError` for an unregistered model id (no
    /// build is attempted) and `DreamError::ResourceError` if the build fails.
    pub fn get(&self, model_id: &str) -> DreamResult<CachedDreamer<B>> {
        let config = ModelRegistry::lookup(model_id)?;
        let slot = self.slot(config.model_type);

        if let Some(dreamer) = slot.get() {
            self.record(|stats| stats.total_hits += 1);
            debug!(model_id = %config.model_type, "Cache hit");
            return Ok(dreamer.clone());
        }

        self.record(|stats| stats.total_misses += 1);
        debug!(model_id = %config.model_type, "Cache miss, building model");

        slot.get_or_try_init(|| self.build(config)).cloned()
    }

    /// Returns true if `model_id` resolves to a model that is already built.
    pub fn contains(&self, model_id: &str) -> bool {
        let Ok(config) = ModelRegistry::lookup(model_id) else {
            return false;
        };

        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&config.model_type)
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone();
        stats.cache_size = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.get().is_some())
            .count();
        stats
    }

    /// The device networks are loaded onto.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    fn slot(&self, model_type: ModelType) -> Slot<B> {
        if let Some(slot) = self.slots.read().unwrap_or_else(PoisonError::into_inner).get(&model_type)
        {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(model_type).or_default())
    }

    fn build(&self, config: &'static ModelConfig) -> DreamResult<CachedDreamer<B>> {
        info!(model_id = %config.model_type, architecture = %config.architecture, "Building dream model");

        match TappedExtractor::build(config, self.provider.as_ref(), &self.device) {
            Ok(extractor) => {
                self.record(|stats| stats.total_builds += 1);
                info!(model_id = %config.model_type, "Dream model cached");
                Ok(CachedDreamer::new(config, Arc::new(extractor)))
            }
            Err(e) => {
                self.record(|stats| stats.total_build_failures += 1);
                error!(model_id = %config.model_type, error = %e, "Dream model build failed");
                Err(e)
            }
        }
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        update(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl<B: AutodiffBackend> std::fmt::Debug for DreamCache<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DreamCache").field("stats", &self.stats()).finish_non_exhaustive()
    }
}
