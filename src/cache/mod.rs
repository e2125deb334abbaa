use std::sync::Arc;

use log::trace;
use quick_cache::sync::Cache;
use strewn_model::crc::Crc;
use strewn_model::points::PointBatch;

/// Keeps forwarded spawner outputs across passes, keyed by the element crc.
/// With it, the reuse fast path can skip a whole re-execution even when the
/// element forwards its points downstream: the cached batches stand in for
/// the work. Invalid crcs never touch the cache.
pub struct ElementCache {
    results: Cache<u32, Arc<Vec<PointBatch>>>,
}

impl ElementCache {
    pub fn new(capacity: usize) -> Self {
        ElementCache {
            results: Cache::new(capacity),
        }
    }

    pub fn get(&self, element_crc: Crc) -> Option<Arc<Vec<PointBatch>>> {
        if !element_crc.is_valid() {
            return None;
        }
        self.results.get(&element_crc.value())
    }

    pub fn store(&self, element_crc: Crc, outputs: Arc<Vec<PointBatch>>) {
        if !element_crc.is_valid() {
            return;
        }
        trace!("caching {} output batches under {:08x}", outputs.len(), element_crc.value());
        self.results.insert(element_crc.value(), outputs);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.len() == 0
    }
}
