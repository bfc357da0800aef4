//! Cache de resultados de aspect engines.
//!
//! El contrato es mínimo (`get` / `put`). Las entradas se tratan como
//! inmutables una vez almacenadas. No hay coalescencia: dos cómputos
//! concurrentes con la misma clave pueden hacer `put`, gana el último.

use std::fmt::Debug;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;

use crate::data::{CacheKey, ElementData};

pub trait FlowCache: Send + Sync + Debug {
    fn get(&self, key: &CacheKey) -> Option<Arc<ElementData>>;
    fn put(&self, key: CacheKey, value: Arc<ElementData>);
}

/// Cache LRU acotada.
pub struct LruFlowCache {
    inner: Mutex<LruCache<CacheKey, Arc<ElementData>>>,
}

impl LruFlowCache {
    /// Una capacidad 0 se ajusta a 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { inner: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for LruFlowCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("LruFlowCache")
         .field("len", &cache.len())
         .field("capacity", &cache.cap())
         .finish()
    }
}

impl FlowCache for LruFlowCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<ElementData>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    fn put(&self, key: CacheKey, value: Arc<ElementData>) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).put(key, value);
    }
}
