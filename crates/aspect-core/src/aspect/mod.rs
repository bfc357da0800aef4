//! Capa de aspect engines: cache de resultados y carga diferida.

pub mod cache;
pub mod engine;
pub mod lazy;

pub use cache::{FlowCache, LruFlowCache};
pub use engine::{AspectCompute, AspectEngine, AspectEngineBuilder};
pub use lazy::{LazyLoadHandle, LazyLoadingConfig};
