//! Datos por petición: `FlowData`, outputs de elementos y claves de cache.

pub mod cache_key;
pub mod element_data;
pub mod flow_data;

pub use cache_key::{generate_key, CacheKey, CacheKeyBuilder};
pub use element_data::ElementData;
pub use flow_data::FlowData;
