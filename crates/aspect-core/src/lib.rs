//! aspect-core: pipeline de procesamiento de evidencia.
//!
//! Evidencia de entrada -> elementos en orden (con bloques paralelos) ->
//! outputs tipados por elemento. Los aspect engines agregan cache de
//! resultados y carga diferida.
pub mod aspect;
pub mod data;
pub mod element;
pub mod errors;
pub mod evidence;
pub mod hashing;
pub mod model;
pub mod pipeline;

pub use aspect::{AspectCompute, AspectEngine, AspectEngineBuilder, FlowCache, LazyLoadingConfig, LruFlowCache};
pub use data::{CacheKey, CacheKeyBuilder, ElementData, FlowData};
pub use element::FlowElement;
pub use errors::{FlowError, PipelineError, RemoteServiceError};
pub use evidence::{Evidence, EvidenceKeyFilter, EvidenceKeyFilterAggregator, EvidenceKeyFilterWhitelist};
pub use model::{AspectPropertyValue, ElementPropertyMetaData, FlowValue, PropertyValueType};
pub use pipeline::{BuilderRegistration, ElementOptions, ElementRegistry, ParallelElements, Pipeline, PipelineBuilder,
                   PipelineOptions};
