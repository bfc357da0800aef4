//! Orquestación: pipeline secuencial, bloques paralelos, builder y registro.

pub mod builder;
pub mod parallel;
#[allow(clippy::module_inception)]
pub mod pipeline;
pub mod registry;

pub use builder::PipelineBuilder;
pub use parallel::{ParallelElements, PARALLEL_ELEMENT_KEY};
pub use pipeline::Pipeline;
pub use registry::{param_bool, param_str, param_u64, BuildParameters, BuilderRegistration, ElementFactory,
                   ElementOptions, ElementRegistry, PipelineOptions};
