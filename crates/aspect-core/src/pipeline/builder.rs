//! Builder fluido de `Pipeline`.
//!
//! ```ignore
//! let pipeline = PipelineBuilder::new()
//!     .add_element(RequestStep)
//!     .add_parallel(vec![a, b])
//!     .suppress_process_errors(false)
//!     .build()?;
//! let data = pipeline.create_flow_data();
//! ```

use std::sync::Arc;

use log::debug;

use super::parallel::ParallelElements;
use super::pipeline::Pipeline;
use crate::element::FlowElement;
use crate::errors::PipelineError;

#[derive(Default)]
pub struct PipelineBuilder {
    elements: Vec<Arc<dyn FlowElement>>,
    suppress_process_errors: bool,
    auto_close_elements: bool,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Añade un elemento; el pipeline pasa a compartir su propiedad.
    pub fn add_element<E: FlowElement>(self, element: E) -> Self {
        self.add_shared(Arc::new(element))
    }

    /// Añade un elemento ya compartido (puede estar también en otro pipeline).
    pub fn add_shared(mut self, element: Arc<dyn FlowElement>) -> Self {
        self.elements.push(element);
        self
    }

    /// Añade un bloque cuyos elementos corren en paralelo.
    pub fn add_parallel(self, children: Vec<Arc<dyn FlowElement>>) -> Self {
        self.add_element(ParallelElements::new(children))
    }

    /// Con `true` los errores quedan sólo registrados en el `FlowData`.
    pub fn suppress_process_errors(mut self, suppress: bool) -> Self {
        self.suppress_process_errors = suppress;
        self
    }

    /// Con `true` el pipeline cierra sus elementos al destruirse.
    pub fn auto_close_elements(mut self, auto_close: bool) -> Self {
        self.auto_close_elements = auto_close;
        self
    }

    /// Valida la composición y construye el pipeline.
    ///
    /// Falla con `Configuration` si no hay elementos, si un bloque paralelo
    /// está vacío o si la misma instancia aparece más de una vez.
    pub fn build(self) -> Result<Arc<Pipeline>, PipelineError> {
        if self.elements.is_empty() {
            return Err(PipelineError::Configuration("a pipeline needs at least one element".into()));
        }
        let mut seen: Vec<*const ()> = Vec::new();
        check_members(&self.elements, &mut seen)?;

        let pipeline = Arc::new(Pipeline::new(self.elements, self.suppress_process_errors, self.auto_close_elements));
        for element in pipeline.flattened_elements() {
            element.added_to_pipeline(&pipeline);
        }
        debug!("built {:?}", pipeline);
        Ok(pipeline)
    }
}

fn check_members(elements: &[Arc<dyn FlowElement>], seen: &mut Vec<*const ()>) -> Result<(), PipelineError> {
    for element in elements {
        let ptr = Arc::as_ptr(element) as *const ();
        if seen.contains(&ptr) {
            return Err(PipelineError::Configuration(format!("element '{}' was added to the pipeline more than once",
                                                            element.element_data_key())));
        }
        seen.push(ptr);
        if element.is_concurrent() && element.children().is_empty() {
            return Err(PipelineError::Configuration("parallel block without elements".into()));
        }
        check_members(element.children(), seen)?;
    }
    Ok(())
}
