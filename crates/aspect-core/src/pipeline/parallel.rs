//! Bloque de elementos que corren en paralelo sobre el mismo `FlowData`.
//!
//! Cada hijo se lanza como una tarea de rayon dentro de un `scope`; el bloque
//! retorna cuando terminan todas. El fallo de un hijo (error o panic) se
//! registra en el `FlowData` etiquetado con la clave del hijo y no cancela a
//! los hermanos. Si el flag de parada se activa, no se lanzan más hijos.

use std::any::Any;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::pipeline::aggregate_filter;
use crate::data::FlowData;
use crate::element::{run_element, FlowElement};
use crate::errors::PipelineError;
use crate::evidence::EvidenceKeyFilter;
use crate::model::ElementPropertyMetaData;

pub const PARALLEL_ELEMENT_KEY: &str = "parallel";

pub struct ParallelElements {
    children: Vec<Arc<dyn FlowElement>>,
    filter: OnceCell<Arc<dyn EvidenceKeyFilter>>,
}

impl ParallelElements {
    pub fn new(children: Vec<Arc<dyn FlowElement>>) -> Self {
        Self { children,
               filter: OnceCell::new() }
    }
}

impl FlowElement for ParallelElements {
    fn element_data_key(&self) -> &str {
        PARALLEL_ELEMENT_KEY
    }

    fn evidence_key_filter(&self) -> Result<Arc<dyn EvidenceKeyFilter>, PipelineError> {
        self.filter.get_or_try_init(|| aggregate_filter(&self.children)).cloned()
    }

    fn properties(&self) -> Result<Vec<ElementPropertyMetaData>, PipelineError> {
        let mut all = Vec::new();
        for child in &self.children {
            all.extend(child.properties()?);
        }
        Ok(all)
    }

    fn process_data(&self, data: &FlowData) -> Result<(), PipelineError> {
        rayon::scope(|scope| {
            for child in &self.children {
                if data.is_stopped() {
                    break;
                }
                scope.spawn(move |_| {
                         if let Err(e) = run_element(child.as_ref(), data) {
                             data.add_error(e, Some(child.element_data_key()), true, true);
                         }
                     });
            }
        });
        Ok(())
    }

    fn is_concurrent(&self) -> bool {
        true
    }

    fn children(&self) -> &[Arc<dyn FlowElement>] {
        &self.children
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn close(&self) {
        for child in &self.children {
            child.close();
        }
    }
}
