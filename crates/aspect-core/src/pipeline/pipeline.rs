//! `Pipeline`: secuencia ordenada de elementos.
//!
//! Ejecución:
//! - Los elementos corren en el orden configurado.
//! - El error de un elemento se registra en el `FlowData` (should_throw y
//!   should_log activos) y el bucle continúa con el siguiente.
//! - El bucle sólo se corta si se activa el flag de parada.
//! - Al terminar, los errores should_throw se combinan en un único
//!   `PipelineError::Aggregate` salvo que el pipeline los suprima. Un
//!   `DataState` registrado se lanza siempre; si es el único error se devuelve
//!   tal cual.
//!
//! Propiedad de los elementos: el pipeline sólo los cierra al destruirse si
//! se construyó con `auto_close_elements`; si no, el llamador es el dueño.

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use once_cell::sync::OnceCell;

use crate::aspect::{AspectCompute, AspectEngine};
use crate::data::FlowData;
use crate::element::{run_element, FlowElement};
use crate::errors::{FlowError, PipelineError};
use crate::evidence::{EvidenceKeyFilter, EvidenceKeyFilterAggregator};

pub struct Pipeline {
    elements: Vec<Arc<dyn FlowElement>>,
    /// Elementos de primer nivel más los hijos de los compuestos, en orden.
    flattened: Vec<Arc<dyn FlowElement>>,
    suppress_process_errors: bool,
    auto_close: bool,
    concurrent: bool,
    filter: OnceCell<Arc<dyn EvidenceKeyFilter>>,
}

fn flatten(elements: &[Arc<dyn FlowElement>], out: &mut Vec<Arc<dyn FlowElement>>) {
    for element in elements {
        out.push(element.clone());
        flatten(element.children(), out);
    }
}

/// Filtro OR de los filtros de `elements`.
pub(crate) fn aggregate_filter(elements: &[Arc<dyn FlowElement>])
                               -> Result<Arc<dyn EvidenceKeyFilter>, PipelineError> {
    let mut aggregator = EvidenceKeyFilterAggregator::new();
    for element in elements {
        aggregator.add_filter(element.evidence_key_filter()?);
    }
    Ok(Arc::new(aggregator))
}

impl Pipeline {
    pub(crate) fn new(elements: Vec<Arc<dyn FlowElement>>, suppress_process_errors: bool, auto_close: bool) -> Self {
        let mut flattened = Vec::new();
        flatten(&elements, &mut flattened);
        let concurrent = flattened.iter().any(|e| e.is_concurrent());
        Self { elements,
               flattened,
               suppress_process_errors,
               auto_close,
               concurrent,
               filter: OnceCell::new() }
    }

    /// Crea un `FlowData` vinculado a este pipeline.
    pub fn create_flow_data(self: &Arc<Self>) -> FlowData {
        FlowData::new(self.clone())
    }

    /// Ejecuta todos los elementos sobre `data`. Lo invoca `FlowData::process`.
    pub(crate) fn process(&self, data: &FlowData) -> Result<(), PipelineError> {
        for element in &self.elements {
            if data.is_stopped() {
                debug!("flow {}: stop flag set, skipping remaining elements", data.id());
                break;
            }
            if let Err(e) = run_element(element.as_ref(), data) {
                data.add_error(e, Some(element.element_data_key()), true, true);
            }
        }

        let thrown: Vec<FlowError> = data.errors().into_iter().filter(|e| e.should_throw).collect();
        if thrown.is_empty() {
            return Ok(());
        }
        let state_error = thrown.iter().any(|e| matches!(e.error, PipelineError::DataState(_)));
        if self.suppress_process_errors && !state_error {
            warn!("flow {}: {} error(s) suppressed", data.id(), thrown.len());
            return Ok(());
        }
        if let [only] = thrown.as_slice() {
            if state_error {
                return Err(only.error.clone());
            }
        }
        Err(PipelineError::Aggregate(thrown))
    }

    /// Filtro OR de todos los elementos; se calcula una sola vez.
    pub fn evidence_key_filter(&self) -> Result<Arc<dyn EvidenceKeyFilter>, PipelineError> {
        self.filter.get_or_try_init(|| aggregate_filter(&self.elements)).cloned()
    }

    /// Primer elemento de tipo `T` (incluye hijos de bloques paralelos).
    pub fn get_element<T: FlowElement>(&self) -> Option<&T> {
        self.flattened.iter().find_map(|e| e.as_any().downcast_ref::<T>())
    }

    /// Aspect engine cuyo cómputo es de tipo `C`.
    pub fn get_engine<C: AspectCompute>(&self) -> Option<&AspectEngine<C>> {
        self.get_element::<AspectEngine<C>>()
    }

    pub fn elements(&self) -> &[Arc<dyn FlowElement>] {
        &self.elements
    }

    pub fn flattened_elements(&self) -> &[Arc<dyn FlowElement>] {
        &self.flattened
    }

    /// Claves de output de los elementos que producen datos (sin bloques
    /// compuestos).
    pub fn element_keys(&self) -> Vec<String> {
        self.flattened
            .iter()
            .filter(|e| e.children().is_empty())
            .map(|e| e.element_data_key().to_string())
            .collect()
    }

    // Índice en la secuencia de primer nivel; un hijo de un bloque paralelo
    // toma la posición del bloque.
    fn position(&self, key: &str) -> Option<usize> {
        fn contains(element: &Arc<dyn FlowElement>, key: &str) -> bool {
            element.element_data_key().eq_ignore_ascii_case(key) || element.children().iter().any(|c| contains(c, key))
        }
        self.elements.iter().position(|e| contains(e, key))
    }

    /// `true` si el elemento `later` corre estrictamente después de `earlier`.
    /// Dos elementos del mismo bloque paralelo no tienen orden entre sí.
    pub fn is_after(&self, earlier: &str, later: &str) -> bool {
        match (self.position(earlier), self.position(later)) {
            (Some(a), Some(b)) => b > a,
            _ => false,
        }
    }

    pub fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    pub fn suppresses_process_errors(&self) -> bool {
        self.suppress_process_errors
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.elements.iter().map(|e| e.element_data_key()).collect();
        f.debug_struct("Pipeline")
         .field("elements", &keys)
         .field("suppress_process_errors", &self.suppress_process_errors)
         .field("auto_close", &self.auto_close)
         .field("concurrent", &self.concurrent)
         .finish()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.auto_close {
            for element in &self.elements {
                debug!("closing element '{}'", element.element_data_key());
                element.close();
            }
        }
    }
}
