//! Contrato de elemento del pipeline.
//!
//! Un elemento es una unidad de trabajo: declara qué evidencia le interesa
//! (`evidence_key_filter`), en qué output escribe (`element_data_key`) y
//! procesa un `FlowData`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::data::FlowData;
use crate::errors::PipelineError;
use crate::evidence::EvidenceKeyFilter;
use crate::model::ElementPropertyMetaData;
use crate::pipeline::Pipeline;

pub trait FlowElement: Send + Sync + 'static {
    /// Clave del output que produce el elemento. Estable y única dentro del
    /// pipeline salvo engines que comparten output a propósito.
    fn element_data_key(&self) -> &str;

    /// Evidencia que consume el elemento.
    fn evidence_key_filter(&self) -> Result<Arc<dyn EvidenceKeyFilter>, PipelineError>;

    /// Propiedades que publica el elemento.
    fn properties(&self) -> Result<Vec<ElementPropertyMetaData>, PipelineError> {
        Ok(Vec::new())
    }

    /// Trabajo específico del elemento.
    fn process_data(&self, data: &FlowData) -> Result<(), PipelineError>;

    /// Punto de entrada: respeta el flag de parada antes de trabajar.
    fn process(&self, data: &FlowData) -> Result<(), PipelineError> {
        if data.is_stopped() {
            return Ok(());
        }
        self.process_data(data)
    }

    /// `true` si el elemento ejecuta trabajo concurrente sobre el mismo
    /// `FlowData` (p. ej. `ParallelElements`).
    fn is_concurrent(&self) -> bool {
        false
    }

    /// Hijos de un elemento compuesto.
    fn children(&self) -> &[Arc<dyn FlowElement>] {
        &[]
    }

    fn as_any(&self) -> &dyn Any;

    /// Aviso de que el elemento forma parte de `pipeline`. Un elemento que
    /// necesite ubicar a otros sólo debe guardar una referencia débil.
    fn added_to_pipeline(&self, _pipeline: &Arc<Pipeline>) {}

    /// Libera recursos. Lo invoca el pipeline sólo si es dueño del elemento.
    fn close(&self) {}
}

/// Ejecuta `element.process` convirtiendo un panic en `Processing`.
pub(crate) fn run_element(element: &dyn FlowElement, data: &FlowData) -> Result<(), PipelineError> {
    match panic::catch_unwind(AssertUnwindSafe(|| element.process(data))) {
        Ok(result) => result,
        Err(payload) => {
            let msg = payload.downcast_ref::<&str>()
                             .map(|s| s.to_string())
                             .or_else(|| payload.downcast_ref::<String>().cloned())
                             .unwrap_or_else(|| "unknown panic".to_string());
            Err(PipelineError::Processing(format!("element '{}' panicked: {msg}", element.element_data_key())))
        }
    }
}
