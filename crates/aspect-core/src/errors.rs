//! Errores del core.
//!
//! Taxonomía única usada por pipeline, elementos y engines:
//! - `Configuration`: falta un elemento requerido o el pipeline está mal
//!   armado. Fatal, aparece al construir o en el primer uso.
//! - `Processing`: fallo dentro del `process` de un elemento. Se registra en
//!   el `FlowData` y no aborta a los hermanos.
//! - `Remote` / `RemoteAggregate`: respuesta inválida o con errores del
//!   servicio remoto.
//! - `DataState`: errores de programación (leer antes de procesar, procesar
//!   dos veces). Nunca se suprimen.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("data state error: {0}")]
    DataState(String),
    #[error("property '{0}' not found")]
    PropertyNotFound(String),
    #[error("no element data for key '{0}'")]
    DataNotFound(String),
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: &'static str },
    #[error("processing error: {0}")]
    Processing(String),
    #[error(transparent)]
    Remote(#[from] RemoteServiceError),
    #[error("{} errors returned by remote service: {}", .0.len(), join_messages(.0))]
    RemoteAggregate(Vec<RemoteServiceError>),
    #[error("lazy load did not complete within {0:?}")]
    LazyLoadTimeout(Duration),
    #[error("lazy load was cancelled")]
    LazyLoadCancelled,
    #[error("{} error(s) occurred during processing: {}", .0.len(), join_messages(.0))]
    Aggregate(Vec<FlowError>),
}

fn join_messages<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

/// Error estructurado devuelto por el servicio remoto.
///
/// Conserva el status HTTP (si hubo respuesta) y los headers para que el
/// caller pueda diagnosticar sin volver a hacer la petición.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}{}", status_suffix(.status))]
pub struct RemoteServiceError {
    pub message: String,
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
}

impl RemoteServiceError {
    pub fn new(message: impl Into<String>, status: Option<u16>, headers: Vec<(String, String)>) -> Self {
        Self { message: message.into(),
               status,
               headers }
    }
}

/// Error registrado en un `FlowData` durante el procesamiento.
///
/// Los flags son independientes: un error puede loguearse sin propagarse
/// (`should_throw = false`) o propagarse sin loguearse.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowError {
    pub element_key: Option<String>,
    pub error: PipelineError,
    pub should_throw: bool,
    pub should_log: bool,
    pub occurred_at: DateTime<Utc>,
}

impl FlowError {
    pub fn new(error: PipelineError, element_key: Option<&str>, should_throw: bool, should_log: bool) -> Self {
        Self { element_key: element_key.map(str::to_string),
               error,
               should_throw,
               should_log,
               occurred_at: Utc::now() }
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.element_key {
            Some(key) => write!(f, "[{key}] {}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_display_includes_status() {
        let e = RemoteServiceError::new("bad key", Some(400), vec![]);
        assert_eq!(e.to_string(), "bad key (status 400)");
        let e = RemoteServiceError::new("no response", None, vec![]);
        assert_eq!(e.to_string(), "no response");
    }

    #[test]
    fn aggregate_lists_every_element() {
        let errs = vec![FlowError::new(PipelineError::Processing("boom".into()), Some("a"), true, true),
                        FlowError::new(PipelineError::Processing("bang".into()), None, true, false)];
        let msg = PipelineError::Aggregate(errs).to_string();
        assert!(msg.starts_with("2 error(s)"));
        assert!(msg.contains("[a] processing error: boom"));
        assert!(msg.contains("bang"));
    }
}
