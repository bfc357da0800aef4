//! Carga diferida (lazy loading) de aspect engines.
//!
//! Cuando un engine está configurado con `LazyLoadingConfig`, su cómputo
//! corre en una unidad aparte y `process` retorna de inmediato. El output
//! queda asociado a un `LazyLoadHandle`; quien lea una propiedad cubierta por
//! el handle se bloquea hasta que el cómputo termine, expire el timeout o se
//! cancele la espera.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::errors::PipelineError;

// Intervalo máximo entre chequeos del flag de cancelación.
const CANCELLATION_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct LazyLoadingConfig {
    pub timeout: Duration,
    pub cancellation: Option<Arc<AtomicBool>>,
}

impl LazyLoadingConfig {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout,
               cancellation: None }
    }

    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|f| f.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}

#[derive(Debug)]
pub struct LazyLoadHandle {
    /// Propiedades (en minúsculas) que produce el cómputo; vacío = todas.
    properties: Vec<String>,
    config: LazyLoadingConfig,
    state: Mutex<Option<Result<(), PipelineError>>>,
    done: Condvar,
}

impl LazyLoadHandle {
    pub fn new(properties: Vec<String>, config: LazyLoadingConfig) -> Self {
        Self { properties: properties.into_iter().map(|p| p.to_ascii_lowercase()).collect(),
               config,
               state: Mutex::new(None),
               done: Condvar::new() }
    }

    pub fn covers(&self, property: &str) -> bool {
        self.properties.is_empty() || self.properties.iter().any(|p| p.eq_ignore_ascii_case(property))
    }

    pub fn complete(&self, result: Result<(), PipelineError>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = Some(result);
        self.done.notify_all();
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Espera a que el cómputo termine y devuelve su resultado.
    pub fn wait(&self) -> Result<(), PipelineError> {
        let deadline = Instant::now() + self.config.timeout;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = state.as_ref() {
                return result.clone();
            }
            if self.config.is_cancelled() {
                return Err(PipelineError::LazyLoadCancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PipelineError::LazyLoadTimeout(self.config.timeout));
            }
            let slice = (deadline - now).min(CANCELLATION_POLL);
            state = self.done
                        .wait_timeout(state, slice)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wait_returns_result_of_background_unit() {
        let handle = Arc::new(LazyLoadHandle::new(vec![], LazyLoadingConfig::new(Duration::from_secs(5))));
        let h = handle.clone();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            h.complete(Ok(()));
        });
        assert!(handle.wait().is_ok());
        worker.join().unwrap();
        assert!(handle.is_complete());
    }

    #[test]
    fn wait_times_out() {
        let handle = LazyLoadHandle::new(vec![], LazyLoadingConfig::new(Duration::from_millis(30)));
        assert_eq!(handle.wait(), Err(PipelineError::LazyLoadTimeout(Duration::from_millis(30))));
    }

    #[test]
    fn wait_honours_cancellation() {
        let flag = Arc::new(AtomicBool::new(true));
        let cfg = LazyLoadingConfig::new(Duration::from_secs(10)).with_cancellation(flag);
        let handle = LazyLoadHandle::new(vec!["a".into()], cfg);
        assert_eq!(handle.wait(), Err(PipelineError::LazyLoadCancelled));
        assert!(handle.covers("A"));
        assert!(!handle.covers("b"));
    }
}
