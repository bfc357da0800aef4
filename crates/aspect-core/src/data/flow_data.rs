//! `FlowData`: agregado por petición.
//!
//! Contiene la evidencia, los outputs de cada elemento (por
//! `element_data_key`), la lista de errores y el flag de parada cooperativa.
//! Lo crea `Pipeline::create_flow_data` y se procesa exactamente una vez.
//!
//! Es un handle barato de clonar (`Arc` interno) para que las unidades de
//! cómputo diferido puedan conservarlo después de que `process` retorne.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use dashmap::DashMap;
use log::{debug, error};
use uuid::Uuid;

use super::cache_key::{generate_key, CacheKey};
use super::element_data::ElementData;
use crate::errors::{FlowError, PipelineError};
use crate::evidence::{Evidence, EvidenceKeyFilter};
use crate::model::FlowValue;
use crate::pipeline::Pipeline;

/// Mapa de outputs. En un pipeline secuencial basta un check-then-insert bajo
/// mutex; con elementos paralelos se usa un mapa concurrente.
#[derive(Debug)]
enum OutputMap {
    Sequential(Mutex<HashMap<String, Arc<ElementData>>>),
    Concurrent(DashMap<String, Arc<ElementData>>),
}

impl OutputMap {
    fn new(concurrent: bool) -> Self {
        if concurrent {
            OutputMap::Concurrent(DashMap::new())
        } else {
            OutputMap::Sequential(Mutex::new(HashMap::new()))
        }
    }

    fn get(&self, key: &str) -> Option<Arc<ElementData>> {
        match self {
            OutputMap::Sequential(m) => m.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned(),
            OutputMap::Concurrent(m) => m.get(key).map(|e| e.value().clone()),
        }
    }

    fn get_or_add(&self, key: String, factory: impl FnOnce() -> ElementData) -> Arc<ElementData> {
        match self {
            OutputMap::Sequential(m) => {
                let mut map = m.lock().unwrap_or_else(PoisonError::into_inner);
                map.entry(key).or_insert_with(|| Arc::new(factory())).clone()
            }
            OutputMap::Concurrent(m) => m.entry(key).or_insert_with(|| Arc::new(factory())).value().clone(),
        }
    }

    fn values(&self) -> Vec<Arc<ElementData>> {
        match self {
            OutputMap::Sequential(m) => m.lock().unwrap_or_else(PoisonError::into_inner).values().cloned().collect(),
            OutputMap::Concurrent(m) => m.iter().map(|e| e.value().clone()).collect(),
        }
    }
}

#[derive(Debug)]
struct FlowDataInner {
    id: Uuid,
    pipeline: Arc<Pipeline>,
    evidence: RwLock<Evidence>,
    outputs: OutputMap,
    errors: Mutex<Vec<FlowError>>,
    cache_hits: Mutex<HashSet<String>>,
    stopped: AtomicBool,
    processed: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct FlowData {
    inner: Arc<FlowDataInner>,
}

impl FlowData {
    pub(crate) fn new(pipeline: Arc<Pipeline>) -> Self {
        let concurrent = pipeline.is_concurrent();
        Self { inner: Arc::new(FlowDataInner { id: Uuid::new_v4(),
                                               pipeline,
                                               evidence: RwLock::new(Evidence::new()),
                                               outputs: OutputMap::new(concurrent),
                                               errors: Mutex::new(Vec::new()),
                                               cache_hits: Mutex::new(HashSet::new()),
                                               stopped: AtomicBool::new(false),
                                               processed: AtomicBool::new(false) }) }
    }

    /// Identificador de esta petición (correlación de logs).
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.inner.pipeline
    }

    // ---------------------------------------------------------------
    // Evidencia
    // ---------------------------------------------------------------

    pub fn add_evidence(&self, key: impl Into<String>, value: impl Into<FlowValue>) -> &Self {
        self.inner
            .evidence
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(key, value);
        self
    }

    pub fn add_evidence_from<I, K, V>(&self, items: I) -> &Self
        where I: IntoIterator<Item = (K, V)>,
              K: Into<String>,
              V: Into<FlowValue>
    {
        let mut evidence = self.inner.evidence.write().unwrap_or_else(PoisonError::into_inner);
        for (k, v) in items {
            evidence.add(k, v);
        }
        self
    }

    /// Copia de la evidencia actual.
    pub fn evidence(&self) -> Evidence {
        self.inner.evidence.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn evidence_value(&self, key: &str) -> Option<FlowValue> {
        self.inner
            .evidence
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Deriva la clave de cache de la evidencia admitida por `filter`.
    pub fn generate_key(&self, filter: &dyn EvidenceKeyFilter) -> CacheKey {
        let evidence = self.inner.evidence.read().unwrap_or_else(PoisonError::into_inner);
        generate_key(&evidence, filter)
    }

    // ---------------------------------------------------------------
    // Procesamiento
    // ---------------------------------------------------------------

    /// Ejecuta el pipeline sobre esta petición. Una segunda llamada falla con
    /// `DataState`.
    pub fn process(&self) -> Result<(), PipelineError> {
        if self.inner
               .processed
               .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
               .is_err()
        {
            return Err(PipelineError::DataState("process has already been called on this flow data".into()));
        }
        debug!("flow {}: processing", self.inner.id);
        let pipeline = self.inner.pipeline.clone();
        pipeline.process(self)
    }

    pub fn is_processed(&self) -> bool {
        self.inner.processed.load(Ordering::Acquire)
    }

    fn ensure_processed(&self) -> Result<(), PipelineError> {
        if self.is_processed() {
            Ok(())
        } else {
            Err(PipelineError::DataState("process must be called before reading element data".into()))
        }
    }

    /// Parada cooperativa: los elementos restantes no se ejecutan.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    // ---------------------------------------------------------------
    // Outputs
    // ---------------------------------------------------------------

    /// Output del elemento `key`. Falla con `DataState` antes de `process` y
    /// con `DataNotFound` si el elemento no produjo nada.
    pub fn get(&self, key: &str) -> Result<Arc<ElementData>, PipelineError> {
        self.ensure_processed()?;
        self.inner
            .outputs
            .get(&key.to_ascii_lowercase())
            .ok_or_else(|| PipelineError::DataNotFound(key.to_string()))
    }

    /// Igual que `get` pero `None` si el output no existe.
    pub fn try_get(&self, key: &str) -> Result<Option<Arc<ElementData>>, PipelineError> {
        self.ensure_processed()?;
        Ok(self.inner.outputs.get(&key.to_ascii_lowercase()))
    }

    /// Obtiene o crea el output `key`; a lo sumo una instancia por clave.
    pub fn get_or_add(&self, key: &str, factory: impl FnOnce() -> ElementData) -> Arc<ElementData> {
        self.inner.outputs.get_or_add(key.to_ascii_lowercase(), factory)
    }

    pub fn mark_cache_hit(&self, key: &str) {
        self.inner
            .cache_hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_ascii_lowercase());
    }

    pub fn was_cache_hit(&self, key: &str) -> bool {
        self.inner
            .cache_hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key.to_ascii_lowercase())
    }

    /// Resuelve una propiedad buscando primero el elemento cuya metadata la
    /// declara y luego en todos los outputs presentes.
    pub fn get_property(&self, name: &str) -> Result<FlowValue, PipelineError> {
        self.ensure_processed()?;
        for element in self.inner.pipeline.flattened_elements() {
            let declares = element.properties()
                                  .map(|props| props.iter().any(|p| p.matches(name)))
                                  .unwrap_or(false);
            if declares {
                if let Some(data) = self.inner.outputs.get(&element.element_data_key().to_ascii_lowercase()) {
                    return data.get(name);
                }
            }
        }
        for data in self.inner.outputs.values() {
            if let Some(value) = data.try_get(name)? {
                return Ok(value);
            }
        }
        Err(PipelineError::PropertyNotFound(name.to_string()))
    }

    pub fn get_property_as<T>(&self, name: &str) -> Result<T, PipelineError>
        where T: TryFrom<FlowValue, Error = PipelineError>
    {
        T::try_from(self.get_property(name)?)
    }

    // ---------------------------------------------------------------
    // Errores
    // ---------------------------------------------------------------

    /// Registra un error. Seguro frente a escrituras concurrentes.
    pub fn add_error(&self, error: PipelineError, element_key: Option<&str>, should_throw: bool, should_log: bool) {
        if should_log {
            error!("flow {} element '{}': {}",
                   self.inner.id,
                   element_key.unwrap_or("-"),
                   error);
        }
        self.inner
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FlowError::new(error, element_key, should_throw, should_log));
    }

    pub fn errors(&self) -> Vec<FlowError> {
        self.inner.errors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
