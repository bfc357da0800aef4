//! Output de un elemento: mapa nombre → `FlowValue`.
//!
//! Rol en el flujo:
//! - Cada elemento escribe sus resultados en un `ElementData` identificado por
//!   su `element_data_key`.
//! - Varios engines pueden contribuir al mismo output (se registran como
//!   contribuyentes).
//! - Las entradas de cache son instancias propias del engine que nadie vuelve
//!   a escribir; sus valores se copian al output de cada petición
//!   (`merge_from`).
//! - Si el output se calcula de forma diferida, la lectura de una propiedad
//!   cubierta espera al `LazyLoadHandle` correspondiente.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use indexmap::IndexMap;

use crate::aspect::lazy::LazyLoadHandle;
use crate::errors::PipelineError;
use crate::model::FlowValue;

#[derive(Debug)]
pub struct ElementData {
    key: String,
    values: RwLock<IndexMap<String, FlowValue>>,
    engines: Mutex<Vec<String>>,
    pending: Mutex<Vec<Arc<LazyLoadHandle>>>,
}

impl ElementData {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into(),
               values: RwLock::new(IndexMap::new()),
               engines: Mutex::new(Vec::new()),
               pending: Mutex::new(Vec::new()) }
    }

    /// `element_data_key` del elemento dueño.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Escribe una propiedad (nombres sin distinguir mayúsculas).
    pub fn set(&self, name: &str, value: impl Into<FlowValue>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn try_get(&self, name: &str) -> Result<Option<FlowValue>, PipelineError> {
        self.wait_for(name)?;
        Ok(self.values
               .read()
               .unwrap_or_else(PoisonError::into_inner)
               .get(&name.to_ascii_lowercase())
               .cloned())
    }

    /// Lee una propiedad; falla con `PropertyNotFound` si no existe.
    pub fn get(&self, name: &str) -> Result<FlowValue, PipelineError> {
        self.try_get(name)?
            .ok_or_else(|| PipelineError::PropertyNotFound(format!("{}.{}", self.key, name)))
    }

    /// Lectura tipada; un cast fallido es `TypeMismatch`.
    pub fn get_as<T>(&self, name: &str) -> Result<T, PipelineError>
        where T: TryFrom<FlowValue, Error = PipelineError>
    {
        T::try_from(self.get(name)?)
    }

    /// Copia de todas las propiedades (espera todos los cómputos diferidos).
    pub fn as_map(&self) -> Result<IndexMap<String, FlowValue>, PipelineError> {
        self.wait_all()?;
        Ok(self.values.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copia los valores de `other`, pisando los de igual nombre. Los demás
    /// valores de este output se conservan.
    pub fn merge_from(&self, other: &ElementData) {
        let incoming = other.values.read().unwrap_or_else(PoisonError::into_inner).clone();
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(incoming);
    }

    /// Registra un engine como contribuyente de este output.
    pub fn add_engine(&self, engine: &str) {
        let mut engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
        if !engines.iter().any(|e| e == engine) {
            engines.push(engine.to_string());
        }
    }

    pub fn engines(&self) -> Vec<String> {
        self.engines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn attach_lazy(&self, handle: Arc<LazyLoadHandle>) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).push(handle);
    }

    fn handles(&self) -> Vec<Arc<LazyLoadHandle>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn wait_for(&self, name: &str) -> Result<(), PipelineError> {
        for handle in self.handles().iter().filter(|h| h.covers(name)) {
            handle.wait()?;
        }
        Ok(())
    }

    /// Espera todos los cómputos diferidos asociados.
    pub fn wait_all(&self) -> Result<(), PipelineError> {
        for handle in self.handles() {
            handle.wait()?;
        }
        Ok(())
    }
}
