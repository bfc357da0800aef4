//! Claves de cache derivadas de evidencia filtrada.
//!
//! Una `CacheKey` es la secuencia inmutable de *valores* de evidencia (no de
//! claves) ordenada por `(precedencia asc, nombre de clave asc)`. El hash
//! combinado se calcula una sola vez al construirla.
//!
//! Invariante: dos conjuntos de evidencia que coinciden en todas las claves
//! admitidas por un filtro producen claves iguales, sin importar el orden de
//! inserción ni las claves excluidas.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::evidence::{Evidence, EvidenceKeyFilter};
use crate::hashing::hash_u64;
use crate::model::FlowValue;

#[derive(Clone)]
pub struct CacheKey {
    values: Vec<FlowValue>,
    hash: u64,
}

impl CacheKey {
    pub fn new(values: Vec<FlowValue>) -> Self {
        let mut canonical = Vec::new();
        canonical.extend_from_slice(&(values.len() as u64).to_le_bytes());
        for v in &values {
            v.write_canonical(&mut canonical);
        }
        Self { hash: hash_u64(&canonical),
               values }
    }

    pub fn values(&self) -> &[FlowValue] {
        &self.values
    }

    pub fn hash_value(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.values == other.values
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl Ord for CacheKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.values.cmp(&other.values)
    }
}

impl PartialOrd for CacheKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({:016x}, {} values)", self.hash, self.values.len())
    }
}

/// Acumula entradas `(precedencia, clave, valor)` y produce la `CacheKey`.
#[derive(Debug, Default)]
pub struct CacheKeyBuilder {
    entries: Vec<(i32, String, FlowValue)>,
}

impl CacheKeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, order: i32, key: &str, value: FlowValue) -> &mut Self {
        self.entries.push((order, key.to_ascii_lowercase(), value));
        self
    }

    pub fn build(mut self) -> CacheKey {
        self.entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        CacheKey::new(self.entries.into_iter().map(|(_, _, v)| v).collect())
    }
}

/// Deriva la clave de `evidence` según `filter`.
pub fn generate_key(evidence: &Evidence, filter: &dyn EvidenceKeyFilter) -> CacheKey {
    let mut builder = CacheKeyBuilder::new();
    for (key, value) in evidence.iter() {
        if filter.include(key) {
            let order = filter.order(key).unwrap_or(i32::MAX);
            builder.add(order, key, value.clone());
        }
    }
    builder.build()
}
