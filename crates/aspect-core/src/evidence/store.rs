//! Almacén de evidencia de una petición.
//!
//! Las claves se comparan sin distinguir mayúsculas; la clave original se
//! conserva para reportes y para construir formularios. Última escritura gana.

use indexmap::IndexMap;

use crate::model::FlowValue;

/// Separador entre categoría y nombre de campo (`header.user-agent`).
pub const EVIDENCE_SEPARATOR: char = '.';
pub const HEADER_PREFIX: &str = "header";
pub const QUERY_PREFIX: &str = "query";
pub const COOKIE_PREFIX: &str = "cookie";
pub const SERVER_PREFIX: &str = "server";

/// Separa una clave en (categoría, campo). Sin separador no hay categoría.
pub fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once(EVIDENCE_SEPARATOR) {
        Some((prefix, field)) => (Some(prefix), field),
        None => (None, key),
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    value: FlowValue,
}

#[derive(Debug, Clone, Default)]
pub struct Evidence {
    entries: IndexMap<String, Entry>,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega o sobreescribe el valor de `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<FlowValue>) {
        let key = key.into();
        self.entries.insert(key.to_ascii_lowercase(),
                            Entry { key,
                                    value: value.into() });
    }

    pub fn get(&self, key: &str) -> Option<&FlowValue> {
        self.entries.get(&key.to_ascii_lowercase()).map(|e| &e.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    pub fn remove(&mut self, key: &str) -> Option<FlowValue> {
        self.entries.shift_remove(&key.to_ascii_lowercase()).map(|e| e.value)
    }

    /// Itera `(clave original, valor)` en orden de inserción.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlowValue)> {
        self.entries.values().map(|e| (e.key.as_str(), &e.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|e| e.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<FlowValue>> FromIterator<(K, V)> for Evidence {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut ev = Evidence::new();
        for (k, v) in iter {
            ev.add(k, v);
        }
        ev
    }
}
