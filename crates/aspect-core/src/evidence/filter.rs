//! Filtros de claves de evidencia.
//!
//! Un filtro decide qué claves de evidencia le importan a un elemento y con
//! qué precedencia (`order`, menor primero). Dos implementaciones:
//! - `EvidenceKeyFilterWhitelist`: conjunto finito de claves con orden.
//! - `EvidenceKeyFilterAggregator`: OR lógico de filtros hijos. Las whitelists
//!   hijas se fusionan en una whitelist interna (camino rápido); el resto de
//!   filtros se consulta en orden de declaración.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Contrato de filtro de evidencia. Las claves se comparan sin distinguir
/// mayúsculas.
pub trait EvidenceKeyFilter: Send + Sync + Debug {
    fn include(&self, key: &str) -> bool;

    /// Precedencia de la clave; `None` si el filtro no la incluye.
    fn order(&self, key: &str) -> Option<i32>;

    /// Permite al agregador detectar whitelists y fusionarlas.
    fn as_whitelist(&self) -> Option<&EvidenceKeyFilterWhitelist> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvidenceKeyFilterWhitelist {
    keys: HashMap<String, i32>,
}

impl EvidenceKeyFilterWhitelist {
    /// Whitelist sin orden: todas las claves con precedencia 0.
    pub fn new<I, S>(keys: I) -> Self
        where I: IntoIterator<Item = S>,
              S: AsRef<str>
    {
        Self { keys: keys.into_iter()
                         .map(|k| (k.as_ref().to_ascii_lowercase(), 0))
                         .collect() }
    }

    /// Whitelist con precedencia explícita por clave.
    pub fn with_order<I, S>(keys: I) -> Self
        where I: IntoIterator<Item = (S, i32)>,
              S: AsRef<str>
    {
        Self { keys: keys.into_iter()
                         .map(|(k, o)| (k.as_ref().to_ascii_lowercase(), o))
                         .collect() }
    }

    /// Agrega una clave si no existía (la primera precedencia gana).
    pub fn add(&mut self, key: &str, order: i32) {
        self.keys.entry(key.to_ascii_lowercase()).or_insert(order);
    }

    pub fn keys(&self) -> impl Iterator<Item = (&str, i32)> {
        self.keys.iter().map(|(k, o)| (k.as_str(), *o))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl EvidenceKeyFilter for EvidenceKeyFilterWhitelist {
    fn include(&self, key: &str) -> bool {
        self.keys.contains_key(&key.to_ascii_lowercase())
    }

    fn order(&self, key: &str) -> Option<i32> {
        self.keys.get(&key.to_ascii_lowercase()).copied()
    }

    fn as_whitelist(&self) -> Option<&EvidenceKeyFilterWhitelist> {
        Some(self)
    }
}

#[derive(Debug, Default)]
pub struct EvidenceKeyFilterAggregator {
    merged: EvidenceKeyFilterWhitelist,
    others: Vec<Arc<dyn EvidenceKeyFilter>>,
}

impl EvidenceKeyFilterAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_filters<I>(filters: I) -> Self
        where I: IntoIterator<Item = Arc<dyn EvidenceKeyFilter>>
    {
        let mut agg = Self::new();
        for f in filters {
            agg.add_filter(f);
        }
        agg
    }

    pub fn add_filter(&mut self, filter: Arc<dyn EvidenceKeyFilter>) {
        match filter.as_whitelist() {
            Some(whitelist) => {
                for (key, order) in whitelist.keys() {
                    self.merged.add(key, order);
                }
            }
            None => self.others.push(filter),
        }
    }
}

impl EvidenceKeyFilter for EvidenceKeyFilterAggregator {
    fn include(&self, key: &str) -> bool {
        self.merged.include(key) || self.others.iter().any(|f| f.include(key))
    }

    fn order(&self, key: &str) -> Option<i32> {
        self.merged
            .order(key)
            .or_else(|| self.others.iter().find_map(|f| f.order(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Filtro que acepta todo lo que empiece por un prefijo.
    #[derive(Debug)]
    struct PrefixFilter(&'static str, i32);

    impl EvidenceKeyFilter for PrefixFilter {
        fn include(&self, key: &str) -> bool {
            key.to_ascii_lowercase().starts_with(self.0)
        }
        fn order(&self, key: &str) -> Option<i32> {
            self.include(key).then_some(self.1)
        }
    }

    #[test]
    fn whitelist_ignores_case() {
        let w = EvidenceKeyFilterWhitelist::with_order([("Header.User-Agent", 3)]);
        assert!(w.include("header.user-agent"));
        assert_eq!(w.order("HEADER.USER-AGENT"), Some(3));
        assert_eq!(w.order("query.x"), None);
    }

    #[test]
    fn aggregator_is_logical_or_with_first_precedence() {
        let a: Arc<dyn EvidenceKeyFilter> = Arc::new(EvidenceKeyFilterWhitelist::with_order([("query.a", 1)]));
        let b: Arc<dyn EvidenceKeyFilter> = Arc::new(EvidenceKeyFilterWhitelist::with_order([("query.a", 9),
                                                                                             ("query.b", 2)]));
        let c: Arc<dyn EvidenceKeyFilter> = Arc::new(PrefixFilter("cookie.", 5));
        let agg = EvidenceKeyFilterAggregator::from_filters([a, b, c]);

        assert!(agg.include("query.a"));
        assert!(agg.include("query.b"));
        assert!(agg.include("cookie.session"));
        assert!(!agg.include("header.x"));
        // la primera whitelist declarada gana
        assert_eq!(agg.order("query.a"), Some(1));
        assert_eq!(agg.order("cookie.session"), Some(5));
        assert_eq!(agg.order("header.x"), None);
    }
}
