//! Cuerpo del POST al servicio remoto.
//!
//! Se parte de las credenciales (`resource` y, si existe, `license`) y se
//! mezcla la evidencia en cuatro pasadas; cada pasada puede sobrescribir los
//! campos de las anteriores. El nombre del campo es la parte de la clave que
//! sigue al prefijo de categoría (`header.user-agent` -> `user-agent`).
//!
//! 1. Evidencia fuera de las categorías cookie/header/query, en orden
//!    descendente de clave completa.
//! 2. `cookie.*`
//! 3. `header.*`
//! 4. `query.*` (siempre gana)
//!
//! Si una pasada sobrescribe un campo cuyo origen anterior no era `query` se
//! registra un conflicto con todas las claves que apuntan a ese campo.

use aspect_core::evidence::{split_key, COOKIE_PREFIX, HEADER_PREFIX, QUERY_PREFIX};
use aspect_core::{Evidence, FlowValue};
use indexmap::IndexMap;
use log::warn;

pub const RESOURCE_FIELD: &str = "resource";
pub const LICENSE_FIELD: &str = "license";

/// Varias claves de evidencia que terminan en el mismo campo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConflict {
    pub field: String,
    /// `clave=valor` en el orden en que se aplicaron.
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestForm {
    pub fields: IndexMap<String, String>,
    pub conflicts: Vec<FieldConflict>,
}

impl RequestForm {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Pares listos para codificar.
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

fn text(value: &FlowValue) -> String {
    match value {
        FlowValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// Estado de un campo: valor actual y claves que lo escribieron.
struct Slot {
    value: String,
    category: Option<String>,
    sources: Vec<String>,
}

pub fn build_form(evidence: &Evidence, resource_key: &str, license_key: Option<&str>) -> RequestForm {
    let mut slots: IndexMap<String, Slot> = IndexMap::new();
    let credential = |value: &str| Slot { value: value.to_string(),
                                          category: None,
                                          sources: Vec::new() };
    slots.insert(RESOURCE_FIELD.to_string(), credential(resource_key));
    if let Some(license) = license_key.filter(|l| !l.is_empty()) {
        slots.insert(LICENSE_FIELD.to_string(), credential(license));
    }

    let category_of = |key: &str| split_key(key).0.map(str::to_ascii_lowercase);
    let in_category = |key: &str, prefix: &str| category_of(key).as_deref() == Some(prefix);

    let mut other: Vec<(&str, &FlowValue)> = evidence.iter()
                                                     .filter(|(k, _)| {
                                                         !matches!(category_of(*k).as_deref(),
                                                                   Some(COOKIE_PREFIX | HEADER_PREFIX | QUERY_PREFIX))
                                                     })
                                                     .collect();
    other.sort_by(|a, b| b.0.to_ascii_lowercase().cmp(&a.0.to_ascii_lowercase()));

    let mut passes = vec![other];
    for prefix in [COOKIE_PREFIX, HEADER_PREFIX, QUERY_PREFIX] {
        passes.push(evidence.iter().filter(|(k, _)| in_category(*k, prefix)).collect());
    }

    let mut conflicts: IndexMap<String, FieldConflict> = IndexMap::new();
    for pass in passes {
        for (key, value) in pass {
            let field = split_key(key).1.to_string();
            let value = text(value);
            let source = format!("{key}={value}");
            let category = category_of(key);
            match slots.get_mut(&field) {
                Some(slot) => {
                    if slot.category.as_deref() != Some(QUERY_PREFIX) {
                        let mut sources = slot.sources.clone();
                        sources.push(source.clone());
                        conflicts.insert(field.clone(),
                                         FieldConflict { field: field.clone(),
                                                         sources });
                    }
                    slot.value = value;
                    slot.category = category;
                    slot.sources.push(source);
                }
                None => {
                    slots.insert(field,
                                 Slot { value,
                                        category,
                                        sources: vec![source] });
                }
            }
        }
    }

    let conflicts: Vec<FieldConflict> = conflicts.into_values().collect();
    for conflict in &conflicts {
        warn!("evidence conflict for field '{}': {}; the last value is sent",
              conflict.field,
              conflict.sources.join(" vs "));
    }

    RequestForm { fields: slots.into_iter().map(|(k, s)| (k, s.value)).collect(),
                  conflicts }
}
