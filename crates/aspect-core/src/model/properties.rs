//! Metadata de propiedades expuestas por los elementos.

use serde::{Deserialize, Serialize};

/// Tipo declarado de una propiedad.
///
/// `Nullable` envuelve el tipo real cuando la propiedad se entrega como
/// `AspectPropertyValue` (valor o razón de ausencia).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValueType {
    String,
    Int,
    Bool,
    Double,
    Bytes,
    List,
    Map,
    JavaScript,
    Nullable(Box<PropertyValueType>),
    Unknown(String),
}

impl PropertyValueType {
    /// Interpreta la etiqueta de tipo que publica un servicio remoto
    /// (`"String"`, `"Int32"`, `"Boolean"`, `"Array"`, ...).
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "string" => PropertyValueType::String,
            "int" | "int32" | "int64" | "integer" | "long" => PropertyValueType::Int,
            "bool" | "boolean" => PropertyValueType::Bool,
            "double" | "single" | "float" | "decimal" => PropertyValueType::Double,
            "bytes" | "byte[]" => PropertyValueType::Bytes,
            "array" | "list" | "ilist" => PropertyValueType::List,
            "object" | "map" | "dictionary" => PropertyValueType::Map,
            "javascript" => PropertyValueType::JavaScript,
            _ => PropertyValueType::Unknown(tag.to_string()),
        }
    }

    pub fn nullable(self) -> Self {
        match self {
            n @ PropertyValueType::Nullable(_) => n,
            other => PropertyValueType::Nullable(Box::new(other)),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, PropertyValueType::Nullable(_))
    }
}

/// Metadata de una propiedad de un elemento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementPropertyMetaData {
    pub name: String,
    /// `element_data_key` del elemento que produce la propiedad.
    pub element_key: String,
    pub value_type: PropertyValueType,
    pub category: String,
    pub available: bool,
    /// Propiedades de cada item cuando la propiedad es una lista de objetos.
    pub item_properties: Vec<ElementPropertyMetaData>,
    /// Evidencia que interviene en el cálculo de la propiedad.
    pub evidence_properties: Vec<String>,
    pub delay_execution: bool,
}

impl ElementPropertyMetaData {
    pub fn new(name: impl Into<String>, element_key: impl Into<String>, value_type: PropertyValueType) -> Self {
        Self { name: name.into(),
               element_key: element_key.into(),
               value_type,
               category: String::new(),
               available: true,
               item_properties: Vec::new(),
               evidence_properties: Vec::new(),
               delay_execution: false }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}
