//! Metadata publicada por el servicio remoto.
//!
//! `GET accessibleproperties?resource=<key>` devuelve los productos a los que
//! da acceso la credencial:
//!
//! ```json
//! { "products": { "device": { "dataTier": "CloudV4Free",
//!                             "properties": [ { "name": "IsMobile", "type": "Boolean",
//!                                               "category": "Device" } ] } } }
//! ```

use aspect_core::{ElementPropertyMetaData, PropertyValueType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicensedProducts {
    #[serde(default)]
    pub products: IndexMap<String, ProductMetaData>,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMetaData {
    #[serde(default)]
    pub data_tier: String,
    #[serde(default)]
    pub properties: Vec<PropertyMetaData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyMetaData {
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_tag: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub item_properties: Vec<PropertyMetaData>,
    #[serde(default)]
    pub delay_execution: bool,
    #[serde(default)]
    pub evidence_properties: Vec<String>,
}

impl PropertyMetaData {
    /// Metadata del core. Toda propiedad remota puede venir sin valor, así que
    /// el tipo se declara `Nullable`.
    pub fn to_element_metadata(&self, element_key: &str) -> ElementPropertyMetaData {
        let mut meta = ElementPropertyMetaData::new(self.name.to_ascii_lowercase(),
                                                    element_key,
                                                    PropertyValueType::from_tag(&self.type_tag).nullable());
        meta.category = self.category.clone();
        meta.item_properties = self.item_properties
                                   .iter()
                                   .map(|p| p.to_element_metadata(element_key))
                                   .collect();
        meta.evidence_properties = self.evidence_properties.clone();
        meta.delay_execution = self.delay_execution;
        meta
    }
}

impl ProductMetaData {
    pub fn element_properties(&self, element_key: &str) -> Vec<ElementPropertyMetaData> {
        self.properties.iter().map(|p| p.to_element_metadata(element_key)).collect()
    }
}

/// Producto por nombre, sin distinguir mayúsculas.
pub fn find_product<'a>(products: &'a IndexMap<String, ProductMetaData>, name: &str) -> Option<&'a ProductMetaData> {
    products.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, p)| p)
}
