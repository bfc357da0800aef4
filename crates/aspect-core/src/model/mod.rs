//! Modelos neutrales (FlowValue, metadata de propiedades).

pub mod properties;
pub mod value;

pub use properties::{ElementPropertyMetaData, PropertyValueType};
pub use value::{AspectPropertyValue, FlowValue};
