//! Valor neutral que viaja como evidencia y como output de elementos.
//!
//! `FlowValue` reemplaza los valores dinámicos con casts en runtime por una
//! unión etiquetada con accesores tipados. Un cast fallido es un error
//! recuperable (`PipelineError::TypeMismatch`), nunca un panic.
//!
//! Orden e igualdad son totales (los `Double` se comparan con `total_cmp` y
//! los mapas por clave ordenada), lo que permite usar secuencias de valores
//! como claves de cache.

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PipelineError;

/// Valor opcional de una propiedad: o bien tiene valor, o bien explica por
/// qué no lo tiene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AspectPropertyValue {
    value: Option<FlowValue>,
    no_value_message: String,
}

impl AspectPropertyValue {
    pub const DEFAULT_NO_VALUE_MESSAGE: &'static str = "Unknown";

    pub fn with_value(value: impl Into<FlowValue>) -> Self {
        Self { value: Some(value.into()),
               no_value_message: String::new() }
    }

    pub fn no_value(message: impl Into<String>) -> Self {
        Self { value: None,
               no_value_message: message.into() }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Devuelve el valor o un error con el mensaje de ausencia.
    pub fn value(&self) -> Result<&FlowValue, PipelineError> {
        self.value
            .as_ref()
            .ok_or_else(|| PipelineError::Processing(format!("property has no value: {}", self.no_value_message)))
    }

    pub fn no_value_message(&self) -> &str {
        &self.no_value_message
    }
}

impl Default for AspectPropertyValue {
    fn default() -> Self {
        Self::no_value(Self::DEFAULT_NO_VALUE_MESSAGE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FlowValue {
    Null,
    String(String),
    Int(i64),
    Bool(bool),
    Double(f64),
    Bytes(Vec<u8>),
    List(Vec<FlowValue>),
    Map(IndexMap<String, FlowValue>),
    Aspect(Box<AspectPropertyValue>),
}

impl FlowValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FlowValue::Null => "null",
            FlowValue::String(_) => "string",
            FlowValue::Int(_) => "int",
            FlowValue::Bool(_) => "bool",
            FlowValue::Double(_) => "double",
            FlowValue::Bytes(_) => "bytes",
            FlowValue::List(_) => "list",
            FlowValue::Map(_) => "map",
            FlowValue::Aspect(_) => "aspect",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FlowValue::Null => 0,
            FlowValue::String(_) => 1,
            FlowValue::Int(_) => 2,
            FlowValue::Bool(_) => 3,
            FlowValue::Double(_) => 4,
            FlowValue::Bytes(_) => 5,
            FlowValue::List(_) => 6,
            FlowValue::Map(_) => 7,
            FlowValue::Aspect(_) => 8,
        }
    }

    fn mismatch(&self, expected: &'static str) -> PipelineError {
        PipelineError::TypeMismatch { expected,
                                      found: self.type_name() }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FlowValue::Null)
    }

    pub fn as_str(&self) -> Result<&str, PipelineError> {
        match self {
            FlowValue::String(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }

    pub fn as_i64(&self) -> Result<i64, PipelineError> {
        match self {
            FlowValue::Int(i) => Ok(*i),
            other => Err(other.mismatch("int")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, PipelineError> {
        match self {
            FlowValue::Bool(b) => Ok(*b),
            other => Err(other.mismatch("bool")),
        }
    }

    /// Los enteros se aceptan como doubles (el JSON remoto no distingue).
    pub fn as_f64(&self) -> Result<f64, PipelineError> {
        match self {
            FlowValue::Double(d) => Ok(*d),
            FlowValue::Int(i) => Ok(*i as f64),
            other => Err(other.mismatch("double")),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8], PipelineError> {
        match self {
            FlowValue::Bytes(b) => Ok(b),
            other => Err(other.mismatch("bytes")),
        }
    }

    pub fn as_list(&self) -> Result<&[FlowValue], PipelineError> {
        match self {
            FlowValue::List(l) => Ok(l),
            other => Err(other.mismatch("list")),
        }
    }

    pub fn as_map(&self) -> Result<&IndexMap<String, FlowValue>, PipelineError> {
        match self {
            FlowValue::Map(m) => Ok(m),
            other => Err(other.mismatch("map")),
        }
    }

    pub fn as_aspect(&self) -> Result<&AspectPropertyValue, PipelineError> {
        match self {
            FlowValue::Aspect(a) => Ok(a),
            other => Err(other.mismatch("aspect")),
        }
    }

    /// Codificación canónica: etiqueta de tipo + contenido, mapas ordenados
    /// por clave. Dos valores iguales producen los mismos bytes.
    pub fn write_canonical(&self, out: &mut Vec<u8>) {
        out.push(self.rank());
        match self {
            FlowValue::Null => {}
            FlowValue::String(s) => write_len_prefixed(out, s.as_bytes()),
            FlowValue::Int(i) => out.extend_from_slice(&i.to_le_bytes()),
            FlowValue::Bool(b) => out.push(u8::from(*b)),
            FlowValue::Double(d) => out.extend_from_slice(&d.to_bits().to_le_bytes()),
            FlowValue::Bytes(b) => write_len_prefixed(out, b),
            FlowValue::List(items) => {
                out.extend_from_slice(&(items.len() as u64).to_le_bytes());
                for item in items {
                    item.write_canonical(out);
                }
            }
            FlowValue::Map(map) => {
                out.extend_from_slice(&(map.len() as u64).to_le_bytes());
                for (k, v) in sorted_entries(map) {
                    write_len_prefixed(out, k.as_bytes());
                    v.write_canonical(out);
                }
            }
            FlowValue::Aspect(a) => {
                match &a.value {
                    Some(v) => {
                        out.push(1);
                        v.write_canonical(out);
                    }
                    None => out.push(0),
                }
                write_len_prefixed(out, a.no_value_message.as_bytes());
            }
        }
    }

    /// Convierte a JSON (para diagnóstico o serialización de outputs).
    pub fn to_json(&self) -> Value {
        match self {
            FlowValue::Null => Value::Null,
            FlowValue::String(s) => Value::String(s.clone()),
            FlowValue::Int(i) => Value::from(*i),
            FlowValue::Bool(b) => Value::Bool(*b),
            FlowValue::Double(d) => serde_json::Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null),
            FlowValue::Bytes(b) => Value::Array(b.iter().map(|x| Value::from(*x)).collect()),
            FlowValue::List(items) => Value::Array(items.iter().map(FlowValue::to_json).collect()),
            FlowValue::Map(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            FlowValue::Aspect(a) => match &a.value {
                Some(v) => v.to_json(),
                None => Value::Null,
            },
        }
    }
}

fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn sorted_entries(map: &IndexMap<String, FlowValue>) -> Vec<(&String, &FlowValue)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

impl Ord for FlowValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FlowValue::Null, FlowValue::Null) => Ordering::Equal,
            (FlowValue::String(a), FlowValue::String(b)) => a.cmp(b),
            (FlowValue::Int(a), FlowValue::Int(b)) => a.cmp(b),
            (FlowValue::Bool(a), FlowValue::Bool(b)) => a.cmp(b),
            (FlowValue::Double(a), FlowValue::Double(b)) => a.total_cmp(b),
            (FlowValue::Bytes(a), FlowValue::Bytes(b)) => a.cmp(b),
            (FlowValue::List(a), FlowValue::List(b)) => a.cmp(b),
            (FlowValue::Map(a), FlowValue::Map(b)) => sorted_entries(a).cmp(&sorted_entries(b)),
            (FlowValue::Aspect(a), FlowValue::Aspect(b)) => {
                a.value.cmp(&b.value).then_with(|| a.no_value_message.cmp(&b.no_value_message))
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for FlowValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for FlowValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FlowValue {}

impl fmt::Display for FlowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowValue::Null => Ok(()),
            FlowValue::String(s) => f.write_str(s),
            FlowValue::Int(i) => write!(f, "{i}"),
            FlowValue::Bool(b) => write!(f, "{b}"),
            FlowValue::Double(d) => write!(f, "{d}"),
            FlowValue::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            FlowValue::Aspect(a) => match &a.value {
                Some(v) => v.fmt(f),
                None => f.write_str(&a.no_value_message),
            },
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&Value> for FlowValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => FlowValue::Null,
            Value::Bool(b) => FlowValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FlowValue::Int(i),
                None => FlowValue::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FlowValue::String(s.clone()),
            Value::Array(items) => FlowValue::List(items.iter().map(FlowValue::from).collect()),
            Value::Object(map) => FlowValue::Map(map.iter().map(|(k, v)| (k.clone(), FlowValue::from(v))).collect()),
        }
    }
}

impl From<Value> for FlowValue {
    fn from(value: Value) -> Self {
        FlowValue::from(&value)
    }
}

impl From<&str> for FlowValue {
    fn from(v: &str) -> Self {
        FlowValue::String(v.to_string())
    }
}

impl From<String> for FlowValue {
    fn from(v: String) -> Self {
        FlowValue::String(v)
    }
}

impl From<i64> for FlowValue {
    fn from(v: i64) -> Self {
        FlowValue::Int(v)
    }
}

impl From<i32> for FlowValue {
    fn from(v: i32) -> Self {
        FlowValue::Int(v.into())
    }
}

impl From<bool> for FlowValue {
    fn from(v: bool) -> Self {
        FlowValue::Bool(v)
    }
}

impl From<f64> for FlowValue {
    fn from(v: f64) -> Self {
        FlowValue::Double(v)
    }
}

impl From<Vec<u8>> for FlowValue {
    fn from(v: Vec<u8>) -> Self {
        FlowValue::Bytes(v)
    }
}

impl From<Vec<FlowValue>> for FlowValue {
    fn from(v: Vec<FlowValue>) -> Self {
        FlowValue::List(v)
    }
}

impl From<IndexMap<String, FlowValue>> for FlowValue {
    fn from(v: IndexMap<String, FlowValue>) -> Self {
        FlowValue::Map(v)
    }
}

impl From<AspectPropertyValue> for FlowValue {
    fn from(v: AspectPropertyValue) -> Self {
        FlowValue::Aspect(Box::new(v))
    }
}

// Accesores tipados por `TryFrom`, usados por `get_as::<T>()`.
macro_rules! try_from_value {
    ($ty:ty, $variant:ident, $expected:literal) => {
        impl TryFrom<FlowValue> for $ty {
            type Error = PipelineError;
            fn try_from(value: FlowValue) -> Result<Self, Self::Error> {
                match value {
                    FlowValue::$variant(v) => Ok(v),
                    other => Err(other.mismatch($expected)),
                }
            }
        }
    };
}

try_from_value!(String, String, "string");
try_from_value!(i64, Int, "int");
try_from_value!(bool, Bool, "bool");
try_from_value!(Vec<u8>, Bytes, "bytes");
try_from_value!(Vec<FlowValue>, List, "list");
try_from_value!(IndexMap<String, FlowValue>, Map, "map");

impl TryFrom<FlowValue> for f64 {
    type Error = PipelineError;
    fn try_from(value: FlowValue) -> Result<Self, Self::Error> {
        value.as_f64()
    }
}

impl TryFrom<FlowValue> for AspectPropertyValue {
    type Error = PipelineError;
    fn try_from(value: FlowValue) -> Result<Self, Self::Error> {
        match value {
            FlowValue::Aspect(a) => Ok(*a),
            other => Err(other.mismatch("aspect")),
        }
    }
}
