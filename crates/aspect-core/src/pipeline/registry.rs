//! Registro explícito de builders de elementos.
//!
//! Cada builder se registra al arrancar con un nombre, un constructor por
//! defecto, una tabla de setters por nombre de parámetro y una función de
//! build. Con eso se arma un pipeline desde `PipelineOptions` (estructuras
//! serde; leerlas de un formato de archivo concreto queda fuera).
//!
//! Los nombres de builder se comparan sin mayúsculas y el sufijo `Builder`
//! es opcional: `CloudRequestEngineBuilder` y `cloudrequestengine` son el
//! mismo registro.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::builder::PipelineBuilder;
use super::parallel::ParallelElements;
use super::pipeline::Pipeline;
use crate::element::FlowElement;
use crate::errors::PipelineError;

const BUILDER_SUFFIX: &str = "builder";

pub type BuildParameters = Map<String, Value>;

/// Fábrica de un elemento a partir de sus parámetros.
pub type ElementFactory = Box<dyn Fn(&BuildParameters) -> Result<Arc<dyn FlowElement>, PipelineError> + Send + Sync>;

type Setter<B> = Box<dyn Fn(&mut B, &Value) -> Result<(), PipelineError> + Send + Sync>;

/// Descripción de un builder: cómo crearlo, qué parámetros acepta y cómo
/// construir el elemento.
pub struct BuilderRegistration<B> {
    create: Box<dyn Fn() -> B + Send + Sync>,
    setters: Vec<(String, Setter<B>)>,
    build: Box<dyn Fn(B) -> Result<Arc<dyn FlowElement>, PipelineError> + Send + Sync>,
}

impl<B: 'static> BuilderRegistration<B> {
    pub fn new<C, F>(create: C, build: F) -> Self
        where C: Fn() -> B + Send + Sync + 'static,
              F: Fn(B) -> Result<Arc<dyn FlowElement>, PipelineError> + Send + Sync + 'static
    {
        Self { create: Box::new(create),
               setters: Vec::new(),
               build: Box::new(build) }
    }

    /// Registra un parámetro configurable.
    pub fn setter<F>(mut self, name: &str, setter: F) -> Self
        where F: Fn(&mut B, &Value) -> Result<(), PipelineError> + Send + Sync + 'static
    {
        self.setters.push((name.to_ascii_lowercase(), Box::new(setter)));
        self
    }

    fn into_factory(self, builder_name: String) -> ElementFactory {
        Box::new(move |params: &BuildParameters| {
            let mut builder = (self.create)();
            for (name, value) in params {
                let setter = self.setters
                                 .iter()
                                 .find(|(n, _)| n.eq_ignore_ascii_case(name))
                                 .map(|(_, s)| s)
                                 .ok_or_else(|| {
                                     PipelineError::Configuration(format!("builder '{builder_name}' has no parameter '{name}'"))
                                 })?;
                setter(&mut builder, value).map_err(|e| {
                                                PipelineError::Configuration(format!("builder '{builder_name}', parameter '{name}': {e}"))
                                            })?;
            }
            (self.build)(builder)
        })
    }
}

fn normalize(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    match lower.strip_suffix(BUILDER_SUFFIX) {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => lower,
    }
}

#[derive(Default)]
pub struct ElementRegistry {
    factories: HashMap<String, ElementFactory>,
}

impl fmt::Debug for ElementRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ElementRegistry").field("builders", &names).finish()
    }
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra (o reemplaza) un builder.
    pub fn register<B: 'static>(&mut self, name: &str, registration: BuilderRegistration<B>) {
        let key = normalize(name);
        debug!("registering element builder '{key}'");
        self.factories.insert(key, registration.into_factory(name.to_string()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&normalize(name))
    }

    /// Construye un elemento; con `sub_elements` el resultado es un bloque
    /// paralelo de los hijos.
    pub fn build_element(&self, options: &ElementOptions) -> Result<Arc<dyn FlowElement>, PipelineError> {
        if !options.sub_elements.is_empty() {
            let children = options.sub_elements
                                  .iter()
                                  .map(|o| self.build_element(o))
                                  .collect::<Result<Vec<_>, _>>()?;
            return Ok(Arc::new(ParallelElements::new(children)));
        }
        let factory = self.factories
                          .get(&normalize(&options.builder_name))
                          .ok_or_else(|| {
                              PipelineError::Configuration(format!("no element builder registered as '{}'",
                                                                   options.builder_name))
                          })?;
        factory(&options.build_parameters)
    }

    /// Arma un pipeline completo a partir de su configuración declarativa.
    pub fn build_pipeline(&self, options: &PipelineOptions) -> Result<Arc<Pipeline>, PipelineError> {
        let mut builder = PipelineBuilder::new().suppress_process_errors(options.suppress_process_errors)
                                                .auto_close_elements(options.auto_close_elements);
        for element in &options.elements {
            builder = builder.add_shared(self.build_element(element)?);
        }
        builder.build()
    }
}

/// Configuración declarativa de un elemento.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementOptions {
    pub builder_name: String,
    pub build_parameters: BuildParameters,
    pub sub_elements: Vec<ElementOptions>,
}

impl ElementOptions {
    pub fn new(builder_name: impl Into<String>) -> Self {
        Self { builder_name: builder_name.into(),
               ..Self::default() }
    }

    pub fn parameter(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.build_parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn parallel(children: Vec<ElementOptions>) -> Self {
        Self { sub_elements: children,
               ..Self::default() }
    }
}

/// Configuración declarativa de un pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub elements: Vec<ElementOptions>,
    pub suppress_process_errors: bool,
    pub auto_close_elements: bool,
}

// ---------------------------------------------------------------------------
// Conversión de parámetros. Los valores de configuración llegan a menudo como
// texto, así que se aceptan también cadenas con el valor.
// ---------------------------------------------------------------------------

pub fn param_str(value: &Value) -> Result<String, PipelineError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(PipelineError::Configuration(format!("expected a string, found {other}"))),
    }
}

pub fn param_u64(value: &Value) -> Result<u64, PipelineError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| PipelineError::Configuration(format!("expected a non-negative integer, found {value}")))
}

pub fn param_bool(value: &Value) -> Result<bool, PipelineError> {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| PipelineError::Configuration(format!("expected true or false, found {value}")))
}
