//! `CloudAspectEngine`: toma del JSON de `CloudRequestEngine` el objeto con
//! su clave (`device`, `location`, ...) y lo convierte a valores tipados.
//!
//! Reglas de conversión:
//! - los campos `<x>nullreason` no se copian al output;
//! - propiedad declarada `Nullable`: se entrega como `AspectPropertyValue`;
//!   si el valor es `null` la razón sale de `<x>nullreason` (o "Unknown");
//! - campo sin metadata: se copia tal cual y se loguea un warning.
//!
//! La metadata se deriva una sola vez de los productos del engine de
//! petición; si no hay un producto con esta clave es un error permanente.
//! Se carga en el primer `process` o en la primera consulta de
//! `properties`, lo que ocurra antes.

use std::sync::{Arc, Weak};

use aspect_core::{AspectCompute, AspectEngine, AspectPropertyValue, ElementData, ElementPropertyMetaData,
                  EvidenceKeyFilter, EvidenceKeyFilterWhitelist, FlowData, FlowValue, LazyLoadingConfig, Pipeline,
                  PipelineError, PropertyValueType};
use indexmap::IndexMap;
use log::{info, warn};
use once_cell::sync::OnceCell;
use serde_json::{Map, Value};

use crate::metadata::find_product;
use crate::request_engine::{CloudRequestData, CloudRequestEngine, CLOUD_ELEMENT_KEY};

const NULL_REASON_SUFFIX: &str = "nullreason";

#[derive(Debug, Clone)]
struct ProductView {
    data_tier: String,
    properties: Vec<ElementPropertyMetaData>,
}

pub struct CloudAspectEngine {
    element_data_key: String,
    metadata: OnceCell<Result<ProductView, PipelineError>>,
    pipeline: OnceCell<Weak<Pipeline>>,
}

impl CloudAspectEngine {
    pub fn builder(element_data_key: impl Into<String>) -> CloudAspectEngineBuilder {
        CloudAspectEngineBuilder { element_data_key: element_data_key.into(),
                                   lazy_loading: None }
    }

    fn load_metadata(&self, upstream: &CloudRequestEngine) -> Result<&ProductView, PipelineError> {
        self.metadata
            .get_or_init(|| {
                let products = upstream.products()?;
                let product = find_product(products, &self.element_data_key).ok_or_else(|| {
                                  PipelineError::Configuration(format!("the cloud resource does not grant access to \
                                                                        '{}' properties",
                                                                       self.element_data_key))
                              })?;
                Ok(ProductView { data_tier: product.data_tier.clone(),
                                 properties: product.element_properties(&self.element_data_key) })
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Metadata ya cargada o, si el engine está en un pipeline, pedida al
    /// `CloudRequestEngine` de ese pipeline. `None` fuera de un pipeline.
    fn resolve_metadata(&self) -> Option<Result<&ProductView, PipelineError>> {
        if let Some(loaded) = self.metadata.get() {
            return Some(loaded.as_ref().map_err(Clone::clone));
        }
        let pipeline = self.pipeline.get()?.upgrade()?;
        let loaded = match pipeline.get_engine::<CloudRequestEngine>() {
            Some(upstream) => self.load_metadata(upstream.compute()),
            None => Err(self.missing_upstream()),
        };
        Some(loaded)
    }

    fn missing_upstream(&self) -> PipelineError {
        PipelineError::Configuration(format!("'{}' requires a CloudRequestEngine earlier in the pipeline",
                                             self.element_data_key))
    }
}

fn find_meta<'a>(properties: &'a [ElementPropertyMetaData], name: &str) -> Option<&'a ElementPropertyMetaData> {
    properties.iter().find(|p| p.matches(name))
}

fn null_reason(object: &Map<String, Value>, name: &str) -> String {
    let companion = format!("{name}{NULL_REASON_SUFFIX}");
    object.iter()
          .find(|(k, _)| k.eq_ignore_ascii_case(&companion))
          .and_then(|(_, v)| v.as_str())
          .unwrap_or(AspectPropertyValue::DEFAULT_NO_VALUE_MESSAGE)
          .to_string()
}

fn convert_value(value: &Value, meta: &ElementPropertyMetaData) -> FlowValue {
    match value {
        Value::Array(items) if !meta.item_properties.is_empty() => {
            FlowValue::List(items.iter()
                                 .map(|item| match item {
                                     Value::Object(inner) => {
                                         FlowValue::Map(convert_object(inner, &meta.item_properties, false))
                                     }
                                     other => FlowValue::from(other),
                                 })
                                 .collect())
        }
        other => FlowValue::from(other),
    }
}

/// Convierte un objeto JSON según su metadata.
fn convert_object(object: &Map<String, Value>,
                  properties: &[ElementPropertyMetaData],
                  warn_unknown: bool)
                  -> IndexMap<String, FlowValue> {
    let mut out = IndexMap::new();
    for (name, value) in object {
        if name.to_ascii_lowercase().ends_with(NULL_REASON_SUFFIX) {
            continue;
        }
        let converted = match find_meta(properties, name) {
            Some(meta) if meta.value_type.is_nullable() => {
                let aspect = if value.is_null() {
                    AspectPropertyValue::no_value(null_reason(object, name))
                } else {
                    AspectPropertyValue::with_value(convert_value(value, meta))
                };
                FlowValue::from(aspect)
            }
            Some(meta) => convert_value(value, meta),
            None => {
                if warn_unknown {
                    warn!("no metadata for cloud property '{name}', passing the raw value through");
                }
                FlowValue::from(value)
            }
        };
        out.insert(name.to_ascii_lowercase(), converted);
    }
    out
}

impl AspectCompute for CloudAspectEngine {
    fn element_data_key(&self) -> &str {
        &self.element_data_key
    }

    /// No consume evidencia: sus datos vienen del output `cloud`.
    fn evidence_key_filter(&self) -> Result<Arc<dyn EvidenceKeyFilter>, PipelineError> {
        Ok(Arc::new(EvidenceKeyFilterWhitelist::default()))
    }

    fn properties(&self) -> Result<Vec<ElementPropertyMetaData>, PipelineError> {
        match self.resolve_metadata() {
            Some(view) => view.map(|v| v.properties.clone()),
            None => Ok(Vec::new()),
        }
    }

    fn data_source_tier(&self) -> String {
        match self.resolve_metadata() {
            Some(Ok(view)) if !view.data_tier.is_empty() => view.data_tier.clone(),
            _ => CLOUD_ELEMENT_KEY.to_string(),
        }
    }

    fn added_to_pipeline(&self, pipeline: &Arc<Pipeline>) {
        if self.pipeline.set(Arc::downgrade(pipeline)).is_err() {
            warn!("'{}' was added to more than one pipeline, keeping the first", self.element_data_key);
        }
    }

    fn compute(&self, data: &FlowData, output: &ElementData) -> Result<(), PipelineError> {
        let pipeline = data.pipeline();
        let upstream = pipeline.get_engine::<CloudRequestEngine>()
                               .ok_or_else(|| self.missing_upstream())?;
        if !pipeline.is_after(CLOUD_ELEMENT_KEY, &self.element_data_key) {
            return Err(self.missing_upstream());
        }
        let request = match data.try_get(CLOUD_ELEMENT_KEY)? {
            Some(_) => CloudRequestData::from_flow(data)?,
            None => return Err(self.missing_upstream()),
        };
        if !request.process_started()? {
            return Err(self.missing_upstream());
        }

        let json = request.json_response()?;
        if json.trim().is_empty() {
            info!("flow {}: '{}' skipped, the cloud request returned no data",
                  data.id(),
                  self.element_data_key);
            return Ok(());
        }

        let view = self.load_metadata(upstream.compute())?;
        let root: Value = serde_json::from_str(&json).map_err(|e| {
                                                         PipelineError::Processing(format!("cloud response is not \
                                                                                            valid JSON: {e}"))
                                                     })?;
        let object = root.as_object()
                         .and_then(|o| o.iter().find(|(k, _)| k.eq_ignore_ascii_case(&self.element_data_key)))
                         .and_then(|(_, v)| v.as_object());
        let Some(object) = object else {
            warn!("flow {}: cloud response has no '{}' section", data.id(), self.element_data_key);
            return Ok(());
        };

        for (name, value) in convert_object(object, &view.properties, true) {
            output.set(&name, value);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CloudAspectEngineBuilder {
    element_data_key: String,
    lazy_loading: Option<LazyLoadingConfig>,
}

impl CloudAspectEngineBuilder {
    pub fn element_data_key(mut self, key: impl Into<String>) -> Self {
        self.element_data_key = key.into();
        self
    }

    pub fn lazy_loading(mut self, config: LazyLoadingConfig) -> Self {
        self.lazy_loading = Some(config);
        self
    }

    pub fn build(self) -> Result<AspectEngine<CloudAspectEngine>, PipelineError> {
        let key = self.element_data_key.trim().to_ascii_lowercase();
        if key.is_empty() || key == CLOUD_ELEMENT_KEY {
            return Err(PipelineError::Configuration(format!("invalid element data key '{}' for a cloud aspect engine",
                                                            self.element_data_key)));
        }
        let compute = CloudAspectEngine { element_data_key: key,
                                          metadata: OnceCell::new(),
                                          pipeline: OnceCell::new() };
        let mut builder = AspectEngine::builder(compute);
        if let Some(config) = self.lazy_loading {
            builder = builder.lazy_loading(config);
        }
        Ok(builder.build())
    }
}
