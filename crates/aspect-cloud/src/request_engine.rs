//! `CloudRequestEngine`: envía la evidencia al servicio remoto y deja el JSON
//! crudo en su output (`cloud`).
//!
//! Por petición:
//! 1. Marca `process_started` y deja `json_response` vacío.
//! 2. Arma el formulario (ver `form`) y hace el POST a `<endpoint>json`.
//! 3. Valida la respuesta (ver `response`) y guarda el texto.
//!
//! Si algo falla, `json_response` queda vacío y el error sube al pipeline;
//! los `CloudAspectEngine` posteriores lo ven y no hacen nada.
//!
//! La metadata (productos y claves de evidencia) se pide una sola vez:
//! - productos: el resultado, éxito o fallo, queda fijo para toda la vida del
//!   engine;
//! - claves de evidencia: sólo se guarda un éxito; un fallo se reintenta en el
//!   siguiente uso. El filtro que se arma con ellas sigue la misma regla.

use std::sync::Arc;
use std::time::Duration;

use aspect_core::{AspectCompute, AspectEngine, AspectEngineBuilder, ElementData, ElementPropertyMetaData,
                  EvidenceKeyFilter, EvidenceKeyFilterWhitelist, FlowData, LazyLoadingConfig, PipelineError,
                  PropertyValueType};
use indexmap::IndexMap;
use log::{debug, info};
use once_cell::sync::OnceCell;
use url::Url;

use crate::form::build_form;
use crate::metadata::{LicensedProducts, ProductMetaData};
use crate::response::{parse_body, validate_response};
use crate::transport::{Header, HttpTransport, ReqwestTransport};

pub const CLOUD_ELEMENT_KEY: &str = "cloud";
pub const JSON_RESPONSE: &str = "json_response";
pub const PROCESS_STARTED: &str = "process_started";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100_000);

const DATA_PATH: &str = "json";
const PROPERTIES_PATH: &str = "accessibleproperties";
const EVIDENCE_KEYS_PATH: &str = "evidencekeys";

pub struct CloudRequestEngine {
    data_endpoint: Url,
    properties_endpoint: Url,
    evidence_keys_endpoint: Url,
    resource_key: String,
    license_key: Option<String>,
    origin: Option<String>,
    transport: Arc<dyn HttpTransport>,
    products: OnceCell<Result<IndexMap<String, ProductMetaData>, PipelineError>>,
    evidence_keys: OnceCell<Vec<String>>,
    filter: OnceCell<Arc<dyn EvidenceKeyFilter>>,
}

impl CloudRequestEngine {
    pub fn builder() -> CloudRequestEngineBuilder {
        CloudRequestEngineBuilder::default()
    }

    pub fn data_endpoint(&self) -> &Url {
        &self.data_endpoint
    }

    fn headers(&self) -> Vec<Header> {
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if let Some(origin) = &self.origin {
            headers.push(("Origin".to_string(), origin.clone()));
        }
        headers
    }

    /// Productos accesibles con la credencial, por nombre.
    pub fn products(&self) -> Result<&IndexMap<String, ProductMetaData>, PipelineError> {
        self.products
            .get_or_init(|| self.fetch_products())
            .as_ref()
            .map_err(Clone::clone)
    }

    fn fetch_products(&self) -> Result<IndexMap<String, ProductMetaData>, PipelineError> {
        debug!("fetching accessible properties from {}", self.properties_endpoint);
        let response = self.transport.get(&self.properties_endpoint, &self.headers())?;
        validate_response(&self.properties_endpoint, &response)?;
        let parsed: LicensedProducts = parse_body(&self.properties_endpoint, &response)?;
        info!("cloud resource grants {} product(s): {}",
              parsed.products.len(),
              parsed.products.keys().cloned().collect::<Vec<_>>().join(", "));
        Ok(parsed.products)
    }

    /// Claves de evidencia que acepta el servicio.
    pub fn evidence_keys(&self) -> Result<&[String], PipelineError> {
        self.evidence_keys
            .get_or_try_init(|| {
                debug!("fetching evidence keys from {}", self.evidence_keys_endpoint);
                let response = self.transport.get(&self.evidence_keys_endpoint, &self.headers())?;
                parse_body::<Vec<String>>(&self.evidence_keys_endpoint, &response)
            })
            .map(Vec::as_slice)
    }
}

impl AspectCompute for CloudRequestEngine {
    fn element_data_key(&self) -> &str {
        CLOUD_ELEMENT_KEY
    }

    fn evidence_key_filter(&self) -> Result<Arc<dyn EvidenceKeyFilter>, PipelineError> {
        self.filter
            .get_or_try_init(|| {
                let filter: Arc<dyn EvidenceKeyFilter> = Arc::new(EvidenceKeyFilterWhitelist::new(self.evidence_keys()?));
                Ok::<_, PipelineError>(filter)
            })
            .cloned()
    }

    fn properties(&self) -> Result<Vec<ElementPropertyMetaData>, PipelineError> {
        Ok(vec![ElementPropertyMetaData::new(JSON_RESPONSE, CLOUD_ELEMENT_KEY, PropertyValueType::String),
                ElementPropertyMetaData::new(PROCESS_STARTED, CLOUD_ELEMENT_KEY, PropertyValueType::Bool),])
    }

    fn data_source_tier(&self) -> String {
        CLOUD_ELEMENT_KEY.to_string()
    }

    fn compute(&self, data: &FlowData, output: &ElementData) -> Result<(), PipelineError> {
        output.set(JSON_RESPONSE, "");
        output.set(PROCESS_STARTED, true);

        let form = build_form(&data.evidence(), &self.resource_key, self.license_key.as_deref());
        debug!("flow {}: posting {} field(s) to {}", data.id(), form.fields.len(), self.data_endpoint);
        let response = self.transport.post_form(&self.data_endpoint, &form.pairs(), &self.headers())?;
        let json = validate_response(&self.data_endpoint, &response)?;
        output.set(JSON_RESPONSE, json);
        Ok(())
    }
}

/// Vista tipada del output `cloud`.
#[derive(Debug, Clone)]
pub struct CloudRequestData {
    data: Arc<ElementData>,
}

impl CloudRequestData {
    pub fn from_flow(data: &FlowData) -> Result<Self, PipelineError> {
        Ok(Self { data: data.get(CLOUD_ELEMENT_KEY)? })
    }

    pub fn json_response(&self) -> Result<String, PipelineError> {
        Ok(self.data
               .try_get(JSON_RESPONSE)?
               .map(|v| v.to_string())
               .unwrap_or_default())
    }

    pub fn process_started(&self) -> Result<bool, PipelineError> {
        match self.data.try_get(PROCESS_STARTED)? {
            Some(v) => v.as_bool(),
            None => Ok(false),
        }
    }
}

/// Builder de `CloudRequestEngine`; `endpoint` y `resource_key` son
/// obligatorios.
#[derive(Debug, Clone)]
pub struct CloudRequestEngineBuilder {
    endpoint: Option<String>,
    resource_key: Option<String>,
    license_key: Option<String>,
    origin: Option<String>,
    timeout: Duration,
    transport: Option<Arc<dyn HttpTransport>>,
    cache_size: usize,
    lazy_loading: Option<LazyLoadingConfig>,
}

impl Default for CloudRequestEngineBuilder {
    fn default() -> Self {
        Self { endpoint: None,
               resource_key: None,
               license_key: None,
               origin: None,
               timeout: DEFAULT_TIMEOUT,
               transport: None,
               cache_size: 0,
               lazy_loading: None }
    }
}

impl CloudRequestEngineBuilder {
    /// URL base del servicio; las rutas `json`, `accessibleproperties` y
    /// `evidencekeys` se resuelven contra ella.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn resource_key(mut self, key: impl Into<String>) -> Self {
        self.resource_key = Some(key.into());
        self
    }

    pub fn license_key(mut self, key: impl Into<String>) -> Self {
        self.license_key = Some(key.into());
        self
    }

    /// Valor del header `Origin` de cada petición.
    pub fn cloud_request_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    pub fn lazy_loading(mut self, config: LazyLoadingConfig) -> Self {
        self.lazy_loading = Some(config);
        self
    }

    pub fn build(self) -> Result<AspectEngine<CloudRequestEngine>, PipelineError> {
        let endpoint = self.endpoint
                           .filter(|e| !e.trim().is_empty())
                           .ok_or_else(|| PipelineError::Configuration("cloud endpoint is required".into()))?;
        let resource_key = self.resource_key
                               .filter(|k| !k.trim().is_empty())
                               .ok_or_else(|| PipelineError::Configuration("resource key is required".into()))?;

        // con barra final `join` agrega la ruta en vez de reemplazar el último segmento
        let base = if endpoint.ends_with('/') { endpoint } else { format!("{endpoint}/") };
        let base = Url::parse(&base).map_err(|e| PipelineError::Configuration(format!("invalid cloud endpoint '{base}': {e}")))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| PipelineError::Configuration(format!("invalid cloud endpoint '{base}': {e}")))
        };
        let data_endpoint = join(DATA_PATH)?;
        let mut properties_endpoint = join(PROPERTIES_PATH)?;
        properties_endpoint.query_pairs_mut().append_pair("resource", &resource_key);
        let evidence_keys_endpoint = join(EVIDENCE_KEYS_PATH)?;

        let transport = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new(self.timeout)?),
        };

        let engine = CloudRequestEngine { data_endpoint,
                                          properties_endpoint,
                                          evidence_keys_endpoint,
                                          resource_key,
                                          license_key: self.license_key.filter(|k| !k.is_empty()),
                                          origin: self.origin.filter(|o| !o.is_empty()),
                                          transport,
                                          products: OnceCell::new(),
                                          evidence_keys: OnceCell::new(),
                                          filter: OnceCell::new() };

        let mut builder: AspectEngineBuilder<CloudRequestEngine> = AspectEngine::builder(engine).cache_size(self.cache_size);
        if let Some(config) = self.lazy_loading {
            builder = builder.lazy_loading(config);
        }
        Ok(builder.build())
    }
}
