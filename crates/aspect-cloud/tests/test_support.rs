#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use aspect_cloud::transport::Header;
use aspect_cloud::{CloudAspectEngine, CloudRequestEngine, HttpResponse, HttpTransport};
use aspect_core::{AspectEngine, RemoteServiceError};
use url::Url;

pub const ENDPOINT: &str = "https://example.test/api/";
pub const RESOURCE_KEY: &str = "test-resource";

pub const EVIDENCE_KEYS: &str = r#"["header.user-agent", "query.user-agent", "query.sec-ch-ua"]"#;

pub const PRODUCTS: &str = r#"{
  "products": {
    "device": {
      "dataTier": "Lite",
      "properties": [
        { "name": "IsMobile", "type": "Boolean", "category": "Device" },
        { "name": "HardwareName", "type": "Array", "category": "Device" }
      ]
    }
  }
}"#;

pub const DEVICE_JSON: &str = r#"{
  "device": {
    "ismobile": true,
    "hardwarename": null,
    "hardwarenamenullreason": "No matching profile",
    "extra": "raw"
  }
}"#;

/// Petición registrada por `ScriptedTransport`.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub url: String,
    pub form: Vec<(String, String)>,
    pub headers: Vec<Header>,
}

impl Recorded {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.form.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transporte en memoria: responde según el último segmento de la ruta
/// (`json`, `accessibleproperties`, `evidencekeys`) y registra cada petición.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, HttpResponse>>,
    posts: Mutex<Vec<Recorded>>,
    gets: Mutex<Vec<Recorded>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transporte con las tres rutas respondiendo datos válidos.
    pub fn standard() -> Arc<Self> {
        let transport = Self::new();
        transport.respond("evidencekeys", 200, EVIDENCE_KEYS);
        transport.respond("accessibleproperties", 200, PRODUCTS);
        transport.respond("json", 200, DEVICE_JSON);
        transport
    }

    pub fn respond(&self, path: &str, status: u16, body: &str) {
        self.routes.lock().unwrap().insert(path.to_string(), HttpResponse::new(status, body));
    }

    pub fn remove(&self, path: &str) {
        self.routes.lock().unwrap().remove(path);
    }

    pub fn posts(&self) -> Vec<Recorded> {
        self.posts.lock().unwrap().clone()
    }

    pub fn gets(&self) -> Vec<Recorded> {
        self.gets.lock().unwrap().clone()
    }

    pub fn gets_to(&self, path: &str) -> usize {
        self.gets().iter().filter(|r| r.url.contains(path)).count()
    }

    fn lookup(&self, url: &Url) -> Result<HttpResponse, RemoteServiceError> {
        let segment = url.path_segments().and_then(|s| s.last()).unwrap_or_default().to_string();
        self.routes
            .lock()
            .unwrap()
            .get(&segment)
            .cloned()
            .ok_or_else(|| RemoteServiceError::new(format!("connection refused: {url}"), None, Vec::new()))
    }
}

impl HttpTransport for ScriptedTransport {
    fn post_form(&self, url: &Url, form: &[(String, String)], headers: &[Header])
                 -> Result<HttpResponse, RemoteServiceError> {
        self.posts.lock().unwrap().push(Recorded { url: url.to_string(),
                                                   form: form.to_vec(),
                                                   headers: headers.to_vec() });
        self.lookup(url)
    }

    fn get(&self, url: &Url, headers: &[Header]) -> Result<HttpResponse, RemoteServiceError> {
        self.gets.lock().unwrap().push(Recorded { url: url.to_string(),
                                                  form: Vec::new(),
                                                  headers: headers.to_vec() });
        self.lookup(url)
    }
}

pub fn request_engine(transport: &Arc<ScriptedTransport>) -> AspectEngine<CloudRequestEngine> {
    CloudRequestEngine::builder().endpoint(ENDPOINT)
                                 .resource_key(RESOURCE_KEY)
                                 .transport(transport.clone())
                                 .build()
                                 .unwrap()
}

pub fn device_engine() -> AspectEngine<CloudAspectEngine> {
    CloudAspectEngine::builder("device").build().unwrap()
}
