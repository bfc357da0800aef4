//! Transporte HTTP de los elementos cloud.
//!
//! Los engines hablan con el servicio remoto a través de `HttpTransport`; la
//! implementación por defecto usa el cliente bloqueante de `reqwest` y los
//! tests inyectan una implementación en memoria.

use std::fmt::Debug;
use std::time::Duration;

use aspect_core::{PipelineError, RemoteServiceError};
use log::trace;
use reqwest::blocking::{Client, Response};
use url::Url;

pub type Header = (String, String);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<Header>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status,
               headers: Vec::new(),
               body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait HttpTransport: Send + Sync + Debug {
    /// POST con cuerpo `application/x-www-form-urlencoded`.
    fn post_form(&self, url: &Url, form: &[(String, String)], headers: &[Header])
                 -> Result<HttpResponse, RemoteServiceError>;

    fn get(&self, url: &Url, headers: &[Header]) -> Result<HttpResponse, RemoteServiceError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, PipelineError> {
        let client = Client::builder().timeout(timeout)
                                      .build()
                                      .map_err(|e| PipelineError::Configuration(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    fn read(url: &Url, response: Result<Response, reqwest::Error>) -> Result<HttpResponse, RemoteServiceError> {
        let response =
            response.map_err(|e| RemoteServiceError::new(format!("request to '{url}' failed: {e}"), None, Vec::new()))?;
        let status = response.status().as_u16();
        let headers: Vec<Header> = response.headers()
                                           .iter()
                                           .map(|(k, v)| {
                                               (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned())
                                           })
                                           .collect();
        let body = response.text().map_err(|e| {
                                      RemoteServiceError::new(format!("could not read response from '{url}': {e}"),
                                                              Some(status),
                                                              headers.clone())
                                  })?;
        trace!("{url} -> {status} ({} bytes)", body.len());
        Ok(HttpResponse { status,
                          headers,
                          body })
    }
}

impl HttpTransport for ReqwestTransport {
    fn post_form(&self, url: &Url, form: &[(String, String)], headers: &[Header])
                 -> Result<HttpResponse, RemoteServiceError> {
        let mut request = self.client.post(url.clone()).form(form);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        Self::read(url, request.send())
    }

    fn get(&self, url: &Url, headers: &[Header]) -> Result<HttpResponse, RemoteServiceError> {
        let mut request = self.client.get(url.clone());
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        Self::read(url, request.send())
    }
}
