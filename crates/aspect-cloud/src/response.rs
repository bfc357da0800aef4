//! Validación de respuestas del servicio remoto.
//!
//! - Cuerpo no vacío: se parsea como JSON; un fallo de parseo es un
//!   `RemoteServiceError` con status y headers.
//! - `errors: [..]` aporta mensajes; la respuesta sólo "tiene datos" si trae
//!   algo más que ese campo. `warnings: [..]` sólo se loguea.
//! - Sin mensajes ni datos: "no data in response" si el status fue 2xx, si no
//!   un mensaje con endpoint, status y cuerpo.
//! - Un mensaje -> `Remote`; varios -> `RemoteAggregate`.

use aspect_core::{PipelineError, RemoteServiceError};
use log::warn;
use serde_json::Value;
use url::Url;

use crate::transport::HttpResponse;

const ERRORS_FIELD: &str = "errors";
const WARNINGS_FIELD: &str = "warnings";

fn strings(value: Option<&Value>) -> Vec<String> {
    value.and_then(Value::as_array)
         .map(|items| {
             items.iter()
                  .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                  .collect()
         })
         .unwrap_or_default()
}

fn remote_error(message: String, response: &HttpResponse) -> RemoteServiceError {
    RemoteServiceError::new(message, Some(response.status), response.headers.clone())
}

/// Parsea el cuerpo como JSON conservando status y headers si falla.
pub fn parse_body<T>(endpoint: &Url, response: &HttpResponse) -> Result<T, PipelineError>
    where T: serde::de::DeserializeOwned
{
    serde_json::from_str(&response.body).map_err(|e| {
                                            remote_error(format!("invalid JSON in response from '{endpoint}': {e}"),
                                                         response).into()
                                        })
}

/// Valida la respuesta y devuelve el texto JSON crudo.
pub fn validate_response(endpoint: &Url, response: &HttpResponse) -> Result<String, PipelineError> {
    let mut messages = Vec::new();
    let mut has_data = false;

    if !response.body.trim().is_empty() {
        let json: Value = parse_body(endpoint, response)?;
        match &json {
            Value::Object(map) => {
                messages.extend(strings(map.get(ERRORS_FIELD)));
                for warning in strings(map.get(WARNINGS_FIELD)) {
                    warn!("'{endpoint}' returned a warning: {warning}");
                }
                let reserved = usize::from(map.contains_key(ERRORS_FIELD));
                has_data = map.len() > reserved;
            }
            Value::Array(items) => has_data = !items.is_empty(),
            Value::Null => {}
            _ => has_data = true,
        }
    }

    if messages.is_empty() && !has_data {
        messages.push(if response.is_success() {
                          format!("no data in response from '{endpoint}'")
                      } else {
                          format!("error code {} returned from '{endpoint}': {}", response.status, response.body)
                      });
    }

    match messages.len() {
        0 => Ok(response.body.clone()),
        1 => Err(remote_error(messages.remove(0), response).into()),
        _ => Err(PipelineError::RemoteAggregate(messages.into_iter()
                                                        .map(|m| remote_error(m, response))
                                                        .collect())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Url {
        Url::parse("https://example.test/api/json").unwrap()
    }

    #[test]
    fn single_error_carries_message_and_status() {
        let response = HttpResponse::new(400, r#"{"errors":["bad key"]}"#);
        match validate_response(&endpoint(), &response) {
            Err(PipelineError::Remote(e)) => {
                assert!(e.message.contains("bad key"));
                assert_eq!(e.status, Some(400));
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn empty_object_with_success_is_no_data() {
        let response = HttpResponse::new(200, "{}");
        match validate_response(&endpoint(), &response) {
            Err(PipelineError::Remote(e)) => {
                assert!(e.message.contains("no data in response"));
                assert!(e.message.contains("https://example.test/api/json"));
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn empty_body_with_failure_reports_the_status() {
        let response = HttpResponse::new(503, "");
        match validate_response(&endpoint(), &response) {
            Err(PipelineError::Remote(e)) => {
                assert!(e.message.contains("error code 503"));
                assert_eq!(e.status, Some(503));
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn several_errors_are_aggregated() {
        let response = HttpResponse::new(400, r#"{"errors":["a","b"],"device":{}}"#);
        match validate_response(&endpoint(), &response) {
            Err(PipelineError::RemoteAggregate(errors)) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[1].message, "b");
            }
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[test]
    fn invalid_json_keeps_status_and_headers() {
        let mut response = HttpResponse::new(502, "<html>");
        response.headers.push(("server".into(), "proxy".into()));
        match validate_response(&endpoint(), &response) {
            Err(PipelineError::Remote(e)) => {
                assert_eq!(e.status, Some(502));
                assert_eq!(e.headers, vec![("server".to_string(), "proxy".to_string())]);
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[test]
    fn warnings_do_not_fail() {
        let body = r#"{"device":{"ismobile":true},"warnings":["slow"]}"#;
        let response = HttpResponse::new(200, body);
        assert_eq!(validate_response(&endpoint(), &response), Ok(body.to_string()));
    }
}
