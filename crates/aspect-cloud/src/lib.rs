//! aspect-cloud: elementos que delegan el procesamiento en un servicio remoto.
//!
//! `CloudRequestEngine` envía la evidencia y guarda el JSON crudo;
//! cada `CloudAspectEngine` posterior extrae y tipa su sección.
pub mod aspect_engine;
pub mod form;
pub mod metadata;
pub mod registration;
pub mod request_engine;
pub mod response;
pub mod transport;

pub use aspect_engine::{CloudAspectEngine, CloudAspectEngineBuilder};
pub use form::{build_form, FieldConflict, RequestForm};
pub use metadata::{LicensedProducts, ProductMetaData, PropertyMetaData};
pub use registration::{register_cloud_builders, register_cloud_builders_with};
pub use request_engine::{CloudRequestData, CloudRequestEngine, CloudRequestEngineBuilder, CLOUD_ELEMENT_KEY,
                         JSON_RESPONSE, PROCESS_STARTED};
pub use response::validate_response;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
