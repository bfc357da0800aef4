//! Registro de los builders cloud en un `ElementRegistry`.
//!
//! Parámetros aceptados:
//! - `CloudRequestEngine`: `Endpoint`, `ResourceKey`, `LicenseKey`,
//!   `CloudRequestOrigin`, `TimeoutMs`, `CacheSize`.
//! - `CloudAspectEngine`: `ElementDataKey`, `LazyLoadingTimeoutMs`.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use aspect_core::pipeline::{param_str, param_u64};
use aspect_core::{BuilderRegistration, ElementRegistry, FlowElement, LazyLoadingConfig, PipelineError};

use crate::aspect_engine::CloudAspectEngineBuilder;
use crate::request_engine::{CloudRequestEngine, CloudRequestEngineBuilder};
use crate::transport::HttpTransport;

pub const REQUEST_ENGINE_BUILDER: &str = "CloudRequestEngineBuilder";
pub const ASPECT_ENGINE_BUILDER: &str = "CloudAspectEngineBuilder";

/// Registra los builders con el transporte HTTP por defecto.
pub fn register_cloud_builders(registry: &mut ElementRegistry) {
    register(registry, None);
}

/// Igual que `register_cloud_builders` pero todas las peticiones pasan por
/// `transport`.
pub fn register_cloud_builders_with(registry: &mut ElementRegistry, transport: Arc<dyn HttpTransport>) {
    register(registry, Some(transport));
}

// Los builders son fluidos (consumen `self`); el setter lo toma prestado.
fn update<B: Default>(builder: &mut B, f: impl FnOnce(B) -> B) {
    *builder = f(mem::take(builder));
}

fn register(registry: &mut ElementRegistry, transport: Option<Arc<dyn HttpTransport>>) {
    let create_request = move || match &transport {
        Some(t) => CloudRequestEngine::builder().transport(t.clone()),
        None => CloudRequestEngine::builder(),
    };
    let request = BuilderRegistration::new(create_request, |b: CloudRequestEngineBuilder| {
                      Ok(Arc::new(b.build()?) as Arc<dyn FlowElement>)
                  }).setter("Endpoint", |b, v| {
                        let endpoint = param_str(v)?;
                        update(b, |b| b.endpoint(endpoint));
                        Ok(())
                    })
                    .setter("ResourceKey", |b, v| {
                        let key = param_str(v)?;
                        update(b, |b| b.resource_key(key));
                        Ok(())
                    })
                    .setter("LicenseKey", |b, v| {
                        let key = param_str(v)?;
                        update(b, |b| b.license_key(key));
                        Ok(())
                    })
                    .setter("CloudRequestOrigin", |b, v| {
                        let origin = param_str(v)?;
                        update(b, |b| b.cloud_request_origin(origin));
                        Ok(())
                    })
                    .setter("TimeoutMs", |b, v| {
                        let timeout = Duration::from_millis(param_u64(v)?);
                        update(b, |b| b.timeout(timeout));
                        Ok(())
                    })
                    .setter("CacheSize", |b, v| {
                        let size = usize::try_from(param_u64(v)?).map_err(|e| PipelineError::Configuration(e.to_string()))?;
                        update(b, |b| b.cache_size(size));
                        Ok(())
                    });
    registry.register(REQUEST_ENGINE_BUILDER, request);

    let aspect = BuilderRegistration::new(CloudAspectEngineBuilder::default, |b: CloudAspectEngineBuilder| {
                     Ok(Arc::new(b.build()?) as Arc<dyn FlowElement>)
                 }).setter("ElementDataKey", |b, v| {
                       let key = param_str(v)?;
                       update(b, |b| b.element_data_key(key));
                       Ok(())
                   })
                   .setter("LazyLoadingTimeoutMs", |b, v| {
                       let timeout = Duration::from_millis(param_u64(v)?);
                       update(b, |b| b.lazy_loading(LazyLoadingConfig::new(timeout)));
                       Ok(())
                   });
    registry.register(ASPECT_ENGINE_BUILDER, aspect);
}
