//! Armado del pipeline a partir de `AppConfig`.
//!
//! La configuración se traduce a `PipelineOptions` y el `ElementRegistry`
//! construye los elementos: primero el `CloudRequestEngine`, después un
//! `CloudAspectEngine` por clave (en un bloque paralelo si hay varias).

use std::sync::Arc;

use aspect_cloud::registration::{ASPECT_ENGINE_BUILDER, REQUEST_ENGINE_BUILDER};
use aspect_cloud::{register_cloud_builders, register_cloud_builders_with, HttpTransport};
use aspect_core::{ElementOptions, ElementRegistry, Pipeline, PipelineOptions};
use log::info;

use crate::config::AppConfig;
use crate::errors::AppError;

fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

pub fn pipeline_options(config: &AppConfig) -> Result<PipelineOptions, AppError> {
    if config.aspect_keys.is_empty() {
        return Err(AppError::Config("AF_ASPECT_KEYS no define ningún aspect engine".into()));
    }

    let mut request = ElementOptions::new(REQUEST_ENGINE_BUILDER).parameter("Endpoint", config.cloud_endpoint.as_str())
                                                                 .parameter("ResourceKey", config.resource_key.as_str())
                                                                 .parameter("TimeoutMs", millis(config.timeout))
                                                                 .parameter("CacheSize", config.cache_size as u64);
    if let Some(license) = &config.license_key {
        request = request.parameter("LicenseKey", license.as_str());
    }
    if let Some(origin) = &config.cloud_origin {
        request = request.parameter("CloudRequestOrigin", origin.as_str());
    }

    let mut aspects: Vec<ElementOptions> = config.aspect_keys
                                                 .iter()
                                                 .map(|key| {
                                                     let options = ElementOptions::new(ASPECT_ENGINE_BUILDER)
                                                         .parameter("ElementDataKey", key.as_str());
                                                     match config.lazy_timeout {
                                                         Some(t) => options.parameter("LazyLoadingTimeoutMs", millis(t)),
                                                         None => options,
                                                     }
                                                 })
                                                 .collect();
    let aspects = if aspects.len() == 1 { aspects.remove(0) } else { ElementOptions::parallel(aspects) };

    Ok(PipelineOptions { elements: vec![request, aspects],
                         suppress_process_errors: config.suppress_process_errors,
                         auto_close_elements: true })
}

/// Pipeline con el transporte HTTP por defecto.
pub fn build_pipeline(config: &AppConfig) -> Result<Arc<Pipeline>, AppError> {
    let mut registry = ElementRegistry::new();
    register_cloud_builders(&mut registry);
    assemble(&registry, config)
}

/// Pipeline cuyas peticiones pasan por `transport`.
pub fn build_pipeline_with(config: &AppConfig, transport: Arc<dyn HttpTransport>) -> Result<Arc<Pipeline>, AppError> {
    let mut registry = ElementRegistry::new();
    register_cloud_builders_with(&mut registry, transport);
    assemble(&registry, config)
}

fn assemble(registry: &ElementRegistry, config: &AppConfig) -> Result<Arc<Pipeline>, AppError> {
    let options = pipeline_options(config)?;
    let pipeline = registry.build_pipeline(&options)?;
    info!("pipeline ready: {}", pipeline.element_keys().join(", "));
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(keys: &[&str]) -> AppConfig {
        AppConfig { cloud_endpoint: "https://cloud.example/api/".into(),
                    resource_key: "abc".into(),
                    license_key: None,
                    cloud_origin: Some("https://shop.example".into()),
                    timeout: Duration::from_millis(2000),
                    cache_size: 16,
                    lazy_timeout: None,
                    aspect_keys: keys.iter().map(|k| k.to_string()).collect(),
                    suppress_process_errors: false }
    }

    #[test]
    fn single_aspect_follows_the_request_engine() {
        let options = pipeline_options(&config(&["device"])).unwrap();
        assert_eq!(options.elements.len(), 2);
        assert_eq!(options.elements[0].builder_name, REQUEST_ENGINE_BUILDER);
        assert_eq!(options.elements[0].build_parameters["CloudRequestOrigin"], "https://shop.example");
        assert!(!options.elements[0].build_parameters.contains_key("LicenseKey"));
        assert_eq!(options.elements[1].build_parameters["ElementDataKey"], "device");
        assert!(options.elements[1].sub_elements.is_empty());
    }

    #[test]
    fn several_aspects_share_a_parallel_block() {
        let mut cfg = config(&["device", "location"]);
        cfg.lazy_timeout = Some(Duration::from_millis(250));
        let options = pipeline_options(&cfg).unwrap();
        let block = &options.elements[1];
        assert_eq!(block.sub_elements.len(), 2);
        assert_eq!(block.sub_elements[1].build_parameters["LazyLoadingTimeoutMs"], 250);
    }

    #[test]
    fn no_aspect_keys_is_a_configuration_error() {
        assert!(matches!(pipeline_options(&config(&[])), Err(AppError::Config(_))));
    }

    #[test]
    fn registry_builds_the_configured_elements() {
        let pipeline = build_pipeline(&config(&["device", "location"])).unwrap();
        assert_eq!(pipeline.element_keys(), vec!["cloud", "device", "location"]);
        assert!(pipeline.is_concurrent());
        assert!(pipeline.is_after("cloud", "location"));
    }
}
