use aspect_core::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Error de configuración: {0}")]
    Config(String),
    #[error("Error del pipeline: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Error en IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error de serialización: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_variant_format() {
        let err = AppError::Config("AF_CACHE_SIZE inválido".into());
        assert_eq!(err.to_string(), "Error de configuración: AF_CACHE_SIZE inválido");
    }

    #[test]
    fn test_pipeline_variant_from() {
        let err: AppError = PipelineError::Configuration("resource key is required".into()).into();
        assert_eq!(err.to_string(),
                   "Error del pipeline: configuration error: resource key is required");
    }

    #[test]
    fn test_io_variant_from() {
        let io_err = std::io::Error::other("falló IO");
        let err: AppError = io_err.into();
        assert_eq!(err.to_string(), "Error en IO: falló IO");
    }
}
