//! Configuración de la aplicación desde variables de entorno.
//! El archivo `.env`, si existe, se carga una sola vez antes de leerlas.

use std::env;
use std::time::Duration;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::errors::AppError;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

const DEFAULT_TIMEOUT_MS: u64 = 100_000;
const DEFAULT_ASPECT_KEYS: &str = "device";

/// Parámetros del servicio remoto y del pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub cloud_endpoint: String,
    pub resource_key: String,
    pub license_key: Option<String>,
    pub cloud_origin: Option<String>,
    pub timeout: Duration,
    /// 0 desactiva la cache.
    pub cache_size: usize,
    pub lazy_timeout: Option<Duration>,
    pub aspect_keys: Vec<String>,
    pub suppress_process_errors: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Igual que `from_env` pero leyendo de `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
        where F: Fn(&str) -> Option<String>
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |name: &str| var(name).ok_or_else(|| AppError::Config(format!("{name} no definido")));
        let number = |name: &str| -> Result<Option<u64>, AppError> {
            var(name).map(|v| v.parse::<u64>().map_err(|e| AppError::Config(format!("{name} inválido ('{v}'): {e}"))))
                     .transpose()
        };

        let cache_size = number("AF_CACHE_SIZE")?.unwrap_or(0);
        let aspect_keys = var("AF_ASPECT_KEYS").unwrap_or_else(|| DEFAULT_ASPECT_KEYS.to_string())
                                               .split(',')
                                               .map(|k| k.trim().to_ascii_lowercase())
                                               .filter(|k| !k.is_empty())
                                               .collect();
        let suppress_process_errors = match var("AF_SUPPRESS_PROCESS_ERRORS").as_deref() {
            None => false,
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => true,
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => false,
            Some(v) => return Err(AppError::Config(format!("AF_SUPPRESS_PROCESS_ERRORS inválido ('{v}')"))),
        };

        Ok(Self { cloud_endpoint: required("AF_CLOUD_ENDPOINT")?,
                  resource_key: required("AF_RESOURCE_KEY")?,
                  license_key: var("AF_LICENSE_KEY"),
                  cloud_origin: var("AF_CLOUD_ORIGIN"),
                  timeout: Duration::from_millis(number("AF_CLOUD_TIMEOUT_MS")?.unwrap_or(DEFAULT_TIMEOUT_MS)),
                  cache_size: usize::try_from(cache_size).map_err(|e| AppError::Config(format!("AF_CACHE_SIZE: {e}")))?,
                  lazy_timeout: number("AF_LAZY_TIMEOUT_MS")?.map(Duration::from_millis),
                  aspect_keys,
                  suppress_process_errors })
    }
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_to_optional_variables() {
        let config = AppConfig::from_lookup(lookup(&[("AF_CLOUD_ENDPOINT", "https://cloud.example/api/"),
                                                     ("AF_RESOURCE_KEY", "abc")])).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(100_000));
        assert_eq!(config.cache_size, 0);
        assert_eq!(config.lazy_timeout, None);
        assert_eq!(config.aspect_keys, vec!["device".to_string()]);
        assert!(!config.suppress_process_errors);
        assert_eq!(config.license_key, None);
    }

    #[test]
    fn all_variables_are_read() {
        let config = AppConfig::from_lookup(lookup(&[("AF_CLOUD_ENDPOINT", "https://cloud.example/api/"),
                                                     ("AF_RESOURCE_KEY", "abc"),
                                                     ("AF_LICENSE_KEY", "lic"),
                                                     ("AF_CLOUD_ORIGIN", "https://shop.example"),
                                                     ("AF_CLOUD_TIMEOUT_MS", "2500"),
                                                     ("AF_CACHE_SIZE", "64"),
                                                     ("AF_LAZY_TIMEOUT_MS", "300"),
                                                     ("AF_ASPECT_KEYS", "Device, location,"),
                                                     ("AF_SUPPRESS_PROCESS_ERRORS", "TRUE")])).unwrap();
        assert_eq!(config.license_key.as_deref(), Some("lic"));
        assert_eq!(config.cloud_origin.as_deref(), Some("https://shop.example"));
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.cache_size, 64);
        assert_eq!(config.lazy_timeout, Some(Duration::from_millis(300)));
        assert_eq!(config.aspect_keys, vec!["device".to_string(), "location".to_string()]);
        assert!(config.suppress_process_errors);
    }

    #[test]
    fn missing_credentials_and_bad_numbers_are_errors() {
        let missing = AppConfig::from_lookup(lookup(&[("AF_CLOUD_ENDPOINT", "https://cloud.example/api/")]));
        assert!(matches!(missing, Err(AppError::Config(m)) if m.contains("AF_RESOURCE_KEY")));

        let bad = AppConfig::from_lookup(lookup(&[("AF_CLOUD_ENDPOINT", "https://cloud.example/api/"),
                                                  ("AF_RESOURCE_KEY", "abc"),
                                                  ("AF_CACHE_SIZE", "many")]));
        assert!(matches!(bad, Err(AppError::Config(m)) if m.contains("AF_CACHE_SIZE")));
    }
}
