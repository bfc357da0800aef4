//! AspectFlow Rust
//!
//! Librería de la aplicación sobre `aspect-core` y `aspect-cloud`:
//! - `config`: parámetros desde variables de entorno (`AF_*`, `.env`).
//! - `assembly`: arma el pipeline cloud con el registro de builders.
//! - `errors`: error de la aplicación.

pub mod assembly;
pub mod config;
pub mod errors;

pub use assembly::{build_pipeline, build_pipeline_with, pipeline_options};
pub use config::AppConfig;
pub use errors::AppError;
