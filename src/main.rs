//! Binario de demostración.
//!
//! Uso: `aspectflow header.user-agent="Mozilla/5.0 ..." query.sec-ch-ua=...`
//!
//! Arma el pipeline desde el entorno (`AF_*`), agrega sólo la evidencia que
//! el pipeline acepta, procesa e imprime cada output como JSON.

use std::env;
use std::io::{self, Write};
use std::process::ExitCode;

use aspectflow_rust::{build_pipeline, AppConfig, AppError};
use log::{error, warn};
use serde_json::{Map, Value};

fn parse_evidence<I>(args: I) -> Result<Vec<(String, String)>, AppError>
    where I: IntoIterator<Item = String>
{
    args.into_iter()
        .map(|arg| match arg.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
            _ => Err(AppError::Config(format!("argumento inválido '{arg}', se espera clave=valor"))),
        })
        .collect()
}

/// Escribe los outputs como JSON legible; un fallo de escritura es `Io`.
fn write_outputs<W: Write>(out: &mut W, outputs: &Value) -> Result<(), AppError> {
    writeln!(out, "{}", serde_json::to_string_pretty(outputs)?)?;
    out.flush()?;
    Ok(())
}

fn run() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let pipeline = build_pipeline(&config)?;
    let filter = pipeline.evidence_key_filter()?;

    let data = pipeline.create_flow_data();
    for (key, value) in parse_evidence(env::args().skip(1))? {
        if filter.include(&key) {
            data.add_evidence(key, value);
        } else {
            warn!("evidence '{key}' is not used by the pipeline");
        }
    }
    let outcome = data.process();

    let mut outputs = Map::new();
    for key in pipeline.element_keys() {
        if let Some(output) = data.try_get(&key)? {
            let fields: Map<String, Value> = output.as_map()?.into_iter().map(|(k, v)| (k, v.to_json())).collect();
            outputs.insert(key, Value::Object(fields));
        }
    }
    write_outputs(&mut io::stdout().lock(), &Value::Object(outputs))?;
    outcome.map_err(AppError::from)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
