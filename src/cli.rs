//! Comandos del binario `respiflow`.
//!
//! - `run --stage S [--keys a,b] [--engine E] [--workers N] [--force]
//!   [--timeout SECS] [--overrides JSON]`: ejecuta un batch e imprime el
//!   reporte en JSON.
//! - `resume --batch UUID`: re-ejecuta lo que un batch no terminó.
//! - `worker --stage S --key K [--force] [--overrides JSON]`: lado hijo del
//!   engine de procesos.
//!
//! Códigos de salida: 0 ok, 1 alguna run key falló, 2 uso o configuración.
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;

use log::info;
use respi_core::errors::{BatchError, EventStoreError, JobError, StoreError};
use respi_core::{ArtifactStore, BatchReport, BatchRequest, BatchRunner, GetOptions, Registry, RunKey};
use respi_stages::stages::default_run_keys;
use respi_stages::{register_study_stages, RecordingSource};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{parse_timeout, parse_workers, ConfigError, RespiConfig};

pub const USAGE: &str = "usage:
  respiflow run --stage S [--keys a,b] [--engine loop|thread|process] [--workers N] [--force] [--timeout SECS] [--overrides JSON]
  respiflow resume --batch UUID
  respiflow worker --stage S --key K [--force] [--overrides JSON]";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Events(#[from] EventStoreError),
    #[error("cannot write output: {0}")]
    Output(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) | CliError::Config(_) | CliError::Batch(_) => 2,
            CliError::Job(e) if e.is_configuration() => 2,
            _ => 1,
        }
    }
}

/// Flags parseados a mano: `--name value` o `--switch`.
#[derive(Debug, Default)]
struct Flags {
    values: HashMap<String, String>,
    switches: HashSet<String>,
}

impl Flags {
    fn parse(args: &[String], with_value: &[&str], switches: &[&str]) -> Result<Self, CliError> {
        let mut flags = Flags::default();
        let mut i = 0;
        while i < args.len() {
            let arg = args[i].as_str();
            if switches.contains(&arg) {
                flags.switches.insert(arg.to_string());
            } else if with_value.contains(&arg) {
                i += 1;
                let value = args.get(i).ok_or_else(|| CliError::Usage(format!("{arg} needs a value")))?;
                flags.values.insert(arg.to_string(), value.clone());
            } else {
                return Err(CliError::Usage(format!("unexpected argument '{arg}'")));
            }
            i += 1;
        }
        Ok(flags)
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    fn require(&self, name: &str) -> Result<&str, CliError> {
        self.get(name).ok_or_else(|| CliError::Usage(format!("missing {name}")))
    }

    fn has(&self, name: &str) -> bool {
        self.switches.contains(name)
    }

    fn overrides(&self) -> Result<Value, CliError> {
        match self.get("--overrides") {
            Some(raw) => serde_json::from_str(raw).map_err(|e| CliError::Usage(format!("--overrides is not valid JSON: {e}"))),
            None => Ok(Value::Null),
        }
    }
}

/// Registry con los stages del estudio sobre el store y los datos
/// configurados.
pub fn study_registry(config: &RespiConfig) -> Result<Arc<Registry>, CliError> {
    let store: Arc<dyn ArtifactStore> = Arc::new(config.open_store()?);
    let source: Arc<dyn RecordingSource> = Arc::new(config.source());
    let registry = Registry::new();
    register_study_stages(&registry, store, source)?;
    Ok(registry)
}

/// Ejecuta el comando y devuelve el código de salida.
pub fn run(args: &[String], config: &RespiConfig, out: &mut impl Write) -> Result<i32, CliError> {
    let (command, rest) = args.split_first().ok_or_else(|| CliError::Usage("missing command".into()))?;
    match command.as_str() {
        "run" => run_batch(rest, config, out),
        "resume" => resume(rest, config, out),
        "worker" => worker(rest, config),
        other => Err(CliError::Usage(format!("unknown command '{other}'"))),
    }
}

fn print_report(report: &BatchReport, out: &mut impl Write) -> Result<i32, CliError> {
    let json = serde_json::to_string_pretty(report).map_err(|e| CliError::Output(e.to_string()))?;
    writeln!(out, "{json}").map_err(|e| CliError::Output(e.to_string()))?;
    Ok(if report.is_complete_success() { 0 } else { 1 })
}

fn run_batch(args: &[String], config: &RespiConfig, out: &mut impl Write) -> Result<i32, CliError> {
    let flags = Flags::parse(args,
                             &["--stage", "--keys", "--engine", "--workers", "--timeout", "--overrides"],
                             &["--force"])?;
    let stage = flags.require("--stage")?;
    let run_keys: Vec<RunKey> = match flags.get("--keys") {
        Some(list) => list.split(',').map(str::trim).filter(|k| !k.is_empty()).map(Into::into).collect(),
        None => default_run_keys(stage),
    };
    let workers = flags.get("--workers").map(|raw| parse_workers("--workers", raw)).transpose()?;
    let timeout = match flags.get("--timeout") {
        Some(raw) => Some(parse_timeout("--timeout", raw)?),
        None => config.key_timeout,
    };

    let mut request = BatchRequest::new(stage, run_keys).engine(config.engine_spec(flags.get("--engine"), workers)?)
                                                         .force_recompute(flags.has("--force"))
                                                         .overrides(flags.overrides()?);
    if let Some(limit) = timeout {
        request = request.key_timeout(limit);
    }

    let runner = BatchRunner::new(study_registry(config)?, config.open_events()?);
    info!("batch {} on {} ({} keys, engine {})",
          request.batch_id,
          request.stage,
          request.run_keys.len(),
          request.engine.label());
    let report = runner.run(&request)?;
    print_report(&report, out)
}

fn resume(args: &[String], config: &RespiConfig, out: &mut impl Write) -> Result<i32, CliError> {
    let flags = Flags::parse(args, &["--batch"], &[])?;
    let raw = flags.require("--batch")?;
    let batch_id = Uuid::parse_str(raw).map_err(|e| CliError::Usage(format!("invalid batch id '{raw}': {e}")))?;
    let runner = BatchRunner::new(study_registry(config)?, config.open_events()?);
    let report = runner.resume(batch_id)?;
    print_report(&report, out)
}

fn worker(args: &[String], config: &RespiConfig) -> Result<i32, CliError> {
    let flags = Flags::parse(args, &["--stage", "--key", "--overrides"], &["--force"])?;
    let registry = study_registry(config)?;
    let job = registry.lookup(flags.require("--stage")?).map_err(JobError::from)?;
    let opts = GetOptions::new().force_recompute(flags.has("--force"))
                                .with_overrides(flags.overrides()?);
    let fetched = job.fetch(flags.require("--key")?, &opts)?;
    info!("worker: {} {:?}", fetched.identity.label(), fetched.provenance);
    Ok(0)
}
