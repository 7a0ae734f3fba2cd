//! Configuración del binario.
//! Carga `.env` una sola vez y lee las variables `RESPI_*`; todo tiene un
//! default salvo el timeout por run key.
use std::env;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use once_cell::sync::Lazy;
use respi_core::batch::{EngineSpec, WorkerCommand};
use respi_core::errors::{BatchError, EventStoreError, StoreError};
use respi_core::{FsArtifactStore, JsonlEventStore};
use respi_stages::JsonDirSource;
use thiserror::Error;

static DOTENV: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}")]
    Invalid { var: String, value: String },
}

fn invalid(var: &str, value: &str) -> ConfigError {
    ConfigError::Invalid { var: var.to_string(),
                           value: value.to_string() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RespiConfig {
    /// Raíz del store de artifacts.
    pub precompute_dir: PathBuf,
    /// Grabaciones y cuestionarios en JSON.
    pub data_dir: PathBuf,
    /// Selector de engine por defecto (`loop`, `thread`, `process`).
    pub engine: String,
    pub workers: usize,
    pub key_timeout: Option<Duration>,
    pub event_log: PathBuf,
}

impl RespiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Lazy::force(&DOTENV);
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Como `from_env` pero leyendo de `lookup` (tests, configuración embebida).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let precompute_dir = PathBuf::from(lookup("RESPI_PRECOMPUTE_DIR").unwrap_or_else(|| "./precompute".into()));
        let data_dir = PathBuf::from(lookup("RESPI_DATA_DIR").unwrap_or_else(|| "./data".into()));
        let engine = lookup("RESPI_ENGINE").unwrap_or_else(|| "loop".into());
        let workers = match lookup("RESPI_WORKERS") {
            Some(raw) => parse_workers("RESPI_WORKERS", &raw)?,
            None => thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        };
        let key_timeout = lookup("RESPI_KEY_TIMEOUT_SECS").map(|raw| parse_timeout("RESPI_KEY_TIMEOUT_SECS", &raw))
                                                          .transpose()?;
        let event_log = lookup("RESPI_EVENT_LOG").map(PathBuf::from)
                                                 .unwrap_or_else(|| precompute_dir.join("batches.jsonl"));
        Ok(Self { precompute_dir,
                  data_dir,
                  engine,
                  workers,
                  key_timeout,
                  event_log })
    }

    pub fn open_store(&self) -> Result<FsArtifactStore, StoreError> {
        FsArtifactStore::open(&self.precompute_dir)
    }

    pub fn open_events(&self) -> Result<JsonlEventStore, EventStoreError> {
        JsonlEventStore::open(&self.event_log)
    }

    pub fn source(&self) -> JsonDirSource {
        JsonDirSource::new(&self.data_dir)
    }

    /// Engine efectivo: el selector y workers pedidos o los configurados. El
    /// engine de procesos relanza este mismo ejecutable como worker.
    pub fn engine_spec(&self, selector: Option<&str>, workers: Option<usize>) -> Result<EngineSpec, BatchError> {
        let selector = selector.unwrap_or(&self.engine);
        let worker = match selector.trim().to_ascii_lowercase().as_str() {
            "process" | "processes" => Some(WorkerCommand::current_exe()?),
            _ => None,
        };
        EngineSpec::parse(selector, workers.unwrap_or(self.workers), worker)
    }
}

pub fn parse_workers(var: &str, raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(var, raw)),
    }
}

pub fn parse_timeout(var: &str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<f64>() {
        Ok(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs).map_err(|_| invalid(var, raw)),
        _ => Err(invalid(var, raw)),
    }
}
