use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::BatchError;

/// Comando base para lanzar un worker del engine de procesos. Cada run key
/// se ejecuta como `<program> <args..> worker --stage S --key K [..]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(),
               args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// El ejecutable actual como worker.
    pub fn current_exe() -> Result<Self, BatchError> {
        std::env::current_exe().map(Self::new)
                               .map_err(|e| BatchError::Pool(format!("cannot locate current executable: {e}")))
    }
}

/// Estrategia de ejecución de un batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineSpec {
    /// En orden, en el hilo del caller. Semántica de referencia.
    Sequential,
    /// Pool de hilos; los jobs coalescen identidades repetidas.
    ParallelThread { workers: usize },
    /// Un proceso hijo por run key, como mucho `workers` a la vez.
    ParallelProcess { workers: usize, worker: WorkerCommand },
}

impl EngineSpec {
    /// Selector textual (`loop`, `sequential`, `thread`, `joblib`,
    /// `process`).
    pub fn parse(selector: &str, workers: usize, worker: Option<WorkerCommand>) -> Result<Self, BatchError> {
        let spec = match selector.trim().to_ascii_lowercase().as_str() {
            "loop" | "sequential" => EngineSpec::Sequential,
            "thread" | "threads" | "joblib" => EngineSpec::ParallelThread { workers },
            "process" | "processes" => {
                EngineSpec::ParallelProcess { workers,
                                              worker: worker.ok_or(BatchError::MissingWorkerCommand)? }
            }
            other => return Err(BatchError::UnknownEngine(other.to_string())),
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        match self {
            EngineSpec::Sequential => Ok(()),
            EngineSpec::ParallelThread { workers } | EngineSpec::ParallelProcess { workers, .. } => {
                if *workers == 0 {
                    Err(BatchError::InvalidWorkers)
                } else {
                    Ok(())
                }
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EngineSpec::Sequential => "loop",
            EngineSpec::ParallelThread { .. } => "thread",
            EngineSpec::ParallelProcess { .. } => "process",
        }
    }

    pub fn workers(&self) -> usize {
        match self {
            EngineSpec::Sequential => 1,
            EngineSpec::ParallelThread { workers } | EngineSpec::ParallelProcess { workers, .. } => *workers,
        }
    }
}
