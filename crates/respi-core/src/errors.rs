//! Errores del core de jobs.
//!
//! Taxonomía:
//! - `StoreError`: `NotFound` es recuperable (se calcula); `Corrupt` se
//!   propaga siempre, nunca se trata como miss.
//! - `RegistryError`: errores de configuración, fatales y sin reintento.
//! - `ParamsError`: overrides que no encajan con los defaults del stage.
//! - `JobError`: lo que devuelve un `get`. Es `Clone` para que los callers
//!   coalescidos reciban exactamente el error del build que esperaron.
//! - `BatchError`: sólo errores de configuración del batch; los fallos por
//!   run key quedan registrados en el `BatchReport`.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::model::RunKey;

/// Error devuelto por una función de cómputo.
pub type ComputeFailure = Box<dyn std::error::Error + Send + Sync>;

/// Causa compartible entre callers coalescidos.
pub type SharedCause = Arc<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("artifact not found: {stage}/{identity}")]
    NotFound { stage: String, identity: String },
    #[error("corrupt artifact {stage}/{identity}: {reason}")]
    Corrupt { stage: String, identity: String, reason: String },
    #[error("store io error at {path}: {message}")]
    Io { path: String, message: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("stage '{0}' is not registered")]
    UnregisteredStage(String),
    #[error("stage '{stage}' already registered with store {existing} (requested {requested})")]
    DuplicateStage { stage: String, existing: String, requested: String },
    #[error("invalid stage name '{0}': only [A-Za-z0-9_-] allowed")]
    InvalidStageName(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("overrides must be a JSON object, got {0}")]
    NotAnObject(String),
    #[error("unknown parameter '{path}'")]
    UnknownKey { path: String },
    #[error("invalid parameters: {0}")]
    Invalid(String),
}

#[derive(Debug, Error, Clone)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("stage '{stage}': {source}")]
    Params { stage: String, source: ParamsError },
    #[error("compute failed for stage '{stage}' run_key '{run_key}' params {params}: {cause}")]
    Compute { stage: String, run_key: RunKey, params: String, cause: SharedCause },
    #[error("cyclic dependency: {}", chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },
    #[error("dependency chain deeper than {limit}: {}", chain.join(" -> "))]
    DependencyTooDeep { limit: usize, chain: Vec<String> },
}

impl JobError {
    /// Convierte el error de una función de cómputo. Los errores de
    /// configuración que la función propagó con `?` desde una dependencia
    /// (ciclos, stages sin registrar) se devuelven tal cual; el resto se
    /// envuelve en `Compute` con el contexto necesario para reproducirlo.
    pub fn from_compute_failure(stage: &str, run_key: &RunKey, params: String, failure: ComputeFailure) -> Self {
        match failure.downcast::<JobError>() {
            Ok(inner) => match *inner {
                err @ (JobError::CyclicDependency { .. } | JobError::DependencyTooDeep { .. } | JobError::Registry(_)) => err,
                other => JobError::Compute { stage: stage.to_string(),
                                             run_key: run_key.clone(),
                                             params,
                                             cause: Arc::new(other) },
            },
            Err(failure) => JobError::Compute { stage: stage.to_string(),
                                                run_key: run_key.clone(),
                                                params,
                                                cause: Arc::from(failure) },
        }
    }

    /// `true` para errores que ningún reintento puede arreglar.
    pub fn is_configuration(&self) -> bool {
        matches!(self,
                 JobError::Registry(_) | JobError::Params { .. } | JobError::CyclicDependency { .. } | JobError::DependencyTooDeep { .. })
    }
}

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("event log io error at {path}: {message}")]
    Io { path: String, message: String },
    #[error("malformed event at line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("event serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("unknown engine '{0}' (expected loop, thread or process)")]
    UnknownEngine(String),
    #[error("engine needs at least one worker")]
    InvalidWorkers,
    #[error("process engine requires a worker command")]
    MissingWorkerCommand,
    #[error("batch for stage '{0}' has no run keys")]
    EmptyRunKeys(String),
    #[error("key timeout {0}s is not a usable duration")]
    InvalidTimeout(f64),
    #[error("batch targets stage '{requested}' but job is '{job}'")]
    StageMismatch { requested: String, job: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("batch {0} not found in event log")]
    UnknownBatch(Uuid),
    #[error("batch {0} has nothing left to resume")]
    NothingToResume(Uuid),
    #[error(transparent)]
    Events(#[from] EventStoreError),
    #[error("failed to build worker pool: {0}")]
    Pool(String),
}
