use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::JobError;
use crate::job::Provenance;
use crate::model::RunKey;

/// Clasificación de un fallo por run key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Compute,
    Store,
    Params,
    /// Stage sin registrar, ciclo o cadena demasiado profunda.
    Configuration,
    TimedOut,
    Panicked,
    /// El proceso hijo terminó mal o no dejó el artifact.
    Worker,
}

impl FailureKind {
    pub fn of(err: &JobError) -> Self {
        match err {
            JobError::Compute { .. } => FailureKind::Compute,
            JobError::Store(_) => FailureKind::Store,
            JobError::Params { .. } => FailureKind::Params,
            JobError::Registry(_) | JobError::CyclicDependency { .. } | JobError::DependencyTooDeep { .. } => FailureKind::Configuration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KeyOutcome {
    Succeeded { identity: String, provenance: Provenance, elapsed_ms: u64 },
    Failed { kind: FailureKind, error: String, elapsed_ms: u64 },
}

impl KeyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, KeyOutcome::Succeeded { .. })
    }

    pub fn elapsed_ms(&self) -> u64 {
        match self {
            KeyOutcome::Succeeded { elapsed_ms, .. } | KeyOutcome::Failed { elapsed_ms, .. } => *elapsed_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub run_key: RunKey,
    pub outcome: KeyOutcome,
}

/// Resultado de un batch: una entrada por run key, en el orden pedido (no en
/// el de finalización).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub stage: String,
    pub entries: Vec<BatchEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }

    pub fn outcome(&self, run_key: &str) -> Option<&KeyOutcome> {
        self.entries.iter().find(|e| e.run_key.as_str() == run_key).map(|e| &e.outcome)
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter().filter(|e| !e.outcome.is_success())
    }

    pub fn run_keys(&self) -> Vec<&RunKey> {
        self.entries.iter().map(|e| &e.run_key).collect()
    }
}
