//! Tipos de evento de un batch y estructura `BatchEvent`.
//!
//! Rol:
//! - El `BatchRunner` emite eventos a un `EventStore` append-only a medida
//!   que avanza cada run key.
//! - Con ellos `BatchLedger::replay` reconstruye el estado de un batch
//!   (incluso uno interrumpido) sin estructuras mutables compartidas.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch::{BatchRequest, FailureKind};
use crate::job::Provenance;
use crate::model::RunKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEventKind {
    /// Primer evento de un `batch_id`: el pedido completo, antes de ejecutar.
    BatchRequested { request: BatchRequest },
    KeyStarted { run_key: RunKey },
    KeyFinished { run_key: RunKey, identity: String, provenance: Provenance, elapsed_ms: u64 },
    KeyFailed { run_key: RunKey, kind: FailureKind, error: String, elapsed_ms: u64 },
    BatchCompleted { succeeded: usize, failed: usize },
}

impl BatchEventKind {
    pub fn run_key(&self) -> Option<&RunKey> {
        match self {
            BatchEventKind::KeyStarted { run_key }
            | BatchEventKind::KeyFinished { run_key, .. }
            | BatchEventKind::KeyFailed { run_key, .. } => Some(run_key),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEvent {
    pub seq: u64, // orden de append dentro del batch
    pub batch_id: Uuid,
    pub kind: BatchEventKind,
    pub ts: DateTime<Utc>,
}
