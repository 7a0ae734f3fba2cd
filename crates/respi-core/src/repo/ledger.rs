//! Reconstrucción (`replay`) del estado de un batch a partir de sus eventos.
//!
//! Transiciones por run key: `Pending -> Running -> Succeeded | Failed`.
//! Un batch interrumpido deja keys en `Running` o `Pending`; ésas (y las
//! `Failed`) son las que `resume_request` vuelve a pedir.
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

use crate::batch::{BatchRequest, FailureKind};
use crate::errors::BatchError;
use crate::event::{BatchEvent, BatchEventKind};
use crate::job::Provenance;
use crate::model::RunKey;

#[derive(Debug, Clone, PartialEq)]
pub enum KeyStatus {
    Pending,
    Running,
    Succeeded { identity: String, provenance: Provenance },
    Failed { kind: FailureKind, error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeySlot {
    pub status: KeyStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub attempts: u32,
}

impl KeySlot {
    fn pending() -> Self {
        Self { status: KeyStatus::Pending,
               started_at: None,
               finished_at: None,
               attempts: 0 }
    }

    pub fn is_finished_ok(&self) -> bool {
        matches!(self.status, KeyStatus::Succeeded { .. })
    }
}

#[derive(Debug, Clone)]
pub struct BatchLedger {
    pub batch_id: Uuid,
    pub request: Option<BatchRequest>,
    pub keys: IndexMap<RunKey, KeySlot>,
    pub completed: bool,
}

impl BatchLedger {
    pub fn replay(batch_id: Uuid, events: &[BatchEvent]) -> Self {
        let mut ledger = Self { batch_id,
                                request: None,
                                keys: IndexMap::new(),
                                completed: false };
        for ev in events.iter().filter(|e| e.batch_id == batch_id) {
            match &ev.kind {
                BatchEventKind::BatchRequested { request } => {
                    for key in &request.run_keys {
                        ledger.keys.entry(key.clone()).or_insert_with(KeySlot::pending);
                    }
                    ledger.request = Some(request.clone());
                }
                BatchEventKind::KeyStarted { run_key } => {
                    let slot = ledger.keys.entry(run_key.clone()).or_insert_with(KeySlot::pending);
                    slot.status = KeyStatus::Running;
                    slot.started_at = Some(ev.ts);
                    slot.attempts += 1;
                }
                BatchEventKind::KeyFinished { run_key, identity, provenance, .. } => {
                    let slot = ledger.keys.entry(run_key.clone()).or_insert_with(KeySlot::pending);
                    slot.status = KeyStatus::Succeeded { identity: identity.clone(),
                                                         provenance: *provenance };
                    slot.finished_at = Some(ev.ts);
                }
                BatchEventKind::KeyFailed { run_key, kind, error, .. } => {
                    let slot = ledger.keys.entry(run_key.clone()).or_insert_with(KeySlot::pending);
                    slot.status = KeyStatus::Failed { kind: *kind,
                                                      error: error.clone() };
                    slot.finished_at = Some(ev.ts);
                }
                BatchEventKind::BatchCompleted { .. } => ledger.completed = true,
            }
        }
        ledger
    }

    pub fn status(&self, run_key: &str) -> Option<&KeyStatus> {
        self.keys.get(run_key).map(|s| &s.status)
    }

    /// Keys que no terminaron bien, en el orden original del pedido.
    pub fn unfinished_keys(&self) -> Vec<RunKey> {
        self.keys
            .iter()
            .filter(|(_, slot)| !slot.is_finished_ok())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Nuevo pedido con las keys pendientes del batch, misma configuración.
    pub fn resume_request(&self) -> Result<BatchRequest, BatchError> {
        let original = self.request.as_ref().ok_or(BatchError::UnknownBatch(self.batch_id))?;
        let pending = self.unfinished_keys();
        if pending.is_empty() {
            return Err(BatchError::NothingToResume(self.batch_id));
        }
        let mut request = BatchRequest::new(original.stage.clone(), pending);
        request.engine = original.engine.clone();
        request.force_recompute = original.force_recompute;
        request.overrides = original.overrides.clone();
        request.key_timeout_secs = original.key_timeout_secs;
        request.resumed_from = Some(self.batch_id);
        Ok(request)
    }
}
