//! Batch runner: un job sobre muchas run keys.
//!
//! - El pedido se valida y se registra (`BatchRequested`) antes de ejecutar.
//! - Cada key corre aislada: errores, panics y timeouts quedan como
//!   `KeyOutcome::Failed` y el batch sigue.
//! - El reporte respeta el orden de las keys pedidas, sea cual sea el engine.
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Instant;

use chrono::Utc;
use log::{info, warn};
use rayon::prelude::*;
use uuid::Uuid;

use super::process::{run_in_child, KeyResult};
use super::{BatchEntry, BatchReport, BatchRequest, EngineSpec, FailureKind, KeyOutcome};
use crate::errors::{BatchError, EventStoreError};
use crate::event::{BatchEvent, BatchEventKind, EventStore, InMemoryEventStore};
use crate::job::{GetOptions, Job};
use crate::model::RunKey;
use crate::registry::Registry;
use crate::repo::BatchLedger;

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn get_isolated(job: &Job, run_key: &RunKey, opts: &GetOptions) -> KeyResult {
    match catch_unwind(AssertUnwindSafe(|| job.fetch(run_key, opts))) {
        Ok(Ok(fetched)) => Ok((fetched.identity.hash, fetched.provenance)),
        Ok(Err(e)) => Err((FailureKind::of(&e), e.to_string())),
        Err(payload) => Err((FailureKind::Panicked, format!("compute panicked: {}", panic_message(payload)))),
    }
}

/// `get` vigilado: corre en un hilo propio y se abandona al vencer el plazo.
/// El hilo abandonado sigue hasta terminar; si termina bien, su artifact
/// queda en el store como cualquier otro.
fn get_with_timeout(job: &Arc<Job>, run_key: &RunKey, opts: &GetOptions, limit: std::time::Duration) -> KeyResult {
    let (tx, rx) = mpsc::channel();
    let (job, key, opts) = (job.clone(), run_key.clone(), opts.clone());
    let spawned = thread::Builder::new().name(format!("respi-key-{key}"))
                                        .spawn(move || {
                                            let _ = tx.send(get_isolated(&job, &key, &opts));
                                        });
    if let Err(e) = spawned {
        return Err((FailureKind::Compute, format!("cannot spawn key thread: {e}")));
    }
    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!("{run_key} exceeded {:.3}s, abandoning", limit.as_secs_f64());
            Err((FailureKind::TimedOut, format!("exceeded timeout of {:.3}s", limit.as_secs_f64())))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err((FailureKind::Panicked, "key thread ended without a result".to_string())),
    }
}

pub struct BatchRunner<E: EventStore> {
    registry: Arc<Registry>,
    events: Mutex<E>,
}

impl<E: EventStore> BatchRunner<E> {
    pub fn new(registry: Arc<Registry>, events: E) -> Self {
        Self { registry,
               events: Mutex::new(events) }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn list_events(&self, batch_id: Uuid) -> Result<Vec<BatchEvent>, EventStoreError> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).list(batch_id)
    }

    pub fn ledger(&self, batch_id: Uuid) -> Result<BatchLedger, BatchError> {
        let events = self.list_events(batch_id)?;
        if events.is_empty() {
            return Err(BatchError::UnknownBatch(batch_id));
        }
        Ok(BatchLedger::replay(batch_id, &events))
    }

    pub fn into_events(self) -> E {
        self.events.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn append(&self, batch_id: Uuid, kind: BatchEventKind) -> Result<BatchEvent, EventStoreError> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).append_kind(batch_id, kind)
    }

    /// Una vez empezado el batch, un fallo del log no lo interrumpe.
    fn record(&self, batch_id: Uuid, kind: BatchEventKind) {
        if let Err(e) = self.append(batch_id, kind) {
            warn!("batch {batch_id}: could not record event: {e}");
        }
    }

    /// Ejecuta un pedido resolviendo el stage en el registry.
    pub fn run(&self, request: &BatchRequest) -> Result<BatchReport, BatchError> {
        request.validate()?;
        let job = self.registry.lookup(&request.stage)?;
        self.run_job(&job, request)
    }

    pub fn run_job(&self, job: &Arc<Job>, request: &BatchRequest) -> Result<BatchReport, BatchError> {
        if job.name() != request.stage {
            return Err(BatchError::StageMismatch { requested: request.stage.clone(),
                                                   job: job.name().to_string() });
        }
        request.validate()?;
        let batch_id = request.batch_id;
        info!("batch {batch_id}: stage={} keys={} engine={} workers={} force_recompute={}",
              request.stage,
              request.run_keys.len(),
              request.engine.label(),
              request.engine.workers(),
              request.force_recompute);
        self.append(batch_id, BatchEventKind::BatchRequested { request: request.clone() })?;

        let started_at = Utc::now();
        let opts = request.get_options();
        let entries: Vec<BatchEntry> = match &request.engine {
            EngineSpec::Sequential => request.run_keys
                                             .iter()
                                             .map(|key| self.run_key(request, key, || self.in_process(job, key, &opts, request)))
                                             .collect(),
            EngineSpec::ParallelThread { workers } => {
                let pool = self.pool(*workers)?;
                pool.install(|| {
                        request.run_keys
                               .par_iter()
                               .map(|key| self.run_key(request, key, || self.in_process(job, key, &opts, request)))
                               .collect()
                    })
            }
            EngineSpec::ParallelProcess { workers, worker } => {
                let pool = self.pool(*workers)?;
                pool.install(|| {
                        request.run_keys
                               .par_iter()
                               .map(|key| self.run_key(request, key, || run_in_child(job, worker, request, key)))
                               .collect()
                    })
            }
        };

        let report = BatchReport { batch_id,
                                   stage: request.stage.clone(),
                                   entries,
                                   started_at,
                                   finished_at: Utc::now() };
        self.record(batch_id,
                    BatchEventKind::BatchCompleted { succeeded: report.succeeded(),
                                                     failed: report.failed() });
        info!("batch {batch_id}: {} succeeded, {} failed", report.succeeded(), report.failed());
        Ok(report)
    }

    /// Re-ejecuta las keys que un batch anterior no terminó bien.
    pub fn resume(&self, batch_id: Uuid) -> Result<BatchReport, BatchError> {
        let request = self.ledger(batch_id)?.resume_request()?;
        info!("resuming batch {batch_id} as {} ({} keys)", request.batch_id, request.run_keys.len());
        self.run(&request)
    }

    fn pool(&self, workers: usize) -> Result<rayon::ThreadPool, BatchError> {
        rayon::ThreadPoolBuilder::new().num_threads(workers)
                                       .thread_name(|i| format!("respi-batch-{i}"))
                                       .build()
                                       .map_err(|e| BatchError::Pool(e.to_string()))
    }

    fn in_process(&self, job: &Arc<Job>, key: &RunKey, opts: &GetOptions, request: &BatchRequest) -> KeyResult {
        match request.timeout() {
            Some(limit) => get_with_timeout(job, key, opts, limit),
            None => get_isolated(job, key, opts),
        }
    }

    fn run_key(&self, request: &BatchRequest, key: &RunKey, exec: impl FnOnce() -> KeyResult) -> BatchEntry {
        let batch_id = request.batch_id;
        self.record(batch_id, BatchEventKind::KeyStarted { run_key: key.clone() });
        let started = Instant::now();
        let result = exec();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let outcome = match result {
            Ok((identity, provenance)) => {
                self.record(batch_id,
                            BatchEventKind::KeyFinished { run_key: key.clone(),
                                                          identity: identity.clone(),
                                                          provenance,
                                                          elapsed_ms });
                KeyOutcome::Succeeded { identity,
                                        provenance,
                                        elapsed_ms }
            }
            Err((kind, error)) => {
                warn!("batch {batch_id}: {}[{key}] failed ({kind:?}): {error}", request.stage);
                self.record(batch_id,
                            BatchEventKind::KeyFailed { run_key: key.clone(),
                                                        kind,
                                                        error: error.clone(),
                                                        elapsed_ms });
                KeyOutcome::Failed { kind,
                                     error,
                                     elapsed_ms }
            }
        };
        BatchEntry { run_key: key.clone(),
                     outcome }
    }
}

/// Atajo sin log persistente: ejecuta `job` sobre `run_keys` con el engine
/// dado.
pub fn run_batch<K: Into<RunKey>>(job: &Arc<Job>,
                                  run_keys: impl IntoIterator<Item = K>,
                                  engine: EngineSpec,
                                  force_recompute: bool)
                                  -> Result<BatchReport, BatchError> {
    let request = BatchRequest::new(job.name(), run_keys).engine(engine)
                                                         .force_recompute(force_recompute);
    BatchRunner::new(job.registry(), InMemoryEventStore::new()).run_job(job, &request)
}
