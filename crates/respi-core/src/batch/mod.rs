//! Ejecución de un stage sobre un conjunto de run keys.
//!
//! Engines:
//! - `Sequential`: en orden, en el hilo del caller (referencia).
//! - `ParallelThread`: pool `rayon`; identidades repetidas coalescen en el
//!   `Job`.
//! - `ParallelProcess`: un proceso hijo por key sobre el mismo store en disco.

mod engine;
mod process;
mod report;
mod request;
mod runner;

pub use engine::{EngineSpec, WorkerCommand};
pub use report::{BatchEntry, BatchReport, FailureKind, KeyOutcome};
pub use request::BatchRequest;
pub use runner::{run_batch, BatchRunner};

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::job::Job;
    use crate::model::Artifact;
    use crate::registry::Registry;
    use crate::store::FsArtifactStore;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn fs_job(dir: &std::path::Path) -> (Arc<Registry>, Arc<Job>) {
        let store = Arc::new(FsArtifactStore::open(dir).unwrap());
        let registry = Registry::new();
        let job = registry.register(Job::from_fn("maia", json!({}), store, |_, _, _| Ok(Artifact::json(json!(1)))).unwrap())
                          .unwrap();
        (registry, job)
    }

    fn sh(script: &str) -> WorkerCommand {
        WorkerCommand::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn failing_worker_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let (_registry, job) = fs_job(dir.path());
        let engine = EngineSpec::ParallelProcess { workers: 2,
                                                   worker: sh("echo \"no recording for $4\" >&2; exit 3") };
        let report = run_batch(&job, ["P01", "P02"], engine, false).unwrap();
        assert_eq!(report.failed(), 2);
        match report.outcome("P02") {
            Some(KeyOutcome::Failed { kind: FailureKind::Worker, error, .. }) => assert!(error.contains("no recording for P02"), "{error}"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn successful_exit_without_artifact_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (_registry, job) = fs_job(dir.path());
        let report = run_batch(&job, ["P01"], EngineSpec::ParallelProcess { workers: 1, worker: sh("exit 0") }, false).unwrap();
        assert!(matches!(report.outcome("P01"), Some(KeyOutcome::Failed { kind: FailureKind::Worker, .. })));
    }

    #[test]
    fn slow_worker_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _job) = fs_job(dir.path());
        let request = BatchRequest::new("maia", ["P01"]).engine(EngineSpec::ParallelProcess { workers: 1, worker: sh("sleep 5") })
                                                          .key_timeout(Duration::from_millis(200));
        let runner = BatchRunner::new(registry, crate::event::InMemoryEventStore::new());
        let report = runner.run(&request).unwrap();
        assert!(matches!(report.outcome("P01"), Some(KeyOutcome::Failed { kind: FailureKind::TimedOut, .. })));
    }
}
