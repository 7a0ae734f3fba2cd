//! Engine de procesos: cada run key se calcula en un proceso hijo que
//! comparte el store en disco con el padre.
//!
//! El hijo es `<program> <args..> worker --stage S --key K [--force]
//! [--overrides JSON]`. Éxito = exit status 0 y el artifact presente en el
//! store al terminar; en cualquier otro caso se devuelve stderr del hijo.
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::{BatchRequest, FailureKind, WorkerCommand};
use crate::job::{Job, Provenance};
use crate::model::RunKey;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub(crate) type KeyResult = Result<(String, Provenance), (FailureKind, String)>;

fn worker_command(worker: &WorkerCommand, request: &BatchRequest, run_key: &RunKey) -> Command {
    let mut cmd = Command::new(&worker.program);
    cmd.args(&worker.args)
       .arg("worker")
       .arg("--stage")
       .arg(&request.stage)
       .arg("--key")
       .arg(run_key.as_str());
    if request.force_recompute {
        cmd.arg("--force");
    }
    if !request.overrides.is_null() {
        cmd.arg("--overrides").arg(request.overrides.to_string());
    }
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());
    cmd
}

/// Espera al hijo; `None` si venció el plazo (el hijo queda terminado).
fn wait_with_deadline(child: &mut Child, timeout: Option<Duration>) -> std::io::Result<Option<std::process::ExitStatus>> {
    let Some(limit) = timeout else {
        return child.wait().map(Some);
    };
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if started.elapsed() >= limit {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

pub(crate) fn run_in_child(job: &Job, worker: &WorkerCommand, request: &BatchRequest, run_key: &RunKey) -> KeyResult {
    let identity = job.identity_for(run_key, &request.overrides)
                      .map_err(|e| (FailureKind::of(&e), e.to_string()))?;

    let mut child = worker_command(worker, request, run_key).spawn()
                                                            .map_err(|e| {
                                                                (FailureKind::Worker,
                                                                 format!("cannot spawn {}: {e}", worker.program.display()))
                                                            })?;
    debug!("spawned worker pid {} for {}", child.id(), identity.label());

    // stderr se drena en paralelo para que un hijo verboso no se bloquee.
    let stderr = child.stderr.take().map(|mut pipe| {
                                        thread::spawn(move || {
                                            let mut buf = String::new();
                                            let _ = pipe.read_to_string(&mut buf);
                                            buf
                                        })
                                    });
    let status = wait_with_deadline(&mut child, request.timeout());
    let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
    let stderr = stderr.trim();

    match status {
        Err(e) => Err((FailureKind::Worker, format!("waiting for worker failed: {e}"))),
        Ok(None) => {
            warn!("worker for {} killed after {:?}", identity.label(), request.timeout().unwrap_or_default());
            Err((FailureKind::TimedOut, format!("worker exceeded {:.3}s", request.key_timeout_secs.unwrap_or_default())))
        }
        Ok(Some(status)) if !status.success() => {
            let detail = if stderr.is_empty() { "no stderr output" } else { stderr };
            Err((FailureKind::Worker, format!("worker exited with {status}: {detail}")))
        }
        Ok(Some(_)) if !job.store().has(&identity) => {
            Err((FailureKind::Worker, format!("worker exited successfully but {} is not in {}", identity.label(), job.store().location())))
        }
        Ok(Some(_)) => Ok((identity.hash, Provenance::Delegated)),
    }
}
