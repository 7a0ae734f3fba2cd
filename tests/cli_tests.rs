use std::f64::consts::PI;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use indexmap::IndexMap;
use respiflow::respi_core::{BatchReport, KeyOutcome, Provenance};
use respiflow::respi_stages::Recording;

const SRATE: f64 = 10.0;

fn write_recording(data_dir: &Path, run_key: &str, resp_freq: f64) {
    let n = (SRATE * 620.0) as usize;
    let wave = |freq: f64, amp: f64| -> Vec<f64> { (0..n).map(|i| amp * (2.0 * PI * freq * i as f64 / SRATE).sin()).collect() };
    let rec = Recording { srate: SRATE,
                          channels: IndexMap::from([("Fz".to_string(), wave(resp_freq, 2.0)),
                                                    ("RespiNasale".to_string(), wave(resp_freq, 5.0))]) };
    fs::create_dir_all(data_dir).unwrap();
    fs::write(data_dir.join(format!("{run_key}.json")), serde_json::to_vec(&rec).unwrap()).unwrap();
}

struct Env {
    dir: tempfile::TempDir,
}

impl Env {
    fn new() -> Self {
        let env = Self { dir: tempfile::tempdir().unwrap() };
        write_recording(&env.data(), "P01_baseline", 0.25);
        write_recording(&env.data(), "P02_baseline", 0.3);
        env
    }

    fn data(&self) -> std::path::PathBuf {
        self.dir.path().join("data")
    }

    fn respiflow(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_respiflow")).args(args)
                                                     .env("RESPI_PRECOMPUTE_DIR", self.dir.path().join("precompute"))
                                                     .env("RESPI_DATA_DIR", self.data())
                                                     .env("RESPI_WORKERS", "2")
                                                     .env("RUST_LOG", "warn")
                                                     .current_dir(self.dir.path())
                                                     .output()
                                                     .unwrap()
    }
}

fn report(out: &Output) -> BatchReport {
    serde_json::from_slice(&out.stdout).unwrap_or_else(|e| {
                                           panic!("bad report ({e}): {}\nstderr: {}",
                                                  String::from_utf8_lossy(&out.stdout),
                                                  String::from_utf8_lossy(&out.stderr))
                                       })
}

fn provenance(outcome: Option<&KeyOutcome>) -> Provenance {
    match outcome {
        Some(KeyOutcome::Succeeded { provenance, .. }) => *provenance,
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn run_computes_then_serves_from_cache() {
    let env = Env::new();
    let first = env.respiflow(&["run", "--stage", "psd_eeg", "--keys", "P01_baseline,P02_baseline"]);
    assert_eq!(first.status.code(), Some(0), "{}", String::from_utf8_lossy(&first.stderr));
    let first = report(&first);
    assert_eq!(first.succeeded(), 2);
    assert_eq!(provenance(first.outcome("P01_baseline")), Provenance::Computed);

    let second = report(&env.respiflow(&["run", "--stage", "psd_eeg", "--keys", "P01_baseline,P02_baseline", "--engine", "thread"]));
    assert_eq!(provenance(second.outcome("P02_baseline")), Provenance::Cached);
    assert!(env.dir.path().join("precompute").join("psd_eeg").is_dir());
    assert!(env.dir.path().join("precompute").join("batches.jsonl").is_file());
}

#[test]
fn failed_keys_exit_one_and_resume_finishes_them() {
    let env = Env::new();
    let out = env.respiflow(&["run", "--stage", "power_at_resp", "--keys", "P01_baseline,P03_odor"]);
    assert_eq!(out.status.code(), Some(1));
    let failed = report(&out);
    assert_eq!(failed.succeeded(), 1);
    assert!(matches!(failed.outcome("P03_odor"), Some(KeyOutcome::Failed { .. })));

    write_recording(&env.data(), "P03_odor", 0.2);
    let batch_id = failed.batch_id.to_string();
    let resumed = env.respiflow(&["resume", "--batch", &batch_id]);
    assert_eq!(resumed.status.code(), Some(0), "{}", String::from_utf8_lossy(&resumed.stderr));
    let resumed = report(&resumed);
    assert_eq!(resumed.run_keys().len(), 1);
    assert_eq!(provenance(resumed.outcome("P03_odor")), Provenance::Computed);
}

#[test]
fn process_engine_delegates_to_worker_children() {
    let env = Env::new();
    let out = env.respiflow(&["run", "--stage", "power_at_resp", "--keys", "P01_baseline,P02_baseline", "--engine", "process"]);
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    let rep = report(&out);
    assert_eq!(provenance(rep.outcome("P01_baseline")), Provenance::Delegated);
    assert_eq!(provenance(rep.outcome("P02_baseline")), Provenance::Delegated);

    // Lo que calcularon los hijos quedó en el store compartido.
    let again = report(&env.respiflow(&["run", "--stage", "power_at_resp", "--keys", "P01_baseline"]));
    assert_eq!(provenance(again.outcome("P01_baseline")), Provenance::Cached);
}

#[test]
fn worker_reports_errors_on_stderr() {
    let env = Env::new();
    let ok = env.respiflow(&["worker", "--stage", "raw_signals", "--key", "P01_baseline"]);
    assert_eq!(ok.status.code(), Some(0));
    let missing = env.respiflow(&["worker", "--stage", "raw_signals", "--key", "P09_music"]);
    assert_eq!(missing.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&missing.stderr).contains("P09_music"));
}

#[test]
fn usage_and_configuration_errors_exit_two() {
    let env = Env::new();
    assert_eq!(env.respiflow(&[]).status.code(), Some(2));
    assert_eq!(env.respiflow(&["run"]).status.code(), Some(2));
    assert_eq!(env.respiflow(&["run", "--stage", "psd_eeg", "--engine", "cluster"]).status.code(), Some(2));
    assert_eq!(env.respiflow(&["run", "--stage", "no_such_stage", "--keys", "P01"]).status.code(), Some(2));
    assert_eq!(env.respiflow(&["worker", "--stage", "psd_eeg", "--key", "P01_baseline", "--overrides", "{\"nope\": 1}"]).status
                  .code(),
               Some(2));
    assert_eq!(env.respiflow(&["resume", "--batch", "not-a-uuid"]).status.code(), Some(2));
    let huge = env.respiflow(&["run", "--stage", "psd_eeg", "--keys", "P01_baseline", "--timeout", "1e30"]);
    assert_eq!(huge.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&huge.stderr).contains("--timeout"));
}
