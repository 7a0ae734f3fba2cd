use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use respi_core::store::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore};
use respi_core::{Artifact, ArtifactKind, GetOptions, Job, JobError, Provenance, Registry, StoreError};
use serde_json::{json, Value};

fn resp_power_job(store: Arc<dyn ArtifactStore>, calls: Arc<AtomicUsize>) -> Job {
    Job::from_fn("resp_power",
                 json!({"resp_chan": "RespiNasale", "lowest_freq": 0.1}),
                 store,
                 move |_ctx, run_key, params| {
                     calls.fetch_add(1, Ordering::SeqCst);
                     let art = Artifact::new(ArtifactKind::Spectrum,
                                             json!({"run_key": run_key.as_str(),
                                                    "chan": params["resp_chan"],
                                                    "power": [0.5, 0.25]}));
                     Ok(art.with_attr("srate", 256.0).with_attr("units", "uV^2/Hz"))
                 }).unwrap()
}

#[test]
fn resp_power_scenario_yields_two_independent_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::open(dir.path()).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = Registry::new();
    let job = registry.register(resp_power_job(store, calls.clone())).unwrap();

    let nasal = job.fetch("P02_baseline", &GetOptions::new()).unwrap();
    assert_eq!(nasal.provenance, Provenance::Computed);
    let again = job.fetch("P02_baseline", &GetOptions::new()).unwrap();
    assert_eq!(again.provenance, Provenance::Cached);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let ventral = job.fetch("P02_baseline", &GetOptions::new().set("resp_chan", "RespiVentrale")).unwrap();
    assert_eq!(ventral.provenance, Provenance::Computed);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_ne!(nasal.identity, ventral.identity);
    assert_eq!(ventral.artifact.payload["chan"], json!("RespiVentrale"));

    // ambos artifacts conviven en disco
    assert_eq!(std::fs::read_dir(dir.path().join("resp_power")).unwrap().count(), 2);
    assert_eq!(job.defaults()["resp_chan"], json!("RespiNasale"));
}

#[test]
fn reloaded_artifact_is_self_describing() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let computed = {
        let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::open(dir.path()).unwrap());
        resp_power_job(store, calls.clone()).get("P02_baseline", &GetOptions::new()).unwrap()
    };

    // "otro proceso": store y job nuevos sobre el mismo directorio
    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::open(dir.path()).unwrap());
    let fetched = resp_power_job(store, calls.clone()).fetch("P02_baseline", &GetOptions::new()).unwrap();
    assert_eq!(fetched.provenance, Provenance::Cached);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*fetched.artifact, *computed);
    assert_eq!(fetched.artifact.attr_f64("srate"), Some(256.0));
    assert_eq!(fetched.artifact.params(), Some(&json!({"resp_chan": "RespiNasale", "lowest_freq": 0.1})));
}

#[test]
fn override_order_does_not_change_identity() {
    let job = resp_power_job(Arc::new(InMemoryArtifactStore::new()), Arc::new(AtomicUsize::new(0)));
    let a = job.identity_for("P02_baseline", &json!({"resp_chan": "RespiVentrale", "lowest_freq": 0.2})).unwrap();
    let b = job.identity_for("P02_baseline", &json!({"lowest_freq": 0.2, "resp_chan": "RespiVentrale"})).unwrap();
    assert_eq!(a, b);
    let same_as_default = job.identity_for("P02_baseline", &json!({"lowest_freq": 0.1})).unwrap();
    assert_eq!(same_as_default, job.identity_for("P02_baseline", &Value::Null).unwrap());
    let other_key = job.identity_for("P02_odor", &Value::Null).unwrap();
    assert_ne!(other_key, same_as_default);
}

#[test]
fn force_recompute_replaces_artifact() {
    let store = Arc::new(InMemoryArtifactStore::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let job = resp_power_job(store.clone(), calls.clone());
    job.get("P01_baseline", &GetOptions::new()).unwrap();
    let forced = job.fetch("P01_baseline", &GetOptions::new().force()).unwrap();
    assert_eq!(forced.provenance, Provenance::Computed);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.save_count(), 2);
    assert_eq!(store.len(), 1);
}

#[test]
fn corrupt_artifact_is_surfaced_not_recomputed() {
    let dir = tempfile::tempdir().unwrap();
    let fs_store = Arc::new(FsArtifactStore::open(dir.path()).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let job = resp_power_job(fs_store.clone(), calls.clone());
    let identity = job.identity_for("P03_music", &Value::Null).unwrap();
    job.get("P03_music", &GetOptions::new()).unwrap();

    let path = fs_store.path_for(&identity);
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 7]).unwrap();

    let err = job.get("P03_music", &GetOptions::new()).unwrap_err();
    assert!(matches!(err, JobError::Store(StoreError::Corrupt { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // un recálculo forzado repara el archivo
    job.get("P03_music", &GetOptions::new().force()).unwrap();
    assert!(job.get("P03_music", &GetOptions::new()).is_ok());
}

#[test]
fn interrupted_write_leaves_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let fs_store = Arc::new(FsArtifactStore::open(dir.path()).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let job = resp_power_job(fs_store.clone(), calls.clone());
    let identity = job.identity_for("P04_odor", &Value::Null).unwrap();

    let final_path = fs_store.path_for(&identity);
    std::fs::create_dir_all(final_path.parent().unwrap()).unwrap();
    std::fs::write(final_path.with_extension("json.tmp-deadbeef"), b"{\"format_version\":1,\"sta").unwrap();

    assert!(!job.is_cached("P04_odor", &Value::Null).unwrap());
    let fetched = job.fetch("P04_odor", &GetOptions::new()).unwrap();
    assert_eq!(fetched.provenance, Provenance::Computed);
    assert_eq!(fs_store.sweep_temp_files().unwrap(), 1);
}

#[test]
fn compute_error_carries_context_and_does_not_poison() {
    let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let job = Job::from_fn("psd_eeg", json!({"lowest_freq": 0.1}), store, move |_, _, _| {
                  if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                      Err("recording is empty".into())
                  } else {
                      Ok(Artifact::json(json!({"ok": true})))
                  }
              }).unwrap();

    let err = job.get("P05_baseline", &GetOptions::new()).unwrap_err();
    match &err {
        JobError::Compute { stage, run_key, params, cause } => {
            assert_eq!(stage, "psd_eeg");
            assert_eq!(run_key.as_str(), "P05_baseline");
            assert_eq!(params, "{\"lowest_freq\":0.1}");
            assert_eq!(cause.to_string(), "recording is empty");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(job.get("P05_baseline", &GetOptions::new()).is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}
