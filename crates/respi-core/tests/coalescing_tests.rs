use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use respi_core::store::InMemoryArtifactStore;
use respi_core::{Artifact, GetOptions, Job, Provenance};
use serde_json::json;

fn slow_job(calls: Arc<AtomicUsize>, store: Arc<InMemoryArtifactStore>) -> Arc<Job> {
    Arc::new(Job::from_fn("psd_eeg", json!({"lowest_freq": 0.1}), store, move |_, run_key, _| {
                 calls.fetch_add(1, Ordering::SeqCst);
                 thread::sleep(Duration::from_millis(150));
                 Ok(Artifact::json(json!({"key": run_key.as_str()})))
             }).unwrap())
}

#[test]
fn concurrent_callers_share_one_build() {
    const CALLERS: usize = 8;
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(InMemoryArtifactStore::new());
    let job = slow_job(calls.clone(), store.clone());
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS).map(|_| {
                                          let job = job.clone();
                                          let barrier = barrier.clone();
                                          thread::spawn(move || {
                                              barrier.wait();
                                              job.fetch("P02_baseline", &GetOptions::new()).unwrap()
                                          })
                                      })
                                      .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.save_count(), 1);
    assert_eq!(results.iter().filter(|f| f.provenance == Provenance::Computed).count(), 1);
    assert!(results.iter().all(|f| f.artifact.payload == results[0].artifact.payload));
    assert!(results.iter().all(|f| f.identity == results[0].identity));
}

#[test]
fn distinct_identities_build_in_parallel() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(InMemoryArtifactStore::new());
    let job = slow_job(calls.clone(), store.clone());
    let handles: Vec<_> = ["P01_baseline", "P02_baseline", "P03_baseline"].into_iter()
                                                                          .map(|key| {
                                                                              let job = job.clone();
                                                                              thread::spawn(move || job.get(key, &GetOptions::new()).unwrap())
                                                                          })
                                                                          .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.len(), 3);
}

#[test]
fn panicking_build_does_not_poison_identity() {
    let store: Arc<InMemoryArtifactStore> = Arc::new(InMemoryArtifactStore::new());
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let job = Job::from_fn("maia", json!({}), store, move |_, _, _| {
                  if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                      panic!("index out of range in item table");
                  }
                  Ok(Artifact::json(json!({"noticing": 3.25})))
              }).unwrap();

    let first = catch_unwind(AssertUnwindSafe(|| job.get("P01", &GetOptions::new())));
    assert!(first.is_err());
    let second = job.fetch("P01", &GetOptions::new()).unwrap();
    assert_eq!(second.provenance, Provenance::Computed);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}
