//! Registry nombre de stage -> Job.
//!
//! Las funciones de cómputo encadenan dependencias por nombre a través del
//! registry (`ctx.get("psd_eeg", run_key, ..)`). Registrar de nuevo un
//! nombre con el mismo store reemplaza el job y hereda sus builds en curso;
//! con otro store es un error de configuración (dos jobs escribiendo
//! identidades iguales en sitios distintos).
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, error};
use once_cell::sync::Lazy;

use crate::errors::RegistryError;
use crate::job::Job;

static GLOBAL: Lazy<Arc<Registry>> = Lazy::new(Registry::new);

#[derive(Debug, Default)]
pub struct Registry {
    jobs: DashMap<String, Arc<Job>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registry por defecto del proceso.
    pub fn global() -> Arc<Self> {
        GLOBAL.clone()
    }

    pub fn register(self: &Arc<Self>, mut job: Job) -> Result<Arc<Job>, RegistryError> {
        let requested = job.store().location();
        // chequeo y escritura bajo el mismo lock de shard
        match self.jobs.entry(job.name().to_string()) {
            Entry::Occupied(mut slot) => {
                let existing = slot.get().store().location();
                if existing != requested {
                    let stage = slot.key().clone();
                    error!("stage '{stage}' registered twice with different stores ({existing} vs {requested})");
                    return Err(RegistryError::DuplicateStage { stage,
                                                               existing,
                                                               requested });
                }
                debug!("re-registering stage '{}'", slot.key());
                job.adopt_in_flight(slot.get());
                job.attach(self);
                let job = Arc::new(job);
                slot.insert(job.clone());
                Ok(job)
            }
            Entry::Vacant(slot) => {
                job.attach(self);
                let job = Arc::new(job);
                slot.insert(job.clone());
                Ok(job)
            }
        }
    }

    pub fn lookup(&self, stage: &str) -> Result<Arc<Job>, RegistryError> {
        self.get(stage).ok_or_else(|| RegistryError::UnregisteredStage(stage.to_string()))
    }

    pub fn get(&self, stage: &str) -> Option<Arc<Job>> {
        self.jobs.get(stage).map(|j| j.value().clone())
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.jobs.contains_key(stage)
    }

    /// Nombres registrados, ordenados.
    pub fn stage_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{GetOptions, Provenance};
    use crate::model::Artifact;
    use crate::store::{ArtifactStore, InMemoryArtifactStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn job(name: &str, store: Arc<dyn ArtifactStore>) -> Job {
        Job::from_fn(name, json!({}), store, |_, _, _| Ok(Artifact::json(json!(1)))).unwrap()
    }

    #[test]
    fn same_store_reregistration_overwrites() {
        let registry = Registry::new();
        let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
        let first = registry.register(job("maia", store.clone())).unwrap();
        let second = registry.register(job("maia", store)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&registry.lookup("maia").unwrap(), &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reregistration_keeps_builds_in_flight() {
        let registry = Registry::new();
        let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let slow = |calls: Arc<AtomicUsize>| {
            Job::from_fn("psd_eeg", json!({}), store.clone(), move |_, _, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(300));
                Ok(Artifact::json(json!(1)))
            }).unwrap()
        };
        let old = registry.register(slow(calls.clone())).unwrap();
        let building = {
            let old = old.clone();
            thread::spawn(move || old.fetch("P01_baseline", &GetOptions::new()).unwrap())
        };
        thread::sleep(Duration::from_millis(50));

        let new = registry.register(slow(calls.clone())).unwrap();
        assert!(new.shares_in_flight_with(&old));
        let waited = new.fetch("P01_baseline", &GetOptions::new()).unwrap();
        assert_eq!(building.join().unwrap().provenance, Provenance::Computed);
        assert_eq!(waited.provenance, Provenance::Coalesced);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_registrations_with_different_stores_conflict() {
        let registry = Registry::new();
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2).map(|_| {
                                        let registry = registry.clone();
                                        let barrier = barrier.clone();
                                        thread::spawn(move || {
                                            let job = job("maia", Arc::new(InMemoryArtifactStore::new()));
                                            barrier.wait();
                                            registry.register(job).is_ok()
                                        })
                                    })
                                    .collect();
        let accepted = handles.into_iter().map(|h| h.join().unwrap()).filter(|&ok| ok).count();
        assert_eq!(accepted, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_store_is_duplicate() {
        let registry = Registry::new();
        registry.register(job("maia", Arc::new(InMemoryArtifactStore::new()))).unwrap();
        let err = registry.register(job("maia", Arc::new(InMemoryArtifactStore::new()))).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateStage { ref stage, .. } if stage == "maia"));
    }

    #[test]
    fn lookup_miss() {
        let registry = Registry::new();
        assert_eq!(registry.lookup("psd_eeg").unwrap_err(), RegistryError::UnregisteredStage("psd_eeg".into()));
    }

    #[test]
    fn registered_job_resolves_its_registry() {
        let registry = Registry::new();
        let job = registry.register(job("stai_longform", Arc::new(InMemoryArtifactStore::new()))).unwrap();
        assert!(Arc::ptr_eq(&job.registry(), &registry));
        assert_eq!(registry.stage_names(), vec!["stai_longform".to_string()]);
    }
}
