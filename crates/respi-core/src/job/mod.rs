//! Job: stage + defaults + store, con `get` memoizado.
//!
//! Flujo de `get(run_key, opts)`:
//! 1. params efectivos = defaults ⊕ overrides (merge profundo) normalizados
//!    por el stage;
//! 2. identidad = hash(stage, run_key, params);
//! 3. si ya hay un build en curso de esa identidad se espera su resultado
//!    (coalescing);
//! 4. si no: hit en el store -> load; miss (o `force_recompute`) -> compute,
//!    save, return.
//!
//! Un fallo de cómputo no guarda nada: la identidad sigue siendo un miss.

mod coalesce;
mod context;
mod stage;
mod typed;

pub use context::ComputeCtx;
pub use stage::{FnStage, StageDefinition};
pub use typed::{Typed, TypedStage};

use std::fmt;
use std::sync::{Arc, RwLock, Weak};
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use self::coalesce::{BuildSlot, LeaderGuard};
use crate::errors::{ComputeFailure, JobError, RegistryError};
use crate::model::{Artifact, ArtifactIdentity, RunKey};
use crate::params::{deep_merge, effective_params, override_at};
use crate::registry::Registry;
use crate::store::ArtifactStore;

/// Opciones de una llamada a `get`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetOptions {
    pub force_recompute: bool,
    /// Overrides sobre los defaults del stage (`Null` = ninguno).
    pub overrides: Value,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force(mut self) -> Self {
        self.force_recompute = true;
        self
    }

    pub fn force_recompute(mut self, force: bool) -> Self {
        self.force_recompute = force;
        self
    }

    /// Override de una hoja por ruta con puntos (`"psd_params.lowest_freq"`).
    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.overrides = deep_merge(&self.overrides, &override_at(path, value.into()));
        self
    }

    pub fn with_overrides(mut self, overrides: Value) -> Self {
        self.overrides = deep_merge(&self.overrides, &overrides);
        self
    }
}

/// De dónde salió el artifact devuelto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Leído del store.
    Cached,
    /// Calculado por esta llamada.
    Computed,
    /// Reutilizado de un build concurrente de la misma identidad.
    Coalesced,
    /// Calculado por otro proceso (engine de procesos).
    Delegated,
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub artifact: Arc<Artifact>,
    pub identity: ArtifactIdentity,
    pub provenance: Provenance,
}

pub struct Job {
    stage: Arc<dyn StageDefinition>,
    name: String,
    defaults: Value,
    store: Arc<dyn ArtifactStore>,
    in_flight: Arc<DashMap<String, Arc<BuildSlot>>>,
    registry: RwLock<Weak<Registry>>,
}

fn valid_stage_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl Job {
    pub fn new(stage: impl StageDefinition + 'static, store: Arc<dyn ArtifactStore>) -> Result<Self, JobError> {
        let name = stage.name().to_string();
        if !valid_stage_name(&name) {
            return Err(RegistryError::InvalidStageName(name).into());
        }
        let defaults = stage.normalize_params(stage.base_params())
                            .map_err(|source| JobError::Params { stage: name.clone(),
                                                                 source })?;
        Ok(Self { stage: Arc::new(stage),
                  name,
                  defaults,
                  store,
                  in_flight: Arc::new(DashMap::new()),
                  registry: RwLock::new(Weak::new()) })
    }

    pub fn typed<T: TypedStage + 'static>(stage: T, store: Arc<dyn ArtifactStore>) -> Result<Self, JobError> {
        Self::new(Typed(stage), store)
    }

    pub fn from_fn<F>(name: impl Into<String>, defaults: Value, store: Arc<dyn ArtifactStore>, func: F) -> Result<Self, JobError>
        where F: Fn(&ComputeCtx, &RunKey, &Value) -> Result<Artifact, ComputeFailure> + Send + Sync + 'static
    {
        Self::new(FnStage::new(name, defaults, func), store)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Defaults normalizados; nunca cambian tras crear el job.
    pub fn defaults(&self) -> &Value {
        &self.defaults
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Registry al que pertenece el job (o el global si no se registró).
    pub fn registry(&self) -> Arc<Registry> {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .upgrade()
            .unwrap_or_else(Registry::global)
    }

    pub(crate) fn attach(&self, registry: &Arc<Registry>) {
        *self.registry.write().unwrap_or_else(|e| e.into_inner()) = Arc::downgrade(registry);
    }

    /// Comparte los builds en curso de `previous`: quien siga usando el job
    /// reemplazado coalesce con quien use este.
    pub(crate) fn adopt_in_flight(&mut self, previous: &Job) {
        self.in_flight = previous.in_flight.clone();
    }

    #[cfg(test)]
    pub(crate) fn shares_in_flight_with(&self, other: &Job) -> bool {
        Arc::ptr_eq(&self.in_flight, &other.in_flight)
    }

    pub fn effective_params(&self, overrides: &Value) -> Result<Value, JobError> {
        let params_err = |source| JobError::Params { stage: self.name.clone(),
                                                     source };
        let merged = effective_params(&self.defaults, overrides).map_err(params_err)?;
        self.stage.normalize_params(merged).map_err(params_err)
    }

    pub fn identity_for(&self, run_key: impl Into<RunKey>, overrides: &Value) -> Result<ArtifactIdentity, JobError> {
        let params = self.effective_params(overrides)?;
        Ok(ArtifactIdentity::derive(&self.name, run_key.into(), params))
    }

    pub fn is_cached(&self, run_key: impl Into<RunKey>, overrides: &Value) -> Result<bool, JobError> {
        Ok(self.store.has(&self.identity_for(run_key, overrides)?))
    }

    pub fn invalidate(&self, run_key: impl Into<RunKey>, overrides: &Value) -> Result<(), JobError> {
        let identity = self.identity_for(run_key, overrides)?;
        self.store.invalidate(&identity)?;
        Ok(())
    }

    pub fn get(&self, run_key: impl Into<RunKey>, opts: &GetOptions) -> Result<Arc<Artifact>, JobError> {
        self.fetch(run_key, opts).map(|f| f.artifact)
    }

    pub fn fetch(&self, run_key: impl Into<RunKey>, opts: &GetOptions) -> Result<Fetched, JobError> {
        self.fetch_in(&ComputeCtx::with_registry(self.registry()), run_key, opts)
    }

    /// `get` desde dentro de otra función de cómputo (extiende la cadena de
    /// dependencias de `ctx`).
    pub fn get_in(&self, ctx: &ComputeCtx, run_key: impl Into<RunKey>, opts: &GetOptions) -> Result<Arc<Artifact>, JobError> {
        self.fetch_in(ctx, run_key, opts).map(|f| f.artifact)
    }

    pub fn fetch_in(&self, ctx: &ComputeCtx, run_key: impl Into<RunKey>, opts: &GetOptions) -> Result<Fetched, JobError> {
        let params = self.effective_params(&opts.overrides)?;
        let identity = ArtifactIdentity::derive(&self.name, run_key.into(), params);
        let child = ctx.enter(&identity)?;

        loop {
            let (slot, leader) = match self.in_flight.entry(identity.hash.clone()) {
                Entry::Occupied(e) => (e.get().clone(), false),
                Entry::Vacant(e) => {
                    let slot = BuildSlot::new(opts.force_recompute);
                    e.insert(slot.clone());
                    (slot, true)
                }
            };

            if !leader {
                debug!("{} ({}) already building, waiting", identity.label(), identity.short());
                let result = slot.wait();
                // Un build no forzado no satisface un force: esperar a que
                // termine y reintentar como líder.
                if opts.force_recompute && !slot.forced() {
                    continue;
                }
                return result.map(|artifact| Fetched { artifact,
                                                       identity,
                                                       provenance: Provenance::Coalesced });
            }

            let guard = LeaderGuard::new(&self.in_flight, slot, &identity);
            let result = self.build(&child, &identity, opts.force_recompute);
            guard.finish(result.clone().map(|(artifact, _)| artifact));
            return result.map(|(artifact, provenance)| Fetched { artifact,
                                                                 identity,
                                                                 provenance });
        }
    }

    fn build(&self, ctx: &ComputeCtx, identity: &ArtifactIdentity, force: bool) -> Result<(Arc<Artifact>, Provenance), JobError> {
        if force {
            self.store.invalidate(identity)?;
        } else {
            match self.store.load(identity) {
                Ok(artifact) => {
                    debug!("cache hit {} ({})", identity.label(), identity.short());
                    return Ok((Arc::new(artifact), Provenance::Cached));
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!("computing {} ({})", identity.label(), identity.short());
        let started = Instant::now();
        let mut artifact = self.stage
                               .compute(ctx, &identity.run_key, &identity.params)
                               .map_err(|f| JobError::from_compute_failure(&self.name, &identity.run_key, identity.canonical_params(), f))?;
        artifact.seal(identity);
        self.store.save(identity, &artifact)?;
        info!("computed {} in {:.3}s", identity.label(), started.elapsed().as_secs_f64());
        Ok((Arc::new(artifact), Provenance::Computed))
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
         .field("name", &self.name)
         .field("defaults", &self.defaults)
         .field("store", &self.store.location())
         .finish()
    }
}
