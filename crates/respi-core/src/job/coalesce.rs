//! Coalescing de builds concurrentes de una misma identidad.
//!
//! El primer caller que encuentra la identidad libre inserta un `BuildSlot` y
//! pasa a ser el líder; el resto espera en el slot y reutiliza su resultado.
//! El líder publica siempre, incluso si su cómputo hace panic (ver
//! `LeaderGuard`), así que ningún follower queda bloqueado.
use std::sync::{Arc, Condvar, Mutex};

use dashmap::DashMap;

use crate::errors::JobError;
use crate::model::{Artifact, ArtifactIdentity};

pub(crate) type BuildResult = Result<Arc<Artifact>, JobError>;

#[derive(Debug)]
pub(crate) struct BuildSlot {
    forced: bool,
    state: Mutex<Option<BuildResult>>,
    ready: Condvar,
}

impl BuildSlot {
    pub(crate) fn new(forced: bool) -> Arc<Self> {
        Arc::new(Self { forced,
                        state: Mutex::new(None),
                        ready: Condvar::new() })
    }

    /// `true` si el build en curso recalcula ignorando el store.
    pub(crate) fn forced(&self) -> bool {
        self.forced
    }

    /// Bloquea hasta que el líder publique.
    pub(crate) fn wait(&self) -> BuildResult {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(result) = state.as_ref() {
                return result.clone();
            }
            state = self.ready.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    fn publish(&self, result: BuildResult) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.is_none() {
            *state = Some(result);
        }
        self.ready.notify_all();
    }
}

/// Responsabilidad del líder: al soltarse retira el slot del mapa de builds
/// en curso y publica el resultado. Sin `finish` (panic durante el cómputo)
/// publica un `ComputeError` para liberar a los followers.
pub(crate) struct LeaderGuard<'a> {
    in_flight: &'a DashMap<String, Arc<BuildSlot>>,
    slot: Arc<BuildSlot>,
    identity: &'a ArtifactIdentity,
    result: Option<BuildResult>,
}

impl<'a> LeaderGuard<'a> {
    pub(crate) fn new(in_flight: &'a DashMap<String, Arc<BuildSlot>>,
                      slot: Arc<BuildSlot>,
                      identity: &'a ArtifactIdentity)
                      -> Self {
        Self { in_flight,
               slot,
               identity,
               result: None }
    }

    pub(crate) fn finish(mut self, result: BuildResult) {
        self.result = Some(result);
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        // Retirar antes de publicar: quien llegue después arranca su propio
        // build (y normalmente encuentra el artifact ya guardado).
        let slot = &self.slot;
        self.in_flight.remove_if(&self.identity.hash, |_, current| Arc::ptr_eq(current, slot));
        let result = self.result.take().unwrap_or_else(|| {
                                           let cause: Box<dyn std::error::Error + Send + Sync> =
                                               "build panicked before publishing a result".into();
                                           Err(JobError::Compute { stage: self.identity.stage.clone(),
                                                                   run_key: self.identity.run_key.clone(),
                                                                   params: self.identity.canonical_params(),
                                                                   cause: Arc::from(cause) })
                                       });
        self.slot.publish(result);
    }
}
