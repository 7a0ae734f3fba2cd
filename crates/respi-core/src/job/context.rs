//! Contexto de cómputo: registry + cadena de identidades en construcción.
//!
//! Cada `get` hecho desde una función de cómputo extiende la cadena del
//! caller. Pedir una identidad que ya está en la cadena es un ciclo y falla
//! antes de esperar en el coalescing (que de otro modo bloquearía para
//! siempre).
use std::sync::Arc;

use super::{GetOptions, Job};
use crate::constants::MAX_DEPENDENCY_DEPTH;
use crate::errors::{ComputeFailure, JobError};
use crate::model::{Artifact, ArtifactIdentity, ArtifactSpec, RunKey, TypedArtifact};
use crate::registry::Registry;

#[derive(Debug, Clone)]
struct Frame {
    label: String,
    hash: String,
}

#[derive(Debug, Clone)]
pub struct ComputeCtx {
    registry: Arc<Registry>,
    chain: Vec<Frame>,
}

impl ComputeCtx {
    pub fn with_registry(registry: Arc<Registry>) -> Self {
        Self { registry,
               chain: Vec::new() }
    }

    /// Contexto sobre el registry global del proceso.
    pub fn detached() -> Self {
        Self::with_registry(Registry::global())
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    /// Etiquetas `stage[run_key]` de la cadena actual, de la raíz hacia abajo.
    pub fn chain(&self) -> Vec<String> {
        self.chain.iter().map(|f| f.label.clone()).collect()
    }

    pub fn lookup(&self, stage: &str) -> Result<Arc<Job>, JobError> {
        Ok(self.registry.lookup(stage)?)
    }

    /// Artifact de otro stage (cacheado o calculado en el momento).
    pub fn get(&self, stage: &str, run_key: impl Into<RunKey>, opts: &GetOptions) -> Result<Arc<Artifact>, JobError> {
        self.lookup(stage)?.get_in(self, run_key, opts)
    }

    /// Como `get`, decodificando el artifact a su tipo.
    pub fn get_typed<T: ArtifactSpec>(&self,
                                      stage: &str,
                                      run_key: impl Into<RunKey>,
                                      opts: &GetOptions)
                                      -> Result<TypedArtifact<T>, ComputeFailure> {
        let raw = self.get(stage, run_key, opts)?;
        Ok(TypedArtifact::decode(raw)?)
    }

    /// Contexto hijo para construir `identity`.
    pub(crate) fn enter(&self, identity: &ArtifactIdentity) -> Result<ComputeCtx, JobError> {
        if self.chain.iter().any(|f| f.hash == identity.hash) {
            let mut chain = self.chain();
            chain.push(identity.label());
            return Err(JobError::CyclicDependency { chain });
        }
        if self.chain.len() >= MAX_DEPENDENCY_DEPTH {
            let mut chain = self.chain();
            chain.push(identity.label());
            return Err(JobError::DependencyTooDeep { limit: MAX_DEPENDENCY_DEPTH,
                                                     chain });
        }
        let mut child = self.clone();
        child.chain.push(Frame { label: identity.label(),
                                 hash: identity.hash.clone() });
        Ok(child)
    }
}
