use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use super::ArtifactStore;
use crate::errors::StoreError;
use crate::model::{Artifact, ArtifactIdentity};

/// Store en memoria (tests y ejecuciones efímeras). Cuenta escrituras para
/// poder verificar "un cómputo, una escritura".
#[derive(Debug)]
pub struct InMemoryArtifactStore {
    id: Uuid,
    inner: DashMap<String, Artifact>,
    saves: AtomicUsize,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4(),
               inner: DashMap::new(),
               saves: AtomicUsize::new(0) }
    }

    /// Número total de `save` realizados.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn location(&self) -> String {
        format!("memory://{}", self.id)
    }

    fn has(&self, identity: &ArtifactIdentity) -> bool {
        self.inner.contains_key(&identity.hash)
    }

    fn load(&self, identity: &ArtifactIdentity) -> Result<Artifact, StoreError> {
        self.inner
            .get(&identity.hash)
            .map(|a| a.value().clone())
            .ok_or_else(|| StoreError::NotFound { stage: identity.stage.clone(),
                                                  identity: identity.hash.clone() })
    }

    fn save(&self, identity: &ArtifactIdentity, artifact: &Artifact) -> Result<(), StoreError> {
        self.inner.insert(identity.hash.clone(), artifact.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn invalidate(&self, identity: &ArtifactIdentity) -> Result<(), StoreError> {
        self.inner.remove(&identity.hash);
        Ok(())
    }
}
