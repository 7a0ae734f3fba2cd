//! Almacenamiento de artifacts: la fuente de verdad de "ya está calculado".
//!
//! Contrato común:
//! - `has`: existencia sin deserializar.
//! - `load`: `NotFound` si no existe; `Corrupt` si existe pero no se puede
//!   leer o no coincide con la identidad pedida.
//! - `save`: atómico respecto de lectores concurrentes; sobrescribir está
//!   permitido (camino de recálculo forzado).
//! - `invalidate`: borra el artifact; no falla si no existía.
//!
//! El store no coordina builds: dos `save` de la misma identidad se evitan en
//! el `Job` (coalescing), no aquí.

mod fs;
mod memory;

pub use fs::{FsArtifactStore, StoredArtifact};
pub use memory::InMemoryArtifactStore;

use crate::errors::StoreError;
use crate::model::{Artifact, ArtifactIdentity};

pub trait ArtifactStore: Send + Sync + std::fmt::Debug {
    /// Ubicación estable del store (ruta o `memory://<uuid>`). Dos jobs con el
    /// mismo nombre sólo son compatibles si comparten ubicación.
    fn location(&self) -> String;

    fn has(&self, identity: &ArtifactIdentity) -> bool;

    fn load(&self, identity: &ArtifactIdentity) -> Result<Artifact, StoreError>;

    fn save(&self, identity: &ArtifactIdentity, artifact: &Artifact) -> Result<(), StoreError>;

    fn invalidate(&self, identity: &ArtifactIdentity) -> Result<(), StoreError>;
}
