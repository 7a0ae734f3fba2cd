//! Constantes del core de jobs.
//!
//! Este módulo agrupa valores estáticos que participan en el cálculo de
//! identidades y en la compatibilidad del formato en disco. Cambios en estas
//! constantes pueden invalidar todo lo precalculado si forman parte del input
//! del hashing (`ENGINE_VERSION` sí lo es).

/// Versión lógica del core. Se incluye en la identidad de cada artifact para
/// que un cambio incompatible invalide de forma determinista los artifacts
/// guardados aunque stage, run key y params no cambien.
pub const ENGINE_VERSION: &str = "J1.0";

/// Versión del envelope `StoredArtifact` escrito por `FsArtifactStore`.
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Profundidad máxima de la cadena de dependencias entre stages.
pub const MAX_DEPENDENCY_DEPTH: usize = 64;

/// Run key convencional de los stages que agregan todo el estudio.
pub const GLOBAL_RUN_KEY: &str = "all";
