use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::GLOBAL_RUN_KEY;

/// Identificador opaco de una unidad de análisis (sujeto, sujeto × sesión o
/// la clave global `all`). Se usa tal cual dentro de la identidad del artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunKey(String);

impl RunKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Clave de los stages que agregan sobre todos los sujetos.
    pub fn global() -> Self {
        Self(GLOBAL_RUN_KEY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_global(&self) -> bool {
        self.0 == GLOBAL_RUN_KEY
    }

    /// Partes separadas por `_` (p.ej. `P02_baseline` -> `["P02", "baseline"]`).
    pub fn parts(&self) -> Vec<&str> {
        self.0.split('_').collect()
    }

    /// Sujeto y sesión para claves `<sujeto>_<sesión>`.
    pub fn subject_session(&self) -> Option<(&str, &str)> {
        self.0.split_once('_')
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RunKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&RunKey> for RunKey {
    fn from(k: &RunKey) -> Self {
        k.clone()
    }
}

impl AsRef<str> for RunKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RunKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Producto cartesiano sujeto × sesión en el orden dado
/// (`P01_baseline`, `P01_music`, ..., `P02_baseline`, ...).
pub fn cross_keys<S: AsRef<str>, T: AsRef<str>>(subjects: &[S], sessions: &[T]) -> Vec<RunKey> {
    subjects.iter()
            .flat_map(|sub| sessions.iter().map(move |ses| RunKey(format!("{}_{}", sub.as_ref(), ses.as_ref()))))
            .collect()
}
