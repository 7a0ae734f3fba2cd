//! Identidad de un artifact: (stage, run key, params canónicos).
//!
//! El hash es estable entre procesos: depende sólo de la forma canónica del
//! input del hash (claves ordenadas, ver `hashing::to_canonical_json`) y
//! nunca de direcciones de memoria ni del orden de iteración de mapas.
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::RunKey;
use crate::constants::ENGINE_VERSION;
use crate::hashing::{hash_value, to_canonical_json};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIdentity {
    pub stage: String,
    pub run_key: RunKey,
    /// Params efectivos ya normalizados.
    pub params: Value,
    pub hash: String,
}

impl ArtifactIdentity {
    pub fn derive(stage: &str, run_key: RunKey, params: Value) -> Self {
        // Insumos del hash: la versión del core entra para invalidar todo
        // lo precalculado ante cambios incompatibles.
        let input = json!({
            "engine_version": ENGINE_VERSION,
            "stage": stage,
            "run_key": run_key.as_str(),
            "params": &params,
        });
        let hash = hash_value(&input);
        Self { stage: stage.to_string(),
               run_key,
               params,
               hash }
    }

    /// Prefijo corto para logs.
    pub fn short(&self) -> &str {
        &self.hash[..12.min(self.hash.len())]
    }

    /// Etiqueta `stage[run_key]` usada en cadenas de dependencias.
    pub fn label(&self) -> String {
        format!("{}[{}]", self.stage, self.run_key)
    }

    pub fn canonical_params(&self) -> String {
        to_canonical_json(&self.params)
    }
}

impl PartialEq for ArtifactIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for ArtifactIdentity {}

impl Hash for ArtifactIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}
