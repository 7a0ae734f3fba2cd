//! Artifact neutral de un stage.
//!
//! Un `Artifact` es el resultado cacheado de un stage para una identidad:
//! - `payload` es JSON genérico; el core no interpreta su semántica.
//! - `hash` se calcula sobre el payload canonicalizado al sellar el artifact
//!   (ver `hashing::to_canonical_json`).
//! - `attrs` lleva atributos autodescriptivos del resultado (frecuencia de
//!   muestreo, unidades, ...), elegidos por el stage.
//! - `metadata` la completa el job al guardar: stage, run key, identidad y los
//!   params efectivos usados, para que el artifact se entienda al recargarlo
//!   sin recalcular.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ArtifactIdentity, RunKey};
use crate::constants::ENGINE_VERSION;
use crate::hashing::hash_value;

/// Tipos neutrales de artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// JSON genérico sin semántica.
    GenericJson,
    /// Tabla de filas homogéneas.
    Table,
    /// Espectro(s) frecuencia × canal.
    Spectrum,
    /// Señales crudas por canal.
    Signals,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactMetadata {
    pub stage: String,
    pub run_key: RunKey,
    pub identity: String,
    pub params: Value,
    pub engine_version: String,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub hash: String,
    pub payload: Value,
    #[serde(default)]
    pub attrs: BTreeMap<String, Value>,
    pub metadata: Option<ArtifactMetadata>,
}

impl Artifact {
    /// Artifact sin sellar; el job asigna `hash` y `metadata` al guardarlo.
    pub fn new(kind: ArtifactKind, payload: Value) -> Self {
        Self { kind,
               hash: String::new(),
               payload,
               attrs: BTreeMap::new(),
               metadata: None }
    }

    pub fn json(payload: Value) -> Self {
        Self::new(ArtifactKind::GenericJson, payload)
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attrs.get(key).and_then(Value::as_f64)
    }

    /// Params efectivos con los que se calculó (sólo artifacts sellados).
    pub fn params(&self) -> Option<&Value> {
        self.metadata.as_ref().map(|m| &m.params)
    }

    pub fn is_sealed(&self) -> bool {
        self.metadata.is_some()
    }

    pub(crate) fn seal(&mut self, identity: &ArtifactIdentity) {
        self.hash = hash_value(&self.payload);
        self.metadata = Some(ArtifactMetadata { stage: identity.stage.clone(),
                                                run_key: identity.run_key.clone(),
                                                identity: identity.hash.clone(),
                                                params: identity.params.clone(),
                                                engine_version: ENGINE_VERSION.to_string(),
                                                computed_at: Utc::now() });
    }
}
