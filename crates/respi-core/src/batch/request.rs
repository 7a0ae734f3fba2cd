//! Pedido de batch serializable: se registra en el log de eventos antes de
//! ejecutar nada, de modo que un batch interrumpido se puede reanudar.
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::EngineSpec;
use crate::errors::BatchError;
use crate::job::GetOptions;
use crate::model::RunKey;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub batch_id: Uuid,
    pub stage: String,
    pub run_keys: Vec<RunKey>,
    pub engine: EngineSpec,
    #[serde(default)]
    pub force_recompute: bool,
    #[serde(default)]
    pub overrides: Value,
    /// Límite por run key; vencido, la key se registra como `TimedOut`.
    #[serde(default)]
    pub key_timeout_secs: Option<f64>,
    /// Si es `true` un batch sin run keys es un error de configuración; si
    /// no, produce un reporte vacío.
    #[serde(default = "default_true")]
    pub require_run_keys: bool,
    pub requested_at: DateTime<Utc>,
    /// Batch original cuando este pedido es una reanudación.
    #[serde(default)]
    pub resumed_from: Option<Uuid>,
}

impl BatchRequest {
    pub fn new<K: Into<RunKey>>(stage: impl Into<String>, run_keys: impl IntoIterator<Item = K>) -> Self {
        Self { batch_id: Uuid::new_v4(),
               stage: stage.into(),
               run_keys: run_keys.into_iter().map(Into::into).collect(),
               engine: EngineSpec::Sequential,
               force_recompute: false,
               overrides: Value::Null,
               key_timeout_secs: None,
               require_run_keys: true,
               requested_at: Utc::now(),
               resumed_from: None }
    }

    pub fn engine(mut self, engine: EngineSpec) -> Self {
        self.engine = engine;
        self
    }

    pub fn force_recompute(mut self, force: bool) -> Self {
        self.force_recompute = force;
        self
    }

    pub fn overrides(mut self, overrides: Value) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn key_timeout(mut self, timeout: Duration) -> Self {
        self.key_timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    pub fn allow_empty(mut self) -> Self {
        self.require_run_keys = false;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.key_timeout_secs
            .filter(|s| *s > 0.0)
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
    }

    pub fn get_options(&self) -> GetOptions {
        GetOptions::new().force_recompute(self.force_recompute)
                         .with_overrides(self.overrides.clone())
    }

    /// Errores de configuración detectables antes de ejecutar.
    pub fn validate(&self) -> Result<(), BatchError> {
        self.engine.validate()?;
        if self.require_run_keys && self.run_keys.is_empty() {
            return Err(BatchError::EmptyRunKeys(self.stage.clone()));
        }
        if let Some(secs) = self.key_timeout_secs {
            if secs <= 0.0 || Duration::try_from_secs_f64(secs).is_err() {
                return Err(BatchError::InvalidTimeout(secs));
            }
        }
        Ok(())
    }
}
