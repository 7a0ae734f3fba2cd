use std::fmt;

use serde_json::Value;

use super::ComputeCtx;
use crate::errors::{ComputeFailure, ParamsError};
use crate::model::{Artifact, RunKey};

/// Trait que define un stage. Implementaciones deben ser puras respecto a
/// (run_key, params): mismo input, mismo artifact.
pub trait StageDefinition: Send + Sync {
    /// Nombre estable del stage; forma parte de la identidad y de la ruta en
    /// disco.
    fn name(&self) -> &str;

    /// Parámetros base deterministas (defaults). Se fusionan con los
    /// overrides de cada llamada.
    fn base_params(&self) -> Value;

    /// Normaliza un set de params ya fusionado antes de derivar la identidad.
    fn normalize_params(&self, params: Value) -> Result<Value, ParamsError> {
        Ok(params)
    }

    /// Cálculo del artifact. Puede pedir otros stages a través de `ctx`.
    fn compute(&self, ctx: &ComputeCtx, run_key: &RunKey, params: &Value) -> Result<Artifact, ComputeFailure>;
}

/// Stage definido por una closure sobre params JSON sin tipar.
pub struct FnStage<F> {
    name: String,
    defaults: Value,
    func: F,
}

impl<F> FnStage<F> where F: Fn(&ComputeCtx, &RunKey, &Value) -> Result<Artifact, ComputeFailure> + Send + Sync
{
    pub fn new(name: impl Into<String>, defaults: Value, func: F) -> Self {
        Self { name: name.into(),
               defaults,
               func }
    }
}

impl<F> fmt::Debug for FnStage<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).field("defaults", &self.defaults).finish()
    }
}

impl<F> StageDefinition for FnStage<F> where F: Fn(&ComputeCtx, &RunKey, &Value) -> Result<Artifact, ComputeFailure> + Send + Sync
{
    fn name(&self) -> &str {
        &self.name
    }

    fn base_params(&self) -> Value {
        self.defaults.clone()
    }

    fn compute(&self, ctx: &ComputeCtx, run_key: &RunKey, params: &Value) -> Result<Artifact, ComputeFailure> {
        (self.func)(ctx, run_key, params)
    }
}
