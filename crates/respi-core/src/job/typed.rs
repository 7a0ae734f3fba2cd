//! Stages con params y output fuertemente tipados.
//!
//! Los implementadores escriben `compute_typed` con tipos concretos; el
//! adaptador `Typed` lo expone como `StageDefinition` neutro. Los params se
//! normalizan pasando por `Params` (deserialize -> serialize), así la
//! identidad se calcula sobre la configuración estructurada y no sobre la
//! forma en que el caller escribió los overrides.
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::{ComputeCtx, StageDefinition};
use crate::errors::{ComputeFailure, ParamsError};
use crate::model::{Artifact, ArtifactSpec, RunKey};

pub trait TypedStage: Send + Sync {
    /// Configuración del stage (soporta `Default`).
    type Params: DeserializeOwned + Serialize + Clone + Default;
    /// Artifact producido.
    type Output: ArtifactSpec;

    fn name(&self) -> &'static str;

    /// Parámetros por defecto deterministas.
    fn params_default(&self) -> Self::Params {
        Default::default()
    }

    fn compute_typed(&self, ctx: &ComputeCtx, run_key: &RunKey, params: Self::Params) -> Result<Self::Output, ComputeFailure>;
}

/// Adaptador `TypedStage` -> `StageDefinition`.
#[derive(Debug, Clone)]
pub struct Typed<T>(pub T);

impl<T: TypedStage> Typed<T> {
    fn decode(params: Value) -> Result<T::Params, ParamsError> {
        serde_json::from_value(params).map_err(|e| ParamsError::Invalid(e.to_string()))
    }
}

impl<T: TypedStage> StageDefinition for Typed<T> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn base_params(&self) -> Value {
        // Un Params que no serializa queda en Null y falla en normalize_params
        // al crear el Job.
        serde_json::to_value(self.0.params_default()).unwrap_or(Value::Null)
    }

    fn normalize_params(&self, params: Value) -> Result<Value, ParamsError> {
        let typed = Self::decode(params)?;
        serde_json::to_value(typed).map_err(|e| ParamsError::Invalid(e.to_string()))
    }

    fn compute(&self, ctx: &ComputeCtx, run_key: &RunKey, params: &Value) -> Result<Artifact, ComputeFailure> {
        let typed = Self::decode(params.clone())?;
        let output = self.0.compute_typed(ctx, run_key, typed)?;
        Ok(output.into_artifact()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArtifactKind;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct PsdParams {
        lowest_freq: f64,
        chans: Vec<String>,
    }

    impl Default for PsdParams {
        fn default() -> Self {
            Self { lowest_freq: 0.1,
                   chans: vec!["Fz".into()] }
        }
    }

    crate::typed_artifact!(Peak { freq: f64 } kind: ArtifactKind::Spectrum);

    struct PeakStage;

    impl TypedStage for PeakStage {
        type Params = PsdParams;
        type Output = Peak;

        fn name(&self) -> &'static str {
            "peak"
        }

        fn compute_typed(&self, _ctx: &ComputeCtx, _run_key: &RunKey, params: PsdParams) -> Result<Peak, ComputeFailure> {
            Ok(Peak { freq: params.lowest_freq * 2.0,
                      schema_version: 1 })
        }
    }

    #[test]
    fn integer_override_is_normalized_to_float() {
        let stage = Typed(PeakStage);
        let merged = json!({"lowest_freq": 1, "chans": ["Fz"]});
        assert_eq!(stage.normalize_params(merged).unwrap(), json!({"lowest_freq": 1.0, "chans": ["Fz"]}));
    }

    #[test]
    fn type_mismatch_is_invalid_params() {
        let stage = Typed(PeakStage);
        let err = stage.normalize_params(json!({"lowest_freq": "low", "chans": []})).unwrap_err();
        assert!(matches!(err, ParamsError::Invalid(_)));
    }

    #[test]
    fn compute_goes_through_artifact_spec() {
        let stage = Typed(PeakStage);
        let art = stage.compute(&ComputeCtx::detached(), &RunKey::from("P01"), &stage.base_params()).unwrap();
        assert_eq!(art.kind, ArtifactKind::Spectrum);
        assert_eq!(art.payload["freq"], json!(0.2));
        assert_eq!(art.payload["schema_version"], json!(1));
    }
}
