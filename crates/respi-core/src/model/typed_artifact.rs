//! Tipado fuerte opcional para `Artifact` manteniendo el núcleo agnóstico.
//! Permite describir artifacts con un tipo de datos concreto (T) y
//! validaciones. No introduce semántica de dominio; se basa en generics y
//! serde.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{Artifact, ArtifactKind};

/// Errores posibles al codificar/decodificar un artifact tipado.
#[derive(Debug, Error)]
pub enum ArtifactCodecError {
    #[error("artifact kind mismatch: expected {expected:?}, found {found:?}")]
    KindMismatch { expected: ArtifactKind, found: ArtifactKind },
    #[error("schema version mismatch: expected {expected}, found {found:?}")]
    VersionMismatch { expected: u32, found: Option<u32> },
    #[error("encode: {0}")]
    Encode(String),
    #[error("decode: {0}")]
    Deserialize(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Especificación abstracta de un artifact tipado.
pub trait ArtifactSpec: Sized + Serialize + DeserializeOwned + Clone {
    /// Kind asociado (permite distinguir en runtime).
    const KIND: ArtifactKind;
    /// Versión de esquema (incrementar en cambios incompatibles).
    const SCHEMA_VERSION: u32 = 1;

    /// Validación semántica ligera (sin efectos secundarios).
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Atributos autodescriptivos (srate, unidades, ...).
    fn attrs(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    fn version_field_name() -> &'static str {
        "schema_version"
    }

    /// Serializa a `Artifact` sin sellar (el job añade hash y metadata).
    fn into_artifact(self) -> Result<Artifact, ArtifactCodecError> {
        self.validate().map_err(ArtifactCodecError::Validation)?;
        let attrs = self.attrs();
        let mut value = serde_json::to_value(&self).map_err(|e| ArtifactCodecError::Encode(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.entry(Self::version_field_name().to_string())
               .or_insert(Value::from(Self::SCHEMA_VERSION));
        }
        let mut artifact = Artifact::new(Self::KIND, value);
        artifact.attrs = attrs;
        Ok(artifact)
    }

    /// Decodifica verificando kind, versión y validación.
    fn from_artifact(a: &Artifact) -> Result<Self, ArtifactCodecError> {
        if a.kind != Self::KIND {
            return Err(ArtifactCodecError::KindMismatch { expected: Self::KIND, found: a.kind });
        }
        let found_version = a.payload
                             .get(Self::version_field_name())
                             .and_then(|v| v.as_u64())
                             .map(|v| v as u32);
        if found_version != Some(Self::SCHEMA_VERSION) {
            return Err(ArtifactCodecError::VersionMismatch { expected: Self::SCHEMA_VERSION,
                                                             found: found_version });
        }
        let decoded: Self =
            serde_json::from_value(a.payload.clone()).map_err(|e| ArtifactCodecError::Deserialize(e.to_string()))?;
        decoded.validate().map_err(ArtifactCodecError::Validation)?;
        Ok(decoded)
    }
}

/// Artifact tipado ya decodificado junto a su representación neutra (con
/// hash y metadata).
#[derive(Debug, Clone)]
pub struct TypedArtifact<T: ArtifactSpec> {
    pub inner: T,
    pub raw: Arc<Artifact>,
}

impl<T: ArtifactSpec> TypedArtifact<T> {
    pub fn decode(raw: Arc<Artifact>) -> Result<Self, ArtifactCodecError> {
        let inner = T::from_artifact(&raw)?;
        Ok(Self { inner, raw })
    }
}

/// Declara un artifact tipado con derives y `ArtifactSpec`.
///
/// Formas soportadas:
/// - `typed_artifact!(Name { field1: Ty1, field2: Ty2 });` // KIND = GenericJson
/// - `typed_artifact!(Name { field1: Ty1 } kind: $kind_expr);`
#[macro_export]
macro_rules! typed_artifact {
    ($name:ident { $($fname:ident : $fty:ty),+ $(,)? } kind: $kind:expr) => {
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        pub struct $name { $(pub $fname: $fty,)+ pub schema_version: u32 }
        impl $crate::model::ArtifactSpec for $name {
            const KIND: $crate::model::ArtifactKind = $kind;
        }
    };
    ($name:ident { $($fname:ident : $fty:ty),+ $(,)? }) => {
        $crate::typed_artifact!($name { $($fname : $fty),+ } kind: $crate::model::ArtifactKind::GenericJson);
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Scores {
        participant: String,
        etat: f64,
    }

    impl ArtifactSpec for Scores {
        const KIND: ArtifactKind = ArtifactKind::Table;

        fn validate(&self) -> Result<(), String> {
            if self.etat < 0.0 { Err("negative score".into()) } else { Ok(()) }
        }

        fn attrs(&self) -> BTreeMap<String, Value> {
            BTreeMap::from([("units".to_string(), json!("points"))])
        }
    }

    #[test]
    fn into_artifact_inserts_schema_version_and_attrs() {
        let art = Scores { participant: "P01".into(), etat: 41.0 }.into_artifact().unwrap();
        assert_eq!(art.kind, ArtifactKind::Table);
        assert_eq!(art.payload["schema_version"], json!(1));
        assert_eq!(art.attr("units"), Some(&json!("points")));
        let back = Scores::from_artifact(&art).unwrap();
        assert_eq!(back.participant, "P01");
    }

    #[test]
    fn kind_and_version_are_checked() {
        let mut art = Scores { participant: "P01".into(), etat: 41.0 }.into_artifact().unwrap();
        art.payload["schema_version"] = json!(2);
        assert!(matches!(Scores::from_artifact(&art), Err(ArtifactCodecError::VersionMismatch { found: Some(2), .. })));
        art.kind = ArtifactKind::Signals;
        assert!(matches!(Scores::from_artifact(&art), Err(ArtifactCodecError::KindMismatch { .. })));
    }

    #[test]
    fn invalid_output_is_rejected_before_storage() {
        let err = Scores { participant: "P01".into(), etat: -1.0 }.into_artifact().unwrap_err();
        assert!(matches!(err, ArtifactCodecError::Validation(_)));
    }
}
