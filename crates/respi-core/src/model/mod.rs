//! Modelos neutrales (RunKey, ArtifactIdentity, Artifact, ArtifactSpec).

pub mod artifact;
pub mod identity;
pub mod run_key;
pub mod typed_artifact;

pub use artifact::{Artifact, ArtifactKind, ArtifactMetadata};
pub use identity::ArtifactIdentity;
pub use run_key::{cross_keys, RunKey};
pub use typed_artifact::{ArtifactCodecError, ArtifactSpec, TypedArtifact};
