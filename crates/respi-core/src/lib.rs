//! respi-core: cache de jobs direccionada por parámetros.
pub mod batch;
pub mod constants;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod job;
pub mod model;
pub mod params;
pub mod registry;
pub mod repo;
pub mod store;

pub use batch::{run_batch, BatchReport, BatchRequest, BatchRunner, EngineSpec, FailureKind, KeyOutcome, WorkerCommand};
pub use errors::{BatchError, ComputeFailure, JobError, ParamsError, RegistryError, StoreError};
pub use event::{BatchEvent, BatchEventKind, EventStore, InMemoryEventStore, JsonlEventStore};
pub use job::{ComputeCtx, Fetched, GetOptions, Job, Provenance, StageDefinition, Typed, TypedStage};
pub use model::{Artifact, ArtifactIdentity, ArtifactKind, ArtifactSpec, RunKey, TypedArtifact};
pub use registry::Registry;
pub use repo::BatchLedger;
pub use store::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore};
