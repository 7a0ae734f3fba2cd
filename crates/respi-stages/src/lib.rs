//! respi-stages: stages del estudio sobre el core de jobs.
//!
//! Este crate provee:
//! - Artifacts tipados (señales, espectros, tablas de cuestionarios).
//! - Params tipados por stage, con los defaults del estudio.
//! - `RecordingSource`: de dónde salen las grabaciones y cuestionarios.
//! - Los stages (`raw_signals`, `psd_eeg`, `power_at_resp`,
//!   `power_at_resp_concat`, `stai_longform`, `maia`, `oas`, `bmrq`) y
//!   `register_study_stages` para darlos de alta en un registry.
//!
//! El core sólo ve `StageDefinition`; toda la semántica numérica vive aquí.

pub mod artifacts;
pub mod errors;
pub mod params;
pub mod source;
pub mod spectral;
pub mod stages;
pub mod study;

pub use errors::{SourceError, StageError};
pub use source::{InMemorySource, JsonDirSource, QuestionnaireRow, Recording, RecordingSource};
pub use stages::register_study_stages;
