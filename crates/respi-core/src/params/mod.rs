//! Parámetros de stage: merge determinista de overrides sobre defaults.
//!
//! El orden de aplicación es fijo: defaults del stage -> overrides de la
//! llamada. Los defaults nunca se mutan; cada `get` produce un set efectivo
//! nuevo.

pub mod merge;

pub use merge::{deep_merge, effective_params, override_at};
