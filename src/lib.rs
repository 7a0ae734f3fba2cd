//! respiflow: cache de jobs direccionada por parámetros para el estudio de
//! respiración y EEG.
//!
//! - `respi_core`: store, jobs con coalescing, registry, batches y log de
//!   eventos.
//! - `respi_stages`: los stages del estudio.
//! - `config` y `cli`: lo que usa el binario.

pub mod cli;
pub mod config;

pub use config::{ConfigError, RespiConfig};
pub use respi_core;
pub use respi_stages;
