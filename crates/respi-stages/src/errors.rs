use thiserror::Error;

/// Fallos al leer datos crudos.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("no {what} for '{key}' in {location}")]
    NotFound { what: String, key: String, location: String },
    #[error("io error reading {path}: {message}")]
    Io { path: String, message: String },
    #[error("malformed {path}: {message}")]
    Malformed { path: String, message: String },
}

/// Fallos de cálculo de un stage (datos presentes pero inutilizables).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StageError {
    #[error("run key '{0}' is not of the form <subject>_<session>")]
    InvalidRunKey(String),
    #[error("stage '{stage}' aggregates the whole study and only accepts run key 'all', got '{got}'")]
    NotGlobalKey { stage: String, got: String },
    #[error("channel '{chan}' missing from recording")]
    MissingChannel { chan: String },
    #[error("signal has {len} samples, need at least {needed} (five cycles of {lowest_freq} Hz)")]
    SignalTooShort { len: usize, needed: usize, lowest_freq: f64 },
    #[error("invalid spectral parameters: {0}")]
    InvalidSpectrum(String),
    #[error("no spectral bin below {0} Hz")]
    EmptyBand(f64),
    #[error("question {0} has no reverse rule")]
    UnknownQuestion(u32),
    #[error("item '{item}' has no answered questions")]
    EmptyItem { item: String },
}
