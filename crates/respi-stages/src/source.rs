//! Fuentes de datos crudos: grabaciones por run key y cuestionarios.
//!
//! Layout de `JsonDirSource`:
//! - `<root>/<run_key>.json`: un `Recording`.
//! - `<root>/questionnaires/<name>_<key>.json`: lista de `QuestionnaireRow`.
use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use respi_core::model::RunKey;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::errors::{SourceError, StageError};

/// Señales de una sesión, un vector por canal (orden de canales estable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub srate: f64,
    pub channels: IndexMap<String, Vec<f64>>,
}

impl Recording {
    pub fn channel(&self, chan: &str) -> Result<&[f64], StageError> {
        self.channels
            .get(chan)
            .map(Vec::as_slice)
            .ok_or_else(|| StageError::MissingChannel { chan: chan.to_string() })
    }
}

/// Respuesta a una pregunta. `correction = "-"` marca ítems invertidos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireRow {
    pub question: u32,
    pub score: f64,
    #[serde(default)]
    pub correction: Option<String>,
}

impl QuestionnaireRow {
    pub fn is_reversed(&self) -> bool {
        self.correction.as_deref() == Some("-")
    }
}

pub trait RecordingSource: Send + Sync + Debug {
    fn location(&self) -> String;

    fn recording(&self, run_key: &RunKey) -> Result<Recording, SourceError>;

    /// Respuestas del cuestionario `name` (`stai`, `maia`, ...) para `key`.
    fn questionnaire(&self, name: &str, key: &RunKey) -> Result<Vec<QuestionnaireRow>, SourceError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    recordings: HashMap<String, Recording>,
    questionnaires: HashMap<(String, String), Vec<QuestionnaireRow>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recording(mut self, run_key: impl Into<String>, recording: Recording) -> Self {
        self.recordings.insert(run_key.into(), recording);
        self
    }

    pub fn with_questionnaire(mut self, name: impl Into<String>, key: impl Into<String>, rows: Vec<QuestionnaireRow>) -> Self {
        self.questionnaires.insert((name.into(), key.into()), rows);
        self
    }

    fn not_found(&self, what: &str, key: &RunKey) -> SourceError {
        SourceError::NotFound { what: what.to_string(),
                                key: key.to_string(),
                                location: self.location() }
    }
}

impl RecordingSource for InMemorySource {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn recording(&self, run_key: &RunKey) -> Result<Recording, SourceError> {
        self.recordings.get(run_key.as_str()).cloned().ok_or_else(|| self.not_found("recording", run_key))
    }

    fn questionnaire(&self, name: &str, key: &RunKey) -> Result<Vec<QuestionnaireRow>, SourceError> {
        self.questionnaires
            .get(&(name.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| self.not_found(&format!("{name} questionnaire"), key))
    }
}

#[derive(Debug, Clone)]
pub struct JsonDirSource {
    root: PathBuf,
}

impl JsonDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn recording_path(&self, run_key: &RunKey) -> PathBuf {
        self.root.join(format!("{run_key}.json"))
    }

    pub fn questionnaire_path(&self, name: &str, key: &RunKey) -> PathBuf {
        self.root.join("questionnaires").join(format!("{name}_{key}.json"))
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path, what: &str, key: &RunKey) -> Result<T, SourceError> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SourceError::NotFound { what: what.to_string(),
                                                   key: key.to_string(),
                                                   location: path.display().to_string() })
            }
            Err(e) => {
                return Err(SourceError::Io { path: path.display().to_string(),
                                             message: e.to_string() })
            }
        };
        debug!("read {} ({} bytes)", path.display(), bytes.len());
        serde_json::from_slice(&bytes).map_err(|e| SourceError::Malformed { path: path.display().to_string(),
                                                                             message: e.to_string() })
    }
}

impl RecordingSource for JsonDirSource {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn recording(&self, run_key: &RunKey) -> Result<Recording, SourceError> {
        self.read_json(&self.recording_path(run_key), "recording", run_key)
    }

    fn questionnaire(&self, name: &str, key: &RunKey) -> Result<Vec<QuestionnaireRow>, SourceError> {
        self.read_json(&self.questionnaire_path(name, key), &format!("{name} questionnaire"), key)
    }
}
