//! Artifacts tipados del estudio.
//!
//! Los que llevan atributos (srate, unidades) implementan `ArtifactSpec` a
//! mano; los tabulares simples usan `typed_artifact!`.
use std::collections::BTreeMap;

use indexmap::IndexMap;
use respi_core::model::{ArtifactKind, ArtifactSpec};
use respi_core::typed_artifact;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

fn schema_v1() -> u32 {
    1
}

/// Señales recortadas de una sesión. `data[i]` corresponde a `chans[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalsArtifact {
    pub srate: f64,
    pub chans: Vec<String>,
    pub data: Vec<Vec<f64>>,
    #[serde(default = "schema_v1")]
    pub schema_version: u32,
}

impl SignalsArtifact {
    pub fn channel(&self, chan: &str) -> Option<&[f64]> {
        self.chans.iter().position(|c| c == chan).map(|i| self.data[i].as_slice())
    }
}

impl ArtifactSpec for SignalsArtifact {
    const KIND: ArtifactKind = ArtifactKind::Signals;

    fn validate(&self) -> Result<(), String> {
        if self.chans.len() != self.data.len() {
            return Err(format!("{} channels but {} signals", self.chans.len(), self.data.len()));
        }
        if !(self.srate > 0.0) {
            return Err(format!("srate must be positive, got {}", self.srate));
        }
        Ok(())
    }

    fn attrs(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([("srate".to_string(), json!(self.srate))])
    }
}

/// PSD por canal: `psd[i][k]` es la potencia de `chans[i]` en `freqs[k]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsdArtifact {
    pub srate: f64,
    pub freqs: Vec<f64>,
    pub chans: Vec<String>,
    pub psd: Vec<Vec<f64>>,
    #[serde(default = "schema_v1")]
    pub schema_version: u32,
}

impl PsdArtifact {
    pub fn channel(&self, chan: &str) -> Option<&[f64]> {
        self.chans.iter().position(|c| c == chan).map(|i| self.psd[i].as_slice())
    }
}

impl ArtifactSpec for PsdArtifact {
    const KIND: ArtifactKind = ArtifactKind::Spectrum;

    fn validate(&self) -> Result<(), String> {
        if self.chans.len() != self.psd.len() {
            return Err(format!("{} channels but {} spectra", self.chans.len(), self.psd.len()));
        }
        match self.psd.iter().find(|row| row.len() != self.freqs.len()) {
            Some(row) => Err(format!("spectrum with {} bins for {} frequencies", row.len(), self.freqs.len())),
            None => Ok(()),
        }
    }

    fn attrs(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([("srate".to_string(), json!(self.srate)), ("units".to_string(), json!("V**2/Hz"))])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerAtRespRow {
    pub participant: String,
    pub session: String,
    pub chan: String,
    /// Frecuencia del pico respiratorio (Hz).
    pub fmax_resp: f64,
    pub max_resp: f64,
    /// Potencia EEG en `fmax_resp`.
    pub max_eeg: f64,
}

typed_artifact!(PowerAtRespArtifact { rows: Vec<PowerAtRespRow> } kind: ArtifactKind::Table);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaiArtifact {
    pub participant: String,
    pub session: String,
    pub state: f64,
    #[serde(rename = "trait")]
    pub trait_: f64,
    pub interpretation_state: String,
    pub interpretation_trait: String,
    #[serde(default = "schema_v1")]
    pub schema_version: u32,
}

impl ArtifactSpec for StaiArtifact {
    const KIND: ArtifactKind = ArtifactKind::Table;
}

typed_artifact!(MaiaArtifact { participant: String, scores: IndexMap<String, f64> } kind: ArtifactKind::Table);

/// Una escala resumida en un único puntaje (`scale` = `OAS`, `BMRQ`).
typed_artifact!(ScaleMeanArtifact { participant: String, scale: String, score: f64 } kind: ArtifactKind::Table);
