//! Params tipados de cada stage con los defaults del estudio.
//!
//! Los stages que dependen de otros anidan los params de la dependencia
//! (`PowerAtRespParams::psd_params`), de modo que la identidad del artifact
//! cubre toda la cadena de configuración.
use std::collections::BTreeMap;

use indexmap::IndexMap;
use respi_core::model::RunKey;
use serde::{Deserialize, Serialize};

use crate::study::{self, BIO_CHANS, SESSION_DURATION};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSignalsParams {
    pub session_duration: f64,
}

impl Default for RawSignalsParams {
    fn default() -> Self {
        Self { session_duration: SESSION_DURATION }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsdParams {
    pub lowest_freq: f64,
    pub session_duration: f64,
    /// Canales no EEG, fuera del PSD.
    pub exclude_chans: Vec<String>,
}

impl Default for PsdParams {
    fn default() -> Self {
        Self { lowest_freq: 0.1,
               session_duration: SESSION_DURATION,
               exclude_chans: BIO_CHANS.iter().map(|c| c.to_string()).collect() }
    }
}

impl PsdParams {
    pub fn raw_signals(&self) -> RawSignalsParams {
        RawSignalsParams { session_duration: self.session_duration }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerAtRespParams {
    pub psd_params: PsdParams,
    pub session_duration: f64,
    pub resp_chan: String,
    pub lowest_freq_psd_resp: f64,
}

impl Default for PowerAtRespParams {
    fn default() -> Self {
        Self { psd_params: PsdParams::default(),
               session_duration: SESSION_DURATION,
               resp_chan: "RespiNasale".to_string(),
               lowest_freq_psd_resp: 0.1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerAtRespConcatParams {
    pub run_keys: Vec<RunKey>,
    pub power_at_resp_params: PowerAtRespParams,
}

impl Default for PowerAtRespConcatParams {
    fn default() -> Self {
        Self { run_keys: study::run_keys(),
               power_at_resp_params: PowerAtRespParams::default() }
    }
}

/// Normas poblacionales del STAI (media y desvío de estado y rasgo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaiParams {
    pub mean_etat: f64,
    pub mean_trait: f64,
    pub sd_etat: f64,
    pub sd_trait: f64,
}

impl Default for StaiParams {
    fn default() -> Self {
        Self { mean_etat: 35.4,
               mean_trait: 34.8,
               sd_etat: 10.5,
               sd_trait: 9.2 }
    }
}

/// Escalas de 1 a 5 resumidas en una media (`oas`, `bmrq`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikertMeanParams {
    /// Un ítem marcado `-` puntúa `reverse_base - score`.
    pub reverse_base: f64,
}

impl Default for LikertMeanParams {
    fn default() -> Self {
        Self { reverse_base: 6.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    #[serde(rename = "+")]
    Direct,
    #[serde(rename = "-")]
    Reversed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaiaParams {
    /// Polaridad de cada pregunta (1..=32).
    pub reverse: BTreeMap<u32, Polarity>,
    /// Preguntas que promedia cada ítem, en orden de salida.
    pub items: IndexMap<String, Vec<u32>>,
}

impl Default for MaiaParams {
    fn default() -> Self {
        let reverse = (1..=32).map(|q| (q, if (5..=9).contains(&q) { Polarity::Reversed } else { Polarity::Direct }))
                              .collect();
        let groups: [(&str, std::ops::RangeInclusive<u32>); 8] = [("noticing", 1..=4),
                                                                  ("not_distracting", 5..=7),
                                                                  ("not_worrying", 8..=10),
                                                                  ("attention_regulation", 11..=17),
                                                                  ("emotional_awareness", 18..=22),
                                                                  ("self_regulation", 23..=26),
                                                                  ("body_listening", 27..=29),
                                                                  ("trusting", 30..=32)];
        let items = groups.into_iter().map(|(name, qs)| (name.to_string(), qs.collect())).collect();
        Self { reverse, items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maia_defaults_cover_all_questions() {
        let p = MaiaParams::default();
        assert_eq!(p.reverse.len(), 32);
        assert_eq!(p.reverse[&5], Polarity::Reversed);
        assert_eq!(p.reverse[&10], Polarity::Direct);
        let covered: usize = p.items.values().map(Vec::len).sum();
        assert_eq!(covered, 32);
        assert_eq!(p.items.keys().next().map(String::as_str), Some("noticing"));
    }

    #[test]
    fn maia_params_survive_json() {
        let v = serde_json::to_value(MaiaParams::default()).unwrap();
        assert_eq!(v["reverse"]["6"], json!("-"));
        let back: MaiaParams = serde_json::from_value(v).unwrap();
        assert_eq!(back.items.keys().collect::<Vec<_>>(), MaiaParams::default().items.keys().collect::<Vec<_>>());
        assert_eq!(back, MaiaParams::default());
    }

    #[test]
    fn power_at_resp_nests_psd_params() {
        let v = serde_json::to_value(PowerAtRespParams::default()).unwrap();
        assert_eq!(v["psd_params"]["lowest_freq"], json!(0.1));
        assert_eq!(v["resp_chan"], json!("RespiNasale"));
    }
}
