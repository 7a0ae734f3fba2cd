//! Cuestionarios: `stai_longform` (por sujeto × sesión), `maia`, `oas` y
//! `bmrq` (por sujeto).
//!
//! En STAI y MAIA un ítem invertido puntúa `5 - score`; `oas` y `bmrq` usan
//! `reverse_base` (6 por defecto) y se resumen en la media.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use respi_core::errors::ComputeFailure;
use respi_core::job::{ComputeCtx, TypedStage};
use respi_core::model::RunKey;

use super::{split_run_key, BMRQ, MAIA, OAS, STAI_LONGFORM};
use crate::artifacts::{MaiaArtifact, ScaleMeanArtifact, StaiArtifact};
use crate::errors::StageError;
use crate::params::{LikertMeanParams, MaiaParams, Polarity, StaiParams};
use crate::source::{QuestionnaireRow, RecordingSource};

/// Preguntas de la escala de estado; el resto es rasgo.
pub const STAI_STATE_QUESTIONS: usize = 20;

const REVERSE_BASE: f64 = 5.0;

fn interpret(score: f64, mean: f64, sd: f64) -> &'static str {
    if score > mean + 1.96 * sd {
        "anxious"
    } else if score < mean - 1.96 * sd {
        "less than anxious"
    } else {
        "within norms"
    }
}

/// (estado, rasgo) en el orden de filas del cuestionario.
pub fn score_stai(rows: &[QuestionnaireRow]) -> (f64, f64) {
    let corrected = rows.iter().map(|r| if r.is_reversed() { REVERSE_BASE - r.score } else { r.score });
    let (state, trait_) = corrected.enumerate()
                                   .fold((0.0, 0.0), |(s, t), (i, score)| if i < STAI_STATE_QUESTIONS { (s + score, t) } else { (s, t + score) });
    (state, trait_)
}

/// Media de cada ítem MAIA tras aplicar la polaridad de cada pregunta.
pub fn score_maia(rows: &[QuestionnaireRow], params: &MaiaParams) -> Result<IndexMap<String, f64>, StageError> {
    let mut corrected = HashMap::with_capacity(rows.len());
    for row in rows {
        let score = match params.reverse.get(&row.question) {
            Some(Polarity::Direct) => row.score,
            Some(Polarity::Reversed) => REVERSE_BASE - row.score,
            None => return Err(StageError::UnknownQuestion(row.question)),
        };
        corrected.insert(row.question, score);
    }
    params.items
          .iter()
          .map(|(item, questions)| {
              let answered: Vec<f64> = questions.iter().filter_map(|q| corrected.get(q).copied()).collect();
              if answered.is_empty() {
                  return Err(StageError::EmptyItem { item: item.clone() });
              }
              Ok((item.clone(), answered.iter().sum::<f64>() / answered.len() as f64))
          })
          .collect()
}

pub fn score_mean(scale: &str, rows: &[QuestionnaireRow], reverse_base: f64) -> Result<f64, StageError> {
    if rows.is_empty() {
        return Err(StageError::EmptyItem { item: scale.to_string() });
    }
    let total: f64 = rows.iter().map(|r| if r.is_reversed() { reverse_base - r.score } else { r.score }).sum();
    Ok(total / rows.len() as f64)
}

pub struct StaiLongformStage {
    source: Arc<dyn RecordingSource>,
}

impl StaiLongformStage {
    pub fn new(source: Arc<dyn RecordingSource>) -> Self {
        Self { source }
    }
}

impl fmt::Debug for StaiLongformStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaiLongformStage").field("source", &self.source.location()).finish()
    }
}

impl TypedStage for StaiLongformStage {
    type Params = StaiParams;
    type Output = StaiArtifact;

    fn name(&self) -> &'static str {
        STAI_LONGFORM
    }

    fn compute_typed(&self, _ctx: &ComputeCtx, run_key: &RunKey, params: StaiParams) -> Result<StaiArtifact, ComputeFailure> {
        let (participant, session) = split_run_key(run_key)?;
        let rows = self.source.questionnaire("stai", run_key)?;
        let (state, trait_) = score_stai(&rows);
        Ok(StaiArtifact { participant,
                          session,
                          state,
                          trait_,
                          interpretation_state: interpret(state, params.mean_etat, params.sd_etat).to_string(),
                          interpretation_trait: interpret(trait_, params.mean_trait, params.sd_trait).to_string(),
                          schema_version: 1 })
    }
}

pub struct MaiaStage {
    source: Arc<dyn RecordingSource>,
}

impl MaiaStage {
    pub fn new(source: Arc<dyn RecordingSource>) -> Self {
        Self { source }
    }
}

impl fmt::Debug for MaiaStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaiaStage").field("source", &self.source.location()).finish()
    }
}

impl TypedStage for MaiaStage {
    type Params = MaiaParams;
    type Output = MaiaArtifact;

    fn name(&self) -> &'static str {
        MAIA
    }

    fn compute_typed(&self, _ctx: &ComputeCtx, run_key: &RunKey, params: MaiaParams) -> Result<MaiaArtifact, ComputeFailure> {
        let rows = self.source.questionnaire("maia", run_key)?;
        Ok(MaiaArtifact { participant: run_key.to_string(),
                          scores: score_maia(&rows, &params)?,
                          schema_version: 1 })
    }
}

/// Cuestionario por sujeto que se resume en la media de sus respuestas.
pub struct LikertMeanStage {
    name: &'static str,
    source: Arc<dyn RecordingSource>,
}

impl LikertMeanStage {
    /// Odor Awareness Scale.
    pub fn oas(source: Arc<dyn RecordingSource>) -> Self {
        Self { name: OAS, source }
    }

    /// Barcelona Music Reward Questionnaire.
    pub fn bmrq(source: Arc<dyn RecordingSource>) -> Self {
        Self { name: BMRQ, source }
    }
}

impl fmt::Debug for LikertMeanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LikertMeanStage")
         .field("name", &self.name)
         .field("source", &self.source.location())
         .finish()
    }
}

impl TypedStage for LikertMeanStage {
    type Params = LikertMeanParams;
    type Output = ScaleMeanArtifact;

    fn name(&self) -> &'static str {
        self.name
    }

    fn compute_typed(&self, _ctx: &ComputeCtx, run_key: &RunKey, params: LikertMeanParams) -> Result<ScaleMeanArtifact, ComputeFailure> {
        let rows = self.source.questionnaire(self.name, run_key)?;
        Ok(ScaleMeanArtifact { participant: run_key.to_string(),
                               scale: self.name.to_uppercase(),
                               score: score_mean(self.name, &rows, params.reverse_base)?,
                               schema_version: 1 })
    }
}
