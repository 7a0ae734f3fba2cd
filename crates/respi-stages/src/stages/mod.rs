//! Stages del estudio y su alta en un registry.
//!
//! Grafo de dependencias:
//! `raw_signals` <- `psd_eeg` <- `power_at_resp` <- `power_at_resp_concat`
//! (`power_at_resp` también lee `raw_signals`). `stai_longform`, `maia`,
//! `oas` y `bmrq` leen directamente los cuestionarios.
mod power_at_resp;
mod psd;
mod questionnaires;
mod raw_signals;

pub use power_at_resp::{PowerAtRespConcatStage, PowerAtRespStage};
pub use psd::PsdEegStage;
pub use questionnaires::{score_maia, score_mean, score_stai, LikertMeanStage, MaiaStage, StaiLongformStage};
pub use raw_signals::RawSignalsStage;

use std::sync::Arc;

use respi_core::errors::{ComputeFailure, JobError};
use respi_core::job::GetOptions;
use respi_core::model::RunKey;
use respi_core::registry::Registry;
use respi_core::store::ArtifactStore;
use respi_core::Job;
use serde::Serialize;

use crate::errors::StageError;
use crate::source::RecordingSource;
use crate::study;

pub const RAW_SIGNALS: &str = "raw_signals";
pub const PSD_EEG: &str = "psd_eeg";
pub const POWER_AT_RESP: &str = "power_at_resp";
pub const POWER_AT_RESP_CONCAT: &str = "power_at_resp_concat";
pub const STAI_LONGFORM: &str = "stai_longform";
pub const MAIA: &str = "maia";
pub const OAS: &str = "oas";
pub const BMRQ: &str = "bmrq";

/// `P02_baseline` -> (`P02`, `baseline`).
pub(crate) fn split_run_key(run_key: &RunKey) -> Result<(String, String), StageError> {
    run_key.subject_session()
           .filter(|(sub, ses)| !sub.is_empty() && !ses.is_empty())
           .map(|(sub, ses)| (sub.to_string(), ses.to_string()))
           .ok_or_else(|| StageError::InvalidRunKey(run_key.to_string()))
}

/// Opciones para pedir una dependencia con sus params anidados.
pub(crate) fn dependency_options(params: &impl Serialize) -> Result<GetOptions, ComputeFailure> {
    Ok(GetOptions::new().with_overrides(serde_json::to_value(params)?))
}

/// Run keys con las que se calcula `stage` sobre todo el estudio.
pub fn default_run_keys(stage: &str) -> Vec<RunKey> {
    match stage {
        POWER_AT_RESP_CONCAT => vec![RunKey::global()],
        MAIA | OAS | BMRQ => study::subject_keys(),
        STAI_LONGFORM => study::stai_run_keys(),
        _ => study::run_keys(),
    }
}

/// Registra los stages del estudio sobre un mismo store.
pub fn register_study_stages(registry: &Arc<Registry>,
                             store: Arc<dyn ArtifactStore>,
                             source: Arc<dyn RecordingSource>)
                             -> Result<Vec<Arc<Job>>, JobError> {
    let jobs = vec![Job::typed(RawSignalsStage::new(source.clone()), store.clone())?,
                    Job::typed(PsdEegStage, store.clone())?,
                    Job::typed(PowerAtRespStage, store.clone())?,
                    Job::typed(PowerAtRespConcatStage, store.clone())?,
                    Job::typed(StaiLongformStage::new(source.clone()), store.clone())?,
                    Job::typed(MaiaStage::new(source.clone()), store.clone())?,
                    Job::typed(LikertMeanStage::oas(source.clone()), store.clone())?,
                    Job::typed(LikertMeanStage::bmrq(source), store)?];
    jobs.into_iter().map(|job| registry.register(job).map_err(JobError::from)).collect()
}
