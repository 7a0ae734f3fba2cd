//! `power_at_resp` y su agregado global `power_at_resp_concat`.
//!
//! Para cada sesión: pico del espectro respiratorio por debajo de 1 Hz y
//! potencia EEG de cada canal en esa frecuencia.
use log::{debug, info};
use respi_core::errors::ComputeFailure;
use respi_core::job::{ComputeCtx, TypedStage};
use respi_core::model::RunKey;

use super::{dependency_options, split_run_key, POWER_AT_RESP, POWER_AT_RESP_CONCAT, PSD_EEG, RAW_SIGNALS};
use crate::artifacts::{PowerAtRespArtifact, PowerAtRespRow, PsdArtifact, SignalsArtifact};
use crate::errors::StageError;
use crate::params::{PowerAtRespConcatParams, PowerAtRespParams, RawSignalsParams};
use crate::spectral::{nearest_index, peak_below, welch};

/// Límite superior de la banda respiratoria (Hz).
pub const RESP_BAND_MAX: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct PowerAtRespStage;

impl TypedStage for PowerAtRespStage {
    type Params = PowerAtRespParams;
    type Output = PowerAtRespArtifact;

    fn name(&self) -> &'static str {
        POWER_AT_RESP
    }

    fn compute_typed(&self, ctx: &ComputeCtx, run_key: &RunKey, params: PowerAtRespParams) -> Result<PowerAtRespArtifact, ComputeFailure> {
        let (participant, session) = split_run_key(run_key)?;
        let psd = ctx.get_typed::<PsdArtifact>(PSD_EEG, run_key, &dependency_options(&params.psd_params)?)?.inner;
        let raw_params = RawSignalsParams { session_duration: params.session_duration };
        let raw = ctx.get_typed::<SignalsArtifact>(RAW_SIGNALS, run_key, &dependency_options(&raw_params)?)?.inner;

        let resp = raw.channel(&params.resp_chan)
                      .ok_or_else(|| StageError::MissingChannel { chan: params.resp_chan.clone() })?;
        let resp = &resp[..resp.len().saturating_sub(1)];
        let spectrum = welch(resp, raw.srate, params.lowest_freq_psd_resp)?;
        let peak = peak_below(&spectrum, RESP_BAND_MAX)?;
        let fmax_resp = spectrum.freqs[peak];
        let max_resp = spectrum.power[peak];
        let eeg_bin = nearest_index(&psd.freqs, fmax_resp).ok_or(StageError::EmptyBand(RESP_BAND_MAX))?;
        debug!("{run_key}: respiration peak {fmax_resp:.3} Hz");

        let rows = psd.chans
                      .iter()
                      .zip(&psd.psd)
                      .map(|(chan, power)| PowerAtRespRow { participant: participant.clone(),
                                                            session: session.clone(),
                                                            chan: chan.clone(),
                                                            fmax_resp,
                                                            max_resp,
                                                            max_eeg: power[eeg_bin] })
                      .collect();
        Ok(PowerAtRespArtifact { rows, schema_version: 1 })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PowerAtRespConcatStage;

impl TypedStage for PowerAtRespConcatStage {
    type Params = PowerAtRespConcatParams;
    type Output = PowerAtRespArtifact;

    fn name(&self) -> &'static str {
        POWER_AT_RESP_CONCAT
    }

    fn compute_typed(&self, ctx: &ComputeCtx, run_key: &RunKey, params: PowerAtRespConcatParams) -> Result<PowerAtRespArtifact, ComputeFailure> {
        if !run_key.is_global() {
            return Err(StageError::NotGlobalKey { stage: POWER_AT_RESP_CONCAT.to_string(),
                                                  got: run_key.to_string() }.into());
        }
        let opts = dependency_options(&params.power_at_resp_params)?;
        let mut rows = Vec::new();
        for key in &params.run_keys {
            let part = ctx.get_typed::<PowerAtRespArtifact>(POWER_AT_RESP, key, &opts)?;
            rows.extend(part.inner.rows);
        }
        info!("concatenated {} rows from {} run keys", rows.len(), params.run_keys.len());
        Ok(PowerAtRespArtifact { rows, schema_version: 1 })
    }
}
