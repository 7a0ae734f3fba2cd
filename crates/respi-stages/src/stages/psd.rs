//! `psd_eeg`: Welch por canal EEG sobre `raw_signals`.
use log::debug;
use respi_core::errors::ComputeFailure;
use respi_core::job::{ComputeCtx, TypedStage};
use respi_core::model::RunKey;

use super::{dependency_options, PSD_EEG, RAW_SIGNALS};
use crate::artifacts::{PsdArtifact, SignalsArtifact};
use crate::params::PsdParams;
use crate::spectral::welch;

#[derive(Debug, Clone, Copy, Default)]
pub struct PsdEegStage;

impl TypedStage for PsdEegStage {
    type Params = PsdParams;
    type Output = PsdArtifact;

    fn name(&self) -> &'static str {
        PSD_EEG
    }

    fn compute_typed(&self, ctx: &ComputeCtx, run_key: &RunKey, params: PsdParams) -> Result<PsdArtifact, ComputeFailure> {
        let raw = ctx.get_typed::<SignalsArtifact>(RAW_SIGNALS, run_key, &dependency_options(&params.raw_signals())?)?
                     .inner;
        let mut freqs = Vec::new();
        let mut chans = Vec::new();
        let mut psd = Vec::new();
        for (chan, sig) in raw.chans.iter().zip(&raw.data) {
            if params.exclude_chans.contains(chan) {
                continue;
            }
            let spectrum = welch(sig, raw.srate, params.lowest_freq)?;
            freqs = spectrum.freqs;
            chans.push(chan.clone());
            psd.push(spectrum.power);
        }
        debug!("{run_key}: psd over {} channels, {} bins", chans.len(), freqs.len());
        Ok(PsdArtifact { srate: raw.srate,
                         freqs,
                         chans,
                         psd,
                         schema_version: 1 })
    }
}
