//! `raw_signals`: grabación de una sesión recortada a `session_duration`.
use std::fmt;
use std::sync::Arc;

use log::debug;
use respi_core::errors::ComputeFailure;
use respi_core::job::{ComputeCtx, TypedStage};
use respi_core::model::RunKey;

use super::RAW_SIGNALS;
use crate::artifacts::SignalsArtifact;
use crate::params::RawSignalsParams;
use crate::source::RecordingSource;

pub struct RawSignalsStage {
    source: Arc<dyn RecordingSource>,
}

impl RawSignalsStage {
    pub fn new(source: Arc<dyn RecordingSource>) -> Self {
        Self { source }
    }
}

impl fmt::Debug for RawSignalsStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSignalsStage").field("source", &self.source.location()).finish()
    }
}

impl TypedStage for RawSignalsStage {
    type Params = RawSignalsParams;
    type Output = SignalsArtifact;

    fn name(&self) -> &'static str {
        RAW_SIGNALS
    }

    fn compute_typed(&self, _ctx: &ComputeCtx, run_key: &RunKey, params: RawSignalsParams) -> Result<SignalsArtifact, ComputeFailure> {
        let recording = self.source.recording(run_key)?;
        let keep = (params.session_duration * recording.srate).round().max(0.0) as usize;
        let (chans, data) = recording.channels
                                     .into_iter()
                                     .map(|(chan, mut sig)| {
                                         sig.truncate(keep);
                                         (chan, sig)
                                     })
                                     .unzip();
        debug!("{run_key}: cropped recording to {keep} samples");
        Ok(SignalsArtifact { srate: recording.srate,
                             chans,
                             data,
                             schema_version: 1 })
    }
}
