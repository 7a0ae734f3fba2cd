//! Densidad espectral de potencia por el método de Welch.
//!
//! - ventana Hann periódica de `nperseg = ceil(5 · srate / lowest_freq)`
//!   muestras (cinco ciclos de la frecuencia más baja de interés);
//! - solapamiento del 50%, detrend constante por segmento;
//! - `nfft` = siguiente potencia de dos de `nperseg` (zero padding);
//! - escala de densidad `1 / (srate · Σw²)`, espectro de una cara (los bins
//!   interiores se duplican).
use std::f64::consts::PI;

use rustfft::{num_complex::Complex, FftPlanner};

use crate::errors::StageError;

/// Ciclos de `lowest_freq` que debe contener cada ventana.
pub const WINDOW_CYCLES: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub freqs: Vec<f64>,
    pub power: Vec<f64>,
}

impl Spectrum {
    pub fn resolution(&self) -> f64 {
        self.freqs.get(1).copied().unwrap_or(0.0)
    }
}

pub fn hann_periodic(n: usize) -> Vec<f64> {
    (0..n).map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos()).collect()
}

pub fn segment_length(srate: f64, lowest_freq: f64) -> Result<usize, StageError> {
    if !(srate.is_finite() && srate > 0.0) {
        return Err(StageError::InvalidSpectrum(format!("srate must be positive, got {srate}")));
    }
    if !(lowest_freq.is_finite() && lowest_freq > 0.0) {
        return Err(StageError::InvalidSpectrum(format!("lowest_freq must be positive, got {lowest_freq}")));
    }
    Ok(((WINDOW_CYCLES * srate / lowest_freq).ceil() as usize).max(2))
}

pub fn welch(signal: &[f64], srate: f64, lowest_freq: f64) -> Result<Spectrum, StageError> {
    let nperseg = segment_length(srate, lowest_freq)?;
    if signal.len() < nperseg {
        return Err(StageError::SignalTooShort { len: signal.len(),
                                                needed: nperseg,
                                                lowest_freq });
    }
    let nfft = nperseg.next_power_of_two();
    let step = (nperseg / 2).max(1);
    let window = hann_periodic(nperseg);
    let scale = 1.0 / (srate * window.iter().map(|w| w * w).sum::<f64>());
    let nbins = nfft / 2 + 1;

    let fft = FftPlanner::<f64>::new().plan_fft_forward(nfft);
    let mut buffer = vec![Complex::new(0.0, 0.0); nfft];
    let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

    let mut power = vec![0.0; nbins];
    let mut segments = 0usize;
    let mut start = 0;
    while start + nperseg <= signal.len() {
        let seg = &signal[start..start + nperseg];
        let mean = seg.iter().sum::<f64>() / nperseg as f64;
        buffer.fill(Complex::new(0.0, 0.0));
        for (slot, (x, w)) in buffer.iter_mut().zip(seg.iter().zip(&window)) {
            *slot = Complex::new((x - mean) * w, 0.0);
        }
        fft.process_with_scratch(&mut buffer, &mut scratch);
        for (p, c) in power.iter_mut().zip(&buffer) {
            *p += c.norm_sqr() * scale;
        }
        segments += 1;
        start += step;
    }

    let last = nbins - 1;
    for (k, p) in power.iter_mut().enumerate() {
        *p /= segments as f64;
        if k != 0 && k != last {
            *p *= 2.0;
        }
    }
    let freqs = (0..nbins).map(|k| k as f64 * srate / nfft as f64).collect();
    Ok(Spectrum { freqs, power })
}

/// Índice del bin más cercano a `freq` (`freqs` ordenado ascendente).
pub fn nearest_index(freqs: &[f64], freq: f64) -> Option<usize> {
    freqs.iter()
         .enumerate()
         .min_by(|(_, a), (_, b)| (*a - freq).abs().total_cmp(&(*b - freq).abs()))
         .map(|(i, _)| i)
}

/// Índice del máximo de `power` entre los bins con `freq < below`.
pub fn peak_below(spectrum: &Spectrum, below: f64) -> Result<usize, StageError> {
    spectrum.freqs
            .iter()
            .zip(&spectrum.power)
            .enumerate()
            .filter(|(_, (f, _))| **f < below)
            .max_by(|(_, (_, a)), (_, (_, b))| a.total_cmp(b))
            .map(|(i, _)| i)
            .ok_or(StageError::EmptyBand(below))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, srate: f64, secs: f64) -> Vec<f64> {
        let n = (srate * secs) as usize;
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / srate).sin()).collect()
    }

    #[test]
    fn sine_peak_lands_on_its_bin() {
        let spec = welch(&sine(10.0, 100.0, 60.0), 100.0, 1.0).unwrap();
        let peak = peak_below(&spec, 50.0).unwrap();
        assert!((spec.freqs[peak] - 10.0).abs() <= spec.resolution());
    }

    #[test]
    fn total_power_matches_variance() {
        let spec = welch(&sine(10.0, 100.0, 60.0), 100.0, 1.0).unwrap();
        let total: f64 = spec.power.iter().sum::<f64>() * spec.resolution();
        assert!((total - 0.5).abs() < 0.05, "total power {total}");
    }

    #[test]
    fn too_short_signal_is_rejected() {
        let err = welch(&[0.0; 100], 10.0, 0.1).unwrap_err();
        assert_eq!(err, StageError::SignalTooShort { len: 100, needed: 500, lowest_freq: 0.1 });
    }

    #[test]
    fn nearest_bin() {
        assert_eq!(nearest_index(&[0.0, 0.25, 0.5, 0.75], 0.3), Some(1));
        assert_eq!(nearest_index(&[], 0.3), None);
    }

    #[test]
    fn window_is_periodic() {
        let w = hann_periodic(4);
        assert_eq!(w[0], 0.0);
        assert!((w[2] - 1.0).abs() < 1e-12);
    }
}
