//! Diseño del estudio: sujetos, sesiones y canales.
use respi_core::model::{cross_keys, RunKey};

/// P22 queda fuera (registro con artefactos).
pub const SUBJECT_KEYS: [&str; 30] = ["P01", "P02", "P03", "P04", "P05", "P06", "P07", "P08", "P09", "P10", "P11", "P12", "P13", "P14", "P15",
                                      "P16", "P17", "P18", "P19", "P20", "P21", "P23", "P24", "P25", "P26", "P27", "P28", "P29", "P30", "P31"];

pub const SESSION_KEYS: [&str; 3] = ["baseline", "music", "odor"];

/// Sesiones de los cuestionarios STAI.
pub const STAI_SESSION_KEYS: [&str; 2] = ["ses01", "ses02"];

pub const BIO_CHANS: [&str; 4] = ["ECG", "RespiNasale", "RespiVentrale", "GSR"];

/// Duración analizada de cada sesión, en segundos.
pub const SESSION_DURATION: f64 = 600.0;

pub fn subject_keys() -> Vec<RunKey> {
    SUBJECT_KEYS.iter().map(|s| RunKey::from(*s)).collect()
}

/// sujeto × sesión, sujeto mayor.
pub fn run_keys() -> Vec<RunKey> {
    cross_keys(&SUBJECT_KEYS, &SESSION_KEYS)
}

pub fn stai_run_keys() -> Vec<RunKey> {
    cross_keys(&SUBJECT_KEYS, &STAI_SESSION_KEYS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_keys_cover_every_session() {
        let keys = run_keys();
        assert_eq!(keys.len(), 90);
        assert_eq!(keys[0].as_str(), "P01_baseline");
        assert_eq!(keys[2].as_str(), "P01_odor");
        assert!(!keys.iter().any(|k| k.as_str().starts_with("P22")));
        assert_eq!(stai_run_keys()[1].as_str(), "P01_ses02");
    }
}
