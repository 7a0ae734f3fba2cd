//! Store en disco: un archivo JSON por (stage, identidad).
//!
//! Layout: `<root>/<stage>/<identity>.json`, donde `identity` es el hash
//! blake3 de la identidad. Cada archivo contiene un `StoredArtifact`
//! (envelope con versión de formato, identidad y checksum del artifact
//! completo: payload, attrs y metadata).
//!
//! Escritura: `<final>.tmp-<uuid>` -> `fsync` -> `rename` -> `fsync` del
//! directorio, así el rename sobrevive a un crash. Un lector nunca ve
//! un archivo a medio escribir y un crash a mitad de `save` deja, como mucho,
//! un temporal que `load` ignora (ver `sweep_temp_files`).
use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ArtifactStore;
use crate::constants::STORE_FORMAT_VERSION;
use crate::errors::StoreError;
use crate::hashing::{checksum_sha256, to_canonical_json};
use crate::model::{Artifact, ArtifactIdentity};

const TEMP_MARKER: &str = ".tmp-";

/// Envelope persistido.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub format_version: u32,
    pub stage: String,
    pub identity: String,
    /// sha256 del artifact canónico.
    pub checksum: String,
    pub artifact: Artifact,
}

impl StoredArtifact {
    fn wrap(identity: &ArtifactIdentity, artifact: &Artifact) -> Result<Self, serde_json::Error> {
        Ok(Self { format_version: STORE_FORMAT_VERSION,
                  stage: identity.stage.clone(),
                  identity: identity.hash.clone(),
                  checksum: artifact_checksum(artifact)?,
                  artifact: artifact.clone() })
    }
}

fn artifact_checksum(artifact: &Artifact) -> Result<String, serde_json::Error> {
    Ok(checksum_sha256(&to_canonical_json(&serde_json::to_value(artifact)?)))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

// Fuera de unix un directorio no se abre como archivo.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

fn io_err(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Io { path: path.display().to_string(),
                     message: e.to_string() }
}

#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Crea el store (y el directorio raíz si no existe).
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ruta determinista del artifact de una identidad.
    pub fn path_for(&self, identity: &ArtifactIdentity) -> PathBuf {
        self.root.join(&identity.stage).join(format!("{}.json", identity.hash))
    }

    fn corrupt(identity: &ArtifactIdentity, reason: impl Into<String>) -> StoreError {
        StoreError::Corrupt { stage: identity.stage.clone(),
                              identity: identity.hash.clone(),
                              reason: reason.into() }
    }

    /// Borra temporales huérfanos de escrituras interrumpidas. Devuelve
    /// cuántos se eliminaron. No tocar mientras otro proceso escribe.
    pub fn sweep_temp_files(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        let stages = fs::read_dir(&self.root).map_err(|e| io_err(&self.root, e))?;
        for stage_dir in stages {
            let stage_dir = stage_dir.map_err(|e| io_err(&self.root, e))?.path();
            if !stage_dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&stage_dir).map_err(|e| io_err(&stage_dir, e))? {
                let path = entry.map_err(|e| io_err(&stage_dir, e))?.path();
                let is_temp = path.file_name()
                                  .and_then(|n| n.to_str())
                                  .map(|n| n.contains(TEMP_MARKER))
                                  .unwrap_or(false);
                if is_temp {
                    fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            warn!("removed {removed} orphan temp artifact(s) under {}", self.root.display());
        }
        Ok(removed)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn has(&self, identity: &ArtifactIdentity) -> bool {
        self.path_for(identity).is_file()
    }

    fn load(&self, identity: &ArtifactIdentity) -> Result<Artifact, StoreError> {
        let path = self.path_for(identity);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound { stage: identity.stage.clone(),
                                                  identity: identity.hash.clone() })
            }
            Err(e) => return Err(io_err(&path, e)),
        };
        let stored: StoredArtifact =
            serde_json::from_slice(&bytes).map_err(|e| Self::corrupt(identity, format!("unreadable envelope: {e}")))?;
        if stored.format_version != STORE_FORMAT_VERSION {
            return Err(Self::corrupt(identity,
                                     format!("format version {} (expected {})", stored.format_version, STORE_FORMAT_VERSION)));
        }
        if stored.identity != identity.hash || stored.stage != identity.stage {
            return Err(Self::corrupt(identity, format!("envelope belongs to {}/{}", stored.stage, stored.identity)));
        }
        let checksum = artifact_checksum(&stored.artifact).map_err(|e| Self::corrupt(identity, format!("unhashable artifact: {e}")))?;
        if stored.checksum != checksum {
            return Err(Self::corrupt(identity, "artifact checksum mismatch"));
        }
        debug!("loaded {}/{} from {}", identity.stage, identity.short(), path.display());
        Ok(stored.artifact)
    }

    fn save(&self, identity: &ArtifactIdentity, artifact: &Artifact) -> Result<(), StoreError> {
        let path = self.path_for(identity);
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        let bytes = StoredArtifact::wrap(identity, artifact)
            .and_then(|stored| serde_json::to_vec(&stored))
            .map_err(|e| StoreError::Io { path: path.display().to_string(),
                                          message: format!("serialize: {e}") })?;
        let tmp = dir.join(format!("{}.json{}{}", identity.hash, TEMP_MARKER, Uuid::new_v4()));
        let written = File::create(&tmp).and_then(|mut f| {
                                             f.write_all(&bytes)?;
                                             f.sync_all()
                                         })
                                         .and_then(|_| fs::rename(&tmp, &path))
                                         .and_then(|_| sync_dir(&dir));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(&path, e));
        }
        debug!("saved {}/{} ({} bytes)", identity.stage, identity.short(), bytes.len());
        Ok(())
    }

    fn invalidate(&self, identity: &ArtifactIdentity) -> Result<(), StoreError> {
        let path = self.path_for(identity);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sealed(identity: &ArtifactIdentity, payload: serde_json::Value) -> Artifact {
        let mut art = Artifact::json(payload).with_attr("srate", 512.0);
        art.seal(identity);
        art
    }

    #[test]
    fn roundtrip_keeps_attrs_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        let id = ArtifactIdentity::derive("psd_eeg", "P02_baseline".into(), json!({"lowest_freq": 0.1}));
        let art = sealed(&id, json!({"power": [0.1, 0.30000000000000004, 1e-12]}));
        store.save(&id, &art).unwrap();
        assert!(store.has(&id));
        let back = store.load(&id).unwrap();
        assert_eq!(back, art);
        assert_eq!(store.path_for(&id), dir.path().join("psd_eeg").join(format!("{}.json", id.hash)));
    }

    #[test]
    fn truncated_file_is_corrupt_not_a_result() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        let id = ArtifactIdentity::derive("psd_eeg", "P02_baseline".into(), json!({}));
        store.save(&id, &sealed(&id, json!({"power": [1.0, 2.0, 3.0]}))).unwrap();
        let path = store.path_for(&id);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(store.load(&id), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn tampered_payload_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        let id = ArtifactIdentity::derive("maia", "P01".into(), json!({}));
        store.save(&id, &sealed(&id, json!({"noticing": 3.0}))).unwrap();
        let path = store.path_for(&id);
        let mut env: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        env["artifact"]["payload"]["noticing"] = json!(4.0);
        fs::write(&path, serde_json::to_vec(&env).unwrap()).unwrap();
        let err = store.load(&id).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref reason, .. } if reason.contains("checksum")));
    }

    #[test]
    fn tampered_attrs_or_metadata_fail_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        let id = ArtifactIdentity::derive("psd_eeg", "P01_baseline".into(), json!({}));
        store.save(&id, &sealed(&id, json!({"power": [1.0]}))).unwrap();
        let path = store.path_for(&id);
        let original = fs::read(&path).unwrap();

        let mut env: serde_json::Value = serde_json::from_slice(&original).unwrap();
        env["artifact"]["attrs"]["srate"] = json!(256.0);
        fs::write(&path, serde_json::to_vec(&env).unwrap()).unwrap();
        assert!(matches!(store.load(&id), Err(StoreError::Corrupt { ref reason, .. }) if reason.contains("checksum")));

        let mut env: serde_json::Value = serde_json::from_slice(&original).unwrap();
        env["artifact"]["metadata"]["run_key"] = json!("P02_baseline");
        fs::write(&path, serde_json::to_vec(&env).unwrap()).unwrap();
        assert!(matches!(store.load(&id), Err(StoreError::Corrupt { .. })));

        fs::write(&path, &original).unwrap();
        assert!(store.load(&id).is_ok());
    }

    #[test]
    fn save_leaves_only_the_final_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        let id = ArtifactIdentity::derive("raw_signals", "P03_music".into(), json!({}));
        store.save(&id, &sealed(&id, json!({"x": [1.0, 2.0]}))).unwrap();
        store.save(&id, &sealed(&id, json!({"x": [1.0, 2.0]}))).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path().join("raw_signals")).unwrap()
                                                                       .map(|e| e.unwrap().file_name())
                                                                       .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(format!("{}.json", id.hash))]);
        sync_dir(&dir.path().join("raw_signals")).unwrap();
        assert_eq!(store.sweep_temp_files().unwrap(), 0);
    }

    #[test]
    fn envelope_from_other_identity_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        let a = ArtifactIdentity::derive("maia", "P01".into(), json!({}));
        let b = ArtifactIdentity::derive("maia", "P02".into(), json!({}));
        store.save(&a, &sealed(&a, json!({"x": 1}))).unwrap();
        fs::copy(store.path_for(&a), store.path_for(&b)).unwrap();
        assert!(matches!(store.load(&b), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn orphan_temp_file_is_invisible_and_swept() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        let id = ArtifactIdentity::derive("psd_eeg", "P05_odor".into(), json!({}));
        let stage_dir = dir.path().join("psd_eeg");
        fs::create_dir_all(&stage_dir).unwrap();
        fs::write(stage_dir.join(format!("{}.json{}crash", id.hash, TEMP_MARKER)), b"{\"format_ver").unwrap();
        assert!(!store.has(&id));
        assert!(matches!(store.load(&id), Err(StoreError::NotFound { .. })));
        assert_eq!(store.sweep_temp_files().unwrap(), 1);
    }

    #[test]
    fn invalidate_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        let id = ArtifactIdentity::derive("maia", "P09".into(), json!({}));
        store.invalidate(&id).unwrap();
    }
}
