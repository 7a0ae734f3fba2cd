//! Hash helpers: blake3 para identidades, sha256 para checksums de payload.

use blake3::Hasher;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::to_canonical_json;

/// Hashea un string y devuelve hex (64 caracteres).
pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

/// Hash de un `Value` sobre su forma canónica.
pub fn hash_value(value: &Value) -> String {
    hash_str(&to_canonical_json(value))
}

/// Checksum sha256 (hex) usado en el envelope en disco para detectar
/// payloads alterados o truncados.
pub fn checksum_sha256(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}
