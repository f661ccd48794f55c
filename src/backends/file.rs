//! File-based signing backend
//!
//! A key file holds the hex-encoded secp256k1 key material; its companion
//! password file holds the decryption passphrase. Only content up to the first
//! line of the password file matters. Keystore decryption itself happens
//! outside this service, so the passphrase is required and read but the key
//! file is expected to carry the usable hex key.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::BackendError;
use crate::eth::SecpSigner;

/// Config of a `file-based-signer` metadata descriptor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileBasedConfig {
    pub key_file: PathBuf,
    pub password_file: PathBuf,
}

/// Load a signer from a key/password file pair
pub fn load_key_pair(key_file: &Path, password_file: &Path) -> Result<SecpSigner, BackendError> {
    let read = |path: &Path| {
        std::fs::read_to_string(path).map_err(|source| BackendError::Io {
            path: path.display().to_string(),
            source,
        })
    };

    let password_raw = read(password_file)?;
    let password = password_raw.lines().next().unwrap_or_default();
    if password.is_empty() {
        return Err(BackendError::InvalidKey(format!(
            "Password file {} is empty",
            password_file.display()
        )));
    }

    let key_hex = read(key_file)?;
    SecpSigner::from_hex(key_hex.trim())
        .map_err(|e| BackendError::InvalidKey(format!("{}: {e}", key_file.display())))
}
