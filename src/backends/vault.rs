//! HashiCorp Vault signing backend
//!
//! The key material lives in a Vault KV secret; this backend fetches the hex
//! key over HTTP at construction time and wraps it in a local [`SecpSigner`].
//! The Vault round-trip happens once per descriptor load, not per signature.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use super::BackendError;
use crate::eth::SecpSigner;

fn default_port() -> u16 {
    8200
}

fn default_timeout() -> u64 {
    10_000
}

fn default_tls() -> bool {
    true
}

fn default_key_path() -> String {
    "/v1/secret/data/signing-key".to_string()
}

/// Config of a `hashicorp-signer` metadata descriptor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HashicorpConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// File holding the Vault token; only the first line is used
    pub auth_file: PathBuf,
    #[serde(default = "default_key_path")]
    pub signing_key_path: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_tls")]
    pub tls: bool,
}

impl HashicorpConfig {
    fn secret_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.signing_key_path)
    }
}

/// KV v2 read response: `{"data": {"data": {"value": "<hex key>"}}}`
#[derive(Deserialize)]
struct VaultSecret {
    data: VaultSecretData,
}

#[derive(Deserialize)]
struct VaultSecretData {
    data: VaultSecretValue,
}

#[derive(Deserialize)]
struct VaultSecretValue {
    value: String,
}

/// Fetch the signing key from Vault and build a local signer from it
pub async fn load_vault_signer(config: &HashicorpConfig) -> Result<SecpSigner, BackendError> {
    let token_raw =
        std::fs::read_to_string(&config.auth_file).map_err(|source| BackendError::Io {
            path: config.auth_file.display().to_string(),
            source,
        })?;
    let token = token_raw.lines().next().unwrap_or_default().trim();
    if token.is_empty() {
        return Err(BackendError::Vault(format!(
            "Auth file {} holds no token",
            config.auth_file.display()
        )));
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.timeout))
        .build()
        .map_err(|e| BackendError::Vault(e.to_string()))?;

    let url = config.secret_url();
    let response = client
        .get(&url)
        .header("X-Vault-Token", token)
        .send()
        .await
        .map_err(|e| BackendError::Vault(format!("GET {url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::Vault(format!("GET {url}: status {status}")));
    }

    let secret: VaultSecret =
        response.json().await.map_err(|e| BackendError::Vault(format!("GET {url}: {e}")))?;

    SecpSigner::from_hex(&secret.data.data.value)
        .map_err(|e| BackendError::InvalidKey(format!("Vault secret at {url}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_url_uses_tls_by_default() {
        let config: HashicorpConfig = toml::from_str(
            r#"
            host = "vault.internal"
            auth-file = "/etc/vault-token"
            "#,
        )
        .unwrap();
        assert_eq!(config.secret_url(), "https://vault.internal:8200/v1/secret/data/signing-key");
    }

    #[test]
    fn test_secret_url_respects_overrides() {
        let config: HashicorpConfig = toml::from_str(
            r#"
            host = "localhost"
            port = 8100
            auth-file = "/etc/vault-token"
            signing-key-path = "/v1/secret/data/proxy-key"
            tls = false
            "#,
        )
        .unwrap();
        assert_eq!(config.secret_url(), "http://localhost:8100/v1/secret/data/proxy-key");
    }

    #[test]
    fn test_kv2_response_shape() {
        let secret: VaultSecret = serde_json::from_str(
            r#"{"data":{"data":{"value":"0x4646464646464646464646464646464646464646464646464646464646464646"}}}"#,
        )
        .unwrap();
        assert!(secret.data.data.value.starts_with("0x4646"));
    }

    #[tokio::test]
    async fn test_missing_auth_file_is_io_error() {
        let config: HashicorpConfig = toml::from_str(
            r#"
            host = "localhost"
            auth-file = "/nonexistent/vault-token"
            "#,
        )
        .unwrap();
        assert!(matches!(load_vault_signer(&config).await, Err(BackendError::Io { .. })));
    }
}
