//! Azure Key Vault signing backend
//!
//! The private key never leaves the vault: the address is derived from the
//! public JWK at construction, and every signature is a remote ES256K digest
//! sign. Azure returns a bare `r || s`, so the recovery id is reconstructed by
//! trial recovery against the known address.

use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use base64::Engine;
use k256::ecdsa::{RecoveryId, VerifyingKey};
use serde::Deserialize;

use super::BackendError;
use crate::eth::signer::{address_from_verifying_key, EcdsaSignature, Signer, SignerError};

const API_VERSION: &str = "7.4";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn default_tenant() -> String {
    "common".to_string()
}

/// Config of an `azure-signer` metadata descriptor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AzureConfig {
    pub key_vault_name: String,
    pub key_name: String,
    pub key_version: String,
    pub client_id: String,
    pub client_secret: String,
    /// AAD tenant for the client-credentials token request
    #[serde(default = "default_tenant")]
    pub tenant: String,
}

impl AzureConfig {
    fn key_url(&self) -> String {
        format!(
            "https://{}.vault.azure.net/keys/{}/{}",
            self.key_vault_name, self.key_name, self.key_version
        )
    }

    fn token_url(&self) -> String {
        format!("https://login.microsoftonline.com/{}/oauth2/v2.0/token", self.tenant)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Subset of the Key Vault JWK we need: the secp256k1 curve point
#[derive(Deserialize)]
struct KeyResponse {
    key: JsonWebKey,
}

#[derive(Deserialize)]
struct JsonWebKey {
    crv: String,
    x: String,
    y: String,
}

#[derive(Deserialize)]
struct SignResponse {
    value: String,
}

/// Remote signer backed by one Azure Key Vault key
pub struct AzureSigner {
    client: reqwest::Client,
    config: AzureConfig,
    address: Address,
}

impl AzureSigner {
    /// Authenticate, fetch the public key, and derive the signing address
    pub async fn connect(config: AzureConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Azure(e.to_string()))?;

        let token = fetch_token(&client, &config).await?;

        let url = format!("{}?api-version={API_VERSION}", config.key_url());
        let response = client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| BackendError::Azure(format!("getKey: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Azure(format!("getKey: status {status}")));
        }
        let key: KeyResponse =
            response.json().await.map_err(|e| BackendError::Azure(format!("getKey: {e}")))?;

        let address = address_from_jwk(&key.key)?;

        Ok(Self { client, config, address })
    }

    async fn remote_sign(&self, hash: &B256) -> Result<EcdsaSignature, BackendError> {
        let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let token = fetch_token(&self.client, &self.config).await?;

        let url = format!("{}/sign?api-version={API_VERSION}", self.config.key_url());
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "alg": "ES256K",
                "value": b64.encode(hash.as_slice()),
            }))
            .send()
            .await
            .map_err(|e| BackendError::Azure(format!("sign: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Azure(format!("sign: status {status}")));
        }
        let signed: SignResponse =
            response.json().await.map_err(|e| BackendError::Azure(format!("sign: {e}")))?;

        let raw = b64
            .decode(&signed.value)
            .map_err(|e| BackendError::Azure(format!("sign: bad signature encoding: {e}")))?;

        recoverable_from_raw(&raw, hash, &self.address)
    }
}

#[async_trait::async_trait]
impl Signer for AzureSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_hash(&self, hash: &B256) -> Result<EcdsaSignature, SignerError> {
        self.remote_sign(hash).await.map_err(|e| SignerError::Backend(e.to_string()))
    }
}

async fn fetch_token(
    client: &reqwest::Client,
    config: &AzureConfig,
) -> Result<String, BackendError> {
    let response = client
        .post(config.token_url())
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("scope", "https://vault.azure.net/.default"),
        ])
        .send()
        .await
        .map_err(|e| BackendError::Azure(format!("token: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::Azure(format!("token: status {status}")));
    }
    let token: TokenResponse =
        response.json().await.map_err(|e| BackendError::Azure(format!("token: {e}")))?;
    Ok(token.access_token)
}

/// Derive the Ethereum address from a secp256k1 JWK
fn address_from_jwk(jwk: &JsonWebKey) -> Result<Address, BackendError> {
    if jwk.crv != "P-256K" && jwk.crv != "SECP256K1" {
        return Err(BackendError::Azure(format!("Unexpected key curve {:?}", jwk.crv)));
    }

    let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let x = b64.decode(&jwk.x).map_err(|e| BackendError::Azure(format!("JWK x: {e}")))?;
    let y = b64.decode(&jwk.y).map_err(|e| BackendError::Azure(format!("JWK y: {e}")))?;
    if x.len() != 32 || y.len() != 32 {
        return Err(BackendError::Azure("JWK coordinates are not 32 bytes".to_string()));
    }

    // Uncompressed SEC1 point: 0x04 || x || y
    let mut sec1 = Vec::with_capacity(65);
    sec1.push(0x04);
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);

    let key = VerifyingKey::from_sec1_bytes(&sec1)
        .map_err(|e| BackendError::Azure(format!("JWK is not a valid secp256k1 point: {e}")))?;
    Ok(address_from_verifying_key(&key))
}

/// Turn a bare `r || s` into an Ethereum signature by trial recovery
fn recoverable_from_raw(
    raw: &[u8],
    hash: &B256,
    expected: &Address,
) -> Result<EcdsaSignature, BackendError> {
    if raw.len() != 64 {
        return Err(BackendError::Azure(format!("Expected 64-byte signature, got {}", raw.len())));
    }

    let signature = k256::ecdsa::Signature::from_slice(raw)
        .map_err(|e| BackendError::Azure(format!("Invalid signature scalars: {e}")))?;
    // Ethereum requires the low-s form
    let signature = signature.normalize_s().unwrap_or(signature);

    for rec_byte in [0u8, 1] {
        let recid = RecoveryId::new(rec_byte == 1, false);
        let Ok(recovered) =
            VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recid)
        else {
            continue;
        };
        if &address_from_verifying_key(&recovered) == expected {
            let r_bytes: [u8; 32] = signature.r().to_bytes().into();
            let s_bytes: [u8; 32] = signature.s().to_bytes().into();
            return Ok(EcdsaSignature {
                r: U256::from_be_bytes(r_bytes),
                s: U256::from_be_bytes(s_bytes),
                v: 27 + rec_byte as u64,
            });
        }
    }

    Err(BackendError::Azure("Signature does not recover to the vault key's address".to_string()))
}
