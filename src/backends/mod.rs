//! Credential backends
//!
//! A signing-metadata TOML file names one backend and its parameters; the
//! tagged [`SigningMetadata`] enum plus one factory per variant turns a
//! descriptor into a live [`Signer`]. Backend-specific failures never leave
//! this module as anything other than [`BackendError`].

pub mod azure;
pub mod file;
pub mod vault;

use std::path::Path;

use serde::Deserialize;

use crate::eth::Signer;

/// Errors constructing a signer from a descriptor
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid signing metadata: {0}")]
    InvalidMetadata(String),
    #[error("Invalid key material: {0}")]
    InvalidKey(String),
    #[error("Vault request failed: {0}")]
    Vault(String),
    #[error("Azure Key Vault request failed: {0}")]
    Azure(String),
    #[error("Unsupported backend: {0}")]
    Unsupported(&'static str),
}

/// PKCS11 parameters of an HSM-backed descriptor.
///
/// Parsed so operators get a precise load error, but construction is rejected:
/// the PKCS11 driver sits outside this service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HsmConfig {
    pub library: String,
    pub slot: String,
    pub pin: String,
}

/// The `[signing]` table of a metadata descriptor file
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SigningMetadata {
    #[serde(rename = "file-based-signer")]
    FileBased(file::FileBasedConfig),
    #[serde(rename = "hashicorp-signer")]
    Hashicorp(vault::HashicorpConfig),
    #[serde(rename = "azure-signer")]
    Azure(azure::AzureConfig),
    #[serde(rename = "hsm-signer")]
    Hsm(HsmConfig),
}

#[derive(Debug, Clone, Deserialize)]
struct MetadataFile {
    signing: SigningMetadata,
}

impl SigningMetadata {
    /// Parse a descriptor file
    pub fn load(path: &Path) -> Result<Self, BackendError> {
        let raw = std::fs::read_to_string(path).map_err(|source| BackendError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let parsed: MetadataFile =
            toml::from_str(&raw).map_err(|e| BackendError::InvalidMetadata(e.to_string()))?;
        Ok(parsed.signing)
    }

    /// Name of the backend kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SigningMetadata::FileBased(_) => "file-based-signer",
            SigningMetadata::Hashicorp(_) => "hashicorp-signer",
            SigningMetadata::Azure(_) => "azure-signer",
            SigningMetadata::Hsm(_) => "hsm-signer",
        }
    }

    /// Construct the signer this descriptor describes.
    ///
    /// Remote backends do network round-trips here; the registry publishes the
    /// signer only after this completes (construct-then-publish).
    pub async fn create_signer(&self) -> Result<Box<dyn Signer>, BackendError> {
        match self {
            SigningMetadata::FileBased(config) => {
                let signer = file::load_key_pair(&config.key_file, &config.password_file)?;
                Ok(Box::new(signer))
            }
            SigningMetadata::Hashicorp(config) => {
                let signer = vault::load_vault_signer(config).await?;
                Ok(Box::new(signer))
            }
            SigningMetadata::Azure(config) => {
                let signer = azure::AzureSigner::connect(config.clone()).await?;
                Ok(Box::new(signer))
            }
            SigningMetadata::Hsm(_) => Err(BackendError::Unsupported(
                "hsm-signer requires a PKCS11 driver, which this build does not carry",
            )),
        }
    }
}
