//! Directory-backed registry of TOML signing-metadata descriptors
//!
//! One `.toml` file per address, each naming a credential backend. The
//! matching backend factory constructs the signer, then the filename/address
//! claim is checked before the entry is published.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::backends::SigningMetadata;
use crate::eth::address::{address_from_basename, normalize_address};
use crate::eth::Signer;

use super::watcher::WatchHandler;
use super::{check_basename_claims, publish, DescriptorError, SignerMap, SignerProvider};

const METADATA_EXTENSION: &str = "toml";

/// Registry backed by a flat directory of TOML metadata descriptors
pub struct MetadataDirProvider {
    dir: PathBuf,
    signers: SignerMap,
}

impl MetadataDirProvider {
    /// Scan the directory once, invoking each descriptor's backend factory.
    ///
    /// Bad TOML, unknown backend types, and unreachable backends are logged
    /// and skipped; the registry serves whatever it could load.
    pub async fn load(dir: impl Into<PathBuf>) -> Self {
        let provider = Self { dir: dir.into(), signers: Default::default() };
        provider.scan().await;
        provider
    }

    async fn scan(&self) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(dir = %self.dir.display(), error = %e, "Failed to scan metadata directory");
                return;
            }
        };

        let mut loaded = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(METADATA_EXTENSION) {
                continue;
            }
            if self.try_publish(&path).await.is_ok() {
                loaded += 1;
            }
        }
        info!(dir = %self.dir.display(), count = loaded, "Loaded metadata signers");
    }

    /// Shared load path: parse, build the signer via its backend, validate the
    /// filename claim, publish.
    async fn try_publish(&self, path: &Path) -> Result<String, DescriptorError> {
        let result = self.build_and_publish(path).await;
        match &result {
            Ok(address) => info!(address, path = %path.display(), "Registered signer"),
            Err(e) => warn!(path = %path.display(), error = %e, "Descriptor rejected"),
        }
        result
    }

    async fn build_and_publish(&self, path: &Path) -> Result<String, DescriptorError> {
        let base_name = file_stem(path)?;
        let metadata = SigningMetadata::load(path)?;
        debug!(base_name, backend = metadata.kind(), "Loading signing metadata");

        let signer: Arc<dyn Signer> = Arc::from(metadata.create_signer().await?);
        let address = check_basename_claims(&base_name, &signer.address())?;

        if !publish(&self.signers, address.clone(), signer).await {
            debug!(address, "Signer already registered, keeping existing entry");
        }
        Ok(address)
    }

    /// Watcher callback: a descriptor file appeared
    pub async fn handle_file_created(&self, path: &Path) {
        if path.extension().and_then(|e| e.to_str()) != Some(METADATA_EXTENSION) {
            debug!(path = %path.display(), "Ignoring unrelated file");
            return;
        }
        let _ = self.try_publish(path).await;
    }

    /// Watcher callback: a descriptor file disappeared
    pub async fn handle_file_deleted(&self, path: &Path) {
        if path.extension().and_then(|e| e.to_str()) != Some(METADATA_EXTENSION) {
            return;
        }
        let Ok(stem) = file_stem(path) else { return };
        let Some(address) = address_from_basename(&stem) else { return };

        if self.signers.write().await.remove(&address).is_some() {
            info!(address, "Removed signer after descriptor deletion");
        }
    }

    async fn load_on_demand(&self, address: &str) -> Option<Arc<dyn Signer>> {
        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(&self.dir).ok()?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(METADATA_EXTENSION) {
                continue;
            }
            let Ok(stem) = file_stem(&path) else { continue };
            if address_from_basename(&stem).as_deref() == Some(address) {
                candidates.push(path);
            }
        }

        match candidates.as_slice() {
            [] => None,
            [path] => {
                self.try_publish(path).await.ok()?;
                self.signers.read().await.get(address).cloned()
            }
            _ => {
                error!(
                    address,
                    count = candidates.len(),
                    "Multiple descriptors claim this address; refusing to pick one"
                );
                None
            }
        }
    }
}

fn file_stem(path: &Path) -> Result<String, DescriptorError> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .ok_or_else(|| DescriptorError::WrongExtension(path.display().to_string()))
}

#[async_trait::async_trait]
impl SignerProvider for MetadataDirProvider {
    async fn get_signer(&self, address: &str) -> Option<Arc<dyn Signer>> {
        let address = normalize_address(address).ok()?;
        if let Some(signer) = self.signers.read().await.get(&address) {
            return Some(signer.clone());
        }
        self.load_on_demand(&address).await
    }

    async fn available_addresses(&self) -> BTreeSet<String> {
        self.signers.read().await.keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl WatchHandler for MetadataDirProvider {
    async fn file_created(&self, path: &Path) {
        self.handle_file_created(path).await;
    }

    async fn file_deleted(&self, path: &Path) {
        self.handle_file_deleted(path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_ONE: &str = "0000000000000000000000000000000000000000000000000000000000000001";
    const ADDR_ONE: &str = "7e5f4552091a69125d5dfcb7b8c2659029395bdf";

    /// Write a file-based metadata descriptor plus its key material
    fn write_descriptor(dir: &Path, base_name: &str, key_hex: &str) -> PathBuf {
        let key_file = dir.join(format!("{base_name}.priv"));
        let password_file = dir.join(format!("{base_name}.pass"));
        std::fs::write(&key_file, key_hex).unwrap();
        std::fs::write(&password_file, "hunter2\n").unwrap();

        let descriptor = dir.join(format!("{base_name}.toml"));
        std::fs::write(
            &descriptor,
            format!(
                "[signing]\ntype = \"file-based-signer\"\nkey-file = {key_file:?}\npassword-file = {password_file:?}\n"
            ),
        )
        .unwrap();
        descriptor
    }

    #[tokio::test]
    async fn test_scan_loads_file_based_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(dir.path(), ADDR_ONE, KEY_ONE);

        let provider = MetadataDirProvider::load(dir.path()).await;
        assert!(provider.get_signer(&format!("0x{ADDR_ONE}")).await.is_some());
    }

    #[tokio::test]
    async fn test_filename_claim_enforced_any_casing() {
        let dir = tempfile::tempdir().unwrap();
        // Basename claims a different address than the key derives to
        write_descriptor(dir.path(), &ADDR_ONE.replace('7', "9").to_uppercase(), KEY_ONE);

        let provider = MetadataDirProvider::load(dir.path()).await;
        assert!(provider.available_addresses().await.is_empty());
    }

    #[tokio::test]
    async fn test_bad_toml_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not [valid toml").unwrap();
        write_descriptor(dir.path(), ADDR_ONE, KEY_ONE);

        let provider = MetadataDirProvider::load(dir.path()).await;
        assert_eq!(provider.available_addresses().await.len(), 1);
    }

    #[tokio::test]
    async fn test_hot_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MetadataDirProvider::load(dir.path()).await;

        let descriptor = write_descriptor(dir.path(), &format!("wallet-{ADDR_ONE}"), KEY_ONE);
        provider.handle_file_created(&descriptor).await;
        assert!(provider.get_signer(ADDR_ONE).await.is_some());

        std::fs::remove_file(&descriptor).unwrap();
        provider.handle_file_deleted(&descriptor).await;
        assert!(provider.get_signer(ADDR_ONE).await.is_none());
    }
}
