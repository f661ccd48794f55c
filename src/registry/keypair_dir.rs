//! Directory-backed registry of `.key`/`.password` file pairs
//!
//! Filenames are the addressing mechanism: a pair's shared basename must end
//! with the address of the signer it decodes to. The startup scan, the
//! watcher callbacks, and the on-demand miss path all funnel through the same
//! load/validate/publish routine.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::backends::file::load_key_pair;
use crate::eth::address::{address_from_basename, normalize_address};
use crate::eth::Signer;

use super::watcher::WatchHandler;
use super::{check_basename_claims, publish, DescriptorError, SignerMap, SignerProvider};

const KEY_EXTENSION: &str = "key";
const PASSWORD_EXTENSION: &str = "password";

/// One on-disk key/password descriptor.
///
/// Both halves share a basename; constructing one from mismatched basenames or
/// wrong extensions fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPasswordFile {
    base_name: String,
    key_file: PathBuf,
    password_file: PathBuf,
}

impl KeyPasswordFile {
    pub fn new(key_file: PathBuf, password_file: PathBuf) -> Result<Self, DescriptorError> {
        if key_file.extension().and_then(|e| e.to_str()) != Some(KEY_EXTENSION) {
            return Err(DescriptorError::WrongExtension(key_file.display().to_string()));
        }
        if password_file.extension().and_then(|e| e.to_str()) != Some(PASSWORD_EXTENSION) {
            return Err(DescriptorError::WrongExtension(password_file.display().to_string()));
        }

        let key_stem = file_stem(&key_file)?;
        let password_stem = file_stem(&password_file)?;
        if key_stem != password_stem {
            return Err(DescriptorError::MismatchedPair {
                key: key_file.display().to_string(),
                password: password_file.display().to_string(),
            });
        }

        Ok(Self { base_name: key_stem, key_file, password_file })
    }

    /// Build the descriptor from either half, deriving the sibling path.
    ///
    /// Neither file is required to exist yet; the watcher may observe one half
    /// before the other lands.
    pub fn from_half(path: &Path) -> Result<Self, DescriptorError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(KEY_EXTENSION) => {
                Self::new(path.to_path_buf(), path.with_extension(PASSWORD_EXTENSION))
            }
            Some(PASSWORD_EXTENSION) => {
                Self::new(path.with_extension(KEY_EXTENSION), path.to_path_buf())
            }
            _ => Err(DescriptorError::WrongExtension(path.display().to_string())),
        }
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Whether both halves of the pair exist on disk
    pub fn is_complete(&self) -> bool {
        self.key_file.is_file() && self.password_file.is_file()
    }
}

fn file_stem(path: &Path) -> Result<String, DescriptorError> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .ok_or_else(|| DescriptorError::WrongExtension(path.display().to_string()))
}

/// Registry backed by a flat directory of key/password pairs
pub struct KeyPairDirProvider {
    dir: PathBuf,
    signers: SignerMap,
}

impl KeyPairDirProvider {
    /// Scan the directory once and build every valid pairing.
    ///
    /// Invalid or mismatched pairs are logged and skipped, not fatal.
    pub async fn load(dir: impl Into<PathBuf>) -> Self {
        let provider = Self { dir: dir.into(), signers: Default::default() };
        provider.scan().await;
        provider
    }

    async fn scan(&self) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(dir = %self.dir.display(), error = %e, "Failed to scan signer directory");
                return;
            }
        };

        let mut loaded = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(KEY_EXTENSION) {
                continue;
            }
            match KeyPasswordFile::from_half(&path) {
                Ok(descriptor) if descriptor.is_complete() => {
                    if self.try_publish(&descriptor).await.is_ok() {
                        loaded += 1;
                    }
                }
                Ok(descriptor) => {
                    warn!(base_name = descriptor.base_name(), "Key file has no password sibling");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping descriptor"),
            }
        }
        info!(dir = %self.dir.display(), count = loaded, "Loaded key/password signers");
    }

    /// Construct the pair's signer off-map, validate the filename claim, then
    /// publish. Every load path goes through here.
    async fn try_publish(&self, descriptor: &KeyPasswordFile) -> Result<String, DescriptorError> {
        let result = self.build_and_publish(descriptor).await;
        match &result {
            Ok(address) => info!(address, base_name = descriptor.base_name(), "Registered signer"),
            Err(e) => {
                warn!(base_name = descriptor.base_name(), error = %e, "Descriptor rejected")
            }
        }
        result
    }

    async fn build_and_publish(
        &self,
        descriptor: &KeyPasswordFile,
    ) -> Result<String, DescriptorError> {
        let signer = load_key_pair(&descriptor.key_file, &descriptor.password_file)?;
        let address = check_basename_claims(descriptor.base_name(), &signer.address())?;

        if !publish(&self.signers, address.clone(), Arc::new(signer)).await {
            debug!(address, "Signer already registered, keeping existing entry");
        }
        Ok(address)
    }

    /// Watcher callback: either half of a pair appeared
    pub async fn handle_file_created(&self, path: &Path) {
        let descriptor = match KeyPasswordFile::from_half(path) {
            Ok(descriptor) => descriptor,
            Err(_) => {
                debug!(path = %path.display(), "Ignoring unrelated file");
                return;
            }
        };

        if !descriptor.is_complete() {
            // The sibling may arrive as a separate event moments later
            debug!(base_name = descriptor.base_name(), "Waiting for descriptor sibling");
            return;
        }

        let _ = self.try_publish(&descriptor).await;
    }

    /// Watcher callback: either half of a pair disappeared
    pub async fn handle_file_deleted(&self, path: &Path) {
        let Ok(stem) = file_stem(path) else { return };
        if !matches!(
            path.extension().and_then(|e| e.to_str()),
            Some(KEY_EXTENSION) | Some(PASSWORD_EXTENSION)
        ) {
            return;
        }

        let Some(address) = address_from_basename(&stem) else { return };
        if self.signers.write().await.remove(&address).is_some() {
            info!(address, "Removed signer after file deletion");
        }
    }

    /// Miss path: look for a descriptor on disk whose basename claims the
    /// requested address. More than one match is ambiguous and reported as
    /// not found.
    async fn load_on_demand(&self, address: &str) -> Option<Arc<dyn Signer>> {
        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(&self.dir).ok()?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(KEY_EXTENSION) {
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
                let descriptor = KeyPasswordFile::from_half(path).ok()?;
                if !descriptor.is_complete() {
                    return None;
                }
                self.try_publish(&descriptor).await.ok()?;
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

#[async_trait::async_trait]
impl SignerProvider for KeyPairDirProvider {
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
impl WatchHandler for KeyPairDirProvider {
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
    const KEY_TWO: &str = "0000000000000000000000000000000000000000000000000000000000000002";
    const ADDR_TWO: &str = "2b5ad5c4795c026514f8317c7a215e218dccd6cf";

    fn write_pair(dir: &Path, base_name: &str, key_hex: &str) {
        std::fs::write(dir.join(format!("{base_name}.key")), key_hex).unwrap();
        std::fs::write(dir.join(format!("{base_name}.password")), "hunter2\n").unwrap();
    }

    #[test]
    fn test_descriptor_requires_matching_basenames() {
        assert!(KeyPasswordFile::new("a.key".into(), "a.password".into()).is_ok());
        assert!(matches!(
            KeyPasswordFile::new("a.key".into(), "b.password".into()),
            Err(DescriptorError::MismatchedPair { .. })
        ));
        assert!(matches!(
            KeyPasswordFile::new("a.pem".into(), "a.password".into()),
            Err(DescriptorError::WrongExtension(_))
        ));
    }

    #[test]
    fn test_descriptor_from_either_half() {
        let from_key = KeyPasswordFile::from_half(Path::new("/keys/x.key")).unwrap();
        let from_password = KeyPasswordFile::from_half(Path::new("/keys/x.password")).unwrap();
        assert_eq!(from_key, from_password);
        assert!(KeyPasswordFile::from_half(Path::new("/keys/x.toml")).is_err());
    }

    #[tokio::test]
    async fn test_scan_builds_valid_pairs() {
        let dir = tempfile::tempdir().unwrap();
        write_pair(dir.path(), ADDR_ONE, KEY_ONE);
        write_pair(dir.path(), &format!("prefixed{ADDR_TWO}"), KEY_TWO);
        // Filename claims an address the key does not derive to
        write_pair(dir.path(), &ADDR_ONE.replace('7', "8"), KEY_TWO);

        let provider = KeyPairDirProvider::load(dir.path()).await;
        let addresses = provider.available_addresses().await;
        assert_eq!(addresses, BTreeSet::from([ADDR_ONE.to_string(), ADDR_TWO.to_string()]));
    }

    #[tokio::test]
    async fn test_lookup_is_case_and_prefix_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        write_pair(dir.path(), &ADDR_ONE.to_uppercase(), KEY_ONE);

        let provider = KeyPairDirProvider::load(dir.path()).await;
        for form in
            [ADDR_ONE.to_string(), format!("0x{ADDR_ONE}"), ADDR_ONE.to_uppercase()]
        {
            assert!(provider.get_signer(&form).await.is_some(), "failed for {form}");
        }
    }

    #[tokio::test]
    async fn test_hot_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = KeyPairDirProvider::load(dir.path()).await;
        assert!(provider.get_signer(ADDR_ONE).await.is_none());

        // Key half arrives first; callback must tolerate the missing sibling
        let key_path = dir.path().join(format!("{ADDR_ONE}.key"));
        std::fs::write(&key_path, KEY_ONE).unwrap();
        provider.handle_file_created(&key_path).await;
        assert!(provider.get_signer(ADDR_ONE).await.is_none());

        let password_path = dir.path().join(format!("{ADDR_ONE}.password"));
        std::fs::write(&password_path, "pw\n").unwrap();
        provider.handle_file_created(&password_path).await;
        assert!(provider.get_signer(ADDR_ONE).await.is_some());

        // Deleting either half removes the entry
        std::fs::remove_file(&password_path).unwrap();
        provider.handle_file_deleted(&password_path).await;
        assert!(provider.available_addresses().await.is_empty());
        // On-demand reload must not resurrect the incomplete pair
        assert!(provider.get_signer(ADDR_ONE).await.is_none());
    }

    #[tokio::test]
    async fn test_on_demand_load_after_missed_event() {
        let dir = tempfile::tempdir().unwrap();
        let provider = KeyPairDirProvider::load(dir.path()).await;

        // Pair appears without any watcher callback firing
        write_pair(dir.path(), ADDR_ONE, KEY_ONE);
        assert!(provider.get_signer(&format!("0x{ADDR_ONE}")).await.is_some());
        assert!(provider.available_addresses().await.contains(ADDR_ONE));
    }

    #[tokio::test]
    async fn test_ambiguous_descriptors_not_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let provider = KeyPairDirProvider::load(dir.path()).await;

        // Two distinct basenames claiming the same address, neither loaded yet
        write_pair(dir.path(), &format!("a-{ADDR_ONE}"), KEY_ONE);
        write_pair(dir.path(), &format!("b-{ADDR_ONE}"), KEY_ONE);
        assert!(provider.get_signer(ADDR_ONE).await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_address_registered_once() {
        let dir = tempfile::tempdir().unwrap();
        write_pair(dir.path(), ADDR_ONE, KEY_ONE);
        write_pair(dir.path(), &format!("copy-{ADDR_ONE}"), KEY_ONE);

        let provider = KeyPairDirProvider::load(dir.path()).await;
        assert_eq!(provider.available_addresses().await.len(), 1);
    }
}
