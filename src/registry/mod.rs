//! Address-indexed signer registry
//!
//! A registry maps canonical Ethereum addresses to live [`Signer`]
//! capabilities. Three implementations share the [`SignerProvider`] interface:
//! a static single-signer wrapper, a directory of key/password file pairs, and
//! a directory of TOML metadata descriptors. The directory-backed variants are
//! mutated at runtime by the [`watcher::DirectoryWatcher`] while request
//! handlers read them concurrently; all mutation goes through the shared map
//! with construct-then-publish semantics, so readers observe either the old
//! entry or the fully built new one.

pub mod keypair_dir;
pub mod metadata_dir;
pub mod single;
pub mod watcher;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use alloy_primitives::Address;

use crate::backends::BackendError;
use crate::eth::address::{address_from_basename, canonical};
use crate::eth::Signer;
use crate::prelude::RwArc;

pub use keypair_dir::{KeyPairDirProvider, KeyPasswordFile};
pub use metadata_dir::MetadataDirProvider;
pub use single::SingleSignerProvider;
pub use watcher::{DirectoryWatcher, WatchHandler};

/// Shared address -> signer map
pub(crate) type SignerMap = RwArc<HashMap<String, Arc<dyn Signer>>>;

/// Errors loading one on-disk descriptor.
///
/// These are load-time skips, never request-level failures: the offending
/// descriptor is logged and excluded, and the registry keeps serving.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Descriptor {0} does not have a .key/.password/.toml extension")]
    WrongExtension(String),
    #[error("Key and password files have mismatched basenames: {key} vs {password}")]
    MismatchedPair { key: String, password: String },
    #[error("Descriptor basename {0:?} does not end with a 40-hex address")]
    NoAddressSuffix(String),
    #[error("Descriptor {base_name:?} claims a different address than its signer ({derived})")]
    AddressMismatch { base_name: String, derived: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// The registry interface read by every signing request
#[async_trait::async_trait]
pub trait SignerProvider: Send + Sync {
    /// Resolve a signer for an address in any casing, 0x-prefixed or not
    async fn get_signer(&self, address: &str) -> Option<Arc<dyn Signer>>;

    /// Canonical addresses with a registered signer
    async fn available_addresses(&self) -> BTreeSet<String>;
}

/// Enforce the filename/address invariant: the descriptor basename must end
/// with the signer's own derived address (case-insensitive).
///
/// This prevents a file renamed to one address from granting signing authority
/// claimed under a different address. Returns the canonical address on match.
pub(crate) fn check_basename_claims(
    base_name: &str,
    signer_address: &Address,
) -> Result<String, DescriptorError> {
    let claimed = address_from_basename(base_name)
        .ok_or_else(|| DescriptorError::NoAddressSuffix(base_name.to_string()))?;
    let derived = canonical(signer_address);

    if claimed != derived {
        return Err(DescriptorError::AddressMismatch {
            base_name: base_name.to_string(),
            derived,
        });
    }
    Ok(derived)
}

/// Publish a fully constructed signer under its canonical address.
///
/// At most one live entry per address: a duplicate keeps the existing entry
/// and reports `false` so the caller can log the skip.
pub(crate) async fn publish(map: &SignerMap, address: String, signer: Arc<dyn Signer>) -> bool {
    let mut signers = map.write().await;
    if signers.contains_key(&address) {
        return false;
    }
    signers.insert(address, signer);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eth::SecpSigner;

    #[test]
    fn test_basename_claim_accepts_any_case_and_prefix() {
        let signer = SecpSigner::from_hex(
            "0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        let address = signer.address();
        let canonical_address = "7e5f4552091a69125d5dfcb7b8c2659029395bdf";

        for base_name in [
            canonical_address.to_string(),
            canonical_address.to_uppercase(),
            format!("wallet-{canonical_address}"),
            format!("UP{}", canonical_address.to_uppercase()),
        ] {
            assert_eq!(check_basename_claims(&base_name, &address).unwrap(), canonical_address);
        }
    }

    #[test]
    fn test_basename_claim_rejects_other_address() {
        let signer = SecpSigner::from_hex(
            "0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        let wrong = "1111111111111111111111111111111111111111";

        assert!(matches!(
            check_basename_claims(wrong, &signer.address()),
            Err(DescriptorError::AddressMismatch { .. })
        ));
        assert!(matches!(
            check_basename_claims("no-address-here", &signer.address()),
            Err(DescriptorError::NoAddressSuffix(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_keeps_first_entry() {
        let map: SignerMap = Default::default();
        let first: Arc<dyn Signer> = Arc::new(
            SecpSigner::from_hex(
                "0000000000000000000000000000000000000000000000000000000000000001",
            )
            .unwrap(),
        );
        let second: Arc<dyn Signer> = Arc::new(
            SecpSigner::from_hex(
                "0000000000000000000000000000000000000000000000000000000000000002",
            )
            .unwrap(),
        );

        assert!(publish(&map, "aa".into(), first.clone()).await);
        assert!(!publish(&map, "aa".into(), second).await);
        assert_eq!(map.read().await.get("aa").unwrap().address(), first.address());
    }
}
