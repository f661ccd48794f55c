//! Static single-signer registry

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::eth::address::{canonical, normalize_address};
use crate::eth::Signer;

use super::SignerProvider;

/// Wraps exactly one pre-configured signer; lookups succeed only for its own
/// address.
pub struct SingleSignerProvider {
    address: String,
    signer: Arc<dyn Signer>,
}

impl SingleSignerProvider {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        let address = canonical(&signer.address());
        Self { address, signer }
    }
}

#[async_trait::async_trait]
impl SignerProvider for SingleSignerProvider {
    async fn get_signer(&self, address: &str) -> Option<Arc<dyn Signer>> {
        let requested = normalize_address(address).ok()?;
        (requested == self.address).then(|| self.signer.clone())
    }

    async fn available_addresses(&self) -> BTreeSet<String> {
        BTreeSet::from([self.address.clone()])
    }
}
