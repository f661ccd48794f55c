//! Ethereum signing capability
//!
//! [`Signer`] is the single boundary the registry exposes to credential
//! backends: sign a 32-byte hash, report the address signed for. Backends that
//! hold the key locally use [`SecpSigner`]; remote backends (vault, KMS)
//! implement the trait over their own transport.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{keccak256, Address, B256, U256};
use k256::ecdsa::{RecoveryId, SigningKey, VerifyingKey};

/// An ECDSA signature in Ethereum form.
///
/// `v` is the pre-EIP-155 recovery value (27 or 28); transaction encoding
/// applies chain-id replay protection on top of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdsaSignature {
    pub r: U256,
    pub s: U256,
    pub v: u64,
}

impl EcdsaSignature {
    /// Recovery id (0 or 1) encoded in `v`
    pub fn recovery_id(&self) -> u64 {
        self.v.saturating_sub(27)
    }

    /// 65-byte `r || s || v` wire encoding used by `eth_sign`
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[0..32].copy_from_slice(&self.r.to_be_bytes::<32>());
        out[32..64].copy_from_slice(&self.s.to_be_bytes::<32>());
        out[64] = self.v as u8;
        out
    }
}

/// Errors that can occur during signing operations
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("Invalid private key")]
    InvalidKey,
    #[error("Invalid hex string")]
    InvalidHex,
    #[error("Signing failed")]
    SigningFailed,
    #[error("Signature recovery failed")]
    RecoveryFailed,
    #[error("Signing backend failure: {0}")]
    Backend(String),
}

/// Capability to sign hashes on behalf of one Ethereum address
#[async_trait::async_trait]
pub trait Signer: Send + Sync {
    /// The address this signer signs for
    fn address(&self) -> Address;

    /// Sign a 32-byte hash
    async fn sign_hash(&self, hash: &B256) -> Result<EcdsaSignature, SignerError>;
}

/// A local secp256k1 private-key signer
#[derive(Clone)]
pub struct SecpSigner {
    /// The underlying secp256k1 signing key
    key: SigningKey,
    /// Cached Ethereum address (derived from public key)
    address: Address,
}

impl SecpSigner {
    /// Create a new signer from a signing key
    pub fn new(key: SigningKey) -> Self {
        let address = address_from_verifying_key(key.verifying_key());
        Self { key, address }
    }

    /// Create a signer from raw bytes (32 bytes)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignerError> {
        let key = SigningKey::from_slice(bytes).map_err(|_| SignerError::InvalidKey)?;
        Ok(Self::new(key))
    }

    /// Create a signer from a hex string (with or without 0x prefix)
    pub fn from_hex(s: &str) -> Result<Self, SignerError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s.trim()).map_err(|_| SignerError::InvalidHex)?;
        Self::from_bytes(&bytes)
    }

    /// Get the Ethereum address for this signer
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte hash (synchronous version)
    pub fn sign_hash_sync(&self, hash: &B256) -> Result<EcdsaSignature, SignerError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|_| SignerError::SigningFailed)?;

        let r_bytes: [u8; 32] = signature.r().to_bytes().into();
        let s_bytes: [u8; 32] = signature.s().to_bytes().into();

        Ok(EcdsaSignature {
            r: U256::from_be_bytes(r_bytes),
            s: U256::from_be_bytes(s_bytes),
            // Ethereum uses v = 27 + recovery_id (where recovery_id is 0 or 1)
            v: 27 + recovery_id.to_byte() as u64,
        })
    }
}

impl FromStr for SecpSigner {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for SecpSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecpSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Signer for SecpSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_hash(&self, hash: &B256) -> Result<EcdsaSignature, SignerError> {
        self.sign_hash_sync(hash)
    }
}

/// Derive an Ethereum address from a verifying (public) key
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    // Uncompressed public key is 65 bytes: 0x04 || x || y
    let public_key = key.to_encoded_point(false);
    let public_key_bytes = public_key.as_bytes();

    // Skip the 0x04 prefix and hash the remaining 64 bytes
    let hash = keccak256(&public_key_bytes[1..]);

    // Take the last 20 bytes as the address
    Address::from_slice(&hash[12..])
}

/// Recover the signing address from a signature and message hash
pub fn recover_address(sig: &EcdsaSignature, hash: &B256) -> Result<Address, SignerError> {
    let r_bytes: [u8; 32] = sig.r.to_be_bytes::<32>();
    let s_bytes: [u8; 32] = sig.s.to_be_bytes::<32>();

    let signature = k256::ecdsa::Signature::from_scalars(r_bytes, s_bytes)
        .map_err(|_| SignerError::RecoveryFailed)?;
    let recid =
        RecoveryId::from_byte(sig.recovery_id() as u8).ok_or(SignerError::RecoveryFailed)?;

    let recovered = VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recid)
        .map_err(|_| SignerError::RecoveryFailed)?;

    Ok(address_from_verifying_key(&recovered))
}

/// Hash a message with the EIP-191 personal-message prefix (used by `eth_sign`)
pub fn eip191_hash(message: &[u8]) -> B256 {
    let mut preimage = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    preimage.extend_from_slice(message);
    keccak256(&preimage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex_known_address() {
        let signer = SecpSigner::from_hex(
            "0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();

        // Known address for private key = 1
        assert_eq!(
            hex::encode(signer.address().as_slice()),
            "7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_from_hex_accepts_prefix_and_whitespace() {
        let a = SecpSigner::from_hex(
            "0x0000000000000000000000000000000000000000000000000000000000000002",
        )
        .unwrap();
        let b = SecpSigner::from_hex(
            "0000000000000000000000000000000000000000000000000000000000000002\n",
        )
        .unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn test_sign_and_recover() {
        let signer = SecpSigner::from_hex(
            "4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        let hash = keccak256(b"test message");

        let sig = signer.sign_hash_sync(&hash).unwrap();
        assert!(sig.v == 27 || sig.v == 28);
        assert_eq!(recover_address(&sig, &hash).unwrap(), signer.address());
    }

    #[tokio::test]
    async fn test_async_signing() {
        let signer = SecpSigner::from_hex(
            "0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        let hash = keccak256(b"test");

        let sig = signer.sign_hash(&hash).await.unwrap();
        assert_eq!(sig.to_bytes().len(), 65);
    }

    #[test]
    fn test_eip191_hash_prefix() {
        // keccak256("\x19Ethereum Signed Message:\n5hello")
        let hash = eip191_hash(b"hello");
        assert_eq!(
            hex::encode(hash),
            "50b2c43fd39106bafbba0da34fc430e1f91e3c96ea2acee2bc34119f92b37750"
        );
    }
}
