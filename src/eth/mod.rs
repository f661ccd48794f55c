pub mod address;
pub mod signer;
pub mod transaction;

pub use address::{normalize_address, AddressError};
pub use signer::{EcdsaSignature, SecpSigner, Signer, SignerError};
pub use transaction::{PrivacyParams, TransactionRequest, UnsignedTransaction};
