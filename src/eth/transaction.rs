//! Transaction parameter parsing and EIP-155 wire encoding
//!
//! [`TransactionRequest`] is the serde model of the `eth_sendTransaction` /
//! `eea_sendTransaction` params object. [`UnsignedTransaction`] is the fully
//! resolved form (nonce concrete, defaults applied) that gets signed and
//! RLP-encoded into a raw transaction for `eth_sendRawTransaction`.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{BufMut, Encodable, Header, EMPTY_STRING_CODE};
use base64::Engine;
use serde::Deserialize;

use super::address::parse_address;
use super::signer::EcdsaSignature;

/// Gas limit applied when the caller omits `gas`
const DEFAULT_GAS_LIMIT: u64 = 90_000;

/// Errors from transaction parameter validation
#[derive(Debug, thiserror::Error)]
pub enum TxParamError {
    #[error("Missing mandatory field: {0}")]
    MissingField(&'static str),
    #[error("Unparsable field {field}: {value:?}")]
    BadField { field: &'static str, value: String },
    #[error("Params are not a transaction object")]
    NotAnObject,
}

/// Raw transaction parameters as sent over JSON-RPC.
///
/// Quantity fields stay as strings here; parsing happens in
/// [`UnsignedTransaction::from_request`] so a bad value surfaces as
/// `InvalidParams` instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub gas: Option<String>,
    #[serde(default)]
    pub gas_price: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default, alias = "input")]
    pub data: Option<String>,

    // Private-transaction fields (eea_sendTransaction)
    #[serde(default)]
    pub private_from: Option<String>,
    #[serde(default)]
    pub private_for: Option<Vec<String>>,
    #[serde(default)]
    pub restriction: Option<String>,
}

impl TransactionRequest {
    /// Parse the unwrapped JSON-RPC params value into a request
    pub fn from_params(params: &serde_json::Value) -> Result<Self, TxParamError> {
        if !params.is_object() {
            return Err(TxParamError::NotAnObject);
        }
        serde_json::from_value(params.clone()).map_err(|_| TxParamError::NotAnObject)
    }

    /// The sender address string, mandatory for every signed transaction
    pub fn from_address(&self) -> Result<&str, TxParamError> {
        self.from.as_deref().ok_or(TxParamError::MissingField("from"))
    }

    /// Caller-supplied nonce, if any
    pub fn nonce(&self) -> Result<Option<u64>, TxParamError> {
        match &self.nonce {
            None => Ok(None),
            Some(raw) => parse_quantity(raw)
                .and_then(|q| u64::try_from(q).ok())
                .map(Some)
                .ok_or_else(|| TxParamError::BadField { field: "nonce", value: raw.clone() }),
        }
    }

    /// Whether this request carries Besu-style privacy fields
    pub fn is_private(&self) -> bool {
        self.private_from.is_some() || self.private_for.is_some() || self.restriction.is_some()
    }
}

/// Privacy fields of a Besu private transaction, decoded from base64
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivacyParams {
    pub private_from: Bytes,
    pub private_for: Vec<Bytes>,
    pub restriction: String,
}

impl PrivacyParams {
    fn from_request(request: &TransactionRequest) -> Result<Self, TxParamError> {
        let b64 = base64::engine::general_purpose::STANDARD;

        let private_from = request
            .private_from
            .as_deref()
            .ok_or(TxParamError::MissingField("privateFrom"))?;
        let private_from = b64
            .decode(private_from)
            .map(Bytes::from)
            .map_err(|_| TxParamError::BadField {
                field: "privateFrom",
                value: private_from.to_string(),
            })?;

        let mut private_for = Vec::new();
        for entry in request.private_for.as_deref().unwrap_or_default() {
            let decoded = b64.decode(entry).map(Bytes::from).map_err(|_| {
                TxParamError::BadField { field: "privateFor", value: entry.clone() }
            })?;
            private_for.push(decoded);
        }
        if private_for.is_empty() {
            return Err(TxParamError::MissingField("privateFor"));
        }

        let restriction = request.restriction.clone().unwrap_or_else(|| "restricted".to_string());

        Ok(Self { private_from, private_for, restriction })
    }
}

/// A transaction with every field resolved, ready to sign
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    /// Present only for `eea_sendTransaction`
    pub privacy: Option<PrivacyParams>,
}

impl UnsignedTransaction {
    /// Build a concrete transaction from request params and a resolved nonce.
    ///
    /// The nonce must already be concrete: the caller either supplied one or
    /// the pipeline fetched the sender's transaction count beforehand.
    pub fn from_request(
        request: &TransactionRequest,
        nonce: u64,
        chain_id: u64,
    ) -> Result<Self, TxParamError> {
        let to = match request.to.as_deref() {
            None | Some("") => None,
            Some(to) => Some(
                parse_address(to)
                    .map_err(|_| TxParamError::BadField { field: "to", value: to.to_string() })?,
            ),
        };

        let privacy =
            if request.is_private() { Some(PrivacyParams::from_request(request)?) } else { None };

        Ok(Self {
            chain_id,
            nonce,
            gas_price: quantity_or(&request.gas_price, "gasPrice", U256::ZERO)?,
            gas_limit: quantity_or(&request.gas, "gas", U256::from(DEFAULT_GAS_LIMIT))?,
            to,
            value: quantity_or(&request.value, "value", U256::ZERO)?,
            data: bytes_or_empty(&request.data)?,
            privacy,
        })
    }

    /// Keccak hash of the EIP-155 signing payload.
    ///
    /// Per EIP-155, `(chain_id, 0, 0)` is appended to the regular field list
    /// before hashing. Privacy fields, when present, follow the chain id the
    /// way Besu encodes private transactions.
    pub fn signing_hash(&self) -> B256 {
        let mut payload_length = self.fields_length();
        payload_length += self.chain_id.length() + 1 + 1;
        if let Some(privacy) = &self.privacy {
            payload_length += privacy_length(privacy);
        }

        let mut out = Vec::new();
        Header { list: true, payload_length }.encode(&mut out);
        self.encode_fields(&mut out);
        self.chain_id.encode(&mut out);
        out.put_u8(EMPTY_STRING_CODE);
        out.put_u8(EMPTY_STRING_CODE);
        if let Some(privacy) = &self.privacy {
            encode_privacy(privacy, &mut out);
        }

        keccak256(&out)
    }

    /// RLP-encode the signed transaction into its raw wire form.
    ///
    /// The signature's recovery value gets EIP-155 replay protection applied:
    /// `v = recovery_id + chain_id * 2 + 35`.
    pub fn raw_signed(&self, signature: &EcdsaSignature) -> Bytes {
        let v = signature.recovery_id() + self.chain_id * 2 + 35;

        let mut payload_length = self.fields_length();
        payload_length += v.length() + signature.r.length() + signature.s.length();
        if let Some(privacy) = &self.privacy {
            payload_length += privacy_length(privacy);
        }

        let mut out = Vec::new();
        Header { list: true, payload_length }.encode(&mut out);
        self.encode_fields(&mut out);
        v.encode(&mut out);
        signature.r.encode(&mut out);
        signature.s.encode(&mut out);
        if let Some(privacy) = &self.privacy {
            encode_privacy(privacy, &mut out);
        }

        Bytes::from(out)
    }

    fn fields_length(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + to_length(&self.to)
            + self.value.length()
            + self.data.length()
    }

    fn encode_fields(&self, out: &mut Vec<u8>) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        encode_to(&self.to, out);
        self.value.encode(out);
        self.data.encode(out);
    }
}

// Contract creation encodes the missing recipient as the empty string
fn encode_to(to: &Option<Address>, out: &mut Vec<u8>) {
    match to {
        Some(address) => address.encode(out),
        None => out.put_u8(EMPTY_STRING_CODE),
    }
}

fn to_length(to: &Option<Address>) -> usize {
    match to {
        Some(address) => address.length(),
        None => 1,
    }
}

fn privacy_length(privacy: &PrivacyParams) -> usize {
    privacy.private_from.length()
        + list_length(&privacy.private_for)
        + privacy.restriction.as_bytes().length()
}

fn encode_privacy(privacy: &PrivacyParams, out: &mut Vec<u8>) {
    privacy.private_from.encode(out);
    let payload_length: usize = privacy.private_for.iter().map(|p| p.length()).sum();
    Header { list: true, payload_length }.encode(out);
    for recipient in &privacy.private_for {
        recipient.encode(out);
    }
    privacy.restriction.as_bytes().encode(out);
}

fn list_length(items: &[Bytes]) -> usize {
    let payload_length: usize = items.iter().map(|i| i.length()).sum();
    Header { list: true, payload_length }.length() + payload_length
}

/// Parse an Ethereum JSON-RPC quantity (`0x`-prefixed hex or plain decimal)
pub fn parse_quantity(raw: &str) -> Option<U256> {
    let raw = raw.trim();
    if let Some(hexpart) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        if hexpart.is_empty() {
            return None;
        }
        U256::from_str_radix(hexpart, 16).ok()
    } else if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        U256::from_str_radix(raw, 10).ok()
    } else {
        None
    }
}

fn quantity_or(
    raw: &Option<String>,
    field: &'static str,
    default: U256,
) -> Result<U256, TxParamError> {
    match raw {
        None => Ok(default),
        Some(raw) => parse_quantity(raw)
            .ok_or_else(|| TxParamError::BadField { field, value: raw.clone() }),
    }
}

fn bytes_or_empty(raw: &Option<String>) -> Result<Bytes, TxParamError> {
    match raw.as_deref() {
        None | Some("") => Ok(Bytes::new()),
        Some(raw) => {
            let stripped = raw.strip_prefix("0x").unwrap_or(raw);
            hex::decode(stripped)
                .map(Bytes::from)
                .map_err(|_| TxParamError::BadField { field: "data", value: raw.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eth::signer::SecpSigner;
    use serde_json::json;

    fn eip155_example() -> UnsignedTransaction {
        // The worked example from the EIP-155 specification
        UnsignedTransaction {
            chain_id: 1,
            nonce: 9,
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: U256::from(21_000u64),
            to: Some(parse_address("0x3535353535353535353535353535353535353535").unwrap()),
            value: U256::from(1_000_000_000_000_000_000u64),
            data: Bytes::new(),
            privacy: None,
        }
    }

    #[test]
    fn test_eip155_signing_hash() {
        assert_eq!(
            hex::encode(eip155_example().signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_eip155_raw_transaction() {
        let tx = eip155_example();
        let signer = SecpSigner::from_hex(
            "4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        let sig = signer.sign_hash_sync(&tx.signing_hash()).unwrap();
        let raw = tx.raw_signed(&sig);

        assert_eq!(
            hex::encode(&raw),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3\
             a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa6362\
             76a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    #[test]
    fn test_contract_creation_omits_to() {
        let mut tx = eip155_example();
        tx.to = None;
        tx.data = Bytes::from(vec![0x60, 0x00]);
        let raw = tx.raw_signed(&EcdsaSignature { r: U256::from(1), s: U256::from(1), v: 27 });
        // Empty recipient encodes as the RLP empty string (0x80)
        assert!(hex::encode(&raw).contains("8504a817c80082520880"));
    }

    #[test]
    fn test_request_parse_defaults() {
        let params = json!({
            "from": "0xABCDEF0123456789abcdef0123456789abcdef01",
            "to": "0x3535353535353535353535353535353535353535",
        });
        let request = TransactionRequest::from_params(&params).unwrap();
        assert_eq!(request.nonce().unwrap(), None);
        assert!(!request.is_private());

        let tx = UnsignedTransaction::from_request(&request, 7, 44844).unwrap();
        assert_eq!(tx.nonce, 7);
        assert_eq!(tx.gas_limit, U256::from(90_000u64));
        assert_eq!(tx.gas_price, U256::ZERO);
        assert_eq!(tx.value, U256::ZERO);
        assert!(tx.data.is_empty());
    }

    #[test]
    fn test_request_rejects_bad_quantities() {
        let params = json!({
            "from": "0xABCDEF0123456789abcdef0123456789abcdef01",
            "gas": "not-a-number",
        });
        let request = TransactionRequest::from_params(&params).unwrap();
        assert!(matches!(
            UnsignedTransaction::from_request(&request, 0, 1),
            Err(TxParamError::BadField { field: "gas", .. })
        ));
    }

    #[test]
    fn test_quantity_parsing() {
        assert_eq!(parse_quantity("0x1"), Some(U256::from(1)));
        assert_eq!(parse_quantity("0x5208"), Some(U256::from(21000)));
        assert_eq!(parse_quantity("42"), Some(U256::from(42)));
        assert_eq!(parse_quantity("0x"), None);
        assert_eq!(parse_quantity("abc"), None);
        assert_eq!(parse_quantity("-1"), None);
    }

    #[test]
    fn test_private_transaction_fields() {
        let params = json!({
            "from": "0xABCDEF0123456789abcdef0123456789abcdef01",
            "nonce": "0x0",
            "privateFrom": "A1aVtMxLCUHmBVHXoZzzBgPbW/wj5axDpW9X8l91SGo=",
            "privateFor": ["Ko2bVqD+nNlNYL5EE7y3IdOnviftjiizpjRt+HTuFBs="],
            "restriction": "restricted",
        });
        let request = TransactionRequest::from_params(&params).unwrap();
        assert!(request.is_private());

        let tx = UnsignedTransaction::from_request(&request, 0, 2018).unwrap();
        let privacy = tx.privacy.as_ref().unwrap();
        assert_eq!(privacy.private_from.len(), 32);
        assert_eq!(privacy.private_for.len(), 1);
        assert_eq!(privacy.restriction, "restricted");

        // Privacy fields must alter the signing payload
        let mut public = tx.clone();
        public.privacy = None;
        assert_ne!(tx.signing_hash(), public.signing_hash());
    }

    #[test]
    fn test_private_requires_private_for() {
        let params = json!({
            "from": "0xABCDEF0123456789abcdef0123456789abcdef01",
            "privateFrom": "A1aVtMxLCUHmBVHXoZzzBgPbW/wj5axDpW9X8l91SGo=",
        });
        let request = TransactionRequest::from_params(&params).unwrap();
        assert!(matches!(
            UnsignedTransaction::from_request(&request, 0, 2018),
            Err(TxParamError::MissingField("privateFor"))
        ));
    }
}
