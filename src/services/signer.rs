//! Receipt signing and third-party verification.
//!
//! A receipt is signed over `keccak256(canonical JSON)` with a recoverable
//! secp256k1 signature, the same primitive the payment chain uses. The
//! signature is 65 bytes `r || s || v` with `v` as the raw recovery id
//! (0 or 1). Verification recovers the public key from the signature and
//! compares it with the key embedded in the signed receipt.

use crate::error::ReceiptError;
use crate::models::{Receipt, SignedReceipt};
use ethers::core::k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use ethers::core::k256::elliptic_curve::sec1::ToEncodedPoint;
use ethers::core::k256::PublicKey;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256};
use ethers::utils::keccak256;

const SIGNATURE_LEN: usize = 65;
/// Offset ethers adds to the recovery id for legacy `v` values.
const LEGACY_V_OFFSET: u8 = 27;

/// Exact bytes that get hashed and signed.
pub fn canonical_bytes(receipt: &Receipt) -> Result<Vec<u8>, ReceiptError> {
    Ok(serde_json::to_vec(receipt)?)
}

pub fn receipt_digest(receipt: &Receipt) -> Result<[u8; 32], ReceiptError> {
    Ok(keccak256(canonical_bytes(receipt)?))
}

/// Signs receipts with the gateway operator's key.
#[derive(Clone, Debug)]
pub struct ReceiptSigner {
    wallet: LocalWallet,
    public_key: String,
}

impl ReceiptSigner {
    /// Accepts a hex private key with or without the `0x` prefix.
    pub fn from_private_key(private_key: &str) -> Result<Self, ReceiptError> {
        let wallet = private_key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| ReceiptError::MalformedKey(e.to_string()))?;
        Ok(Self::from_wallet(wallet))
    }

    /// `None` when no key is configured; an error only when a key is present
    /// but unusable.
    pub fn from_optional_key(private_key: Option<&str>) -> Result<Option<Self>, ReceiptError> {
        private_key
            .filter(|key| !key.trim().is_empty())
            .map(Self::from_private_key)
            .transpose()
    }

    pub fn from_wallet(wallet: LocalWallet) -> Self {
        let public_key = encode_public_key(wallet.signer().verifying_key());
        Self { wallet, public_key }
    }

    /// `0x04...` uncompressed public key, as embedded in signed receipts.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn sign(&self, receipt: Receipt) -> Result<SignedReceipt, ReceiptError> {
        let digest = receipt_digest(&receipt)?;
        let signature = self
            .wallet
            .sign_hash(H256::from(digest))
            .map_err(|e| ReceiptError::Signing(e.to_string()))?;

        let mut bytes = signature.to_vec();
        // ethers reports v as 27/28; receipts carry the bare recovery id
        bytes[SIGNATURE_LEN - 1] = bytes[SIGNATURE_LEN - 1].saturating_sub(LEGACY_V_OFFSET);

        tracing::debug!(receipt_id = %receipt.id, "Receipt signed");

        Ok(SignedReceipt {
            receipt,
            signature: format!("0x{}", hex::encode(bytes)),
            server_public_key: self.public_key.clone(),
        })
    }
}

fn encode_public_key(key: &VerifyingKey) -> String {
    let point = PublicKey::from(key).to_encoded_point(false);
    format!("0x{}", hex::encode(point.as_bytes()))
}

fn decode_hex(value: &str, what: &str) -> Result<Vec<u8>, ReceiptError> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(trimmed).map_err(|e| ReceiptError::InvalidSignature(format!("{what} is not hex: {e}")))
}

/// Recover the signer's uncompressed public key bytes.
pub fn recover_public_key_bytes(receipt: &Receipt, signature: &str) -> Result<Vec<u8>, ReceiptError> {
    let bytes = decode_hex(signature, "signature")?;
    if bytes.len() != SIGNATURE_LEN {
        return Err(ReceiptError::InvalidSignature(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LEN,
            bytes.len()
        )));
    }

    let v = bytes[SIGNATURE_LEN - 1];
    let v = if v >= LEGACY_V_OFFSET { v - LEGACY_V_OFFSET } else { v };
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| ReceiptError::InvalidSignature(format!("invalid recovery id {v}")))?;

    let signature = EcdsaSignature::from_slice(&bytes[..SIGNATURE_LEN - 1])
        .map_err(|e| ReceiptError::InvalidSignature(e.to_string()))?;

    let digest = receipt_digest(receipt)?;
    let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|e| ReceiptError::InvalidSignature(format!("recovery failed: {e}")))?;

    Ok(PublicKey::from(&key).to_encoded_point(false).as_bytes().to_vec())
}

/// Recover the signer's public key as `0x`-prefixed hex.
pub fn recover_public_key(receipt: &Receipt, signature: &str) -> Result<String, ReceiptError> {
    recover_public_key_bytes(receipt, signature).map(|bytes| format!("0x{}", hex::encode(bytes)))
}

/// Check that the signature recovers exactly the embedded `serverPublicKey`.
pub fn verify_signed_receipt(signed: &SignedReceipt) -> Result<(), ReceiptError> {
    let recovered = recover_public_key_bytes(&signed.receipt, &signed.signature)?;
    let claimed = decode_hex(&signed.server_public_key, "server public key")?;

    if recovered != claimed {
        return Err(ReceiptError::PublicKeyMismatch {
            recovered: format!("0x{}", hex::encode(recovered)),
            expected: signed.server_public_key.clone(),
        });
    }
    Ok(())
}

/// Like [`verify_signed_receipt`], additionally pinning the signer to a
/// separately known operator key.
pub fn verify_with_operator_key(signed: &SignedReceipt, operator_key: &str) -> Result<(), ReceiptError> {
    verify_signed_receipt(signed)?;

    let expected = decode_hex(operator_key, "operator public key")?;
    let claimed = decode_hex(&signed.server_public_key, "server public key")?;
    if expected != claimed {
        return Err(ReceiptError::PublicKeyMismatch {
            recovered: signed.server_public_key.clone(),
            expected: operator_key.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaymentDetails, ServiceDetails};
    use crate::services::minter::ReceiptMinter;

    fn random_signer() -> ReceiptSigner {
        ReceiptSigner::from_wallet(LocalWallet::new(&mut rand::thread_rng()))
    }

    fn receipt() -> Receipt {
        ReceiptMinter::default()
            .mint(
                PaymentDetails {
                    payer: "0x742d35Cc6634C0532925a3b844Bc9e7595f8fE21".to_string(),
                    recipient: "0x2cAF48b4BA1C58721a85dFADa5aC01C2DFa62219".to_string(),
                    amount: "0.001".to_string(),
                    token: "USDC".to_string(),
                    chain_id: 8453,
                    nonce: "test-nonce-verification".to_string(),
                },
                ServiceDetails {
                    endpoint: "/api/ai/summarize".to_string(),
                    request_hash: "sha256:testrequest".to_string(),
                    response_hash: "sha256:testresponse".to_string(),
                },
            )
            .unwrap()
    }

    #[test]
    fn known_key_has_known_public_key() {
        let signer = ReceiptSigner::from_private_key(
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        assert_eq!(
            signer.public_key(),
            concat!(
                "0x0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
                "483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8"
            )
        );
    }

    #[test]
    fn signature_and_key_formats() {
        let signer = random_signer();
        let original = receipt();
        let signed = signer.sign(original.clone()).unwrap();

        assert!(signed.signature.starts_with("0x"));
        assert_eq!(signed.signature.len(), 2 + SIGNATURE_LEN * 2);
        assert!(signed.signature.ends_with("00") || signed.signature.ends_with("01"));

        assert!(signed.server_public_key.starts_with("0x04"));
        assert_eq!(signed.server_public_key.len(), 2 + 65 * 2);

        assert_eq!(signed.receipt, original);
    }

    #[test]
    fn signature_recovers_server_key() {
        let signer = random_signer();
        let signed = signer.sign(receipt()).unwrap();

        let recovered = recover_public_key(&signed.receipt, &signed.signature).unwrap();
        assert_eq!(recovered, signed.server_public_key);
        assert_eq!(recovered, signer.public_key());
        verify_signed_receipt(&signed).unwrap();
        verify_with_operator_key(&signed, signer.public_key()).unwrap();
    }

    #[test]
    fn verification_survives_wire_round_trip() {
        let signed = random_signer().sign(receipt()).unwrap();
        let json = serde_json::to_string(&signed).unwrap();
        let decoded: SignedReceipt = serde_json::from_str(&json).unwrap();
        verify_signed_receipt(&decoded).unwrap();
    }

    #[test]
    fn any_mutation_invalidates_signature() {
        let signed = random_signer().sign(receipt()).unwrap();

        let mutations: Vec<fn(&mut Receipt)> = vec![
            |r| r.id = "rcpt_000000000000".to_string(),
            |r| r.version = "2.0".to_string(),
            |r| r.timestamp += chrono::Duration::nanoseconds(1),
            |r| r.payment.payer = "0x0000000000000000000000000000000000000001".to_string(),
            |r| r.payment.recipient = "0x0000000000000000000000000000000000000002".to_string(),
            |r| r.payment.amount = "0.002".to_string(),
            |r| r.payment.token = "DAI".to_string(),
            |r| r.payment.chain_id = 1,
            |r| r.payment.nonce = "other".to_string(),
            |r| r.service.endpoint = "/api/other".to_string(),
            |r| r.service.request_hash = "sha256:tampered".to_string(),
            |r| r.service.response_hash = "sha256:tampered".to_string(),
        ];

        for mutate in mutations {
            let mut tampered = signed.clone();
            mutate(&mut tampered.receipt);
            assert!(verify_signed_receipt(&tampered).is_err());
        }
    }

    #[test]
    fn claimed_key_must_match() {
        let signed = random_signer().sign(receipt()).unwrap();
        let mut forged = signed.clone();
        forged.server_public_key = random_signer().public_key().to_string();

        let err = verify_signed_receipt(&forged).unwrap_err();
        assert!(matches!(err, ReceiptError::PublicKeyMismatch { .. }));

        let other = random_signer();
        let err = verify_with_operator_key(&signed, other.public_key()).unwrap_err();
        assert!(err.is_verification_failure());
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        let signed = random_signer().sign(receipt()).unwrap();

        for bad in ["", "0x", "0xdead", "not-hex", &signed.signature[..signed.signature.len() - 2]] {
            let mut tampered = signed.clone();
            tampered.signature = bad.to_string();
            let err = verify_signed_receipt(&tampered).unwrap_err();
            assert!(matches!(err, ReceiptError::InvalidSignature(_)), "{bad}: {err}");
        }

        let mut bad_recovery = signed.clone();
        bad_recovery.signature = format!("{}09", &signed.signature[..signed.signature.len() - 2]);
        assert!(verify_signed_receipt(&bad_recovery).is_err());
    }

    #[test]
    fn legacy_v_is_accepted() {
        let signed = random_signer().sign(receipt()).unwrap();
        let v = u8::from_str_radix(&signed.signature[signed.signature.len() - 2..], 16).unwrap();
        let mut legacy = signed.clone();
        legacy.signature = format!(
            "{}{:02x}",
            &signed.signature[..signed.signature.len() - 2],
            v + LEGACY_V_OFFSET
        );
        verify_signed_receipt(&legacy).unwrap();
    }

    #[test]
    fn malformed_key_is_a_configuration_error() {
        let err = ReceiptSigner::from_private_key("0xnot-a-key").unwrap_err();
        assert!(matches!(err, ReceiptError::MalformedKey(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn optional_key() {
        assert!(ReceiptSigner::from_optional_key(None).unwrap().is_none());
        assert!(ReceiptSigner::from_optional_key(Some("  ")).unwrap().is_none());
        assert!(ReceiptSigner::from_optional_key(Some("zz")).is_err());

        let key = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let signer = ReceiptSigner::from_optional_key(Some(key)).unwrap().unwrap();
        assert_eq!(
            format!("{:?}", signer.address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }
}
