use crate::error::ReceiptError;
use crate::models::{PaymentDetails, Receipt, ServiceDetails, SignedReceipt};
use crate::services::{ReceiptMinter, ReceiptSigner, ReceiptStore};
use std::sync::Arc;

/// Re-mint attempts before giving up on a clashing receipt id.
pub const MAX_MINT_ATTEMPTS: usize = 3;

/// Mints, signs and stores receipts for the request handlers.
pub struct ReceiptIssuer {
    minter: ReceiptMinter,
    signer: Option<ReceiptSigner>,
    store: Arc<ReceiptStore>,
}

impl ReceiptIssuer {
    pub fn new(
        minter: ReceiptMinter,
        signer: Option<ReceiptSigner>,
        store: Arc<ReceiptStore>,
    ) -> Self {
        if signer.is_none() {
            tracing::warn!("No receipt signing key configured, responses will carry no receipt");
        }
        Self {
            minter,
            signer,
            store,
        }
    }

    pub fn signing_enabled(&self) -> bool {
        self.signer.is_some()
    }

    pub fn public_key(&self) -> Option<&str> {
        self.signer.as_ref().map(ReceiptSigner::public_key)
    }

    pub fn minter(&self) -> &ReceiptMinter {
        &self.minter
    }

    pub fn store(&self) -> &Arc<ReceiptStore> {
        &self.store
    }

    pub fn sign(&self, receipt: Receipt) -> Result<SignedReceipt, ReceiptError> {
        self.signer
            .as_ref()
            .ok_or(ReceiptError::SigningKeyMissing)?
            .sign(receipt)
    }

    /// Mint, sign and store a receipt under the store's default TTL.
    ///
    /// The id is reserved atomically at store time. If it clashes with a live
    /// receipt, a fresh id is minted, up to [`MAX_MINT_ATTEMPTS`] times.
    pub fn issue(
        &self,
        payment: PaymentDetails,
        service: ServiceDetails,
    ) -> Result<SignedReceipt, ReceiptError> {
        let signer = self.signer.as_ref().ok_or(ReceiptError::SigningKeyMissing)?;

        for attempt in 1..=MAX_MINT_ATTEMPTS {
            let receipt = self.minter.mint(payment.clone(), service.clone())?;
            let signed = signer.sign(receipt)?;

            if self.store.try_store(signed.clone(), self.store.default_ttl()) {
                tracing::info!(
                    receipt_id = %signed.receipt.id,
                    payer = %signed.receipt.payment.payer,
                    endpoint = %signed.receipt.service.endpoint,
                    "Receipt issued"
                );
                return Ok(signed);
            }

            tracing::warn!(
                receipt_id = %signed.receipt.id,
                attempt,
                "Receipt id collision, minting a new id"
            );
        }

        Err(ReceiptError::IdCollision(MAX_MINT_ATTEMPTS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{verify_signed_receipt, RandomSource, DEFAULT_RECEIPT_TTL};
    use ethers::signers::LocalWallet;
    use std::sync::Mutex;

    /// Replays the given byte patterns in order, then repeats the last one.
    struct ScriptedSource(Mutex<Vec<[u8; 6]>>);

    impl ScriptedSource {
        fn new(patterns: Vec<[u8; 6]>) -> Self {
            Self(Mutex::new(patterns))
        }
    }

    impl RandomSource for ScriptedSource {
        fn fill(&self, buf: &mut [u8]) -> Result<(), ReceiptError> {
            let mut patterns = self.0.lock().unwrap();
            let next = if patterns.len() > 1 {
                patterns.remove(0)
            } else {
                patterns[0]
            };
            buf.copy_from_slice(&next[..buf.len()]);
            Ok(())
        }
    }

    fn payment() -> PaymentDetails {
        PaymentDetails {
            payer: "0x742d35Cc6634C0532925a3b844Bc9e7595f8fE21".to_string(),
            recipient: "0x2cAF48b4BA1C58721a85dFADa5aC01C2DFa62219".to_string(),
            amount: "0.001".to_string(),
            token: "USDC".to_string(),
            chain_id: 8453,
            nonce: "nonce-1".to_string(),
        }
    }

    fn service() -> ServiceDetails {
        ServiceDetails {
            endpoint: "/api/ai/summarize".to_string(),
            request_hash: "sha256:req".to_string(),
            response_hash: "sha256:resp".to_string(),
        }
    }

    fn signer() -> Option<ReceiptSigner> {
        Some(ReceiptSigner::from_wallet(LocalWallet::new(&mut rand::thread_rng())))
    }

    fn issuer_with(source: ScriptedSource) -> ReceiptIssuer {
        ReceiptIssuer::new(
            ReceiptMinter::new(Arc::new(source)),
            signer(),
            Arc::new(ReceiptStore::new(DEFAULT_RECEIPT_TTL)),
        )
    }

    #[test]
    fn issued_receipt_is_signed_and_stored() {
        let issuer = ReceiptIssuer::new(
            ReceiptMinter::default(),
            signer(),
            Arc::new(ReceiptStore::default()),
        );

        let signed = issuer.issue(payment(), service()).unwrap();
        verify_signed_receipt(&signed).unwrap();
        assert_eq!(Some(signed.server_public_key.as_str()), issuer.public_key());
        assert_eq!(issuer.store().get(&signed.receipt.id), Some(signed));
    }

    #[test]
    fn missing_key_disables_signing_only() {
        let issuer = ReceiptIssuer::new(
            ReceiptMinter::default(),
            None,
            Arc::new(ReceiptStore::default()),
        );
        assert!(!issuer.signing_enabled());

        let receipt = issuer.minter().mint(payment(), service()).unwrap();
        let err = issuer.sign(receipt).unwrap_err();
        assert!(matches!(err, ReceiptError::SigningKeyMissing));

        let err = issuer.issue(payment(), service()).unwrap_err();
        assert!(err.is_configuration());
        assert!(issuer.store().is_empty());
    }

    #[test]
    fn collision_is_retried_with_new_id() {
        let issuer = issuer_with(ScriptedSource::new(vec![
            [0xaa; 6],
            [0xaa; 6],
            [0xbb; 6],
        ]));

        let first = issuer.issue(payment(), service()).unwrap();
        assert_eq!(first.receipt.id, "rcpt_aaaaaaaaaaaa");

        let second = issuer.issue(payment(), service()).unwrap();
        assert_eq!(second.receipt.id, "rcpt_bbbbbbbbbbbb");

        // The original receipt was not overwritten.
        assert_eq!(issuer.store().get("rcpt_aaaaaaaaaaaa"), Some(first));
    }

    #[test]
    fn persistent_collision_fails() {
        let issuer = issuer_with(ScriptedSource::new(vec![[0x11; 6]]));

        issuer.issue(payment(), service()).unwrap();
        let err = issuer.issue(payment(), service()).unwrap_err();
        assert!(matches!(err, ReceiptError::IdCollision(MAX_MINT_ATTEMPTS)));
    }
}
