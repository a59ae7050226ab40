use crate::error::PaygateError;
use crate::models::{
    format_token_amount, PaymentContext, PaymentProof, VerifiedPayment, USDC_DECIMALS,
};
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Address, TransactionReceipt, H256},
    utils::{keccak256, to_checksum},
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Header carrying the payment transaction hash.
pub const PAYMENT_HEADER: &str = "X-Payment";
/// Optional caller-chosen nonce recorded in the receipt.
pub const PAYMENT_NONCE_HEADER: &str = "X-Payment-Nonce";

/// Decides whether a request is paid for.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    /// Payment instructions for a 402 response. Each call gets a fresh nonce.
    fn payment_context(&self) -> PaymentContext;

    async fn verify(&self, proof: &PaymentProof) -> Result<VerifiedPayment, PaygateError>;

    /// Hand a verified payment back when the request it paid for failed, so
    /// the caller can retry with the same transaction.
    fn release(&self, payment: &VerifiedPayment);
}

/// What the gateway charges per request.
#[derive(Debug, Clone)]
pub struct PaymentTerms {
    pub recipient: Address,
    pub token_address: Address,
    pub token_symbol: String,
    /// Price in token base units.
    pub amount: U256,
    pub chain_id: u64,
}

impl PaymentTerms {
    pub fn display_amount(&self) -> String {
        format_token_amount(self.amount, USDC_DECIMALS)
    }

    pub fn payment_context(&self) -> PaymentContext {
        PaymentContext {
            recipient: to_checksum(&self.recipient, None),
            token: self.token_symbol.clone(),
            token_address: to_checksum(&self.token_address, None),
            amount: self.display_amount(),
            chain_id: self.chain_id,
            nonce: Uuid::new_v4().to_string(),
            header: PAYMENT_HEADER.to_string(),
        }
    }
}

/// Verifies USDC transfers on chain from the transaction receipt.
pub struct OnChainVerifier {
    provider: Arc<Provider<Http>>,
    terms: PaymentTerms,
    used_payments: DashMap<H256, Instant>,
}

impl OnChainVerifier {
    pub fn new(rpc_url: &str, terms: PaymentTerms) -> anyhow::Result<Self> {
        let provider = Arc::new(Provider::<Http>::try_from(rpc_url)?);

        Ok(Self {
            provider,
            terms,
            used_payments: DashMap::new(),
        })
    }

    /// Claim a transaction hash. Returns `false` if it was already spent.
    fn try_claim(&self, tx_hash: H256) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.used_payments.entry(tx_hash) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                true
            }
        }
    }

    fn release_claim(&self, tx_hash: &H256) {
        self.used_payments.remove(tx_hash);
    }

    async fn verify_transaction(&self, tx_hash: H256) -> Result<UsdcTransfer, PaygateError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| PaygateError::PaymentVerificationFailed(format!("RPC error: {}", e)))?
            .ok_or_else(|| {
                PaygateError::PaymentVerificationFailed("Transaction not found".to_string())
            })?;

        if receipt.status != Some(1.into()) {
            return Err(PaygateError::PaymentVerificationFailed(
                "Transaction failed".to_string(),
            ));
        }

        let transfer = self.parse_usdc_transfer(&receipt)?;

        if transfer.amount < self.terms.amount {
            return Err(PaygateError::PaymentVerificationFailed(format!(
                "Insufficient payment: {} < {} {}",
                format_token_amount(transfer.amount, USDC_DECIMALS),
                self.terms.display_amount(),
                self.terms.token_symbol
            )));
        }

        tracing::info!(
            tx = ?tx_hash,
            payer = ?transfer.from,
            amount = %format_token_amount(transfer.amount, USDC_DECIMALS),
            "Payment verified"
        );

        Ok(transfer)
    }

    /// First `Transfer(from, to, value)` emitted by the token contract to our
    /// recipient.
    fn parse_usdc_transfer(&self, receipt: &TransactionReceipt) -> Result<UsdcTransfer, PaygateError> {
        let transfer_topic = H256::from(keccak256("Transfer(address,address,uint256)"));

        let transfers = receipt.logs.iter().filter(|log| {
            log.address == self.terms.token_address
                && log.topics.len() >= 3
                && log.topics[0] == transfer_topic
                && log.data.len() == 32
        });

        let mut wrong_recipient = None;
        for log in transfers {
            let to = Address::from(log.topics[2]);
            if to != self.terms.recipient {
                wrong_recipient = Some(to);
                continue;
            }
            return Ok(UsdcTransfer {
                from: Address::from(log.topics[1]),
                amount: U256::from_big_endian(&log.data),
            });
        }

        Err(match wrong_recipient {
            Some(to) => PaygateError::PaymentVerificationFailed(format!(
                "Payment to wrong address: {}",
                to_checksum(&to, None)
            )),
            None => PaygateError::InvalidPaymentProof(
                "No USDC transfer found in transaction".to_string(),
            ),
        })
    }
}

#[async_trait]
impl PaymentVerifier for OnChainVerifier {
    fn payment_context(&self) -> PaymentContext {
        self.terms.payment_context()
    }

    async fn verify(&self, proof: &PaymentProof) -> Result<VerifiedPayment, PaygateError> {
        let tx_hash = H256::from_str(proof.tx_hash.trim().trim_start_matches("0x"))
            .map_err(|e| PaygateError::InvalidPaymentProof(format!("Invalid tx hash: {}", e)))?;

        if !self.try_claim(tx_hash) {
            return Err(PaygateError::PaymentReplayed(format!("{:?}", tx_hash)));
        }

        let transfer = match self.verify_transaction(tx_hash).await {
            Ok(transfer) => transfer,
            Err(e) => {
                self.release_claim(&tx_hash);
                return Err(e);
            }
        };

        let tx_hash = format!("{:?}", tx_hash);
        Ok(VerifiedPayment {
            nonce: proof.nonce.clone().unwrap_or_else(|| tx_hash.clone()),
            tx_hash,
            payer: to_checksum(&transfer.from, None),
            recipient: to_checksum(&self.terms.recipient, None),
            amount: format_token_amount(transfer.amount, USDC_DECIMALS),
            token: self.terms.token_symbol.clone(),
            chain_id: self.terms.chain_id,
        })
    }

    fn release(&self, payment: &VerifiedPayment) {
        match H256::from_str(payment.tx_hash.trim_start_matches("0x")) {
            Ok(tx_hash) => {
                self.release_claim(&tx_hash);
                tracing::info!(tx = %payment.tx_hash, "Payment released for retry");
            }
            Err(e) => tracing::warn!(tx = %payment.tx_hash, "Cannot release payment: {}", e),
        }
    }
}

#[derive(Debug)]
struct UsdcTransfer {
    from: Address,
    amount: U256,
}

/// Axum middleware: 402 without a proof, verified payment in the request
/// extensions otherwise. A payment whose request ends in an error response
/// is released so it can be spent again.
pub async fn payment_middleware(
    State(verifier): State<Arc<dyn PaymentVerifier>>,
    mut request: Request,
    next: Next,
) -> Result<Response, PaygateError> {
    let (tx_hash, nonce) = {
        let headers = request.headers();
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        (header(PAYMENT_HEADER), header(PAYMENT_NONCE_HEADER))
    };

    let Some(tx_hash) = tx_hash else {
        return Err(PaygateError::PaymentRequired(Box::new(verifier.payment_context())));
    };

    let payment = verifier.verify(&PaymentProof { tx_hash, nonce }).await?;
    request.extensions_mut().insert(payment.clone());

    let response = next.run(request).await;
    if !response.status().is_success() {
        verifier.release(&payment);
    }

    Ok(response)
}
