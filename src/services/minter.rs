use crate::error::ReceiptError;
use crate::models::{PaymentDetails, Receipt, ServiceDetails};
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;

pub const RECEIPT_VERSION: &str = "1.0";
pub const RECEIPT_ID_PREFIX: &str = "rcpt_";
const RECEIPT_ID_BYTES: usize = 6;

/// Source of the random bytes behind receipt ids.
///
/// Implementations must be thread-safe (`Send + Sync`) and must fail rather
/// than hand out predictable bytes.
pub trait RandomSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), ReceiptError>;
}

/// Operating-system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandomSource;

impl RandomSource for OsRandomSource {
    fn fill(&self, buf: &mut [u8]) -> Result<(), ReceiptError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| ReceiptError::EntropyUnavailable(e.to_string()))
    }
}

#[derive(Clone)]
pub struct ReceiptMinter {
    random: Arc<dyn RandomSource>,
}

impl ReceiptMinter {
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }

    /// `rcpt_` followed by 12 lowercase hex characters (48 random bits).
    pub fn generate_id(&self) -> Result<String, ReceiptError> {
        let mut bytes = [0u8; RECEIPT_ID_BYTES];
        self.random.fill(&mut bytes)?;
        Ok(format!("{}{}", RECEIPT_ID_PREFIX, hex::encode(bytes)))
    }

    pub fn mint(
        &self,
        payment: PaymentDetails,
        service: ServiceDetails,
    ) -> Result<Receipt, ReceiptError> {
        let id = self.generate_id()?;

        Ok(Receipt {
            id,
            version: RECEIPT_VERSION.to_string(),
            timestamp: Utc::now(),
            payment,
            service,
        })
    }
}

impl Default for ReceiptMinter {
    fn default() -> Self {
        Self::new(Arc::new(OsRandomSource))
    }
}

impl std::fmt::Debug for ReceiptMinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiptMinter").finish_non_exhaustive()
    }
}
