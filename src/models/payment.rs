use crate::models::PaymentDetails;
use anyhow::{bail, Result};
use ethers::types::U256;
use ethers::utils::{format_units, parse_units};
use serde::{Deserialize, Serialize};

/// USDC has 6 decimals on every chain we accept payment on.
pub const USDC_DECIMALS: u32 = 6;

/// What a caller must pay, returned inside a 402 response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentContext {
    pub recipient: String,
    pub token: String,
    pub token_address: String,
    pub amount: String,
    pub chain_id: u64,
    pub nonce: String,
    /// Request header that carries the payment proof.
    pub header: String,
}

/// Proof submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentProof {
    pub tx_hash: String,
    pub nonce: Option<String>,
}

/// A payment that passed verification. Inserted into request extensions by
/// the payment middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub tx_hash: String,
    pub payer: String,
    pub recipient: String,
    pub amount: String,
    pub token: String,
    pub chain_id: u64,
    pub nonce: String,
}

impl VerifiedPayment {
    pub fn to_details(&self) -> PaymentDetails {
        PaymentDetails {
            payer: self.payer.clone(),
            recipient: self.recipient.clone(),
            amount: self.amount.clone(),
            token: self.token.clone(),
            chain_id: self.chain_id,
            nonce: self.nonce.clone(),
        }
    }
}

/// Parse a human decimal amount (`"0.001"`, `"$1,000.50"`) into base units
/// without going through floating point.
pub fn parse_token_amount(amount: &str, decimals: u32) -> Result<U256> {
    let cleaned = amount.trim().trim_start_matches('$').replace(',', "");
    if cleaned.starts_with('-') {
        bail!("Negative amount: {}", amount);
    }
    Ok(parse_units(cleaned, decimals)?.into())
}

/// Format base units as the shortest exact decimal string.
pub fn format_token_amount(value: U256, decimals: u32) -> String {
    match format_units(value, decimals) {
        Ok(formatted) if formatted.contains('.') => formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string(),
        Ok(formatted) => formatted,
        Err(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_amounts() {
        assert_eq!(parse_token_amount("0.001", USDC_DECIMALS).unwrap(), U256::from(1_000u64));
        assert_eq!(parse_token_amount("$1,000.50", USDC_DECIMALS).unwrap(), U256::from(1_000_500_000u64));
        assert_eq!(parse_token_amount("0.01", USDC_DECIMALS).unwrap(), U256::from(10_000u64));
        assert!(parse_token_amount("abc", USDC_DECIMALS).is_err());
        assert!(parse_token_amount("-1", USDC_DECIMALS).is_err());
    }

    #[test]
    fn formats_shortest_decimal() {
        assert_eq!(format_token_amount(U256::from(1_000u64), USDC_DECIMALS), "0.001");
        assert_eq!(format_token_amount(U256::from(1_000_000u64), USDC_DECIMALS), "1");
        assert_eq!(format_token_amount(U256::from(1_234_567u64), USDC_DECIMALS), "1.234567");
        assert_eq!(format_token_amount(U256::zero(), USDC_DECIMALS), "0");
    }

    #[test]
    fn verified_payment_maps_to_receipt_details() {
        let payment = VerifiedPayment {
            tx_hash: "0xabc".into(),
            payer: "0x1111111111111111111111111111111111111111".into(),
            recipient: "0x2222222222222222222222222222222222222222".into(),
            amount: "0.001".into(),
            token: "USDC".into(),
            chain_id: 8453,
            nonce: "n-1".into(),
        };
        let details = payment.to_details();
        assert_eq!(details.payer, payment.payer);
        assert_eq!(details.nonce, "n-1");
        assert_eq!(details.chain_id, 8453);
    }
}
