use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The payment a receipt attests to. Field order is part of the signed
/// serialization and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub payer: String,
    pub recipient: String,
    /// Exact decimal amount in token units, e.g. `"0.001"`.
    pub amount: String,
    pub token: String,
    pub chain_id: u64,
    pub nonce: String,
}

/// The service call a receipt attests to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDetails {
    pub endpoint: String,
    pub request_hash: String,
    pub response_hash: String,
}

/// Unsigned attestation that `service` was rendered for `payment`.
///
/// The JSON produced by `serde_json` for this struct is the canonical form
/// that gets hashed and signed; serde emits fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub payment: PaymentDetails,
    pub service: ServiceDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedReceipt {
    pub receipt: Receipt,
    /// `0x`-prefixed 65-byte `r || s || v` signature.
    pub signature: String,
    /// `0x`-prefixed uncompressed SEC1 public key of the signer.
    pub server_public_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_receipt() -> Receipt {
        Receipt {
            id: "rcpt_abc123def456".to_string(),
            version: "1.0".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            payment: PaymentDetails {
                payer: "0x742d35Cc6634C0532925a3b844Bc9e7595f8fE21".to_string(),
                recipient: "0x2cAF48b4BA1C58721a85dFADa5aC01C2DFa62219".to_string(),
                amount: "0.001".to_string(),
                token: "USDC".to_string(),
                chain_id: 8453,
                nonce: "test-nonce".to_string(),
            },
            service: ServiceDetails {
                endpoint: "/api/ai/summarize".to_string(),
                request_hash: "sha256:request".to_string(),
                response_hash: "sha256:response".to_string(),
            },
        }
    }

    #[test]
    fn serialization_is_deterministic() {
        let receipt = sample_receipt();
        let first = serde_json::to_vec(&receipt).unwrap();
        let second = serde_json::to_vec(&receipt).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn serialization_has_wire_fields_in_order() {
        let json = serde_json::to_string(&sample_receipt()).unwrap();
        assert_eq!(
            json,
            concat!(
                r#"{"id":"rcpt_abc123def456","version":"1.0","timestamp":"2024-01-15T10:30:00Z","#,
                r#""payment":{"payer":"0x742d35Cc6634C0532925a3b844Bc9e7595f8fE21","#,
                r#""recipient":"0x2cAF48b4BA1C58721a85dFADa5aC01C2DFa62219","amount":"0.001","#,
                r#""token":"USDC","chainId":8453,"nonce":"test-nonce"},"#,
                r#""service":{"endpoint":"/api/ai/summarize","requestHash":"sha256:request","#,
                r#""responseHash":"sha256:response"}}"#
            )
        );

        let decoded: serde_json::Value = serde_json::from_str(&json).unwrap();
        for field in ["id", "version", "timestamp", "payment", "service"] {
            assert!(decoded.get(field).is_some(), "missing field {field}");
        }
    }

    #[test]
    fn subsecond_timestamps_survive_round_trip() {
        let mut receipt = sample_receipt();
        receipt.timestamp = Utc.timestamp_opt(1_705_314_600, 123_456_789).unwrap();

        let json = serde_json::to_vec(&receipt).unwrap();
        let decoded: Receipt = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, receipt);
        assert_eq!(serde_json::to_vec(&decoded).unwrap(), json);
    }

    #[test]
    fn signed_receipt_wraps_receipt() {
        let signed = SignedReceipt {
            receipt: sample_receipt(),
            signature: "0x1234".to_string(),
            server_public_key: "0xabcd".to_string(),
        };
        let value = serde_json::to_value(&signed).unwrap();
        assert_eq!(value["receipt"]["id"], "rcpt_abc123def456");
        assert_eq!(value["signature"], "0x1234");
        assert_eq!(value["serverPublicKey"], "0xabcd");
    }
}
