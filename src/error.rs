use crate::models::PaymentContext;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failures of the receipt subsystem (minting, signing, verification).
#[derive(Error, Debug)]
pub enum ReceiptError {
    #[error("Receipt signing key not configured")]
    SigningKeyMissing,

    #[error("Malformed signing key: {0}")]
    MalformedKey(String),

    #[error("Randomness source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("Receipt serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Recovered public key {recovered} does not match {expected}")]
    PublicKeyMismatch { recovered: String, expected: String },

    #[error("Receipt id collision after {0} attempts")]
    IdCollision(usize),
}

impl ReceiptError {
    /// Configuration errors are permanent until the operator fixes the key.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::SigningKeyMissing | Self::MalformedKey(_))
    }

    /// True for failures that mean "this receipt is not authentic".
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature(_) | Self::PublicKeyMismatch { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum PaygateError {
    #[error("Payment Required")]
    PaymentRequired(Box<PaymentContext>),

    #[error("Payment verification failed: {0}")]
    PaymentVerificationFailed(String),

    #[error("Invalid payment proof: {0}")]
    InvalidPaymentProof(String),

    #[error("Payment already used: {0}")]
    PaymentReplayed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Text too long: {length} > {max} characters")]
    TextTooLong { length: usize, max: usize },

    #[error("AI service error: {0}")]
    UpstreamError(String),

    #[error("AI service timed out after {0}s")]
    UpstreamTimeout(u64),

    #[error("Receipt not found")]
    ReceiptNotFound,

    #[error("Receipt error: {0}")]
    Receipt(#[from] ReceiptError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_context: Option<PaymentContext>,
}

impl PaygateError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            PaygateError::PaymentRequired(_) => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_REQUIRED"),
            PaygateError::PaymentVerificationFailed(_) => {
                (StatusCode::PAYMENT_REQUIRED, "PAYMENT_VERIFICATION_FAILED")
            }
            PaygateError::PaymentReplayed(_) => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_REPLAYED"),
            PaygateError::InvalidPaymentProof(_) => {
                (StatusCode::BAD_REQUEST, "INVALID_PAYMENT_PROOF")
            }
            PaygateError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            PaygateError::TextTooLong { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "TEXT_TOO_LONG"),
            PaygateError::UpstreamError(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            PaygateError::UpstreamTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_TIMEOUT"),
            PaygateError::ReceiptNotFound => (StatusCode::NOT_FOUND, "RECEIPT_NOT_FOUND"),
            PaygateError::Receipt(e) if e.is_configuration() => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SIGNING_NOT_CONFIGURED")
            }
            PaygateError::Receipt(_) => (StatusCode::INTERNAL_SERVER_ERROR, "RECEIPT_ERROR"),
            PaygateError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        }
    }
}

impl IntoResponse for PaygateError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let (status, error_code) = self.status_and_code();

        let (message, payment_context) = match &self {
            PaygateError::PaymentRequired(context) => (
                Some(format!(
                    "Send {} {} to {} on chain {} and retry with the {} header",
                    context.amount, context.token, context.recipient, context.chain_id, context.header
                )),
                Some(context.as_ref().clone()),
            ),
            _ => (None, None),
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id,
            message,
            payment_context,
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, error_code, "Request failed");
        } else {
            tracing::warn!(error = %self, error_code, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}
