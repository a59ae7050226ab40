use crate::{
    error::PaygateError,
    models::{SignedReceipt, VerificationResult},
    services::{recover_public_key, verify_signed_receipt, verify_with_operator_key},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};

/// Look up a receipt by id. Expired and unknown ids are indistinguishable.
pub async fn get_receipt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SignedReceipt>, PaygateError> {
    state
        .issuer
        .store()
        .get(&id)
        .map(Json)
        .ok_or(PaygateError::ReceiptNotFound)
}

/// Check a signed receipt the way any third party would.
pub async fn verify_receipt(
    State(state): State<AppState>,
    Json(signed): Json<SignedReceipt>,
) -> Json<VerificationResult> {
    let recovered_public_key = recover_public_key(&signed.receipt, &signed.signature).ok();

    let result = match verify_signed_receipt(&signed) {
        Ok(()) => VerificationResult {
            valid: true,
            issued_by_this_gateway: state
                .issuer
                .public_key()
                .is_some_and(|key| verify_with_operator_key(&signed, key).is_ok()),
            recovered_public_key,
            error: None,
        },
        Err(e) => {
            tracing::debug!(receipt_id = %signed.receipt.id, "Receipt verification failed: {}", e);
            VerificationResult {
                valid: false,
                recovered_public_key,
                issued_by_this_gateway: false,
                error: Some(e.to_string()),
            }
        }
    };

    Json(result)
}
