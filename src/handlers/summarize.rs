use crate::{
    error::{PaygateError, ReceiptError},
    models::{CachedSummary, ServiceDetails, SummarizeRequest, SummarizeResponse, VerifiedPayment},
    services::hash_data,
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Extension, Json,
};

pub const SUMMARIZE_ENDPOINT: &str = "/api/ai/summarize";
pub const RECEIPT_ID_HEADER: &str = "x-receipt-id";

/// Paid summarization. The payment middleware has already verified the
/// payment and put it in the request extensions.
pub async fn summarize(
    State(state): State<AppState>,
    Extension(payment): Extension<VerifiedPayment>,
    body: Bytes,
) -> Result<Response, PaygateError> {
    let request: SummarizeRequest = serde_json::from_slice(&body)
        .map_err(|e| PaygateError::InvalidRequest(format!("Invalid JSON body: {}", e)))?;

    let text = request.text.trim();
    if text.is_empty() {
        return Err(PaygateError::InvalidRequest("text is required".to_string()));
    }
    let length = text.chars().count();
    if length > state.limits.max_text_length {
        return Err(PaygateError::TextTooLong {
            length,
            max: state.limits.max_text_length,
        });
    }

    state
        .analytics
        .record_paid_request(SUMMARIZE_ENDPOINT, &payment.payer)
        .await;

    let model = state.summarizer.model().to_string();
    let cache_key = state.cache_keys.derive(text, &model);

    if let Some(cached) = state
        .cache
        .get::<CachedSummary>(&cache_key)
        .await
        .ok()
        .flatten()
    {
        state.analytics.record_cache_hit();
        let receipt = cached
            .receipt_id
            .as_deref()
            .and_then(|id| state.issuer.store().get(id));
        tracing::info!(cache_key = %cache_key, receipt = receipt.is_some(), "Serving cached summary");

        return Ok(respond(SummarizeResponse {
            result: cached.result,
            model,
            cached: true,
            receipt,
        }));
    }
    state.analytics.record_cache_miss();

    let result = match tokio::time::timeout(state.limits.ai_timeout, state.summarizer.summarize(text)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            state.analytics.record_upstream_failure();
            return Err(e);
        }
        Err(_) => {
            state.analytics.record_upstream_failure();
            return Err(PaygateError::UpstreamTimeout(state.limits.ai_timeout.as_secs()));
        }
    };

    let service = ServiceDetails {
        endpoint: SUMMARIZE_ENDPOINT.to_string(),
        request_hash: hash_data(&body),
        response_hash: hash_data(result.as_bytes()),
    };

    let receipt = match state.issuer.issue(payment.to_details(), service) {
        Ok(signed) => {
            state.analytics.record_receipt_issued();
            Some(signed)
        }
        Err(ReceiptError::SigningKeyMissing) => {
            tracing::warn!(tx = %payment.tx_hash, "Serving summary without receipt: signing disabled");
            None
        }
        Err(e) => return Err(e.into()),
    };

    let entry = CachedSummary {
        result: result.clone(),
        receipt_id: receipt.as_ref().map(|r| r.receipt.id.clone()),
    };
    if let Err(e) = state.cache.set(&cache_key, &entry).await {
        tracing::warn!(cache_key = %cache_key, "Failed to cache summary: {}", e);
    }

    Ok(respond(SummarizeResponse {
        result,
        model,
        cached: false,
        receipt,
    }))
}

fn respond(body: SummarizeResponse) -> Response {
    let receipt_id = body
        .receipt
        .as_ref()
        .and_then(|r| HeaderValue::from_str(&r.receipt.id).ok());

    let mut response = Json(body).into_response();
    if let Some(id) = receipt_id {
        response
            .headers_mut()
            .insert(HeaderName::from_static(RECEIPT_ID_HEADER), id);
    }
    response
}
