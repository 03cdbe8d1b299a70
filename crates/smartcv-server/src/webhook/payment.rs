use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use serde::Deserialize;
use smartcv_core::{FailureClass, verify_paystack_signature};
use tracing::{error, warn};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct PaystackEvent {
    event: String,
    data: PaystackEventData,
}

#[derive(Debug, Deserialize)]
struct PaystackEventData {
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: bool,
    data: VerifyResponseData,
}

#[derive(Debug, Deserialize)]
struct VerifyResponseData {
    status: String,
    amount: u64,
}

/// `POST /webhook/paystack` (C10). Always returns 200 quickly; errors beyond
/// the signature check are surfaced to the admin mailbox instead of the caller,
/// since Paystack retries on anything other than 2xx.
pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let signature = headers
        .get("x-paystack-signature")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !verify_paystack_signature(&state.payment_secret_key, &body, signature) {
        warn!("rejected payment webhook with invalid signature");
        if let Err(err) = state
            .admin
            .notify(FailureClass::UnsignedPaymentWebhook, "unknown", "signature verification failed")
            .await
        {
            error!(error = %err, "failed to notify admin about unsigned payment webhook");
        }
        return StatusCode::BAD_REQUEST;
    }

    let event: PaystackEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "payment webhook body did not parse");
            return StatusCode::OK;
        }
    };

    if event.event != "charge.success" {
        return StatusCode::OK;
    }

    if let Err(err) = process_charge_success(&state, &event.data.reference).await {
        error!(error = %err, reference = event.data.reference, "failed to process payment webhook");
        let _ = state
            .admin
            .notify(FailureClass::UnsignedPaymentWebhook, &event.data.reference, &err)
            .await;
    }

    StatusCode::OK
}

async fn process_charge_success(state: &AppState, reference: &str) -> Result<(), String> {
    if !reference.starts_with("auto_") && !reference.starts_with("quick_") && !reference.starts_with("daily_") {
        return Err(format!("unrecognized reference prefix: {reference}"));
    }

    let verify_url = format!("{}/transaction/verify/{reference}", state.verify_base_url);
    let response = state
        .http
        .get(&verify_url)
        .bearer_auth(&state.payment_secret_key)
        .send()
        .await
        .map_err(|err| format!("verify request failed: {err}"))?;

    let body = response
        .text()
        .await
        .map_err(|err| format!("reading verify response failed: {err}"))?;
    let verified: VerifyResponse =
        serde_json::from_str(&body).map_err(|err| format!("verify response did not parse: {err}"))?;

    if !verified.status || verified.data.status != "success" {
        return Err(format!("provider did not confirm success for {reference}"));
    }

    let phone_number: String = state
        .session_kv
        .get_json(&format!("payment_ref:{reference}"))
        .await
        .map_err(|err| format!("kv lookup failed: {err}"))?
        .ok_or_else(|| format!("no payment_ref mapping for {reference}"))?;

    let purchased = (verified.data.amount / state.default_amount_kobo.max(1)).max(1) as i64;

    state
        .usage
        .grant_paid_applications(&phone_number, Utc::now().date_naive(), purchased)
        .await
        .map_err(|err| format!("failed to grant paid applications: {err}"))?;

    state
        .orchestrator
        .handle_payment_completed(&phone_number)
        .await
        .map_err(|err| format!("orchestrator failed to process completed payment: {err}"))?;

    Ok(())
}
