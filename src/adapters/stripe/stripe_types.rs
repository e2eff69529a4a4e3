//! Stripe REST response shapes not covered by the domain snapshots.

use serde::Deserialize;

use crate::ports::{ProviderError, ProviderErrorCode};

/// `POST /v1/customers` response (only the id is read).
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
}

/// Error envelope returned with every non-2xx response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorEnvelope {
    pub error: StripeErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorBody {
    /// `card_error`, `invalid_request_error`, `api_error`, ...
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,

    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub decline_code: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}

/// Maps a failed Stripe response to a provider error.
pub fn provider_error_from_response(status: u16, body: &str) -> ProviderError {
    let parsed = serde_json::from_str::<StripeErrorEnvelope>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|e| e.error.message.clone())
        .unwrap_or_else(|| format!("Stripe API error (HTTP {})", status));

    if let Some(envelope) = &parsed {
        let is_card_error = envelope.error.error_type.as_deref() == Some("card_error")
            || envelope.error.code.as_deref() == Some("card_declined");
        if is_card_error {
            let decline = envelope
                .error
                .decline_code
                .clone()
                .or_else(|| envelope.error.code.clone());
            return ProviderError::card_declined(message, decline);
        }
    }

    let code = match status {
        404 => ProviderErrorCode::NotFound,
        400 | 402 | 409 => ProviderErrorCode::InvalidRequest,
        _ => ProviderErrorCode::ProviderError,
    };
    ProviderError::new(code, message)
}
