//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to the billing command and query handlers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Json, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::handlers::billing::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
    CreateSubscriptionCommand, CreateSubscriptionHandler, EnsureCustomerCommand,
    EnsureCustomerHandler, EntitlementQuery, HandleBillingWebhookCommand,
    HandleBillingWebhookHandler, IsEntitledHandler, IsEntitledQuery, ProductRef, Reconciler,
    RetrySubscriptionCommand, RetrySubscriptionHandler,
};
use crate::domain::billing::{Association, BillingError, StripeWebhookVerifier};
use crate::domain::foundation::UserId;
use crate::ports::{
    AssociationQueue, AssociationRepository, BillingProvider, ChargeEventPublisher,
    ChargeRepository, UserRepository,
};

use super::dto::{
    CancelResponse, CustomerResponse, EntitlementResponse, ErrorResponse, InvoiceResponse,
    SubscriptionRequest, SubscriptionResponse,
};

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const USER_ID_HEADER: &str = "X-User-Id";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the billing routes.
///
/// Cloned for each request; handlers are built on demand from the ports.
#[derive(Clone)]
pub struct BillingAppState {
    pub charges: Arc<dyn ChargeRepository>,
    pub users: Arc<dyn UserRepository>,
    pub associations: Arc<dyn AssociationRepository>,
    pub provider: Arc<dyn BillingProvider>,
    pub association_queue: Arc<dyn AssociationQueue>,
    pub charge_events: Arc<dyn ChargeEventPublisher>,
    pub webhook_verifier: Arc<StripeWebhookVerifier>,
}

impl BillingAppState {
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.charges.clone(),
            self.users.clone(),
            self.provider.clone(),
            self.association_queue.clone(),
        )
        .with_event_publisher(self.charge_events.clone())
    }

    pub fn ensure_customer_handler(&self) -> EnsureCustomerHandler {
        EnsureCustomerHandler::new(self.users.clone(), self.provider.clone())
    }

    pub fn create_subscription_handler(&self) -> CreateSubscriptionHandler {
        CreateSubscriptionHandler::new(self.provider.clone(), self.reconciler())
    }

    pub fn retry_subscription_handler(&self) -> RetrySubscriptionHandler {
        RetrySubscriptionHandler::new(self.provider.clone())
    }

    pub fn cancel_subscription_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(
            self.users.clone(),
            self.charges.clone(),
            self.provider.clone(),
            self.reconciler(),
        )
    }

    pub fn is_entitled_handler(&self) -> IsEntitledHandler {
        IsEntitledHandler::new(
            EntitlementQuery::new(self.charges.clone(), self.users.clone()),
            self.reconciler(),
        )
    }

    pub fn webhook_handler(&self) -> HandleBillingWebhookHandler {
        HandleBillingWebhookHandler::new(
            self.webhook_verifier.clone(),
            self.provider.clone(),
            self.charges.clone(),
            self.associations.clone(),
            self.reconciler(),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Current user, taken from the `X-User-Id` header set by the gateway.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/customer - Ensure the current user is a Stripe customer
pub async fn ensure_customer(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.ensure_customer_handler();
    let result = handler
        .handle(EnsureCustomerCommand {
            user_id: user.user_id,
        })
        .await?;

    Ok(Json(CustomerResponse {
        stripe_customer_id: result.customer_id,
    }))
}

/// POST /api/billing/subscription - Create a subscription, or retry its invoice
pub async fn create_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<SubscriptionRequest>,
) -> Result<Response, BillingApiError> {
    if request.retry {
        let invoice_id = request
            .invoice_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| BillingError::validation("invoiceId", "required when retrying"))?;

        let handler = state.retry_subscription_handler();
        let result = handler
            .handle(RetrySubscriptionCommand {
                customer_id: request.customer_id,
                payment_method_id: request.payment_method_id,
                invoice_id,
            })
            .await?;

        return Ok(Json(InvoiceResponse {
            invoice: result.invoice,
        })
        .into_response());
    }

    let product = request
        .product
        .ok_or_else(|| BillingError::validation("product", "must be provided"))?;
    let association = Association::parse_optional(
        request.associated_collection.as_deref(),
        request.associated_document.as_deref(),
    )?;

    let handler = state.create_subscription_handler();
    let result = handler
        .handle(CreateSubscriptionCommand {
            user_id: user.user_id,
            customer_id: request.customer_id,
            payment_method_id: request.payment_method_id,
            product: ProductRef {
                product_key: product.product_key,
                price_id: product.price_id,
            },
            association,
        })
        .await?;

    Ok(Json(SubscriptionResponse {
        subscription: result.subscription,
    })
    .into_response())
}

/// POST /api/billing/subscription/cancel - Cancel the current user's subscription
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.cancel_subscription_handler();
    let result = handler
        .handle(CancelSubscriptionCommand {
            user_id: user.user_id,
        })
        .await?;

    let subscription = match result {
        CancelSubscriptionResult::Canceled { subscription, .. } => Some(subscription),
        CancelSubscriptionResult::NothingToCancel => None,
    };

    Ok(Json(CancelResponse { subscription }))
}

/// POST /webhook - Handle Stripe webhook events
pub async fn handle_stripe_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, BillingApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            BillingError::SignatureVerification("Missing Stripe-Signature header".to_string())
        })?;

    let handler = state.webhook_handler();
    handler
        .handle(HandleBillingWebhookCommand {
            payload: body.to_vec(),
            signature: signature.to_string(),
        })
        .await?;

    Ok(StatusCode::OK)
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/billing/entitlement - Whether the current user has access
///
/// Anonymous callers are not entitled.
pub async fn check_entitlement(
    State(state): State<BillingAppState>,
    user: Option<AuthenticatedUser>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.is_entitled_handler();
    let entitled = handler
        .handle(IsEntitledQuery {
            user_id: user.map(|u| u.user_id),
        })
        .await?;

    Ok(Json(EntitlementResponse { entitled }))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl From<crate::domain::billing::AssociationError> for BillingApiError {
    fn from(err: crate::domain::billing::AssociationError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            BillingError::PaymentDeclined { .. } => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_DECLINED"),
            BillingError::SignatureVerification(_) => {
                (StatusCode::BAD_REQUEST, "INVALID_WEBHOOK_SIGNATURE")
            }
            BillingError::UnrecognizedEvent(_) => (StatusCode::BAD_REQUEST, "UNRECOGNIZED_EVENT"),
            BillingError::UnknownAssociation(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_ASSOCIATION"),
            BillingError::Validation { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            BillingError::UserNotFound(_) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            BillingError::RemoteService { .. } => (StatusCode::BAD_GATEWAY, "REMOTE_SERVICE_ERROR"),
            BillingError::Cancellation(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CANCELLATION_FAILED")
            }
            BillingError::DuplicateCharge { .. } | BillingError::Persistence(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        // Server-side failures never echo details back to the client
        let message = if status.is_server_error() {
            tracing::error!(error = %self.0, code = error_code, "Billing request failed");
            "The billing request could not be completed".to_string()
        } else {
            tracing::warn!(error = %self.0, code = error_code, "Billing request rejected");
            self.0.to_string()
        };

        (status, Json(ErrorResponse::new(error_code, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_of(err: BillingError) -> (StatusCode, Value) {
        let response = BillingApiError::from(err).into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn declined_payment_is_402_with_reason() {
        let (status, body) = body_of(BillingError::payment_declined("insufficient_funds")).await;

        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["errorCode"], "PAYMENT_DECLINED");
        assert!(body["message"].as_str().unwrap().contains("insufficient_funds"));
    }

    #[tokio::test]
    async fn client_errors_are_400() {
        for err in [
            BillingError::SignatureVerification("bad".into()),
            BillingError::UnrecognizedEvent("charge.refunded".into()),
            BillingError::UnknownAssociation("posts".into()),
            BillingError::validation("customerId", "must not be empty"),
        ] {
            let (status, _) = body_of(err).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn missing_user_is_404() {
        let (status, body) = body_of(BillingError::UserNotFound(UserId::new("u1").unwrap())).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errorCode"], "USER_NOT_FOUND");
    }

    #[tokio::test]
    async fn remote_failure_is_502_without_details() {
        let (status, body) = body_of(BillingError::remote("sk_live_secret leaked")).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!body["message"].as_str().unwrap().contains("sk_live"));
    }

    #[tokio::test]
    async fn persistence_failure_is_generic_500() {
        let (status, body) = body_of(BillingError::persistence("relation charges missing")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "The billing request could not be completed");
    }
}
