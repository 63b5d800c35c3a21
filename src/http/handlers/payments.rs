use crate::domain::payment::ErrorEnvelope;
use crate::gateway::GatewayError;
use crate::service::payment_service::{sbp_banks, CreatePaymentRequest, PaymentError};
use crate::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

pub async fn create_payment(
    State(state): State<AppState>,
    Json(req): Json<CreatePaymentRequest>,
) -> impl IntoResponse {
    match state.payment_service.create_payment(req).await {
        Ok(resp) => (axum::http::StatusCode::OK, Json(resp)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.payment_service.get_payment(payment_id).await {
        Ok(resp) => (axum::http::StatusCode::OK, Json(resp)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn list_order_payments(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> impl IntoResponse {
    match state.payment_service.list_for_order(order_id).await {
        Ok(resp) => (axum::http::StatusCode::OK, Json(resp)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn check_status(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.payment_service.check_status(payment_id).await {
        Ok(resp) => (axum::http::StatusCode::OK, Json(resp)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.payment_service.cancel_payment(payment_id).await {
        Ok(resp) => (axum::http::StatusCode::OK, Json(resp)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn list_sbp_banks() -> impl IntoResponse {
    (axum::http::StatusCode::OK, Json(sbp_banks())).into_response()
}

fn error_response(e: PaymentError) -> axum::response::Response {
    let (status, code) = match &e {
        PaymentError::NotFound(_) => (axum::http::StatusCode::NOT_FOUND, "PAYMENT_NOT_FOUND"),
        PaymentError::Invalid(_) => (axum::http::StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
        PaymentError::AlreadyPaid(_) => (axum::http::StatusCode::CONFLICT, "ORDER_ALREADY_PAID"),
        PaymentError::NotCancellable(_) => (axum::http::StatusCode::CONFLICT, "NOT_CANCELLABLE"),
        PaymentError::NotSubmitted => (axum::http::StatusCode::CONFLICT, "NOT_SUBMITTED"),
        PaymentError::Gateway(g) => match g {
            GatewayError::Rejected { .. } => {
                (axum::http::StatusCode::BAD_GATEWAY, "PROVIDER_REJECTED")
            }
            _ => (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                "PROVIDER_UNAVAILABLE",
            ),
        },
        PaymentError::Store(_) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
        ),
    };

    (status, Json(ErrorEnvelope::new(code, &e.to_string()))).into_response()
}
