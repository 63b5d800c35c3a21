use crate::service::webhook::WebhookEvent;
use crate::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

/// Provider push endpoint. Structurally invalid bodies are rejected by the
/// JSON extractor with a client error before this runs; everything else is
/// acknowledged so the provider stops redelivering. The poller is the
/// backstop for anything lost here.
pub async fn provider_webhook(
    State(state): State<AppState>,
    Json(event): Json<WebhookEvent>,
) -> impl IntoResponse {
    if let Err(e) = state.webhook_ingest.process(event).await {
        tracing::error!("webhook processing failed: {e}");
    }
    (axum::http::StatusCode::OK, "ok")
}
