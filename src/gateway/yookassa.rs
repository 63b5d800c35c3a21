use crate::domain::payment::{format_amount, parse_amount, PaymentMethod, PaymentStatus};
use crate::gateway::{CreatePayment, GatewayError, PaymentProvider, ProviderPayment};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};

pub struct YooKassaClient {
    pub base_url: String,
    pub shop_id: String,
    pub secret_key: String,
    pub timeout_ms: u64,
    pub client: reqwest::Client,
}

impl YooKassaClient {
    fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    async fn read_payment(&self, resp: reqwest::Response) -> Result<ProviderPayment, GatewayError> {
        let status = resp.status();
        if status.is_success() {
            let v: Value = resp
                .json()
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
            return parse_payment(&v);
        }

        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
            return Err(GatewayError::Timeout);
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::Transport(format!("HTTP {}: {}", status.as_u16(), truncate(&body))));
        }

        let v: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        Err(GatewayError::Rejected {
            code: v
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            message: v
                .get("description")
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .unwrap_or_else(|| truncate(&body)),
        })
    }
}

#[async_trait::async_trait]
impl PaymentProvider for YooKassaClient {
    fn name(&self) -> &'static str {
        "yookassa"
    }

    async fn create(&self, req: &CreatePayment) -> Result<ProviderPayment, GatewayError> {
        let mut payment_method = json!({ "type": req.method.provider_code() });
        if req.method == PaymentMethod::Sbp {
            if let Some(bank_id) = &req.bank_id {
                payment_method["bank_id"] = json!(bank_id);
            }
        }

        let mut confirmation = json!({
            "type": "redirect",
            "return_url": req.return_url,
        });
        if req.method == PaymentMethod::Sbp {
            confirmation["enforce_payment_method"] = json!(true);
        }

        let body = json!({
            "amount": {
                "value": format_amount(req.amount_minor),
                "currency": req.currency,
            },
            "description": req.description,
            "payment_method": payment_method,
            "confirmation": confirmation,
            "metadata": {
                "order_id": req.order_id.to_string(),
                "payment_id": req.payment_id.to_string(),
            },
            "capture": true,
        });

        let resp = self
            .client
            .post(format!("{}/payments", self.base_url))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", &req.idempotence_key)
            .json(&body)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(map_transport)?;

        self.read_payment(resp).await
    }

    async fn query(&self, provider_payment_id: &str) -> Result<ProviderPayment, GatewayError> {
        let resp = self
            .client
            .get(format!("{}/payments/{}", self.base_url, provider_payment_id))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .timeout(self.timeout())
            .send()
            .await
            .map_err(map_transport)?;

        self.read_payment(resp).await
    }

    async fn cancel(
        &self,
        provider_payment_id: &str,
        idempotence_key: &str,
    ) -> Result<ProviderPayment, GatewayError> {
        let resp = self
            .client
            .post(format!(
                "{}/payments/{}/cancel",
                self.base_url, provider_payment_id
            ))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", idempotence_key)
            .json(&json!({}))
            .timeout(self.timeout())
            .send()
            .await
            .map_err(map_transport)?;

        self.read_payment(resp).await
    }
}

fn map_transport(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(e.to_string())
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

fn parse_payment(v: &Value) -> Result<ProviderPayment, GatewayError> {
    let provider_payment_id = v
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::InvalidResponse("missing payment id".to_string()))?
        .to_string();

    let raw_status = v
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::InvalidResponse("missing status".to_string()))?;
    let status = PaymentStatus::from_provider(raw_status)
        .ok_or_else(|| GatewayError::InvalidResponse(format!("unknown status {raw_status}")))?;

    let amount_minor = v
        .get("amount")
        .and_then(|a| a.get("value"))
        .and_then(Value::as_str)
        .and_then(parse_amount);

    let confirmation_url = v
        .get("confirmation")
        .and_then(|c| c.get("confirmation_url"))
        .and_then(Value::as_str)
        .map(ToString::to_string);

    let captured_at = v
        .get("captured_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));

    let error_message = v
        .get("cancellation_details")
        .and_then(|d| d.get("reason"))
        .and_then(Value::as_str)
        .map(ToString::to_string);

    Ok(ProviderPayment {
        provider_payment_id,
        status,
        amount_minor,
        confirmation_url,
        captured_at,
        error_message,
    })
}
