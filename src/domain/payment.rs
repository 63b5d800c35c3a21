use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    WaitingForCapture,
    Succeeded,
    Cancelled,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::WaitingForCapture => "WAITING_FOR_CAPTURE",
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "WAITING_FOR_CAPTURE" => Some(PaymentStatus::WaitingForCapture),
            "SUCCEEDED" => Some(PaymentStatus::Succeeded),
            "CANCELLED" => Some(PaymentStatus::Cancelled),
            "FAILED" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    /// Maps the provider's wire spelling. Note `canceled` (one l) on the wire.
    pub fn from_provider(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "waiting_for_capture" => Some(PaymentStatus::WaitingForCapture),
            "succeeded" => Some(PaymentStatus::Succeeded),
            "canceled" => Some(PaymentStatus::Cancelled),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Succeeded | PaymentStatus::Cancelled | PaymentStatus::Failed
        )
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::WaitingForCapture)
    }

    /// Forward-only transition table. Terminal states accept nothing;
    /// same-status replays are filtered by the applier before this check.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        match self {
            PaymentStatus::Pending => matches!(
                next,
                PaymentStatus::WaitingForCapture
                    | PaymentStatus::Succeeded
                    | PaymentStatus::Cancelled
                    | PaymentStatus::Failed
            ),
            PaymentStatus::WaitingForCapture => matches!(
                next,
                PaymentStatus::Succeeded | PaymentStatus::Cancelled | PaymentStatus::Failed
            ),
            PaymentStatus::Succeeded | PaymentStatus::Cancelled | PaymentStatus::Failed => false,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Sbp,
    BankCard,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Sbp => "SBP",
            PaymentMethod::BankCard => "BANK_CARD",
            PaymentMethod::Cash => "CASH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SBP" => Some(PaymentMethod::Sbp),
            "BANK_CARD" => Some(PaymentMethod::BankCard),
            "CASH" => Some(PaymentMethod::Cash),
            _ => None,
        }
    }

    pub fn provider_code(&self) -> &'static str {
        match self {
            PaymentMethod::Sbp => "sbp",
            PaymentMethod::BankCard => "bank_card",
            PaymentMethod::Cash => "cash",
        }
    }

    /// Cash settles offline; only online methods go through the gateway.
    pub fn is_online(&self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Sbp => "SBP",
            PaymentMethod::BankCard => "bank card",
            PaymentMethod::Cash => "cash",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub provider_payment_id: Option<String>,
    pub order_id: i64,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub amount_minor: i64,
    pub currency: String,
    pub bank_id: Option<String>,
    pub confirmation_url: Option<String>,
    pub idempotence_key: String,
    pub error_message: Option<String>,
    pub notified: bool,
    pub stale_alerted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            error: ErrorPayload {
                code: code.to_string(),
                message: message.to_string(),
                details: None,
            },
        }
    }
}

/// Formats minor units as the provider's decimal string, e.g. 50000 -> "500.00".
pub fn format_amount(minor: i64) -> String {
    format!("{}.{:02}", minor / 100, minor % 100)
}

/// Parses the provider's decimal amount string back into minor units.
/// Accepts up to two fraction digits; anything else is rejected.
pub fn parse_amount(value: &str) -> Option<i64> {
    let (major, frac) = match value.split_once('.') {
        Some((m, f)) => (m, f),
        None => (value, ""),
    };
    if major.is_empty() || major.starts_with('-') {
        return None;
    }
    let major: i64 = major.parse().ok()?;
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        2 => frac.parse().ok()?,
        _ => return None,
    };
    Some(major * 100 + frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_moves_forward_only() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::WaitingForCapture));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Succeeded));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Cancelled));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::WaitingForCapture.can_transition_to(PaymentStatus::Pending));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for terminal in [
            PaymentStatus::Succeeded,
            PaymentStatus::Cancelled,
            PaymentStatus::Failed,
        ] {
            for next in [
                PaymentStatus::Pending,
                PaymentStatus::WaitingForCapture,
                PaymentStatus::Succeeded,
                PaymentStatus::Cancelled,
                PaymentStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn provider_status_spelling() {
        assert_eq!(
            PaymentStatus::from_provider("canceled"),
            Some(PaymentStatus::Cancelled)
        );
        assert_eq!(
            PaymentStatus::from_provider("waiting_for_capture"),
            Some(PaymentStatus::WaitingForCapture)
        );
        assert_eq!(PaymentStatus::from_provider("refunded"), None);
    }

    #[test]
    fn amount_round_trip() {
        assert_eq!(format_amount(50000), "500.00");
        assert_eq!(format_amount(50), "0.50");
        assert_eq!(parse_amount("500.00"), Some(50000));
        assert_eq!(parse_amount("500"), Some(50000));
        assert_eq!(parse_amount("500.5"), Some(50050));
        assert_eq!(parse_amount("500.005"), None);
        assert_eq!(parse_amount("-1.00"), None);
        assert_eq!(parse_amount("abc"), None);
    }
}
