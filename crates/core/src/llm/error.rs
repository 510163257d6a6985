use crate::llm::Provider;
use reqwest::StatusCode;
use serde_json::Value;
use std::fmt;

/// How a failed generation should be reported to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    RateLimited,
    PaymentRequired,
    Failed,
}

impl GatewayStatus {
    pub fn from_http(status: StatusCode) -> Self {
        match status {
            StatusCode::TOO_MANY_REQUESTS => GatewayStatus::RateLimited,
            StatusCode::PAYMENT_REQUIRED => GatewayStatus::PaymentRequired,
            _ => GatewayStatus::Failed,
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            GatewayStatus::RateLimited => "Rate limit exceeded. Please try again later.",
            GatewayStatus::PaymentRequired => {
                "AI credits exhausted. Please add credits to your workspace."
            }
            GatewayStatus::Failed => "The AI service failed to respond. Please try again.",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub status: GatewayStatus,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl LlmDiagnosticsError {
    pub fn parse(provider: Provider, stage: &'static str, detail: String, raw: String) -> Self {
        Self {
            provider,
            stage,
            status: GatewayStatus::Failed,
            detail,
            raw_output: Some(raw),
            raw_response_json: None,
        }
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (provider={}, stage={}, status={:?}): {}",
            self.provider.as_str(),
            self.stage,
            self.status,
            self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}

/// Status of the first `LlmDiagnosticsError` in the chain, if any.
pub fn gateway_status(err: &anyhow::Error) -> Option<GatewayStatus> {
    err.chain()
        .find_map(|e| e.downcast_ref::<LlmDiagnosticsError>())
        .map(|e| e.status)
}
