/// Error taxonomy for the shipping engine.
///
/// Errors scoped to a single provider (`ProviderAuth`, `ProviderTimeout`,
/// `ProviderRequest`) are recovered locally by the aggregator and orchestrator.
/// Only exhaustion (`NoServiceableRate`, `AllProvidersFailed`) and
/// security-relevant rejections propagate to callers.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::provider::ProviderId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ShippingError>;

/// One provider's failure, recorded instead of aborting the whole operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    /// Provider that failed.
    pub provider_id: ProviderId,
    /// Operator-facing reason.
    pub reason: String,
}

impl ProviderFailure {
    pub fn new(provider_id: ProviderId, reason: impl Into<String>) -> Self {
        ProviderFailure {
            provider_id,
            reason: reason.into(),
        }
    }

    /// Builds a failure record from an error raised by `provider_id`.
    pub fn from_error(provider_id: &ProviderId, error: &ShippingError) -> Self {
        ProviderFailure::new(provider_id.clone(), error.to_string())
    }
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider_id, self.reason)
    }
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers configured".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Unified error for every engine operation.
///
/// `Clone` is required because a single-flight cache refresh hands the same
/// outcome to every waiting caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShippingError {
    /// Bad or rejected credentials while initializing an adapter.
    #[error("AUTH/{provider_id}: {reason}")]
    ProviderAuth {
        provider_id: ProviderId,
        reason: String,
    },

    /// A provider call exceeded its time budget.
    #[error("TIMEOUT/{provider_id}: {operation} exceeded {timeout_ms}ms")]
    ProviderTimeout {
        provider_id: ProviderId,
        operation: String,
        timeout_ms: u64,
    },

    /// A provider call failed (transport error, non-2xx, malformed response).
    #[error("REQUEST/{provider_id}: {reason}")]
    ProviderRequest {
        provider_id: ProviderId,
        reason: String,
    },

    /// Every provider failed or returned nothing for the route.
    #[error("NOT_SERVICEABLE/{}", join_failures(.failures))]
    NoServiceableRate { failures: Vec<ProviderFailure> },

    /// Shipment creation fallback exhausted every candidate.
    #[error("ALL_PROVIDERS_FAILED/{}", join_failures(.failures))]
    AllProvidersFailed { failures: Vec<ProviderFailure> },

    /// No adapter is registered under this id.
    #[error("UNKNOWN_PROVIDER/{0}")]
    UnknownProvider(ProviderId),

    /// The adapter is registered but an admin disabled it.
    #[error("PROVIDER_DISABLED/{0}")]
    ProviderDisabled(ProviderId),

    /// Rates were quoted but none satisfies the caller's criteria; nothing
    /// was booked.
    #[error("NO_MATCHING_RATE/{0}")]
    NoRateMatchesCriteria(String),

    /// Webhook signature did not verify; payload discarded.
    #[error("SIGNATURE/{provider_id}: {reason}")]
    SignatureInvalid {
        provider_id: ProviderId,
        reason: String,
    },

    /// Webhook or provider payload is structurally invalid.
    #[error("PAYLOAD/{provider_id}: {reason}")]
    InvalidPayload {
        provider_id: ProviderId,
        reason: String,
    },

    /// Caller-supplied request failed validation.
    #[error("REQUEST_INVALID/{0}")]
    InvalidRequest(String),

    /// Selection criteria are malformed.
    #[error("CRITERIA/{0}")]
    InvalidCriteria(String),

    /// Cache store or event sink failure.
    #[error("STORAGE/{0}")]
    Storage(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("CONFIG/{0}")]
    Config(String),
}

impl ShippingError {
    pub fn request(provider_id: &ProviderId, reason: impl Into<String>) -> Self {
        ShippingError::ProviderRequest {
            provider_id: provider_id.clone(),
            reason: reason.into(),
        }
    }

    pub fn auth(provider_id: &ProviderId, reason: impl Into<String>) -> Self {
        ShippingError::ProviderAuth {
            provider_id: provider_id.clone(),
            reason: reason.into(),
        }
    }

    pub fn payload(provider_id: &ProviderId, reason: impl Into<String>) -> Self {
        ShippingError::InvalidPayload {
            provider_id: provider_id.clone(),
            reason: reason.into(),
        }
    }

    pub fn timeout(provider_id: &ProviderId, operation: &str, timeout_ms: u64) -> Self {
        ShippingError::ProviderTimeout {
            provider_id: provider_id.clone(),
            operation: operation.to_string(),
            timeout_ms,
        }
    }

    /// True for errors that only concern one provider and can be recovered
    /// by trying another.
    pub fn is_provider_scoped(&self) -> bool {
        matches!(
            self,
            ShippingError::ProviderAuth { .. }
                | ShippingError::ProviderTimeout { .. }
                | ShippingError::ProviderRequest { .. }
                | ShippingError::InvalidPayload { .. }
        )
    }

    /// True for rejections that must be logged as security events.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            ShippingError::SignatureInvalid { .. } | ShippingError::UnknownProvider(_)
        )
    }

    /// HTTP status the route layer answers with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ShippingError::InvalidRequest(_) | ShippingError::InvalidCriteria(_) => StatusCode::BAD_REQUEST,
            ShippingError::InvalidPayload { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ShippingError::SignatureInvalid { .. } => StatusCode::UNAUTHORIZED,
            ShippingError::UnknownProvider(_) => StatusCode::NOT_FOUND,
            ShippingError::ProviderDisabled(_) => StatusCode::CONFLICT,
            ShippingError::NoServiceableRate { .. } | ShippingError::NoRateMatchesCriteria(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ShippingError::AllProvidersFailed { .. } => StatusCode::BAD_GATEWAY,
            ShippingError::ProviderTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ShippingError::ProviderAuth { .. } | ShippingError::ProviderRequest { .. } => StatusCode::BAD_GATEWAY,
            ShippingError::Storage(_) | ShippingError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_list_is_rendered_for_operators() {
        let err = ShippingError::AllProvidersFailed {
            failures: vec![
                ProviderFailure::new(ProviderId::from("a"), "boom"),
                ProviderFailure::new(ProviderId::from("b"), "timeout"),
            ],
        };
        assert_eq!(err.to_string(), "ALL_PROVIDERS_FAILED/a: boom; b: timeout");
    }

    #[test]
    fn test_empty_failure_list_mentions_missing_providers() {
        let err = ShippingError::NoServiceableRate { failures: vec![] };
        assert!(err.to_string().contains("no providers configured"));
    }

    #[test]
    fn test_classification() {
        let id = ProviderId::from("p");
        assert!(ShippingError::timeout(&id, "get_rates", 5000).is_provider_scoped());
        assert!(!ShippingError::UnknownProvider(id.clone()).is_provider_scoped());
        assert!(ShippingError::UnknownProvider(id).is_security_relevant());
    }

    #[test]
    fn test_status_codes() {
        let id = ProviderId::from("p");
        assert_eq!(ShippingError::InvalidCriteria("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ShippingError::timeout(&id, "create_shipment", 1).status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ShippingError::AllProvidersFailed { failures: vec![] }.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(ShippingError::ProviderDisabled(id).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ShippingError::NoRateMatchesCriteria("max_cost 1.00".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
