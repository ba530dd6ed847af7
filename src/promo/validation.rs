//! Outcomes of checking a promo code.

use serde::Serialize;
use thiserror::Error;

/// Why a promo code cannot be used.
///
/// These are ordinary business outcomes, not failures of the service. The
/// display text is shown to the customer as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PromoRejection {
    #[error("Code not found")]
    NotFound,
    #[error("Code is no longer active")]
    Inactive,
    #[error("Code not yet active")]
    NotYetActive,
    #[error("Code has expired")]
    Expired,
    #[error("Code has reached its usage limit")]
    UsageLimitReached,
    #[error("Code not applicable to this content")]
    NotApplicable,
}

/// Result of validating a code, shaped for the storefront UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromoValidation {
    pub valid: bool,
    pub discount: u8,
    pub message: String,
}

impl PromoValidation {
    /// A usable code granting `discount` percent.
    pub fn accepted(discount: u8) -> Self {
        Self {
            valid: true,
            discount,
            message: format!("{}% discount applied", discount),
        }
    }

    /// A code that cannot be used, with the reason.
    pub fn rejected(reason: PromoRejection) -> Self {
        Self {
            valid: false,
            discount: 0,
            message: reason.to_string(),
        }
    }
}

impl From<Result<u8, PromoRejection>> for PromoValidation {
    fn from(result: Result<u8, PromoRejection>) -> Self {
        match result {
            Ok(discount) => PromoValidation::accepted(discount),
            Err(reason) => PromoValidation::rejected(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages_are_specific() {
        let messages: Vec<String> = [
            PromoRejection::NotFound,
            PromoRejection::Inactive,
            PromoRejection::NotYetActive,
            PromoRejection::Expired,
            PromoRejection::UsageLimitReached,
            PromoRejection::NotApplicable,
        ]
        .iter()
        .map(|r| PromoValidation::rejected(*r).message)
        .collect();

        let mut unique = messages.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), messages.len());
    }

    #[test]
    fn test_json_body() {
        let body = serde_json::to_value(PromoValidation::accepted(20)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"valid": true, "discount": 20, "message": "20% discount applied"})
        );
    }
}
