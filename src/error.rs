use thiserror::Error;
use uuid::Uuid;

/// Failure classes for the registration workflow.
///
/// Low-confidence solver results are not represented here: they are valid
/// [`AlignmentResult`](crate::solver::AlignmentResult)s carrying their own
/// gate verdict and are always surfaced to the caller with guidance.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Recoverable input problem; blocks only the triggering action.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Solver unreachable, timed out, or answered outside the contract.
    /// Prior result and gate state are preserved.
    #[error("solver request failed: {0}")]
    Network(String),

    /// The solver answered, but the payload violates the protocol
    /// (missing fields, non-orthonormal rotation, reflection).
    #[error("malformed solver response: {0}")]
    MalformedResponse(String),

    /// A response arrived for a model pair that is no longer selected.
    /// Discarded and logged, never applied.
    #[error("stale response for pair {request_pair}, current pair is {current_pair}")]
    StaleResponse {
        request_pair: Uuid,
        current_pair: Uuid,
    },

    /// An operation needs loaded geometry that is not present. Surfaced
    /// as a disabled control, not a fault.
    #[error("no loaded geometry for {0}")]
    GeometryMissing(String),

    /// A solver call is already pending for this session.
    #[error("a {0} request is already in flight")]
    RequestInFlight(&'static str),
}

impl RegistrationError {
    /// Whether the failure leaves the session in a state the operator can
    /// recover from without restarting (all current classes do).
    pub fn is_recoverable(&self) -> bool {
        true
    }

    /// Short class name for logging and telemetry.
    pub fn class(&self) -> &'static str {
        match self {
            RegistrationError::Validation(_) => "validation",
            RegistrationError::Network(_) => "network",
            RegistrationError::MalformedResponse(_) => "malformed_response",
            RegistrationError::StaleResponse { .. } => "stale_response",
            RegistrationError::GeometryMissing(_) => "geometry_missing",
            RegistrationError::RequestInFlight(_) => "request_in_flight",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let err = RegistrationError::Validation("need 3 pairs".into());
        assert_eq!(err.class(), "validation");
        assert!(err.is_recoverable());

        let err = RegistrationError::RequestInFlight("refine");
        assert_eq!(err.class(), "request_in_flight");
        assert!(err.to_string().contains("refine"));
    }

    #[test]
    fn test_stale_response_message_names_both_pairs() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let err = RegistrationError::StaleResponse {
            request_pair: a,
            current_pair: b,
        };
        let msg = err.to_string();
        assert!(msg.contains(&a.to_string()));
        assert!(msg.contains(&b.to_string()));
    }
}
