//! Domain error model.

use thiserror::Error;

use crate::id::CustomerId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Client-visible failure class of a [`DomainError`].
///
/// The surrounding web layer maps these onto its own status codes; the core
/// only promises the classification.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The referenced resource does not exist.
    NotFound,
    /// The supplied version token no longer matches the stored state.
    PreconditionFailed,
    /// The request is rejected as invalid (no retry without changing input).
    Validation,
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// uniqueness, stale versions). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A customer addressed directly by id does not exist.
    #[error("Customer with the given customer id ({0}) is not found.")]
    NotFound(CustomerId),

    /// A bulk request references a customer that does not exist.
    #[error("Customer with the given customer id ({0}) is not found.")]
    UnknownCustomer(CustomerId),

    /// The email is already used by a communication of another customer.
    #[error("Customer with this email or username ({0}) already exists.")]
    DuplicateEmail(String),

    /// The phone number is already used by another communication.
    #[error("Customer with this phone number ({0}) already exists.")]
    DuplicatePhone(String),

    /// The caller's version token does not match the current version.
    #[error("version conflict (supplied: {supplied:?}, current: {current})")]
    VersionConflict {
        supplied: Option<String>,
        current: u64,
    },

    /// The store aborted the write to resolve a clash with a concurrent writer.
    #[error("customer was modified concurrently: {0}")]
    ConcurrentUpdate(String),

    /// A value failed validation (e.g. blank mandatory field).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(id: CustomerId) -> Self {
        Self::NotFound(id)
    }

    pub fn version_conflict(supplied: Option<&str>, current: u64) -> Self {
        Self::VersionConflict {
            supplied: supplied.map(str::to_owned),
            current,
        }
    }

    /// Stable, externally documented error code.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound(_) | DomainError::UnknownCustomer(_) => {
                "CUSTOMERS_ERR_1401_CUSTOMER_NOT_FOUND"
            }
            DomainError::DuplicateEmail(_) => "CUSTOMERS_ERR_1402_CUSTOMER_EMAIL_ALREADY_EXISTS",
            DomainError::DuplicatePhone(_) => "CUSTOMERS_ERR_1403_CUSTOMER_PHONE_ALREADY_EXISTS",
            DomainError::VersionConflict { .. } | DomainError::ConcurrentUpdate(_) => {
                "CUSTOMERS_ERR_1412_VERSION_CONFLICT"
            }
            DomainError::Validation(_) | DomainError::InvalidId(_) => "CUSTOMERS_ERR_1400_VALIDATION",
            DomainError::InvariantViolation(_) => "CUSTOMERS_ERR_1422_INVARIANT_VIOLATION",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::VersionConflict { .. } | DomainError::ConcurrentUpdate(_) => {
                ErrorKind::PreconditionFailed
            }
            DomainError::UnknownCustomer(_)
            | DomainError::DuplicateEmail(_)
            | DomainError::DuplicatePhone(_)
            | DomainError::Validation(_)
            | DomainError::InvariantViolation(_)
            | DomainError::InvalidId(_) => ErrorKind::Validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_bulk_reference_shares_not_found_code_but_is_validation() {
        let id = CustomerId::new();
        let direct = DomainError::not_found(id);
        let bulk = DomainError::UnknownCustomer(id);

        assert_eq!(direct.code(), bulk.code());
        assert_eq!(direct.kind(), ErrorKind::NotFound);
        assert_eq!(bulk.kind(), ErrorKind::Validation);
    }

    #[test]
    fn duplicate_messages_name_the_offending_value() {
        let err = DomainError::DuplicateEmail("a@x.com".to_string());
        assert!(err.to_string().contains("a@x.com"));

        let err = DomainError::DuplicatePhone("+49 170 1".to_string());
        assert!(err.to_string().contains("+49 170 1"));
    }

    #[test]
    fn version_conflict_is_precondition_failed() {
        let err = DomainError::version_conflict(Some("\"0\""), 1);
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(err.code(), "CUSTOMERS_ERR_1412_VERSION_CONFLICT");
    }

    #[test]
    fn concurrent_update_shares_version_conflict_code() {
        let err = DomainError::ConcurrentUpdate("deadlock detected".to_string());
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(err.code(), "CUSTOMERS_ERR_1412_VERSION_CONFLICT");
    }
}
