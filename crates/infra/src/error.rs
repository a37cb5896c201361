//! Service-level error: the domain taxonomy plus genuine backend failures.

use thiserror::Error;

use customerhub_core::{DomainError, ErrorKind, VersionToken};

use crate::store::StoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error returned by every customer service operation.
///
/// Constraint and concurrency conditions raised by a store are folded into
/// [`DomainError`] on conversion, so callers only see `Store` for failures no
/// change of input can fix (connectivity, decoding).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict {
                expected, actual, ..
            } => {
                let supplied = VersionToken::for_version(expected).to_string();
                DomainError::version_conflict(Some(&supplied), actual).into()
            }
            StoreError::DuplicateEmail(email) => DomainError::DuplicateEmail(email).into(),
            StoreError::DuplicatePhone(phone) => DomainError::DuplicatePhone(phone).into(),
            StoreError::NotFound(id) => DomainError::not_found(id).into(),
            StoreError::Constraint(msg) => DomainError::validation(msg).into(),
            StoreError::Aborted(msg) => DomainError::ConcurrentUpdate(msg).into(),
            other @ StoreError::Backend(_) => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(err) => Some(err),
            ServiceError::Store(_) => None,
        }
    }

    /// Client-visible class; `None` for backend failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.domain().map(DomainError::kind)
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Domain(err) => err.code(),
            ServiceError::Store(_) => "CUSTOMERS_ERR_1500_STORE_FAILURE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use customerhub_core::CustomerId;

    #[test]
    fn lost_cas_race_becomes_version_conflict() {
        let err: ServiceError = StoreError::Conflict {
            id: CustomerId::new(),
            expected: 2,
            actual: 3,
        }
        .into();

        assert_eq!(err.kind(), Some(ErrorKind::PreconditionFailed));
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::VersionConflict { current: 3, .. })
        ));
    }

    #[test]
    fn racing_unique_violations_keep_duplicate_codes() {
        let err: ServiceError = StoreError::DuplicateEmail("a@x.com".to_string()).into();
        assert_eq!(err.code(), "CUSTOMERS_ERR_1402_CUSTOMER_EMAIL_ALREADY_EXISTS");

        let err: ServiceError = StoreError::DuplicatePhone("1".to_string()).into();
        assert_eq!(err.code(), "CUSTOMERS_ERR_1403_CUSTOMER_PHONE_ALREADY_EXISTS");
    }

    #[test]
    fn only_backend_failures_stay_store_errors() {
        let err: ServiceError = StoreError::Backend("pool closed".to_string()).into();
        assert!(err.domain().is_none());
        assert_eq!(err.kind(), None);

        let err: ServiceError = StoreError::NotFound(CustomerId::new()).into();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn deadlock_victim_is_reported_as_version_conflict() {
        let err: ServiceError = StoreError::Aborted("deadlock detected (40P01)".to_string()).into();
        assert_eq!(err.kind(), Some(ErrorKind::PreconditionFailed));
        assert_eq!(err.code(), "CUSTOMERS_ERR_1412_VERSION_CONFLICT");
        assert!(matches!(err, ServiceError::Domain(DomainError::ConcurrentUpdate(_))));
    }
}
