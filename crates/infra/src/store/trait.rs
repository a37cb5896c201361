use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use customerhub_core::{CommunicationId, CustomerId, ExpectedVersion};
use customerhub_customers::{Customer, Predicate};

use super::query::{Page, PageRequest};

pub type StoreResult<T> = Result<T, StoreError>;

/// Customer store operation error.
///
/// These are **infrastructure errors** (storage, concurrency, constraint
/// enforcement) as opposed to domain errors (validation, invariants). The
/// service layer folds every condition except `Backend` back into the domain
/// taxonomy.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Compare-and-set on the aggregate version failed.
    #[error("optimistic concurrency check failed for customer {id}: expected version {expected}, found {actual}")]
    Conflict {
        id: CustomerId,
        expected: u64,
        actual: u64,
    },

    #[error("email already stored: {0}")]
    DuplicateEmail(String),

    #[error("phone number already stored: {0}")]
    DuplicatePhone(String),

    /// Any other integrity constraint (e.g. a colliding primary key).
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// The backend rolled the transaction back to resolve a clash with a
    /// concurrent transaction (deadlock, serialization failure).
    #[error("transaction aborted: {0}")]
    Aborted(String),

    #[error("customer not found: {0}")]
    NotFound(CustomerId),

    /// Connectivity, decoding and every other backend failure.
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Duplicate-check queries used by uniqueness validation.
///
/// Implemented by every [`CustomerTx`], so the checks observe the same
/// snapshot the subsequent write lands in.
#[async_trait]
pub trait DuplicateCheck: Send {
    /// Any communication system-wide uses this email.
    async fn exists_by_email(&mut self, email: &str) -> StoreResult<bool>;

    /// Any communication not owned by `customer_id` uses this email.
    async fn exists_by_email_excluding_customer(
        &mut self,
        email: &str,
        customer_id: CustomerId,
    ) -> StoreResult<bool>;

    /// Any phone system-wide uses this number.
    async fn exists_by_phone_number(&mut self, phone_number: &str) -> StoreResult<bool>;

    /// Any phone whose owning communication is not in `communication_ids` uses this number.
    async fn exists_by_phone_number_excluding_communications(
        &mut self,
        phone_number: &str,
        communication_ids: &[CommunicationId],
    ) -> StoreResult<bool>;
}

/// A unit of work against the customer store.
///
/// Reads made through a transaction lock the rows they return until the
/// transaction ends. Dropping a transaction without calling
/// [`CustomerTx::commit`] discards every staged write.
#[async_trait]
pub trait CustomerTx: DuplicateCheck + Sized {
    /// Load one aggregate for mutation.
    async fn find_by_id(&mut self, id: CustomerId) -> StoreResult<Option<Customer>>;

    /// Load every existing aggregate among `ids`, for mutation.
    ///
    /// Rows are locked in creation order whatever the order of `ids`, so
    /// concurrent bulk calls over overlapping sets queue instead of
    /// deadlocking. Results come back in input order; missing ids are
    /// silently skipped and callers compare against their input.
    async fn find_all_by_id_in(&mut self, ids: &[CustomerId]) -> StoreResult<Vec<Customer>>;

    async fn exists_by_id(&mut self, id: CustomerId) -> StoreResult<bool>;

    /// Stage a brand-new aggregate.
    async fn insert(&mut self, customer: &Customer) -> StoreResult<()>;

    /// Stage a full replacement of an aggregate.
    ///
    /// The write is a compare-and-set against `expected`; on success the
    /// stored version is incremented and the aggregate is returned as stored.
    async fn update(
        &mut self,
        customer: &Customer,
        expected: ExpectedVersion,
    ) -> StoreResult<Customer>;

    /// Stage removal of an aggregate and everything it owns.
    async fn delete(&mut self, id: CustomerId) -> StoreResult<()>;

    /// Make every staged write visible atomically.
    async fn commit(self) -> StoreResult<()>;
}

/// Aggregate store for customers.
///
/// ## Implementation Requirements
///
/// - `find_all` evaluates the predicate with existence semantics over nested
///   collections (one result per customer), sorts by the requested field with
///   creation order as tie-break, and counts the full match set
/// - writes go through [`CustomerStore::begin`], reads outside a transaction
///   see only committed state
#[async_trait]
pub trait CustomerStore: Send + Sync {
    type Tx: CustomerTx;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn find_by_id(&self, id: CustomerId) -> StoreResult<Option<Customer>>;

    async fn find_all(
        &self,
        predicate: &Predicate,
        page: &PageRequest,
    ) -> StoreResult<Page<Customer>>;

    /// First customer in creation order matching id, name and first name exactly.
    async fn find_one_by_id_and_names(
        &self,
        id: CustomerId,
        name: &str,
        first_name: &str,
    ) -> StoreResult<Option<Customer>>;
}

#[async_trait]
impl<S> CustomerStore for Arc<S>
where
    S: CustomerStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        (**self).begin().await
    }

    async fn find_by_id(&self, id: CustomerId) -> StoreResult<Option<Customer>> {
        (**self).find_by_id(id).await
    }

    async fn find_all(
        &self,
        predicate: &Predicate,
        page: &PageRequest,
    ) -> StoreResult<Page<Customer>> {
        (**self).find_all(predicate, page).await
    }

    async fn find_one_by_id_and_names(
        &self,
        id: CustomerId,
        name: &str,
        first_name: &str,
    ) -> StoreResult<Option<Customer>> {
        (**self).find_one_by_id_and_names(id, name, first_name).await
    }
}
