//! Customer aggregate service (application-level orchestration).
//!
//! Every mutating operation follows the same pipeline inside exactly one
//! store transaction:
//!
//! ```text
//! begin
//!   ↓
//! 1. Load the target aggregate(s) (locked for the rest of the transaction)
//!   ↓
//! 2. Version guard (single-item update only)
//!   ↓
//! 3. Uniqueness validation of proposed emails / phone numbers
//!   ↓
//! 4. Materialise or replace-merge the aggregate (pure domain logic)
//!   ↓
//! 5. Write (version compare-and-set on update)
//!   ↓
//! commit
//! ```
//!
//! Any failure drops the transaction, so a rejected call leaves no partial
//! effect, including bulk calls.

use std::collections::HashSet;

use tracing::{debug, error, info, instrument, warn};

use customerhub_core::{
    AggregateRoot, Auditor, CustomerId, DomainError, ExpectedVersion, Versioned, check_version,
};
use customerhub_customers::{
    CreateCustomer, Customer, CustomerFilter, Predicate, UpdateCustomer, UpdateCustomerItem,
};

use crate::error::{ServiceError, ServiceResult};
use crate::store::{CustomerStore, CustomerTx, Page, PageRequest};
use crate::uniqueness::UniquenessValidator;

/// Consistency and query layer over the customer aggregate.
///
/// ## Generic Parameters
///
/// - `S`: customer store (in-memory for tests/dev, Postgres in production)
/// - `A`: source of audit stamps for writes
#[derive(Debug, Clone)]
pub struct CustomerService<S, A> {
    store: S,
    auditor: A,
}

impl<S, A> CustomerService<S, A> {
    pub fn new(store: S, auditor: A) -> Self {
        Self { store, auditor }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_parts(self) -> (S, A) {
        (self.store, self.auditor)
    }
}

impl<S, A> CustomerService<S, A>
where
    S: CustomerStore,
    A: Auditor,
{
    /// Load one aggregate with its version token.
    #[instrument(skip(self), fields(customer_id = %id))]
    pub async fn get_by_id(&self, id: CustomerId) -> ServiceResult<Versioned<Customer>> {
        let result = async {
            let customer = self
                .store
                .find_by_id(id)
                .await?
                .ok_or(DomainError::not_found(id))?;
            Ok::<_, ServiceError>(versioned(customer))
        }
        .await;
        result.inspect_err(|err| log_failure("get_by_id", err))
    }

    /// One page of customers matching the filter.
    #[instrument(skip(self, filter), fields(page_number = page.page_number()))]
    pub async fn get_filtered(
        &self,
        filter: &CustomerFilter,
        page: &PageRequest,
    ) -> ServiceResult<Page<Customer>> {
        let predicate = filter.compile();
        debug!(?predicate, "compiled customer filter");
        self.find_page(&predicate, page)
            .await
            .inspect_err(|err| log_failure("get_filtered", err))
    }

    /// One page of all customers.
    #[instrument(skip(self), fields(page_number = page.page_number()))]
    pub async fn get_all(&self, page: &PageRequest) -> ServiceResult<Page<Customer>> {
        self.find_page(&Predicate::All, page)
            .await
            .inspect_err(|err| log_failure("get_all", err))
    }

    /// The customer with this id whose name and first name match exactly.
    #[instrument(skip(self), fields(customer_id = %id))]
    pub async fn get_single(
        &self,
        id: CustomerId,
        name: &str,
        first_name: &str,
    ) -> ServiceResult<Versioned<Customer>> {
        let result = async {
            let customer = self
                .store
                .find_one_by_id_and_names(id, name, first_name)
                .await?
                .ok_or(DomainError::not_found(id))?;
            Ok::<_, ServiceError>(versioned(customer))
        }
        .await;
        result.inspect_err(|err| log_failure("get_single", err))
    }

    #[instrument(skip(self, input))]
    pub async fn create(&self, input: CreateCustomer) -> ServiceResult<Versioned<Customer>> {
        let result = async {
            let customer = Customer::create(CustomerId::new(), &input, self.auditor.stamp())?;

            let mut tx = self.store.begin().await?;
            UniquenessValidator::new()
                .check_create(&mut tx, &input.communications)
                .await?;
            tx.insert(&customer).await?;
            tx.commit().await?;

            info!(customer_id = %customer.id_typed(), version = customer.version(), "customer created");
            Ok::<_, ServiceError>(versioned(customer))
        }
        .await;
        result.inspect_err(|err| log_failure("create", err))
    }

    /// Replace-merge an update into the stored aggregate.
    ///
    /// `version_token` must name the current version; an absent or malformed
    /// token is a conflict.
    #[instrument(skip(self, input), fields(customer_id = %id))]
    pub async fn update(
        &self,
        id: CustomerId,
        input: UpdateCustomer,
        version_token: Option<&str>,
    ) -> ServiceResult<Versioned<Customer>> {
        let result = async {
            let mut tx = self.store.begin().await?;
            let current = tx.find_by_id(id).await?.ok_or(DomainError::not_found(id))?;

            check_version(current.version(), version_token)?;
            UniquenessValidator::new()
                .check_update(&mut tx, &current, input.proposed_communications())
                .await?;
            let merged = current.merged(&input, self.auditor.stamp())?;

            let stored = tx.update(&merged, ExpectedVersion::of(&current)).await?;
            tx.commit().await?;

            info!(version = stored.version(), "customer updated");
            Ok::<_, ServiceError>(versioned(stored))
        }
        .await;
        result.inspect_err(|err| log_failure("update", err))
    }

    #[instrument(skip(self), fields(customer_id = %id))]
    pub async fn delete(&self, id: CustomerId) -> ServiceResult<()> {
        let result = async {
            let mut tx = self.store.begin().await?;
            tx.delete(id).await?;
            tx.commit().await?;

            info!("customer deleted");
            Ok::<_, ServiceError>(())
        }
        .await;
        result.inspect_err(|err| log_failure("delete", err))
    }

    /// Create several customers atomically, returned in input order.
    #[instrument(skip(self, inputs), fields(count = inputs.len()))]
    pub async fn create_bulk(&self, inputs: Vec<CreateCustomer>) -> ServiceResult<Vec<Customer>> {
        if inputs.is_empty() {
            return Ok(vec![]);
        }

        let result = async {
            let mut tx = self.store.begin().await?;
            let mut uniqueness = UniquenessValidator::new();

            let mut customers = Vec::with_capacity(inputs.len());
            for input in &inputs {
                let customer = Customer::create(CustomerId::new(), input, self.auditor.stamp())?;
                uniqueness.check_create(&mut tx, &input.communications).await?;
                customers.push(customer);
            }

            for customer in &customers {
                tx.insert(customer).await?;
            }
            tx.commit().await?;

            info!(count = customers.len(), "customers created");
            Ok::<_, ServiceError>(customers)
        }
        .await;
        result.inspect_err(|err| log_failure("create_bulk", err))
    }

    /// Update several customers atomically, returned in input order.
    ///
    /// Every referenced id must exist and appear once; no version tokens are
    /// involved, each write is conditioned on the version loaded here.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn update_bulk(
        &self,
        items: Vec<UpdateCustomerItem>,
    ) -> ServiceResult<Vec<Customer>> {
        if items.is_empty() {
            return Ok(vec![]);
        }

        let result = async {
            let ids: Vec<CustomerId> = items.iter().map(|item| item.customer_id).collect();
            reject_repeated_ids(&ids)?;

            let mut tx = self.store.begin().await?;
            let loaded = tx.find_all_by_id_in(&ids).await?;
            require_all_loaded(&ids, &loaded)?;

            // Every id is present once and loaded in input order.
            let mut merged = Vec::with_capacity(items.len());
            let mut uniqueness = UniquenessValidator::new();
            for (item, current) in items.iter().zip(&loaded) {
                uniqueness
                    .check_update(&mut tx, current, item.update.proposed_communications())
                    .await?;
                let next = current.merged(&item.update, self.auditor.stamp())?;
                merged.push((next, ExpectedVersion::of(current)));
            }

            let mut stored = Vec::with_capacity(merged.len());
            for (customer, expected) in &merged {
                stored.push(tx.update(customer, *expected).await?);
            }
            tx.commit().await?;

            info!(count = stored.len(), "customers updated");
            Ok::<_, ServiceError>(stored)
        }
        .await;
        result.inspect_err(|err| log_failure("update_bulk", err))
    }

    /// Delete several customers atomically.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn delete_bulk(&self, ids: &[CustomerId]) -> ServiceResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let result = async {
            reject_repeated_ids(ids)?;

            // Lock every target in one statement before the first delete.
            let mut tx = self.store.begin().await?;
            let loaded = tx.find_all_by_id_in(ids).await?;
            require_all_loaded(ids, &loaded)?;
            for id in ids {
                tx.delete(*id).await?;
            }
            tx.commit().await?;

            info!(count = ids.len(), "customers deleted");
            Ok::<_, ServiceError>(())
        }
        .await;
        result.inspect_err(|err| log_failure("delete_bulk", err))
    }

    async fn find_page(
        &self,
        predicate: &Predicate,
        page: &PageRequest,
    ) -> ServiceResult<Page<Customer>> {
        let page = self.store.find_all(predicate, page).await?;
        debug!(
            returned = page.content.len(),
            total_elements = page.total_elements,
            "customer page loaded"
        );
        Ok(page)
    }
}

fn versioned(customer: Customer) -> Versioned<Customer> {
    Versioned::new(customer.version(), customer)
}

fn reject_repeated_ids(ids: &[CustomerId]) -> ServiceResult<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    match ids.iter().find(|id| !seen.insert(**id)) {
        Some(id) => Err(DomainError::validation(format!(
            "customer {id} is referenced more than once"
        ))
        .into()),
        None => Ok(()),
    }
}

/// The first requested id with no loaded customer is an unknown reference.
fn require_all_loaded(ids: &[CustomerId], loaded: &[Customer]) -> ServiceResult<()> {
    match ids
        .iter()
        .find(|id| !loaded.iter().any(|c| c.id_typed() == **id))
    {
        Some(missing) => Err(DomainError::UnknownCustomer(*missing).into()),
        None => Ok(()),
    }
}

fn log_failure(operation: &'static str, err: &ServiceError) {
    match err {
        ServiceError::Domain(domain) => {
            warn!(operation, code = domain.code(), error = %domain, "customer request rejected");
        }
        ServiceError::Store(store) => {
            error!(operation, error = %store, "customer store failure");
        }
    }
}
