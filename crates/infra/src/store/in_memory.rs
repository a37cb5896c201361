use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use customerhub_core::{AggregateRoot, AuditStamp, CommunicationId, CustomerId, ExpectedVersion};
use customerhub_customers::{
    Address, Communication, Customer, CustomerSnapshot, PersonData, Phone, Predicate,
};

use super::query::{Page, PageRequest};
use super::r#trait::{CustomerStore, CustomerTx, DuplicateCheck, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct CustomerRow {
    /// Insertion order, used as the creation-order tie-break.
    seq: u64,
    version: u64,
    person: PersonData,
    created: AuditStamp,
    modified: AuditStamp,
}

#[derive(Debug, Clone)]
struct CommunicationRow {
    id: CommunicationId,
    customer_id: CustomerId,
    email: String,
}

/// Row arena mirroring the relational layout: one table per entity, owner ids
/// as foreign keys, unique email and phone number columns.
#[derive(Debug, Clone, Default)]
struct Tables {
    customers: HashMap<CustomerId, CustomerRow>,
    addresses: Vec<Address>,
    communications: Vec<CommunicationRow>,
    phones: Vec<Phone>,
    next_seq: u64,
}

impl Tables {
    fn assemble(&self, id: CustomerId) -> StoreResult<Option<Customer>> {
        let Some(row) = self.customers.get(&id) else {
            return Ok(None);
        };

        let addresses = self
            .addresses
            .iter()
            .filter(|a| a.customer_id == id)
            .cloned()
            .collect();
        let communications = self
            .communications
            .iter()
            .filter(|c| c.customer_id == id)
            .map(|c| Communication {
                id: c.id,
                customer_id: c.customer_id,
                email: c.email.clone(),
                phones: self
                    .phones
                    .iter()
                    .filter(|p| p.communication_id == c.id)
                    .cloned()
                    .collect(),
            })
            .collect();

        Customer::rehydrate(CustomerSnapshot {
            id,
            version: row.version,
            person: row.person.clone(),
            created: row.created.clone(),
            modified: row.modified.clone(),
            addresses,
            communications,
        })
        .map(Some)
        .map_err(|e| StoreError::Backend(format!("corrupt rows for customer {id}: {e}")))
    }

    /// Every customer, in creation order.
    fn all_in_creation_order(&self) -> StoreResult<Vec<Customer>> {
        let mut ids: Vec<(u64, CustomerId)> =
            self.customers.iter().map(|(id, row)| (row.seq, *id)).collect();
        ids.sort_unstable();

        let mut customers = Vec::with_capacity(ids.len());
        for (_, id) in ids {
            if let Some(customer) = self.assemble(id)? {
                customers.push(customer);
            }
        }
        Ok(customers)
    }

    fn remove_children(&mut self, id: CustomerId) {
        let owned: Vec<CommunicationId> = self
            .communications
            .iter()
            .filter(|c| c.customer_id == id)
            .map(|c| c.id)
            .collect();
        self.phones.retain(|p| !owned.contains(&p.communication_id));
        self.communications.retain(|c| c.customer_id != id);
        self.addresses.retain(|a| a.customer_id != id);
    }

    /// Write owned rows, enforcing the unique email and phone number columns.
    fn write_children(&mut self, customer: &Customer) -> StoreResult<()> {
        self.addresses.extend(customer.addresses().iter().cloned());
        for communication in customer.communications() {
            if self.communications.iter().any(|c| c.email == communication.email) {
                return Err(StoreError::DuplicateEmail(communication.email.clone()));
            }
            self.communications.push(CommunicationRow {
                id: communication.id,
                customer_id: communication.customer_id,
                email: communication.email.clone(),
            });
            for phone in &communication.phones {
                if self.phones.iter().any(|p| p.phone_number == phone.phone_number) {
                    return Err(StoreError::DuplicatePhone(phone.phone_number.clone()));
                }
                self.phones.push(phone.clone());
            }
        }
        Ok(())
    }
}

fn person_of(customer: &Customer) -> PersonData {
    PersonData {
        name: customer.name().to_string(),
        first_name: customer.first_name().to_string(),
        date_of_birth: customer.date_of_birth(),
    }
}

/// In-memory customer store.
///
/// Intended for tests/dev. Transactions are fully serialised: `begin` takes
/// the store lock and holds it until the transaction is committed or dropped.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustomerStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Transaction over [`InMemoryCustomerStore`].
///
/// Writes go to a working copy that replaces the committed tables on commit.
pub struct InMemoryCustomerTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

impl InMemoryCustomerTx {
    /// Apply a multi-row change atomically to the working copy.
    fn stage(&mut self, change: impl FnOnce(&mut Tables) -> StoreResult<()>) -> StoreResult<()> {
        let mut staged = self.working.clone();
        change(&mut staged)?;
        self.working = staged;
        Ok(())
    }
}

#[async_trait]
impl DuplicateCheck for InMemoryCustomerTx {
    async fn exists_by_email(&mut self, email: &str) -> StoreResult<bool> {
        Ok(self.working.communications.iter().any(|c| c.email == email))
    }

    async fn exists_by_email_excluding_customer(
        &mut self,
        email: &str,
        customer_id: CustomerId,
    ) -> StoreResult<bool> {
        Ok(self
            .working
            .communications
            .iter()
            .any(|c| c.email == email && c.customer_id != customer_id))
    }

    async fn exists_by_phone_number(&mut self, phone_number: &str) -> StoreResult<bool> {
        Ok(self.working.phones.iter().any(|p| p.phone_number == phone_number))
    }

    async fn exists_by_phone_number_excluding_communications(
        &mut self,
        phone_number: &str,
        communication_ids: &[CommunicationId],
    ) -> StoreResult<bool> {
        Ok(self.working.phones.iter().any(|p| {
            p.phone_number == phone_number && !communication_ids.contains(&p.communication_id)
        }))
    }
}

#[async_trait]
impl CustomerTx for InMemoryCustomerTx {
    async fn find_by_id(&mut self, id: CustomerId) -> StoreResult<Option<Customer>> {
        self.working.assemble(id)
    }

    async fn find_all_by_id_in(&mut self, ids: &[CustomerId]) -> StoreResult<Vec<Customer>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(customer) = self.working.assemble(*id)? {
                found.push(customer);
            }
        }
        Ok(found)
    }

    async fn exists_by_id(&mut self, id: CustomerId) -> StoreResult<bool> {
        Ok(self.working.customers.contains_key(&id))
    }

    async fn insert(&mut self, customer: &Customer) -> StoreResult<()> {
        let id = customer.id_typed();
        self.stage(|tables| {
            if tables.customers.contains_key(&id) {
                return Err(StoreError::Constraint(format!("customer {id} already exists")));
            }
            let seq = tables.next_seq;
            tables.next_seq += 1;
            tables.customers.insert(
                id,
                CustomerRow {
                    seq,
                    version: customer.version(),
                    person: person_of(customer),
                    created: customer.created().clone(),
                    modified: customer.modified().clone(),
                },
            );
            tables.write_children(customer)
        })
    }

    async fn update(
        &mut self,
        customer: &Customer,
        expected: ExpectedVersion,
    ) -> StoreResult<Customer> {
        let id = customer.id_typed();
        self.stage(|tables| {
            let row = tables.customers.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            if !expected.matches(row.version) {
                return Err(StoreError::Conflict {
                    id,
                    expected: expected.version(),
                    actual: row.version,
                });
            }
            row.version += 1;
            row.person = person_of(customer);
            row.modified = customer.modified().clone();

            tables.remove_children(id);
            tables.write_children(customer)
        })?;
        Ok(customer.clone().into_stored(expected))
    }

    async fn delete(&mut self, id: CustomerId) -> StoreResult<()> {
        self.stage(|tables| {
            tables.customers.remove(&id).ok_or(StoreError::NotFound(id))?;
            tables.remove_children(id);
            Ok(())
        })
    }

    async fn commit(self) -> StoreResult<()> {
        let Self { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl CustomerStore for InMemoryCustomerStore {
    type Tx = InMemoryCustomerTx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let guard = self.tables.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(InMemoryCustomerTx { guard, working })
    }

    async fn find_by_id(&self, id: CustomerId) -> StoreResult<Option<Customer>> {
        self.tables.lock().await.assemble(id)
    }

    async fn find_all(
        &self,
        predicate: &Predicate,
        page: &PageRequest,
    ) -> StoreResult<Page<Customer>> {
        let mut matches: Vec<Customer> = self
            .tables
            .lock()
            .await
            .all_in_creation_order()?
            .into_iter()
            .filter(|c| predicate.matches(c))
            .collect();

        // Stable sort keeps creation order among equal keys.
        let sort = page.sort();
        matches.sort_by(|a, b| sort.compare(a, b));

        let total = matches.len() as u64;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let content = matches
            .into_iter()
            .skip(offset)
            .take(page.page_size() as usize)
            .collect();

        Ok(Page::new(content, page, total))
    }

    async fn find_one_by_id_and_names(
        &self,
        id: CustomerId,
        name: &str,
        first_name: &str,
    ) -> StoreResult<Option<Customer>> {
        let customer = self.tables.lock().await.assemble(id)?;
        Ok(customer.filter(|c| c.name() == name && c.first_name() == first_name))
    }
}
