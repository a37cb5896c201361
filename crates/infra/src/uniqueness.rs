//! Cross-entity uniqueness of emails and phone numbers.
//!
//! Checks run against the store through [`DuplicateCheck`] and against every
//! value already claimed through the same validator, so duplicates between
//! siblings of one bulk call (or within a single input) are caught before
//! anything is written. All emails of an input are checked before any phone
//! number; the first violation wins.

use std::collections::HashSet;

use customerhub_core::{CommunicationId, CustomerId, DomainError};
use customerhub_customers::{CommunicationInput, Customer};

use crate::error::ServiceResult;
use crate::store::DuplicateCheck;

/// Which persisted rows count as collisions.
enum Scope<'a> {
    /// Every persisted row.
    Create,
    /// Rows not owned by the customer being updated.
    Update {
        customer_id: CustomerId,
        communication_ids: &'a [CommunicationId],
    },
}

/// Uniqueness validator for one service call.
///
/// Create one per call and run every input of a bulk request through it.
#[derive(Debug, Default)]
pub struct UniquenessValidator {
    claimed_emails: HashSet<String>,
    claimed_phones: HashSet<String>,
}

impl UniquenessValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the communications of a customer about to be created.
    pub async fn check_create<D>(
        &mut self,
        store: &mut D,
        communications: &[CommunicationInput],
    ) -> ServiceResult<()>
    where
        D: DuplicateCheck + ?Sized,
    {
        self.check(store, communications, Scope::Create).await
    }

    /// Validate the communications proposed for an existing customer.
    ///
    /// The customer's own current emails and phone numbers may be re-submitted.
    pub async fn check_update<D>(
        &mut self,
        store: &mut D,
        existing: &Customer,
        communications: &[CommunicationInput],
    ) -> ServiceResult<()>
    where
        D: DuplicateCheck + ?Sized,
    {
        let communication_ids = existing.communication_ids();
        let scope = Scope::Update {
            customer_id: existing.id_typed(),
            communication_ids: &communication_ids,
        };
        self.check(store, communications, scope).await
    }

    async fn check<D>(
        &mut self,
        store: &mut D,
        communications: &[CommunicationInput],
        scope: Scope<'_>,
    ) -> ServiceResult<()>
    where
        D: DuplicateCheck + ?Sized,
    {
        for communication in communications {
            let email = &communication.email;
            let taken = match &scope {
                Scope::Create => store.exists_by_email(email).await?,
                Scope::Update { customer_id, .. } => {
                    store
                        .exists_by_email_excluding_customer(email, *customer_id)
                        .await?
                }
            };
            if taken || !self.claimed_emails.insert(email.clone()) {
                return Err(DomainError::DuplicateEmail(email.clone()).into());
            }
        }

        for phone in communications.iter().flat_map(|c| c.phones.iter()) {
            let number = &phone.phone_number;
            let taken = match &scope {
                Scope::Create => store.exists_by_phone_number(number).await?,
                Scope::Update {
                    communication_ids, ..
                } => {
                    store
                        .exists_by_phone_number_excluding_communications(number, communication_ids)
                        .await?
                }
            };
            if taken || !self.claimed_phones.insert(number.clone()) {
                return Err(DomainError::DuplicatePhone(number.clone()).into());
            }
        }

        Ok(())
    }
}
