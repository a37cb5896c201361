use core::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use customerhub_core::{
    AddressId, AggregateRoot, AuditStamp, CommunicationId, CustomerId, DomainError, DomainResult,
    Entity, ExpectedVersion, INITIAL_VERSION, Owned, PhoneId,
};

/// Address type (closed set).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AddressType {
    #[default]
    Billing,
    Delivery,
}

impl AddressType {
    pub fn as_str(self) -> &'static str {
        match self {
            AddressType::Billing => "BILLING",
            AddressType::Delivery => "DELIVERY",
        }
    }
}

impl FromStr for AddressType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BILLING" => Ok(AddressType::Billing),
            "DELIVERY" => Ok(AddressType::Delivery),
            _ => Err(DomainError::validation(format!("unexpected address type '{s}'"))),
        }
    }
}

/// Phone type (closed set).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhoneType {
    #[default]
    Mobile,
    Private,
}

impl PhoneType {
    pub fn as_str(self) -> &'static str {
        match self {
            PhoneType::Mobile => "MOBILE",
            PhoneType::Private => "PRIVATE",
        }
    }
}

impl FromStr for PhoneType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MOBILE" => Ok(PhoneType::Mobile),
            "PRIVATE" => Ok(PhoneType::Private),
            _ => Err(DomainError::validation(format!("unexpected phone type '{s}'"))),
        }
    }
}

/// Postal address owned by exactly one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub customer_id: CustomerId,
    pub address_type: AddressType,
    pub street: String,
    pub number: Option<String>,
    pub postal: String,
    pub city: String,
}

impl Entity for Address {
    type Id = AddressId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Owned for Address {
    type OwnerId = CustomerId;

    fn owner_id(&self) -> &Self::OwnerId {
        &self.customer_id
    }
}

/// Phone entry owned by exactly one communication channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phone {
    pub id: PhoneId,
    pub communication_id: CommunicationId,
    pub phone_type: PhoneType,
    pub phone_number: String,
}

impl Entity for Phone {
    type Id = PhoneId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Owned for Phone {
    type OwnerId = CommunicationId;

    fn owner_id(&self) -> &Self::OwnerId {
        &self.communication_id
    }
}

/// Communication channel (email + phones) owned by exactly one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Communication {
    pub id: CommunicationId,
    pub customer_id: CustomerId,
    pub email: String,
    pub phones: Vec<Phone>,
}

impl Entity for Communication {
    type Id = CommunicationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Owned for Communication {
    type OwnerId = CustomerId;

    fn owner_id(&self) -> &Self::OwnerId {
        &self.customer_id
    }
}

/// Personal data of a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonData {
    pub name: String,
    pub first_name: String,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInput {
    #[serde(default)]
    pub address_type: AddressType,
    pub street: String,
    pub number: Option<String>,
    pub postal: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneInput {
    #[serde(default)]
    pub phone_type: PhoneType,
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationInput {
    pub email: String,
    #[serde(default)]
    pub phones: Vec<PhoneInput>,
}

/// Input: create a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCustomer {
    pub person: PersonData,
    #[serde(default)]
    pub addresses: Vec<AddressInput>,
    #[serde(default)]
    pub communications: Vec<CommunicationInput>,
}

/// Input: update a customer.
///
/// Present scalar fields overwrite, absent ones keep the stored value. A
/// present collection replaces the stored collection entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCustomer {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub addresses: Option<Vec<AddressInput>>,
    pub communications: Option<Vec<CommunicationInput>>,
}

impl UpdateCustomer {
    /// Communications this update would write (empty when the collection is kept).
    pub fn proposed_communications(&self) -> &[CommunicationInput] {
        self.communications.as_deref().unwrap_or(&[])
    }
}

/// One entry of a bulk update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCustomerItem {
    pub customer_id: CustomerId,
    #[serde(flatten)]
    pub update: UpdateCustomer,
}

/// Persisted state used by stores to rebuild an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerSnapshot {
    pub id: CustomerId,
    pub version: u64,
    pub person: PersonData,
    pub created: AuditStamp,
    pub modified: AuditStamp,
    pub addresses: Vec<Address>,
    pub communications: Vec<Communication>,
}

/// Aggregate root: Customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Customer {
    id: CustomerId,
    version: u64,
    name: String,
    first_name: String,
    date_of_birth: Option<NaiveDate>,
    created: AuditStamp,
    modified: AuditStamp,
    addresses: Vec<Address>,
    communications: Vec<Communication>,
}

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Customer {
    /// Materialise a new aggregate from create input.
    ///
    /// Every nested entity gets a fresh id and points at its parent.
    pub fn create(id: CustomerId, input: &CreateCustomer, stamp: AuditStamp) -> DomainResult<Self> {
        validate_person(&input.person)?;
        let addresses = build_addresses(id, &input.addresses)?;
        let communications = build_communications(id, &input.communications)?;

        let customer = Self {
            id,
            version: INITIAL_VERSION,
            name: input.person.name.clone(),
            first_name: input.person.first_name.clone(),
            date_of_birth: input.person.date_of_birth,
            created: stamp.clone(),
            modified: stamp,
            addresses,
            communications,
        };
        customer.check_ownership()?;
        Ok(customer)
    }

    /// Rebuild an aggregate from persisted state, rejecting orphaned rows.
    pub fn rehydrate(snapshot: CustomerSnapshot) -> DomainResult<Self> {
        let customer = Self {
            id: snapshot.id,
            version: snapshot.version,
            name: snapshot.person.name,
            first_name: snapshot.person.first_name,
            date_of_birth: snapshot.person.date_of_birth,
            created: snapshot.created,
            modified: snapshot.modified,
            addresses: snapshot.addresses,
            communications: snapshot.communications,
        };
        customer.check_ownership()?;
        Ok(customer)
    }

    /// Replace-merge an update into a copy of this aggregate.
    ///
    /// The returned aggregate keeps the current version; the store advances it
    /// when the write lands.
    pub fn merged(&self, input: &UpdateCustomer, stamp: AuditStamp) -> DomainResult<Self> {
        let mut next = self.clone();

        if let Some(name) = &input.name {
            require_text("name", name)?;
            next.name = name.clone();
        }
        if let Some(first_name) = &input.first_name {
            require_text("first_name", first_name)?;
            next.first_name = first_name.clone();
        }
        if let Some(date_of_birth) = input.date_of_birth {
            next.date_of_birth = Some(date_of_birth);
        }
        if let Some(addresses) = &input.addresses {
            next.addresses = build_addresses(self.id, addresses)?;
        }
        if let Some(communications) = &input.communications {
            next.communications = build_communications(self.id, communications)?;
        }
        next.modified = stamp;

        next.check_ownership()?;
        Ok(next)
    }

    /// The aggregate as stored by a write that expected `expected`.
    pub fn into_stored(mut self, expected: ExpectedVersion) -> Self {
        self.version = expected.version() + 1;
        self
    }

    /// Verify every nested entity references its direct owner.
    pub fn check_ownership(&self) -> DomainResult<()> {
        if let Some(address) = self.addresses.iter().find(|a| !a.is_owned_by(&self.id)) {
            return Err(DomainError::invariant(format!(
                "address {} is not owned by customer {}",
                address.id, self.id
            )));
        }
        for communication in &self.communications {
            if !communication.is_owned_by(&self.id) {
                return Err(DomainError::invariant(format!(
                    "communication {} is not owned by customer {}",
                    communication.id, self.id
                )));
            }
            if let Some(phone) = communication
                .phones
                .iter()
                .find(|p| !p.is_owned_by(&communication.id))
            {
                return Err(DomainError::invariant(format!(
                    "phone {} is not owned by communication {}",
                    phone.id, communication.id
                )));
            }
        }
        Ok(())
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn date_of_birth(&self) -> Option<NaiveDate> {
        self.date_of_birth
    }

    pub fn created(&self) -> &AuditStamp {
        &self.created
    }

    pub fn modified(&self) -> &AuditStamp {
        &self.modified
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn communications(&self) -> &[Communication] {
        &self.communications
    }

    pub fn communication_ids(&self) -> Vec<CommunicationId> {
        self.communications.iter().map(|c| c.id).collect()
    }

    pub fn phones(&self) -> impl Iterator<Item = &Phone> {
        self.communications.iter().flat_map(|c| c.phones.iter())
    }
}

fn require_text(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn validate_person(person: &PersonData) -> DomainResult<()> {
    require_text("name", &person.name)?;
    require_text("first_name", &person.first_name)
}

fn build_addresses(owner: CustomerId, inputs: &[AddressInput]) -> DomainResult<Vec<Address>> {
    inputs
        .iter()
        .map(|input| {
            require_text("street", &input.street)?;
            require_text("postal", &input.postal)?;
            require_text("city", &input.city)?;
            Ok(Address {
                id: AddressId::new(),
                customer_id: owner,
                address_type: input.address_type,
                street: input.street.clone(),
                number: input.number.clone(),
                postal: input.postal.clone(),
                city: input.city.clone(),
            })
        })
        .collect()
}

fn build_communications(
    owner: CustomerId,
    inputs: &[CommunicationInput],
) -> DomainResult<Vec<Communication>> {
    inputs
        .iter()
        .map(|input| {
            require_text("email", &input.email)?;
            let id = CommunicationId::new();
            let phones = input
                .phones
                .iter()
                .map(|phone| {
                    require_text("phone_number", &phone.phone_number)?;
                    Ok(Phone {
                        id: PhoneId::new(),
                        communication_id: id,
                        phone_type: phone.phone_type,
                        phone_number: phone.phone_number.clone(),
                    })
                })
                .collect::<DomainResult<Vec<_>>>()?;
            Ok(Communication {
                id,
                customer_id: owner,
                email: input.email.clone(),
                phones,
            })
        })
        .collect()
}
