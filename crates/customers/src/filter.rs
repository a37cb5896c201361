//! Filter compiler: optional query criteria → one composable predicate.
//!
//! The compiled [`Predicate`] is evaluated directly against in-memory
//! aggregates and rendered to SQL by relational stores. Criteria on nested
//! collections (city, email) use existence semantics, so a customer with
//! several matching rows still matches exactly once.

use serde::{Deserialize, Serialize};

use customerhub_core::CustomerId;

use crate::customer::Customer;

/// Optional list criteria. Blank values are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerFilter {
    /// Case-insensitive substring of the name.
    pub name: Option<String>,
    /// Case-insensitive substring of the first name.
    pub first_name: Option<String>,
    /// Exact city of any owned address.
    pub city: Option<String>,
    /// Exact email of any owned communication.
    pub email: Option<String>,
    /// Id set membership (empty = no restriction).
    #[serde(default)]
    pub customer_ids: Vec<CustomerId>,
    /// Id equals the text exactly, or name contains it case-insensitively.
    pub search: Option<String>,
}

impl CustomerFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_customer_ids(mut self, ids: impl IntoIterator<Item = CustomerId>) -> Self {
        self.customer_ids = ids.into_iter().collect();
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Compile the criteria into the AND of every supplied criterion.
    pub fn compile(&self) -> Predicate {
        let mut criteria = Vec::new();

        if let Some(name) = text(&self.name) {
            criteria.push(Predicate::NameContains(name.to_lowercase()));
        }
        if let Some(first_name) = text(&self.first_name) {
            criteria.push(Predicate::FirstNameContains(first_name.to_lowercase()));
        }
        if let Some(city) = text(&self.city) {
            criteria.push(Predicate::AddressCityEquals(city.to_string()));
        }
        if let Some(email) = text(&self.email) {
            criteria.push(Predicate::CommunicationEmailEquals(email.to_string()));
        }
        if !self.customer_ids.is_empty() {
            criteria.push(Predicate::IdIn(self.customer_ids.clone()));
        }
        if let Some(search) = text(&self.search) {
            criteria.push(Predicate::Or(vec![
                Predicate::IdTextEquals(search.to_string()),
                Predicate::NameContains(search.to_lowercase()),
            ]));
        }

        Predicate::all_of(criteria)
    }
}

fn text(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Boolean expression over a customer aggregate.
///
/// Substring needles are stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every customer.
    All,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    NameContains(String),
    FirstNameContains(String),
    /// At least one owned address has this city.
    AddressCityEquals(String),
    /// At least one owned communication has this email.
    CommunicationEmailEquals(String),
    IdIn(Vec<CustomerId>),
    /// The id, rendered as hyphenated text, equals this string.
    IdTextEquals(String),
}

impl Predicate {
    /// Conjunction that collapses the trivial cases.
    pub fn all_of(mut criteria: Vec<Predicate>) -> Predicate {
        criteria.retain(|p| *p != Predicate::All);
        match criteria.len() {
            0 => Predicate::All,
            1 => criteria.remove(0),
            _ => Predicate::And(criteria),
        }
    }

    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::all_of(vec![self, other])
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Predicate::All)
    }

    pub fn matches(&self, customer: &Customer) -> bool {
        match self {
            Predicate::All => true,
            Predicate::And(parts) => parts.iter().all(|p| p.matches(customer)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(customer)),
            Predicate::NameContains(needle) => customer.name().to_lowercase().contains(needle.as_str()),
            Predicate::FirstNameContains(needle) => {
                customer.first_name().to_lowercase().contains(needle.as_str())
            }
            Predicate::AddressCityEquals(city) => customer.addresses().iter().any(|a| a.city == *city),
            Predicate::CommunicationEmailEquals(email) => {
                customer.communications().iter().any(|c| c.email == *email)
            }
            Predicate::IdIn(ids) => ids.contains(&customer.id_typed()),
            Predicate::IdTextEquals(text) => customer.id_typed().to_string() == *text,
        }
    }
}
