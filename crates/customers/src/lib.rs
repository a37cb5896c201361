//! Customers domain module.
//!
//! This crate contains the customer aggregate (addresses, communication
//! channels and their phone numbers) and the filter compiler used by list
//! queries, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage).

pub mod customer;
pub mod filter;

pub use customer::{
    Address, AddressInput, AddressType, Communication, CommunicationInput, CreateCustomer,
    Customer, CustomerSnapshot, PersonData, Phone, PhoneInput, PhoneType, UpdateCustomer,
    UpdateCustomerItem,
};
pub use filter::{CustomerFilter, Predicate};
