//! Infrastructure layer: customer stores, uniqueness checks, the customer
//! service and its configuration.

pub mod config;
pub mod customer_service;
pub mod error;
pub mod store;
pub mod uniqueness;

#[cfg(test)]
mod integration_tests;

pub use config::{open_store, ConfiguredStore, PagingPolicy, StoreConfig};
pub use customer_service::CustomerService;
pub use error::{ServiceError, ServiceResult};
pub use uniqueness::UniquenessValidator;
