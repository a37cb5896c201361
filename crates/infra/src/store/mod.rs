//! Customer aggregate store boundary.
//!
//! This module defines the infrastructure-facing contracts for loading and
//! writing customer aggregates inside transactions, plus the in-memory and
//! Postgres implementations.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::{InMemoryCustomerStore, InMemoryCustomerTx};
pub use postgres::{PostgresCustomerStore, PostgresCustomerTx};
pub use query::{Page, PageRequest, Sort, SortDirection, SortField};
pub use r#trait::{CustomerStore, CustomerTx, DuplicateCheck, StoreError, StoreResult};
