//! `customerhub-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the error taxonomy, audit stamping and the optimistic
//! concurrency guard shared by every customer operation.

pub mod aggregate;
pub mod audit;
pub mod entity;
pub mod error;
pub mod id;
pub mod version;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use audit::{AuditStamp, Auditor, SystemAuditor};
pub use entity::{Entity, Owned};
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{AddressId, CommunicationId, CustomerId, PhoneId};
pub use version::{check_version, VersionToken, Versioned, INITIAL_VERSION};
