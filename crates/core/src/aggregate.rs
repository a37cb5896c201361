//! Aggregate root trait and the optimistic concurrency expectation.

/// Aggregate root marker + minimal interface.
///
/// This is intentionally small: the aggregate owns its nested entities and
/// exposes the version counter the concurrency guard compares against.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// Starts at [`crate::INITIAL_VERSION`] and grows by exactly one per
    /// successful write.
    fn version(&self) -> u64;
}

/// Version a write expects the stored aggregate to be at.
///
/// Stores apply a write only if the stored version still equals the
/// expectation (compare-and-set) and advance it by one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExpectedVersion(u64);

impl ExpectedVersion {
    pub fn exact(version: u64) -> Self {
        Self(version)
    }

    /// Expect the version the aggregate was loaded at.
    pub fn of<A: AggregateRoot + ?Sized>(aggregate: &A) -> Self {
        Self(aggregate.version())
    }

    pub fn version(self) -> u64 {
        self.0
    }

    pub fn matches(self, actual: u64) -> bool {
        self.0 == actual
    }
}

impl core::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
