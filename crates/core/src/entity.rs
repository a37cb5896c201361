//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// An entity whose lifecycle is controlled by exactly one owner.
///
/// Ownership is stored as the owner's id rather than a reference, so an owned
/// entity can be checked against its parent without bidirectional pointers.
pub trait Owned: Entity {
    type OwnerId: Clone + Eq + core::fmt::Debug;

    fn owner_id(&self) -> &Self::OwnerId;

    fn is_owned_by(&self, owner: &Self::OwnerId) -> bool {
        self.owner_id() == owner
    }
}
