//! Version tokens: the externally visible form of an aggregate version.
//!
//! A token renders as a quoted integer (`"3"`), the shape used in conditional
//! write preconditions. Only the decoded number matters to the core.

use core::str::FromStr;

use crate::aggregate::ExpectedVersion;
use crate::error::{DomainError, DomainResult};

/// Version assigned to a freshly created aggregate.
pub const INITIAL_VERSION: u64 = 0;

/// Opaque version token exchanged with callers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(u64);

impl VersionToken {
    pub fn for_version(version: u64) -> Self {
        Self(version)
    }

    pub fn version(self) -> u64 {
        self.0
    }

    /// Decode a raw token.
    ///
    /// Accepts `"<n>"`, a bare `<n>` and the weak form `W/"<n>"`. Returns
    /// `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let raw = raw.strip_prefix("W/").unwrap_or(raw);
        let digits = match (raw.strip_prefix('"'), raw.ends_with('"')) {
            (Some(rest), true) => rest.strip_suffix('"')?,
            (None, false) => raw,
            _ => return None,
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<u64>().ok().map(Self)
    }
}

impl core::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

impl FromStr for VersionToken {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| DomainError::validation(format!("malformed version token: {s}")))
    }
}

/// A value paired with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub body: T,
}

impl<T> Versioned<T> {
    pub fn new(version: u64, body: T) -> Self {
        Self { version, body }
    }

    pub fn token(&self) -> VersionToken {
        VersionToken::for_version(self.version)
    }
}

/// Compare a caller-supplied token against the entity's current version.
///
/// An absent or malformed token is a conflict, never "no version required".
pub fn check_version(current: u64, supplied: Option<&str>) -> DomainResult<()> {
    let expected = supplied
        .and_then(VersionToken::parse)
        .map(|token| ExpectedVersion::exact(token.version()));

    match expected {
        Some(expected) if expected.matches(current) => Ok(()),
        _ => Err(DomainError::version_conflict(supplied, current)),
    }
}
