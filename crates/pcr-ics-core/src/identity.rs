//! Content-stable event identities.
//!
//! An [`Identity`] is a name-based (version 3) UUID derived from an identity
//! key such as `pcr_cn/clan_battle_period/1001`, hashed under the RFC 4122
//! URL namespace. Published calendars carry these values as `UID`, so the
//! namespace and hash must never change: doing so would re-create every
//! event with a fresh `CREATED` stamp and `SEQUENCE:0`.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Namespace every identity key is hashed under.
pub const IDENTITY_NAMESPACE: Uuid = Uuid::NAMESPACE_URL;

/// Deterministic 128-bit identifier of a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity(Uuid);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Identity {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Resolve an identity key to its [`Identity`].
///
/// Pure and deterministic across processes and releases.
#[must_use]
pub fn resolve(identity_key: &str) -> Identity {
    Identity(Uuid::new_v3(&IDENTITY_NAMESPACE, identity_key.as_bytes()))
}

/// Build the identity key for one row of a source table.
#[must_use]
pub fn identity_key(prefix: &str, table: &str, row_id: i64) -> String {
    format!("{prefix}/{table}/{row_id}")
}
