// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Opaque token identifiers.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// An opaque, process-unique token identifier.
///
/// Freshly minted IDs are UUID v4 strings, but the pool also adopts IDs
/// handed over from a previous process generation, so any non-empty string
/// is a legal [`TokenId`].
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId(String);

impl TokenId {
    /// Mint a fresh random ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Adopt an existing ID.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTokenId`] if the string is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidTokenId> {
        let id = id.into();
        if id.is_empty() {
            return Err(InvalidTokenId::Empty);
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TokenId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors that can occur when adopting a [`TokenId`]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, thiserror::Error)]
pub enum InvalidTokenId {
    #[error("token ID may not be empty")]
    Empty,
}

impl FromStr for TokenId {
    type Err = InvalidTokenId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for TokenId {
    type Error = InvalidTokenId;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<String> for TokenId {
    type Error = InvalidTokenId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TokenId> for String {
    fn from(id: TokenId) -> String {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(TokenId::generate(), TokenId::generate());
    }

    #[test]
    fn empty_id_is_rejected() {
        assert_eq!(TokenId::new("").unwrap_err(), InvalidTokenId::Empty);
    }

    #[test]
    fn adopted_id_renders_verbatim() {
        assert_eq!(TokenId::new("gen-1-token-7").unwrap().to_string(), "gen-1-token-7");
    }
}
