// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Service-domain / capability naming.
//!
//! Every SR-IOV token is advertised under a name of the form
//! `<serviceDomain>/<capability>` (e.g. `worker.domain/10G`).  The two
//! segments are validated newtypes so that a name can always be re-parsed
//! from connection labels and environment-variable advertisements.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Characters that may not appear in a name segment.  `/` separates the
/// two segments of a [`TokenName`]; `=`, `,` and `;` are claimed by the
/// token advertisement syntax (`name1=id1,id2;name2=id3`).
const ILLEGAL_SEGMENT_CHARS: [char; 4] = ['/', '=', ',', ';'];

fn validate_segment(segment: &str) -> Result<(), InvalidName> {
    if segment.is_empty() {
        return Err(InvalidName::Empty);
    }
    match segment.chars().find(|c| ILLEGAL_SEGMENT_CHARS.contains(c)) {
        Some(ch) => Err(InvalidName::IllegalCharacter(segment.to_string(), ch)),
        None => Ok(()),
    }
}

/// Errors that can occur when validating a name segment
#[derive(Clone, Debug, Eq, Hash, PartialEq, thiserror::Error)]
pub enum InvalidName {
    #[error("name segment may not be empty")]
    Empty,
    #[error("illegal character '{1}' in name segment '{0}'")]
    IllegalCharacter(String, char),
}

/// A tenant / network scope under which capabilities are offered.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceDomain(String);

/// A named hardware feature, e.g. `10G` or `intel`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Capability(String);

macro_rules! name_segment {
    ($ty:ident) => {
        impl $ty {
            /// Validate and wrap a raw segment.
            ///
            /// # Errors
            ///
            /// Returns an [`InvalidName`] error if the segment is empty or
            /// contains a reserved character.
            pub fn new(segment: impl Into<String>) -> Result<Self, InvalidName> {
                let segment = segment.into();
                validate_segment(&segment)?;
                Ok(Self(segment))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $ty {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $ty {
            type Err = InvalidName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<&str> for $ty {
            type Error = InvalidName;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = InvalidName;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> String {
                value.0
            }
        }
    };
}

name_segment!(ServiceDomain);
name_segment!(Capability);

/// The fully-qualified name a token is advertised under:
/// `<serviceDomain>/<capability>`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenName {
    service_domain: ServiceDomain,
    capability: Capability,
}

impl TokenName {
    #[must_use]
    pub fn new(service_domain: ServiceDomain, capability: Capability) -> Self {
        Self {
            service_domain,
            capability,
        }
    }

    #[must_use]
    pub fn service_domain(&self) -> &ServiceDomain {
        &self.service_domain
    }

    #[must_use]
    pub fn capability(&self) -> &Capability {
        &self.capability
    }
}

impl Display for TokenName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.service_domain, self.capability)
    }
}

/// Errors that can occur when parsing a [`TokenName`]
#[derive(Clone, Debug, Eq, Hash, PartialEq, thiserror::Error)]
pub enum InvalidTokenName {
    #[error("token name '{0}' must have the form <serviceDomain>/<capability>")]
    MissingSeparator(String),
    #[error("bad service domain: {0}")]
    ServiceDomain(InvalidName),
    #[error("bad capability: {0}")]
    Capability(InvalidName),
}

impl FromStr for TokenName {
    type Err = InvalidTokenName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (domain, capability) = s
            .split_once('/')
            .ok_or_else(|| InvalidTokenName::MissingSeparator(s.to_string()))?;
        let service_domain = ServiceDomain::new(domain).map_err(InvalidTokenName::ServiceDomain)?;
        let capability = Capability::new(capability).map_err(InvalidTokenName::Capability)?;
        Ok(TokenName::new(service_domain, capability))
    }
}

impl TryFrom<&str> for TokenName {
    type Error = InvalidTokenName;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<String> for TokenName {
    type Error = InvalidTokenName;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TokenName> for String {
    fn from(name: TokenName) -> String {
        name.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test {
    use super::*;

    #[test]
    fn token_name_roundtrip() {
        let name: TokenName = "worker.domain/10G".parse().unwrap();
        assert_eq!(name.service_domain().as_str(), "worker.domain");
        assert_eq!(name.capability().as_str(), "10G");
        assert_eq!(name.to_string(), "worker.domain/10G");
    }

    #[test]
    fn token_name_needs_separator() {
        assert_eq!(
            TokenName::from_str("intel").unwrap_err(),
            InvalidTokenName::MissingSeparator("intel".to_string())
        );
    }

    #[test]
    fn segments_may_not_be_empty() {
        assert_eq!(
            TokenName::from_str("/intel").unwrap_err(),
            InvalidTokenName::ServiceDomain(InvalidName::Empty)
        );
        assert_eq!(
            TokenName::from_str("d1/").unwrap_err(),
            InvalidTokenName::Capability(InvalidName::Empty)
        );
        assert_eq!(ServiceDomain::new("").unwrap_err(), InvalidName::Empty);
    }

    #[test]
    fn advertisement_syntax_chars_are_rejected() {
        for ch in ['=', ',', ';'] {
            let segment = format!("d1{ch}x");
            assert_eq!(
                Capability::new(segment.clone()).unwrap_err(),
                InvalidName::IllegalCharacter(segment, ch)
            );
        }
        // a second '/' lands in the capability segment and is rejected there
        assert_eq!(
            TokenName::from_str("d1/intel/10G").unwrap_err(),
            InvalidTokenName::Capability(InvalidName::IllegalCharacter("intel/10G".to_string(), '/'))
        );
    }
}
