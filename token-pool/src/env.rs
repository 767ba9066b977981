// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Token advertisement over the process environment.
//!
//! The device-plugin process that owns the pool and the forwarder process
//! that spends tokens are distinct; the plugin hands the forwarder its
//! share of tokens through a single environment variable of the form
//! `name1=id1,id2;name2=id3,id4`.

use crate::id::{InvalidTokenId, TokenId};
use config::{InvalidTokenName, TokenName};
use std::collections::BTreeMap;
use std::env;

/// The environment variable carrying the forwarder's tokens.
pub const TOKENS_ENV: &str = "NSM_SRIOV_TOKENS";

/// Errors that can occur when decoding a token advertisement
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TokenEnvError {
    #[error("malformed token entry '{0}': missing '='")]
    MissingSeparator(String),
    #[error("bad token name in '{entry}': {source}")]
    BadName {
        entry: String,
        source: InvalidTokenName,
    },
    #[error("bad token ID in '{entry}': {source}")]
    BadId {
        entry: String,
        source: InvalidTokenId,
    },
    #[error("{TOKENS_ENV} does not contain valid unicode")]
    NotUnicode,
}

/// Render tokens into the advertisement syntax.  Names sort
/// lexicographically so the output is deterministic.
#[must_use]
pub fn encode(tokens: &BTreeMap<TokenName, Vec<TokenId>>) -> String {
    tokens
        .iter()
        .map(|(name, ids)| {
            let ids = ids
                .iter()
                .map(TokenId::as_str)
                .collect::<Vec<_>>()
                .join(",");
            format!("{name}={ids}")
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Parse the advertisement syntax.
///
/// # Errors
///
/// Fails on entries without `=`, unparsable names and empty IDs.
pub fn decode(value: &str) -> Result<BTreeMap<TokenName, Vec<TokenId>>, TokenEnvError> {
    let mut tokens: BTreeMap<TokenName, Vec<TokenId>> = BTreeMap::new();
    for entry in value.split(';').filter(|entry| !entry.is_empty()) {
        let (name, ids) = entry
            .split_once('=')
            .ok_or_else(|| TokenEnvError::MissingSeparator(entry.to_string()))?;
        let name = TokenName::try_from(name).map_err(|source| TokenEnvError::BadName {
            entry: entry.to_string(),
            source,
        })?;
        let ids = ids
            .split(',')
            .map(|id| {
                TokenId::new(id).map_err(|source| TokenEnvError::BadId {
                    entry: entry.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        tokens.entry(name).or_default().extend(ids);
    }
    Ok(tokens)
}

/// Read the advertisement from the process environment.  An unset
/// variable is an empty advertisement, not an error.
///
/// # Errors
///
/// Fails if the variable is set but malformed.
pub fn from_env() -> Result<BTreeMap<TokenName, Vec<TokenId>>, TokenEnvError> {
    match env::var(TOKENS_ENV) {
        Ok(value) => decode(&value),
        Err(env::VarError::NotPresent) => Ok(BTreeMap::new()),
        Err(env::VarError::NotUnicode(_)) => Err(TokenEnvError::NotUnicode),
    }
}
