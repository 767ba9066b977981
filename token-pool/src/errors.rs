// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Token pool errors

use crate::id::TokenId;
use crate::pool::TokenState;
use config::TokenName;

/// The result of a token pool operation
pub type TokenPoolResult = Result<(), TokenPoolError>;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TokenPoolError {
    /// No token with this ID exists in the pool.
    #[error("token doesn't exist: {0}")]
    InvalidId(TokenId),
    /// The requested transition is not permitted from the token's
    /// current state.
    #[error("token is {state}: {name}:{id}")]
    BadState {
        id: TokenId,
        name: TokenName,
        state: TokenState,
    },
    /// The token was closed to uphold exclusivity of a sibling in use.
    #[error("token is closed: {name}:{id}")]
    ClosedToken { id: TokenId, name: TokenName },
    /// `restore` may only run on an untouched pool.
    #[error("token pool has already been accessed")]
    AlreadyDirty,
}
