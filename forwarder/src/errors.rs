// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Token client errors

use config::TokenName;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TokenClientError {
    /// Every advertised token under the requested name is taken.
    #[error("no free token for the name: {0}")]
    NoFreeToken(TokenName),
}
