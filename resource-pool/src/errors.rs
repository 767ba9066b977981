// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Resource pool errors

use crate::driver::DriverKind;
use config::{PciAddress, TokenName};
use token_pool::TokenPoolError;

#[derive(Debug, thiserror::Error)]
pub enum ResourcePoolError {
    /// Every VF advertising the name is held by some other token.
    #[error("no free virtual function for token name: {0}")]
    NoFreeVf(TokenName),
    /// The PCI address does not belong to a currently selected VF.
    #[error("no selected virtual function at PCI address: {0}")]
    NoSelection(PciAddress),
    /// The external driver-bind collaborator failed; pool state has been
    /// rolled back before this error surfaces.
    #[error("failed to bind {addr} to driver '{driver}': {source}")]
    DriverBindFailed {
        addr: PciAddress,
        driver: DriverKind,
        #[source]
        source: std::io::Error,
    },
    /// Token pool errors pass through verbatim.
    #[error(transparent)]
    TokenPool(#[from] TokenPoolError),
}
