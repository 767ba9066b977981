// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Request-path token translation for the SR-IOV forwarder.
//!
//! The device plugin advertises tokens by *name*; the data path spends
//! them by *ID*.  The [`multitoken::TokenClient`] chain element sits in
//! the request pipeline and translates between the two, releasing tokens
//! when fresh requests fail and on connection close.

#![deny(clippy::all, clippy::pedantic)]

pub mod chain;
pub mod errors;
pub mod multitoken;

mod test;

pub use chain::{
    Connection, Mechanism, NetworkServiceClient, Request, DEVICE_TOKEN_ID_PARAMETER,
    SERVICE_DOMAIN_LABEL, SRIOV_TOKEN_LABEL,
};
pub use errors::TokenClientError;
pub use multitoken::{TokenClient, TokenConfig};
