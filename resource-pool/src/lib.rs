// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! SR-IOV resource pool: turns allocated tokens into concrete VFs.
//!
//! The data path asks this crate for "a VF advertising the token's name,
//! bound to this driver"; the token pool's closure bookkeeping guarantees
//! the VF is not simultaneously promised under another name.

#![deny(clippy::all, clippy::pedantic)]

pub mod driver;
pub mod errors;
pub mod pool;


pub use driver::{DriverBinder, DriverKind};
pub use errors::ResourcePoolError;
pub use pool::ResourcePool;
