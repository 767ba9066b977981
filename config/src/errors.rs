// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Configuration errors

use crate::pci::PciAddress;

/// The result of loading or validating a configuration
pub type ConfigResult = Result<(), ConfigError>;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {reason}")]
    ReadFailure { path: String, reason: String },
    #[error("failed to parse config: {0}")]
    ParseFailure(String),
    #[error("duplicate physical function {0}")]
    DuplicatePhysicalFunction(PciAddress),
    #[error("virtual function {0} is declared more than once")]
    DuplicateVirtualFunction(PciAddress),
    #[error("duplicate virtual function index {index} under physical function {pf}")]
    DuplicateVfIndex { pf: PciAddress, index: u32 },
    #[error("physical function {0} declares no capabilities")]
    NoCapabilities(PciAddress),
    #[error("physical function {0} declares no service domains")]
    NoServiceDomains(PciAddress),
    #[error("physical function {0} declares no virtual functions")]
    NoVirtualFunctions(PciAddress),
}
