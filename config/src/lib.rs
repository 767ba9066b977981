// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Declarative description of the SR-IOV hardware a forwarder manages:
//! physical functions, their virtual functions, and the service-domain /
//! capability names the hardware is advertised under.
//!
//! The config is the source of truth for token-pool materialization: one
//! token exists per (physical function, service domain, capability,
//! VF slot) tuple.

#![deny(clippy::all, clippy::pedantic)]

pub mod errors;
pub mod name;
pub mod pci;

pub use errors::{ConfigError, ConfigResult};
pub use name::{Capability, InvalidName, InvalidTokenName, ServiceDomain, TokenName};
pub use pci::{InvalidPciAddress, PciAddress};

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::debug;

/// A physical function and everything it advertises.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalFunctionConfig {
    /// PCI address of the physical function itself.
    pub pci_address: PciAddress,
    /// Hardware capabilities this PF offers (e.g. `10G`, `intel`).
    pub capabilities: Vec<Capability>,
    /// Service domains the PF is reachable from.
    pub service_domains: Vec<ServiceDomain>,
    /// The PF's virtual functions: PCI address to VF index.
    pub virtual_functions: BTreeMap<PciAddress, u32>,
}

impl PhysicalFunctionConfig {
    /// Number of VF slots this PF contributes to every name it advertises.
    #[must_use]
    pub fn vf_count(&self) -> usize {
        self.virtual_functions.len()
    }

    /// The names this PF is advertised under, in declared order
    /// (service domains outer, capabilities inner).
    pub fn token_names(&self) -> impl Iterator<Item = TokenName> + '_ {
        self.service_domains.iter().flat_map(move |domain| {
            self.capabilities
                .iter()
                .map(move |capability| TokenName::new(domain.clone(), capability.clone()))
        })
    }

    /// The PF's virtual functions ordered by VF index.  This is the
    /// declared VF order used for first-fit selection.
    #[must_use]
    pub fn ordered_virtual_functions(&self) -> Vec<(PciAddress, u32)> {
        let mut vfs: Vec<(PciAddress, u32)> = self
            .virtual_functions
            .iter()
            .map(|(addr, index)| (*addr, *index))
            .collect();
        vfs.sort_by_key(|(_, index)| *index);
        vfs
    }
}

/// Top-level SR-IOV configuration: an ordered list of physical functions.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub physical_functions: Vec<PhysicalFunctionConfig>,
}

impl Config {
    /// Parse a config from its YAML form and validate it.
    ///
    /// # Errors
    ///
    /// Fails if the document does not parse or does not validate.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml_ng::from_str(yaml)
            .map_err(|e| ConfigError::ParseFailure(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a YAML file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading SR-IOV config from {}", path.display());
        let yaml = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailure {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_yaml(&yaml)?;
        debug!(
            "Loaded SR-IOV config with {} physical functions",
            config.physical_functions.len()
        );
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Rejects duplicate PF addresses, duplicate VF addresses or indices,
    /// and physical functions with nothing to advertise.
    pub fn validate(&self) -> ConfigResult {
        let mut pf_addrs: HashSet<PciAddress> = HashSet::new();
        let mut vf_addrs: HashSet<PciAddress> = HashSet::new();
        for pf in &self.physical_functions {
            if !pf_addrs.insert(pf.pci_address) {
                return Err(ConfigError::DuplicatePhysicalFunction(pf.pci_address));
            }
            if pf.capabilities.is_empty() {
                return Err(ConfigError::NoCapabilities(pf.pci_address));
            }
            if pf.service_domains.is_empty() {
                return Err(ConfigError::NoServiceDomains(pf.pci_address));
            }
            if pf.virtual_functions.is_empty() {
                return Err(ConfigError::NoVirtualFunctions(pf.pci_address));
            }
            let mut indices: HashSet<u32> = HashSet::new();
            for (addr, index) in &pf.virtual_functions {
                if !vf_addrs.insert(*addr) {
                    return Err(ConfigError::DuplicateVirtualFunction(*addr));
                }
                if !indices.insert(*index) {
                    return Err(ConfigError::DuplicateVfIndex {
                        pf: pf.pci_address,
                        index: *index,
                    });
                }
            }
        }
        Ok(())
    }
}
