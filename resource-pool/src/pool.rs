// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Sticky VF selection for allocated tokens.
//!
//! Given a token that the pool already handed out, the resource pool
//! picks a concrete VF whose physical function advertises the token's
//! name, takes the token into use (closing siblings under every other
//! name of that PF), and binds the VF to the requested kernel driver.
//! Repeated selection with the same token and driver returns the same
//! PCI address for as long as the token is held.

use crate::driver::{DriverBinder, DriverKind};
use crate::errors::ResourcePoolError;
use ahash::RandomState;
use config::{Config, PciAddress, TokenName};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use token_pool::{TokenArbiter, TokenId};
use tracing::{debug, error};

struct PfEntry {
    addr: PciAddress,
    /// Every name this PF is advertised under (domain × capability).
    names: Vec<TokenName>,
    /// Indices into the VF arena, in declared (VF-index) order.
    vfs: Vec<usize>,
}

struct VfEntry {
    addr: PciAddress,
    pf: usize,
    bound: Option<DriverKind>,
    held_by: Option<TokenId>,
}

#[derive(Clone)]
struct Selection {
    vf: usize,
    driver: DriverKind,
}

struct ResourceInner {
    pfs: Vec<PfEntry>,
    vfs: Vec<VfEntry>,
    by_addr: HashMap<PciAddress, usize, RandomState>,
    selections: HashMap<TokenId, Selection, RandomState>,
}

impl ResourceInner {
    fn new(config: &Config) -> Self {
        let mut pfs = Vec::new();
        let mut vfs: Vec<VfEntry> = Vec::new();
        let mut by_addr = HashMap::with_hasher(RandomState::with_seed(0));

        for pf_config in &config.physical_functions {
            let pf = pfs.len();
            let mut pf_vfs = Vec::new();
            for (addr, _) in pf_config.ordered_virtual_functions() {
                let vf_idx = vfs.len();
                by_addr.insert(addr, vf_idx);
                vfs.push(VfEntry {
                    addr,
                    pf,
                    bound: None,
                    held_by: None,
                });
                pf_vfs.push(vf_idx);
            }
            pfs.push(PfEntry {
                addr: pf_config.pci_address,
                names: pf_config.token_names().collect(),
                vfs: pf_vfs,
            });
        }

        Self {
            pfs,
            vfs,
            by_addr,
            selections: HashMap::with_hasher(RandomState::with_seed(0)),
        }
    }

    /// First-fit VF choice: PFs in config order, VFs in declared order.
    /// VFs already bound to the requested driver win over VFs that would
    /// need a rebind.
    fn pick(&self, name: &TokenName, driver: DriverKind) -> Option<usize> {
        for require_bound in [true, false] {
            for pf in self.pfs.iter().filter(|pf| pf.names.contains(name)) {
                for &vf_idx in &pf.vfs {
                    let vf = &self.vfs[vf_idx];
                    if vf.held_by.is_some() {
                        continue;
                    }
                    if require_bound && vf.bound != Some(driver) {
                        continue;
                    }
                    return Some(vf_idx);
                }
            }
        }
        None
    }
}

/// Maps allocated tokens to concrete VFs.  `T` is the token pool seam,
/// `B` performs the actual driver binding.
pub struct ResourcePool<T, B> {
    tokens: T,
    binder: B,
    inner: Mutex<ResourceInner>,
}

impl<T: TokenArbiter, B: DriverBinder> ResourcePool<T, B> {
    #[must_use]
    pub fn new(tokens: T, binder: B, config: &Config) -> Self {
        Self {
            tokens,
            binder,
            inner: Mutex::new(ResourceInner::new(config)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResourceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Select a VF for the token and bind it to `driver`.
    ///
    /// Re-selecting with the same driver is sticky and touches nothing.
    /// Re-selecting with a different driver releases the token's current
    /// VF first.
    ///
    /// # Errors
    ///
    /// Fails with `NoFreeVf` (pool untouched), `DriverBindFailed` (pool
    /// unwound), or a verbatim token pool error.
    pub fn select(
        &self,
        id: &TokenId,
        driver: DriverKind,
    ) -> Result<PciAddress, ResourcePoolError> {
        let name = self.tokens.find(id)?;

        let mut inner = self.lock();
        if let Some(selection) = inner.selections.get(id).cloned() {
            if selection.driver == driver {
                return Ok(inner.vfs[selection.vf].addr);
            }
            debug!("Token {id} switches to driver '{driver}', releasing its current VF");
            self.release(&mut inner, id, &selection)?;
        }

        let Some(vf_idx) = inner.pick(&name, driver) else {
            return Err(ResourcePoolError::NoFreeVf(name));
        };
        let pf = inner.vfs[vf_idx].pf;
        let pf_names = inner.pfs[pf].names.clone();
        self.tokens.use_token(id, &pf_names)?;
        inner.vfs[vf_idx].held_by = Some(id.clone());
        inner.selections.insert(id.clone(), Selection { vf: vf_idx, driver });
        let addr = inner.vfs[vf_idx].addr;
        debug!(
            "Selected VF {addr} under PF {} for token {name}:{id}",
            inner.pfs[pf].addr
        );
        drop(inner);

        // the driver plumbing may block on syscalls; it runs after the
        // pool state is committed and unwinds it on failure
        if let Err(source) = self.binder.bind(&addr, driver) {
            error!("Binding VF {addr} to driver '{driver}' failed: {source}");
            let mut inner = self.lock();
            inner.vfs[vf_idx].held_by = None;
            inner.selections.remove(id);
            drop(inner);
            if let Err(e) = self.tokens.stop_using(id) {
                error!("Failed to unwind token {id} after bind failure: {e}");
            }
            return Err(ResourcePoolError::DriverBindFailed {
                addr,
                driver,
                source,
            });
        }
        self.lock().vfs[vf_idx].bound = Some(driver);

        Ok(addr)
    }

    /// Release the VF at `addr`: stop using the holding token, detach the
    /// driver and forget the selection.
    ///
    /// # Errors
    ///
    /// Fails with `NoSelection` if no token holds the address, with a
    /// verbatim token pool error, or with `DriverBindFailed` if the
    /// driver release fails.
    pub fn free(&self, addr: &PciAddress) -> Result<(), ResourcePoolError> {
        let mut inner = self.lock();
        let vf_idx = *inner
            .by_addr
            .get(addr)
            .ok_or(ResourcePoolError::NoSelection(*addr))?;
        let Some(id) = inner.vfs[vf_idx].held_by.clone() else {
            return Err(ResourcePoolError::NoSelection(*addr));
        };
        let Some(selection) = inner.selections.get(&id).cloned() else {
            return Err(ResourcePoolError::NoSelection(*addr));
        };
        debug!("Freeing VF {addr} held by token {id}");
        self.release(&mut inner, &id, &selection)
    }

    fn release(
        &self,
        inner: &mut ResourceInner,
        id: &TokenId,
        selection: &Selection,
    ) -> Result<(), ResourcePoolError> {
        self.tokens.stop_using(id)?;
        let addr = inner.vfs[selection.vf].addr;
        inner.vfs[selection.vf].held_by = None;
        inner.selections.remove(id);
        if let Err(source) = self.binder.unbind(&addr) {
            error!("Unbinding VF {addr} failed: {source}");
            return Err(ResourcePoolError::DriverBindFailed {
                addr,
                driver: selection.driver,
                source,
            });
        }
        inner.vfs[selection.vf].bound = None;
        Ok(())
    }
}
