// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The token pool: arbitration of SR-IOV virtual-function capacity.
//!
//! A token is the right to use one VF slot of a physical function under
//! one `<serviceDomain>/<capability>` name.  The same silicon is usually
//! advertised under several names, so taking a token *into use* must
//! consume one sibling token under every other name of the same hardware;
//! those siblings are moved to the closed state and return to free when
//! the token stops being used.  This closure bookkeeping is the pool's
//! whole reason to exist: without it a VF could be handed out twice
//! through two different names.

use crate::errors::{TokenPoolError, TokenPoolResult};
use crate::id::TokenId;
use crate::notify::ChangeNotifier;
use ahash::RandomState;
use config::{Config, TokenName};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// The lifecycle of a token.
///
/// `Free ⇄ Allocated ⇄ InUse`; `Closed` is entered and left only as a
/// side effect of a *sibling* entering and leaving `InUse`.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum TokenState {
    /// Not handed out to anybody.
    Free,
    /// Handed out by the device plugin, not yet bound to hardware.
    Allocated,
    /// Bound to a VF by the forwarder.
    InUse,
    /// Consumed on account of a sibling in use; invisible to allocation.
    Closed,
}

impl Display for TokenState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TokenState::Free => "free",
            TokenState::Allocated => "allocated",
            TokenState::InUse => "inUse",
            TokenState::Closed => "closed",
        })
    }
}

/// The seam the data-path resource selector consumes: resolve a token,
/// take it into use, stop using it.
pub trait TokenArbiter: Send + Sync {
    /// Resolve the name a token ID is advertised under.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidId` for unknown IDs.
    fn find(&self, id: &TokenId) -> Result<TokenName, TokenPoolError>;

    /// Mark the token as in use, closing one sibling under every other
    /// name in `names`.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidId` or `BadState`.
    fn use_token(&self, id: &TokenId, names: &[TokenName]) -> TokenPoolResult;

    /// Undo `use_token`: the token returns to allocated, its closure set
    /// to free.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidId` or `BadState`.
    fn stop_using(&self, id: &TokenId) -> TokenPoolResult;
}

impl<'a, T: TokenArbiter + ?Sized> TokenArbiter for &'a T {
    fn find(&self, id: &TokenId) -> Result<TokenName, TokenPoolError> {
        (**self).find(id)
    }

    fn use_token(&self, id: &TokenId, names: &[TokenName]) -> TokenPoolResult {
        (**self).use_token(id, names)
    }

    fn stop_using(&self, id: &TokenId) -> TokenPoolResult {
        (**self).stop_using(id)
    }
}

impl<T: TokenArbiter + ?Sized> TokenArbiter for std::sync::Arc<T> {
    fn find(&self, id: &TokenId) -> Result<TokenName, TokenPoolError> {
        (**self).find(id)
    }

    fn use_token(&self, id: &TokenId, names: &[TokenName]) -> TokenPoolResult {
        (**self).use_token(id, names)
    }

    fn stop_using(&self, id: &TokenId) -> TokenPoolResult {
        (**self).stop_using(id)
    }
}

struct TokenRecord {
    id: TokenId,
    name: TokenName,
    state: TokenState,
}

/// Index-based pool state.  A token is simultaneously reachable through
/// `by_id`, `by_name` and (while closed on somebody's account)
/// `closed_by`, so records live in an arena and the indices refer to
/// slots rather than owning the records.
struct PoolInner {
    slots: Vec<TokenRecord>,
    by_id: HashMap<TokenId, usize, RandomState>,
    by_name: HashMap<TokenName, Vec<usize>, RandomState>,
    closed_by: HashMap<TokenId, Vec<usize>, RandomState>,
    dirty: bool,
}

impl PoolInner {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            by_id: HashMap::with_hasher(RandomState::with_seed(0)),
            by_name: HashMap::with_hasher(RandomState::with_seed(0)),
            closed_by: HashMap::with_hasher(RandomState::with_seed(0)),
            dirty: false,
        }
    }

    fn insert(&mut self, id: TokenId, name: TokenName) {
        let idx = self.slots.len();
        self.by_id.insert(id.clone(), idx);
        self.by_name.entry(name.clone()).or_default().push(idx);
        self.slots.push(TokenRecord {
            id,
            name,
            state: TokenState::Free,
        });
    }

    fn find(&self, id: &TokenId) -> Result<usize, TokenPoolError> {
        self.by_id
            .get(id)
            .copied()
            .ok_or_else(|| TokenPoolError::InvalidId(id.clone()))
    }

    fn bad_state(&self, idx: usize) -> TokenPoolError {
        let tok = &self.slots[idx];
        TokenPoolError::BadState {
            id: tok.id.clone(),
            name: tok.name.clone(),
            state: tok.state,
        }
    }

    /// First free token under `name`, else first allocated, else none.
    /// The two passes keep idle siblings from surviving while an
    /// allocated one gets stolen.
    fn find_to_close(&self, name: &TokenName) -> Option<usize> {
        let candidates = self.by_name.get(name)?;
        for pass in [TokenState::Free, TokenState::Allocated] {
            if let Some(idx) = candidates
                .iter()
                .copied()
                .find(|&idx| self.slots[idx].state == pass)
            {
                return Some(idx);
            }
        }
        None
    }

    /// Returns whether listeners should fire.
    fn allocate(&mut self, id: &TokenId) -> Result<bool, TokenPoolError> {
        let idx = self.find(id)?;
        match self.slots[idx].state {
            // the client died without orderly teardown; self-heal by
            // unwinding the closure set
            TokenState::InUse => {
                self.stop_using(id)?;
                Ok(true)
            }
            TokenState::Closed => {
                let tok = &self.slots[idx];
                Err(TokenPoolError::ClosedToken {
                    id: tok.id.clone(),
                    name: tok.name.clone(),
                })
            }
            TokenState::Free | TokenState::Allocated => {
                self.slots[idx].state = TokenState::Allocated;
                Ok(false)
            }
        }
    }

    /// Returns whether listeners should fire.
    fn free(&mut self, id: &TokenId) -> Result<bool, TokenPoolError> {
        let idx = self.find(id)?;
        match self.slots[idx].state {
            TokenState::InUse => {
                self.stop_using(id)?;
                self.slots[idx].state = TokenState::Free;
                Ok(true)
            }
            // cannot free a closed token, but this is not a failure
            TokenState::Closed => Ok(false),
            TokenState::Free | TokenState::Allocated => {
                self.slots[idx].state = TokenState::Free;
                Ok(false)
            }
        }
    }

    fn use_token(&mut self, id: &TokenId, names: &[TokenName]) -> TokenPoolResult {
        let idx = self.find(id)?;
        if matches!(
            self.slots[idx].state,
            TokenState::InUse | TokenState::Closed
        ) {
            return Err(self.bad_state(idx));
        }
        self.slots[idx].state = TokenState::InUse;
        let own_name = self.slots[idx].name.clone();

        for name in names.iter().filter(|name| **name != own_name) {
            // a name with no free or allocated sibling left is skipped:
            // its capacity is already fully consumed
            let Some(close_idx) = self.find_to_close(name) else {
                continue;
            };
            self.slots[close_idx].state = TokenState::Closed;
            self.closed_by.entry(id.clone()).or_default().push(close_idx);
            debug!(
                "Closed token {name}:{} on account of {own_name}:{id}",
                self.slots[close_idx].id
            );
        }
        Ok(())
    }

    fn stop_using(&mut self, id: &TokenId) -> TokenPoolResult {
        let idx = self.find(id)?;
        if self.slots[idx].state != TokenState::InUse {
            return Err(self.bad_state(idx));
        }
        self.slots[idx].state = TokenState::Allocated;
        for closed_idx in self.closed_by.remove(id).unwrap_or_default() {
            self.slots[closed_idx].state = TokenState::Free;
        }
        Ok(())
    }

    fn restore(&mut self, tokens: &HashMap<TokenName, Vec<TokenId>>) -> TokenPoolResult {
        if self.dirty {
            return Err(TokenPoolError::AlreadyDirty);
        }
        self.dirty = true;

        for (name, ids) in tokens {
            let Some(indices) = self.by_name.get(name) else {
                continue;
            };
            // up to min(|ids|, |tokens-of-name|) tokens adopt restored IDs
            for (idx, id) in indices.clone().into_iter().zip(ids) {
                let previous = std::mem::replace(&mut self.slots[idx].id, id.clone());
                self.by_id.remove(&previous);
                self.by_id.insert(id.clone(), idx);
                self.slots[idx].state = TokenState::Allocated;
            }
            debug!("Restored {} token IDs under {name}", ids.len().min(indices.len()));
        }
        Ok(())
    }

    fn snapshot(&self) -> HashMap<TokenName, HashMap<TokenId, bool>> {
        self.by_name
            .iter()
            .map(|(name, indices)| {
                let tokens = indices
                    .iter()
                    .map(|&idx| {
                        let tok = &self.slots[idx];
                        (tok.id.clone(), tok.state != TokenState::Closed)
                    })
                    .collect();
                (name.clone(), tokens)
            })
            .collect()
    }
}

/// The forwarder's SR-IOV token pool.
///
/// All operations serialize on one internal mutex; per-token operations
/// are linearizable.  Listener callbacks run on a dedicated notifier
/// thread, strictly outside the critical section.
pub struct TokenPool {
    inner: Mutex<PoolInner>,
    notifier: ChangeNotifier,
}

impl TokenPool {
    /// Materialize the pool from config: one token per (physical
    /// function, service domain, capability, VF slot) tuple, in declared
    /// order.  The per-name order decides first-fit closure selection.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let mut inner = PoolInner::new();
        for pf in &config.physical_functions {
            for name in pf.token_names() {
                for _ in 0..pf.vf_count() {
                    inner.insert(TokenId::generate(), name.clone());
                }
            }
        }
        debug!(
            "Materialized {} tokens under {} names",
            inner.slots.len(),
            inner.by_name.len()
        );
        Self {
            inner: Mutex::new(inner),
            notifier: ChangeNotifier::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adopt token IDs minted by a previous process generation: under
    /// each name, the first IDs are replaced by the given ones and those
    /// tokens become allocated.  Names the pool does not know are
    /// skipped, as are surplus IDs.
    ///
    /// # Errors
    ///
    /// Fails with `AlreadyDirty` unless this is the first operation ever
    /// applied to the pool.
    pub fn restore(&self, tokens: &HashMap<TokenName, Vec<TokenId>>) -> TokenPoolResult {
        self.lock().restore(tokens)
    }

    /// Register a listener fired on every transition into or out of the
    /// closed state.  Listeners receive no payload; they are expected to
    /// re-read [`TokenPool::tokens`].
    pub fn add_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.notifier.add(listener);
    }

    /// Availability snapshot for upstream advertisement, by name and ID.
    /// A token is available unless it is closed.
    pub fn tokens(&self) -> HashMap<TokenName, HashMap<TokenId, bool>> {
        let mut inner = self.lock();
        inner.dirty = true;
        inner.snapshot()
    }

    /// Resolve the name a token is advertised under.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidId` for unknown IDs.
    pub fn find(&self, id: &TokenId) -> Result<TokenName, TokenPoolError> {
        let mut inner = self.lock();
        inner.dirty = true;
        let idx = inner.find(id)?;
        Ok(inner.slots[idx].name.clone())
    }

    /// Mark a token as allocated:
    /// * free → allocated (common case)
    /// * allocated → allocated (device plugin re-issues the token)
    /// * in use → allocated (client died uncleanly; implicit stop-using)
    /// * closed → error
    ///
    /// # Errors
    ///
    /// Fails with `InvalidId` or `ClosedToken`.
    pub fn allocate(&self, id: &TokenId) -> TokenPoolResult {
        let fired = {
            let mut inner = self.lock();
            inner.dirty = true;
            inner.allocate(id)?
        };
        if fired {
            self.notifier.notify();
        }
        Ok(())
    }

    /// Mark a token as free:
    /// * free → free (nothing to do)
    /// * allocated → free (common case)
    /// * in use → free (client died uncleanly; implicit stop-using)
    /// * closed → closed (success, but nothing changes)
    ///
    /// # Errors
    ///
    /// Fails with `InvalidId`.
    pub fn free(&self, id: &TokenId) -> TokenPoolResult {
        let fired = {
            let mut inner = self.lock();
            inner.dirty = true;
            inner.free(id)?
        };
        if fired {
            self.notifier.notify();
        }
        Ok(())
    }

    /// Mark a token as in use.  `names` must enumerate every name the
    /// underlying VF is simultaneously advertised under (the token's own
    /// name included); under each *other* name one sibling is closed,
    /// preferring free siblings over allocated ones.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidId`, or `BadState` if the token is already in
    /// use or closed.
    pub fn use_token(&self, id: &TokenId, names: &[TokenName]) -> TokenPoolResult {
        {
            let mut inner = self.lock();
            inner.dirty = true;
            inner.use_token(id, names)?;
        }
        self.notifier.notify();
        Ok(())
    }

    /// Undo [`TokenPool::use_token`]: the token returns to allocated and
    /// every token closed on its account returns to free.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidId`, or `BadState` unless the token is in use.
    pub fn stop_using(&self, id: &TokenId) -> TokenPoolResult {
        {
            let mut inner = self.lock();
            inner.dirty = true;
            inner.stop_using(id)?;
        }
        self.notifier.notify();
        Ok(())
    }
}

impl TokenArbiter for TokenPool {
    fn find(&self, id: &TokenId) -> Result<TokenName, TokenPoolError> {
        TokenPool::find(self, id)
    }

    fn use_token(&self, id: &TokenId, names: &[TokenName]) -> TokenPoolResult {
        TokenPool::use_token(self, id, names)
    }

    fn stop_using(&self, id: &TokenId) -> TokenPoolResult {
        TokenPool::stop_using(self, id)
    }
}
