// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Token translation in the request path.
//!
//! An incoming request asks for capacity by *name* (`sriovToken` label);
//! the mechanisms downstream need a concrete token *ID*.  [`TokenClient`]
//! performs the translation against the tokens this forwarder process was
//! handed through the environment, releases the token again when a fresh
//! request fails, and puts the name back into the returned connection so
//! a healing re-request can repeat the exercise.

use crate::chain::{
    Connection, NetworkServiceClient, Request, DEVICE_TOKEN_ID_PARAMETER, SERVICE_DOMAIN_LABEL,
    SRIOV_TOKEN_LABEL,
};
use crate::errors::TokenClientError;
use ahash::RandomState;
use async_trait::async_trait;
use config::TokenName;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use token_pool::env::TokenEnvError;
use token_pool::TokenId;
use tracing::debug;

#[derive(Default)]
struct Assignments {
    by_connection: HashMap<String, (TokenName, TokenId), RandomState>,
    in_use: HashSet<TokenId, RandomState>,
}

/// The tokens this process may hand out, keyed by name, plus the live
/// per-connection assignments.
pub struct TokenConfig {
    tokens: BTreeMap<TokenName, Vec<TokenId>>,
    assignments: Mutex<Assignments>,
}

impl TokenConfig {
    /// Build from an explicit advertisement (tests, single-process
    /// deployments).
    #[must_use]
    pub fn new(tokens: BTreeMap<TokenName, Vec<TokenId>>) -> Self {
        Self {
            tokens,
            assignments: Mutex::new(Assignments::default()),
        }
    }

    /// Build from the `NSM_SRIOV_TOKENS` advertisement.
    ///
    /// # Errors
    ///
    /// Fails if the environment variable is set but malformed.
    pub fn from_env() -> Result<Self, TokenEnvError> {
        Ok(Self::new(token_pool::env::from_env()?))
    }

    fn lock(&self) -> MutexGuard<'_, Assignments> {
        self.assignments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Assign a token of `name` to the connection.  A connection that
    /// already holds a token of that name keeps it; an assignment under
    /// another name is replaced.  Returns `None` when every token of the
    /// name is taken.
    fn assign(&self, name: &TokenName, connection: &Connection) -> Option<TokenId> {
        let mut assignments = self.lock();
        if let Some((held_name, id)) = assignments.by_connection.get(&connection.id) {
            if held_name == name {
                return Some(id.clone());
            }
            let id = id.clone();
            assignments.in_use.remove(&id);
            assignments.by_connection.remove(&connection.id);
        }

        let id = self
            .tokens
            .get(name)?
            .iter()
            .find(|id| !assignments.in_use.contains(*id))?
            .clone();
        assignments.in_use.insert(id.clone());
        assignments
            .by_connection
            .insert(connection.id.clone(), (name.clone(), id.clone()));
        debug!("Assigned token {name}:{id} to connection {}", connection.id);
        Some(id)
    }

    /// The token currently assigned to the connection, if any.
    fn get(&self, connection: &Connection) -> Option<TokenId> {
        self.lock()
            .by_connection
            .get(&connection.id)
            .map(|(_, id)| id.clone())
    }

    /// Return the connection's token, if any, to the free set.
    fn release(&self, connection: &Connection) {
        let mut assignments = self.lock();
        if let Some((name, id)) = assignments.by_connection.remove(&connection.id) {
            assignments.in_use.remove(&id);
            debug!("Released token {name}:{id} of connection {}", connection.id);
        }
    }
}

/// Chain element translating the `sriovToken` label into a
/// `deviceTokenId` mechanism parameter.
pub struct TokenClient<N> {
    config: TokenConfig,
    next: N,
}

impl<N: NetworkServiceClient> TokenClient<N> {
    /// Wire the element up with the process-environment advertisement.
    ///
    /// # Errors
    ///
    /// Fails if the advertisement is malformed.
    pub fn from_env(next: N) -> Result<Self, TokenEnvError> {
        Ok(Self {
            config: TokenConfig::from_env()?,
            next,
        })
    }

    /// Wire the element up with an explicit token set.
    #[must_use]
    pub fn with_tokens(tokens: BTreeMap<TokenName, Vec<TokenId>>, next: N) -> Self {
        Self {
            config: TokenConfig::new(tokens),
            next,
        }
    }
}

#[async_trait]
impl<N: NetworkServiceClient> NetworkServiceClient for TokenClient<N> {
    async fn request(&self, request: Request) -> anyhow::Result<Connection> {
        // an empty per-connection entry means this is a fresh connection,
        // not a refresh of an established one
        let is_established = self.config.get(&request.connection).is_some();

        let mut request = request;
        let mut token_name = None;
        if let Some(label) = request.connection.labels.get(SRIOV_TOKEN_LABEL) {
            let name = TokenName::try_from(label.as_str())?;
            let Some(id) = self.config.assign(&name, &request.connection) else {
                return Err(TokenClientError::NoFreeToken(name).into());
            };

            request.connection.labels.remove(SRIOV_TOKEN_LABEL);
            request.connection.labels.insert(
                SERVICE_DOMAIN_LABEL.to_string(),
                name.service_domain().to_string(),
            );
            for mechanism in &mut request.mechanism_preferences {
                mechanism
                    .parameters
                    .insert(DEVICE_TOKEN_ID_PARAMETER.to_string(), id.to_string());
            }
            token_name = Some(name);
        }

        let request_connection = request.connection.clone();
        match self.next.request(request).await {
            Ok(mut connection) => {
                if let Some(name) = token_name {
                    // put the name back for future healing
                    connection.labels.remove(SERVICE_DOMAIN_LABEL);
                    connection
                        .labels
                        .insert(SRIOV_TOKEN_LABEL.to_string(), name.to_string());
                }
                Ok(connection)
            }
            Err(e) => {
                if token_name.is_some() && !is_established {
                    self.config.release(&request_connection);
                }
                Err(e)
            }
        }
    }

    async fn close(&self, connection: Connection) -> anyhow::Result<()> {
        self.config.release(&connection);
        self.next.close(connection).await
    }
}
