// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The slice of the network-service request model this crate touches.
//!
//! The real chain carries much more (mechanisms negotiation, contexts,
//! FD passing); the token translator only ever reads and writes
//! connection labels and mechanism parameters, so only those surface
//! here.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Label carrying the requested token name, `<serviceDomain>/<capability>`.
pub const SRIOV_TOKEN_LABEL: &str = "sriovToken";
/// Label carrying the service domain while the request travels downstream.
pub const SERVICE_DOMAIN_LABEL: &str = "serviceDomain";
/// Mechanism parameter carrying the assigned token ID.
pub const DEVICE_TOKEN_ID_PARAMETER: &str = "deviceTokenId";

/// A connection as seen by the token translator: an identity plus labels.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Connection {
    pub id: String,
    pub labels: HashMap<String, String>,
}

/// One mechanism preference of a request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mechanism {
    pub parameters: HashMap<String, String>,
}

/// A network service request travelling down the chain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Request {
    pub connection: Connection,
    pub mechanism_preferences: Vec<Mechanism>,
}

/// A client chain element.  Elements wrap the next element and may
/// rewrite the request on the way down and the connection on the way up.
#[async_trait]
pub trait NetworkServiceClient: Send + Sync {
    /// Request a connection.
    ///
    /// # Errors
    ///
    /// Downstream errors propagate unchanged.
    async fn request(&self, request: Request) -> anyhow::Result<Connection>;

    /// Close a connection.
    ///
    /// # Errors
    ///
    /// Downstream errors propagate unchanged.
    async fn close(&self, connection: Connection) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: NetworkServiceClient + ?Sized> NetworkServiceClient for Arc<T> {
    async fn request(&self, request: Request) -> anyhow::Result<Connection> {
        (**self).request(request).await
    }

    async fn close(&self, connection: Connection) -> anyhow::Result<()> {
        (**self).close(connection).await
    }
}
