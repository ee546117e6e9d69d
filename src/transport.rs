//! The connection to a streaming server, as far as this crate is concerned.
//!
//! Wire protocol details live in [`Transport`] implementations. The session
//! only needs to start and stop a connection, hear about its lifecycle, and
//! issue the two discovery requests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use url::Url;

use crate::{
    config::Config,
    error::Result,
    events::Event,
    protocol::{CapabilitySet, ResourceList},
};

/// One logical connection to one server URL.
///
/// Implementations must be cheap to share: the manager hands clones of the
/// `Arc` to discovery runs and players.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The server this transport connects to.
    fn url(&self) -> &Url;

    /// Subscribes to lifecycle [`Event`]s.
    ///
    /// The manager subscribes before calling [`connect`](Self::connect), so
    /// an implementation may emit `Connected` from within `connect`.
    fn subscribe(&self) -> broadcast::Receiver<Event>;

    /// Starts establishing the connection.
    ///
    /// Returning `Ok` does not mean the connection is up; that is signalled
    /// by [`Event::Connected`].
    async fn connect(&self) -> Result<()>;

    /// Closes the connection. Callers ignore failures.
    async fn disconnect(&self) -> Result<()>;

    /// Requests the capability set of `uri` (`OPTIONS`).
    async fn options(&self, uri: &str) -> Result<CapabilitySet>;

    /// Requests the resources listed under `uri` (`LIST`).
    async fn list(&self, uri: &str) -> Result<ResourceList>;
}

/// Creates a fresh [`Transport`] whenever the manager needs a new connection.
pub trait Connector: Send + Sync {
    fn open(&self, config: &Config) -> Arc<dyn Transport>;
}

impl<F> Connector for F
where
    F: Fn(&Config) -> Arc<dyn Transport> + Send + Sync,
{
    fn open(&self, config: &Config) -> Arc<dyn Transport> {
        self(config)
    }
}
