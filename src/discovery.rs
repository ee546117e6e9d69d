//! Resource discovery.
//!
//! A [`Discovery`] is created for every connection that comes up. Its
//! [`run`](Discovery::run) walks the server strictly in sequence:
//!
//! 1. `OPTIONS *` for the root capabilities; without `LIST` there is nothing
//!    more to find
//! 2. `LIST *` for the root resource list
//! 3. `OPTIONS` for every listed resource, in list order
//!
//! Each result is committed to the [`ResourceCache`] as soon as it arrives,
//! so observers see the tree fill in. Children of a resource are only
//! requested on demand through [`fetch_children`](Discovery::fetch_children).
//!
//! Every request is a suspension point after which the connection may be
//! gone. A discovery carries a liveness token that is checked atomically with
//! each commit: once cancelled, requests already in flight still complete but
//! their results are dropped, and no further requests are issued.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    cache::{ResourceCache, ResourceInfo},
    error::Result,
    protocol::{Method, ROOT_URI},
    transport::Transport,
};

#[derive(Clone)]
pub struct Discovery {
    transport: Arc<dyn Transport>,
    cache: Arc<ResourceCache>,
    liveness: CancellationToken,
}

impl Discovery {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<ResourceCache>,
        liveness: CancellationToken,
    ) -> Self {
        Self {
            transport,
            cache,
            liveness,
        }
    }

    /// Stops this discovery from committing anything further.
    pub fn cancel(&self) {
        self.liveness.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.liveness.is_cancelled()
    }

    /// Performs one discovery run.
    ///
    /// Failures are logged and end the run. Whatever was committed before
    /// the failure stays in the cache; nothing is retried.
    pub async fn run(&self) {
        let url = self.transport.url();
        match self.discover().await {
            Ok(()) if self.is_cancelled() => debug!("discovery of {url} superseded"),
            Ok(()) => info!(
                "discovered {} resources on {url}",
                self.cache.snapshot().resources().count()
            ),
            Err(e) if self.is_cancelled() => debug!("discovery of {url} superseded: {e}"),
            Err(e) => error!("discovery of {url} failed: {e}"),
        }
    }

    async fn discover(&self) -> Result<()> {
        if self.is_cancelled() {
            return Ok(());
        }

        let root_capabilities = self.transport.options(ROOT_URI).await?;
        trace!("{ROOT_URI} supports: {root_capabilities}");

        let can_list = root_capabilities.contains(&Method::List);
        if !self.cache.commit(&self.liveness, |contents| {
            contents.set_root_capabilities(root_capabilities);
            true
        }) {
            return Ok(());
        }

        if !can_list {
            debug!("server does not support {}; not listing", Method::List);
            return Ok(());
        }

        let root_list = self.transport.list(ROOT_URI).await?;
        trace!("{ROOT_URI} lists: {root_list:?}");

        let uris: Vec<String> = root_list.uris().map(str::to_owned).collect();
        if !self.cache.commit(&self.liveness, |contents| {
            contents.set_root_list(root_list);
            true
        }) {
            return Ok(());
        }

        for uri in uris {
            let capabilities = self.transport.options(&uri).await?;
            trace!("{uri} supports: {capabilities}");

            if !self.cache.commit(&self.liveness, |contents| {
                contents.insert(&uri, ResourceInfo::new(capabilities));
                true
            }) {
                return Ok(());
            }
        }

        Ok(())
    }

    /// Requests the children of `uri` and stores them in its
    /// [`ResourceInfo`].
    ///
    /// Does nothing when `uri` was not discovered, or when this discovery was
    /// cancelled. While a request for `uri` is in flight, further calls for
    /// it return immediately rather than issuing another one.
    ///
    /// The `fetching` flag is raised and lowered in separate commits, so
    /// observers can show progress. On failure the previous children are
    /// kept.
    pub async fn fetch_children(&self, uri: &str) {
        let started = self.cache.commit(&self.liveness, |contents| {
            match contents.resource_mut(uri) {
                Some(info) if info.fetching => {
                    debug!("already fetching children of {uri}");
                    false
                }
                Some(info) => {
                    info.fetching = true;
                    true
                }
                None => {
                    debug!("not fetching children of unknown resource {uri}");
                    false
                }
            }
        });

        if !started {
            return;
        }

        let result = self.transport.list(uri).await;
        let children = match result {
            Ok(children) => {
                trace!("{uri} lists: {children:?}");
                Some(children)
            }
            Err(e) if self.is_cancelled() => {
                debug!("listing {uri} superseded: {e}");
                None
            }
            Err(e) => {
                error!("listing {uri} failed: {e}");
                None
            }
        };

        self.cache.commit(&self.liveness, |contents| {
            let Some(info) = contents.resource_mut(uri) else {
                return false;
            };

            info.fetching = false;
            if let Some(children) = children {
                info.children = children;
            }
            true
        });
    }
}
