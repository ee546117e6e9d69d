//! Versioned cache of discovered resources.
//!
//! The cache holds the root capability set, the root resource list and one
//! [`ResourceInfo`] per resource found in that list. Every change produces a
//! new immutable [`Snapshot`] tagged with the next [`Revision`], published
//! through a `tokio::sync::watch` channel. Readers holding a snapshot keep a
//! consistent view no matter what discovery does in the meantime; readers
//! that want to follow along subscribe and wait for the next change.
//!
//! ```
//! let cache = ResourceCache::new();
//! let mut changes = cache.subscribe();
//!
//! // elsewhere, discovery commits results
//!
//! changes.changed().await?;
//! let snapshot = changes.borrow_and_update().clone();
//! for (uri, info) in snapshot.resources() {
//!     println!("{uri}: {}", info.capabilities);
//! }
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::protocol::{CapabilitySet, ResourceList};

/// Version of a [`Snapshot`].
///
/// Carries no meaning beyond "something changed": compare revisions for
/// equality, not order. The counter wraps to zero after
/// [`Revision::MAX`], the largest integer a double represents exactly, so it
/// survives a trip through JSON intact.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);

impl Revision {
    pub const MAX: u64 = (1 << 53) - 1;

    /// Creates a revision, clamping `value` to [`Revision::MAX`].
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value.min(Self::MAX))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn next(self) -> Self {
        if self.0 >= Self::MAX {
            Self(0)
        } else {
            Self(self.0 + 1)
        }
    }
}

/// What is known about one resource URI.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceInfo {
    /// A child list request is in flight.
    pub fetching: bool,
    pub capabilities: CapabilitySet,
    /// Empty until requested through `fetch_children`.
    pub children: ResourceList,
}

impl ResourceInfo {
    #[must_use]
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self {
            fetching: false,
            capabilities,
            children: ResourceList::new(),
        }
    }
}

/// An immutable view of the cache at one [`Revision`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    revision: Revision,
    root_capabilities: CapabilitySet,
    root_list: ResourceList,
    resources: IndexMap<String, ResourceInfo>,
}

impl Snapshot {
    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }

    #[must_use]
    pub fn root_capabilities(&self) -> &CapabilitySet {
        &self.root_capabilities
    }

    #[must_use]
    pub fn root_list(&self) -> &ResourceList {
        &self.root_list
    }

    #[must_use]
    pub fn resource(&self, uri: &str) -> Option<&ResourceInfo> {
        self.resources.get(uri)
    }

    /// Iterates over resources in discovery order.
    pub fn resources(&self) -> impl Iterator<Item = (&str, &ResourceInfo)> {
        self.resources.iter().map(|(uri, info)| (uri.as_str(), info))
    }

    /// Whether nothing but the revision is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root_capabilities.is_empty() && self.root_list.is_empty() && self.resources.is_empty()
    }
}

/// Mutable contents of a [`Snapshot`] under construction.
///
/// Handed to commit closures; the revision is bumped by the cache, never by
/// the closure.
pub(crate) struct Contents<'a>(&'a mut Snapshot);

impl Contents<'_> {
    pub(crate) fn set_root_capabilities(&mut self, capabilities: CapabilitySet) {
        self.0.root_capabilities = capabilities;
    }

    pub(crate) fn set_root_list(&mut self, list: ResourceList) {
        self.0.root_list = list;
    }

    pub(crate) fn insert(&mut self, uri: &str, info: ResourceInfo) {
        self.0.resources.insert(uri.to_owned(), info);
    }

    pub(crate) fn resource_mut(&mut self, uri: &str) -> Option<&mut ResourceInfo> {
        self.0.resources.get_mut(uri)
    }
}

/// Publishes [`Snapshot`]s of discovered resources.
///
/// One cache is created per manager and shared by reference with discovery
/// runs; it is never replaced, only reset.
#[derive(Debug)]
pub struct ResourceCache {
    tx: watch::Sender<Arc<Snapshot>>,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCache {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::default());
        Self { tx }
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.tx.borrow())
    }

    #[must_use]
    pub fn revision(&self) -> Revision {
        self.tx.borrow().revision
    }

    /// Subscribes to new snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    /// Clears everything, bumping the revision if anything was set.
    pub fn reset(&self) {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.is_empty() {
                return false;
            }

            let revision = snapshot.revision.next();
            *snapshot = Arc::new(Snapshot {
                revision,
                ..Snapshot::default()
            });
            trace!("cache reset at revision {}", revision.get());
            true
        });
    }

    /// Applies `update` and publishes the result under the next revision,
    /// unless `liveness` was cancelled.
    ///
    /// The liveness check and the update happen under the same lock that
    /// [`reset`](Self::reset) takes. A run cancelled before a reset can
    /// therefore never commit after it.
    ///
    /// `update` returns whether it changed anything. Returning `false`
    /// publishes nothing and leaves the revision alone; `update` must not
    /// have modified the contents in that case.
    ///
    /// Returns whether a new snapshot was published.
    pub(crate) fn commit<F>(&self, liveness: &CancellationToken, update: F) -> bool
    where
        F: FnOnce(&mut Contents<'_>) -> bool,
    {
        self.tx.send_if_modified(|current| {
            if liveness.is_cancelled() {
                return false;
            }

            let mut next = Snapshot::clone(&**current);
            if !update(&mut Contents(&mut next)) {
                return false;
            }

            next.revision = current.revision.next();
            *current = Arc::new(next);
            true
        })
    }
}
