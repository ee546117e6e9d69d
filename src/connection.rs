//! Connection lifecycle management.
//!
//! The [`Manager`] owns the single connection to the configured server and
//! ties everything else to its lifecycle:
//!
//! * on [`Event::Connected`] it starts a [`Discovery`] run and binds
//!   playback to the connection
//! * on [`Event::Disconnected`] it cancels discovery, resets the
//!   [`ResourceCache`] *before* publishing the new [`ConnectionState`], and
//!   tears down playback
//!
//! Connection failures never surface as errors. They are logged and show up
//! as a transition to [`ConnectionState::Disconnected`].
//!
//! # Example
//!
//! ```rust
//! let mut manager = Manager::new(config, connector, players, sink);
//! manager.connect().await;
//!
//! let mut cache = manager.subscribe_cache();
//! cache.changed().await?;
//! for (uri, info) in cache.borrow_and_update().resources() {
//!     println!("{uri}: {}", info.capabilities);
//! }
//!
//! manager.select("cam1");
//! ```

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    cache::{ResourceCache, Snapshot},
    config::Config,
    discovery::Discovery,
    error::Result,
    events::Event,
    playback::{Playback, Status},
    player::{PlayerFactory, VideoSink},
    transport::{Connector, Transport},
};

/// State of the connection to the server.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// State shared with the task that handles transport events.
struct Shared {
    cache: Arc<ResourceCache>,
    state: watch::Sender<ConnectionState>,
    discovery: Mutex<Option<Discovery>>,
    playback: Mutex<Playback>,
}

/// Locks `mutex`, recovering the data when a panicking holder poisoned it.
/// Nothing guarded here is left half-updated by a panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Handles `Connected` for the connection scoped by `liveness`.
    ///
    /// Both transition handlers run under the discovery lock, and this one
    /// bails out once `liveness` is cancelled. A manager tearing the scope
    /// down concurrently thus either undoes a completed transition or
    /// prevents it.
    fn on_connected(&self, transport: &Arc<dyn Transport>, liveness: &CancellationToken) {
        let mut current = lock(&self.discovery);
        if liveness.is_cancelled() {
            return;
        }

        info!("connected to {}", transport.url());

        // A repeated `Connected` without `Disconnected` in between supersedes
        // the previous run. Clear its results before the new run commits.
        if let Some(previous) = current.take() {
            previous.cancel();
            self.cache.reset();
        }

        let discovery = Discovery::new(
            Arc::clone(transport),
            Arc::clone(&self.cache),
            liveness.child_token(),
        );
        *current = Some(discovery.clone());

        self.state.send_replace(ConnectionState::Connected);
        tokio::spawn(async move { discovery.run().await });

        lock(&self.playback).bind(Arc::clone(transport));
    }

    fn on_disconnected(&self) {
        let mut current = lock(&self.discovery);
        if let Some(discovery) = current.take() {
            discovery.cancel();
        }

        // Reset before anyone hears of the disconnection, so that nobody
        // reads stale resources after it.
        self.cache.reset();

        let previous = self.state.send_replace(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            info!("disconnected");
        }

        lock(&self.playback).unbind();
    }

    async fn handle_events(
        self: Arc<Self>,
        transport: Arc<dyn Transport>,
        mut events: broadcast::Receiver<Event>,
        liveness: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                () = liveness.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Ok(Event::Connected) => self.on_connected(&transport, &liveness),
                Ok(Event::Disconnected) => self.on_disconnected(),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The latest events still follow; only the intermediate
                    // ones are lost.
                    warn!("missed {skipped} connection events");
                }
                // The scope stays with the manager until the next `connect`
                // or `disconnect`, which replace or release the transport.
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("transport closed its event channel");
                    self.on_disconnected();
                    break;
                }
            }
        }
    }
}

/// The transport of the current connection and everything scoped to it.
struct Scope {
    transport: Arc<dyn Transport>,
    liveness: CancellationToken,
    events: JoinHandle<()>,
}

impl Scope {
    /// Stops handling events and cancels everything derived from this scope.
    fn close(&self) {
        self.liveness.cancel();
        self.events.abort();
    }
}

/// Owns the connection to one server and the state derived from it.
pub struct Manager {
    config: Config,
    connector: Box<dyn Connector>,
    shared: Arc<Shared>,
    scope: Option<Scope>,
}

impl Manager {
    #[must_use]
    pub fn new<C>(
        config: Config,
        connector: C,
        players: Arc<dyn PlayerFactory>,
        sink: Arc<dyn VideoSink>,
    ) -> Self
    where
        C: Connector + 'static,
    {
        let (state, _) = watch::channel(ConnectionState::default());
        let playback = Playback::new(players, sink, config.ice_servers.clone());

        Self {
            config,
            connector: Box::new(connector),
            shared: Arc::new(Shared {
                cache: Arc::new(ResourceCache::new()),
                state,
                discovery: Mutex::new(None),
                playback: Mutex::new(playback),
            }),
            scope: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.config.url
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// The transport of the current connection, if one is up.
    #[must_use]
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        if self.is_connected() {
            self.scope.as_ref().map(|scope| Arc::clone(&scope.transport))
        } else {
            None
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ResourceCache {
        &self.shared.cache
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.cache.snapshot()
    }

    #[must_use]
    pub fn subscribe_cache(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.shared.cache.subscribe()
    }

    /// Starts connecting to the configured server.
    ///
    /// Returns once the attempt is under way; the connection is up when the
    /// state turns [`ConnectionState::Connected`]. Does nothing while a
    /// connection exists or is being established. A transport that reported
    /// losing its connection is replaced by a fresh one.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn connect(&mut self) {
        if self.scope.is_some() {
            if self.state() != ConnectionState::Disconnected {
                debug!("already {} to {}", self.state(), self.config.url);
                return;
            }

            debug!("connection to {} was lost; reconnecting", self.config.url);
            self.disconnect().await;
        }

        let transport = self.connector.open(&self.config);
        let events = transport.subscribe();
        let liveness = CancellationToken::new();

        self.shared.state.send_replace(ConnectionState::Connecting);
        info!("connecting to {}", self.config.url);

        let task = tokio::spawn(Arc::clone(&self.shared).handle_events(
            Arc::clone(&transport),
            events,
            liveness.clone(),
        ));
        self.scope = Some(Scope {
            transport: Arc::clone(&transport),
            liveness,
            events: task,
        });

        if let Err(e) = transport.connect().await {
            error!("connecting to {} failed: {e}", self.config.url);
            self.disconnect().await;
        }
    }

    /// Tears the connection down, whatever phase it is in.
    ///
    /// Discovery is cancelled and the cache cleared before the transport is
    /// told to disconnect. A failing disconnect is logged and otherwise
    /// ignored: there is nothing left to act on.
    pub async fn disconnect(&mut self) {
        let Some(scope) = self.scope.take() else {
            return;
        };

        scope.close();
        self.shared.on_disconnected();

        if let Err(e) = scope.transport.disconnect().await {
            debug!("ignoring failure to disconnect from {}: {e}", scope.transport.url());
        }
    }

    /// Switches to another server.
    ///
    /// The old connection is torn down before the new one is opened. Does
    /// nothing when `url` is the current one.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error, and keeps the current connection,
    /// when `url` is not a usable server url.
    pub async fn set_url(&mut self, url: Url) -> Result<()> {
        if url == self.config.url {
            return Ok(());
        }

        let mut config = self.config.clone();
        config.set_url(url)?;

        let reconnect = self.scope.is_some();
        self.disconnect().await;
        self.config = config;
        if reconnect {
            self.connect().await;
        }

        Ok(())
    }

    /// Requests the children of `uri`. Does nothing while disconnected or
    /// when `uri` is unknown.
    pub async fn fetch_children(&self, uri: &str) {
        let discovery = lock(&self.shared.discovery).clone();
        match discovery {
            Some(discovery) => discovery.fetch_children(uri).await,
            None => debug!("not connected; not fetching children of {uri}"),
        }
    }

    /// Selects a streamer for playback. Playback starts now if connected,
    /// or as soon as the connection comes up. Callable from any thread.
    pub fn select(&self, streamer_id: impl Into<String>) {
        lock(&self.shared.playback).select(streamer_id);
    }

    pub fn deselect(&self) {
        lock(&self.shared.playback).deselect();
    }

    /// Restarts playback of the selected streamer in a new incarnation.
    pub fn restart(&self) {
        lock(&self.shared.playback).restart();
    }

    #[must_use]
    pub fn playback(&self) -> Status {
        lock(&self.shared.playback).status()
    }

    #[must_use]
    pub fn subscribe_playback(&self) -> watch::Receiver<Status> {
        lock(&self.shared.playback).subscribe()
    }
}

/// Tears the connection down on scope exit. The transport's disconnect is
/// spawned onto the current runtime, if any, and its outcome ignored.
impl Drop for Manager {
    fn drop(&mut self) {
        let Some(scope) = self.scope.take() else {
            return;
        };

        scope.close();
        self.shared.on_disconnected();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let transport = scope.transport;
                handle.spawn(async move {
                    if let Err(e) = transport.disconnect().await {
                        debug!("ignoring failure to disconnect from {}: {e}", transport.url());
                    }
                });
            }
            Err(_) => debug!("no runtime to disconnect from {} on", scope.transport.url()),
        }
    }
}
