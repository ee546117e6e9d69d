//! The media player collaborator and the state it reports.
//!
//! A [`Player`] negotiates media for one streamer over an established
//! [`Transport`] and renders it into a [`VideoSink`]. How it negotiates is its
//! own business; this crate starts it, stops it, and mirrors the
//! [`State`]s it reports.

use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{
    config::IceServer,
    error::{Error, Result},
    transport::Transport,
};

/// Connection state of a player's media session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl State {
    /// Whether `next` is a transition the media session nominally makes
    /// from this state.
    ///
    /// Players are the authority over their own state, so reports outside
    /// this graph are applied anyway. This only serves diagnostics.
    #[must_use]
    pub fn can_transition_to(self, next: State) -> bool {
        use State::{Closed, Connected, Connecting, Disconnected, Failed, New};
        matches!(
            (self, next),
            (New, Connecting)
                | (Connecting, Connected | Failed)
                | (Connected, Disconnected)
                | (Disconnected, Connected)
                | (Connected | Disconnected, Closed)
                | (Closed, New)
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the lowercase names media stacks report states with.
impl FromStr for State {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(Self::New),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "disconnected" => Ok(Self::Disconnected),
            "failed" => Ok(Self::Failed),
            "closed" => Ok(Self::Closed),
            _ => Err(Error::invalid_argument(format!(
                "unknown connection state \"{s}\""
            ))),
        }
    }
}

/// Notifications from a [`VideoSink`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SinkEvent {
    /// The first frame is ready to be presented.
    CanPlay,
}

/// Where a player renders video.
pub trait VideoSink: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<SinkEvent>;
}

/// A media session for one streamer.
#[async_trait]
pub trait Player: Send + Sync {
    /// Negotiates and starts the media session.
    async fn play(&self) -> Result<()>;

    /// Stops the media session. Must be safe to call in any state.
    fn stop(&self);

    /// Subscribes to connection state changes.
    fn subscribe(&self) -> broadcast::Receiver<State>;
}

/// Everything a player is constructed from.
#[derive(Clone)]
pub struct Binding {
    pub transport: Arc<dyn Transport>,
    pub ice_servers: Vec<IceServer>,
    pub streamer_id: String,
    pub sink: Arc<dyn VideoSink>,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("url", self.transport.url())
            .field("ice_servers", &self.ice_servers)
            .field("streamer_id", &self.streamer_id)
            .finish_non_exhaustive()
    }
}

/// Creates a [`Player`] for every playback incarnation.
pub trait PlayerFactory: Send + Sync {
    fn create(&self, binding: Binding) -> Arc<dyn Player>;
}

impl<F> PlayerFactory for F
where
    F: Fn(Binding) -> Arc<dyn Player> + Send + Sync,
{
    fn create(&self, binding: Binding) -> Arc<dyn Player> {
        self(binding)
    }
}
