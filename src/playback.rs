//! Playback of one selected streamer.
//!
//! [`Playback`] binds the selected streamer id to a [`Player`] on the current
//! connection and mirrors the player's [`State`] into an observable
//! [`Status`]. Each player lifetime is an *incarnation*: it begins at
//! [`State::New`] when the streamer is selected, the connection comes up or
//! [`restart`](Playback::restart) is called, and ends at teardown. An
//! incarnation that reached [`State::Closed`] stays closed; restarting
//! creates a new one with a new player.
//!
//! Teardown is unconditional: the player is stopped exactly once, the
//! observed state is cleared and all notification listeners are detached,
//! whatever state the player was in and even while `play()` is still in
//! flight. Notifications racing with teardown are dropped by a liveness
//! token that is checked under the status lock.

use std::{fmt, sync::Arc};

use tokio::{
    runtime::Handle,
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::IceServer,
    player::{Binding, Player, PlayerFactory, SinkEvent, State, VideoSink},
    transport::Transport,
    uuid::Uuid,
};

/// Observable playback status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    /// Selected streamer, if any.
    pub streamer_id: Option<String>,

    /// Last state reported for the current incarnation. `None` while no
    /// incarnation runs.
    pub state: Option<State>,

    /// The video sink has a frame to present.
    pub can_play: bool,

    /// Identifies the current incarnation.
    pub incarnation: Option<Uuid>,
}

impl Status {
    /// No streamer is selected.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.streamer_id.is_none()
    }

    /// The media session is being set up or recovering.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(
            self.state,
            Some(State::New | State::Connecting | State::Disconnected)
        )
    }

    /// The media session got far enough to have produced video.
    #[must_use]
    pub fn is_playing_eligible(&self) -> bool {
        matches!(
            self.state,
            Some(State::Connected | State::Disconnected | State::Closed)
        )
    }

    /// The incarnation has closed and can only be resumed by a restart.
    #[must_use]
    pub fn can_restart(&self) -> bool {
        self.state == Some(State::Closed)
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state == Some(State::Failed)
    }

    /// Whether video should be shown: the session is playing-eligible and
    /// the sink has a frame.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.is_playing_eligible() && self.can_play
    }
}

struct Incarnation {
    id: Uuid,
    player: Arc<dyn Player>,
    liveness: CancellationToken,
    listeners: Vec<JoinHandle<()>>,
}

/// Drives playback of the selected streamer.
pub struct Playback {
    players: Arc<dyn PlayerFactory>,
    sink: Arc<dyn VideoSink>,
    ice_servers: Vec<IceServer>,

    transport: Option<Arc<dyn Transport>>,
    runtime: Option<Handle>,
    incarnation: Option<Incarnation>,
    status: Arc<watch::Sender<Status>>,
}

impl Playback {
    #[must_use]
    pub fn new(
        players: Arc<dyn PlayerFactory>,
        sink: Arc<dyn VideoSink>,
        ice_servers: Vec<IceServer>,
    ) -> Self {
        let (status, _) = watch::channel(Status::default());
        Self {
            players,
            sink,
            ice_servers,
            transport: None,
            runtime: None,
            incarnation: None,
            status: Arc::new(status),
        }
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.transport.is_some()
    }

    /// Binds to a live connection, starting playback if a streamer is
    /// selected.
    ///
    /// Incarnations are spawned onto the runtime this is called from, so
    /// that [`select`](Self::select) and [`restart`](Self::restart) work
    /// from any thread afterwards.
    pub fn bind(&mut self, transport: Arc<dyn Transport>) {
        self.teardown();
        self.transport = Some(transport);
        self.runtime = Handle::try_current().ok();
        self.start();
    }

    /// Releases the connection, tearing down any running incarnation. The
    /// selection is kept for the next [`bind`](Self::bind).
    pub fn unbind(&mut self) {
        self.teardown();
        self.transport = None;
        self.runtime = None;
    }

    /// Selects `streamer_id` for playback. Selecting the streamer that is
    /// already selected changes nothing; use [`restart`](Self::restart) for
    /// that.
    pub fn select(&mut self, streamer_id: impl Into<String>) {
        let streamer_id = streamer_id.into();
        if self.status.borrow().streamer_id.as_deref() == Some(streamer_id.as_str()) {
            return;
        }

        self.teardown();
        debug!("selected streamer {streamer_id}");
        self.status.send_modify(|status| status.streamer_id = Some(streamer_id));
        self.start();
    }

    /// Deselects the streamer and tears down its playback.
    pub fn deselect(&mut self) {
        self.teardown();
        self.status.send_if_modified(|status| status.streamer_id.take().is_some());
    }

    /// Replaces the current incarnation with a new one, starting at
    /// [`State::New`].
    ///
    /// Does nothing when no streamer is selected or no connection is bound.
    pub fn restart(&mut self) {
        if self.status.borrow().streamer_id.is_none() || self.transport.is_none() {
            debug!("nothing to restart");
            return;
        }

        self.teardown();
        self.start();
    }

    fn start(&mut self) {
        let Some(transport) = self.transport.clone() else {
            return;
        };
        let Some(streamer_id) = self.status.borrow().streamer_id.clone() else {
            return;
        };
        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            error!("cannot start playback of {streamer_id} outside a tokio runtime");
            return;
        };

        let id = Uuid::fast_v4();
        let liveness = CancellationToken::new();
        debug!("starting playback incarnation {id} of {streamer_id}");

        self.status.send_modify(|status| {
            status.state = Some(State::New);
            status.can_play = false;
            status.incarnation = Some(id);
        });

        // Subscribe before playing so that no early notification is missed.
        let sink_events = self.sink.subscribe();
        let player = self.players.create(Binding {
            transport,
            ice_servers: self.ice_servers.clone(),
            streamer_id: streamer_id.clone(),
            sink: Arc::clone(&self.sink),
        });
        let states = player.subscribe();
        let tag = Tag { streamer_id, id };

        let listeners = vec![
            runtime.spawn(mirror_states(
                Arc::clone(&self.status),
                states,
                tag.clone(),
                liveness.clone(),
            )),
            runtime.spawn(watch_sink(
                Arc::clone(&self.status),
                sink_events,
                liveness.clone(),
            )),
        ];

        // Not a listener: an in-flight `play()` is left to finish on its own
        // after teardown, and its outcome discarded.
        runtime.spawn(play(
            Arc::clone(&player),
            Arc::clone(&self.status),
            tag,
            liveness.clone(),
        ));

        self.incarnation = Some(Incarnation {
            id,
            player,
            liveness,
            listeners,
        });
    }

    fn teardown(&mut self) {
        if let Some(incarnation) = self.incarnation.take() {
            debug!("tearing down playback incarnation {}", incarnation.id);

            incarnation.liveness.cancel();
            for listener in incarnation.listeners {
                listener.abort();
            }
            incarnation.player.stop();
        }

        self.status.send_if_modified(|status| {
            let modified =
                status.state.is_some() || status.can_play || status.incarnation.is_some();
            status.state = None;
            status.can_play = false;
            status.incarnation = None;
            modified
        });
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Names an incarnation in logs.
#[derive(Clone)]
struct Tag {
    streamer_id: String,
    id: Uuid,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (incarnation {})", self.streamer_id, self.id)
    }
}

/// Applies `update` unless the incarnation it belongs to was torn down.
fn update_if_live<F>(status: &watch::Sender<Status>, liveness: &CancellationToken, update: F)
where
    F: FnOnce(&mut Status) -> bool,
{
    status.send_if_modified(|status| !liveness.is_cancelled() && update(status));
}

async fn play(
    player: Arc<dyn Player>,
    status: Arc<watch::Sender<Status>>,
    tag: Tag,
    liveness: CancellationToken,
) {
    if let Err(e) = player.play().await {
        if liveness.is_cancelled() {
            debug!("playing {tag} failed after teardown: {e}");
            return;
        }

        error!("playing {tag} failed: {e}");
        update_if_live(&status, &liveness, |status| {
            status.state = Some(State::Failed);
            true
        });
    }
}

async fn mirror_states(
    status: Arc<watch::Sender<Status>>,
    mut states: broadcast::Receiver<State>,
    tag: Tag,
    liveness: CancellationToken,
) {
    loop {
        let state = tokio::select! {
            biased;
            () = liveness.cancelled() => break,
            state = states.recv() => state,
        };

        match state {
            Ok(state) => update_if_live(&status, &liveness, |status| {
                match status.state {
                    Some(previous) if !previous.can_transition_to(state) => {
                        debug!("player of {tag} went from {previous} to {state}");
                    }
                    _ => trace!("player of {tag}: {state}"),
                }
                if state == State::Failed {
                    warn!("player of {tag} reported failure");
                }

                let modified = status.state != Some(state);
                status.state = Some(state);
                modified
            }),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("missed {skipped} player state changes of {tag}");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn watch_sink(
    status: Arc<watch::Sender<Status>>,
    mut events: broadcast::Receiver<SinkEvent>,
    liveness: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = liveness.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(SinkEvent::CanPlay) => update_if_live(&status, &liveness, |status| {
                let modified = !status.can_play;
                status.can_play = true;
                modified
            }),
            // Readiness is idempotent; a lagged receiver only missed repeats.
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
