//! Scriptable collaborators for integration tests.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch, Notify};
use url::Url;

use streamer_session::{
    config::Config,
    error::{Error, Result},
    events::Event,
    player::{Binding, Player, PlayerFactory, SinkEvent, State, VideoSink},
    protocol::{CapabilitySet, ResourceList},
    transport::Transport,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn config() -> Config {
    Config::new("wss://streamer.local/".parse().unwrap()).unwrap()
}

/// Waits until `rx` holds a value matching `predicate` and returns it.
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, predicate: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(TIMEOUT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for value")
        .expect("sender dropped")
        .clone()
}

/// Lets spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// A transport answering from scripted responses.
///
/// Requests are logged as `"METHOD uri"`. A held request blocks until
/// released, which lets tests interleave teardown with in-flight requests.
pub struct MockTransport {
    url: Url,
    events: Mutex<Option<broadcast::Sender<Event>>>,
    auto_connect: bool,
    fail_connect: AtomicBool,
    fail_disconnect: AtomicBool,
    options: Mutex<HashMap<String, CapabilitySet>>,
    lists: Mutex<HashMap<String, ResourceList>>,
    held: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<Vec<String>>,
    disconnects: AtomicUsize,
}

impl MockTransport {
    pub fn new(url: Url) -> Arc<Self> {
        Self::build(url, true)
    }

    /// A transport that does not announce `Connected` by itself.
    pub fn manual(url: Url) -> Arc<Self> {
        Self::build(url, false)
    }

    fn build(url: Url, auto_connect: bool) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            url,
            events: Mutex::new(Some(events)),
            auto_connect,
            fail_connect: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
            options: Mutex::default(),
            lists: Mutex::default(),
            held: Mutex::default(),
            calls: Mutex::default(),
            disconnects: AtomicUsize::new(0),
        })
    }

    pub fn with_options(&self, uri: &str, options: &str) -> &Self {
        self.options
            .lock()
            .unwrap()
            .insert(uri.to_owned(), options.parse().unwrap());
        self
    }

    pub fn with_list(&self, uri: &str, list: &str) -> &Self {
        self.lists
            .lock()
            .unwrap()
            .insert(uri.to_owned(), list.parse().unwrap());
        self
    }

    /// A server with two resources `a` and `b` below a listable root.
    pub fn with_two_resources(&self) -> &Self {
        self.with_options("*", "OPTIONS, LIST")
            .with_list("*", "a: A\nb: B")
            .with_options("a", "OPTIONS, DESCRIBE, PLAY, LIST")
            .with_options("b", "OPTIONS, DESCRIBE, PLAY")
    }

    /// Makes every further `LIST uri` fail.
    pub fn fail_list(&self, uri: &str) {
        self.lists.lock().unwrap().remove(uri);
    }

    pub fn fail_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    pub fn fail_disconnect(&self) {
        self.fail_disconnect.store(true, Ordering::SeqCst);
    }

    /// Holds the next `call` until [`release`](Self::release)d.
    pub fn hold(&self, call: &str) {
        self.held
            .lock()
            .unwrap()
            .insert(call.to_owned(), Arc::new(Notify::new()));
    }

    pub fn release(&self, call: &str) {
        if let Some(gate) = self.held.lock().unwrap().remove(call) {
            gate.notify_one();
        }
    }

    pub fn emit(&self, event: Event) {
        if let Some(events) = &*self.events.lock().unwrap() {
            let _ = events.send(event);
        }
    }

    /// Drops the event sender, closing every subscription.
    pub fn close_events(&self) {
        self.events.lock().unwrap().take();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Waits until `call` was issued at least once.
    pub async fn wait_for_call(&self, call: &str) {
        tokio::time::timeout(TIMEOUT, async {
            while self.count(call) == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("timed out waiting for call");
    }

    async fn request(&self, call: String) {
        let gate = self.held.lock().unwrap().get(&call).cloned();
        self.calls.lock().unwrap().push(call);
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn url(&self) -> &Url {
        &self.url
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        match &*self.events.lock().unwrap() {
            Some(events) => events.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    async fn connect(&self) -> Result<()> {
        self.calls.lock().unwrap().push("CONNECT".to_owned());
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::unavailable("connection refused"));
        }
        if self.auto_connect {
            self.emit(Event::Connected);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.calls.lock().unwrap().push("DISCONNECT".to_owned());
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(Error::aborted("connection reset"));
        }
        Ok(())
    }

    async fn options(&self, uri: &str) -> Result<CapabilitySet> {
        self.request(format!("OPTIONS {uri}")).await;
        self.options
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no options for {uri}")))
    }

    async fn list(&self, uri: &str) -> Result<ResourceList> {
        self.request(format!("LIST {uri}")).await;
        self.lists
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no list for {uri}")))
    }
}

pub struct MockPlayer {
    pub streamer_id: String,
    pub ice_servers: usize,
    states: broadcast::Sender<State>,
    play_gate: Option<Arc<Notify>>,
    fail_play: bool,
    plays: AtomicUsize,
    stops: AtomicUsize,
}

impl MockPlayer {
    pub fn emit(&self, state: State) {
        let _ = self.states.send(state);
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Player for MockPlayer {
    async fn play(&self) -> Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.play_gate {
            gate.notified().await;
        }
        if self.fail_play {
            return Err(Error::deadline_exceeded("ice negotiation timed out"));
        }
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn subscribe(&self) -> broadcast::Receiver<State> {
        self.states.subscribe()
    }
}

/// Creates [`MockPlayer`]s and keeps them for inspection.
#[derive(Default)]
pub struct MockPlayers {
    created: Mutex<Vec<Arc<MockPlayer>>>,
    fail_play: AtomicBool,
    play_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockPlayers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Players created from now on reject `play()`.
    pub fn fail_play(&self) {
        self.fail_play.store(true, Ordering::SeqCst);
    }

    /// Players created from now on block in `play()` until the returned
    /// gate is notified.
    pub fn hold_play(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.play_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn created(&self) -> Vec<Arc<MockPlayer>> {
        self.created.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<MockPlayer> {
        self.created().pop().expect("no player created")
    }
}

impl PlayerFactory for MockPlayers {
    fn create(&self, binding: Binding) -> Arc<dyn Player> {
        let (states, _) = broadcast::channel(16);
        let player = Arc::new(MockPlayer {
            streamer_id: binding.streamer_id,
            ice_servers: binding.ice_servers.len(),
            states,
            play_gate: self.play_gate.lock().unwrap().clone(),
            fail_play: self.fail_play.load(Ordering::SeqCst),
            plays: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        });
        self.created.lock().unwrap().push(Arc::clone(&player));
        player
    }
}

pub struct MockSink {
    events: broadcast::Sender<SinkEvent>,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self { events })
    }

    pub fn can_play(&self) {
        let _ = self.events.send(SinkEvent::CanPlay);
    }
}

impl VideoSink for MockSink {
    fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.events.subscribe()
    }
}
