//! Lifecycle notifications emitted by a [`Transport`].
//!
//! A transport announces when its connection to the server comes up and
//! when it goes away, for whatever reason: a refused connection, a dropped
//! socket or an orderly disconnect all end in [`Event::Disconnected`]. No
//! error travels with it; connection failures are only ever observable as a
//! disconnection.
//!
//! # Example
//!
//! ```rust
//! use streamer_session::events::Event;
//!
//! fn handle_event(event: Event) {
//!     match event {
//!         Event::Connected => println!("server reachable"),
//!         Event::Disconnected => println!("server gone"),
//!     }
//! }
//! ```
//!
//! [`Transport`]: crate::transport::Transport

/// Connection lifecycle events.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// The connection is established and requests can be made.
    ///
    /// Every `Connected` starts a new discovery run.
    Connected,

    /// The connection was lost or closed.
    ///
    /// Cached resources are cleared before anyone else hears of it.
    Disconnected,
}
