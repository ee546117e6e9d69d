//! Client-side session management for streaming servers.
//!
//! Connects to a server, discovers the resources it offers, caches what is
//! known about them, and drives playback of one selected streamer through
//! its connection states.
//!
//! # Modules
//!
//! * [`connection`] - the [`Manager`](connection::Manager) owning the
//!   connection and tying everything to its lifecycle
//! * [`discovery`] - walking the server's resource tree
//! * [`cache`] - versioned snapshots of discovered resources
//! * [`playback`] - playback incarnations and their observable status
//! * [`transport`] and [`player`] - the collaborators this crate drives
//!   without knowing their protocols
//! * [`protocol`] - methods, capability sets and resource lists
//! * [`config`] - server and ICE configuration
//! * [`events`] - connection lifecycle notifications
//! * [`error`] - categorised errors
//!
//! Logging goes through the `log` facade; pick any logger implementation.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

#[macro_use]
extern crate log;

pub mod cache;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod events;
pub mod playback;
pub mod player;
pub mod protocol;
pub mod transport;
pub mod uuid;
