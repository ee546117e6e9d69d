//! Identifiers for clients and playback incarnations.
//!
//! Every manager carries a client id, and every playback incarnation gets a
//! fresh id when it starts. Neither needs to be unguessable; they only tell
//! instances apart in logs and in [`Status`](crate::playback::Status)
//! comparisons. [`Uuid::fast_v4`] therefore draws from `fastrand` rather
//! than the operating system's entropy source.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A version 4 UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Uuid(pub uuid::Uuid);

impl Uuid {
    /// Generates a random version 4 UUID.
    #[must_use]
    pub fn fast_v4() -> Self {
        let bytes = fastrand::u128(..).to_ne_bytes();
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }
}

/// Formats hyphenated, as configuration files and logs carry it.
impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

/// Parses a client id given in any of the usual notations.
impl FromStr for Uuid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
