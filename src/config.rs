//! Session configuration.
//!
//! A [`Config`] names the server to connect to and the ICE servers players
//! negotiate media through. It can be built in code with [`Config::new`] or
//! loaded from a TOML file:
//!
//! ```toml
//! url = "wss://streamer.local:5554/"
//!
//! [[ice_servers]]
//! urls = ["stun:stun.l.google.com:19302"]
//!
//! [[ice_servers]]
//! urls = ["turn:turn.example.com:3478"]
//! username = "user"
//! credential = "secret"
//! ```

use std::{fs, path::Path, str::FromStr};

use serde::Deserialize;
use url::Url;

use crate::{
    error::{Error, Result},
    uuid::Uuid,
};

/// STUN server used when the configuration names none.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// One ICE server entry as handed to players.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServer {
    const SCHEMES: [&'static str; 4] = ["stun", "stuns", "turn", "turns"];

    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.urls.is_empty() {
            return Err(Error::invalid_argument("ice server without urls"));
        }

        for url in &self.urls {
            let scheme = url.split_once(':').map_or("", |(scheme, _)| scheme);
            if !Self::SCHEMES.contains(&scheme) {
                return Err(Error::invalid_argument(format!(
                    "ice server url \"{url}\" should use one of {:?}",
                    Self::SCHEMES
                )));
            }
        }

        Ok(())
    }
}

impl Default for IceServer {
    fn default() -> Self {
        Self::new(DEFAULT_STUN_SERVER)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    /// Identifies this client instance to the server and in logs.
    pub client_id: Uuid,

    /// Server to connect to. Changing it means a new connection.
    pub url: Url,

    pub ice_servers: Vec<IceServer>,
}

/// The on-disk form of [`Config`].
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct File {
    url: String,
    #[serde(default)]
    client_id: Option<Uuid>,
    #[serde(default)]
    ice_servers: Option<Vec<IceServer>>,
}

impl Config {
    /// Upper bound on configuration file size. Anything bigger is not a
    /// configuration file, and reading it whole could exhaust memory.
    const MAX_FILE_SIZE: u64 = 64 * 1024;

    const URL_SCHEMES: [&'static str; 6] = ["ws", "wss", "http", "https", "rtsp", "rtsps"];

    /// Creates a configuration for `url` with the default ICE servers and a
    /// fresh client id.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error if the URL scheme is not one a
    /// streaming server is reachable through.
    pub fn new(url: Url) -> Result<Self> {
        Self::validate_url(&url)?;

        let client_id = Uuid::fast_v4();
        trace!("client id: {client_id}");

        Ok(Self {
            app_name: env!("CARGO_PKG_NAME").to_owned(),
            app_version: env!("CARGO_PKG_VERSION").to_owned(),
            client_id,
            url,
            ice_servers: vec![IceServer::default()],
        })
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is larger than 64 KiB, or
    /// does not hold a valid configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::invalid_argument(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        contents.parse::<Self>().inspect(|config| {
            debug!("loaded configuration for {} from {}", config.url, path.display());
        })
    }

    /// Points the configuration at another server.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error, leaving the configuration as it
    /// was, if `url` is not usable.
    pub fn set_url(&mut self, url: Url) -> Result<()> {
        Self::validate_url(&url)?;
        self.url = url;
        Ok(())
    }

    fn validate_url(url: &Url) -> Result<()> {
        if !Self::URL_SCHEMES.contains(&url.scheme()) {
            return Err(Error::invalid_argument(format!(
                "server url \"{url}\" should use one of {:?}",
                Self::URL_SCHEMES
            )));
        }

        if !url.has_host() {
            return Err(Error::invalid_argument(format!(
                "server url \"{url}\" has no host"
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let file: File = toml::from_str(s)?;

        let mut config = Self::new(file.url.parse()?)?;
        if let Some(client_id) = file.client_id {
            config.client_id = client_id;
        }

        // An explicitly empty list disables ICE servers altogether, which is
        // valid on a local network.
        if let Some(ice_servers) = file.ice_servers {
            for server in &ice_servers {
                server.validate()?;
            }
            config.ice_servers = ice_servers;
        }

        Ok(config)
    }
}
