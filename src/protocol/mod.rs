//! Protocol types shared by the transport, the cache and discovery.
//!
//! The wire exchange itself belongs to the [`Transport`] implementation. This
//! module only defines what comes out of it:
//!
//! * [`Method`] - request methods a server may advertise
//! * [`CapabilitySet`] - the methods one resource URI supports
//! * [`ResourceList`] - resource URIs with their descriptions
//!
//! Both collection types parse from the textual forms servers commonly use,
//! which saves transports from re-implementing them:
//!
//! ```
//! use streamer_session::protocol::{CapabilitySet, Method, ResourceList};
//!
//! let options: CapabilitySet = "OPTIONS, LIST, DESCRIBE".parse()?;
//! assert!(options.contains(&Method::List));
//!
//! let list: ResourceList = "cam1: Front door\r\ncam2: Garden\r\n".parse()?;
//! assert_eq!(list.get("cam2"), Some("Garden"));
//! ```
//!
//! [`Transport`]: crate::transport::Transport

use std::{collections::BTreeSet, fmt, str::FromStr};

use indexmap::IndexMap;

use crate::error::{Error, Result};

/// Resource URI that addresses the server itself rather than one resource.
pub const ROOT_URI: &str = "*";

/// Request methods.
///
/// Methods outside the known set are kept verbatim in [`Method::Other`], so
/// advertised capabilities are never lost.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Method {
    Options,
    List,
    Describe,
    Setup,
    Play,
    Subscribe,
    Record,
    Teardown,
    GetParameter,
    SetParameter,
    Other(String),
}

impl Method {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Options => "OPTIONS",
            Self::List => "LIST",
            Self::Describe => "DESCRIBE",
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::Subscribe => "SUBSCRIBE",
            Self::Record => "RECORD",
            Self::Teardown => "TEARDOWN",
            Self::GetParameter => "GET_PARAMETER",
            Self::SetParameter => "SET_PARAMETER",
            Self::Other(method) => method,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a method name. Method names are case-sensitive on the wire, but
/// servers in the wild send lowercase names often enough to accept them.
impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.contains(char::is_whitespace) {
            return Err(Error::invalid_argument(format!("invalid method \"{s}\"")));
        }

        let method = match s.to_ascii_uppercase().as_str() {
            "OPTIONS" => Self::Options,
            "LIST" => Self::List,
            "DESCRIBE" => Self::Describe,
            "SETUP" => Self::Setup,
            "PLAY" => Self::Play,
            "SUBSCRIBE" => Self::Subscribe,
            "RECORD" => Self::Record,
            "TEARDOWN" => Self::Teardown,
            "GET_PARAMETER" => Self::GetParameter,
            "SET_PARAMETER" => Self::SetParameter,
            _ => Self::Other(s.to_owned()),
        };

        Ok(method)
    }
}

/// The set of methods one resource URI supports.
///
/// Fetched with an `OPTIONS` request and replaced wholesale on every fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(BTreeSet<Method>);

impl CapabilitySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, method: &Method) -> bool {
        self.0.contains(method)
    }

    pub fn insert(&mut self, method: Method) -> bool {
        self.0.insert(method)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.0.iter()
    }
}

impl FromIterator<Method> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Method>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Formats as a comma separated list, the form servers advertise it in.
impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, method) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            fmt::Display::fmt(method, f)?;
        }
        Ok(())
    }
}

/// Parses a comma separated list of methods, e.g. `OPTIONS, LIST, PLAY`.
impl FromStr for CapabilitySet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(str::trim)
            .filter(|method| !method.is_empty())
            .map(str::parse)
            .collect()
    }
}

/// Resource URIs mapped to human-readable descriptions.
///
/// Keys are unique. Iteration follows the order the server returned the
/// entries in, because discovery visits resources in that order; equality
/// ignores it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceList(IndexMap<String, String>);

impl ResourceList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning the previous description for `uri`.
    /// Replacing keeps the original position.
    pub fn insert(
        &mut self,
        uri: impl Into<String>,
        description: impl Into<String>,
    ) -> Option<String> {
        self.0.insert(uri.into(), description.into())
    }

    #[must_use]
    pub fn get(&self, uri: &str) -> Option<&str> {
        self.0.get(uri).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, uri: &str) -> bool {
        self.0.contains_key(uri)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over `(uri, description)` pairs in server order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(uri, description)| (uri.as_str(), description.as_str()))
    }

    /// Iterates over the resource URIs in server order.
    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for ResourceList
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(uri, description)| (uri.into(), description.into()))
                .collect(),
        )
    }
}

/// Parses `uri: description` lines.
///
/// A line without a description yields an empty one. URIs may themselves
/// contain colons, so only `": "` separates the two.
///
/// # Errors
///
/// Returns a data loss error when the same URI is listed twice, because
/// there is no telling which description is the right one.
impl FromStr for ResourceList {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut list = Self::new();
        for line in s.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let (uri, description) = match line.split_once(": ") {
                Some((uri, description)) => (uri.trim(), description.trim()),
                None => (line, ""),
            };

            if list.insert(uri, description).is_some() {
                return Err(Error::data_loss(format!("resource \"{uri}\" listed twice")));
            }
        }

        Ok(list)
    }
}
