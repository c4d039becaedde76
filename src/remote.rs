use crate::{inventory::has_extension, notice::Notice};
use serde::Deserialize;
use std::{collections::BTreeSet, io, time::Duration};
use thiserror::Error;

const USER_AGENT: &str = concat!("ModSync/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "application/vnd.github+json";

/// The contents endpoint stops at this many entries and has no next page.
pub const LISTING_CAP: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ContentEntry {
    fn is_dir(&self) -> bool {
        self.kind.as_deref() == Some("dir")
    }
}

#[derive(Debug, Error)]
pub enum RemoteListingError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} returned HTTP {code}: {message}")]
    Status {
        url: String,
        code: u16,
        message: String,
    },
    #[error("read response from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: io::Error,
    },
    #[error("unexpected listing from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

pub trait ListingSource {
    fn list(&self) -> Result<Vec<ContentEntry>, RemoteListingError>;
}

/// `GET {api}/repos/{owner}/{repo}/contents`, unauthenticated.
pub struct GithubContents {
    url: String,
    agent: ureq::Agent,
}

impl GithubContents {
    pub fn new(url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(10))
            .timeout_write(Duration::from_secs(10))
            .build();
        Self {
            url: url.into(),
            agent,
        }
    }
}

impl ListingSource for GithubContents {
    fn list(&self) -> Result<Vec<ContentEntry>, RemoteListingError> {
        let response = match self
            .agent
            .get(&self.url)
            .set("User-Agent", USER_AGENT)
            .set("Accept", ACCEPT)
            .call()
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let status_text = response.status_text().to_string();
                let body = response.into_string().unwrap_or_default();
                return Err(RemoteListingError::Status {
                    url: self.url.clone(),
                    code,
                    message: api_message(&body).unwrap_or(status_text),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(RemoteListingError::Transport {
                    url: self.url.clone(),
                    message: transport.to_string(),
                });
            }
        };

        let body = response
            .into_string()
            .map_err(|source| RemoteListingError::Body {
                url: self.url.clone(),
                source,
            })?;
        parse_listing(&body).map_err(|source| RemoteListingError::Decode {
            url: self.url.clone(),
            source,
        })
    }
}

/// Anything other than a JSON array of named objects is rejected.
pub fn parse_listing(body: &str) -> Result<Vec<ContentEntry>, serde_json::Error> {
    serde_json::from_str(body)
}

fn api_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ApiError {
        message: String,
    }
    serde_json::from_str::<ApiError>(body)
        .ok()
        .map(|error| error.message)
}

pub fn filter_mods(entries: &[ContentEntry], extension: &str) -> BTreeSet<String> {
    entries
        .iter()
        .filter(|entry| !entry.is_dir() && has_extension(&entry.name, extension))
        .map(|entry| entry.name.clone())
        .collect()
}

#[derive(Debug)]
pub struct RemoteInventory {
    pub mods: BTreeSet<String>,
    pub entry_count: usize,
    pub truncated: bool,
    pub error: Option<RemoteListingError>,
}

impl RemoteInventory {
    /// One error notice when the listing failed, nothing otherwise.
    pub fn notice(&self) -> Option<Notice> {
        self.error.as_ref().map(|err| {
            Notice::error("Error", format!("Failed to fetch remote mods:\n{err}"))
        })
    }
}

/// Lists the remote once. Failures never escape: the set comes back empty
/// and the error is kept for the caller to report.
pub fn remote_inventory(source: &dyn ListingSource, extension: &str) -> RemoteInventory {
    match source.list() {
        Ok(entries) => RemoteInventory {
            mods: filter_mods(&entries, extension),
            entry_count: entries.len(),
            truncated: entries.len() >= LISTING_CAP,
            error: None,
        },
        Err(err) => RemoteInventory {
            mods: BTreeSet::new(),
            entry_count: 0,
            truncated: false,
            error: Some(err),
        },
    }
}
