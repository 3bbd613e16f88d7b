use std::fmt::{self, Display};

use regex_lite::Regex;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Could not derive a repository name from url `{0}`")]
    UnnamedUrl(String),
    #[error("Invalid url pattern: {0}")]
    Pattern(String),
}

/// Repository name as the forge reports it in event payloads, e.g. `org/repo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryName {
    pub value: String,
}

impl RepositoryName {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Derives the name from a clone url.
    ///
    /// Handles `scheme://host/path` urls, scp-like `user@host:path` urls and
    /// plain filesystem paths. The `.git` suffix and surrounding slashes are
    /// removed from the path.
    pub fn from_url(url: &str) -> Result<Self, ParseError> {
        let re = Regex::new(
            r"^(?:(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*)://(?P<authority>[^/]*)|(?P<scp>[^/:]+):)?(?P<path>.*)$",
        )
        .map_err(|err| ParseError::Pattern(err.to_string()))?;

        let path = re
            .captures(url.trim())
            .and_then(|captures| captures.name("path"))
            .map(|path| path.as_str())
            .unwrap_or_default();

        let path = path.trim_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path).trim_matches('/');

        if path.is_empty() {
            Err(ParseError::UnnamedUrl(url.to_owned()))
        } else {
            Ok(Self::new(path))
        }
    }
}

impl Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl PartialEq<str> for RepositoryName {
    fn eq(&self, other: &str) -> bool {
        self.value == other
    }
}
