//! Page location helpers

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// The visible location of the page being analyzed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PageLocation {
    url: Url,
}

impl PageLocation {
    pub fn parse(href: &str) -> Result<Self> {
        Ok(Self {
            url: Url::parse(href)?,
        })
    }

    pub fn href(&self) -> &str {
        self.url.as_str()
    }

    /// Lowercased hostname, empty for host-less URLs
    pub fn hostname(&self) -> String {
        self.url.host_str().unwrap_or_default().to_ascii_lowercase()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Key stored in block records: hostname followed by path
    pub fn block_key(&self) -> String {
        format!("{}{}", self.hostname(), self.path())
    }

    /// Whether `other` (absolute or relative to this page) shares this page's origin
    pub fn is_same_origin(&self, other: &str) -> bool {
        match self.url.join(other) {
            Ok(resolved) => resolved.origin() == self.url.origin(),
            Err(_) => false,
        }
    }

    /// Resolve a possibly relative reference against this page
    pub fn resolve(&self, reference: &str) -> Result<Url> {
        Ok(self.url.join(reference)?)
    }
}

impl fmt::Display for PageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl TryFrom<String> for PageLocation {
    type Error = url::ParseError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            url: Url::parse(&value)?,
        })
    }
}

impl From<PageLocation> for String {
    fn from(value: PageLocation) -> Self {
        value.url.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_key() {
        let location = PageLocation::parse("https://Example.com/gallery/1?page=2#top").unwrap();
        assert_eq!(location.hostname(), "example.com");
        assert_eq!(location.block_key(), "example.com/gallery/1");
    }

    #[test]
    fn test_same_origin() {
        let location = PageLocation::parse("https://example.com/a").unwrap();
        assert!(location.is_same_origin("/img/x.png"));
        assert!(location.is_same_origin("https://example.com/img/x.png"));
        assert!(!location.is_same_origin("https://cdn.example.net/x.png"));
    }

    #[test]
    fn test_unparseable_reference_is_cross_origin() {
        let location = PageLocation::parse("https://example.com/page").unwrap();
        assert!(!location.is_same_origin("http://[bad-host/x.png"));
    }

    #[test]
    fn test_invalid_location() {
        assert!(PageLocation::parse("not a url").is_err());
    }
}
