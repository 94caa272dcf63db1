//! Site-mode selection
//!
//! Social platforms and search engines are never fully blocked: they mix
//! harmless and harmful content, so only individual items are mitigated.

use pageguard_core::PageLocation;
use serde::Serialize;
use std::fmt;

/// Known social platforms and search engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    GoogleSearch,
    Bing,
    DuckDuckGo,
    Yahoo,
    Yandex,
    Baidu,
    Youtube,
    Instagram,
    Twitter,
    Facebook,
    Tiktok,
    Reddit,
    Discord,
    Twitch,
    Snapchat,
    Linkedin,
    Pinterest,
    Tumblr,
    Whatsapp,
}

/// Registrable domains per platform; Google search is matched separately
const DOMAINS: &[(&str, Platform)] = &[
    ("bing.com", Platform::Bing),
    ("duckduckgo.com", Platform::DuckDuckGo),
    ("yahoo.com", Platform::Yahoo),
    ("yandex.com", Platform::Yandex),
    ("baidu.com", Platform::Baidu),
    ("youtube.com", Platform::Youtube),
    ("youtu.be", Platform::Youtube),
    ("instagram.com", Platform::Instagram),
    ("twitter.com", Platform::Twitter),
    ("x.com", Platform::Twitter),
    ("facebook.com", Platform::Facebook),
    ("fb.com", Platform::Facebook),
    ("tiktok.com", Platform::Tiktok),
    ("reddit.com", Platform::Reddit),
    ("discord.com", Platform::Discord),
    ("twitch.tv", Platform::Twitch),
    ("snapchat.com", Platform::Snapchat),
    ("linkedin.com", Platform::Linkedin),
    ("pinterest.com", Platform::Pinterest),
    ("tumblr.com", Platform::Tumblr),
    ("whatsapp.com", Platform::Whatsapp),
];

impl Platform {
    /// Platform serving `host` + `path`, if any
    pub fn detect(host: &str, path: &str) -> Option<Self> {
        let host = host.trim_end_matches('.').to_ascii_lowercase();

        if is_google_host(&host) && path.starts_with("/search") {
            return Some(Self::GoogleSearch);
        }

        DOMAINS
            .iter()
            .find(|(domain, _)| host_matches(&host, domain))
            .map(|(_, platform)| *platform)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoogleSearch => "google_search",
            Self::Bing => "bing",
            Self::DuckDuckGo => "duckduckgo",
            Self::Yahoo => "yahoo",
            Self::Yandex => "yandex",
            Self::Baidu => "baidu",
            Self::Youtube => "youtube",
            Self::Instagram => "instagram",
            Self::Twitter => "twitter",
            Self::Facebook => "facebook",
            Self::Tiktok => "tiktok",
            Self::Reddit => "reddit",
            Self::Discord => "discord",
            Self::Twitch => "twitch",
            Self::Snapchat => "snapchat",
            Self::Linkedin => "linkedin",
            Self::Pinterest => "pinterest",
            Self::Tumblr => "tumblr",
            Self::Whatsapp => "whatsapp",
        }
    }

    pub fn is_search_engine(&self) -> bool {
        matches!(
            self,
            Self::GoogleSearch | Self::Bing | Self::DuckDuckGo | Self::Yahoo | Self::Yandex | Self::Baidu
        )
    }

    /// Selectors locating comment bodies on this platform
    pub fn comment_selectors(&self) -> Option<CommentSelectorSet> {
        let selectors: &'static [&'static str] = match self {
            Self::Youtube => &["#content-text", "yt-formatted-string#content-text", "#comment #content-text"],
            Self::Instagram => &[
                "span._ap3a._aaco._aacu._aacx._aad7._aade",
                "span[dir=\"auto\"]",
                "div.C4VMK > span",
            ],
            Self::Twitter => &["div[data-testid=\"tweetText\"]", "div[lang] > span"],
            Self::Facebook => &["div[dir=\"auto\"]", "span[dir=\"auto\"]", "div.x1lliihq"],
            Self::Reddit => &["div[data-testid=\"comment\"]", "div.md p", "div._292iotee19Lmt0MUIr9ejT"],
            Self::Discord => &["div[class*=\"messageContent\"]", "div.markup"],
            Self::Tiktok => &["p[data-e2e=\"comment-level-1\"]", "span[data-e2e=\"comment-level-2\"]"],
            Self::GoogleSearch
            | Self::Bing
            | Self::DuckDuckGo
            | Self::Yahoo
            | Self::Yandex
            | Self::Baidu
            | Self::Twitch
            | Self::Snapchat
            | Self::Linkedin
            | Self::Pinterest
            | Self::Tumblr
            | Self::Whatsapp => return None,
        };

        Some(CommentSelectorSet {
            platform: *self,
            selectors,
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .map(|prefix| prefix.ends_with('.'))
            .unwrap_or(false)
}

/// `google.com`, `www.google.co.uk`, ...
fn is_google_host(host: &str) -> bool {
    host.split('.').any(|label| label == "google")
}

/// Platform-specific group of comment selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentSelectorSet {
    pub platform: Platform,
    pub selectors: &'static [&'static str],
}

/// How a page is treated for the rest of the visit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteMode {
    pub platform: Option<Platform>,

    /// Never persisted as fully blocked; per-item mitigation only
    pub exempt_from_full_block: bool,

    pub comment_selectors: Option<CommentSelectorSet>,
}

impl SiteMode {
    /// Derive the mode from the page origin
    pub fn detect(location: &PageLocation) -> Self {
        Self::for_platform(Platform::detect(&location.hostname(), location.path()))
    }

    pub fn for_platform(platform: Option<Platform>) -> Self {
        Self {
            platform,
            exempt_from_full_block: platform.is_some(),
            comment_selectors: platform.and_then(|p| p.comment_selectors()),
        }
    }

    /// Ordinary site with whole-page blocking
    pub fn general() -> Self {
        Self::for_platform(None)
    }

    pub fn is_exempt(&self) -> bool {
        self.exempt_from_full_block
    }

    pub fn label(&self) -> &'static str {
        self.platform.map(|p| p.as_str()).unwrap_or("general")
    }
}

/// Whether a stored block-list url belongs to a social/search site.
///
/// Records store `host + path` without a scheme.
pub fn is_exempt_record_url(url: &str) -> bool {
    let (host, path) = match url.find('/') {
        Some(idx) => url.split_at(idx),
        None => (url, ""),
    };
    Platform::detect(host, path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(href: &str) -> SiteMode {
        SiteMode::detect(&PageLocation::parse(href).unwrap())
    }

    #[test]
    fn test_social_platforms_are_exempt() {
        let youtube = mode("https://www.youtube.com/watch?v=abc");
        assert!(youtube.is_exempt());
        assert_eq!(youtube.platform, Some(Platform::Youtube));
        assert!(youtube.comment_selectors.is_some());

        assert_eq!(mode("https://youtu.be/abc").platform, Some(Platform::Youtube));
        assert_eq!(mode("https://x.com/someone").platform, Some(Platform::Twitter));
        assert_eq!(mode("https://old.reddit.com/r/rust").platform, Some(Platform::Reddit));
    }

    #[test]
    fn test_platforms_without_comment_selectors() {
        let twitch = mode("https://www.twitch.tv/stream");
        assert!(twitch.is_exempt());
        assert!(twitch.comment_selectors.is_none());
    }

    #[test]
    fn test_search_engines() {
        let google = mode("https://www.google.com/search?q=cats");
        assert_eq!(google.platform, Some(Platform::GoogleSearch));
        assert!(google.is_exempt());

        assert_eq!(mode("https://www.google.co.uk/search?q=x").platform, Some(Platform::GoogleSearch));
        assert!(!mode("https://www.google.com/maps").is_exempt());
        assert!(mode("https://duckduckgo.com/?q=x").platform.unwrap().is_search_engine());
    }

    #[test]
    fn test_general_sites() {
        let general = mode("https://example.com/article");
        assert!(!general.is_exempt());
        assert_eq!(general.label(), "general");

        // Suffix matching is on label boundaries
        assert!(!mode("https://dropbox.com/").is_exempt());
        assert!(!mode("https://notyoutube.com/").is_exempt());
    }

    #[test]
    fn test_record_urls() {
        assert!(is_exempt_record_url("www.youtube.com/watch"));
        assert!(is_exempt_record_url("www.google.com/search"));
        assert!(is_exempt_record_url("reddit.com"));
        assert!(!is_exempt_record_url("example.com/bad-page"));
    }
}
