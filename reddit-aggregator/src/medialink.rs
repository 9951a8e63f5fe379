use crate::types::{MediaLink, MediaResolver};
use anyhow::{anyhow, Result};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

static REDDIT_COMMENTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/r/[^/]+/comments").expect("valid regex"));
static IMGUR_GIFV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.gifv$").expect("valid regex"));
static IMGUR_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[[:alnum:]]+$").expect("valid regex"));
// https://media.giphy.com/media/<id>/giphy.gif
static GIPHY_MEDIA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/media/([[:alnum:]]+)").expect("valid regex"));
// https://giphy.com/gifs/some-words-<id>
static GIPHY_LEGIBLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/gifs/(?:[[:alnum:]]+-)*([[:alnum:]]+)").expect("valid regex")
});
static GFYCAT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/+(?:gifs/detail/)?([[:alnum:]]+)").expect("valid regex"));
static MEDIA_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(?:gifv?|png|jpe?g|mp4|webm)$").expect("valid regex"));

/// A parsed link with the lowercased host (port stripped) and path that the
/// site parsers match against.
#[derive(Debug, Clone)]
pub struct Link {
    pub raw: String,
    pub url: Url,
    pub host: String,
    pub path: String,
}

impl Link {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!("non-HTTP scheme in URL '{}'", raw));
        }
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let path = url.path().to_ascii_lowercase();
        Ok(Self {
            raw: raw.to_string(),
            url,
            host,
            path,
        })
    }

    /// True if the host is `domain` or one of its subdomains.
    fn in_domain(&self, domain: &str) -> bool {
        self.host == domain || self.host.ends_with(&format!(".{}", domain))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// Later parsers are not consulted, even if there is nothing to show.
    Handled(Option<MediaLink>),
    NotHandled,
}

/// Known hosting sites, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteParser {
    Reddit,
    Imgur,
    Giphy,
    Gfycat,
    DirectFile,
}

impl SiteParser {
    pub const ALL: [SiteParser; 5] = [
        SiteParser::Reddit,
        SiteParser::Imgur,
        SiteParser::Giphy,
        SiteParser::Gfycat,
        SiteParser::DirectFile,
    ];

    pub fn parse(self, link: &Link) -> Parsed {
        match self {
            SiteParser::Reddit => parse_reddit(link),
            SiteParser::Imgur => parse_imgur(link),
            SiteParser::Giphy => parse_giphy(link),
            SiteParser::Gfycat => parse_gfycat(link),
            SiteParser::DirectFile => parse_direct_file(link),
        }
    }
}

fn parse_reddit(link: &Link) -> Parsed {
    if !link.in_domain("reddit.com") {
        return Parsed::NotHandled;
    }
    // Links to comment threads never display anything.
    if REDDIT_COMMENTS_RE.is_match(&link.path) {
        return Parsed::Handled(None);
    }
    Parsed::NotHandled
}

fn parse_imgur(link: &Link) -> Parsed {
    if !link.in_domain("imgur.com") {
        return Parsed::NotHandled;
    }
    let mut url = link.url.clone();
    if IMGUR_GIFV_RE.is_match(&link.path) {
        if url.set_host(Some("i.imgur.com")).is_err() {
            return Parsed::NotHandled;
        }
        return Parsed::Handled(Some(MediaLink::Direct(url.to_string())));
    }
    if IMGUR_ID_RE.is_match(link.url.path()) {
        if url.set_host(Some("i.imgur.com")).is_err() {
            return Parsed::NotHandled;
        }
        let path = format!("{}.jpg", link.url.path());
        url.set_path(&path);
        return Parsed::Handled(Some(MediaLink::Direct(url.to_string())));
    }
    Parsed::NotHandled
}

fn parse_giphy(link: &Link) -> Parsed {
    if !link.in_domain("giphy.com") {
        return Parsed::NotHandled;
    }
    let path = link.url.path();
    let id = GIPHY_MEDIA_RE
        .captures(path)
        .or_else(|| GIPHY_LEGIBLE_RE.captures(path))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str());

    match id {
        Some(id) => Parsed::Handled(Some(MediaLink::Embed(format!(
            r#"<iframe src="https://giphy.com/embed/{}" frameborder="0" scrolling="no" width="100%" height="100%" class="giphy-embed" allowFullScreen></iframe>"#,
            id
        )))),
        None => Parsed::NotHandled,
    }
}

fn parse_gfycat(link: &Link) -> Parsed {
    if !link.in_domain("gfycat.com") {
        return Parsed::NotHandled;
    }
    match GFYCAT_ID_RE.captures(link.url.path()).and_then(|caps| caps.get(1)) {
        Some(id) => Parsed::Handled(Some(MediaLink::Embed(format!(
            concat!(
                r#"<div style="position:relative;padding-bottom:54%">"#,
                r#"<iframe src="https://gfycat.com/ifr/{}" frameborder="0" scrolling="no" width="100%" height="100%""#,
                r#" style="position:absolute;top:0;left:0" allowfullscreen></iframe>"#,
                r#"</div>"#
            ),
            id.as_str()
        )))),
        None => Parsed::NotHandled,
    }
}

fn parse_direct_file(link: &Link) -> Parsed {
    if MEDIA_SUFFIX_RE.is_match(&link.path) {
        return Parsed::Handled(Some(MediaLink::Direct(link.raw.clone())));
    }
    Parsed::NotHandled
}

/// Resolves links by running them through the site parsers; the first one
/// that handles a link decides.
pub struct MediaLinkResolver {
    parsers: Vec<SiteParser>,
}

impl Default for MediaLinkResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaLinkResolver {
    pub fn new() -> Self {
        Self {
            parsers: SiteParser::ALL.to_vec(),
        }
    }

    pub fn with_parsers(parsers: Vec<SiteParser>) -> Self {
        Self { parsers }
    }
}

impl MediaResolver for MediaLinkResolver {
    fn resolve(&self, raw: &str) -> Result<Option<MediaLink>> {
        let link = Link::parse(raw).map_err(|e| {
            warn!("Could not parse the URL '{}': {}", raw, e);
            e
        })?;

        for parser in &self.parsers {
            if let Parsed::Handled(media_link) = parser.parse(&link) {
                return Ok(media_link);
            }
        }
        debug!("Could not embed URL '{}'", raw);
        Ok(None)
    }
}
