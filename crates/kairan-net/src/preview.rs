//! Open Graph link-preview fetcher.
//!
//! Fetches a page and scrapes `og:` meta tags with regexes rather than
//! a full HTML parser; preview cards tolerate imperfect extraction and
//! the body read is capped so a huge page cannot pin the request.

use crate::error::{PreviewError, PreviewResult};
use kairan_core::{LinkPreview, PreviewConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static META_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<meta\b[^>]*>").unwrap());
static PROP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)property\s*=\s*["']og:(title|image|description)["']"#).unwrap()
});
static CONTENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)content\s*=\s*["']([^"']*)["']"#).unwrap());
static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

pub struct PreviewFetcher {
    client: reqwest::Client,
    config: PreviewConfig,
}

impl PreviewFetcher {
    pub fn new(config: PreviewConfig) -> PreviewResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PreviewError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Fetch `url` and extract preview metadata.
    ///
    /// Title falls back from `og:title` to `<title>` to the host name;
    /// a missing `og:image` falls back to a favicon service, or an
    /// avatar service for known social hosts.
    pub async fn fetch_preview(&self, url: &str) -> PreviewResult<LinkPreview> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| PreviewError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PreviewError::InvalidUrl(format!(
                "unsupported scheme {}",
                parsed.scheme()
            )));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| PreviewError::InvalidUrl(format!("{url}: no host")))?
            .to_string();

        let response = self.client.get(parsed.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                PreviewError::Timeout
            } else {
                PreviewError::Request(e.to_string())
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(PreviewError::Status(status.as_u16()));
        }

        let html = self.read_capped(response).await?;
        debug!(url, bytes = html.len(), "fetched preview page");

        let title = og_meta(&html, "title")
            .or_else(|| page_title(&html))
            .unwrap_or_else(|| host.clone());
        let image = og_meta(&html, "image")
            .or_else(|| avatar_fallback(&parsed, &host))
            .or_else(|| {
                Some(format!(
                    "https://www.google.com/s2/favicons?domain={host}&sz=64"
                ))
            });

        Ok(LinkPreview {
            url: url.to_string(),
            title,
            description: og_meta(&html, "description"),
            image,
        })
    }

    /// Read at most `max_body_bytes` of the body, lossily decoded.
    async fn read_capped(&self, mut response: reqwest::Response) -> PreviewResult<String> {
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PreviewError::Request(e.to_string()))?
        {
            let remaining = self.config.max_body_bytes.saturating_sub(buf.len());
            if remaining == 0 {
                break;
            }
            let take = remaining.min(chunk.len());
            buf.extend_from_slice(&chunk[..take]);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Content of the first `<meta property="og:{name}">` tag, in either
/// attribute order.
fn og_meta(html: &str, name: &str) -> Option<String> {
    for tag in META_RE.find_iter(html) {
        let tag = tag.as_str();
        let Some(caps) = PROP_RE.captures(tag) else {
            continue;
        };
        if !caps[1].eq_ignore_ascii_case(name) {
            continue;
        }
        if let Some(content) = CONTENT_RE.captures(tag) {
            let value = content[1].trim();
            if !value.is_empty() {
                return Some(unescape(value));
            }
        }
    }
    None
}

fn page_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .map(|caps| unescape(caps[1].trim()))
        .filter(|title| !title.is_empty())
}

/// Avatar service image for hosts where it beats a favicon.
fn avatar_fallback(url: &reqwest::Url, host: &str) -> Option<String> {
    let first_segment = url
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|segment| !segment.is_empty())?;
    match host.trim_start_matches("www.") {
        "github.com" => Some(format!("https://unavatar.io/github/{first_segment}")),
        "twitter.com" | "x.com" => Some(format!("https://unavatar.io/x/{first_segment}")),
        _ => None,
    }
}

fn unescape(raw: &str) -> String {
    raw.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}
