//! Link discovery for HTML pages and RSS/Atom feeds.
//!
//! Both extractors return canonical, in-boundary, deduplicated URLs in
//! document order.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use crate::canonical::canonicalize;
use crate::extract::decode_entities;
use crate::filter::{has_asset_extension, is_allowed, is_asset_path};
use crate::models::Source;

/// Matches `href` attributes on any element (`<a>`, `<link>`, `<area>`, Atom `<link href>`).
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhref\s*=\s*["']([^"']*)["']"#).expect("valid regex"));
/// `<link>...</link>` bodies (RSS 2.0).
static LINK_BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<link\b[^>/]*>\s*(<!\[CDATA\[.*?\]\]>|[^<]*?)\s*</link\s*>")
        .expect("valid regex")
});
/// `<guid>...</guid>` bodies.
static GUID_BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<guid\b[^>]*>\s*(<!\[CDATA\[.*?\]\]>|[^<]*?)\s*</guid\s*>")
        .expect("valid regex")
});

fn is_skippable_href(href: &str) -> bool {
    let lower = href.trim().to_ascii_lowercase();
    lower.is_empty()
        || lower.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
}

fn looks_like_asset(url: &str) -> bool {
    Url::parse(url)
        .map(|u| has_asset_extension(u.path()))
        .unwrap_or(false)
}

fn push_unique(out: &mut Vec<String>, seen: &mut HashSet<String>, url: String) {
    if seen.insert(url.clone()) {
        out.push(url);
    }
}

/// Extract in-boundary links from an HTML page.
///
/// `page_url` must be the final (post-redirect) URL of the page.
pub fn extract_html_links(html: &str, page_url: &str, source: &Source) -> Vec<String> {
    let base = Url::parse(page_url).ok();
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for cap in HREF_RE.captures_iter(html) {
        let raw = decode_entities(&cap[1]);
        if is_skippable_href(&raw) {
            continue;
        }
        let url = canonicalize(&raw, base.as_ref());
        if looks_like_asset(&url) || !is_allowed(&url, source) {
            continue;
        }
        push_unique(&mut links, &mut seen, url);
    }

    links
}

fn unwrap_cdata(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix("<![CDATA[")
        .and_then(|inner| inner.strip_suffix("]]>"))
        .map(str::trim)
        .unwrap_or(s)
}

fn is_absolute_http(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Relaxed boundary for feed entries: anything on the gazette domain is
/// accepted regardless of path, otherwise the normal allow-list applies.
fn feed_link_allowed(url: &str, source: &Source, relaxed_domain: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let relaxed = !relaxed_domain.is_empty()
        && parsed
            .host_str()
            .map(|h| h.to_ascii_lowercase().contains(relaxed_domain))
            .unwrap_or(false);
    if relaxed {
        return matches!(parsed.scheme(), "http" | "https") && !is_asset_path(parsed.path());
    }
    is_allowed(url, source)
}

/// Extract links from an RSS or Atom feed.
///
/// Looks at `<link>` bodies, `<guid>` bodies holding absolute URLs and
/// `href` attributes.
pub fn extract_feed_links(
    xml: &str,
    feed_url: &str,
    source: &Source,
    relaxed_domain: &str,
) -> Vec<String> {
    let base = Url::parse(feed_url).ok();
    let relaxed_domain = relaxed_domain.to_ascii_lowercase();

    let mut candidates: Vec<String> = Vec::new();
    for cap in LINK_BODY_RE.captures_iter(xml) {
        let body = unwrap_cdata(&cap[1]);
        if !body.is_empty() {
            candidates.push(decode_entities(body));
        }
    }
    for cap in GUID_BODY_RE.captures_iter(xml) {
        let body = unwrap_cdata(&cap[1]);
        if is_absolute_http(body) {
            candidates.push(decode_entities(body));
        }
    }
    for cap in HREF_RE.captures_iter(xml) {
        candidates.push(decode_entities(&cap[1]));
    }

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for raw in candidates {
        if is_skippable_href(&raw) {
            continue;
        }
        let url = canonicalize(&raw, base.as_ref());
        if feed_link_allowed(&url, source, &relaxed_domain) {
            push_unique(&mut links, &mut seen, url);
        }
    }

    links
}
