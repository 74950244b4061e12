//! Content classification of fetched responses.
//!
//! Rules are applied in priority order: asset, pdf, doc, xml, html. A
//! response with no decisive signal is treated as HTML.

use url::Url;

use crate::filter::{has_asset_extension, path_extension};

/// What a fetched resource is, as far as the crawler cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Stylesheet, script, image or font. Consumed, never stored or parsed.
    Asset,
    Pdf,
    /// RSS/Atom feed. Used only as a link source.
    Xml,
    Html,
    /// Word document. Classified but not archived.
    Doc,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Asset => "asset",
            ContentKind::Pdf => "pdf",
            ContentKind::Xml => "xml",
            ContentKind::Html => "html",
            ContentKind::Doc => "doc",
        }
    }
}

const ASSET_MIME_MARKERS: &[&str] = &["text/css", "javascript", "image/", "font/"];
const DOC_MIME_MARKERS: &[&str] = &["msword", "wordprocessingml"];
const FEED_EXTENSIONS: &[&str] = &["xml", "rss", "atom"];

/// Classify a response by its URL and `Content-Type` header.
pub fn classify(url: &str, content_type: Option<&str>) -> ContentKind {
    let ct = content_type.unwrap_or("").to_ascii_lowercase();
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default();
    let ext = path_extension(&path).unwrap_or_default();

    if ASSET_MIME_MARKERS.iter().any(|m| ct.contains(m)) || has_asset_extension(&path) {
        return ContentKind::Asset;
    }

    if ct.contains("pdf") || ext == "pdf" {
        return ContentKind::Pdf;
    }

    if DOC_MIME_MARKERS.iter().any(|m| ct.contains(m)) || ext == "doc" || ext == "docx" {
        return ContentKind::Doc;
    }

    if FEED_EXTENSIONS.contains(&ext.as_str()) {
        return ContentKind::Xml;
    }

    // application/xhtml+xml is a web page, not a feed
    if ct.contains("xml") && !ct.contains("xhtml") {
        return ContentKind::Xml;
    }

    ContentKind::Html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_extension_wins_over_declared_type() {
        assert_eq!(
            classify("https://dre.pt/style.css", Some("text/html")),
            ContentKind::Asset
        );
        assert_eq!(
            classify("https://dre.pt/app.js", Some("application/pdf")),
            ContentKind::Asset
        );
        assert_eq!(classify("https://dre.pt/logo.png", None), ContentKind::Asset);
    }

    #[test]
    fn asset_content_types() {
        assert_eq!(
            classify("https://dre.pt/x", Some("image/png")),
            ContentKind::Asset
        );
        assert_eq!(
            classify("https://dre.pt/x", Some("application/javascript; charset=utf-8")),
            ContentKind::Asset
        );
        assert_eq!(
            classify("https://dre.pt/x", Some("font/woff2")),
            ContentKind::Asset
        );
    }

    #[test]
    fn pdf_by_type_or_extension() {
        assert_eq!(
            classify("https://files.dre.pt/1s/2024/01/00100.pdf", None),
            ContentKind::Pdf
        );
        assert_eq!(
            classify("https://dre.pt/download?id=4", Some("application/pdf")),
            ContentKind::Pdf
        );
        assert_eq!(
            classify("https://dre.pt/x.PDF", Some("application/octet-stream")),
            ContentKind::Pdf
        );
    }

    #[test]
    fn feeds_are_xml() {
        assert_eq!(
            classify("https://dre.pt/rss", Some("application/rss+xml")),
            ContentKind::Xml
        );
        assert_eq!(
            classify("https://dre.pt/feed", Some("application/atom+xml")),
            ContentKind::Xml
        );
        assert_eq!(classify("https://dre.pt/series.rss", None), ContentKind::Xml);
    }

    #[test]
    fn feed_extension_beats_html_content_type() {
        assert_eq!(
            classify("https://dre.pt/feed.xml", Some("text/html; charset=utf-8")),
            ContentKind::Xml
        );
        assert_eq!(
            classify("https://dre.pt/serie1.atom", Some("text/html")),
            ContentKind::Xml
        );
        assert_eq!(
            classify("https://dre.pt/legislacao", Some("text/html")),
            ContentKind::Html
        );
    }

    #[test]
    fn xhtml_is_html() {
        assert_eq!(
            classify("https://dre.pt/a", Some("application/xhtml+xml")),
            ContentKind::Html
        );
    }

    #[test]
    fn word_documents() {
        assert_eq!(classify("https://dre.pt/a.doc", None), ContentKind::Doc);
        assert_eq!(classify("https://dre.pt/a.docx", None), ContentKind::Doc);
        assert_eq!(
            classify(
                "https://dre.pt/a",
                Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
            ),
            ContentKind::Doc
        );
    }

    #[test]
    fn html_is_the_fallback() {
        assert_eq!(
            classify("https://dre.pt/a", Some("text/html; charset=utf-8")),
            ContentKind::Html
        );
        assert_eq!(classify("https://dre.pt/a", None), ContentKind::Html);
        assert_eq!(
            classify("https://dre.pt/a", Some("text/plain")),
            ContentKind::Html
        );
    }
}
