//! Title and text extraction for archived documents.
//!
//! HTML handling is deliberately regex-based and best-effort: titles come
//! from the first `<title>` (falling back to the first `<h1>`), body text is
//! the markup with scripts, styles and tags stripped. PDF text goes through
//! `pdf-extract`.

use regex::{Captures, Regex};
use std::sync::LazyLock;
use url::Url;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").expect("valid regex"));
static H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1\s*>").expect("valid regex"));
static NON_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<!--.*?-->",
    )
    .expect("valid regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z]{2,8});").expect("valid regex")
});

/// PDF extraction error. Never fatal to a crawl item.
#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "sect" => '§',
        "ordm" => 'º',
        "ordf" => 'ª',
        "laquo" => '«',
        "raquo" => '»',
        "ndash" => '–',
        "mdash" => '—',
        "aacute" => 'á',
        "agrave" => 'à',
        "acirc" => 'â',
        "atilde" => 'ã',
        "eacute" => 'é',
        "ecirc" => 'ê',
        "iacute" => 'í',
        "oacute" => 'ó',
        "ocirc" => 'ô',
        "otilde" => 'õ',
        "uacute" => 'ú',
        "ccedil" => 'ç',
        "Aacute" => 'Á',
        "Atilde" => 'Ã',
        "Eacute" => 'É',
        "Oacute" => 'Ó',
        "Ccedil" => 'Ç',
        _ => return None,
    };
    Some(c)
}

/// Decode common HTML entities. Unknown entities are left untouched.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    ENTITY_RE
        .replace_all(s, |caps: &Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body
                .strip_prefix("#x")
                .or_else(|| body.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(body)
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn collapse_whitespace(s: &str) -> String {
    WS_RE.replace_all(s, " ").trim().to_string()
}

/// Strip markup from an HTML fragment and normalize its whitespace.
fn fragment_text(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, " ");
    collapse_whitespace(&decode_entities(&stripped))
}

/// First non-empty `<title>`, else first non-empty `<h1>`.
pub fn html_title(html: &str) -> Option<String> {
    [&*TITLE_RE, &*H1_RE].iter().find_map(|re| {
        re.captures(html)
            .map(|caps| fragment_text(&caps[1]))
            .filter(|t| !t.is_empty())
    })
}

/// Visible text of an HTML page, capped at `max_chars` characters.
pub fn html_text(html: &str, max_chars: usize) -> String {
    let without_code = NON_TEXT_RE.replace_all(html, " ");
    let text = fragment_text(&without_code);
    truncate_chars(text, max_chars)
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text,
    }
}

/// Document title derived from the URL's filename, without extension.
///
/// Falls back to the full URL when there is no usable filename.
pub fn title_from_url(url: &str) -> String {
    let filename = Url::parse(url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|segs| segs.last().map(|s| s.to_string()))
            .filter(|s| !s.is_empty())
    });

    let Some(filename) = filename else {
        return url.to_string();
    };
    let decoded = urlencoding::decode(&filename)
        .map(|d| d.into_owned())
        .unwrap_or(filename);
    match decoded.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => decoded,
    }
}

/// Plain text of a PDF payload, whitespace-collapsed and capped.
pub fn pdf_text(bytes: &[u8], max_chars: usize) -> Result<String, ExtractError> {
    let raw =
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(truncate_chars(collapse_whitespace(&raw), max_chars))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_prefers_title_element() {
        let html = "<html><head><title> Decreto-Lei n.º 10/2024 </title></head><body><h1>Outro</h1></body></html>";
        assert_eq!(html_title(html).as_deref(), Some("Decreto-Lei n.º 10/2024"));
    }

    #[test]
    fn title_falls_back_to_h1() {
        let html = "<html><head><title>  </title></head><body><h1 class=\"t\">Lei <em>n.&ordm; 5</em></h1></body></html>";
        assert_eq!(html_title(html).as_deref(), Some("Lei n.º 5"));
    }

    #[test]
    fn title_missing() {
        assert_eq!(html_title("<p>sem título</p>"), None);
    }

    #[test]
    fn text_strips_scripts_styles_and_tags() {
        let html = r#"<html><head><style>p { color: red }</style>
            <script>var x = "<p>nope</p>";</script></head>
            <body><!-- comment --><p>Artigo&nbsp;1.&ordm;</p>
            <p>Objeto   e
            âmbito</p><noscript>ativar JS</noscript></body></html>"#;
        assert_eq!(html_text(html, 500_000), "Artigo 1.º Objeto e âmbito");
    }

    #[test]
    fn text_is_capped_on_char_boundary() {
        let html = "<p>ação ação</p>";
        assert_eq!(html_text(html, 3), "açã");
        assert_eq!(html_text(html, 100), "ação ação");
    }

    #[test]
    fn entities_decoded() {
        assert_eq!(decode_entities("a &amp; b &#231; &#xE3; &bogus;"), "a & b ç ã &bogus;");
    }

    #[test]
    fn url_title_uses_filename() {
        assert_eq!(
            title_from_url("https://files.dre.pt/1s/2024/01/0010000100.pdf"),
            "0010000100"
        );
        assert_eq!(
            title_from_url("https://dre.pt/docs/Lei%20de%20Bases.pdf?x=1"),
            "Lei de Bases"
        );
        assert_eq!(title_from_url("https://dre.pt/"), "https://dre.pt/");
    }

    #[test]
    fn pdf_text_rejects_garbage() {
        assert!(pdf_text(b"definitely not a pdf", 100).is_err());
    }
}
