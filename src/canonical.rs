//! URL canonicalization.
//!
//! The canonical form is the identity used for frontier dedup and document
//! keys: absolute, fragment removed, everything else left as parsed.

use url::Url;

/// Resolve `raw` against `base` and strip the fragment.
///
/// Malformed input is returned unchanged so a bad link never aborts a
/// batch; the allow-list filter rejects it later.
pub fn canonicalize(raw: &str, base: Option<&Url>) -> String {
    let trimmed = raw.trim();
    let parsed = match Url::parse(trimmed) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.and_then(|b| b.join(trimmed).ok()),
        Err(_) => None,
    };

    match parsed {
        Some(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        None => raw.to_string(),
    }
}

/// Like [`canonicalize`], but takes the base as a string.
pub fn canonicalize_str(raw: &str, base: &str) -> String {
    let base = Url::parse(base).ok();
    canonicalize(raw, base.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fragment_keeps_query() {
        assert_eq!(
            canonicalize("https://x.pt/a?b=1#frag", None),
            "https://x.pt/a?b=1"
        );
    }

    #[test]
    fn urls_differing_only_by_fragment_are_equal() {
        let a = canonicalize("https://dre.pt/legislacao/123#art1", None);
        let b = canonicalize("https://dre.pt/legislacao/123#art2", None);
        assert_eq!(a, b);
    }

    #[test]
    fn preserves_trailing_slash() {
        assert_eq!(
            canonicalize("https://dre.pt/legislacao/", None),
            "https://dre.pt/legislacao/"
        );
        assert_eq!(
            canonicalize("https://dre.pt/legislacao", None),
            "https://dre.pt/legislacao"
        );
    }

    #[test]
    fn resolves_relative_against_base() {
        let base = Url::parse("https://dre.pt/legislacao/index.html").unwrap();
        assert_eq!(
            canonicalize("lei/42?p=2#top", Some(&base)),
            "https://dre.pt/legislacao/lei/42?p=2"
        );
        assert_eq!(
            canonicalize("/dr/detalhe/1", Some(&base)),
            "https://dre.pt/dr/detalhe/1"
        );
    }

    #[test]
    fn relative_without_base_is_returned_unchanged() {
        assert_eq!(canonicalize("lei/42#x", None), "lei/42#x");
    }

    #[test]
    fn malformed_is_returned_unchanged() {
        assert_eq!(canonicalize("http://[::1", None), "http://[::1");
        assert_eq!(
            canonicalize_str("http://exa mple.pt/x", "not a base"),
            "http://exa mple.pt/x"
        );
    }
}
