//! Allow-list filter deciding whether a discovered URL is inside a source's
//! crawl boundary.

use std::borrow::Cow;
use url::Url;

use crate::models::Source;

/// Extensions of static assets that are never worth crawling.
pub const ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "png", "jpg", "jpeg", "gif", "svg", "ico", "woff", "woff2", "ttf", "eot", "map",
];

/// Directory segments that only ever hold static assets.
const ASSET_DIRS: &[&str] = &["/css/", "/js/", "/assets/"];

/// Lowercased extension of the last path segment, if any.
pub fn path_extension(path: &str) -> Option<String> {
    let last = path.rsplit('/').next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() && ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// True when the path has an asset extension.
pub fn has_asset_extension(path: &str) -> bool {
    path_extension(path)
        .map(|ext| ASSET_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// True when the path looks like a static asset by extension or directory.
pub fn is_asset_path(path: &str) -> bool {
    if has_asset_extension(path) {
        return true;
    }
    let lower = path.to_ascii_lowercase();
    ASSET_DIRS.iter().any(|dir| lower.contains(dir))
}

fn host_allowed(host: &str, allowed_hosts: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    allowed_hosts.iter().any(|allowed| {
        let allowed = allowed.trim().to_ascii_lowercase();
        if allowed.is_empty() {
            return false;
        }
        let bare = allowed.strip_prefix("www.").unwrap_or(&allowed);
        host == allowed
            || host.ends_with(&format!(".{}", allowed))
            || host == format!("files.{}", bare)
    })
}

fn decode(s: &str) -> Cow<'_, str> {
    urlencoding::decode(s).unwrap_or(Cow::Borrowed(s))
}

fn path_allowed(path: &str, prefixes: &[String]) -> bool {
    if prefixes.is_empty() {
        return true;
    }
    let path = decode(path);
    prefixes.iter().any(|prefix| {
        let prefix = decode(prefix);
        path.starts_with(prefix.as_ref()) || path.contains(prefix.as_ref())
    })
}

/// Decide whether `url` is inside `source`'s boundary.
///
/// Unparseable URLs are rejected.
pub fn is_allowed(url: &str, source: &Source) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    if is_asset_path(parsed.path()) {
        return false;
    }
    let Some(host) = parsed.host_str() else {
        return false;
    };
    if !host_allowed(host, &source.allowed_hosts) {
        return false;
    }
    path_allowed(parsed.path(), &source.allowed_prefixes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dre() -> Source {
        Source {
            key: "dre".to_string(),
            name: "Diário da República".to_string(),
            seed_urls: vec!["https://dre.pt/legislacao".to_string()],
            allowed_hosts: vec!["dre.pt".to_string()],
            allowed_prefixes: vec!["/legislacao".to_string()],
            enabled: true,
        }
    }

    #[test]
    fn test_in_boundary_url_allowed() {
        assert!(is_allowed("https://dre.pt/legislacao/123", &dre()));
    }

    #[test]
    fn test_other_prefix_rejected() {
        assert!(!is_allowed("https://dre.pt/outro/123", &dre()));
    }

    #[test]
    fn test_foreign_host_rejected() {
        assert!(!is_allowed("https://evil.pt/legislacao/123", &dre()));
        assert!(!is_allowed("https://notdre.pt/legislacao/123", &dre()));
    }

    #[test]
    fn test_files_subdomain_allowed() {
        assert!(is_allowed("https://files.dre.pt/legislacao/x.pdf", &dre()));
    }

    #[test]
    fn test_files_variant_of_www_host() {
        let mut source = dre();
        source.allowed_hosts = vec!["www.dgsi.pt".to_string()];
        source.allowed_prefixes.clear();
        assert!(is_allowed("https://files.dgsi.pt/a.pdf", &source));
        assert!(is_allowed("https://www.dgsi.pt/jstj.nsf", &source));
        assert!(!is_allowed("https://dgsi.example/a.pdf", &source));
    }

    #[test]
    fn test_asset_extensions_rejected() {
        for url in [
            "https://dre.pt/legislacao/site.css",
            "https://dre.pt/legislacao/app.js",
            "https://dre.pt/legislacao/logo.PNG",
            "https://dre.pt/legislacao/font.woff2",
            "https://dre.pt/legislacao/bundle.js.map",
        ] {
            assert!(!is_allowed(url, &dre()), "{} should be rejected", url);
        }
    }

    #[test]
    fn test_asset_directories_rejected() {
        assert!(!is_allowed("https://dre.pt/legislacao/assets/x", &dre()));
        assert!(!is_allowed("https://dre.pt/legislacao/css/print", &dre()));
        assert!(!is_allowed("https://dre.pt/js/legislacao", &dre()));
    }

    #[test]
    fn test_empty_prefixes_allow_any_path() {
        let mut source = dre();
        source.allowed_prefixes.clear();
        assert!(is_allowed("https://dre.pt/qualquer/coisa", &source));
    }

    #[test]
    fn test_prefix_may_appear_inside_path() {
        assert!(is_allowed("https://dre.pt/pt/legislacao/99", &dre()));
    }

    #[test]
    fn test_percent_encoded_diacritics_match() {
        let mut source = dre();
        source.allowed_prefixes = vec!["/legislação".to_string()];
        assert!(is_allowed("https://dre.pt/legisla%C3%A7%C3%A3o/1", &source));

        source.allowed_prefixes = vec!["/legisla%C3%A7%C3%A3o".to_string()];
        assert!(is_allowed("https://dre.pt/legisla%C3%A7%C3%A3o/1", &source));
    }

    #[test]
    fn test_unparseable_rejected() {
        assert!(!is_allowed("not a url", &dre()));
        assert!(!is_allowed("/legislacao/1", &dre()));
        assert!(!is_allowed("mailto:geral@dre.pt", &dre()));
    }

    #[test]
    fn test_path_extension() {
        assert_eq!(path_extension("/a/b.PDF"), Some("pdf".to_string()));
        assert_eq!(path_extension("/a/b"), None);
        assert_eq!(path_extension("/a.d/b"), None);
    }
}
