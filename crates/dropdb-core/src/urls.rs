//! URL and name helpers shared by the extractor, the consolidator and the
//! identity resolver.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static PROVIDER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"provider/(\d+)").expect("valid regex"));
static PROVIDER_SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/provider/\d+/([^/?#]+)").expect("valid regex"));

/// Name recorded when a provider page shows no heading.
pub const PLACEHOLDER_PROVIDER_NAME: &str = "Proveedor";

/// Labels the storefront renders when a provider's real name is unavailable.
const PLACEHOLDER_PROVIDER_NAMES: &[&str] = &["proveedor", "provider"];

/// Strips query string, fragment and trailing slash.
///
/// Unparseable input is trimmed textually so a malformed URL still yields a
/// stable key.
#[must_use]
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(mut url) = Url::parse(trimmed) {
        url.set_query(None);
        url.set_fragment(None);
        let mut out = url.to_string();
        while out.ends_with('/') && !out.ends_with("://") {
            out.pop();
        }
        return out;
    }
    let cut = trimmed
        .find(['?', '#'])
        .map_or(trimmed, |idx| &trimmed[..idx]);
    cut.trim_end_matches('/').to_string()
}

/// Resolves `href` against `origin`. Returns `None` for empty or
/// unresolvable input.
#[must_use]
pub fn absolutize(href: &str, origin: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") {
        return None;
    }
    origin.join(href).ok().map(String::from)
}

/// Lowercase ASCII slug, diacritics folded, runs of other characters
/// collapsed to single hyphens.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars().flat_map(char::to_lowercase) {
        let folded = fold_diacritic(ch);
        if folded.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(folded);
        } else {
            pending_dash = true;
        }
    }
    out
}

fn fold_diacritic(ch: char) -> char {
    match ch {
        'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

#[must_use]
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapses internal whitespace runs to single spaces and trims.
#[must_use]
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `true` for empty names and the untranslated "Provider" label.
#[must_use]
pub fn is_placeholder_provider_name(name: &str) -> bool {
    let name = name.trim();
    name.is_empty()
        || PLACEHOLDER_PROVIDER_NAMES
            .iter()
            .any(|p| name.eq_ignore_ascii_case(p))
}

/// Recovers a display name from a `/provider/<id>/<slug>` URL.
#[must_use]
pub fn provider_name_from_url(url: &str) -> Option<String> {
    let slug = PROVIDER_SLUG_RE.captures(url)?.get(1)?.as_str();
    let words = slug.replace(['-', '_', '+'], " ");
    let name = title_case(&normalize_whitespace(&words));
    (!name.is_empty()).then_some(name)
}

#[must_use]
pub fn provider_id_from_url(url: &str) -> Option<i64> {
    PROVIDER_ID_RE.captures(url)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_url_strips_query_fragment_and_trailing_slash() {
        assert_eq!(
            canonical_url("https://app.example.cl/provider/12/acme/?tab=1#top"),
            "https://app.example.cl/provider/12/acme"
        );
    }

    #[test]
    fn canonical_url_keeps_bare_origin() {
        assert_eq!(canonical_url("https://example.com/"), "https://example.com");
    }

    #[test]
    fn canonical_url_handles_relative_input() {
        assert_eq!(canonical_url(" /product-details/451/?x=1 "), "/product-details/451");
    }

    #[test]
    fn absolutize_joins_relative_paths() {
        let origin = Url::parse("https://app.example.cl/dashboard/provider/9").unwrap();
        assert_eq!(
            absolutize("/dashboard/product-details/451?x=1", &origin).as_deref(),
            Some("https://app.example.cl/dashboard/product-details/451?x=1")
        );
        assert!(absolutize("  ", &origin).is_none());
        assert!(absolutize("javascript:void(0)", &origin).is_none());
    }

    #[test]
    fn slugify_folds_and_collapses() {
        assert_eq!(slugify("  Cámara Fotográfica 4K!! "), "camara-fotografica-4k");
        assert_eq!(slugify("Niño & Niña"), "nino-nina");
    }

    #[test]
    fn title_case_capitalizes_each_word() {
        assert_eq!(title_case("super ofertas chile"), "Super Ofertas Chile");
    }

    #[test]
    fn placeholder_names() {
        assert!(is_placeholder_provider_name("Proveedor"));
        assert!(is_placeholder_provider_name(" PROVIDER "));
        assert!(is_placeholder_provider_name(""));
        assert!(!is_placeholder_provider_name("Proveedora Sur"));
    }

    #[test]
    fn provider_name_recovered_from_slug() {
        assert_eq!(
            provider_name_from_url("https://app.example.cl/dashboard/provider/77/mega-store_cl?x=1")
                .as_deref(),
            Some("Mega Store Cl")
        );
        assert!(provider_name_from_url("https://app.example.cl/dashboard/provider/77").is_none());
    }

    #[test]
    fn provider_id_parsed_from_path() {
        assert_eq!(
            provider_id_from_url("https://app.example.cl/dashboard/provider/77/x"),
            Some(77)
        );
        assert_eq!(provider_id_from_url("https://app.example.cl/catalog"), None);
    }
}
