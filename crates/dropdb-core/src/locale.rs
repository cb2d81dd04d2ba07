//! Country signal table and locale detection.
//!
//! Locales are lowercase country names (`"chile"`, `"costa_rica"`), the form
//! the run artifacts and the persistent store carry.

use url::Url;

/// ISO2 code to locale name.
const ISO2_LOCALES: &[(&str, &str)] = &[
    ("CL", "chile"),
    ("CO", "colombia"),
    ("MX", "mexico"),
    ("PE", "peru"),
    ("AR", "argentina"),
    ("PY", "paraguay"),
    ("EC", "ecuador"),
    ("PA", "panama"),
    ("GT", "guatemala"),
    ("ES", "espana"),
    ("UY", "uruguay"),
    ("US", "usa"),
    ("VE", "venezuela"),
    ("BO", "bolivia"),
    ("CR", "costa_rica"),
    ("HN", "honduras"),
    ("NI", "nicaragua"),
    ("DO", "republica_dominicana"),
    ("SV", "el_salvador"),
];

/// Non-standard codes seen in provider list file names.
const ISO_SYNONYMS: &[(&str, &str)] = &[("PN", "PA"), ("GUT", "GT")];

/// Storefront markets detectable from URLs, in priority order. The first
/// entry whose TLD or path signal matches any candidate wins.
const URL_SIGNALS: &[(&str, &str)] = &[
    ("cl", "chile"),
    ("co", "colombia"),
    ("mx", "mexico"),
    ("pe", "peru"),
    ("ar", "argentina"),
    ("py", "paraguay"),
    ("ec", "ecuador"),
    ("pa", "panama"),
    ("gt", "guatemala"),
    ("es", "espana"),
];

/// Translates an ISO2 (or known synonym) code to its locale name.
#[must_use]
pub fn locale_from_iso2(code: &str) -> Option<&'static str> {
    let upper = code.trim().to_ascii_uppercase();
    let code = ISO_SYNONYMS
        .iter()
        .find(|(alias, _)| *alias == upper)
        .map_or(upper.as_str(), |(_, canonical)| *canonical);
    ISO2_LOCALES
        .iter()
        .find(|(iso, _)| *iso == code)
        .map(|(_, name)| *name)
}

/// Normalizes a locale as found in artifacts: short codes are translated,
/// names are lowercased with spaces as underscores.
#[must_use]
pub fn normalize_locale(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.len() <= 3 {
        if let Some(name) = locale_from_iso2(trimmed) {
            return Some(name.to_string());
        }
    }
    let lowered = trimmed.to_lowercase().replace(' ', "_");
    if lowered == "spain" {
        return Some("espana".to_string());
    }
    Some(lowered)
}

/// Detects a locale from candidate URLs (image, href, provider URL).
///
/// Host TLDs are checked before path segments across all candidates.
#[must_use]
pub fn detect_locale<'a, I>(candidates: I) -> Option<&'static str>
where
    I: IntoIterator<Item = &'a str>,
{
    let parsed: Vec<Url> = candidates
        .into_iter()
        .filter_map(|raw| Url::parse(raw.trim()).ok())
        .collect();

    let tlds: Vec<String> = parsed
        .iter()
        .filter_map(|u| u.host_str())
        .filter_map(|host| host.rsplit('.').next())
        .map(str::to_ascii_lowercase)
        .collect();
    if let Some((_, name)) = URL_SIGNALS
        .iter()
        .find(|(tld, _)| tlds.iter().any(|t| t == tld))
    {
        return Some(*name);
    }

    let segments: Vec<String> = parsed
        .iter()
        .filter_map(|u| u.path_segments())
        .flat_map(|segs| segs.map(str::to_lowercase).collect::<Vec<_>>())
        .collect();
    URL_SIGNALS
        .iter()
        .find(|(iso, name)| {
            segments.iter().any(|s| {
                s == iso || s == name || (*name == "espana" && s == "spain")
            })
        })
        .map(|(_, name)| *name)
}
