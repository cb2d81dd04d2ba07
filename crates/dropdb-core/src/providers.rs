use std::collections::HashSet;
use std::path::Path;

use crate::locale::{detect_locale, locale_from_iso2, normalize_locale};
use crate::ConfigError;

/// One provider page to scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTarget {
    pub url: String,
    /// Set when the URL came from a `providers_XX.txt` partition.
    pub locale: Option<String>,
}

/// Parses a provider list: one URL per line, blank lines and `#` comments
/// ignored.
#[must_use]
pub fn parse_provider_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Loads provider targets from a list file or a directory of list files.
///
/// In a directory, `providers_XX.txt` assigns the locale for ISO2 `XX`;
/// any other `.txt` file contributes unpartitioned URLs. URLs are
/// deduplicated in first-seen order. `only_locale` keeps one partition.
///
/// # Errors
///
/// Returns [`ConfigError::ProviderList`] if the path cannot be read and
/// [`ConfigError::NoProviderUrls`] if no URL survives filtering.
pub fn load_provider_targets(
    path: &Path,
    only_locale: Option<&str>,
) -> Result<Vec<ProviderTarget>, ConfigError> {
    let list_err = |source: std::io::Error| ConfigError::ProviderList {
        path: path.display().to_string(),
        source,
    };

    let mut files: Vec<(std::path::PathBuf, Option<String>)> = Vec::new();
    if path.is_dir() {
        let mut entries: Vec<std::path::PathBuf> = std::fs::read_dir(path)
            .map_err(list_err)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        entries.sort();
        for file in entries {
            let locale = file
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(partition_locale);
            files.push((file, locale));
        }
    } else {
        files.push((path.to_path_buf(), None));
    }

    let wanted = only_locale.and_then(normalize_locale);
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for (file, locale) in files {
        if wanted.is_some() && locale != wanted {
            continue;
        }
        let text = std::fs::read_to_string(&file).map_err(|source| ConfigError::ProviderList {
            path: file.display().to_string(),
            source,
        })?;
        for url in parse_provider_list(&text) {
            if !seen.insert(url.clone()) {
                continue;
            }
            if let (Some(partition), Some(detected)) = (locale.as_deref(), detect_locale([url.as_str()])) {
                if partition != detected {
                    tracing::warn!(
                        provider_url = %url,
                        partition,
                        detected,
                        "provider URL signals a different country than its list"
                    );
                }
            }
            targets.push(ProviderTarget {
                url,
                locale: locale.clone(),
            });
        }
    }

    if targets.is_empty() {
        return Err(ConfigError::NoProviderUrls {
            path: path.display().to_string(),
        });
    }
    Ok(targets)
}

/// `providers_cl` → `chile`.
fn partition_locale(stem: &str) -> Option<String> {
    let code = stem.strip_prefix("providers_")?;
    locale_from_iso2(code)
        .map(str::to_string)
        .or_else(|| normalize_locale(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_provider_list_skips_blank_and_comments() {
        let text = "\n# header\nhttps://a.example.cl/provider/1\n   \n  https://a.example.cl/provider/2  \n#https://skip\n";
        assert_eq!(
            parse_provider_list(text),
            vec![
                "https://a.example.cl/provider/1".to_string(),
                "https://a.example.cl/provider/2".to_string()
            ]
        );
    }

    #[test]
    fn single_file_has_no_locale_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("providers.txt");
        std::fs::write(&file, "https://x/p/1\nhttps://x/p/2\nhttps://x/p/1\n").unwrap();
        let targets = load_provider_targets(&file, None).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|t| t.locale.is_none()));
    }

    #[test]
    fn directory_partitions_assign_locale() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("providers_CL.txt"), "https://x/p/1\n").unwrap();
        std::fs::write(dir.path().join("providers_PN.txt"), "https://x/p/2\n").unwrap();
        std::fs::write(dir.path().join("extra.txt"), "https://x/p/3\n").unwrap();
        std::fs::write(dir.path().join("notes.md"), "https://x/p/4\n").unwrap();

        let targets = load_provider_targets(dir.path(), None).unwrap();
        let pairs: Vec<(&str, Option<&str>)> = targets
            .iter()
            .map(|t| (t.url.as_str(), t.locale.as_deref()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("https://x/p/3", None),
                ("https://x/p/1", Some("chile")),
                ("https://x/p/2", Some("panama")),
            ]
        );
    }

    #[test]
    fn locale_filter_keeps_one_partition() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("providers_CL.txt"), "https://x/p/1\n").unwrap();
        std::fs::write(dir.path().join("providers_MX.txt"), "https://x/p/2\n").unwrap();
        let targets = load_provider_targets(dir.path(), Some("MX")).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].locale.as_deref(), Some("mexico"));
    }

    #[test]
    fn empty_list_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("providers.txt");
        std::fs::write(&file, "# nothing yet\n").unwrap();
        let err = load_provider_targets(&file, None).unwrap_err();
        assert!(matches!(err, ConfigError::NoProviderUrls { .. }));
    }

    #[test]
    fn missing_path_reports_provider_list_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_provider_targets(&dir.path().join("absent.txt"), None).unwrap_err();
        assert!(matches!(err, ConfigError::ProviderList { .. }));
    }
}
