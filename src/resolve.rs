//! Mapping user supplied version tokens (`1.21.5`, `1.21`, `1`) onto records.

use crate::error::{GovmError, Result};
use crate::models::{compare_versions, VersionRecord};

/// Pick the single best record for `token`.
///
/// An exact match wins outright, even when a longer version with the token as
/// its dotted prefix exists. Otherwise the numerically greatest record whose
/// version starts with `token.` is chosen. The token is compared as text:
/// `01` or `+1` never match `1.x`.
///
/// With `require_installed` only records flagged installed are considered, so a
/// full catalog can be passed for use/delete as well as an installed listing.
pub fn resolve_version(
    token: &str,
    candidates: &[VersionRecord],
    require_installed: bool,
) -> Result<VersionRecord> {
    let token = normalize_token(token);
    let eligible: Vec<&VersionRecord> = candidates
        .iter()
        .filter(|c| !require_installed || c.installed)
        .collect();

    if let Some(exact) = eligible.iter().find(|c| c.version == token) {
        return Ok((*exact).clone());
    }

    greatest_with_prefix(token, &eligible)
        .cloned()
        .ok_or_else(|| GovmError::VersionNotFound(token.to_string()))
}

fn normalize_token(token: &str) -> &str {
    let token = token.trim();
    token.strip_prefix("go").unwrap_or(token)
}

fn greatest_with_prefix<'a>(
    token: &str,
    candidates: &[&'a VersionRecord],
) -> Option<&'a VersionRecord> {
    let prefix = format!("{}.", token);

    candidates
        .iter()
        .copied()
        .filter(|c| c.version.starts_with(&prefix))
        .max_by(|a, b| compare_versions(&a.version, &b.version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReleaseEntry;

    fn records(versions: &[&str]) -> Vec<VersionRecord> {
        versions
            .iter()
            .map(|v| {
                VersionRecord::from_release(ReleaseEntry {
                    version: v.to_string(),
                    filename: format!("go{}.linux-amd64.tar.gz", v),
                    url: String::new(),
                    stable: true,
                    checksum: None,
                    size: None,
                })
            })
            .collect()
    }

    #[test]
    fn test_exact_match_wins_over_newer_prefix_match() {
        let candidates = records(&["1.21.5", "1.21"]);
        assert_eq!(resolve_version("1.21", &candidates, false).unwrap().version, "1.21");
    }

    #[test]
    fn test_major_token_picks_numeric_greatest() {
        let candidates = records(&["1.19.0", "1.20.5", "1.9.0"]);
        assert_eq!(resolve_version("1", &candidates, false).unwrap().version, "1.20.5");
    }

    #[test]
    fn test_minor_token_picks_latest_patch() {
        let candidates = records(&["1.22.0", "1.21.0", "1.21.5", "1.21.10", "1.2.9"]);
        assert_eq!(resolve_version("1.21", &candidates, false).unwrap().version, "1.21.10");
    }

    #[test]
    fn test_prefix_requires_separator_boundary() {
        let candidates = records(&["1.21.5", "1.2.9"]);
        assert_eq!(resolve_version("1.2", &candidates, false).unwrap().version, "1.2.9");

        let candidates = records(&["1.21.5"]);
        assert!(matches!(
            resolve_version("1.2", &candidates, false),
            Err(GovmError::VersionNotFound(_))
        ));
    }

    #[test]
    fn test_go_prefix_and_whitespace_are_ignored() {
        let candidates = records(&["1.22.0", "1.21.5"]);
        assert_eq!(resolve_version(" go1.21 ", &candidates, false).unwrap().version, "1.21.5");
    }

    #[test]
    fn test_numeric_lookalike_tokens_are_not_found() {
        let candidates = records(&["1.22.0", "1.21.5"]);
        for token in ["01", "+1", "001", "1.021"] {
            assert!(
                matches!(
                    resolve_version(token, &candidates, false),
                    Err(GovmError::VersionNotFound(ref t)) if t == token
                ),
                "{token} should not resolve"
            );
        }
    }

    #[test]
    fn test_require_installed_skips_catalog_only_records() {
        let mut candidates = records(&["1.22.0", "1.21.5", "1.21.0"]);
        candidates[2].installed = true;

        assert_eq!(resolve_version("1.21", &candidates, false).unwrap().version, "1.21.5");
        assert_eq!(resolve_version("1.21", &candidates, true).unwrap().version, "1.21.0");
        assert!(matches!(
            resolve_version("1.22.0", &candidates, true),
            Err(GovmError::VersionNotFound(_))
        ));
    }

    #[test]
    fn test_not_found() {
        let err = resolve_version("2", &records(&["1.22.0"]), false).unwrap_err();
        assert!(matches!(err, GovmError::VersionNotFound(ref t) if t == "2"));
        assert!(resolve_version("1.22", &[], false).is_err());
    }
}
