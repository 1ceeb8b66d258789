//! URL slug generation
//!
//! Lowercases the input and collapses every run of characters outside
//! `[a-z0-9]` into a single hyphen. Non-ASCII characters are separators.

use regex_lite::Regex;
use std::sync::OnceLock;

fn separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static slug pattern"))
}

/// Derive a slug from a human-readable name or title
pub fn slugify(input: &str) -> String {
    let lowered = input.to_lowercase();
    separators()
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Candidate slug for a collision attempt: `base`, `base-1`, `base-2`, ...
pub fn with_suffix(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_names() {
        assert_eq!(slugify("oncology"), "oncology");
        assert_eq!(slugify("Oncology"), "oncology");
        assert_eq!(slugify("general practitioner"), "general-practitioner");
        assert_eq!(
            slugify("pathology and labs medicine"),
            "pathology-and-labs-medicine"
        );
    }

    #[test]
    fn test_collapses_and_trims_separators() {
        assert_eq!(slugify("  Gene   Therapy! "), "gene-therapy");
        assert_eq!(slugify("COVID-19: what's next?"), "covid-19-what-s-next");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_non_ascii_is_separator() {
        assert_eq!(slugify("Ménière disease"), "m-ni-re-disease");
    }

    #[test]
    fn test_idempotent() {
        for name in ["Gene Therapy", "pathology and labs medicine", "a--b"] {
            let once = slugify(name);
            assert_eq!(slugify(&once), once);
        }
    }

    #[test]
    fn test_suffix() {
        assert_eq!(with_suffix("heart-failure", 0), "heart-failure");
        assert_eq!(with_suffix("heart-failure", 2), "heart-failure-2");
    }
}
