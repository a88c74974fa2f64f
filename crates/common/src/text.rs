//! Small string helpers shared by the config and image crates.

use std::collections::HashSet;

/// Trim every item, drop empty ones, and remove duplicates while keeping the
/// position of each first occurrence.
///
/// The output is never re-sorted: two callers passing the same items in a
/// different order get two different (but individually stable) lists.
pub fn merge_unique<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let value = item.as_ref().trim();
        if !value.is_empty() && seen.insert(value.to_string()) {
            out.push(value.to_string());
        }
    }
    out
}

/// Reduce `name` to a single safe path/tag component.
///
/// Lowercased, since image repository names must be. Characters outside
/// `[a-z0-9._-]` become `-`; leading and trailing dots and dashes are
/// stripped. Falls back to `"project"`.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '-');
    if cleaned.is_empty() {
        "project".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn merge_unique_keeps_first_occurrence_order() {
        assert_eq!(merge_unique(["jq", " git ", "", "jq", "curl"]), vec![
            "jq", "git", "curl"
        ]);
    }

    #[test]
    fn merge_unique_never_sorts() {
        assert_eq!(merge_unique(["git", "jq"]), vec!["git", "jq"]);
        assert_eq!(merge_unique(["jq", "git"]), vec!["jq", "git"]);
    }

    #[rstest]
    #[case("my-app", "my-app")]
    #[case("My App!", "my-app")]
    #[case("MyApp", "myapp")]
    #[case("..hidden", "hidden")]
    #[case("  ", "project")]
    #[case("../..", "project")]
    #[case("svc_v1.2", "svc_v1.2")]
    fn sanitize(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_component(input), expected);
    }
}
