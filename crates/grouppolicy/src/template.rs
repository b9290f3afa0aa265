//! Property templates
//!
//! Template strings may reference properties in two forms:
//!
//! - `$(name)` is replaced with the property value verbatim
//! - `${name}` is replaced with the value, first letter capitalized
//!
//! Names that resolve to nothing are replaced with an empty string.
//! Substituted values are never themselves expanded.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// A flat property map (`name => value`).
pub type Properties = BTreeMap<String, String>;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\(([a-z0-9-]+)\)|\$\{([a-z0-9-]+)\}").expect("template token pattern")
});

/// Expand every token in `template` using `lookup` to find property values.
pub fn expand<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    TOKEN
        .replace_all(template, |caps: &Captures<'_>| {
            if let Some(name) = caps.get(1) {
                lookup(name.as_str()).unwrap_or_default()
            } else {
                let value = caps
                    .get(2)
                    .and_then(|name| lookup(name.as_str()))
                    .unwrap_or_default();
                capitalize(&value)
            }
        })
        .into_owned()
}

/// Uppercase the first character, leaving the rest alone.
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercase and strip everything that is not an ASCII letter or digit.
///
/// `"Vice-President"` becomes `"vicepresident"`.
pub fn simplify(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Naive English plural: append `s` unless the word already ends in `s`.
///
/// Irregular words are not handled ("bus" stays "bus", "deputy" becomes
/// "deputys"). Callers that need better names override the aggregate
/// templates instead.
pub fn plural(word: &str) -> String {
    if word.ends_with('s') {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_expand_both_forms() {
        let p = props(&[("branch", "north"), ("office", "vice-president")]);
        let result = expand("${branch} ${office} <$(branch)>", |name| p.get(name).cloned());
        assert_eq!(result, "North Vice-president <north>");
    }

    #[test]
    fn test_expand_unknown_name_is_empty() {
        let result = expand("$(missing)-x@$(domain)", |_| None);
        assert_eq!(result, "-x@");
    }

    #[test]
    fn test_expand_does_not_recurse() {
        let p = props(&[("a", "$(b)"), ("b", "nope")]);
        assert_eq!(expand("$(a)", |name| p.get(name).cloned()), "$(b)");
    }

    #[test]
    fn test_mismatched_brackets_are_literal() {
        let p = props(&[("a", "x")]);
        assert_eq!(expand("$(a}", |name| p.get(name).cloned()), "$(a}");
    }

    #[test]
    fn test_simplify() {
        assert_eq!(simplify("Vice-President"), "vicepresident");
        assert_eq!(simplify("Rapier Marshal"), "rapiermarshal");
        assert_eq!(simplify("--"), "");
    }

    #[test]
    fn test_plural_is_naive() {
        assert_eq!(plural("president"), "presidents");
        assert_eq!(plural("rapier-marshal"), "rapier-marshals");
        assert_eq!(plural("bus"), "bus");
        assert_eq!(plural("deputy"), "deputys");
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("north"), "North");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("élan"), "Élan");
    }

    proptest! {
        #[test]
        fn prop_text_without_dollar_is_unchanged(text in "[^$]*") {
            prop_assert_eq!(expand(&text, |_| Some("x".to_string())), text);
        }

        #[test]
        fn prop_simplify_is_lower_alphanumeric(text in ".*") {
            let simplified = simplify(&text);
            prop_assert!(simplified.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
            prop_assert_eq!(simplify(&simplified), simplified.clone());
        }
    }
}
