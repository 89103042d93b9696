//! Tag-based allow filter.
//!
//! Each rule maps a tag name to a glob pattern. An instance is allowed
//! only if every rule matches that instance's tag value; a missing tag is
//! matched as the empty string. An empty filter allows everything.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use glob::{MatchOptions, Pattern};

use crate::error::{ConfigError, ConfigResult};

/// `*` does not cross `/`, matching shell path-glob semantics.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled `tag → glob` rules.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    rules: BTreeMap<String, Pattern>,
}

impl TagFilter {
    /// Compile a filter from raw rules. Invalid globs are configuration errors.
    pub fn new(rules: &HashMap<String, String>) -> ConfigResult<Self> {
        let mut compiled = BTreeMap::new();
        for (tag, pattern) in rules {
            let glob = Pattern::new(pattern).map_err(|e| ConfigError::InvalidFilter {
                tag: tag.clone(),
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            compiled.insert(tag.clone(), glob);
        }
        Ok(Self { rules: compiled })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether an instance with these tags passes every rule.
    pub fn allows(&self, tags: &HashMap<String, String>) -> bool {
        self.rules.iter().all(|(tag, pattern)| {
            let value = tags.get(tag).map(String::as_str).unwrap_or("");
            pattern.matches_with(value, MATCH_OPTIONS)
        })
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        f.write_str("{")?;
        for (tag, pattern) in &self.rules {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{tag}={}", pattern.as_str())?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn filter(pairs: &[(&str, &str)]) -> TagFilter {
        TagFilter::new(&tags(pairs)).unwrap()
    }

    #[test]
    fn empty_filter_allows_everything() {
        let f = TagFilter::default();
        assert!(f.is_empty());
        assert!(f.allows(&HashMap::new()));
        assert!(f.allows(&tags(&[("env", "staging")])));
    }

    #[test]
    fn prefix_glob_includes_matching_value() {
        let f = filter(&[("env", "prod*")]);
        assert!(f.allows(&tags(&[("env", "production")])));
        assert!(f.allows(&tags(&[("env", "prod")])));
    }

    #[test]
    fn prefix_glob_excludes_other_values() {
        let f = filter(&[("env", "prod*")]);
        assert!(!f.allows(&tags(&[("env", "staging")])));
    }

    #[test]
    fn missing_tag_matches_as_empty_string() {
        let f = filter(&[("env", "prod*")]);
        assert!(!f.allows(&HashMap::new()));
        assert!(!f.allows(&tags(&[("team", "payments")])));

        let any = filter(&[("env", "*")]);
        assert!(any.allows(&HashMap::new()));
    }

    #[test]
    fn every_rule_must_match() {
        let f = filter(&[("env", "prod*"), ("team", "pay?ents")]);
        assert!(f.allows(&tags(&[("env", "prod-eu"), ("team", "payments")])));
        assert!(!f.allows(&tags(&[("env", "prod-eu"), ("team", "search")])));
    }

    #[test]
    fn star_does_not_cross_separator() {
        let f = filter(&[("path", "a/*")]);
        assert!(f.allows(&tags(&[("path", "a/b")])));
        assert!(!f.allows(&tags(&[("path", "a/b/c")])));
    }

    #[test]
    fn invalid_glob_is_rejected() {
        let err = TagFilter::new(&tags(&[("env", "[prod")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFilter { .. }));
    }

    #[test]
    fn display_lists_rules_sorted() {
        let f = filter(&[("team", "core"), ("env", "prod*")]);
        assert_eq!(f.to_string(), "{env=prod*, team=core}");
    }
}
