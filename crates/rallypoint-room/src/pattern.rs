//! Job-tag selectors like `MT|ST`.

use std::collections::HashSet;
use std::fmt;

use rallypoint_protocol::JobTag;

/// A compiled role pattern.
///
/// The raw text is a `|`-separated list of job tags. Each alternative must
/// match a member's whole tag, case-insensitively: `MT|ST` selects `MT`
/// and `st` but never `MTX`. Tags this build doesn't know land in
/// [`JobTag::Other`] and still compare by their upper-cased text.
///
/// An empty (or blank) pattern selects every live member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePattern {
    raw: String,
    tags: HashSet<JobTag>,
}

impl RolePattern {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let tags = raw
            .split('|')
            .filter_map(|alt| alt.parse::<JobTag>().ok())
            .collect();
        Self { raw, tags }
    }

    /// `true` for the empty pattern.
    pub fn is_any(&self) -> bool {
        self.raw.is_empty()
    }

    /// Whether a member with `tag` is selected. Untagged members only
    /// match the empty pattern.
    pub fn matches(&self, tag: Option<&JobTag>) -> bool {
        if self.is_any() {
            return true;
        }
        tag.is_some_and(|t| self.tags.contains(t))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for RolePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pattern_matches_everything() {
        let pattern = RolePattern::parse("  ");
        assert!(pattern.is_any());
        assert!(pattern.matches(None));
        assert!(pattern.matches(Some(&JobTag::H1)));
    }

    #[test]
    fn test_alternation_matches_whole_tags_case_insensitively() {
        let pattern = RolePattern::parse("mt|St");
        assert!(pattern.matches(Some(&JobTag::MT)));
        assert!(pattern.matches(Some(&JobTag::ST)));
        assert!(!pattern.matches(Some(&JobTag::H1)));
        assert!(!pattern.matches(Some(&JobTag::Other("MTX".into()))));
    }

    #[test]
    fn test_untagged_member_never_matches_non_empty_pattern() {
        assert!(!RolePattern::parse("MT").matches(None));
    }

    #[test]
    fn test_unknown_tags_compare_by_text() {
        let pattern = RolePattern::parse("caster|D1");
        assert!(pattern.matches(Some(&JobTag::Other("CASTER".into()))));
        assert!(pattern.matches(Some(&JobTag::D1)));
    }

    #[test]
    fn test_separator_only_pattern_matches_nothing() {
        let pattern = RolePattern::parse("|");
        assert!(!pattern.is_any());
        assert!(!pattern.matches(Some(&JobTag::MT)));
        assert!(!pattern.matches(None));
    }
}
