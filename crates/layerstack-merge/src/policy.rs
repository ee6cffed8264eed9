//! Per-section merge policies.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How a section combines with the same section from an earlier document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergePolicy {
    /// Mappings merge by key; sequences concatenate and deduplicate by
    /// identity, keeping first-seen order.
    Merge,
    /// Mappings merge by key; sequences concatenate without deduplication.
    Append,
    /// The later value replaces the earlier one wholesale.
    Replace,
}

impl MergePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergePolicy::Merge => "merge",
            MergePolicy::Append => "append",
            MergePolicy::Replace => "replace",
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergePolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merge" | "union" | "add" => Ok(MergePolicy::Merge),
            "append" | "concat" => Ok(MergePolicy::Append),
            "replace" => Ok(MergePolicy::Replace),
            other => Err(PolicyError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Policy table errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("unknown merge policy '{0}' (expected merge, append or replace)")]
    UnknownPolicy(String),

    #[error("invalid section pattern '{0}'")]
    InvalidPattern(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PolicyRule {
    segments: Vec<String>,
    policy: MergePolicy,
}

impl PolicyRule {
    fn matches(&self, path: &[String]) -> bool {
        self.segments.len() == path.len()
            && self
                .segments
                .iter()
                .zip(path)
                .all(|(pattern, segment)| pattern == "*" || pattern == segment)
    }

    fn wildcards(&self) -> usize {
        self.segments.iter().filter(|s| *s == "*").count()
    }
}

/// Ordered table of section-path patterns and their merge policies.
///
/// Patterns are dotted paths where `*` matches exactly one segment
/// (`responses.*` matches every response but not `responses` itself).
/// When several patterns match, the one with the fewest wildcards wins;
/// among equally specific patterns the most recently inserted wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyTable {
    rules: Vec<PolicyRule>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`PolicyTable::insert`] for builtin tables.
    ///
    /// Only accepts `'static` patterns, i.e. literals written in code.
    /// Patterns from user input go through [`PolicyTable::insert`] or
    /// [`PolicyTable::extend_from_map`], which report errors. A malformed
    /// literal is a programming error: it trips a debug assertion and is
    /// otherwise left out of the table.
    pub fn with_rule(mut self, pattern: &'static str, policy: MergePolicy) -> Self {
        let inserted = self.insert(pattern, policy);
        debug_assert!(inserted.is_ok(), "invalid builtin section pattern '{}'", pattern);
        self
    }

    /// Register a policy for a pattern, replacing any earlier rule for the
    /// exact same pattern.
    pub fn insert(&mut self, pattern: &str, policy: MergePolicy) -> Result<(), PolicyError> {
        let segments = parse_pattern(pattern)?;
        self.rules.retain(|rule| rule.segments != segments);
        self.rules.push(PolicyRule { segments, policy });
        Ok(())
    }

    /// Apply `pattern = policy` overrides, e.g. from a settings file.
    pub fn extend_from_map(&mut self, overrides: &BTreeMap<String, String>) -> Result<(), PolicyError> {
        for (pattern, policy) in overrides {
            self.insert(pattern, policy.parse()?)?;
        }
        Ok(())
    }

    /// Look up the policy for a section path.
    pub fn lookup(&self, path: &[String]) -> Option<MergePolicy> {
        let mut best: Option<&PolicyRule> = None;
        for rule in self.rules.iter().filter(|r| r.matches(path)) {
            match best {
                Some(current) if rule.wildcards() > current.wildcards() => {}
                _ => best = Some(rule),
            }
        }
        best.map(|rule| rule.policy)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Rules in insertion order as `(pattern, policy)` pairs.
    pub fn rules(&self) -> impl Iterator<Item = (String, MergePolicy)> + '_ {
        self.rules
            .iter()
            .map(|rule| (rule.segments.join("."), rule.policy))
    }
}

fn parse_pattern(pattern: &str) -> Result<Vec<String>, PolicyError> {
    let segments: Vec<String> = pattern.trim().split('.').map(str::to_string).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(PolicyError::InvalidPattern(pattern.to_string()));
    }
    Ok(segments)
}
