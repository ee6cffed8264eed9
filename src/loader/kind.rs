//! Document kinds and their conventional locations inside a layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A kind of document a layer may contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Domain,
    Nlu,
    Stories,
    Rules,
    Config,
    Endpoints,
    Credentials,
}

impl DocumentKind {
    /// Every kind, in load order.
    pub const ALL: [DocumentKind; 7] = [
        DocumentKind::Domain,
        DocumentKind::Nlu,
        DocumentKind::Stories,
        DocumentKind::Rules,
        DocumentKind::Config,
        DocumentKind::Endpoints,
        DocumentKind::Credentials,
    ];

    /// Candidate locations relative to the layer root, highest priority first.
    ///
    /// Entries ending in `/` are directories whose YAML files are all loaded.
    pub fn candidates(&self) -> &'static [&'static str] {
        match self {
            DocumentKind::Domain => &["domain.yml", "domain.yaml", "domain/"],
            DocumentKind::Nlu => &["data/nlu/", "nlu/", "data/nlu.yml", "nlu.yml"],
            DocumentKind::Stories => &[
                "data/stories/",
                "stories/",
                "data/stories.yml",
                "stories.yml",
            ],
            DocumentKind::Rules => &["data/rules/", "rules/", "data/rules.yml", "rules.yml"],
            DocumentKind::Config => &["config.yml", "config.yaml"],
            DocumentKind::Endpoints => &["endpoints.yml", "endpoints.yaml"],
            DocumentKind::Credentials => &["credentials.yml", "credentials.yaml"],
        }
    }

    /// Whether documents of this kind are merged across layers
    /// (as opposed to selected whole-file by precedence).
    pub fn is_mergeable(&self) -> bool {
        matches!(
            self,
            DocumentKind::Domain | DocumentKind::Nlu | DocumentKind::Stories | DocumentKind::Rules
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Domain => "domain",
            DocumentKind::Nlu => "nlu",
            DocumentKind::Stories => "stories",
            DocumentKind::Rules => "rules",
            DocumentKind::Config => "config",
            DocumentKind::Endpoints => "endpoints",
            DocumentKind::Credentials => "credentials",
        }
    }

    /// File name used when the merged or selected document is exported.
    pub fn file_name(&self) -> String {
        format!("{}.yml", self.as_str())
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown document kind: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_are_ordered() {
        assert_eq!(DocumentKind::Nlu.candidates()[0], "data/nlu/");
        assert_eq!(DocumentKind::Domain.candidates()[0], "domain.yml");
        for kind in DocumentKind::ALL {
            assert!(!kind.candidates().is_empty(), "{} has no candidates", kind);
        }
    }

    #[test]
    fn test_mergeable_kinds() {
        assert!(DocumentKind::Domain.is_mergeable());
        assert!(DocumentKind::Rules.is_mergeable());
        assert!(!DocumentKind::Config.is_mergeable());
        assert!(!DocumentKind::Credentials.is_mergeable());
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("NLU".parse::<DocumentKind>(), Ok(DocumentKind::Nlu));
        assert!("policies".parse::<DocumentKind>().is_err());
    }
}
