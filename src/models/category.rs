use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What part of the system a change touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeCategory {
    /// Login, sessions, tokens, permissions
    #[serde(alias = "auth")]
    Authentication,
    /// Sockets, HTTP clients and servers
    #[serde(alias = "net")]
    Network,
    /// Reading or writing files and paths
    #[serde(alias = "fs")]
    Filesystem,
    /// Template rendering and output escaping
    #[serde(alias = "templates")]
    Templating,
    /// Databases and other storage
    #[serde(alias = "db")]
    Persistence,
    /// Hashing, signing, encryption
    #[serde(alias = "crypto")]
    Cryptography,
    /// Nothing security relevant
    None,
}

/// Categories whose presence makes a security review mandatory
pub const SECURITY_SENSITIVE: &[ChangeCategory] = &[
    ChangeCategory::Authentication,
    ChangeCategory::Network,
    ChangeCategory::Filesystem,
    ChangeCategory::Templating,
    ChangeCategory::Persistence,
    ChangeCategory::Cryptography,
];

impl ChangeCategory {
    pub fn name(&self) -> &'static str {
        match self {
            ChangeCategory::Authentication => "authentication",
            ChangeCategory::Network => "network",
            ChangeCategory::Filesystem => "filesystem",
            ChangeCategory::Templating => "templating",
            ChangeCategory::Persistence => "persistence",
            ChangeCategory::Cryptography => "cryptography",
            ChangeCategory::None => "none",
        }
    }

    /// Parse from string (case-insensitive), accepting the short aliases
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "authentication" | "auth" => Some(ChangeCategory::Authentication),
            "network" | "net" => Some(ChangeCategory::Network),
            "filesystem" | "fs" => Some(ChangeCategory::Filesystem),
            "templating" | "templates" => Some(ChangeCategory::Templating),
            "persistence" | "db" => Some(ChangeCategory::Persistence),
            "cryptography" | "crypto" => Some(ChangeCategory::Cryptography),
            "none" => Some(ChangeCategory::None),
            _ => None,
        }
    }

    pub fn is_security_sensitive(&self) -> bool {
        SECURITY_SENSITIVE.contains(self)
    }
}

impl std::fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The set of categories carried by a single change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategorySet(BTreeSet<ChangeCategory>);

impl CategorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: ChangeCategory) -> bool {
        self.0.insert(category)
    }

    pub fn contains(&self, category: ChangeCategory) -> bool {
        self.0.contains(&category)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeCategory> {
        self.0.iter()
    }

    /// True if any category intersects the security-sensitive set
    pub fn is_security_sensitive(&self) -> bool {
        self.0.iter().any(ChangeCategory::is_security_sensitive)
    }

    /// Parse a list of tokens, returning the first token that is not a category
    pub fn parse<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Result<Self, String> {
        let mut set = Self::new();
        for token in tokens {
            let category =
                ChangeCategory::from_str(token).ok_or_else(|| token.to_string())?;
            set.insert(category);
        }
        Ok(set)
    }
}

impl FromIterator<ChangeCategory> for CategorySet {
    fn from_iter<I: IntoIterator<Item = ChangeCategory>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[ChangeCategory; N]> for CategorySet {
    fn from(categories: [ChangeCategory; N]) -> Self {
        categories.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_sensitivity() {
        assert!(CategorySet::from([ChangeCategory::Persistence]).is_security_sensitive());
        assert!(!CategorySet::new().is_security_sensitive());
        assert!(!CategorySet::from([ChangeCategory::None]).is_security_sensitive());
        assert!(CategorySet::from([ChangeCategory::None, ChangeCategory::Cryptography])
            .is_security_sensitive());
    }

    #[test]
    fn test_every_sensitive_category_triggers_review() {
        for category in SECURITY_SENSITIVE {
            assert!(CategorySet::from([*category]).is_security_sensitive());
        }
    }

    #[test]
    fn test_parse_aliases() {
        let set = CategorySet::parse(["db", "Crypto", "fs"]).unwrap();
        assert!(set.contains(ChangeCategory::Persistence));
        assert!(set.contains(ChangeCategory::Cryptography));
        assert!(set.contains(ChangeCategory::Filesystem));

        assert_eq!(CategorySet::parse(["auth", "gpu"]).unwrap_err(), "gpu");
    }

    #[test]
    fn test_deserialize_alias() {
        let set: CategorySet = serde_json::from_str(r#"["db", "templates"]"#).unwrap();
        assert!(set.contains(ChangeCategory::Persistence));
        assert!(set.contains(ChangeCategory::Templating));
    }
}
