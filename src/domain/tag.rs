use serde::{Deserialize, Serialize};

/// Normalized identifier read from a physical token (uppercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagId(String);

impl TagId {
    /// Trim and uppercase a raw identifier.
    ///
    /// Returns `None` unless the result is a non-empty hexadecimal string.
    pub fn normalize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TagId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::normalize(&value).ok_or_else(|| format!("invalid tag identifier {value:?}"))
    }
}

impl From<TagId> for String {
    fn from(tag: TagId) -> Self {
        tag.0
    }
}

impl std::fmt::Display for TagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resource category a tag resolves to (e.g. FIRE, WATER).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ResourceCategory(String);

impl ResourceCategory {
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for ResourceCategory {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<ResourceCategory> for String {
    fn from(category: ResourceCategory) -> Self {
        category.0
    }
}

impl std::fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_uppercases() {
        let tag = TagId::normalize("  ef89fe1e\r").unwrap();
        assert_eq!(tag.as_str(), "EF89FE1E");
    }

    #[test]
    fn test_normalize_rejects_non_hex() {
        assert!(TagId::normalize("").is_none());
        assert!(TagId::normalize("   ").is_none());
        assert!(TagId::normalize("53BF94DA41000Z").is_none());
        assert!(TagId::normalize("AB CD").is_none());
    }

    #[test]
    fn test_category_is_uppercased() {
        assert_eq!(ResourceCategory::new(" fire ").as_str(), "FIRE");
    }
}
