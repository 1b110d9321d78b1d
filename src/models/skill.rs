use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical taxonomy identifier. Always a lowercase ASCII slug; free-text
/// claims are resolved into one of these at the boundary and never travel
/// further as raw strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillId(String);

impl SkillId {
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SkillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SkillId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A published taxonomy node. Immutable once added; the taxonomy only grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: SkillId,
    pub display_name: String,
    pub parent: Option<SkillId>,
    pub synonyms: Vec<String>,
}

impl Skill {
    pub fn new(id: impl Into<SkillId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            parent: None,
            synonyms: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<SkillId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }
}

impl From<String> for SkillId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A worker's self-declared competence in one canonical skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillClaim {
    pub skill: SkillId,
    /// 1 (novice) ..= 5 (expert).
    pub proficiency: u8,
}
