use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    Causes,
    Impacts,
    Contradicts,
    Supports,
    RelatesTo,
}

impl RelationType {
    pub const ALL: [RelationType; 5] = [
        RelationType::Causes,
        RelationType::Impacts,
        RelationType::Contradicts,
        RelationType::Supports,
        RelationType::RelatesTo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Causes => "CAUSES",
            Self::Impacts => "IMPACTS",
            Self::Contradicts => "CONTRADICTS",
            Self::Supports => "SUPPORTS",
            Self::RelatesTo => "RELATES_TO",
        }
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace([' ', '-'], "_").as_str() {
            "CAUSES" => Ok(Self::Causes),
            "IMPACTS" => Ok(Self::Impacts),
            "CONTRADICTS" => Ok(Self::Contradicts),
            "SUPPORTS" => Ok(Self::Supports),
            "RELATES_TO" => Ok(Self::RelatesTo),
            _ => Err(format!("Unknown relation type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InferredBy {
    #[default]
    Rule,
    Model,
}

impl std::fmt::Display for InferredBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rule => write!(f, "rule"),
            Self::Model => write!(f, "model"),
        }
    }
}

impl std::str::FromStr for InferredBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rule" => Ok(Self::Rule),
            "model" => Ok(Self::Model),
            _ => Err(format!("Unknown inference source: {s}")),
        }
    }
}

/// Directed, typed, weighted edge between two entries. Unique per
/// (source, target, relation_type).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRelation {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    pub strength: f64,
    pub reason: String,
    pub inferred_by: InferredBy,
    pub entity_overlap: u32,
    pub created_at: DateTime<Utc>,
}

impl MemoryRelation {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation_type: RelationType,
        strength: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation_type,
            strength: strength.clamp(0.0, 1.0),
            reason: reason.into(),
            inferred_by: InferredBy::Rule,
            entity_overlap: 0,
            created_at: super::timestamp_now(),
        }
    }

    /// The endpoint opposite `id`, if `id` is one of the two endpoints.
    pub fn other_end(&self, id: &str) -> Option<&str> {
        if self.source_id == id {
            Some(&self.target_id)
        } else if self.target_id == id {
            Some(&self.source_id)
        } else {
            None
        }
    }
}
