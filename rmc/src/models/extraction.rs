use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Technology,
    Product,
    Metric,
    Currency,
    Percentage,
    Number,
    Date,
    Version,
    ProperNoun,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Person => write!(f, "person"),
            Self::Organization => write!(f, "organization"),
            Self::Technology => write!(f, "technology"),
            Self::Product => write!(f, "product"),
            Self::Metric => write!(f, "metric"),
            Self::Currency => write!(f, "currency"),
            Self::Percentage => write!(f, "percentage"),
            Self::Number => write!(f, "number"),
            Self::Date => write!(f, "date"),
            Self::Version => write!(f, "version"),
            Self::ProperNoun => write!(f, "proper_noun"),
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "person" | "people" => Ok(Self::Person),
            "organization" | "organisation" | "org" | "company" => Ok(Self::Organization),
            "technology" | "tech" | "tool" => Ok(Self::Technology),
            "product" => Ok(Self::Product),
            "metric" => Ok(Self::Metric),
            "currency" | "money" => Ok(Self::Currency),
            "percentage" | "percent" => Ok(Self::Percentage),
            "number" | "quantity" => Ok(Self::Number),
            "date" | "time" => Ok(Self::Date),
            "version" => Ok(Self::Version),
            "proper_noun" | "name" | "other" => Ok(Self::ProperNoun),
            _ => Err(format!("Unknown entity type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            name: name.into(),
            entity_type,
        }
    }
}

/// A key/value statement spotted in free text ("the auth method is JWT").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateClaim {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
    pub concepts: Vec<String>,
    pub topics: Vec<String>,
    #[serde(default)]
    pub claims: Vec<CandidateClaim>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
            && self.concepts.is_empty()
            && self.topics.is_empty()
            && self.claims.is_empty()
    }

    /// Trims names, drops blanks and removes case-insensitive duplicates while
    /// keeping first-occurrence order.
    pub fn normalized(self) -> Self {
        let mut seen = HashSet::new();
        let entities = self
            .entities
            .into_iter()
            .filter_map(|e| {
                let name = e.name.trim().to_string();
                if name.is_empty() || !seen.insert(name.to_lowercase()) {
                    return None;
                }
                Some(Entity::new(name, e.entity_type))
            })
            .collect();

        let mut seen_claims = HashSet::new();
        let claims = self
            .claims
            .into_iter()
            .filter_map(|c| {
                let key = c.key.trim().to_string();
                let value = c.value.trim().to_string();
                if key.is_empty() || value.is_empty() || !seen_claims.insert(key.clone()) {
                    return None;
                }
                Some(CandidateClaim { key, value })
            })
            .collect();

        Self {
            entities,
            concepts: dedup_terms(self.concepts),
            topics: dedup_terms(self.topics),
            claims,
        }
    }

    /// Case-folded entity names and concepts used for overlap counting.
    pub fn overlap_keys(&self) -> BTreeSet<String> {
        self.entities
            .iter()
            .map(|e| e.name.to_lowercase())
            .chain(self.concepts.iter().map(|c| c.to_lowercase()))
            .collect()
    }
}

fn dedup_terms(terms: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .collect()
}
