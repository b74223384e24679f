use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    ClaimValueMismatch,
    SemanticContradiction,
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClaimValueMismatch => write!(f, "claim_value_mismatch"),
            Self::SemanticContradiction => write!(f, "semantic_contradiction"),
        }
    }
}

impl std::str::FromStr for ConflictType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claim_value_mismatch" => Ok(Self::ClaimValueMismatch),
            "semantic_contradiction" => Ok(Self::SemanticContradiction),
            _ => Err(format!("Unknown conflict type: {s}")),
        }
    }
}

/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    #[default]
    Pending,
    Resolved,
    Dismissed,
}

impl std::fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Resolved => write!(f, "resolved"),
            Self::Dismissed => write!(f, "dismissed"),
        }
    }
}

impl std::str::FromStr for ConflictStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "dismissed" => Ok(Self::Dismissed),
            _ => Err(format!("Unknown conflict status: {s}")),
        }
    }
}

/// How a pending conflict should be settled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The actor names the winning entry explicitly.
    Manual { winner_id: String },
    HighestConfidence,
    MostRecent,
}

impl ResolutionStrategy {
    pub fn kind(&self) -> ResolutionKind {
        match self {
            Self::Manual { .. } => ResolutionKind::Manual,
            Self::HighestConfidence => ResolutionKind::HighestConfidence,
            Self::MostRecent => ResolutionKind::MostRecent,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    Manual,
    HighestConfidence,
    MostRecent,
    Dismissed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictResolution {
    pub kind: ResolutionKind,
    pub winner_id: Option<String>,
    pub loser_id: Option<String>,
    pub resolved_by: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryConflict {
    pub id: String,
    pub org_id: String,
    pub namespace: String,
    pub memory_id_1: String,
    pub memory_id_2: String,
    pub conflict_type: ConflictType,
    pub status: ConflictStatus,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<ConflictResolution>,
}

impl MemoryConflict {
    /// New pending conflict with the pair stored in canonical (ascending) order.
    pub fn pending(
        org_id: impl Into<String>,
        namespace: impl Into<String>,
        a: &str,
        b: &str,
        conflict_type: ConflictType,
    ) -> Self {
        let (memory_id_1, memory_id_2) = canonical_pair(a, b);
        Self {
            id: nanoid::nanoid!(),
            org_id: org_id.into(),
            namespace: namespace.into(),
            memory_id_1,
            memory_id_2,
            conflict_type,
            status: ConflictStatus::Pending,
            detected_at: super::timestamp_now(),
            resolved_at: None,
            resolution: None,
        }
    }

    pub fn involves(&self, id: &str) -> bool {
        self.memory_id_1 == id || self.memory_id_2 == id
    }

    pub fn is_pending(&self) -> bool {
        self.status == ConflictStatus::Pending
    }
}

pub fn canonical_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictFilter {
    pub org_id: String,
    pub namespace: Option<String>,
    pub status: Option<ConflictStatus>,
}
