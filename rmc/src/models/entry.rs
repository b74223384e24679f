use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{validate_namespace, ExtractionResult};
use crate::error::{Result, RmcError};

/// A key/value fact attached to an entry and used for contradiction detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claim {
    pub key: String,
    pub value: String,
}

impl Claim {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Builds a claim from an optional key/value pair. Both halves or neither.
    pub fn from_parts(key: Option<String>, value: Option<String>) -> Result<Option<Self>> {
        match (key, value) {
            (None, None) => Ok(None),
            (Some(key), Some(value)) => {
                let key = key.trim().to_string();
                let value = value.trim().to_string();
                if key.is_empty() || value.is_empty() {
                    return Err(RmcError::Validation(
                        "claim_key and claim_value must not be blank".to_string(),
                    ));
                }
                Ok(Some(Self { key, value }))
            }
            (Some(_), None) => Err(RmcError::Validation(
                "claim_key requires a claim_value".to_string(),
            )),
            (None, Some(_)) => Err(RmcError::Validation(
                "claim_value requires a claim_key".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryEntry {
    pub id: String,
    pub org_id: String,
    pub namespace: String,
    pub content_type: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    pub confidence: f64,
    pub claim: Option<Claim>,
    pub extraction: ExtractionResult,
    pub root_id: String,
    pub parent_id: Option<String>,
    pub created_by: String,
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn claim_key(&self) -> Option<&str> {
        self.claim.as_ref().map(|c| c.key.as_str())
    }

    pub fn claim_value(&self) -> Option<&str> {
        self.claim.as_ref().map(|c| c.value.as_str())
    }
}

pub const DEFAULT_CONFIDENCE: f64 = 1.0;
pub const DEFAULT_ACTOR: &str = "system";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateEntryRequest {
    #[validate(length(min = 1, max = 128, message = "org_id is required"))]
    pub org_id: String,
    #[validate(length(min = 1, max = 512, message = "namespace is required"))]
    pub namespace: String,
    #[validate(length(min = 1, max = 64, message = "content_type is required"))]
    pub content_type: String,
    #[validate(length(min = 1, message = "content is required"))]
    pub content: String,
    #[validate(range(min = 0.0, max = 1.0, message = "confidence must be within [0, 1]"))]
    pub confidence: Option<f64>,
    pub claim_key: Option<String>,
    pub claim_value: Option<String>,
    pub created_by: Option<String>,
}

impl CreateEntryRequest {
    pub fn new(
        org_id: impl Into<String>,
        namespace: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            namespace: namespace.into(),
            content_type: content_type.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.claim_key = Some(key.into());
        self.claim_value = Some(value.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.created_by = Some(actor.into());
        self
    }

    /// Field-level validation plus the checks the derive cannot express.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        for (field, value) in [
            ("org_id", &self.org_id),
            ("content_type", &self.content_type),
            ("content", &self.content),
        ] {
            if value.trim().is_empty() {
                return Err(RmcError::Validation(format!("{field} must not be blank")));
            }
        }
        check_confidence(self.confidence)?;
        validate_namespace(&self.namespace).map_err(RmcError::Validation)?;
        Claim::from_parts(self.claim_key.clone(), self.claim_value.clone())?;
        Ok(())
    }
}

/// The range derive passes NaN through, since every comparison with NaN is false.
fn check_confidence(confidence: Option<f64>) -> Result<()> {
    match confidence {
        Some(value) if !value.is_finite() => Err(RmcError::Validation(
            "confidence must be a finite number within [0, 1]".to_string(),
        )),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClaimPatch {
    Set { key: String, value: String },
    Clear,
}

/// Fields left as `None` are carried over from the entry being updated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdatePatch {
    #[validate(length(min = 1, message = "content must not be empty"))]
    pub content: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub content_type: Option<String>,
    #[validate(range(min = 0.0, max = 1.0, message = "confidence must be within [0, 1]"))]
    pub confidence: Option<f64>,
    pub claim: Option<ClaimPatch>,
}

impl UpdatePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.content_type.is_none()
            && self.confidence.is_none()
            && self.claim.is_none()
    }

    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if self.is_empty() {
            return Err(RmcError::Validation(
                "update patch must change at least one field".to_string(),
            ));
        }
        for (field, value) in [("content", &self.content), ("content_type", &self.content_type)] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(RmcError::Validation(format!("{field} must not be blank")));
            }
        }
        check_confidence(self.confidence)?;
        if let Some(ClaimPatch::Set { key, value }) = &self.claim {
            Claim::from_parts(Some(key.clone()), Some(value.clone()))?;
        }
        Ok(())
    }
}

/// Kinds of broken version-tree linkage reported by the invariant check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MissingRoot,
    RootHasParent,
    MissingParent,
    RootMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootViolation {
    pub entry_id: String,
    pub root_id: String,
    pub kind: ViolationKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_from_parts() {
        assert_eq!(Claim::from_parts(None, None).unwrap(), None);
        assert_eq!(
            Claim::from_parts(Some(" auth_method ".into()), Some("JWT".into())).unwrap(),
            Some(Claim::new("auth_method", "JWT"))
        );
        assert!(Claim::from_parts(Some("auth_method".into()), None).is_err());
        assert!(Claim::from_parts(None, Some("JWT".into())).is_err());
        assert!(Claim::from_parts(Some("k".into()), Some("  ".into())).is_err());
    }

    #[test]
    fn test_create_request_requires_fields() {
        let req = CreateEntryRequest::new("", "acme", "fact", "text");
        assert!(matches!(req.check(), Err(RmcError::Validation(_))));

        let req = CreateEntryRequest::new("org", "acme", "fact", "   ");
        assert!(matches!(req.check(), Err(RmcError::Validation(_))));

        let req = CreateEntryRequest::new("org", "acme//x", "fact", "text");
        assert!(matches!(req.check(), Err(RmcError::Validation(_))));

        let req = CreateEntryRequest::new("org", "acme/eng", "fact", "text");
        assert!(req.check().is_ok());
    }

    #[test]
    fn test_create_request_rejects_out_of_range_confidence() {
        let req = CreateEntryRequest::new("org", "acme", "fact", "text").with_confidence(1.5);
        let err = req.check().unwrap_err();
        assert!(err.to_string().contains("confidence"));
    }

    #[test]
    fn test_non_finite_confidence_is_a_validation_error() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let req = CreateEntryRequest::new("org", "acme", "fact", "text").with_confidence(value);
            assert!(matches!(req.check(), Err(RmcError::Validation(_))), "{value}");

            let patch = UpdatePatch {
                confidence: Some(value),
                ..UpdatePatch::default()
            };
            assert!(matches!(patch.check(), Err(RmcError::Validation(_))), "{value}");
        }
    }

    #[test]
    fn test_patch_rejects_blank_content_type() {
        let patch = UpdatePatch {
            content_type: Some("   ".to_string()),
            ..UpdatePatch::default()
        };
        let err = patch.check().unwrap_err();
        assert!(matches!(err, RmcError::Validation(ref msg) if msg.contains("content_type")));

        let patch = UpdatePatch {
            content_type: Some("decision".to_string()),
            ..UpdatePatch::default()
        };
        assert!(patch.check().is_ok());
    }

    #[test]
    fn test_create_request_rejects_half_claim() {
        let mut req = CreateEntryRequest::new("org", "acme", "fact", "text");
        req.claim_key = Some("auth_method".into());
        assert!(matches!(req.check(), Err(RmcError::Validation(_))));
    }

    #[test]
    fn test_empty_patch_rejected() {
        assert!(UpdatePatch::default().check().is_err());
        assert!(UpdatePatch::content("new text").check().is_ok());
    }

    #[test]
    fn test_claim_patch_serde() {
        let patch: ClaimPatch =
            serde_json::from_str(r#"{"op":"set","key":"db","value":"postgres"}"#).unwrap();
        assert_eq!(
            patch,
            ClaimPatch::Set {
                key: "db".into(),
                value: "postgres".into()
            }
        );
        let clear: ClaimPatch = serde_json::from_str(r#"{"op":"clear"}"#).unwrap();
        assert_eq!(clear, ClaimPatch::Clear);
    }
}
