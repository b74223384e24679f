use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::db::EntrySearchHit;
use crate::models::{clamp01, MemoryEntry, ScoreBreakdown, ScoredEntry};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Blends similarity with a quality signal built from confidence, usage and
/// recency.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn recency_factor(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        if self.config.half_life_days <= 0.0 {
            return 0.0;
        }
        let age_days = ((now - created_at).num_milliseconds() as f64 / MILLIS_PER_DAY).max(0.0);
        (-age_days / self.config.half_life_days).exp()
    }

    /// `max_usage` is the highest usage count in the set being scored.
    pub fn normalized_usage(usage_count: u64, max_usage: u64) -> f64 {
        if max_usage == 0 {
            return 0.0;
        }
        (usage_count as f64).ln_1p() / (max_usage as f64).ln_1p()
    }

    pub fn score(&self, entry: &MemoryEntry, similarity: f64, max_usage: u64, now: DateTime<Utc>) -> ScoreBreakdown {
        let normalized_usage = Self::normalized_usage(entry.usage_count, max_usage);
        let recency = self.recency_factor(entry.created_at, now);
        let quality = clamp01(
            self.config.confidence_weight * entry.confidence
                + self.config.usage_weight * normalized_usage
                + self.config.recency_weight * recency,
        );
        let base_score = self.config.similarity_weight * similarity + self.config.quality_weight * quality;

        ScoreBreakdown {
            similarity,
            quality,
            normalized_usage,
            recency,
            base_score,
        }
    }

    /// Scores every hit against the set's own maximum usage and orders by
    /// base score descending, then id ascending.
    pub fn rank(&self, hits: Vec<EntrySearchHit>, now: DateTime<Utc>) -> Vec<ScoredEntry> {
        let max_usage = hits.iter().map(|h| h.entry.usage_count).max().unwrap_or(0);
        let mut scored: Vec<ScoredEntry> = hits
            .into_iter()
            .map(|hit| ScoredEntry {
                score: self.score(&hit.entry, f64::from(hit.similarity), max_usage, now),
                entry: hit.entry,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .base_score
                .total_cmp(&a.score.base_score)
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionResult;
    use chrono::Duration;

    fn entry(id: &str, confidence: f64, usage_count: u64, created_at: DateTime<Utc>) -> MemoryEntry {
        MemoryEntry {
            id: id.to_string(),
            org_id: "org".to_string(),
            namespace: "acme".to_string(),
            content_type: "fact".to_string(),
            content: id.to_string(),
            embedding: Vec::new(),
            confidence,
            claim: None,
            extraction: ExtractionResult::default(),
            root_id: id.to_string(),
            parent_id: None,
            created_by: "test".to_string(),
            usage_count,
            created_at,
        }
    }

    fn hit(entry: MemoryEntry, similarity: f32) -> EntrySearchHit {
        EntrySearchHit { entry, similarity }
    }

    fn engine() -> ScoringEngine {
        ScoringEngine::new(ScoringConfig::default())
    }

    #[test]
    fn test_formula() {
        let now = Utc::now();
        let e = entry("a", 0.8, 3, now - Duration::days(30));
        let score = engine().score(&e, 0.9, 3, now);

        let recency = (-1.0f64).exp();
        let quality = 0.5 * 0.8 + 0.3 * 1.0 + 0.2 * recency;
        assert!((score.recency - recency).abs() < 1e-9);
        assert!((score.normalized_usage - 1.0).abs() < 1e-9);
        assert!((score.quality - quality).abs() < 1e-9);
        assert!((score.base_score - (0.4 * 0.9 + 0.6 * quality)).abs() < 1e-9);
    }

    #[test]
    fn test_zero_max_usage() {
        assert_eq!(ScoringEngine::normalized_usage(0, 0), 0.0);
        let half = ScoringEngine::normalized_usage(1, 3);
        assert!((half - 2f64.ln() / 4f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_future_timestamps_do_not_boost() {
        let now = Utc::now();
        assert_eq!(engine().recency_factor(now + Duration::days(2), now), 1.0);
    }

    #[test]
    fn test_quality_is_clamped() {
        let config = ScoringConfig {
            confidence_weight: 2.0,
            ..ScoringConfig::default()
        };
        let now = Utc::now();
        let score = ScoringEngine::new(config).score(&entry("a", 1.0, 0, now), 1.0, 0, now);
        assert_eq!(score.quality, 1.0);
    }

    #[test]
    fn test_rank_orders_by_score_then_id() {
        let now = Utc::now();
        let hits = vec![
            hit(entry("b", 0.5, 0, now), 0.7),
            hit(entry("a", 0.5, 0, now), 0.7),
            hit(entry("c", 0.5, 0, now), 0.9),
        ];
        let ranked = engine().rank(hits, now);
        let ids: Vec<&str> = ranked.iter().map(|s| s.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_usage_normalized_within_set() {
        let now = Utc::now();
        let hits = vec![
            hit(entry("popular", 0.5, 9, now), 0.5),
            hit(entry("fresh", 0.5, 0, now), 0.5),
        ];
        let ranked = engine().rank(hits, now);
        assert_eq!(ranked[0].entry.id, "popular");
        assert!((ranked[0].score.normalized_usage - 1.0).abs() < 1e-9);
        assert_eq!(ranked[1].score.normalized_usage, 0.0);
    }
}
