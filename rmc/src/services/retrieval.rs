use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::db::DatabaseBackend;
use crate::error::Result;
use crate::intelligence::{expand, synthesize_paths, ExpansionLimits};
use crate::models::{
    snippet, BudgetLimit, InferencePath, MemoryEntry, PathKind, QueryFilter, QueryOptions,
    RelatedEntry, RetrievalResult, RetrievalSummary, RetrieveOptions, ScoredEntry,
    TraversalBudgetExceeded,
};

use super::store::MemoryStore;

const LABEL_CHARS: usize = 60;
const SUMMARY_PATHS: usize = 3;

/// Similarity search followed by a bounded walk of the relation graph and
/// inference-path synthesis. Read-only: usage counters are not touched.
#[derive(Clone)]
pub struct RmcRetriever {
    store: Arc<MemoryStore>,
    db: Arc<dyn DatabaseBackend>,
    config: RetrievalConfig,
}

impl RmcRetriever {
    pub fn new(store: Arc<MemoryStore>, db: Arc<dyn DatabaseBackend>, config: RetrievalConfig) -> Self {
        Self { store, db, config }
    }

    /// Options seeded from the configured retrieval defaults.
    pub fn default_options(&self) -> RetrieveOptions {
        RetrieveOptions {
            max_depth: self.config.max_depth,
            node_budget: self.config.node_budget,
            time_budget_ms: self.config.time_budget_ms,
            ..RetrieveOptions::default()
        }
    }

    pub async fn retrieve(
        &self,
        filter: &QueryFilter,
        text: &str,
        options: &RetrieveOptions,
    ) -> Result<RetrievalResult> {
        let mut direct_filter = filter.clone();
        direct_filter.min_similarity = Some(
            filter
                .min_similarity
                .map_or(options.min_confidence, |m| m.max(options.min_confidence)),
        );
        if let Some(limit) = options.limit {
            direct_filter.limit = Some(limit);
        }

        let direct_matches = self
            .store
            .query(&direct_filter, text, QueryOptions { record_usage: false })
            .await?;
        let seeds: Vec<String> = direct_matches.iter().map(|s| s.entry.id.clone()).collect();

        let limits = ExpansionLimits {
            max_depth: options.max_depth,
            node_budget: options.node_budget,
            time_budget: Duration::from_millis(options.time_budget_ms),
            max_edges_per_node: self.config.max_edges_per_node,
            relation_types: options.relation_types.clone(),
        };
        let expansion = expand(self.db.as_ref(), &seeds, &limits).await?;

        let discovered_ids: Vec<String> = expansion
            .discoveries
            .iter()
            .map(|d| expansion.arena.id(d.node).to_string())
            .collect();
        let mut loaded: HashMap<String, MemoryEntry> = self
            .db
            .get_entries(&discovered_ids)
            .await?
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect();

        let mut labels: HashMap<String, String> = direct_matches
            .iter()
            .map(|s| (s.entry.id.clone(), snippet(&s.entry.content, LABEL_CHARS)))
            .collect();
        let mut related_context = Vec::with_capacity(expansion.discoveries.len());
        for discovery in &expansion.discoveries {
            let id = expansion.arena.id(discovery.node);
            let Some(entry) = loaded.remove(id) else {
                tracing::debug!(entry_id = %id, "Related entry no longer exists");
                continue;
            };
            labels.insert(entry.id.clone(), snippet(&entry.content, LABEL_CHARS));
            related_context.push(RelatedEntry {
                entry,
                depth: discovery.depth,
                via: discovery.via,
                from_id: expansion.arena.id(discovery.from).to_string(),
                strength: discovery.strength,
            });
        }

        let inference_paths = if options.include_inference_paths {
            let label = |id: &str| labels.get(id).cloned().unwrap_or_else(|| id.to_string());
            synthesize_paths(
                &expansion.edges,
                self.config.path_confidence,
                self.config.max_paths,
                &label,
            )
        } else {
            Vec::new()
        };

        let summary = summarize(
            &direct_matches,
            related_context.len(),
            &inference_paths,
            expansion.truncated.as_ref(),
        );

        tracing::info!(
            direct = direct_matches.len(),
            related = related_context.len(),
            paths = inference_paths.len(),
            partial = expansion.truncated.is_some(),
            "Retrieval complete"
        );

        Ok(RetrievalResult {
            query: text.to_string(),
            direct_matches,
            related_context,
            inference_paths,
            summary,
            partial: expansion.truncated.is_some(),
            truncated: expansion.truncated,
            stats: expansion.stats,
        })
    }
}

fn count(paths: &[InferencePath], kind: PathKind) -> usize {
    paths.iter().filter(|p| p.kind == kind).count()
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

/// Template summary of a retrieval result.
pub(crate) fn summarize(
    direct_matches: &[ScoredEntry],
    related_count: usize,
    paths: &[InferencePath],
    truncated: Option<&TraversalBudgetExceeded>,
) -> RetrievalSummary {
    let causal_chains = count(paths, PathKind::CausalChain);
    let contradictions = count(paths, PathKind::Contradiction);
    let support_chains = count(paths, PathKind::SupportChain);

    let mut text = String::new();
    match direct_matches.first() {
        None => text.push_str("No memories matched the query."),
        Some(top) => {
            let _ = write!(
                text,
                "Found {} and {}. Top match: \"{}\" (score {:.2}).",
                plural(direct_matches.len(), "direct match", "direct matches"),
                plural(related_count, "related memory", "related memories"),
                snippet(&top.entry.content, LABEL_CHARS),
                top.score.base_score
            );
        }
    }

    if !paths.is_empty() {
        let _ = write!(
            text,
            " Inference: {}, {}, {}.",
            plural(causal_chains, "causal chain", "causal chains"),
            plural(contradictions, "contradiction", "contradictions"),
            plural(support_chains, "support chain", "support chains")
        );
        for path in paths.iter().take(SUMMARY_PATHS) {
            let _ = write!(text, "\n- {} ({:.2}): {}", path.kind, path.confidence, path.description);
        }
    }

    if contradictions > 0 {
        let _ = write!(
            text,
            "\nWarning: {} among the retrieved memories.",
            plural(contradictions, "contradiction", "contradictions")
        );
    }

    if let Some(truncated) = truncated {
        let reason = match truncated.limit {
            BudgetLimit::NodeBudget => "node budget",
            BudgetLimit::TimeBudget => "time budget",
        };
        let _ = write!(
            text,
            "\nNote: partial result, {reason} reached after {} nodes.",
            truncated.nodes_visited
        );
    }

    RetrievalSummary {
        text,
        direct_match_count: direct_matches.len(),
        related_count,
        causal_chains,
        contradictions,
        support_chains,
    }
}
