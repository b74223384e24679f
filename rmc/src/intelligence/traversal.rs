//! Bounded priority expansion over the relation graph.
//!
//! Nodes live in an index-based arena; the worklist is a max-heap of frontier
//! edges so the strongest untraversed edge is always followed next. Expansion
//! stops at the hop limit, the node budget (seeds included) or the time
//! budget, whichever comes first.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use crate::db::RelationStore;
use crate::error::Result;
use crate::models::{BudgetLimit, MemoryRelation, RelationType, TraversalBudgetExceeded, TraversalStats};

/// Memory ids addressed by dense indices.
#[derive(Debug, Clone, Default)]
pub struct GraphArena {
    ids: Vec<String>,
    index: HashMap<String, usize>,
}

impl GraphArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `id`, inserting it when new.
    pub fn insert(&mut self, id: &str) -> usize {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.ids.len();
        self.ids.push(id.to_string());
        self.index.insert(id.to_string(), idx);
        idx
    }

    pub fn get(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn id(&self, idx: usize) -> &str {
        &self.ids[idx]
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ExpansionLimits {
    pub max_depth: usize,
    pub node_budget: usize,
    pub time_budget: Duration,
    pub max_edges_per_node: usize,
    pub relation_types: Vec<RelationType>,
}

/// A node reached through the graph rather than by similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub node: usize,
    pub depth: usize,
    pub via: RelationType,
    pub from: usize,
    /// Product of edge strengths from the seed.
    pub strength: f64,
}

#[derive(Debug, Clone)]
pub struct Expansion {
    pub arena: GraphArena,
    pub seed_count: usize,
    /// Non-seed nodes in discovery order.
    pub discoveries: Vec<Discovery>,
    /// Directed edges whose endpoints were both visited, ordered by
    /// (source, target, type).
    pub edges: Vec<MemoryRelation>,
    pub truncated: Option<TraversalBudgetExceeded>,
    pub stats: TraversalStats,
}

#[derive(Debug)]
struct Frontier {
    strength: f64,
    depth: usize,
    to_id: String,
    from: usize,
    from_id: String,
    via: RelationType,
    cumulative: f64,
}

impl Frontier {
    fn key(&self) -> (&str, &str, RelationType) {
        (&self.to_id, &self.from_id, self.via)
    }
}

impl Ord for Frontier {
    /// Stronger edges first, then shallower, then lower ids.
    fn cmp(&self, other: &Self) -> Ordering {
        self.strength
            .total_cmp(&other.strength)
            .then_with(|| other.depth.cmp(&self.depth))
            .then_with(|| other.key().cmp(&self.key()))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

type EdgeKey = (String, String, RelationType);

struct Walk<'a, S: RelationStore + ?Sized> {
    store: &'a S,
    limits: &'a ExpansionLimits,
    started: Instant,
    arena: GraphArena,
    expanded: Vec<bool>,
    heap: BinaryHeap<Frontier>,
    edges: BTreeMap<EdgeKey, MemoryRelation>,
    stats: TraversalStats,
}

impl<S: RelationStore + ?Sized> Walk<'_, S> {
    fn out_of_time(&self) -> bool {
        self.started.elapsed() >= self.limits.time_budget
    }

    async fn fetch(&mut self, node: usize) -> Result<Vec<MemoryRelation>> {
        let id = self.arena.id(node).to_string();
        let relations = self
            .store
            .relations_for(&id, &self.limits.relation_types, self.limits.max_edges_per_node)
            .await?;
        self.stats.edges_considered += relations.len();
        for relation in &relations {
            let key = (
                relation.source_id.clone(),
                relation.target_id.clone(),
                relation.relation_type,
            );
            self.edges.entry(key).or_insert_with(|| relation.clone());
        }
        Ok(relations)
    }

    async fn expand_node(&mut self, node: usize, depth: usize, cumulative: f64) -> Result<()> {
        self.expanded[node] = true;
        let from_id = self.arena.id(node).to_string();
        for relation in self.fetch(node).await? {
            let Some(other) = relation.other_end(&from_id) else {
                continue;
            };
            if other == from_id || self.arena.contains(other) {
                continue;
            }
            self.heap.push(Frontier {
                strength: relation.strength,
                depth: depth + 1,
                to_id: other.to_string(),
                from: node,
                from_id: from_id.clone(),
                via: relation.relation_type,
                cumulative: cumulative * relation.strength,
            });
        }
        Ok(())
    }

    fn visit(&mut self, id: &str) -> usize {
        let idx = self.arena.insert(id);
        if idx == self.expanded.len() {
            self.expanded.push(false);
        }
        idx
    }
}

/// Expands outward from `seeds` over edges of the allowed types in both
/// directions. Ties on edge strength are broken by node id, so the same graph
/// always yields the same expansion.
pub async fn expand<S: RelationStore + ?Sized>(
    store: &S,
    seeds: &[String],
    limits: &ExpansionLimits,
) -> Result<Expansion> {
    let mut walk = Walk {
        store,
        limits,
        started: Instant::now(),
        arena: GraphArena::new(),
        expanded: Vec::new(),
        heap: BinaryHeap::new(),
        edges: BTreeMap::new(),
        stats: TraversalStats::default(),
    };
    let mut truncated = None;

    for seed in seeds {
        if walk.arena.contains(seed) {
            continue;
        }
        if walk.arena.len() >= limits.node_budget {
            truncated = Some(BudgetLimit::NodeBudget);
            break;
        }
        walk.visit(seed);
    }
    let seed_count = walk.arena.len();

    let mut discoveries = Vec::new();
    if limits.max_depth > 0 && !limits.relation_types.is_empty() {
        for node in 0..seed_count {
            if walk.out_of_time() {
                truncated = Some(BudgetLimit::TimeBudget);
                break;
            }
            walk.expand_node(node, 0, 1.0).await?;
        }

        while truncated.is_none() {
            let Some(next) = walk.heap.pop() else {
                break;
            };
            if walk.arena.contains(&next.to_id) {
                continue;
            }
            if walk.arena.len() >= limits.node_budget {
                truncated = Some(BudgetLimit::NodeBudget);
                break;
            }
            if walk.out_of_time() {
                truncated = Some(BudgetLimit::TimeBudget);
                break;
            }

            let node = walk.visit(&next.to_id);
            walk.stats.max_depth_reached = walk.stats.max_depth_reached.max(next.depth);
            discoveries.push(Discovery {
                node,
                depth: next.depth,
                via: next.via,
                from: next.from,
                strength: next.cumulative,
            });
            if next.depth < limits.max_depth {
                walk.expand_node(node, next.depth, next.cumulative).await?;
            }
        }

        // Edges among visited nodes that were never expanded themselves.
        for node in 0..walk.arena.len() {
            if walk.expanded[node] {
                continue;
            }
            if walk.out_of_time() {
                truncated.get_or_insert(BudgetLimit::TimeBudget);
                break;
            }
            walk.fetch(node).await?;
        }
    }

    walk.stats.nodes_visited = walk.arena.len();
    let arena = walk.arena;
    let edges = walk
        .edges
        .into_values()
        .filter(|r| r.source_id != r.target_id && arena.contains(&r.source_id) && arena.contains(&r.target_id))
        .collect();

    if let Some(limit) = truncated {
        tracing::debug!(?limit, nodes_visited = arena.len(), "Traversal budget exhausted");
    }

    Ok(Expansion {
        truncated: truncated.map(|limit| TraversalBudgetExceeded {
            limit,
            nodes_visited: arena.len(),
        }),
        arena,
        seed_count,
        discoveries,
        edges,
        stats: walk.stats,
    })
}
