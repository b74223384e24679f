use std::collections::{BTreeSet, HashMap};

use crate::models::{InferencePath, MemoryRelation, PathConfidenceRule, PathEdge, PathKind, RelationType};

/// Upper bound on partial paths explored per synthesis run.
const MAX_PATH_STEPS: usize = 10_000;

/// Directed adjacency over the reachable subgraph.
struct Subgraph<'a> {
    outgoing: HashMap<&'a str, Vec<&'a MemoryRelation>>,
    has_incoming: HashMap<RelationType, BTreeSet<&'a str>>,
    nodes: BTreeSet<&'a str>,
}

impl<'a> Subgraph<'a> {
    fn new(edges: &'a [MemoryRelation]) -> Self {
        let mut outgoing: HashMap<&str, Vec<&MemoryRelation>> = HashMap::new();
        let mut has_incoming: HashMap<RelationType, BTreeSet<&str>> = HashMap::new();
        let mut nodes = BTreeSet::new();
        for edge in edges {
            outgoing.entry(edge.source_id.as_str()).or_default().push(edge);
            has_incoming
                .entry(edge.relation_type)
                .or_default()
                .insert(edge.target_id.as_str());
            nodes.insert(edge.source_id.as_str());
            nodes.insert(edge.target_id.as_str());
        }
        for list in outgoing.values_mut() {
            list.sort_by(|a, b| {
                (&a.target_id, a.relation_type).cmp(&(&b.target_id, b.relation_type))
            });
        }
        Self {
            outgoing,
            has_incoming,
            nodes,
        }
    }

    fn out(&self, node: &str, relation_type: RelationType) -> impl Iterator<Item = &'a MemoryRelation> + '_ {
        self.outgoing
            .get(node)
            .into_iter()
            .flatten()
            .copied()
            .filter(move |e| e.relation_type == relation_type)
    }

    fn has_predecessor(&self, node: &str, relation_type: RelationType) -> bool {
        self.has_incoming
            .get(&relation_type)
            .is_some_and(|targets| targets.contains(node))
    }
}

/// Finds causal chains, contradictions and support chains in the reachable
/// subgraph. `label` renders a node for the description template.
pub fn synthesize_paths(
    edges: &[MemoryRelation],
    rule: PathConfidenceRule,
    max_paths: usize,
    label: &dyn Fn(&str) -> String,
) -> Vec<InferencePath> {
    let graph = Subgraph::new(edges);
    let mut raw: Vec<(PathKind, Vec<&MemoryRelation>)> = Vec::new();
    let mut steps = 0;

    for &start in &graph.nodes {
        if !graph.has_predecessor(start, RelationType::Causes) && graph.out(start, RelationType::Causes).next().is_some() {
            let mut path = Vec::new();
            walk_chain(&graph, start, RelationType::Causes, true, &mut path, &mut raw, &mut steps);
        }
        if !graph.has_predecessor(start, RelationType::Supports) && graph.out(start, RelationType::Supports).next().is_some() {
            let mut path = Vec::new();
            walk_chain(&graph, start, RelationType::Supports, false, &mut path, &mut raw, &mut steps);
        }
    }

    for edge in edges.iter().filter(|e| e.relation_type == RelationType::Contradicts) {
        raw.push((PathKind::Contradiction, vec![edge]));
    }

    let mut paths: Vec<InferencePath> = raw
        .into_iter()
        .map(|(kind, chain)| build_path(kind, &chain, rule, label))
        .collect();
    paths.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.kind.cmp(&b.kind))
            .then_with(|| a.nodes.cmp(&b.nodes))
    });
    paths.dedup_by(|a, b| a.kind == b.kind && a.nodes == b.nodes);
    paths.truncate(max_paths);
    paths
}

/// Depth-first enumeration of maximal chains of `relation_type`. Causal
/// chains may end with one IMPACTS hop.
fn walk_chain<'a>(
    graph: &Subgraph<'a>,
    node: &str,
    relation_type: RelationType,
    allow_impact_tail: bool,
    path: &mut Vec<&'a MemoryRelation>,
    out: &mut Vec<(PathKind, Vec<&'a MemoryRelation>)>,
    steps: &mut usize,
) {
    *steps += 1;
    if *steps > MAX_PATH_STEPS {
        return;
    }
    let kind = if relation_type == RelationType::Causes {
        PathKind::CausalChain
    } else {
        PathKind::SupportChain
    };
    let on_path = |id: &str| path.iter().any(|e| e.source_id == id || e.target_id == id);

    let continuations: Vec<&MemoryRelation> = graph
        .out(node, relation_type)
        .filter(|e| !on_path(&e.target_id))
        .collect();
    let tails: Vec<&MemoryRelation> = if allow_impact_tail && !path.is_empty() {
        graph
            .out(node, RelationType::Impacts)
            .filter(|e| !on_path(&e.target_id))
            .collect()
    } else {
        Vec::new()
    };

    for tail in &tails {
        let mut with_tail = path.clone();
        with_tail.push(tail);
        out.push((kind, with_tail));
    }
    if continuations.is_empty() && tails.is_empty() && !path.is_empty() {
        out.push((kind, path.clone()));
    }

    for edge in continuations {
        path.push(edge);
        walk_chain(graph, &edge.target_id, relation_type, allow_impact_tail, path, out, steps);
        path.pop();
    }
}

fn build_path(
    kind: PathKind,
    chain: &[&MemoryRelation],
    rule: PathConfidenceRule,
    label: &dyn Fn(&str) -> String,
) -> InferencePath {
    let mut nodes = Vec::with_capacity(chain.len() + 1);
    if let Some(first) = chain.first() {
        nodes.push(first.source_id.clone());
    }
    nodes.extend(chain.iter().map(|e| e.target_id.clone()));

    let strengths: Vec<f64> = chain.iter().map(|e| e.strength).collect();
    let edges = chain
        .iter()
        .map(|e| PathEdge {
            source_id: e.source_id.clone(),
            target_id: e.target_id.clone(),
            relation_type: e.relation_type,
            strength: e.strength,
        })
        .collect();

    InferencePath {
        kind,
        description: describe(chain, label),
        confidence: rule.combine(&strengths),
        nodes,
        edges,
    }
}

fn verb(relation_type: RelationType) -> &'static str {
    match relation_type {
        RelationType::Causes => "causes",
        RelationType::Impacts => "impacts",
        RelationType::Contradicts => "contradicts",
        RelationType::Supports => "supports",
        RelationType::RelatesTo => "relates to",
    }
}

fn describe(chain: &[&MemoryRelation], label: &dyn Fn(&str) -> String) -> String {
    let Some(first) = chain.first() else {
        return String::new();
    };
    let mut text = format!(
        "\"{}\" {} \"{}\"",
        label(&first.source_id),
        verb(first.relation_type),
        label(&first.target_id)
    );
    for edge in &chain[1..] {
        text.push_str(&format!(", which {} \"{}\"", verb(edge.relation_type), label(&edge.target_id)));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn edges(list: &[(&str, &str, RelationType, f64)]) -> Vec<MemoryRelation> {
        list.iter()
            .map(|(s, t, ty, strength)| MemoryRelation::new(*s, *t, *ty, *strength, "test"))
            .collect()
    }

    fn ident(id: &str) -> String {
        id.to_string()
    }

    #[test]
    fn test_causal_chain_with_impact_tail() {
        let graph = edges(&[
            ("m1", "m2", RelationType::Causes, 0.9),
            ("m2", "m3", RelationType::Causes, 0.95),
            ("m3", "m4", RelationType::Impacts, 1.0),
        ]);
        let paths = synthesize_paths(&graph, PathConfidenceRule::Product, 20, &ident);

        assert_eq!(paths.len(), 1);
        let path = &paths[0];
        assert_eq!(path.kind, PathKind::CausalChain);
        assert_eq!(path.nodes, vec!["m1", "m2", "m3", "m4"]);
        assert_eq!(path.edges.len(), 3);
        assert!((path.confidence - 0.855).abs() < 1e-9);
        assert_eq!(
            path.description,
            "\"m1\" causes \"m2\", which causes \"m3\", which impacts \"m4\""
        );
    }

    #[test]
    fn test_lone_impact_is_not_a_chain() {
        let graph = edges(&[("a", "b", RelationType::Impacts, 0.9)]);
        assert!(synthesize_paths(&graph, PathConfidenceRule::Product, 20, &ident).is_empty());
    }

    #[test]
    fn test_contradiction_and_support() {
        let graph = edges(&[
            ("a", "b", RelationType::Supports, 0.8),
            ("b", "c", RelationType::Supports, 0.5),
            ("c", "d", RelationType::Contradicts, 0.7),
        ]);
        let paths = synthesize_paths(&graph, PathConfidenceRule::Product, 20, &ident);

        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].kind, PathKind::Contradiction);
        assert_eq!(paths[0].nodes, vec!["c", "d"]);
        assert_eq!(paths[1].kind, PathKind::SupportChain);
        assert_eq!(paths[1].nodes, vec!["a", "b", "c"]);
        assert!((paths[1].confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_branching_chains_sorted_by_confidence() {
        let graph = edges(&[
            ("root", "x", RelationType::Causes, 0.5),
            ("root", "y", RelationType::Causes, 0.9),
        ]);
        let paths = synthesize_paths(&graph, PathConfidenceRule::Product, 20, &ident);
        assert_eq!(paths[0].nodes, vec!["root", "y"]);
        assert_eq!(paths[1].nodes, vec!["root", "x"]);

        let capped = synthesize_paths(&graph, PathConfidenceRule::Product, 1, &ident);
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn test_pure_cycle_yields_no_chain() {
        let graph = edges(&[
            ("a", "b", RelationType::Causes, 0.9),
            ("b", "a", RelationType::Causes, 0.9),
        ]);
        assert!(synthesize_paths(&graph, PathConfidenceRule::Product, 20, &ident).is_empty());
    }

    #[test]
    fn test_cycle_after_start_is_cut() {
        let graph = edges(&[
            ("s", "a", RelationType::Causes, 0.9),
            ("a", "b", RelationType::Causes, 0.9),
            ("b", "a", RelationType::Causes, 0.9),
        ]);
        // "a" has an incoming CAUSES edge, so only "s" starts a chain.
        let paths = synthesize_paths(&graph, PathConfidenceRule::Product, 20, &ident);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].nodes, vec!["s", "a", "b"]);
    }

    #[test]
    fn test_minimum_rule() {
        let graph = edges(&[
            ("a", "b", RelationType::Causes, 0.9),
            ("b", "c", RelationType::Causes, 0.6),
        ]);
        let paths = synthesize_paths(&graph, PathConfidenceRule::Minimum, 20, &ident);
        assert!((paths[0].confidence - 0.6).abs() < 1e-9);
        assert_eq!("min".parse::<PathConfidenceRule>(), Ok(PathConfidenceRule::Minimum));
    }
}
