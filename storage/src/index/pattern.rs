//! Pattern index: VF2-style backtracking subgraph isomorphism over the
//! live graph. A pattern is a small set of typed nodes and typed/directed
//! edges with optional property constraints; `match_pattern` returns every
//! variable binding that makes the pattern's structure and constraints hold
//! against the supplied candidate nodes/edges.

use alayasiki_core::model::{Edge, Node, PropertyValue};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternDirection {
    Out,
    In,
    Undirected,
}

#[derive(Debug, Clone)]
pub struct PatternNode {
    pub var: String,
    pub node_type: Option<String>,
    pub properties: Vec<(String, PropertyValue)>,
}

#[derive(Debug, Clone)]
pub struct PatternEdge {
    pub source_var: String,
    pub target_var: String,
    pub edge_type: Option<String>,
    pub direction: PatternDirection,
}

#[derive(Debug, Clone, Default)]
pub struct Pattern {
    pub nodes: Vec<PatternNode>,
    pub edges: Vec<PatternEdge>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub bindings: HashMap<String, String>,
    pub matched_edges: Vec<Edge>,
}

fn node_compatible(pattern_node: &PatternNode, candidate: &Node) -> bool {
    if let Some(expected_type) = &pattern_node.node_type {
        if expected_type != &candidate.node_type {
            return false;
        }
    }
    pattern_node.properties.iter().all(|(key, expected)| {
        candidate
            .properties
            .get(key)
            .map(|actual| actual == expected)
            .unwrap_or(false)
    })
}

/// Does `edge` connect `from` and `to` in a way compatible with `direction`?
fn edge_matches_direction(edge: &Edge, from: &str, to: &str, direction: PatternDirection) -> bool {
    match direction {
        PatternDirection::Out => edge.source == from && edge.target == to,
        PatternDirection::In => edge.source == to && edge.target == from,
        PatternDirection::Undirected => {
            (edge.source == from && edge.target == to) || (edge.source == to && edge.target == from)
        }
    }
}

fn find_connecting_edges<'a>(
    edges: &'a [Edge],
    from: &str,
    to: &str,
    edge_type: &Option<String>,
    direction: PatternDirection,
) -> Vec<&'a Edge> {
    edges
        .iter()
        .filter(|e| edge_type.as_ref().map(|t| t == &e.edge_type).unwrap_or(true))
        .filter(|e| edge_matches_direction(e, from, to, direction))
        .collect()
}

/// Finds all variable bindings of `pattern` against `graph_nodes`/`graph_edges`.
pub fn match_pattern(pattern: &Pattern, graph_nodes: &[Node], graph_edges: &[Edge]) -> Vec<PatternMatch> {
    let mut results = Vec::new();
    if pattern.nodes.is_empty() {
        return results;
    }

    let mut bindings: HashMap<String, String> = HashMap::new();
    let mut used: HashMap<String, String> = HashMap::new();
    backtrack(pattern, 0, graph_nodes, graph_edges, &mut bindings, &mut used, &mut results);
    results
}

fn backtrack(
    pattern: &Pattern,
    index: usize,
    graph_nodes: &[Node],
    graph_edges: &[Edge],
    bindings: &mut HashMap<String, String>,
    used: &mut HashMap<String, String>,
    results: &mut Vec<PatternMatch>,
) {
    if index == pattern.nodes.len() {
        if let Some(matched_edges) = collect_matched_edges(pattern, bindings, graph_edges) {
            results.push(PatternMatch {
                bindings: bindings.clone(),
                matched_edges,
            });
        }
        return;
    }

    let pattern_node = &pattern.nodes[index];
    for candidate in graph_nodes {
        if used.contains_key(&candidate.id) {
            continue;
        }
        if !node_compatible(pattern_node, candidate) {
            continue;
        }
        if !edges_consistent_so_far(pattern, &pattern_node.var, &candidate.id, bindings, graph_edges) {
            continue;
        }

        bindings.insert(pattern_node.var.clone(), candidate.id.clone());
        used.insert(candidate.id.clone(), pattern_node.var.clone());

        backtrack(pattern, index + 1, graph_nodes, graph_edges, bindings, used, results);

        bindings.remove(&pattern_node.var);
        used.remove(&candidate.id);
    }
}

/// Checks that every pattern edge between `var` and an already-bound
/// variable has at least one satisfying edge in the candidate graph.
fn edges_consistent_so_far(
    pattern: &Pattern,
    var: &str,
    candidate_id: &str,
    bindings: &HashMap<String, String>,
    graph_edges: &[Edge],
) -> bool {
    for pattern_edge in &pattern.edges {
        let (other_var, from, to) = if pattern_edge.source_var == var {
            (pattern_edge.target_var.as_str(), candidate_id, "")
        } else if pattern_edge.target_var == var {
            (pattern_edge.source_var.as_str(), "", candidate_id)
        } else {
            continue;
        };

        let Some(other_id) = bindings.get(other_var) else {
            continue;
        };

        let (from, to) = if pattern_edge.source_var == var {
            (from, other_id.as_str())
        } else {
            (other_id.as_str(), to)
        };

        if find_connecting_edges(graph_edges, from, to, &pattern_edge.edge_type, pattern_edge.direction).is_empty() {
            return false;
        }
    }
    true
}

fn collect_matched_edges(
    pattern: &Pattern,
    bindings: &HashMap<String, String>,
    graph_edges: &[Edge],
) -> Option<Vec<Edge>> {
    let mut matched = Vec::new();
    for pattern_edge in &pattern.edges {
        let from = bindings.get(&pattern_edge.source_var)?;
        let to = bindings.get(&pattern_edge.target_var)?;
        let candidates = find_connecting_edges(graph_edges, from, to, &pattern_edge.edge_type, pattern_edge.direction);
        let edge = candidates.into_iter().next()?;
        matched.push(edge.clone());
    }
    Some(matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, node_type: &str) -> Node {
        Node::new(id, node_type, 0)
    }

    fn edge(id: &str, source: &str, target: &str, edge_type: &str) -> Edge {
        Edge::new(id, source, target, edge_type, 1.0, 0)
    }

    #[test]
    fn matches_simple_triangle_pattern() {
        let nodes = vec![node("a", "person"), node("b", "person"), node("c", "organization")];
        let edges = vec![
            edge("e1", "a", "b", "knows"),
            edge("e2", "b", "c", "works_at"),
        ];

        let pattern = Pattern {
            nodes: vec![
                PatternNode { var: "x".into(), node_type: Some("person".into()), properties: vec![] },
                PatternNode { var: "y".into(), node_type: Some("person".into()), properties: vec![] },
                PatternNode { var: "z".into(), node_type: Some("organization".into()), properties: vec![] },
            ],
            edges: vec![
                PatternEdge { source_var: "x".into(), target_var: "y".into(), edge_type: Some("knows".into()), direction: PatternDirection::Out },
                PatternEdge { source_var: "y".into(), target_var: "z".into(), edge_type: Some("works_at".into()), direction: PatternDirection::Out },
            ],
        };

        let matches = match_pattern(&pattern, &nodes, &edges);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].bindings.get("x"), Some(&"a".to_string()));
        assert_eq!(matches[0].bindings.get("z"), Some(&"c".to_string()));
    }

    #[test]
    fn no_match_when_type_constraint_fails() {
        let nodes = vec![node("a", "person"), node("b", "organization")];
        let edges = vec![edge("e1", "a", "b", "knows")];

        let pattern = Pattern {
            nodes: vec![
                PatternNode { var: "x".into(), node_type: Some("person".into()), properties: vec![] },
                PatternNode { var: "y".into(), node_type: Some("person".into()), properties: vec![] },
            ],
            edges: vec![PatternEdge { source_var: "x".into(), target_var: "y".into(), edge_type: Some("knows".into()), direction: PatternDirection::Out }],
        };

        assert!(match_pattern(&pattern, &nodes, &edges).is_empty());
    }

    #[test]
    fn undirected_edge_matches_either_orientation() {
        let nodes = vec![node("a", "person"), node("b", "person")];
        let edges = vec![edge("e1", "b", "a", "knows")];

        let pattern = Pattern {
            nodes: vec![
                PatternNode { var: "x".into(), node_type: None, properties: vec![] },
                PatternNode { var: "y".into(), node_type: None, properties: vec![] },
            ],
            edges: vec![PatternEdge { source_var: "x".into(), target_var: "y".into(), edge_type: None, direction: PatternDirection::Undirected }],
        };

        assert_eq!(match_pattern(&pattern, &nodes, &edges).len(), 2);
    }

    #[test]
    fn property_constraint_filters_candidates() {
        let mut alice = node("a", "person");
        alice = alice.with_property("vip", PropertyValue::Bool(true));
        let bob = node("b", "person");

        let pattern = Pattern {
            nodes: vec![PatternNode {
                var: "x".into(),
                node_type: Some("person".into()),
                properties: vec![("vip".into(), PropertyValue::Bool(true))],
            }],
            edges: vec![],
        };

        let matches = match_pattern(&pattern, &[alice, bob], &[]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].bindings.get("x"), Some(&"a".to_string()));
    }
}
