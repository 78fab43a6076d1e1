//! C2 — traversal: BFS/DFS, bidirectional shortest path, bounded all-paths.

use crate::graph_store::{Direction, GraphStore};
use alayasiki_core::model::{Edge, Node};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    Out,
    In,
    Both,
}

pub struct TraversalConfig<'a> {
    pub max_depth: usize,
    pub max_nodes: usize,
    pub direction: TraversalDirection,
    pub relation_types: Option<HashSet<String>>,
    pub node_predicate: Option<Box<dyn Fn(&Node) -> bool + 'a>>,
    pub edge_predicate: Option<Box<dyn Fn(&Edge) -> bool + 'a>>,
    pub include_start_node: bool,
}

impl<'a> Default for TraversalConfig<'a> {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_nodes: usize::MAX,
            direction: TraversalDirection::Out,
            relation_types: None,
            node_predicate: None,
            edge_predicate: None,
            include_start_node: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraversalResult {
    pub visited: Vec<String>,
    pub edges: Vec<Edge>,
    /// child id -> (parent id, edge id) for shortest-path reconstruction.
    pub parents: HashMap<String, (String, String)>,
}

impl TraversalResult {
    /// Reconstructs the path from the traversal's start node to `target`,
    /// inclusive of both ends. The path to the start node itself is `[start]`.
    pub fn path_to(&self, start: &str, target: &str) -> Option<Vec<String>> {
        if start == target {
            return Some(vec![start.to_string()]);
        }
        let mut path = vec![target.to_string()];
        let mut current = target.to_string();
        loop {
            let (parent, _) = self.parents.get(&current)?;
            path.push(parent.clone());
            if parent == start {
                break;
            }
            current = parent.clone();
        }
        path.reverse();
        Some(path)
    }
}

fn neighbors_for(
    store: &GraphStore,
    node_id: &str,
    direction: TraversalDirection,
    relation_types: Option<&HashSet<String>>,
) -> Vec<(Node, Edge, Direction)> {
    match direction {
        TraversalDirection::Out | TraversalDirection::In | TraversalDirection::Both => {
            let all = store.get_neighbors(node_id, relation_types);
            match direction {
                TraversalDirection::Out => all.into_iter().filter(|(_, _, d)| *d == Direction::Out).collect(),
                TraversalDirection::In => all.into_iter().filter(|(_, _, d)| *d == Direction::In).collect(),
                TraversalDirection::Both => all,
            }
        }
    }
}

fn passes_predicates(config: &TraversalConfig, node: &Node, edge: &Edge) -> bool {
    let node_ok = config.node_predicate.as_ref().map(|p| p(node)).unwrap_or(true);
    let edge_ok = config.edge_predicate.as_ref().map(|p| p(edge)).unwrap_or(true);
    node_ok && edge_ok
}

pub fn bfs(store: &GraphStore, start: &str, config: &TraversalConfig) -> TraversalResult {
    traverse(store, start, config, true)
}

pub fn dfs(store: &GraphStore, start: &str, config: &TraversalConfig) -> TraversalResult {
    traverse(store, start, config, false)
}

fn traverse(store: &GraphStore, start: &str, config: &TraversalConfig, breadth_first: bool) -> TraversalResult {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut edges = Vec::new();
    let mut parents = HashMap::new();
    let mut depth_of = HashMap::new();

    if store.get_node(start).is_none() {
        return TraversalResult {
            visited: Vec::new(),
            edges: Vec::new(),
            parents: HashMap::new(),
        };
    }

    visited.insert(start.to_string());
    depth_of.insert(start.to_string(), 0usize);
    if config.include_start_node {
        order.push(start.to_string());
    }

    let mut frontier: VecDeque<String> = VecDeque::new();
    frontier.push_back(start.to_string());

    while let Some(current) = if breadth_first { frontier.pop_front() } else { frontier.pop_back() } {
        if order.len() >= config.max_nodes {
            break;
        }
        let current_depth = depth_of[&current];
        if current_depth >= config.max_depth {
            continue;
        }

        let neighbors = neighbors_for(store, &current, config.direction, config.relation_types.as_ref());
        for (node, edge, _direction) in neighbors {
            if visited.contains(&node.id) {
                continue;
            }
            if !passes_predicates(config, &node, &edge) {
                continue;
            }
            visited.insert(node.id.clone());
            depth_of.insert(node.id.clone(), current_depth + 1);
            parents.insert(node.id.clone(), (current.clone(), edge.id.clone()));
            edges.push(edge);
            order.push(node.id.clone());
            frontier.push_back(node.id);

            if order.len() >= config.max_nodes {
                break;
            }
        }
    }

    TraversalResult {
        visited: order,
        edges,
        parents,
    }
}

/// Shortest path between `start` and `target` via a bidirectional BFS meet-
/// in-the-middle search. Returns `(path, distance)`, `(None, -1)` if
/// unreachable within `max_depth` from either side, `([start], 0)` when
/// `start == target`.
pub fn bidirectional_search(
    store: &GraphStore,
    start: &str,
    target: &str,
    max_depth: usize,
) -> (Option<Vec<String>>, i64) {
    if start == target {
        return (Some(vec![start.to_string()]), 0);
    }
    if store.get_node(start).is_none() || store.get_node(target).is_none() {
        return (None, -1);
    }

    let mut forward_parent: HashMap<String, String> = HashMap::new();
    let mut backward_parent: HashMap<String, String> = HashMap::new();
    let mut forward_depth = HashMap::new();
    let mut backward_depth = HashMap::new();
    forward_depth.insert(start.to_string(), 0usize);
    backward_depth.insert(target.to_string(), 0usize);

    let mut forward_frontier = VecDeque::from([start.to_string()]);
    let mut backward_frontier = VecDeque::from([target.to_string()]);

    let mut meeting_point: Option<String> = None;

    for _ in 0..=max_depth {
        if meeting_point.is_some() {
            break;
        }
        if forward_frontier.is_empty() && backward_frontier.is_empty() {
            break;
        }

        let mut next_forward = VecDeque::new();
        while let Some(current) = forward_frontier.pop_front() {
            let depth = forward_depth[&current];
            if depth >= max_depth {
                continue;
            }
            for (node, _edge, _dir) in store.get_neighbors(&current, None) {
                if forward_depth.contains_key(&node.id) {
                    continue;
                }
                forward_depth.insert(node.id.clone(), depth + 1);
                forward_parent.insert(node.id.clone(), current.clone());
                if backward_depth.contains_key(&node.id) {
                    meeting_point = Some(node.id.clone());
                }
                next_forward.push_back(node.id);
            }
        }
        forward_frontier = next_forward;
        if meeting_point.is_some() {
            break;
        }

        let mut next_backward = VecDeque::new();
        while let Some(current) = backward_frontier.pop_front() {
            let depth = backward_depth[&current];
            if depth >= max_depth {
                continue;
            }
            // Backward BFS walks incoming edges (reverse direction).
            for (node, _edge, dir) in store.get_neighbors(&current, None) {
                if dir != Direction::In {
                    continue;
                }
                if backward_depth.contains_key(&node.id) {
                    continue;
                }
                backward_depth.insert(node.id.clone(), depth + 1);
                backward_parent.insert(node.id.clone(), current.clone());
                if forward_depth.contains_key(&node.id) {
                    meeting_point = Some(node.id.clone());
                }
                next_backward.push_back(node.id);
            }
        }
        backward_frontier = next_backward;
    }

    let Some(meet) = meeting_point else {
        return (None, -1);
    };

    let mut forward_path = vec![meet.clone()];
    let mut cursor = meet.clone();
    while let Some(parent) = forward_parent.get(&cursor) {
        forward_path.push(parent.clone());
        cursor = parent.clone();
    }
    forward_path.reverse();

    let mut backward_path = Vec::new();
    let mut cursor = meet;
    while let Some(parent) = backward_parent.get(&cursor) {
        backward_path.push(parent.clone());
        cursor = parent.clone();
    }

    let distance = (forward_path.len() - 1 + backward_path.len()) as i64;
    forward_path.extend(backward_path);
    (Some(forward_path), distance)
}

/// Enumerates simple paths (no repeated vertices) from `start` to `target`,
/// bounded by `max_depth` hops and `max_paths` results.
pub fn find_all_paths(
    store: &GraphStore,
    start: &str,
    target: &str,
    max_depth: usize,
    max_paths: usize,
) -> Vec<Vec<String>> {
    let mut results = Vec::new();
    let mut path = vec![start.to_string()];
    let mut on_path: HashSet<String> = HashSet::from([start.to_string()]);

    fn walk(
        store: &GraphStore,
        current: &str,
        target: &str,
        max_depth: usize,
        max_paths: usize,
        path: &mut Vec<String>,
        on_path: &mut HashSet<String>,
        results: &mut Vec<Vec<String>>,
    ) {
        if results.len() >= max_paths {
            return;
        }
        if current == target {
            results.push(path.clone());
            return;
        }
        if path.len() - 1 >= max_depth {
            return;
        }
        for (node, _edge, dir) in store.get_neighbors(current, None) {
            if dir != Direction::Out {
                continue;
            }
            if on_path.contains(&node.id) {
                continue;
            }
            on_path.insert(node.id.clone());
            path.push(node.id.clone());
            walk(store, &node.id, target, max_depth, max_paths, path, on_path, results);
            path.pop();
            on_path.remove(&node.id);
            if results.len() >= max_paths {
                return;
            }
        }
    }

    if store.get_node(start).is_some() && store.get_node(target).is_some() {
        walk(store, start, target, max_depth, max_paths, &mut path, &mut on_path, &mut results);
    }
    results
}
