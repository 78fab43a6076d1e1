//! C8 temporal tracker: validity windows over edges, default-duration
//! assignment by relation class, and the auto-invalidation rules that close
//! a window when a newer fact supersedes, contradicts, or orphans it.

use alayasiki_core::model::{Edge, InvalidationReason};
use std::collections::HashMap;

const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, Copy)]
pub struct DefaultValidityPeriods {
    pub stable_days: i64,
    pub event_days: i64,
    pub state_days: i64,
}

impl Default for DefaultValidityPeriods {
    fn default() -> Self {
        Self {
            stable_days: 365,
            event_days: 30,
            state_days: 90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationClass {
    Stable,
    Event,
    State,
}

impl DefaultValidityPeriods {
    pub fn duration_millis(&self, class: RelationClass) -> i64 {
        let days = match class {
            RelationClass::Stable => self.stable_days,
            RelationClass::Event => self.event_days,
            RelationClass::State => self.state_days,
        };
        days * MILLIS_PER_DAY
    }
}

/// Antonym pairs used by the `contradicted` rule: inserting a relation whose
/// type is the antonym of an existing open relation between the same
/// endpoints closes the older one.
fn antonym_of(edge_type: &str) -> Option<&'static str> {
    match edge_type {
        "works_at" => Some("no_longer_works_at"),
        "no_longer_works_at" => Some("works_at"),
        "married_to" => Some("divorced_from"),
        "divorced_from" => Some("married_to"),
        "located_in" => Some("relocated_from"),
        "relocated_from" => Some("located_in"),
        "alive" => Some("deceased"),
        "deceased" => Some("alive"),
        _ => None,
    }
}

pub struct TemporalTracker {
    periods: DefaultValidityPeriods,
}

impl TemporalTracker {
    pub fn new(periods: DefaultValidityPeriods) -> Self {
        Self { periods }
    }

    pub fn assign_default_validity(&self, edge: &mut Edge, class: RelationClass) {
        if edge.validity.is_none() {
            let duration = self.periods.duration_millis(class);
            edge.validity = Some(alayasiki_core::model::ValidityWindow {
                valid_from: edge.created_at,
                valid_until: Some(edge.created_at + duration),
            });
        }
    }

    /// Applies the `superseded` rule: among `existing` edges with the same
    /// (source, edge_type, target) as `incoming`, closes any still-open one
    /// whose `valid_from` precedes `incoming`'s.
    pub fn apply_superseded(&self, incoming: &Edge, existing: &mut [Edge]) -> usize {
        let mut closed = 0;
        for edge in existing.iter_mut() {
            if edge.id == incoming.id {
                continue;
            }
            if edge.source == incoming.source && edge.target == incoming.target && edge.edge_type == incoming.edge_type {
                let open = edge.validity.map(|w| w.valid_until.is_none()).unwrap_or(true);
                let older = edge.created_at < incoming.created_at;
                if open && older {
                    edge.invalidate(InvalidationReason::Superseded, incoming.created_at);
                    closed += 1;
                }
            }
        }
        closed
    }

    /// Applies the `contradicted` rule: inserting `incoming` closes any open
    /// edge between the same endpoints whose type is `incoming`'s antonym.
    pub fn apply_contradicted(&self, incoming: &Edge, existing: &mut [Edge]) -> usize {
        let Some(antonym) = antonym_of(&incoming.edge_type) else {
            return 0;
        };
        let mut closed = 0;
        for edge in existing.iter_mut() {
            if edge.source == incoming.source
                && edge.target == incoming.target
                && edge.edge_type == antonym
                && edge.is_valid_at(incoming.created_at)
            {
                edge.invalidate(InvalidationReason::Contradicted, incoming.created_at);
                closed += 1;
            }
        }
        closed
    }

    /// Applies the `cross_graph_inconsistency` rule: a domain relation that
    /// has lost every supporting `evidence_support` cross-link is
    /// invalidated. `support_counts` maps edge id -> remaining support count.
    pub fn apply_cross_graph_inconsistency(
        &self,
        edges: &mut [Edge],
        support_counts: &HashMap<String, usize>,
        at: i64,
    ) -> usize {
        let mut closed = 0;
        for edge in edges.iter_mut() {
            if support_counts.get(&edge.id).copied().unwrap_or(0) == 0 && edge.is_valid_at(at) {
                edge.invalidate(InvalidationReason::CrossGraphInconsistency, at);
                closed += 1;
            }
        }
        closed
    }

    /// Returns edges valid at `at` (or currently valid, if `at` is `None`).
    pub fn as_of<'a>(&self, edges: &'a [Edge], at: Option<i64>) -> Vec<&'a Edge> {
        let now = at.unwrap_or(i64::MAX);
        edges.iter().filter(|e| e.is_valid_at(now)).collect()
    }

    /// Returns the ids of edges whose window closed before `cutoff` —
    /// candidates for cleanup/purge.
    pub fn expired_before<'a>(&self, edges: &'a [Edge], cutoff: i64) -> Vec<&'a str> {
        edges
            .iter()
            .filter(|e| e.validity.and_then(|w| w.valid_until).map(|u| u < cutoff).unwrap_or(false))
            .map(|e| e.id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(id: &str, source: &str, target: &str, edge_type: &str, created_at: i64) -> Edge {
        Edge::new(id, source, target, edge_type, 1.0, created_at)
    }

    #[test]
    fn superseded_closes_older_same_triple() {
        let tracker = TemporalTracker::new(DefaultValidityPeriods::default());
        let mut existing = vec![edge("e1", "alice", "techcorp", "works_at", 1_000)];
        let incoming = edge("e2", "alice", "techcorp", "works_at", 2_000);

        let closed = tracker.apply_superseded(&incoming, &mut existing);
        assert_eq!(closed, 1);
        assert_eq!(existing[0].invalidation_reason, Some(InvalidationReason::Superseded));
        assert!(!existing[0].is_valid_at(2_000));
    }

    #[test]
    fn contradicted_closes_antonym_relation() {
        let tracker = TemporalTracker::new(DefaultValidityPeriods::default());
        let mut existing = vec![edge("e1", "alice", "techcorp", "works_at", 1_000)];
        let incoming = edge("e2", "alice", "techcorp", "no_longer_works_at", 2_000);

        let closed = tracker.apply_contradicted(&incoming, &mut existing);
        assert_eq!(closed, 1);
        assert_eq!(existing[0].invalidation_reason, Some(InvalidationReason::Contradicted));
    }

    #[test]
    fn cross_graph_inconsistency_closes_unsupported_edges() {
        let tracker = TemporalTracker::new(DefaultValidityPeriods::default());
        let mut edges = vec![edge("e1", "alice", "techcorp", "works_at", 1_000)];
        let support_counts = HashMap::new();

        let closed = tracker.apply_cross_graph_inconsistency(&mut edges, &support_counts, 5_000);
        assert_eq!(closed, 1);
        assert_eq!(edges[0].invalidation_reason, Some(InvalidationReason::CrossGraphInconsistency));
    }

    #[test]
    fn as_of_defaults_to_currently_valid() {
        let tracker = TemporalTracker::new(DefaultValidityPeriods::default());
        let mut e1 = edge("e1", "a", "b", "knows", 0);
        e1.invalidate(InvalidationReason::Expired, 100);
        let e2 = edge("e2", "a", "c", "knows", 0);

        let valid = tracker.as_of(&[e1, e2], None);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].id, "e2");
    }

    #[test]
    fn expired_before_finds_closed_windows_past_cutoff() {
        let tracker = TemporalTracker::new(DefaultValidityPeriods::default());
        let mut e1 = edge("e1", "a", "b", "knows", 0);
        e1.invalidate(InvalidationReason::Expired, 1_000);

        let expired = tracker.expired_before(&[e1], 2_000);
        assert_eq!(expired, vec!["e1"]);
    }
}
