//! Cross-graph link catalogue: typed, confidence-scored edges whose
//! endpoints live in different graphs (`entity_mention`, `evidence_support`,
//! `semantic_grounding`, `temporal_alignment`). Grounded on the same
//! reverse-index CRUD shape as `graph_store.rs` and `lexical.rs`.

use alayasiki_core::model::CrossGraphLink;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct CrossLinkStore {
    links: HashMap<String, CrossGraphLink>,
    by_source: HashMap<String, HashSet<String>>,
    by_target: HashMap<String, HashSet<String>>,
}

impl CrossLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, link: CrossGraphLink) {
        self.by_source.entry(link.source_id.clone()).or_default().insert(link.id.clone());
        self.by_target.entry(link.target_id.clone()).or_default().insert(link.id.clone());
        self.links.insert(link.id.clone(), link);
    }

    pub fn get(&self, id: &str) -> Option<CrossGraphLink> {
        self.links.get(id).cloned()
    }

    pub fn links_from(&self, source_id: &str) -> Vec<CrossGraphLink> {
        self.by_source
            .get(source_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.links.get(id).cloned())
            .collect()
    }

    pub fn links_to(&self, target_id: &str) -> Vec<CrossGraphLink> {
        self.by_target
            .get(target_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.links.get(id).cloned())
            .collect()
    }

    /// Count of links targeting `entity_id`, used to enforce
    /// `maxLinksPerEntity` at creation time.
    pub fn link_count_for_entity(&self, entity_id: &str) -> usize {
        self.by_target.get(entity_id).map(HashSet::len).unwrap_or(0)
    }

    pub fn remove_for_element(&mut self, element_id: &str) {
        let ids: HashSet<String> = self
            .by_source
            .remove(element_id)
            .into_iter()
            .flatten()
            .chain(self.by_target.remove(element_id).into_iter().flatten())
            .collect();
        for id in ids {
            if let Some(link) = self.links.remove(&id) {
                if let Some(set) = self.by_source.get_mut(&link.source_id) {
                    set.remove(&id);
                }
                if let Some(set) = self.by_target.get_mut(&link.target_id) {
                    set.remove(&id);
                }
            }
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &CrossGraphLink> {
        self.links.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alayasiki_core::model::{CrossLinkType, GraphSide};

    fn link(id: &str, source: &str, target: &str) -> CrossGraphLink {
        CrossGraphLink {
            id: id.to_string(),
            source_graph: GraphSide::Lexical,
            target_graph: GraphSide::Domain,
            source_id: source.to_string(),
            target_id: target.to_string(),
            link_type: CrossLinkType::EntityMention,
            confidence: 0.9,
            metadata: Default::default(),
            created_at: 0,
            validity: None,
        }
    }

    #[test]
    fn links_to_finds_incoming_mentions() {
        let mut store = CrossLinkStore::new();
        store.add(link("l1", "chunk-1", "entity-a"));
        store.add(link("l2", "chunk-2", "entity-a"));
        assert_eq!(store.links_to("entity-a").len(), 2);
        assert_eq!(store.link_count_for_entity("entity-a"), 2);
    }

    #[test]
    fn remove_for_element_drops_every_incident_link() {
        let mut store = CrossLinkStore::new();
        store.add(link("l1", "chunk-1", "entity-a"));
        store.remove_for_element("entity-a");
        assert!(store.links_to("entity-a").is_empty());
        assert!(store.get("l1").is_none());
    }
}
