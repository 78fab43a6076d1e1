//! Text index: inverted index from token -> set of ids, with `any`/`all`/
//! `phrase` query modes. Tokenization: lowercase, strip non-word
//! characters, split on whitespace, keep tokens of length [2, 50], dedupe
//! per document.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextQueryMode {
    Any,
    All,
    /// Degrades to `All` — no positional index is maintained. Per the
    /// design-note decision in SPEC_FULL.md, this degradation is surfaced
    /// to callers (`phrase_degraded_to_all`) rather than silently applied.
    Phrase,
}

pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut seen = HashSet::new();
    let mut buffer = String::new();

    let mut flush = |buffer: &mut String, tokens: &mut Vec<String>, seen: &mut HashSet<String>| {
        if buffer.len() >= 2 && buffer.len() <= 50 && seen.insert(buffer.clone()) {
            tokens.push(buffer.clone());
        }
        buffer.clear();
    };

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            buffer.extend(ch.to_lowercase());
        } else {
            flush(&mut buffer, &mut tokens, &mut seen);
        }
    }
    flush(&mut buffer, &mut tokens, &mut seen);
    tokens
}

#[derive(Debug, Default)]
pub struct TextIndex {
    inverted: HashMap<String, HashSet<String>>,
    token_frequency: HashMap<String, usize>,
    document_tokens: HashMap<String, Vec<String>>,
}

impl TextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str, text: &str) {
        let tokens = tokenize(text);
        for token in &tokens {
            self.inverted.entry(token.clone()).or_default().insert(id.to_string());
            *self.token_frequency.entry(token.clone()).or_insert(0) += 1;
        }
        self.document_tokens.insert(id.to_string(), tokens);
    }

    pub fn remove(&mut self, id: &str) {
        if let Some(tokens) = self.document_tokens.remove(id) {
            for token in tokens {
                if let Some(ids) = self.inverted.get_mut(&token) {
                    ids.remove(id);
                    if ids.is_empty() {
                        self.inverted.remove(&token);
                    }
                }
                if let Some(freq) = self.token_frequency.get_mut(&token) {
                    *freq = freq.saturating_sub(1);
                }
            }
        }
    }

    pub fn token_frequency(&self, token: &str) -> usize {
        self.token_frequency.get(token).copied().unwrap_or(0)
    }

    /// Returns `(ids, phrase_degraded_to_all)`.
    pub fn query(&self, query: &str, mode: TextQueryMode) -> (HashSet<String>, bool) {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return (HashSet::new(), false);
        }

        let effective_mode = match mode {
            TextQueryMode::Phrase => TextQueryMode::All,
            other => other,
        };
        let degraded = matches!(mode, TextQueryMode::Phrase);

        let sets: Vec<&HashSet<String>> = tokens
            .iter()
            .filter_map(|t| self.inverted.get(t))
            .collect();

        if sets.len() < tokens.len() && matches!(effective_mode, TextQueryMode::All) {
            return (HashSet::new(), degraded);
        }

        let result = match effective_mode {
            TextQueryMode::Any => {
                let mut union = HashSet::new();
                for set in sets {
                    union.extend(set.iter().cloned());
                }
                union
            }
            TextQueryMode::All => {
                let mut iter = sets.into_iter();
                let Some(first) = iter.next() else {
                    return (HashSet::new(), degraded);
                };
                let mut intersection = first.clone();
                for set in iter {
                    intersection.retain(|id| set.contains(id));
                }
                intersection
            }
            TextQueryMode::Phrase => unreachable!(),
        };
        (result, degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_strips_punctuation() {
        let tokens = tokenize("Alice Johnson, works at TechCorp!");
        assert!(tokens.contains(&"alice".to_string()));
        assert!(tokens.contains(&"techcorp".to_string()));
        assert!(!tokens.iter().any(|t| t.contains(',')));
    }

    #[test]
    fn any_mode_unions_across_tokens() {
        let mut index = TextIndex::new();
        index.insert("doc1", "alice works at techcorp");
        index.insert("doc2", "bob lives in paris");

        let (hits, _) = index.query("alice paris", TextQueryMode::Any);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn all_mode_intersects() {
        let mut index = TextIndex::new();
        index.insert("doc1", "alice works at techcorp");
        index.insert("doc2", "alice lives in paris");

        let (hits, _) = index.query("alice techcorp", TextQueryMode::All);
        assert_eq!(hits, HashSet::from(["doc1".to_string()]));
    }

    #[test]
    fn phrase_mode_degrades_to_all_and_reports_it() {
        let mut index = TextIndex::new();
        index.insert("doc1", "alice works at techcorp");

        let (hits, degraded) = index.query("alice techcorp", TextQueryMode::Phrase);
        assert!(degraded);
        assert_eq!(hits, HashSet::from(["doc1".to_string()]));
    }

    #[test]
    fn remove_clears_postings() {
        let mut index = TextIndex::new();
        index.insert("doc1", "alice works at techcorp");
        index.remove("doc1");

        let (hits, _) = index.query("alice", TextQueryMode::Any);
        assert!(hits.is_empty());
    }
}
