//! C4 entity resolution: decides whether two candidate nodes of the same
//! type refer to the same real-world entity. Exact matches on a normalized
//! name or a uniqueness-bearing property (email/phone/url/ssn/id_number)
//! short-circuit to confidence 1.0; otherwise a weighted composite of
//! string-similarity, token-overlap, phonetic, and embedding signals is
//! scored against a configurable threshold.

use alayasiki_core::config::ResolutionConfig;
use alayasiki_core::model::Node;
use std::collections::HashSet;

const UNIQUENESS_PROPERTIES: &[&str] = &["email", "phone", "url", "ssn", "id_number"];

#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionScore {
    pub candidate_id: String,
    pub confidence: f32,
    pub exact: bool,
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Very small English-oriented Soundex. Not grounded on any example crate
/// (no phonetic matcher appeared in the corpus); hand-rolled per the
/// classic four-character Soundex algorithm.
fn soundex(s: &str) -> String {
    let chars: Vec<char> = s.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    if chars.is_empty() {
        return String::new();
    }
    let code = |c: char| -> Option<char> {
        match c.to_ascii_uppercase() {
            'B' | 'F' | 'P' | 'V' => Some('1'),
            'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
            'D' | 'T' => Some('3'),
            'L' => Some('4'),
            'M' | 'N' => Some('5'),
            'R' => Some('6'),
            _ => None,
        }
    };

    let mut result = chars[0].to_ascii_uppercase().to_string();
    let mut last_code = code(chars[0]);
    for &c in &chars[1..] {
        let this_code = code(c);
        if this_code.is_some() && this_code != last_code {
            result.push(this_code.unwrap());
        }
        if !matches!(c.to_ascii_uppercase(), 'H' | 'W') {
            last_code = this_code;
        }
        if result.len() == 4 {
            break;
        }
    }
    while result.len() < 4 {
        result.push('0');
    }
    result
}

fn jaccard(a: &str, b: &str) -> f32 {
    let tokens = |s: &str| -> HashSet<String> {
        s.split_whitespace().map(|t| t.to_lowercase()).collect()
    };
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn exact_match(a: &Node, b: &Node) -> bool {
    match (a.name(), b.name()) {
        (Some(na), Some(nb)) if normalize(na) == normalize(nb) => return true,
        _ => {}
    }
    UNIQUENESS_PROPERTIES.iter().any(|key| {
        match (a.properties.get(*key).and_then(|v| v.as_str()), b.properties.get(*key).and_then(|v| v.as_str())) {
            (Some(va), Some(vb)) => va.eq_ignore_ascii_case(vb),
            _ => false,
        }
    })
}

/// Scores `candidate` against `target`; `None` if their types differ (the
/// resolver only ever compares same-type candidates).
pub fn score_pair(target: &Node, candidate: &Node, config: &ResolutionConfig) -> Option<ResolutionScore> {
    if target.node_type != candidate.node_type {
        return None;
    }
    if exact_match(target, candidate) {
        return Some(ResolutionScore { candidate_id: candidate.id.clone(), confidence: 1.0, exact: true });
    }

    let weights = &config.weights;
    let (name_a, name_b) = (target.name().unwrap_or_default(), candidate.name().unwrap_or_default());

    let levenshtein_sim = if name_a.is_empty() || name_b.is_empty() {
        0.0
    } else {
        1.0 - (strsim::levenshtein(name_a, name_b) as f32 / name_a.len().max(name_b.len()) as f32)
    };
    let jw_sim = strsim::jaro_winkler(name_a, name_b) as f32;
    let fuzzy = (levenshtein_sim + jw_sim) / 2.0;

    let jaccard_sim = jaccard(name_a, name_b);
    let soundex_match = config.enable_phonetic
        && !name_a.is_empty()
        && !name_b.is_empty()
        && soundex(name_a) == soundex(name_b);

    let embedding_sim = match (&target.embedding, &candidate.embedding) {
        (Some(ea), Some(eb)) => cosine(ea, eb),
        _ => 0.0,
    };

    let mut weighted_sum = 0.0f32;
    let mut weight_mass = 0.0f32;

    weighted_sum += weights.fuzzy * fuzzy;
    weight_mass += weights.fuzzy;

    if config.enable_jaccard {
        weighted_sum += weights.fuzzy * 0.5 * jaccard_sim;
        weight_mass += weights.fuzzy * 0.5;
    }

    if config.enable_phonetic {
        if soundex_match {
            weighted_sum += weights.fuzzy * 0.25;
        }
        weight_mass += weights.fuzzy * 0.25;
    }

    if target.embedding.is_some() && candidate.embedding.is_some() {
        weighted_sum += weights.embedding * embedding_sim;
        weight_mass += weights.embedding;
    }

    let confidence = if weight_mass > 0.0 { weighted_sum / weight_mass } else { 0.0 };
    Some(ResolutionScore { candidate_id: candidate.id.clone(), confidence, exact: false })
}

/// Resolves `target` against a same-type `candidates` pool, returning
/// matches above `config.fuzzy_threshold` (or any exact match), sorted by
/// descending confidence, capped at `config.max_candidates`.
pub fn resolve<'a>(target: &Node, candidates: impl Iterator<Item = &'a Node>, config: &ResolutionConfig) -> Vec<ResolutionScore> {
    let mut scores: Vec<ResolutionScore> = candidates
        .filter(|c| c.id != target.id)
        .filter_map(|c| score_pair(target, c, config))
        .filter(|s| s.exact || s.confidence >= config.fuzzy_threshold)
        .collect();

    scores.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    scores.truncate(config.max_candidates);
    scores
}

/// Buckets `nodes` by type so batch resolution only ever compares
/// same-type candidate pools.
pub fn bucket_by_type(nodes: &[Node]) -> std::collections::HashMap<String, Vec<&Node>> {
    let mut buckets: std::collections::HashMap<String, Vec<&Node>> = std::collections::HashMap::new();
    for node in nodes {
        buckets.entry(node.node_type.clone()).or_default().push(node);
    }
    buckets
}
