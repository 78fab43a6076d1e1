//! Property index: property name -> value -> set of ids, plus a reverse map
//! id -> {property -> value} for removal and `contains`/`matches` scans.

use alayasiki_core::model::PropertyValue;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Contains,
    Matches,
}

fn value_key(value: &PropertyValue) -> String {
    match value {
        PropertyValue::String(s) => format!("s:{s}"),
        PropertyValue::Number(n) => format!("n:{n}"),
        PropertyValue::Bool(b) => format!("b:{b}"),
        PropertyValue::Null => "null".to_string(),
    }
}

#[derive(Debug, Default)]
pub struct PropertyIndex {
    // property -> value-key -> ids
    forward: HashMap<String, HashMap<String, HashSet<String>>>,
    // property -> value-key -> raw value (for range scans)
    values: HashMap<String, HashMap<String, PropertyValue>>,
    // id -> property -> value
    reverse: HashMap<String, HashMap<String, PropertyValue>>,
}

impl PropertyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str, property: &str, value: PropertyValue) {
        let key = value_key(&value);
        self.forward
            .entry(property.to_string())
            .or_default()
            .entry(key.clone())
            .or_default()
            .insert(id.to_string());
        self.values
            .entry(property.to_string())
            .or_default()
            .insert(key, value.clone());
        self.reverse
            .entry(id.to_string())
            .or_default()
            .insert(property.to_string(), value);
    }

    pub fn remove(&mut self, id: &str) {
        if let Some(props) = self.reverse.remove(id) {
            for (property, value) in props {
                let key = value_key(&value);
                if let Some(by_value) = self.forward.get_mut(&property) {
                    if let Some(ids) = by_value.get_mut(&key) {
                        ids.remove(id);
                        if ids.is_empty() {
                            by_value.remove(&key);
                        }
                    }
                }
            }
        }
    }

    pub fn query(&self, property: &str, op: PropertyOp, target: &PropertyValue) -> HashSet<String> {
        let Some(by_value) = self.forward.get(property) else {
            return HashSet::new();
        };
        let Some(raw_values) = self.values.get(property) else {
            return HashSet::new();
        };

        match op {
            PropertyOp::Eq => by_value.get(&value_key(target)).cloned().unwrap_or_default(),
            PropertyOp::Ne => by_value
                .iter()
                .filter(|(key, _)| raw_values.get(*key) != Some(target))
                .flat_map(|(_, ids)| ids.iter().cloned())
                .collect(),
            PropertyOp::Lt | PropertyOp::Gt | PropertyOp::Lte | PropertyOp::Gte => {
                let Some(target_n) = target.as_number() else {
                    return HashSet::new();
                };
                by_value
                    .iter()
                    .filter(|(key, _)| {
                        raw_values
                            .get(*key)
                            .and_then(PropertyValue::as_number)
                            .map(|n| match op {
                                PropertyOp::Lt => n < target_n,
                                PropertyOp::Gt => n > target_n,
                                PropertyOp::Lte => n <= target_n,
                                PropertyOp::Gte => n >= target_n,
                                _ => unreachable!(),
                            })
                            .unwrap_or(false)
                    })
                    .flat_map(|(_, ids)| ids.iter().cloned())
                    .collect()
            }
            PropertyOp::Contains => {
                let Some(needle) = target.as_str() else {
                    return HashSet::new();
                };
                let needle_lower = needle.to_lowercase();
                by_value
                    .iter()
                    .filter(|(key, _)| {
                        raw_values
                            .get(*key)
                            .and_then(PropertyValue::as_str)
                            .map(|s| s.to_lowercase().contains(&needle_lower))
                            .unwrap_or(false)
                    })
                    .flat_map(|(_, ids)| ids.iter().cloned())
                    .collect()
            }
            PropertyOp::Matches => {
                let Some(pattern) = target.as_str() else {
                    return HashSet::new();
                };
                let Ok(regex) = Regex::new(pattern) else {
                    return HashSet::new();
                };
                by_value
                    .iter()
                    .filter(|(key, _)| {
                        raw_values
                            .get(*key)
                            .and_then(PropertyValue::as_str)
                            .map(|s| regex.is_match(s))
                            .unwrap_or(false)
                    })
                    .flat_map(|(_, ids)| ids.iter().cloned())
                    .collect()
            }
        }
    }
}

/// Numeric comparison helper kept separate from the index for reuse by
/// callers doing in-memory filtering outside the index (e.g. query-time
/// property filters on a candidate set already materialized).
pub fn compare_numbers(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}
