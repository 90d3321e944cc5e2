//! Run-scoped store of values observed in successful interactions

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::model::{Location, NodeId, ParameterArena, ParameterType};

/// The leaf a dictionary value was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLeaf {
    /// Label of the operation (`GET /pets`).
    pub operation: String,
    pub node: Option<NodeId>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DictionaryEntry {
    pub parameter_name: String,
    pub normalized_name: String,
    pub parameter_type: ParameterType,
    pub source: Option<SourceLeaf>,
    pub value: Value,
    pub discovered_at: SystemTime,
}

impl DictionaryEntry {
    #[must_use]
    pub fn new(
        parameter_name: impl Into<String>,
        normalized_name: impl Into<String>,
        parameter_type: ParameterType,
        value: Value,
    ) -> Self {
        Self {
            parameter_name: parameter_name.into(),
            normalized_name: normalized_name.into(),
            parameter_type,
            source: None,
            value,
            discovered_at: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: SourceLeaf) -> Self {
        self.source = Some(source);
        self
    }

    /// Entry describing the current value of a leaf.
    #[must_use]
    pub fn from_leaf(arena: &ParameterArena, id: NodeId) -> Option<Self> {
        let node = arena.get(id)?;
        let value = node.value()?.clone();
        Some(
            Self::new(
                node.name.clone(),
                node.normalized_name.clone(),
                node.parameter_type(),
                value,
            )
            .with_source(SourceLeaf {
                operation: arena.owner().to_string(),
                node: Some(id),
                location: node.location,
            }),
        )
    }

    fn key(&self) -> EntryKey {
        EntryKey {
            parameter_name: self.parameter_name.clone(),
            normalized_name: self.normalized_name.clone(),
            parameter_type: self.parameter_type,
            value: key_text(&self.value),
        }
    }

    /// Length used by [`Dictionary::entries_by_value_length`]: characters of
    /// strings, items of arrays, digits of numbers.
    #[must_use]
    pub fn value_length(&self) -> usize {
        match &self.value {
            Value::String(s) => s.chars().count(),
            Value::Array(a) => a.len(),
            Value::Object(o) => o.len(),
            other => other.to_string().len(),
        }
    }
}

/// Integral floats below 2^53 are exact, so `7.0` and `7` share a key.
const EXACT_FLOAT_LIMIT: f64 = 9_007_199_254_740_992.0;

/// JSON text of `value` with integral floats written as integers.
fn key_text(value: &Value) -> String {
    match value {
        Value::Number(n) if !n.is_i64() && !n.is_u64() => match n.as_f64() {
            #[allow(clippy::cast_possible_truncation)]
            Some(f) if f.fract() == 0.0 && f.abs() < EXACT_FLOAT_LIMIT => (f as i64).to_string(),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Identity of an entry; the value is compared through its JSON text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct EntryKey {
    parameter_name: String,
    normalized_name: String,
    parameter_type: ParameterType,
    value: String,
}

/// Deduplicating value store. Entries are only ever added or refreshed.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: BTreeMap<EntryKey, DictionaryEntry>,
}

impl Dictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &DictionaryEntry> {
        self.entries.values()
    }

    /// Insert `entry`, or refresh `discovered_at` and `source` of the equal
    /// entry already stored. Returns `true` when a new entry was created.
    pub fn add_entry(&mut self, entry: DictionaryEntry) -> bool {
        let key = entry.key();
        if let Some(existing) = self.entries.get_mut(&key) {
            existing.discovered_at = entry.discovered_at;
            existing.source = entry.source;
            return false;
        }
        debug!(name = %entry.normalized_name, value = %entry.value, "new dictionary entry");
        self.entries.insert(key, entry);
        true
    }

    pub fn entries_by_normalized_name<'a>(
        &'a self,
        normalized_name: &str,
        parameter_type: ParameterType,
    ) -> impl Iterator<Item = &'a DictionaryEntry> {
        self.entries.values().filter(move |e| {
            e.parameter_type == parameter_type
                && e.normalized_name.eq_ignore_ascii_case(normalized_name)
        })
    }

    pub fn entries_by_raw_name<'a>(
        &'a self,
        name: &str,
        parameter_type: ParameterType,
    ) -> impl Iterator<Item = &'a DictionaryEntry> {
        self.entries
            .values()
            .filter(move |e| e.parameter_type == parameter_type && e.parameter_name == name)
    }

    pub fn entries_by_value_length(&self, length: usize) -> impl Iterator<Item = &DictionaryEntry> {
        self.entries
            .values()
            .filter(move |e| e.value_length() == length)
    }

    /// Entries with the normalized name and type of `target` whose value
    /// `target` accepts.
    #[must_use]
    pub fn strict_entries_by_normalized_name(
        &self,
        arena: &ParameterArena,
        target: NodeId,
    ) -> Vec<&DictionaryEntry> {
        let Some(node) = arena.get(target) else {
            return Vec::new();
        };
        self.entries_by_normalized_name(&node.normalized_name, node.parameter_type())
            .filter(|e| arena.is_value_compliant(target, &e.value))
            .collect()
    }

    #[must_use]
    pub fn strict_entries_by_raw_name(
        &self,
        arena: &ParameterArena,
        target: NodeId,
    ) -> Vec<&DictionaryEntry> {
        let Some(node) = arena.get(target) else {
            return Vec::new();
        };
        self.entries_by_raw_name(&node.name, node.parameter_type())
            .filter(|e| arena.is_value_compliant(target, &e.value))
            .collect()
    }

    #[must_use]
    pub fn strict_entries_by_value_length(
        &self,
        length: usize,
        arena: &ParameterArena,
        target: NodeId,
    ) -> Vec<&DictionaryEntry> {
        self.entries_by_value_length(length)
            .filter(|e| arena.is_value_compliant(target, &e.value))
            .collect()
    }
}
