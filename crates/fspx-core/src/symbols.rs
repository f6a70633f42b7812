//! Typed symbol values and named symbol stores.
//!
//! The identifier table maps names to [`Value`]s (integer constants, ranges,
//! label sets). The operator payloads produced by the translator — relabeling
//! lists, hiding and priority specifications, action-id sets, progress
//! properties — are plain structs; each table in the driver is a
//! [`SymbolTable`] over the value kind it stores.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::actions::{ActionId, ActionTable};
use crate::sets::LabelSet;

/// Inclusive integer range, optionally binding a variable.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RangeValue {
    pub low: i64,
    pub high: i64,
    pub variable: Option<String>,
}

impl RangeValue {
    pub fn new(low: i64, high: i64) -> Self {
        Self {
            low,
            high,
            variable: None,
        }
    }

    /// Expands the range into a label set of decimal strings.
    pub fn to_label_set(&self) -> LabelSet {
        let mut set = LabelSet::new();
        for i in self.low..=self.high {
            set.push(i.to_string());
        }
        if let Some(var) = &self.variable {
            set.set_variable(var.clone());
        }
        set
    }
}

/// A value stored under an identifier: constant, range or set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Range(RangeValue),
    Set(LabelSet),
}

impl Value {
    /// Discriminating tag, used in type-mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "const",
            Value::Range(_) => "range",
            Value::Set(_) => "set",
        }
    }
}

/// Ordered list of `(new_labels, old_labels)` relabeling pairs.
#[derive(Debug, Clone, Default)]
pub struct RelabelingSpec {
    pub pairs: Vec<(LabelSet, LabelSet)>,
}

impl RelabelingSpec {
    pub fn add(&mut self, new_labels: LabelSet, old_labels: LabelSet) {
        self.pairs.push((new_labels, old_labels));
    }

    pub fn merge(&mut self, other: RelabelingSpec) {
        self.pairs.extend(other.pairs);
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Hiding specification: hide the matching labels, or expose only them.
#[derive(Debug, Clone)]
pub struct HidingSpec {
    pub set: LabelSet,
    /// `false` hides the matching labels, `true` keeps only them.
    pub interface: bool,
}

/// Priority specification over a label set.
#[derive(Debug, Clone)]
pub struct PrioritySpec {
    pub set: LabelSet,
    /// `true` for low priority (`>>`), `false` for high (`<<`).
    pub low: bool,
}

/// Unordered set of interned action ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ActionSet {
    pub actions: BTreeSet<ActionId>,
}

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns every label of `set` and collects the ids.
    pub fn from_label_set(set: &LabelSet, table: &mut ActionTable) -> Self {
        let mut actions = BTreeSet::new();
        for (label, _) in set.iter() {
            actions.insert(table.insert(label));
        }
        Self { actions }
    }

    pub fn add(&mut self, action: ActionId) -> bool {
        self.actions.insert(action)
    }

    pub fn contains(&self, action: ActionId) -> bool {
        self.actions.contains(&action)
    }

    pub fn intersects(&self, other: &BTreeSet<ActionId>) -> bool {
        self.actions.iter().any(|a| other.contains(a))
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Renders the set back to labels, in id order.
    pub fn to_label_set(&self, table: &ActionTable) -> LabelSet {
        let mut set = LabelSet::new();
        for &id in &self.actions {
            set.push(table.name(id));
        }
        set
    }
}

/// A progress property: unconditional (`set` must be live) or conditional
/// (`set` must be live wherever `condition` is).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProgressSpec {
    pub condition: Option<ActionSet>,
    pub set: ActionSet,
}

/// Ordered name → value store with insert-fails-on-duplicate semantics.
///
/// Iteration follows insertion (declaration) order. Copying a table deep
/// clones every stored value.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable<V> {
    table: IndexMap<String, V>,
}

impl<V> SymbolTable<V> {
    pub fn new() -> Self {
        Self {
            table: IndexMap::new(),
        }
    }

    /// Inserts `value` under `name`; fails (returning `false` and leaving the
    /// table unchanged) if the name is already bound.
    pub fn insert(&mut self, name: impl Into<String>, value: V) -> bool {
        let name = name.into();
        if self.table.contains_key(&name) {
            return false;
        }
        self.table.insert(name, value);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&V> {
        self.table.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut V> {
        self.table.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    /// Removes `name`, returning its value. Preserves the order of the
    /// remaining entries.
    pub fn remove(&mut self, name: &str) -> Option<V> {
        self.table.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.table.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_rejects_duplicates() {
        let mut table = SymbolTable::new();
        assert!(table.insert("N", Value::Int(3)));
        assert!(!table.insert("N", Value::Int(4)));
        assert_eq!(table.lookup("N"), Some(&Value::Int(3)));
    }

    #[test]
    fn iteration_is_declaration_order() {
        let mut table = SymbolTable::new();
        table.insert("B", Value::Int(1));
        table.insert("A", Value::Int(2));
        let names: Vec<_> = table.keys().collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn action_set_round_trip() {
        let mut at = ActionTable::new();
        let mut set = LabelSet::new();
        set.push("b");
        set.push("a");
        set.push("b");
        let asv = ActionSet::from_label_set(&set, &mut at);
        assert_eq!(asv.actions.len(), 2);
        assert!(asv.contains(at.lookup("a").unwrap()));
        assert!(asv.contains(at.lookup("b").unwrap()));
    }

    #[test]
    fn range_expansion_carries_variable() {
        let range = RangeValue {
            low: -1,
            high: 1,
            variable: Some("i".into()),
        };
        let set = range.to_label_set();
        assert_eq!(set.labels(), &["-1", "0", "1"]);
        assert_eq!(set.variable(), Some("i"));
    }
}
