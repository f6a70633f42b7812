//! Action label interning.
//!
//! Every transition label is interned to a dense integer id; graph operations
//! compare actions by id and intersect sets of ids, so interning is mandatory
//! for composition performance. Id 0 is reserved for the silent action `tau`.

use indexmap::IndexMap;

/// Dense id of an interned action label.
pub type ActionId = u32;

/// The reserved id of the silent action.
pub const TAU: ActionId = 0;

/// Bidirectional interning table for action labels.
///
/// Insertion is idempotent and ids are stable for the lifetime of the table.
/// The map index doubles as the id, so the reverse direction is a plain
/// indexed lookup.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ActionTable {
    labels: IndexMap<String, ()>,
}

impl ActionTable {
    /// Creates a table with `tau` pre-interned at id 0.
    pub fn new() -> Self {
        let mut table = Self {
            labels: IndexMap::new(),
        };
        table.insert("tau");
        table
    }

    /// Interns `label`, returning its id. Idempotent.
    pub fn insert(&mut self, label: &str) -> ActionId {
        if let Some(id) = self.labels.get_index_of(label) {
            return id as ActionId;
        }
        let (id, _) = self.labels.insert_full(label.to_owned(), ());
        id as ActionId
    }

    /// Looks up a label, returning its id if it has been interned.
    pub fn lookup(&self, label: &str) -> Option<ActionId> {
        self.labels.get_index_of(label).map(|id| id as ActionId)
    }

    /// Returns the label for `id`.
    ///
    /// Panics if `id` was never issued by [`insert`](Self::insert).
    pub fn name(&self, id: ActionId) -> &str {
        self.labels
            .get_index(id as usize)
            .map(|(label, ())| label.as_str())
            .expect("action id out of range")
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterates `(id, label)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ActionId, &str)> {
        self.labels
            .keys()
            .enumerate()
            .map(|(id, label)| (id as ActionId, label.as_str()))
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tau_is_id_zero() {
        let table = ActionTable::new();
        assert_eq!(table.lookup("tau"), Some(TAU));
        assert_eq!(table.name(TAU), "tau");
    }

    #[test]
    fn insert_is_idempotent() {
        let mut table = ActionTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_ne!(a, b);
        assert_eq!(table.insert("a"), a);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn round_trip() {
        let mut table = ActionTable::new();
        for label in ["a", "run.start", "buf[0][1]", "tau"] {
            let id = table.insert(label);
            assert_eq!(table.name(id), label);
            assert_eq!(table.lookup(label), Some(id));
        }
        assert_eq!(table.lookup("missing"), None);
    }
}
