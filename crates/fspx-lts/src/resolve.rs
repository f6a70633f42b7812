//! Local-process name resolution.
//!
//! While a process definition is translated, references to (possibly local)
//! process names become single Unresolved nodes carrying a group alias. The
//! [`UnresolvedNames`] table groups the names that must resolve to the same
//! node; [`Lts::resolve`] then redirects every edge into the defining node of
//! its group and drops the placeholders.

use crate::graph::{Lts, NodeType};

/// Group alias ids start past the prefix-chain context-id space so the two
/// kinds of scratch alias can never collide inside one graph.
const GROUP_BASE: u32 = 1 << 16;

#[derive(Debug, Clone)]
struct GroupEntry {
    name: String,
    defined: bool,
}

/// Disjoint groups of process names that alias the same node.
///
/// Each group holds `(name, defined)` pairs; a name is *defined* when it
/// appeared on the left side of an assignment.
#[derive(Debug, Clone, Default)]
pub struct UnresolvedNames {
    groups: Vec<Vec<GroupEntry>>,
}

impl UnresolvedNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the alias of the group containing `name`, creating a fresh
    /// group when the name is new. A `defined` insertion marks the existing
    /// entry as defined.
    pub fn insert(&mut self, name: &str, defined: bool) -> u32 {
        for (i, group) in self.groups.iter_mut().enumerate() {
            if let Some(entry) = group.iter_mut().find(|e| e.name == name) {
                entry.defined = entry.defined || defined;
                return i as u32 + GROUP_BASE;
            }
        }
        self.groups.push(vec![GroupEntry {
            name: name.to_owned(),
            defined,
        }]);
        (self.groups.len() - 1) as u32 + GROUP_BASE
    }

    /// Adds `name` to the existing group `alias`. If another group already
    /// contains the name, the name migrates here and that group's alias is
    /// returned so the caller can rewrite node aliases that referenced it.
    pub fn append(&mut self, name: &str, alias: u32, defined: bool) -> Option<u32> {
        let i = (alias - GROUP_BASE) as usize;
        debug_assert!(i < self.groups.len());

        let mut defined = defined;
        for k in 0..self.groups.len() {
            if k == i {
                continue;
            }
            if let Some(j) = self.groups[k].iter().position(|e| e.name == name) {
                defined = defined || self.groups[k][j].defined;
                self.groups[k].remove(j);
                self.groups[i].push(GroupEntry {
                    name: name.to_owned(),
                    defined,
                });
                return Some(k as u32 + GROUP_BASE);
            }
        }

        self.groups[i].push(GroupEntry {
            name: name.to_owned(),
            defined,
        });
        None
    }

    /// Whether `name` exists in some group and has been defined.
    pub fn defined(&self, name: &str) -> bool {
        self.groups
            .iter()
            .flatten()
            .find(|e| e.name == name)
            .is_some_and(|e| e.defined)
    }

    /// The names grouped under `alias`, comma-joined; used in diagnostics.
    pub fn lookup(&self, alias: u32) -> Option<String> {
        let i = alias.checked_sub(GROUP_BASE)? as usize;
        let group = self.groups.get(i)?;
        if group.is_empty() {
            return None;
        }
        Some(
            group
                .iter()
                .map(|e| e.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }
}

impl Lts {
    /// Resolves every edge pointing at an Unresolved node: the edge is
    /// redirected to the non-Unresolved node sharing the placeholder's alias.
    /// On success the Unresolved nodes are removed, the node sharing node 0's
    /// alias becomes the new initial state (honoring `P = Q, Q = ...`
    /// definitions), and every alias is cleared.
    ///
    /// Fails with the unmatched alias when some placeholder has no defining
    /// node.
    pub fn resolve(&mut self) -> Result<(), u32> {
        let n = self.nodes.len();
        let zero_alias = self.alias(0);
        let mut zero_idx = None;

        for i in 0..n {
            if zero_alias.is_some()
                && self.node_type(i as u32) != NodeType::Unresolved
                && self.alias(i as u32) == zero_alias
            {
                // The node that must become the new initial state; node 0
                // itself may be an Unresolved alias of it.
                zero_idx = Some(i as u32);
            }
            let num_edges = self.nodes[i].edges.len();
            for j in 0..num_edges {
                let dest = self.nodes[i].edges[j].dest;
                if self.node_type(dest) != NodeType::Unresolved {
                    continue;
                }
                let alias = self.alias(dest).expect("unresolved node without alias");
                let target = (0..n as u32).find(|&k| {
                    self.node_type(k) != NodeType::Unresolved && self.alias(k) == Some(alias)
                });
                match target {
                    Some(k) => self.nodes[i].edges[j].dest = k,
                    None => return Err(alias),
                }
            }
        }

        self.remove_type(NodeType::Unresolved, zero_idx, true);
        self.clear_aliases();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fspx_core::ActionTable;

    #[test]
    fn insert_reuses_group_for_known_name() {
        let mut table = UnresolvedNames::new();
        let a = table.insert("P", false);
        let b = table.insert("P", true);
        assert_eq!(a, b);
        assert_ne!(table.insert("Q", false), a);
    }

    #[test]
    fn append_merges_colliding_group() {
        let mut table = UnresolvedNames::new();
        let p = table.insert("P", false);
        let q = table.insert("Q", false);
        // Q turns out to alias P's group: its old group is reported back.
        let merged = table.append("Q", p, true);
        assert_eq!(merged, Some(q));
        assert!(table.defined("Q"));
        assert_eq!(table.lookup(p), Some("P, Q".to_owned()));
    }

    #[test]
    fn resolve_stitches_recursion() {
        // P = (a -> P): node 1 is an Unresolved reference back to P.
        let mut at = ActionTable::new();
        let mut unres = UnresolvedNames::new();
        let p_alias = unres.insert("P", true);

        let mut lts = Lts::stop();
        lts.set_alias(0, Some(p_alias));
        lts.zerocat(&Lts::unresolved(p_alias), "a", &mut at);

        assert!(lts.resolve().is_ok());
        assert_eq!(lts.num_states(), 1);
        assert_eq!(lts.edges(0).len(), 1);
        assert_eq!(lts.edges(0)[0].dest, 0);
        assert_eq!(lts.alias(0), None);
    }

    #[test]
    fn resolve_reports_missing_definition() {
        let mut at = ActionTable::new();
        let mut unres = UnresolvedNames::new();
        let p_alias = unres.insert("P", true);
        let q_alias = unres.insert("Q", false);

        let mut lts = Lts::stop();
        lts.set_alias(0, Some(p_alias));
        lts.zerocat(&Lts::unresolved(q_alias), "a", &mut at);

        assert_eq!(lts.resolve(), Err(q_alias));
    }

    #[test]
    fn resolve_reroots_on_aliased_zero() {
        // P = Q, Q = (a -> Q): node 0 is an Unresolved alias of Q's node.
        let mut at = ActionTable::new();
        let mut unres = UnresolvedNames::new();
        let q_alias = unres.insert("Q", true);

        let mut lts = Lts::unresolved(q_alias);
        // Q's real definition, self-loop through 'a'.
        let a = at.insert("a");
        let q_node = lts.push_node(NodeType::Normal);
        lts.set_alias(q_node, Some(q_alias));
        lts.add_edge(q_node, a, q_node);
        lts.update_alphabet(a);

        assert!(lts.resolve().is_ok());
        assert_eq!(lts.num_states(), 1);
        assert_eq!(lts.edges(0)[0].dest, 0);
    }
}
