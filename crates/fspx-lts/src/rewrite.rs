//! Label-rewriting operators: labeling, sharing, relabeling, hiding,
//! priority and property completion.
//!
//! Each operator first computes an action mapping against the alphabet, then
//! rewrites the edge lists. Matching on label sets is literal string-prefix
//! matching, so `a` selects `a`, `a.x` and `a[1]` alike.

use std::collections::{BTreeSet, HashMap};

use fspx_core::{ActionId, ActionTable, HidingSpec, LabelSet, PrioritySpec, RelabelingSpec, TAU};

use crate::graph::{Edge, Lts, NodeType};

/// True when `prefix` is a literal string prefix of `label`.
fn prefix_match(label: &str, prefix: &str) -> bool {
    label.as_bytes().starts_with(prefix.as_bytes())
}

impl Lts {
    /// Prefixes every action with `label.`: `a` becomes `label.a`.
    pub fn labeling_str(&mut self, label: &str, at: &mut ActionTable) -> &mut Self {
        self.invalidate_caches();

        let mut mapping: HashMap<ActionId, ActionId> = HashMap::new();
        let mut new_alphabet = BTreeSet::new();
        for &old in self.alphabet.iter().collect::<Vec<_>>() {
            let new = at.insert(&format!("{label}.{}", at_name(at, old)));
            new_alphabet.insert(new);
            mapping.insert(old, new);
        }
        self.alphabet = new_alphabet;

        for node in &mut self.nodes {
            for edge in &mut node.edges {
                // Unmapped actions (tau on hidden edges) stay put.
                if let Some(&new) = mapping.get(&edge.action) {
                    edge.action = new;
                }
            }
        }
        self
    }

    /// Process labeling with a set: one relabeled copy per prefix, composed
    /// in parallel.
    pub fn labeling(&mut self, labels: &LabelSet, at: &mut ActionTable) -> &mut Self {
        if labels.is_empty() {
            return self;
        }
        if labels.len() == 1 {
            return self.labeling_str(labels.get(0), at);
        }

        let copy = self.clone();
        self.labeling_str(labels.get(0), at);
        for i in 1..labels.len() {
            let mut right = copy.clone();
            right.labeling_str(labels.get(i), at);
            self.compose(&right);
        }
        self
    }

    /// Sharing: every edge expands into one edge per prefix in `labels`.
    pub fn sharing(&mut self, labels: &LabelSet, at: &mut ActionTable) -> &mut Self {
        self.invalidate_caches();

        let mut mapping: HashMap<ActionId, Vec<ActionId>> = HashMap::new();
        let mut new_alphabet = BTreeSet::new();
        for &old in self.alphabet.iter().collect::<Vec<_>>() {
            let mut news = Vec::with_capacity(labels.len());
            for (label, _) in labels.iter() {
                let new = at.insert(&format!("{label}.{}", at_name(at, old)));
                new_alphabet.insert(new);
                news.push(new);
            }
            mapping.insert(old, news);
        }
        self.alphabet = new_alphabet;

        for node in &mut self.nodes {
            let mut new_edges = Vec::with_capacity(node.edges.len() * labels.len().max(1));
            for edge in &node.edges {
                match mapping.get(&edge.action) {
                    Some(news) => {
                        for &action in news {
                            new_edges.push(Edge {
                                action,
                                dest: edge.dest,
                            });
                        }
                    }
                    // Tau edges have no alphabet entry and pass unchanged.
                    None => new_edges.push(*edge),
                }
            }
            node.edges = new_edges;
        }
        self
    }

    /// Relabels every action with prefix `old_label` into one action per
    /// element of `new_labels` (prefix replaced), extending the alphabet and
    /// multiplying the matching edges.
    pub fn relabeling_str(
        &mut self,
        new_labels: &LabelSet,
        old_label: &str,
        at: &mut ActionTable,
    ) -> &mut Self {
        self.invalidate_caches();

        let mut mapping: HashMap<ActionId, Vec<ActionId>> = HashMap::new();
        let mut new_alphabet = self.alphabet.clone();
        for &old in self.alphabet.iter().collect::<Vec<_>>() {
            let action = at_name(at, old);
            if !prefix_match(&action, old_label) {
                continue;
            }
            let mut news = Vec::with_capacity(new_labels.len());
            for (new_label, _) in new_labels.iter() {
                let mut renamed = action.clone();
                renamed.replace_range(..old_label.len(), new_label);
                let new = at.insert(&renamed);
                new_alphabet.insert(new);
                news.push(new);
            }
            new_alphabet.remove(&old);
            mapping.insert(old, news);
        }
        self.alphabet = new_alphabet;

        for node in &mut self.nodes {
            let original_size = node.edges.len();
            for j in 0..original_size {
                let edge = node.edges[j];
                if let Some(news) = mapping.get(&edge.action) {
                    node.edges[j].action = news[0];
                    for &action in &news[1..] {
                        node.edges.push(Edge {
                            action,
                            dest: edge.dest,
                        });
                    }
                }
            }
        }
        self
    }

    /// Relabeling over a set of old prefixes.
    pub fn relabeling(
        &mut self,
        new_labels: &LabelSet,
        old_labels: &LabelSet,
        at: &mut ActionTable,
    ) -> &mut Self {
        for (old, _) in old_labels.iter() {
            self.relabeling_str(new_labels, old, at);
        }
        self
    }

    /// Applies every pair of a relabeling specification, in order.
    pub fn apply_relabeling(&mut self, spec: &RelabelingSpec, at: &mut ActionTable) -> &mut Self {
        for (new_labels, old_labels) in &spec.pairs {
            self.relabeling(new_labels, old_labels, at);
        }
        self
    }

    /// Hiding. In hide mode the actions matching a prefix in `spec.set`
    /// leave the alphabet; in interface mode only the matching actions stay.
    /// Edges whose action left the alphabet are rewritten to tau.
    pub fn hiding(&mut self, spec: &HidingSpec, at: &ActionTable) -> &mut Self {
        self.invalidate_caches();

        let set = &spec.set;
        let mut new_alphabet = BTreeSet::new();
        if spec.interface {
            for (prefix, _) in set.iter() {
                for &id in &self.alphabet {
                    if prefix_match(at.name(id), prefix) {
                        new_alphabet.insert(id);
                    }
                }
            }
        } else {
            new_alphabet = self.alphabet.clone();
            for (prefix, _) in set.iter() {
                for &id in &self.alphabet {
                    if prefix_match(at.name(id), prefix) {
                        new_alphabet.remove(&id);
                    }
                }
            }
        }
        self.alphabet = new_alphabet;

        for node in &mut self.nodes {
            for edge in &mut node.edges {
                if !self.alphabet.contains(&edge.action) {
                    edge.action = TAU;
                }
            }
        }
        self
    }

    /// Priority restriction: at every node owning at least one edge on the
    /// preferred side (in the set when `low` is false, outside it when `low`
    /// is true), the other edges are deleted. Follows with a reachability
    /// reduction.
    pub fn priority(&mut self, spec: &PrioritySpec, at: &ActionTable) -> &mut Self {
        self.invalidate_caches();

        let mut priority_actions: BTreeSet<ActionId> = BTreeSet::new();
        for (prefix, _) in spec.set.iter() {
            for &id in &self.alphabet {
                if prefix_match(at.name(id), prefix) {
                    priority_actions.insert(id);
                }
            }
        }

        for node in &mut self.nodes {
            let kept: Vec<Edge> = node
                .edges
                .iter()
                .copied()
                .filter(|e| priority_actions.contains(&e.action) != spec.low)
                .collect();
            if !kept.is_empty() {
                node.edges = kept;
            }
        }

        self.reduce();
        self
    }

    /// Property completion: every End state becomes Normal, an Error state is
    /// ensured, and every missing `(state, alphabet action)` pair gains an
    /// edge to the Error state.
    ///
    /// Returns `false` (leaving the LTS untouched) when the LTS is not
    /// deterministic.
    pub fn property(&mut self) -> bool {
        if !self.is_deterministic() {
            return false;
        }
        self.invalidate_caches();

        let mut err = None;
        for i in 0..self.nodes.len() as u32 {
            match self.node_type(i) {
                NodeType::Error => err = Some(i),
                NodeType::End => self.set_node_type(i, NodeType::Normal),
                _ => {}
            }
        }
        self.end = None;
        let err = match err {
            Some(e) => e,
            None => self.push_node(NodeType::Error),
        };

        for i in 0..self.nodes.len() as u32 {
            if i == err {
                continue;
            }
            let mut to_error = self.alphabet.clone();
            for edge in &self.nodes[i as usize].edges {
                to_error.remove(&edge.action);
            }
            for action in to_error {
                self.nodes[i as usize].edges.push(Edge { action, dest: err });
            }
        }
        true
    }
}

/// Owned name lookup, needed while the table is also being inserted into.
fn at_name(at: &ActionTable, id: ActionId) -> String {
    at.name(id).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(at: &mut ActionTable, labels: &[&str]) -> Lts {
        let mut lts = Lts::stop();
        let mut prev = 0;
        for &label in labels {
            let a = at.insert(label);
            let next = lts.push_node(NodeType::Normal);
            lts.add_edge(prev, a, next);
            lts.update_alphabet(a);
            prev = next;
        }
        lts
    }

    #[test]
    fn labeling_prefixes_every_action() {
        let mut at = ActionTable::new();
        let mut lts = chain(&mut at, &["a", "b"]);
        lts.labeling_str("p", &mut at);

        let labels: Vec<String> = lts
            .alphabet()
            .iter()
            .map(|&id| at.name(id).to_owned())
            .collect();
        assert_eq!(labels, vec!["p.a", "p.b"]);
        assert!(lts.check_edges());
    }

    #[test]
    fn sharing_multiplies_edges() {
        let mut at = ActionTable::new();
        let mut lts = chain(&mut at, &["a"]);
        let mut labels = LabelSet::new();
        labels.push("x");
        labels.push("y");
        lts.sharing(&labels, &mut at);

        assert_eq!(lts.num_transitions(), 2);
        let names: Vec<&str> = lts.edges(0).iter().map(|e| at.name(e.action)).collect();
        assert_eq!(names, vec!["x.a", "y.a"]);
    }

    #[test]
    fn relabeling_rewrites_prefix_matches() {
        let mut at = ActionTable::new();
        let mut lts = chain(&mut at, &["run.start", "halt"]);
        let mut news = LabelSet::new();
        news.push("go");
        let mut olds = LabelSet::new();
        olds.push("run");
        lts.relabeling(&news, &olds, &mut at);

        let names: Vec<&str> = lts.edges(0).iter().map(|e| at.name(e.action)).collect();
        assert_eq!(names, vec!["go.start"]);
        assert!(!lts.in_alphabet(at.lookup("run.start").unwrap()));
        assert!(lts.in_alphabet(at.lookup("go.start").unwrap()));
    }

    #[test]
    fn hiding_empty_set_is_noop() {
        let mut at = ActionTable::new();
        let mut lts = chain(&mut at, &["a", "b"]);
        let before = lts.alphabet().clone();
        let spec = HidingSpec {
            set: LabelSet::new(),
            interface: false,
        };
        lts.hiding(&spec, &at);
        assert_eq!(lts.alphabet(), &before);
        assert!(lts.check_edges());
    }

    #[test]
    fn interface_empty_set_hides_everything() {
        let mut at = ActionTable::new();
        let mut lts = chain(&mut at, &["a", "b"]);
        let spec = HidingSpec {
            set: LabelSet::new(),
            interface: true,
        };
        lts.hiding(&spec, &at);
        assert!(lts.alphabet().is_empty());
        assert!(lts.nodes.iter().all(|n| n.edges.iter().all(|e| e.action == TAU)));
    }

    #[test]
    fn priority_empty_set_low_is_noop() {
        let mut at = ActionTable::new();
        let mut lts = chain(&mut at, &["a", "b"]);
        let transitions = lts.num_transitions();
        // No low-priority actions: nothing gets deleted.
        let spec = PrioritySpec {
            set: LabelSet::new(),
            low: true,
        };
        lts.priority(&spec, &at);
        assert_eq!(lts.num_transitions(), transitions);
    }

    #[test]
    fn priority_over_whole_alphabet_is_noop() {
        let mut at = ActionTable::new();
        let mut lts = chain(&mut at, &["a", "b"]);
        let transitions = lts.num_transitions();
        let mut set = LabelSet::new();
        set.push("a");
        set.push("b");
        // Every edge is high priority: nothing gets deleted.
        lts.priority(&PrioritySpec { set, low: false }, &at);
        assert_eq!(lts.num_transitions(), transitions);
    }

    #[test]
    fn priority_high_keeps_preferred_edges() {
        let mut at = ActionTable::new();
        let a = at.insert("a");
        let b = at.insert("b");
        let mut lts = Lts::stop();
        let s1 = lts.push_node(NodeType::Normal);
        let s2 = lts.push_node(NodeType::Normal);
        lts.add_edge(0, a, s1);
        lts.add_edge(0, b, s2);
        lts.update_alphabet(a);
        lts.update_alphabet(b);

        let mut set = LabelSet::new();
        set.push("a");
        lts.priority(&PrioritySpec { set, low: false }, &at);

        assert_eq!(lts.num_states(), 2);
        assert_eq!(lts.edges(0).len(), 1);
        assert_eq!(lts.edges(0)[0].action, a);
    }

    #[test]
    fn property_completion_is_idempotent() {
        let mut at = ActionTable::new();
        let mut lts = chain(&mut at, &["a", "b"]);
        assert!(lts.property());
        let once_states = lts.num_states();
        let once_transitions = lts.num_transitions();

        assert!(lts.property());
        assert_eq!(lts.num_states(), once_states);
        assert_eq!(lts.num_transitions(), once_transitions);
    }

    #[test]
    fn property_adds_error_completion() {
        let mut at = ActionTable::new();
        // 0 -a-> 1 -b-> 0 over alphabet {a, b}.
        let a = at.insert("a");
        let b = at.insert("b");
        let mut lts = Lts::stop();
        let s1 = lts.push_node(NodeType::Normal);
        lts.add_edge(0, a, s1);
        lts.add_edge(s1, b, 0);
        lts.update_alphabet(a);
        lts.update_alphabet(b);

        assert!(lts.property());
        assert_eq!(lts.num_states(), 3);
        assert_eq!(lts.node_type(2), NodeType::Error);
        assert_eq!(lts.step(0, b), Some(2));
        assert_eq!(lts.step(1, a), Some(2));
        assert_eq!(lts.step(0, a), Some(1));
        assert_eq!(lts.step(1, b), Some(0));
    }
}
