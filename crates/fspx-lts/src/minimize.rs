//! Weak-bisimulation minimization.
//!
//! Two phases:
//!
//! 1. Partition refinement: states start grouped by the set of actions they
//!    can take; a partition splits whenever two members reach different
//!    partition sets through some action. Each stable partition collapses to
//!    one state.
//! 2. Tau-chain collapse: a maximal chain whose intermediate nodes have
//!    exactly one outgoing tau edge and one incoming edge collapses onto its
//!    last node; tau self-loops are dropped. Both phases preserve weak
//!    bisimulation.

use std::collections::{BTreeSet, HashMap, VecDeque};

use fspx_core::{ActionId, TAU};

use crate::graph::{Lts, Node, NodeType};

impl Lts {
    fn reachable_actions_set(&self, state: u32) -> BTreeSet<ActionId> {
        self.edges(state).iter().map(|e| e.action).collect()
    }

    fn reachable_partitions_set(
        &self,
        state: u32,
        action: ActionId,
        partitions_map: &[usize],
    ) -> BTreeSet<usize> {
        self.edges(state)
            .iter()
            .filter(|e| e.action == action)
            .map(|e| partitions_map[e.dest as usize])
            .collect()
    }

    /// Initial partition: states grouped by their outgoing action set.
    fn initial_partitions(&self) -> (Vec<BTreeSet<u32>>, Vec<usize>) {
        let mut partitions: Vec<BTreeSet<u32>> = Vec::new();
        let mut action_sets: Vec<BTreeSet<ActionId>> = Vec::new();
        let mut partitions_map = vec![0usize; self.num_states()];

        for i in 0..self.num_states() as u32 {
            let actions = self.reachable_actions_set(i);
            match action_sets.iter().position(|s| *s == actions) {
                Some(k) => {
                    partitions[k].insert(i);
                    partitions_map[i as usize] = k;
                }
                None => {
                    partitions.push(BTreeSet::from([i]));
                    partitions_map[i as usize] = partitions.len() - 1;
                    action_sets.push(actions);
                }
            }
        }

        (partitions, partitions_map)
    }

    /// Replaces the state space with one state per partition, preserving the
    /// transitions between partitions. The partition containing node 0 keeps
    /// index 0 by construction of the initial partition.
    fn reduce_to_partitions(&mut self, partitions: &[BTreeSet<u32>], partitions_map: &[usize]) {
        if self.num_states() == partitions.len() {
            return;
        }

        let mut new_nodes: Vec<Node> = vec![Node::default(); partitions.len()];
        let mut types: Vec<NodeType> = vec![NodeType::Normal; partitions.len()];

        for (k, partition) in partitions.iter().enumerate() {
            let exponent = *partition.first().expect("empty partition");
            types[k] = self.node_type(exponent);

            for action in self.reachable_actions_set(exponent) {
                for dest in self.reachable_partitions_set(exponent, action, partitions_map) {
                    new_nodes[k].edges.push(crate::graph::Edge {
                        action,
                        dest: dest as u32,
                    });
                }
            }
        }

        self.nodes = new_nodes;
        self.infos = types
            .iter()
            .map(|&ty| crate::graph::NodeInfo { ty, alias: None })
            .collect();
        self.rebuild_end_err();
        self.invalidate_caches();
    }

    /// Collapses tau chains onto their last node and removes tau self-loops.
    fn collapse_tau_chains(&mut self) {
        let n = self.num_states();
        if n == 0 {
            return;
        }

        let mut ingoing = vec![0usize; n];
        for node in &self.nodes {
            for edge in &node.edges {
                ingoing[edge.dest as usize] += 1;
            }
        }

        let mut seen = vec![false; n];
        let mut collapse_map: HashMap<u32, u32> = HashMap::new();
        let mut frontier = VecDeque::new();
        seen[0] = true;
        frontier.push_back(0u32);

        while let Some(state) = frontier.pop_front() {
            let mut next = state;

            let single_tau = |lts: &Lts, s: u32| {
                let edges = lts.edges(s);
                edges.len() == 1 && edges[0].action == TAU
            };

            if single_tau(self, state) {
                next = self.edges(state)[0].dest;

                // Walk the chain: intermediate nodes have one outgoing tau
                // edge and one incoming edge. Stop before looping back to
                // the initial state or revisiting a chain member.
                let mut walked: BTreeSet<u32> = BTreeSet::from([state]);
                while single_tau(self, next)
                    && ingoing[next as usize] == 1
                    && self.edges(next)[0].dest != 0
                    && !walked.contains(&self.edges(next)[0].dest)
                {
                    walked.insert(next);
                    if !seen[next as usize] {
                        seen[next as usize] = true;
                        self.set_node_type(next, NodeType::Zombie);
                    }
                    next = self.edges(next)[0].dest;
                }

                if state != next {
                    collapse_map.insert(state, next);
                    self.set_node_type(state, NodeType::Zombie);
                } else {
                    // A tau self-loop: dropping it preserves weak
                    // equivalence.
                    self.nodes[state as usize]
                        .edges
                        .retain(|e| !(e.dest == state && e.action == TAU));
                }
            }

            for i in 0..self.edges(next).len() {
                let dest = self.edges(next)[i].dest;
                if !seen[dest as usize] {
                    seen[dest as usize] = true;
                    frontier.push_back(dest);
                }
            }
        }

        // The collapse target inherits every ingoing transition of the
        // chain's first node.
        for node in &mut self.nodes {
            for edge in &mut node.edges {
                if let Some(&target) = collapse_map.get(&edge.dest) {
                    edge.dest = target;
                }
            }
        }

        self.remove_type(NodeType::Zombie, None, true);
    }

    /// Minimizes the LTS up to weak bisimulation.
    pub fn minimize(&mut self) {
        if self.num_states() == 0 {
            return;
        }

        let (mut partitions, mut partitions_map) = self.initial_partitions();

        'split: loop {
            for k in 0..partitions.len() {
                if partitions[k].len() == 1 {
                    continue;
                }

                let representative = *partitions[k].first().expect("empty partition");
                for action in self.reachable_actions_set(representative) {
                    // Group the members by the partition set their
                    // `action`-successors land in.
                    let mut dests_sets: Vec<BTreeSet<usize>> = Vec::new();
                    let mut sub_partitions: Vec<BTreeSet<u32>> = Vec::new();

                    for &member in &partitions[k] {
                        let dests =
                            self.reachable_partitions_set(member, action, &partitions_map);
                        match dests_sets.iter().position(|s| *s == dests) {
                            Some(j) => {
                                sub_partitions[j].insert(member);
                            }
                            None => {
                                dests_sets.push(dests);
                                sub_partitions.push(BTreeSet::from([member]));
                            }
                        }
                    }

                    if sub_partitions.len() > 1 {
                        // Replace partition k with the first group, enqueue
                        // the rest, and restart: the map has changed.
                        let mut iter = sub_partitions.into_iter();
                        let first = iter.next().expect("split produced no groups");
                        for &member in &first {
                            partitions_map[member as usize] = k;
                        }
                        partitions[k] = first;
                        for sub in iter {
                            for &member in &sub {
                                partitions_map[member as usize] = partitions.len();
                            }
                            partitions.push(sub);
                        }
                        continue 'split;
                    }
                }
            }
            break;
        }

        self.reduce_to_partitions(&partitions, &partitions_map);
        self.collapse_tau_chains();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fspx_core::ActionTable;

    /// Two equivalent `a`-loop states reachable through `a` from the start.
    fn duplicated_loop(at: &mut ActionTable) -> Lts {
        let a = at.insert("a");
        let mut lts = Lts::stop();
        let s1 = lts.push_node(NodeType::Normal);
        let s2 = lts.push_node(NodeType::Normal);
        lts.add_edge(0, a, s1);
        lts.add_edge(s1, a, s2);
        lts.add_edge(s2, a, s1);
        lts.update_alphabet(a);
        lts
    }

    #[test]
    fn equivalent_states_collapse() {
        let mut at = ActionTable::new();
        let mut lts = duplicated_loop(&mut at);
        lts.minimize();
        // 0, s1 and s2 all just offer `a` forever: one state remains.
        assert_eq!(lts.num_states(), 1);
        assert_eq!(lts.num_transitions(), 1);
    }

    #[test]
    fn minimize_is_idempotent_on_state_count() {
        let mut at = ActionTable::new();
        let mut lts = duplicated_loop(&mut at);
        lts.minimize();
        let once = lts.num_states();
        lts.minimize();
        assert_eq!(lts.num_states(), once);
    }

    #[test]
    fn tau_chain_collapses_onto_tail() {
        let mut at = ActionTable::new();
        let a = at.insert("a");
        // 0 -a-> 1 -tau-> 2 -tau-> 3 -a-> 3.
        let mut lts = Lts::stop();
        let s1 = lts.push_node(NodeType::Normal);
        let s2 = lts.push_node(NodeType::Normal);
        let s3 = lts.push_node(NodeType::Normal);
        lts.add_edge(0, a, s1);
        lts.add_edge(s1, TAU, s2);
        lts.add_edge(s2, TAU, s3);
        lts.add_edge(s3, a, s3);
        lts.update_alphabet(a);

        lts.collapse_tau_chains();
        assert_eq!(lts.num_states(), 2);
        assert!(lts
            .nodes
            .iter()
            .all(|n| n.edges.iter().all(|e| e.action != TAU)));
    }

    #[test]
    fn distinct_behaviors_stay_apart() {
        let mut at = ActionTable::new();
        let a = at.insert("a");
        let b = at.insert("b");
        let mut lts = Lts::stop();
        let s1 = lts.push_node(NodeType::Normal);
        let s2 = lts.push_node(NodeType::Normal);
        lts.add_edge(0, a, s1);
        lts.add_edge(0, b, s2);
        lts.add_edge(s1, a, s1);
        lts.add_edge(s2, b, s2);
        lts.update_alphabet(a);
        lts.update_alphabet(b);

        lts.minimize();
        assert_eq!(lts.num_states(), 3);
    }
}
