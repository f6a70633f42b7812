//! Parallel composition.
//!
//! Two algorithms over the product automaton of `P` and `Q`:
//!
//! - **operational** (default): explore only the product states reachable
//!   from `(0,0)`, allocating them on first contact;
//! - **declarative**: allocate the full `|P|·|Q|` product, fill in every
//!   transition, then prune with a reachability reduction.
//!
//! A product state `(ip, iq)` is encoded as `ip·|Q| + iq`. Shared actions
//! (those in both alphabets) synchronize; the rest interleave.

use std::collections::HashMap;

use crate::graph::{Lts, NodeType};

/// Selects how [`Lts::compose_with`] enumerates the product automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComposeAlgorithm {
    #[default]
    Operational,
    Declarative,
}

fn product_type(p: &Lts, ip: u32, q: &Lts, iq: u32) -> NodeType {
    if p.node_type(ip) == NodeType::Error || q.node_type(iq) == NodeType::Error {
        NodeType::Error
    } else if p.node_type(ip) == NodeType::End && q.node_type(iq) == NodeType::End {
        NodeType::End
    } else {
        NodeType::Normal
    }
}

fn compose_operational(p: &Lts, q: &Lts) -> Lts {
    let nq = q.num_states() as u64;
    let mut out = Lts::empty();

    // direct: encoded product state -> composite index; inverse: the reverse.
    let mut direct: HashMap<u64, u32> = HashMap::new();
    let mut inverse: Vec<u64> = Vec::new();

    let first = out.push_node(product_type(p, 0, q, 0));
    direct.insert(0, first);
    inverse.push(0);

    let mut reach = |out: &mut Lts,
                     direct: &mut HashMap<u64, u32>,
                     inverse: &mut Vec<u64>,
                     dst_ip: u32,
                     dst_iq: u32|
     -> u32 {
        let code = dst_ip as u64 * nq + dst_iq as u64;
        if let Some(&idx) = direct.get(&code) {
            return idx;
        }
        let idx = out.push_node(product_type(p, dst_ip, q, dst_iq));
        direct.insert(code, idx);
        inverse.push(code);
        idx
    };

    let mut idx: usize = 0;
    while idx < out.num_states() {
        let ip = (inverse[idx] / nq) as u32;
        let iq = (inverse[idx] % nq) as u32;

        for &ep in p.edges(ip) {
            if !q.in_alphabet(ep.action) {
                let dest = reach(&mut out, &mut direct, &mut inverse, ep.dest, iq);
                out.add_edge(idx as u32, ep.action, dest);
            } else {
                for &eq in q.edges(iq) {
                    if eq.action == ep.action {
                        let dest = reach(&mut out, &mut direct, &mut inverse, ep.dest, eq.dest);
                        out.add_edge(idx as u32, ep.action, dest);
                    }
                }
            }
        }

        for &eq in q.edges(iq) {
            if !p.in_alphabet(eq.action) {
                let dest = reach(&mut out, &mut direct, &mut inverse, ip, eq.dest);
                out.add_edge(idx as u32, eq.action, dest);
            }
        }

        idx += 1;
    }

    out.merge_alphabet_from(p.alphabet());
    out.merge_alphabet_from(q.alphabet());
    out
}

fn compose_declarative(p: &Lts, q: &Lts) -> Lts {
    let np = p.num_states() as u32;
    let nq = q.num_states() as u32;
    let mut product = Lts::empty();

    for _ in 0..np as u64 * nq as u64 {
        product.push_node(NodeType::Normal);
    }

    // P moves: alone when the action is not in Q's alphabet, synchronized
    // with every matching Q edge otherwise.
    for ip in 0..np {
        for &ep in p.edges(ip) {
            if !q.in_alphabet(ep.action) {
                for iq in 0..nq {
                    product.add_edge(ip * nq + iq, ep.action, ep.dest * nq + iq);
                }
            } else {
                for iq in 0..nq {
                    for &eq in q.edges(iq) {
                        if eq.action == ep.action {
                            product.add_edge(ip * nq + iq, ep.action, ep.dest * nq + eq.dest);
                        }
                    }
                }
            }
        }
    }

    // Q moves alone.
    for iq in 0..nq {
        for &eq in q.edges(iq) {
            if !p.in_alphabet(eq.action) {
                for ip in 0..np {
                    product.add_edge(ip * nq + iq, eq.action, ip * nq + eq.dest);
                }
            }
        }
    }

    for ip in 0..np {
        for iq in 0..nq {
            let ty = product_type(p, ip, q, iq);
            if ty != NodeType::Normal {
                product.set_node_type(ip * nq + iq, ty);
            }
        }
    }

    product.merge_alphabet_from(p.alphabet());
    product.merge_alphabet_from(q.alphabet());
    product.reduce();
    product
}

impl Lts {
    /// Parallel composition of `p` and `q` with the default algorithm.
    pub fn parallel(p: &Lts, q: &Lts) -> Lts {
        compose_operational(p, q)
    }

    /// Replaces `self` with `self || other` (operational algorithm).
    pub fn compose(&mut self, other: &Lts) -> &mut Self {
        self.compose_with(other, ComposeAlgorithm::default())
    }

    /// Replaces `self` with `self || other` using the selected algorithm.
    pub fn compose_with(&mut self, other: &Lts, algo: ComposeAlgorithm) -> &mut Self {
        let name = std::mem::take(&mut self.name);
        let composed = match algo {
            ComposeAlgorithm::Operational => compose_operational(self, other),
            ComposeAlgorithm::Declarative => compose_declarative(self, other),
        };
        *self = composed;
        self.name = name;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fspx_core::ActionTable;

    /// `P = (a -> b -> P)` style two-state cycle.
    fn cycle(at: &mut ActionTable, first: &str, second: &str) -> Lts {
        let a = at.insert(first);
        let b = at.insert(second);
        let mut lts = Lts::stop();
        let s1 = lts.push_node(NodeType::Normal);
        lts.add_edge(0, a, s1);
        lts.add_edge(s1, b, 0);
        lts.update_alphabet(a);
        lts.update_alphabet(b);
        lts
    }

    #[test]
    fn stop_composed_with_stop_is_one_normal_state() {
        let p = Lts::stop();
        let q = Lts::stop();
        let c = Lts::parallel(&p, &q);
        assert_eq!(c.num_states(), 1);
        assert_eq!(c.num_transitions(), 0);
        assert_eq!(c.node_type(0), NodeType::Normal);
    }

    #[test]
    fn fully_synchronized_cycle_stays_small() {
        let mut at = ActionTable::new();
        let p = cycle(&mut at, "a", "b");
        let q = cycle(&mut at, "b", "a");
        // Alphabets coincide, so both must agree on every step: only the
        // interleavings compatible with both cycles survive.
        let c = Lts::parallel(&p, &q);
        assert!(c.num_states() <= 2);
    }

    #[test]
    fn disjoint_alphabet_unit_preserves_language() {
        let mut at = ActionTable::new();
        let p = cycle(&mut at, "a", "b");
        let mut unit = Lts::stop();
        let c = at.insert("c");
        unit.update_alphabet(c);

        let composed = Lts::parallel(&p, &unit);
        assert_eq!(composed.num_states(), p.num_states());
        assert_eq!(composed.num_transitions(), p.num_transitions());
    }

    #[test]
    fn operational_and_declarative_agree_on_size() {
        let mut at = ActionTable::new();
        let p = cycle(&mut at, "a", "b");
        let q = cycle(&mut at, "c", "d");

        let mut op = p.clone();
        op.compose_with(&q, ComposeAlgorithm::Operational);
        let mut decl = p.clone();
        decl.compose_with(&q, ComposeAlgorithm::Declarative);

        assert_eq!(op.num_states(), decl.num_states());
        assert_eq!(op.num_transitions(), decl.num_transitions());
    }

    #[test]
    fn error_dominates_product_type() {
        let mut at = ActionTable::new();
        let a = at.insert("a");
        let mut p = Lts::stop();
        let e = p.push_node(NodeType::Error);
        p.add_edge(0, a, e);
        p.update_alphabet(a);

        let q = Lts::end();
        let c = Lts::parallel(&p, &q);
        assert_eq!(c.num_states(), 2);
        assert_eq!(c.node_type(1), NodeType::Error);
    }
}
