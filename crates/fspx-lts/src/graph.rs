//! The LTS graph store and incremental construction primitives.
//!
//! Nodes are dense indices `0..N`, node 0 is the initial state. Cyclic
//! process definitions are represented by edge indices, never by pointers;
//! every operator works on the index space. The translator builds graphs
//! bottom-up through placeholder nodes (`Incomplete`, `Unresolved`) that are
//! spliced or resolved away before a process is published.

use std::collections::BTreeSet;

use fspx_core::{ActionId, ActionTable, TAU};

use crate::analysis::TerminalSet;

/// Classification of a node.
///
/// `Normal`, `End` and `Error` survive publication. `Incomplete` and
/// `Unresolved` are construction placeholders; `Zombie` marks nodes scheduled
/// for removal by a compaction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NodeType {
    Normal,
    End,
    Error,
    Incomplete,
    Unresolved,
    Zombie,
}

/// An outgoing transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Edge {
    pub action: ActionId,
    pub dest: u32,
}

/// A node: its ordered outgoing edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub edges: Vec<Edge>,
}

impl Node {
    fn offset(&mut self, offset: u32) {
        for edge in &mut self.edges {
            edge.dest += offset;
        }
    }
}

/// Per-node type tag and translator scratch alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) struct NodeInfo {
    pub(crate) ty: NodeType,
    pub(crate) alias: Option<u32>,
}

impl NodeInfo {
    fn normal() -> Self {
        Self {
            ty: NodeType::Normal,
            alias: None,
        }
    }
}

/// A labelled transition system.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Lts {
    pub(crate) nodes: Vec<Node>,
    pub(crate) infos: Vec<NodeInfo>,
    pub(crate) end: Option<u32>,
    pub(crate) err: Option<u32>,
    pub(crate) alphabet: BTreeSet<ActionId>,
    pub name: String,
    #[serde(skip)]
    pub(crate) terminal_sets: Option<Vec<TerminalSet>>,
}

impl Lts {
    pub(crate) fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            infos: Vec::new(),
            end: None,
            err: None,
            alphabet: BTreeSet::new(),
            name: String::new(),
            terminal_sets: None,
        }
    }

    fn single(ty: NodeType) -> Self {
        let mut lts = Self::empty();
        lts.push_node(ty);
        lts
    }

    /// One Normal state, no edges.
    pub fn stop() -> Self {
        Self::single(NodeType::Normal)
    }

    /// One End state: successful termination.
    pub fn end() -> Self {
        Self::single(NodeType::End)
    }

    /// One Error state: property violation.
    pub fn error() -> Self {
        Self::single(NodeType::Error)
    }

    /// One Unresolved placeholder carrying a name-group alias.
    pub fn unresolved(alias: u32) -> Self {
        let mut lts = Self::single(NodeType::Unresolved);
        lts.infos[0].alias = Some(alias);
        lts
    }

    /// One Unresolved placeholder whose alias the resolver registration
    /// assigns later.
    pub fn unresolved_pending() -> Self {
        Self::single(NodeType::Unresolved)
    }

    /// One Incomplete placeholder carrying a deferred-translation context id.
    pub fn incomplete(ctx_id: u32) -> Self {
        let mut lts = Self::single(NodeType::Incomplete);
        lts.infos[0].alias = Some(ctx_id);
        lts
    }

    /// Appends a fresh node of type `ty`, returning its index.
    pub fn push_node(&mut self, ty: NodeType) -> u32 {
        self.nodes.push(Node::default());
        self.infos.push(NodeInfo::normal());
        let idx = (self.nodes.len() - 1) as u32;
        self.set_node_type(idx, ty);
        idx
    }

    pub fn num_states(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_transitions(&self) -> usize {
        self.nodes.iter().map(|n| n.edges.len()).sum()
    }

    pub fn node_type(&self, state: u32) -> NodeType {
        self.infos[state as usize].ty
    }

    pub fn set_node_type(&mut self, state: u32, ty: NodeType) {
        self.infos[state as usize].ty = ty;
        match ty {
            NodeType::End => self.end = Some(state),
            NodeType::Error => self.err = Some(state),
            _ => {}
        }
    }

    pub fn alias(&self, state: u32) -> Option<u32> {
        self.infos[state as usize].alias
    }

    pub fn set_alias(&mut self, state: u32, alias: Option<u32>) {
        self.infos[state as usize].alias = alias;
    }

    /// Rewrites every alias equal to `old` into `new`.
    pub fn replace_alias(&mut self, new: u32, old: u32) {
        for info in &mut self.infos {
            if info.alias == Some(old) {
                info.alias = Some(new);
            }
        }
    }

    pub fn edges(&self, state: u32) -> &[Edge] {
        &self.nodes[state as usize].edges
    }

    /// Adds an edge. The alphabet is managed separately by the callers:
    /// hidden transitions carry `tau` without it appearing in the alphabet.
    pub fn add_edge(&mut self, src: u32, action: ActionId, dest: u32) {
        self.nodes[src as usize].edges.push(Edge { action, dest });
        self.terminal_sets = None;
    }

    pub fn alphabet(&self) -> &BTreeSet<ActionId> {
        &self.alphabet
    }

    pub fn update_alphabet(&mut self, action: ActionId) {
        self.alphabet.insert(action);
    }

    pub fn in_alphabet(&self, action: ActionId) -> bool {
        self.alphabet.contains(&action)
    }

    pub fn merge_alphabet_from(&mut self, other: &BTreeSet<ActionId>) {
        self.alphabet.extend(other.iter().copied());
    }

    pub(crate) fn invalidate_caches(&mut self) {
        self.terminal_sets = None;
    }

    pub(crate) fn rebuild_end_err(&mut self) {
        self.end = None;
        self.err = None;
        for (i, info) in self.infos.iter().enumerate() {
            match info.ty {
                NodeType::End => self.end = Some(i as u32),
                NodeType::Error => self.err = Some(i as u32),
                _ => {}
            }
        }
    }

    /// Deduplicated outgoing actions of `state`, in id order.
    pub fn eligible_actions(&self, state: u32) -> Vec<ActionId> {
        let set: BTreeSet<ActionId> = self.edges(state).iter().map(|e| e.action).collect();
        set.into_iter().collect()
    }

    /// First destination reachable from `state` through `action`.
    pub fn step(&self, state: u32, action: ActionId) -> Option<u32> {
        self.edges(state)
            .iter()
            .find(|e| e.action == action)
            .map(|e| e.dest)
    }

    // ------------------------------------------------------------------
    // Incremental construction primitives
    // ------------------------------------------------------------------

    /// Concatenates the nodes of `other` starting at index `first` onto
    /// `self` without creating any transitions between the two, and merges
    /// the alphabets. Returns the offset to add to an index of `other` to
    /// obtain its index in `self`.
    pub fn append(&mut self, other: &Lts, first: u32) -> u32 {
        debug_assert!((first as usize) <= self.nodes.len());
        debug_assert!((first as usize) < other.nodes.len());
        let offset = (self.nodes.len() - first as usize) as u32;

        for i in first as usize..other.nodes.len() {
            let mut node = other.nodes[i].clone();
            node.offset(offset);
            self.nodes.push(node);
            self.infos.push(NodeInfo::normal());
            let idx = (self.nodes.len() - 1) as u32;
            self.set_node_type(idx, other.infos[i].ty);
            self.set_alias(idx, other.infos[i].alias);
        }

        self.merge_alphabet_from(&other.alphabet);
        self.invalidate_caches();
        offset
    }

    /// Appends `other` and connects `self`'s node 0 to `other`'s node 0 with
    /// an edge labeled `label`.
    pub fn zerocat(&mut self, other: &Lts, label: &str, at: &mut ActionTable) -> &mut Self {
        let offset = self.append(other, 0);
        let action = at.insert(label);
        self.alphabet.insert(action);
        self.nodes[0].edges.push(Edge {
            action,
            dest: offset,
        });
        self
    }

    /// Appends `other` minus its node 0 and copies the edges out of `other`'s
    /// node 0 onto `self`'s node 0: the two processes start together.
    pub fn zeromerge(&mut self, other: &Lts) -> &mut Self {
        let offset = self.append(other, 1);
        for edge in &other.nodes[0].edges {
            self.nodes[0].edges.push(Edge {
                action: edge.action,
                dest: edge.dest + offset,
            });
        }
        self
    }

    /// Splices `other` in place of `self`'s End node. Returns `false` when
    /// there is no End node to replace.
    pub fn endcat(&mut self, other: &Lts) -> bool {
        debug_assert!(other.num_states() > 0);

        let Some(x) = (0..self.nodes.len() as u32).find(|&i| self.node_type(i) == NodeType::End)
        else {
            return false;
        };

        if other.num_states() == 1 {
            // Replace the End node outright; a self-loop on other's only
            // state stays a self-loop on the spliced node.
            let mut node = other.nodes[0].clone();
            for edge in &mut node.edges {
                if edge.dest == 0 {
                    edge.dest = x;
                }
            }
            self.nodes[x as usize] = node;
            self.set_node_type(x, other.node_type(0));
            self.set_alias(x, other.alias(0));
            if other.node_type(0) != NodeType::End && self.end == Some(x) {
                self.rebuild_end_err();
            }
            self.merge_alphabet_from(&other.alphabet);
            self.invalidate_caches();
            return true;
        }

        let offset = self.append(other, 1);
        let mut node = other.nodes[0].clone();
        node.offset(offset);
        self.nodes[x as usize] = node;
        self.set_node_type(x, other.node_type(0));
        self.set_alias(x, other.alias(0));
        if other.node_type(0) != NodeType::End {
            self.rebuild_end_err();
        }
        true
    }

    /// Redirects every edge targeting an Incomplete node with context id `k`
    /// to the 0-node of `tails[k]`, appending each tail at most once, then
    /// removes the Incomplete nodes.
    pub fn incompcat(&mut self, tails: &[Lts]) -> &mut Self {
        let num_nodes = self.nodes.len();
        let mut offsets: Vec<Option<u32>> = vec![None; tails.len()];

        for i in 0..num_nodes {
            let num_edges = self.nodes[i].edges.len();
            for j in 0..num_edges {
                let edge = self.nodes[i].edges[j];
                if self.node_type(edge.dest) != NodeType::Incomplete {
                    continue;
                }
                let ctx_id = self.alias(edge.dest).expect("incomplete node without id") as usize;
                debug_assert!(ctx_id < tails.len());
                let offset = match offsets[ctx_id] {
                    Some(o) => o,
                    None => {
                        let o = self.append(&tails[ctx_id], 0);
                        offsets[ctx_id] = Some(o);
                        o
                    }
                };
                self.nodes[i].edges.push(Edge {
                    action: edge.action,
                    dest: offset,
                });
            }
        }

        self.remove_type(NodeType::Incomplete, None, false);
        self
    }

    /// Redirects every edge to an End node to the first End node, marks the
    /// others Zombie and compacts.
    pub fn merge_end_nodes(&mut self) -> &mut Self {
        let Some(x) = (0..self.nodes.len() as u32).find(|&i| self.node_type(i) == NodeType::End)
        else {
            return self;
        };

        for node in &mut self.nodes {
            for edge in &mut node.edges {
                if self.infos[edge.dest as usize].ty == NodeType::End {
                    edge.dest = x;
                }
            }
        }

        let mut zombies = false;
        for i in 0..self.nodes.len() as u32 {
            if self.node_type(i) == NodeType::End && i != x {
                self.set_node_type(i, NodeType::Zombie);
                zombies = true;
            }
        }
        if zombies {
            self.remove_type(NodeType::Zombie, None, false);
        }
        self
    }

    // ------------------------------------------------------------------
    // Compaction
    // ------------------------------------------------------------------

    /// Removes every node of type `ty` (and the transitions towards them),
    /// compacting the index space. `zero_idx` names the node that must become
    /// the new index 0; when `call_reduce` is set a reachability reduction
    /// follows.
    pub fn remove_type(&mut self, ty: NodeType, zero_idx: Option<u32>, call_reduce: bool) {
        let n = self.nodes.len();
        let mut remap: Vec<Option<u32>> = vec![None; n];
        let mut cnt: u32 = 0;

        if let Some(z) = zero_idx {
            debug_assert!((z as usize) < n);
            remap[z as usize] = Some(cnt);
            cnt += 1;
        }
        for i in 0..n {
            if self.infos[i].ty == ty {
                remap[i] = None;
            } else if zero_idx != Some(i as u32) {
                remap[i] = Some(cnt);
                cnt += 1;
            }
        }

        let mut new_nodes: Vec<Node> = vec![Node::default(); cnt as usize];
        let mut new_infos: Vec<NodeInfo> = vec![NodeInfo::normal(); cnt as usize];

        for i in 0..n {
            let Some(k) = remap[i] else { continue };
            new_infos[k as usize] = self.infos[i];
            for edge in &self.nodes[i].edges {
                if let Some(dest) = remap[edge.dest as usize] {
                    new_nodes[k as usize].edges.push(Edge {
                        action: edge.action,
                        dest,
                    });
                }
            }
        }

        self.nodes = new_nodes;
        self.infos = new_infos;
        self.rebuild_end_err();
        self.invalidate_caches();

        if call_reduce {
            self.reduce();
        }
    }

    /// BFS reachability reduction: renumbers the states reachable from node 0
    /// into a dense `0..n` ordering and drops the rest.
    pub fn reduce(&mut self) {
        let np = self.nodes.len();
        self.invalidate_caches();
        if np == 0 {
            return;
        }

        let old_nodes = std::mem::take(&mut self.nodes);
        let old_infos = std::mem::take(&mut self.infos);

        let mut map: Vec<Option<u32>> = vec![None; np];
        let mut order: Vec<u32> = Vec::with_capacity(np);
        let mut frontier = std::collections::VecDeque::new();

        map[0] = Some(0);
        order.push(0);
        frontier.push_back(0u32);
        let mut next: u32 = 1;

        while let Some(state) = frontier.pop_front() {
            for edge in &old_nodes[state as usize].edges {
                if map[edge.dest as usize].is_none() {
                    map[edge.dest as usize] = Some(next);
                    order.push(edge.dest);
                    frontier.push_back(edge.dest);
                    next += 1;
                }
            }
        }

        let mut new_nodes: Vec<Node> = vec![Node::default(); next as usize];
        let mut new_infos: Vec<NodeInfo> = vec![NodeInfo::normal(); next as usize];
        for (new_idx, &old_idx) in order.iter().enumerate() {
            new_infos[new_idx] = old_infos[old_idx as usize];
            for edge in &old_nodes[old_idx as usize].edges {
                new_nodes[new_idx].edges.push(Edge {
                    action: edge.action,
                    dest: map[edge.dest as usize].expect("reachable successor"),
                });
            }
        }

        self.nodes = new_nodes;
        self.infos = new_infos;
        self.rebuild_end_err();
    }

    /// Clears every node alias. Published processes carry no scratch state.
    pub fn clear_aliases(&mut self) {
        for info in &mut self.infos {
            info.alias = None;
        }
    }

    /// True when edges carry only alphabet actions (or tau) and every
    /// destination is in range. Debug aid for the §published invariants.
    pub fn check_edges(&self) -> bool {
        let n = self.nodes.len() as u32;
        self.nodes.iter().all(|node| {
            node.edges
                .iter()
                .all(|e| e.dest < n && (e.action == TAU || self.alphabet.contains(&e.action)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fspx_core::ActionTable;

    #[test]
    fn leaf_constructors() {
        assert_eq!(Lts::stop().node_type(0), NodeType::Normal);
        assert_eq!(Lts::end().node_type(0), NodeType::End);
        assert_eq!(Lts::error().node_type(0), NodeType::Error);
        let u = Lts::unresolved(7);
        assert_eq!(u.node_type(0), NodeType::Unresolved);
        assert_eq!(u.alias(0), Some(7));
    }

    #[test]
    fn zerocat_to_end() {
        let mut at = ActionTable::new();
        let mut lts = Lts::stop();
        lts.zerocat(&Lts::end(), "a", &mut at);

        assert_eq!(lts.num_states(), 2);
        assert_eq!(lts.num_transitions(), 1);
        let edge = lts.edges(0)[0];
        assert_eq!(at.name(edge.action), "a");
        assert_eq!(edge.dest, 1);
        assert_eq!(lts.node_type(1), NodeType::End);
    }

    #[test]
    fn zeromerge_combines_starts() {
        let mut at = ActionTable::new();
        let mut p = Lts::stop();
        p.zerocat(&Lts::stop(), "a", &mut at);
        let mut q = Lts::stop();
        q.zerocat(&Lts::stop(), "b", &mut at);

        p.zeromerge(&q);
        assert_eq!(p.num_states(), 3);
        assert_eq!(p.edges(0).len(), 2);
        let actions: Vec<&str> = p.edges(0).iter().map(|e| at.name(e.action)).collect();
        assert_eq!(actions, vec!["a", "b"]);
    }

    #[test]
    fn merge_end_nodes_leaves_one_end() {
        let mut at = ActionTable::new();
        // 0 -a-> End, 0 -b-> End (two End nodes).
        let mut lts = Lts::stop();
        lts.zerocat(&Lts::end(), "a", &mut at);
        lts.zerocat(&Lts::end(), "b", &mut at);
        assert_eq!(lts.num_states(), 3);

        lts.merge_end_nodes();
        assert_eq!(lts.num_states(), 2);
        let ends = (0..lts.num_states() as u32)
            .filter(|&i| lts.node_type(i) == NodeType::End)
            .count();
        assert_eq!(ends, 1);
        assert!(lts.edges(0).iter().all(|e| e.dest == 1));
    }

    #[test]
    fn incompcat_splices_tails() {
        let mut at = ActionTable::new();
        // 0 -a-> Incomplete(0); tail 0 is (b -> STOP).
        let mut lts = Lts::stop();
        lts.zerocat(&Lts::incomplete(0), "a", &mut at);
        let mut tail = Lts::stop();
        tail.zerocat(&Lts::stop(), "b", &mut at);

        lts.incompcat(std::slice::from_ref(&tail));
        assert_eq!(lts.num_states(), 3);
        let a = at.lookup("a").unwrap();
        let b = at.lookup("b").unwrap();
        let first = lts.edges(0)[0];
        assert_eq!(first.action, a);
        assert_eq!(lts.edges(first.dest)[0].action, b);
        assert!(
            (0..lts.num_states() as u32).all(|i| lts.node_type(i) != NodeType::Incomplete)
        );
    }

    #[test]
    fn reduce_drops_unreachable() {
        let mut at = ActionTable::new();
        let mut lts = Lts::stop();
        lts.zerocat(&Lts::stop(), "a", &mut at);
        // An unreachable island.
        let island = lts.push_node(NodeType::Normal);
        let b = at.insert("b");
        lts.update_alphabet(b);
        lts.add_edge(island, b, island);

        lts.reduce();
        assert_eq!(lts.num_states(), 2);
    }
}
