//! Behavioral analyses: deadlock detection, terminal-set discovery, progress
//! checking, determinism and loop-free trace enumeration.
//!
//! Reports render into a `String`; the analyses return finding counts and
//! never abort a compilation.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write;

use fspx_core::{ActionId, ActionTable, ProgressSpec};

use crate::graph::{Lts, NodeType};

/// A terminal set: a strongly connected component with no transitions
/// leaving it, the basis of progress analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalSet {
    /// Shortest-spine action trace from node 0 to the component root.
    pub trace: Vec<ActionId>,
    /// Actions appearing on the component's internal edges.
    pub actions: BTreeSet<ActionId>,
}

impl Lts {
    /// True when no node has two edges carrying the same action towards
    /// different destinations.
    pub fn is_deterministic(&self) -> bool {
        for node in &self.nodes {
            let mut links: HashMap<ActionId, u32> = HashMap::new();
            for edge in &node.edges {
                if let Some(&dest) = links.get(&edge.action) {
                    if dest != edge.dest {
                        return false;
                    }
                } else {
                    links.insert(edge.action, edge.dest);
                }
            }
        }
        true
    }

    /// BFS deadlock analysis. A state without outgoing transitions is a
    /// deadlock (Normal type) or a property violation (Error type); End
    /// states terminate successfully. One finding with the shortest action
    /// trace is written per such state; returns the finding count.
    pub fn deadlock_analysis(&self, at: &ActionTable, out: &mut String) -> usize {
        self.deadlock_analysis_fmt(at, out)
            .expect("String write never fails")
    }

    fn deadlock_analysis_fmt(
        &self,
        at: &ActionTable,
        out: &mut String,
    ) -> Result<usize, std::fmt::Error> {
        let n = self.nodes.len();
        if n == 0 {
            return Ok(0);
        }

        let mut seen = vec![false; n];
        let mut parent: Vec<Option<(u32, ActionId)>> = vec![None; n];
        let mut frontier = std::collections::VecDeque::new();
        let mut findings = 0;

        seen[0] = true;
        frontier.push_back(0u32);

        while let Some(state) = frontier.pop_front() {
            for edge in self.edges(state) {
                let dest = edge.dest as usize;
                if !seen[dest] {
                    seen[dest] = true;
                    parent[dest] = Some((state, edge.action));
                    frontier.push_back(edge.dest);
                }
            }

            if self.edges(state).is_empty() && self.node_type(state) != NodeType::End {
                let kind = if self.node_type(state) == NodeType::Normal {
                    "Deadlock"
                } else {
                    "Property violation"
                };
                writeln!(out, "{kind} found for process {}: state {state}", self.name)?;

                let mut trace = Vec::new();
                let mut cursor = state as usize;
                while let Some((prev, action)) = parent[cursor] {
                    trace.push(action);
                    cursor = prev as usize;
                }
                trace.reverse();

                write!(out, "\tTrace to {kind}: ")?;
                for action in &trace {
                    write!(out, "{}->", at.name(*action))?;
                }
                writeln!(out, "\n")?;
                findings += 1;
            }
        }

        Ok(findings)
    }

    /// Discovers the terminal sets (cached after the first call) and returns
    /// them. Uses an iterative Tarjan SCC computation carrying a parallel
    /// stack of the actions taken along the DFS spine, so that each terminal
    /// component comes with the trace from node 0 to its root.
    pub fn terminal_sets(&mut self) -> &[TerminalSet] {
        if self.terminal_sets.is_none() {
            self.terminal_sets = Some(self.compute_terminal_sets());
        }
        self.terminal_sets.as_deref().unwrap_or(&[])
    }

    fn compute_terminal_sets(&self) -> Vec<TerminalSet> {
        let n = self.nodes.len();
        let mut found = Vec::new();
        if n == 0 {
            return found;
        }

        // DFS spine with parallel action and backpointer stacks.
        let mut state_stack = vec![0u32; n];
        let mut action_stack = vec![0 as ActionId; n];
        let mut back = vec![0usize; n];
        let mut entered = vec![false; n];
        let mut next_child = vec![0usize; n];
        let mut top: isize = 0;

        // Tarjan bookkeeping.
        let mut index = vec![0u32; n];
        let mut lowlink = vec![0u32; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<u32> = Vec::new();
        let mut counter: u32 = 0;

        state_stack[0] = 0;

        while top != -1 {
            let state = state_stack[top as usize] as usize;

            if !entered[state] {
                index[state] = counter;
                lowlink[state] = counter;
                counter += 1;
                stack.push(state as u32);
                on_stack[state] = true;
                entered[state] = true;
            }

            if next_child[state] == self.nodes[state].edges.len() {
                // All children examined: fold their contributions into the
                // lowlink and detect a component root.
                for edge in &self.nodes[state].edges {
                    let child = edge.dest as usize;
                    if index[child] > index[state] {
                        lowlink[state] = lowlink[state].min(lowlink[child]);
                    } else if on_stack[child] {
                        lowlink[state] = lowlink[state].min(index[child]);
                    }
                }

                if index[state] == lowlink[state] {
                    let mut component = Vec::new();
                    loop {
                        let s = stack.pop().expect("tarjan stack underflow");
                        on_stack[s as usize] = false;
                        component.push(s);
                        if s as usize == state {
                            break;
                        }
                    }

                    let members: HashSet<u32> = component.iter().copied().collect();
                    let mut actions = BTreeSet::new();
                    let mut terminal = true;
                    'check: for &s in &component {
                        for edge in &self.nodes[s as usize].edges {
                            if !members.contains(&edge.dest) {
                                terminal = false;
                                break 'check;
                            }
                            actions.insert(edge.action);
                        }
                    }

                    if terminal {
                        let mut trace = Vec::new();
                        let mut t = top as usize;
                        while t != 0 {
                            trace.push(action_stack[t]);
                            t = back[t];
                        }
                        trace.reverse();
                        found.push(TerminalSet { trace, actions });
                    }
                }

                top -= 1;
            } else {
                let edge = self.nodes[state].edges[next_child[state]];
                next_child[state] += 1;
                if !entered[edge.dest as usize] {
                    top += 1;
                    state_stack[top as usize] = edge.dest;
                    action_stack[top as usize] = edge.action;
                    back[top as usize] = (top - 1) as usize;
                }
            }
        }

        found
    }

    /// Checks a named progress property against the terminal sets: a
    /// violation is a terminal set where the property set is dead (and, for
    /// the conditional form, the condition set is live). Writes one report
    /// per violation and returns the violation count.
    pub fn progress(
        &mut self,
        progress_name: &str,
        pr: &ProgressSpec,
        at: &ActionTable,
        out: &mut String,
    ) -> usize {
        self.terminal_sets();
        let name = self.name.clone();
        let sets = self.terminal_sets.as_deref().unwrap_or(&[]);
        let mut violations = 0;

        for ts in sets {
            let violation = match &pr.condition {
                Some(condition) => {
                    condition.intersects(&ts.actions) && !pr.set.intersects(&ts.actions)
                }
                None => !pr.set.intersects(&ts.actions),
            };
            if !violation {
                continue;
            }
            violations += 1;

            let _ = writeln!(
                out,
                "Progress violation detected for process {name} and progress property {progress_name}:"
            );
            let _ = write!(out, "\tTrace to violation: ");
            for action in &ts.trace {
                let _ = write!(out, "{}-> ", at.name(*action));
            }
            let _ = writeln!(out);
            let _ = write!(out, "\tActions in terminal set: {{");
            for (i, action) in ts.actions.iter().enumerate() {
                if i > 0 {
                    let _ = write!(out, ", ");
                }
                let _ = write!(out, "{}", at.name(*action));
            }
            let _ = writeln!(out, "}}\n");
        }

        violations
    }

    /// Streams every loop-free trace from node 0. A `(src, action, dst)`
    /// triple already on the current path marks a cycle: the trace collected
    /// so far is emitted and the walk backtracks.
    pub fn traces(&self, at: &ActionTable, out: &mut String) {
        let mut marked: HashSet<(u32, ActionId, u32)> = HashSet::new();
        let mut trace: Vec<ActionId> = Vec::new();
        if self.nodes.is_empty() {
            return;
        }
        self.traces_walk(0, at, &mut marked, &mut trace, out);
    }

    fn traces_walk(
        &self,
        state: u32,
        at: &ActionTable,
        marked: &mut HashSet<(u32, ActionId, u32)>,
        trace: &mut Vec<ActionId>,
        out: &mut String,
    ) {
        for edge in self.edges(state) {
            let key = (state, edge.action, edge.dest);
            if !marked.insert(key) {
                let _ = write!(out, "{{ ");
                for action in trace.iter() {
                    let _ = write!(out, "{} ", at.name(*action));
                }
                let _ = writeln!(out, "}}");
            } else {
                trace.push(edge.action);
                self.traces_walk(edge.dest, at, marked, trace, out);
                marked.remove(&key);
                trace.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fspx_core::ActionSet;

    fn table() -> ActionTable {
        ActionTable::new()
    }

    /// `a -> b -> STOP`.
    fn linear_stop(at: &mut ActionTable) -> Lts {
        let mut lts = Lts::stop();
        let a = at.insert("a");
        let b = at.insert("b");
        let s1 = lts.push_node(NodeType::Normal);
        let s2 = lts.push_node(NodeType::Normal);
        lts.add_edge(0, a, s1);
        lts.add_edge(s1, b, s2);
        lts.update_alphabet(a);
        lts.update_alphabet(b);
        lts
    }

    /// `a -> b -> back to start`.
    fn cycle(at: &mut ActionTable) -> Lts {
        let mut lts = Lts::stop();
        let a = at.insert("a");
        let b = at.insert("b");
        let s1 = lts.push_node(NodeType::Normal);
        lts.add_edge(0, a, s1);
        lts.add_edge(s1, b, 0);
        lts.update_alphabet(a);
        lts.update_alphabet(b);
        lts
    }

    #[test]
    fn deadlock_found_with_shortest_trace() {
        let mut at = table();
        let lts = linear_stop(&mut at);
        let mut out = String::new();
        assert_eq!(lts.deadlock_analysis(&at, &mut out), 1);
        assert!(out.contains("Deadlock"));
        assert!(out.contains("a->b->"));
    }

    #[test]
    fn end_state_is_not_a_deadlock() {
        let mut at = table();
        let mut lts = Lts::stop();
        lts.zerocat(&Lts::end(), "a", &mut at);
        let mut out = String::new();
        assert_eq!(lts.deadlock_analysis(&at, &mut out), 0);
    }

    #[test]
    fn error_state_reported_as_property_violation() {
        let mut at = table();
        let a = at.insert("a");
        let mut lts = Lts::stop();
        let e = lts.push_node(NodeType::Error);
        lts.add_edge(0, a, e);
        lts.update_alphabet(a);
        let mut out = String::new();
        assert_eq!(lts.deadlock_analysis(&at, &mut out), 1);
        assert!(out.contains("Property violation"));
    }

    #[test]
    fn cycle_is_a_terminal_set() {
        let mut at = table();
        let mut lts = cycle(&mut at);
        let sets = lts.terminal_sets();
        assert_eq!(sets.len(), 1);
        let expected: BTreeSet<ActionId> =
            [at.lookup("a").unwrap(), at.lookup("b").unwrap()].into();
        assert_eq!(sets[0].actions, expected);
        assert!(sets[0].trace.len() <= 2);
    }

    #[test]
    fn stuck_state_is_a_terminal_set_without_actions() {
        let mut at = table();
        let mut lts = linear_stop(&mut at);
        let sets = lts.terminal_sets().to_vec();
        assert_eq!(sets.len(), 1);
        assert!(sets[0].actions.is_empty());
        assert_eq!(sets[0].trace.len(), 2);
    }

    #[test]
    fn escaping_component_is_not_terminal() {
        let mut at = table();
        // 0 <-> 1 cycle with an escape 1 -> 2 (stuck).
        let a = at.insert("a");
        let b = at.insert("b");
        let c = at.insert("c");
        let mut lts = Lts::stop();
        let s1 = lts.push_node(NodeType::Normal);
        let s2 = lts.push_node(NodeType::Normal);
        lts.add_edge(0, a, s1);
        lts.add_edge(s1, b, 0);
        lts.add_edge(s1, c, s2);
        for id in [a, b, c] {
            lts.update_alphabet(id);
        }
        let sets = lts.terminal_sets();
        // Only the stuck state is terminal; the cycle can escape.
        assert_eq!(sets.len(), 1);
        assert!(sets[0].actions.is_empty());
    }

    #[test]
    fn progress_holds_when_action_is_live() {
        let mut at = table();
        let mut lts = cycle(&mut at);
        let mut set = ActionSet::new();
        set.add(at.lookup("a").unwrap());
        let pr = ProgressSpec {
            condition: None,
            set,
        };
        let mut out = String::new();
        assert_eq!(lts.progress("X", &pr, &at, &mut out), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn progress_violated_when_action_is_dead() {
        let mut at = table();
        let mut lts = cycle(&mut at);
        let c = at.insert("c");
        let mut set = ActionSet::new();
        set.add(c);
        let pr = ProgressSpec {
            condition: None,
            set,
        };
        let mut out = String::new();
        assert_eq!(lts.progress("Y", &pr, &at, &mut out), 1);
        assert!(out.contains("Progress violation"));
    }

    #[test]
    fn conditional_progress_requires_live_condition() {
        let mut at = table();
        let mut lts = cycle(&mut at);
        let c = at.insert("c");
        let d = at.insert("d");

        // Condition dead: no violation even though the set is dead too.
        let mut condition = ActionSet::new();
        condition.add(c);
        let mut set = ActionSet::new();
        set.add(d);
        let pr = ProgressSpec {
            condition: Some(condition),
            set,
        };
        let mut out = String::new();
        assert_eq!(lts.progress("Z", &pr, &at, &mut out), 0);

        // Condition live, set dead: violation.
        let mut condition = ActionSet::new();
        condition.add(at.lookup("a").unwrap());
        let mut set = ActionSet::new();
        set.add(d);
        let pr = ProgressSpec {
            condition: Some(condition),
            set,
        };
        assert_eq!(lts.progress("Z", &pr, &at, &mut out), 1);
    }

    #[test]
    fn determinism_allows_distinct_actions() {
        let mut at = table();
        let lts = linear_stop(&mut at);
        assert!(lts.is_deterministic());
    }

    #[test]
    fn duplicate_action_different_dest_is_nondeterministic() {
        let mut at = table();
        let a = at.insert("a");
        let mut lts = Lts::stop();
        let s1 = lts.push_node(NodeType::Normal);
        let s2 = lts.push_node(NodeType::Normal);
        lts.add_edge(0, a, s1);
        lts.add_edge(0, a, s2);
        lts.update_alphabet(a);
        assert!(!lts.is_deterministic());
    }

    #[test]
    fn traces_emits_loops_once() {
        let mut at = table();
        let lts = cycle(&mut at);
        let mut out = String::new();
        lts.traces(&at, &mut out);
        assert!(out.contains("a b"));
    }
}
