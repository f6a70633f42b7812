//! Textual, GraphViz and FSP re-emission of an LTS.

use std::collections::VecDeque;
use std::fmt::Write;

use fspx_core::ActionTable;

use crate::graph::{Lts, NodeType};

/// Rewrites every `.N` tail (dot followed by digits) into `[N]` so that the
/// re-emitted definition parses back. Labels that already mix dotted-digit
/// and bracket-digit tails are ambiguous under this transform; the output
/// keeps whatever the input meant.
fn square_ints(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut number = false;
    let mut j = 0;

    while j < bytes.len() {
        if number && !bytes[j].is_ascii_digit() {
            number = false;
            out.push(']');
        }
        if bytes[j] == b'.' && j + 1 < bytes.len() && bytes[j + 1].is_ascii_digit() {
            number = true;
            out.push('[');
            j += 1;
        }
        out.push(bytes[j] as char);
        j += 1;
    }
    if number {
        out.push(']');
    }
    out
}

impl Lts {
    /// BFS over the reachable states, calling `f` once per state in visit
    /// order.
    pub fn visit(&self, mut f: impl FnMut(u32, &Lts)) {
        let n = self.num_states();
        if n == 0 {
            return;
        }
        let mut seen = vec![false; n];
        let mut frontier = VecDeque::new();
        seen[0] = true;
        frontier.push_back(0u32);

        while let Some(state) = frontier.pop_front() {
            f(state, self);
            for edge in self.edges(state) {
                if !seen[edge.dest as usize] {
                    seen[edge.dest as usize] = true;
                    frontier.push_back(edge.dest);
                }
            }
        }
    }

    /// Human-readable description: states, transitions, alphabet.
    pub fn describe(&self, at: &ActionTable, out: &mut String) {
        let _ = writeln!(out, "LTS {}", self.name);
        for i in 0..self.num_states() as u32 {
            let _ = writeln!(out, "State {i} ({:?}):", self.node_type(i));
            for edge in self.edges(i) {
                let _ = writeln!(out, "    {} --> {}", at.name(edge.action), edge.dest);
            }
        }
        let _ = write!(out, "Alphabet: {{");
        for (i, &id) in self.alphabet().iter().enumerate() {
            if i > 0 {
                let _ = write!(out, ", ");
            }
            let _ = write!(out, "{}", at.name(id));
        }
        let _ = writeln!(out, "}}");
        let _ = writeln!(
            out,
            "{} states, {} transitions",
            self.num_states(),
            self.num_transitions()
        );
    }

    /// GraphViz digraph of the LTS.
    pub fn graphviz(&self, at: &ActionTable) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph G {{");
        let _ = writeln!(out, "rankdir = LR;");
        for i in 0..self.num_states() as u32 {
            let color = match self.node_type(i) {
                NodeType::Normal => "pink",
                NodeType::End => "blue",
                NodeType::Error => "red",
                _ => "green",
            };
            let _ = writeln!(out, "{i} [shape=circle,style=filled, fillcolor={color}];");
        }
        for i in 0..self.num_states() as u32 {
            for edge in self.edges(i) {
                let _ = writeln!(
                    out,
                    "{i} -> {} [label = \"{}\"];",
                    edge.dest,
                    at.name(edge.action)
                );
            }
        }
        let _ = writeln!(out, "}}");
        out
    }

    /// Re-emits the LTS as a basic FSP process definition (one local process
    /// per state) that parses back into an equivalent graph.
    pub fn basic(&self, at: &ActionTable) -> String {
        let mut out = String::new();
        let _ = write!(out, "{} = S0", self.name);
        self.visit(|state, lts| {
            let _ = write!(out, ",\nS{state} = ");
            let edges = lts.edges(state);
            if edges.is_empty() {
                match lts.node_type(state) {
                    NodeType::Error => {
                        let _ = write!(out, "ERROR");
                    }
                    NodeType::End => {
                        let _ = write!(out, "END");
                    }
                    _ => {
                        let _ = write!(out, "STOP");
                    }
                }
            } else {
                let _ = write!(out, "(");
                for (i, edge) in edges.iter().enumerate() {
                    if i > 0 {
                        let _ = write!(out, "\n  | ");
                    }
                    let _ = write!(
                        out,
                        "{} -> S{}",
                        square_ints(at.name(edge.action)),
                        edge.dest
                    );
                }
                let _ = write!(out, ")");
            }
        });
        out.push_str(".\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_ints_rewrites_dotted_numbers() {
        assert_eq!(square_ints("a.1"), "a[1]");
        assert_eq!(square_ints("a.12.b"), "a[12].b");
        assert_eq!(square_ints("a.x"), "a.x");
        assert_eq!(square_ints("buf.0.put"), "buf[0].put");
        assert_eq!(square_ints("a"), "a");
    }

    #[test]
    fn basic_emits_parseable_shape() {
        let mut at = ActionTable::new();
        let mut lts = Lts::stop();
        lts.zerocat(&Lts::end(), "a", &mut at);
        lts.name = "P".to_owned();

        let text = lts.basic(&at);
        assert!(text.starts_with("P = S0"));
        assert!(text.contains("S0 = (a -> S1)"));
        assert!(text.contains("S1 = END"));
        assert!(text.ends_with(".\n"));
    }
}
