//! Labelled transition systems for FSPX.
//!
//! The [`Lts`] type is an index-based directed multigraph: nodes own ordered
//! edge lists, node types and translator scratch aliases live in a parallel
//! info table, and the explicit alphabet is a set of interned action ids.
//! The modules layer the engine:
//!
//! - `graph` — the store and the incremental construction primitives
//! - `compose` — parallel composition (operational and declarative)
//! - `rewrite` — labeling, sharing, relabeling, hiding, priority, property
//! - `resolve` — placeholder name groups and the resolution pass
//! - `analysis` — deadlock, terminal sets, progress, traces
//! - `minimize` — weak-bisimulation minimization and tau-chain collapse
//! - `codec` — binary persistence of compiled images
//! - `dump` — textual, GraphViz and FSP re-emission

mod analysis;
mod codec;
mod compose;
mod dump;
mod graph;
mod minimize;
mod resolve;
mod rewrite;

pub use analysis::TerminalSet;
pub use codec::{CodecError, CompiledImage};
pub use compose::ComposeAlgorithm;
pub use graph::{Edge, Lts, Node, NodeType};
pub use resolve::UnresolvedNames;
