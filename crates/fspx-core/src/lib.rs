//! Core data structures for FSPX.
//!
//! This crate holds the value types shared by the translator and the LTS
//! engine:
//! - [`ActionTable`]: interning of action labels to dense integer ids
//! - [`LabelSet`]: ordered label sets with dot/bracket combination
//! - [`symbols`]: typed identifier values and named symbol stores
//! - [`Context`]: bound-variable environments threaded through translation

mod actions;
mod context;
mod sets;
pub mod symbols;

pub use actions::{ActionId, ActionTable, TAU};
pub use context::Context;
pub use sets::LabelSet;
pub use symbols::{
    ActionSet, HidingSpec, PrioritySpec, ProgressSpec, RangeValue, RelabelingSpec, SymbolTable,
    Value,
};
