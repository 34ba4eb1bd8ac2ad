//! OSDF Path - candidate path enumeration and selection
//!
//! [`TopologyGraph`] answers "which shortest paths connect these two
//! devices", [`PathSelector`] picks one of them for a policy.

#![warn(missing_docs)]

pub mod selector;
pub mod topology;

pub use selector::{PathSelector, SelectedPath, SelectionOutcome, SelectorStats};
pub use topology::TopologyGraph;
