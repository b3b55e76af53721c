//! Execution graph construction and concurrent grouping.

mod builder;
mod groups;

pub use builder::{ExecutionGraph, ExecutionGraphBuilder};
pub use groups::ChainableGroups;
