//! Core domain models: research task nodes and the dependency graph that
//! orders them.

pub mod dag;
pub mod task;

pub use dag::TaskGraph;
pub use task::{
    ContextValue, FailureCause, NodeHook, NodeId, NodeState, ResolvedContext, ResolvedValue,
    TaskNode,
};
