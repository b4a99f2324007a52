//! Bounded worker slots for concurrently running nodes.
//!
//! The executor takes a slot before dispatching a node to its agent and
//! gives it back when the agent call finishes, so at most `max_concurrent`
//! agent calls are ever in flight.

use std::collections::HashSet;

use crate::core::NodeId;
use crate::{Error, Result};

#[derive(Debug)]
pub struct WorkerPool {
    active: HashSet<NodeId>,
    max_concurrent: usize,
}

impl WorkerPool {
    /// A pool with `max_concurrent` slots. Zero is raised to one.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            active: HashSet::new(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Take a slot for `node`.
    ///
    /// # Errors
    ///
    /// `Error::WorkerPoolFull` when every slot is taken, or
    /// `Error::Validation` when the node already holds one.
    pub fn acquire(&mut self, node: NodeId) -> Result<()> {
        if !self.has_capacity() {
            return Err(Error::WorkerPoolFull {
                max: self.max_concurrent,
            });
        }
        if !self.active.insert(node) {
            return Err(Error::Validation(format!(
                "node {} is already running",
                node.short()
            )));
        }
        Ok(())
    }

    /// Return the slot held by `node`. False if it held none.
    pub fn release(&mut self, node: &NodeId) -> bool {
        self.active.remove(node)
    }

    pub fn is_active(&self, node: &NodeId) -> bool {
        self.active.contains(node)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn available(&self) -> usize {
        self.max_concurrent - self.active.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.active_count() < self.max_concurrent
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
