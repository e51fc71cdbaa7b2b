//! Release actions attached to an iterator.

use std::fmt;

/// Ordered release actions owned by one iterator.
///
/// Actions run in reverse registration order, so a resource registered
/// later (and possibly depending on an earlier one) is released first.
/// Each action runs exactly once: [`run`](Self::run) drains the chain, and
/// dropping the chain runs whatever is left.
#[derive(Default)]
pub struct CleanupChain<'a> {
    actions: Vec<Box<dyn FnOnce() + 'a>>,
}

impl<'a> CleanupChain<'a> {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Append a release action.
    pub fn register<F>(&mut self, action: F)
    where
        F: FnOnce() + 'a,
    {
        self.actions.push(Box::new(action));
    }

    /// Number of actions not yet run.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if no actions are pending.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run all pending actions, most recently registered first.
    pub fn run(&mut self) {
        while let Some(action) = self.actions.pop() {
            action();
        }
    }
}

impl Drop for CleanupChain<'_> {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for CleanupChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupChain")
            .field("pending", &self.actions.len())
            .finish()
    }
}
