// src/engine/queue.rs

use std::collections::VecDeque;

use tracing::debug;

use crate::dag::Binding;

/// Ordered queue of bindings waiting to be applied during one commit step.
///
/// Semantics:
/// - `append_unique` removes every earlier binding with the same display
///   name before appending, so the final position of a binding reflects its
///   *latest* registration.
/// - Otherwise FIFO: `drain_head` pops from the front.
///
/// With `A -> B, A -> C, B -> D, C -> D`, draining after A registers
/// `[B, C]` runs `B` (queue becomes `[C, D]`), then `C` (`D` is moved to the
/// tail again), then `D` once.
#[derive(Debug, Clone, Default)]
pub struct DependentsQueue {
    bindings: VecDeque<Binding>,
}

impl DependentsQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `binding`, dropping any earlier entry with the same display name.
    pub fn append_unique(&mut self, binding: Binding) {
        let name = binding.display_name();
        let before = self.bindings.len();
        self.bindings.retain(|b| b.display_name() != name);
        if self.bindings.len() != before {
            debug!(binding = %name, "dependent re-registered; moving to tail");
        }
        self.bindings.push_back(binding);
    }

    /// Remove and return the head binding.
    pub fn drain_head(&mut self) -> Option<Binding> {
        self.bindings.pop_front()
    }

    pub fn contains(&self, display_name: &str) -> bool {
        self.bindings.iter().any(|b| b.display_name() == display_name)
    }

    /// Display names in queue order, for tracing.
    pub fn peek_names(&self) -> Vec<String> {
        self.bindings.iter().map(Binding::display_name).collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(name: &str) -> Binding {
        Binding::new(name, None)
    }

    #[test]
    fn fifo_without_duplicates() {
        let mut q = DependentsQueue::new();
        q.append_unique(b("x"));
        q.append_unique(b("y"));
        assert_eq!(q.drain_head(), Some(b("x")));
        assert_eq!(q.drain_head(), Some(b("y")));
        assert_eq!(q.drain_head(), None);
    }

    #[test]
    fn re_append_moves_to_tail() {
        let mut q = DependentsQueue::new();
        q.append_unique(b("d"));
        q.append_unique(b("c"));
        q.append_unique(b("d"));
        assert_eq!(q.peek_names(), vec!["c", "d"]);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn tags_are_distinct_bindings() {
        let mut q = DependentsQueue::new();
        q.append_unique(Binding::new("firewall", Some("eth0")));
        q.append_unique(Binding::new("firewall", Some("eth1")));
        q.append_unique(Binding::new("firewall", Some("eth0")));
        assert_eq!(q.peek_names(), vec!["firewall_eth1", "firewall_eth0"]);
        assert!(q.contains("firewall_eth1"));
        assert!(!q.contains("firewall"));
    }
}
