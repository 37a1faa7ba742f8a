// src/dag/scheduler.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::dag::binding::{Binding, Owner, SubsystemContext};
use crate::engine::queue::DependentsQueue;
use crate::errors::{ConfdepError, Result};
use crate::manifest::DependencyMap;
use crate::types::SubsystemName;

/// Scheduler holds the immutable dependency map plus the mutable pending
/// dependents of the current commit.
///
/// It is responsible for:
/// - resolving `(caller, case)` to an ordered target list
/// - turning targets into bindings and appending them to the right queue
/// - handing out the next binding to run for a drain
///
/// Queues are keyed per drain root when owned by [`Owner::Local`]; the
/// [`Owner::Daemon`] queue is a single queue shared by every caller.
#[derive(Debug)]
pub struct Scheduler {
    graph: Arc<DependencyMap>,
    local: BTreeMap<String, DependentsQueue>,
    daemon: DependentsQueue,
}

impl Scheduler {
    pub fn new(graph: Arc<DependencyMap>) -> Self {
        Self {
            graph,
            local: BTreeMap::new(),
            daemon: DependentsQueue::new(),
        }
    }

    /// Ordered target list for `(caller, case)`.
    pub fn resolve(&self, caller: &str, case: &str) -> Result<&[SubsystemName]> {
        self.graph
            .targets(caller, case)
            .ok_or_else(|| ConfdepError::UnknownDependencyCase {
                caller: caller.to_string(),
                case: case.to_string(),
            })
    }

    /// Register the dependents of `ctx.name` for `case` in the queue selected
    /// by `ctx.owner` / `ctx.root`.
    ///
    /// Returns the queue contents afterwards, for tracing.
    pub fn set_dependents(
        &mut self,
        ctx: &SubsystemContext,
        case: &str,
        tag: Option<&str>,
    ) -> Result<Vec<String>> {
        self.register(ctx.owner, &ctx.root, &ctx.name, case, tag)
    }

    /// Lower-level form of [`Scheduler::set_dependents`] used when the caller
    /// is not running in this process (daemon side).
    pub fn register(
        &mut self,
        owner: Owner,
        root: &str,
        caller: &str,
        case: &str,
        tag: Option<&str>,
    ) -> Result<Vec<String>> {
        let bindings: Vec<Binding> = self
            .resolve(caller, case)?
            .iter()
            .map(|target| Binding::new(target.as_str(), tag))
            .collect();

        let queue = self.queue_mut(owner, root);
        for binding in bindings {
            queue.append_unique(binding);
        }
        let names = queue.peek_names();

        debug!(
            caller = %caller,
            case = %case,
            %owner,
            dependents = ?names,
            "set_dependents"
        );
        Ok(names)
    }

    /// Pop the head of the queue for `(owner, root)`.
    pub fn next_dependent(&mut self, owner: Owner, root: &str) -> Option<Binding> {
        let next = match owner {
            Owner::Local => self.local.get_mut(root).and_then(DependentsQueue::drain_head),
            Owner::Daemon => self.daemon.drain_head(),
        };
        trace!(%owner, root = %root, next = ?next.as_ref().map(Binding::display_name), "next dependent");
        next
    }

    /// Pending display names for `(owner, root)`.
    pub fn pending_names(&self, owner: Owner, root: &str) -> Vec<String> {
        match owner {
            Owner::Local => self
                .local
                .get(root)
                .map(DependentsQueue::peek_names)
                .unwrap_or_default(),
            Owner::Daemon => self.daemon.peek_names(),
        }
    }

    /// Whether nothing is pending anywhere.
    pub fn is_empty(&self) -> bool {
        self.daemon.is_empty() && self.local.values().all(DependentsQueue::is_empty)
    }

    /// Drop everything pending for `(owner, root)`.
    pub fn discard(&mut self, owner: Owner, root: &str) {
        match owner {
            Owner::Local => {
                self.local.remove(root);
            }
            Owner::Daemon => self.daemon.clear(),
        }
    }

    fn queue_mut(&mut self, owner: Owner, root: &str) -> &mut DependentsQueue {
        match owner {
            Owner::Local => self.local.entry(root.to_string()).or_default(),
            Owner::Daemon => &mut self.daemon,
        }
    }
}
