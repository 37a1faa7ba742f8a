// src/dag/binding.rs

//! Callable bindings and the per-invocation subsystem context.

use std::fmt;

use crate::types::SubsystemName;

/// Which side owns the pending dependents of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Owner {
    /// The scheduler is driving the commit in-process.
    Local,
    /// The pending queue lives in a long-lived config daemon.
    Daemon,
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Local => f.write_str("local"),
            Owner::Daemon => f.write_str("daemon"),
        }
    }
}

/// A pending invocation: run `target`, optionally for one tag-node value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    pub target: SubsystemName,
    pub tag: Option<String>,
}

impl Binding {
    pub fn new(target: impl Into<SubsystemName>, tag: Option<&str>) -> Self {
        Self {
            target: target.into(),
            tag: tag.map(str::to_string),
        }
    }

    /// `target` or `target_<tag>`; the key used for deduplication.
    pub fn display_name(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{}_{}", self.target, tag),
            None => self.target.clone(),
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Everything a running pipeline knows about why it is running.
///
/// Passed explicitly into every stage; `set_dependents` uses `name` as the
/// caller and `owner` / `root` to pick the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemContext {
    /// Canonical name of the subsystem being run.
    pub name: SubsystemName,
    pub tag: Option<String>,
    pub owner: Owner,
    /// Display name of the top-level invocation whose drain this run belongs
    /// to. Local queues are keyed by it.
    pub root: String,
    /// `false` for the top-level invocation, `true` when an upstream
    /// subsystem registered this one.
    pub called_as_dependent: bool,
}

impl SubsystemContext {
    /// Context for a subsystem the user touched directly.
    pub fn top_level(binding: &Binding, owner: Owner) -> Self {
        Self {
            name: binding.target.clone(),
            tag: binding.tag.clone(),
            owner,
            root: binding.display_name(),
            called_as_dependent: false,
        }
    }

    /// Context for a dependent drained on behalf of `root`.
    pub fn dependent(binding: &Binding, root: &str, owner: Owner) -> Self {
        Self {
            name: binding.target.clone(),
            tag: binding.tag.clone(),
            owner,
            root: root.to_string(),
            called_as_dependent: true,
        }
    }

    pub fn binding(&self) -> Binding {
        Binding {
            target: self.name.clone(),
            tag: self.tag.clone(),
        }
    }

    pub fn display_name(&self) -> String {
        self.binding().display_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names() {
        assert_eq!(Binding::new("firewall", None).display_name(), "firewall");
        assert_eq!(
            Binding::new("firewall", Some("eth1")).display_name(),
            "firewall_eth1"
        );
    }

    #[test]
    fn dependent_context_keeps_root() {
        let root = SubsystemContext::top_level(&Binding::new("iface", Some("eth0")), Owner::Local);
        assert_eq!(root.root, "iface_eth0");
        assert!(!root.called_as_dependent);

        let dep = SubsystemContext::dependent(&Binding::new("firewall", None), &root.root, root.owner);
        assert_eq!(dep.root, "iface_eth0");
        assert!(dep.called_as_dependent);
        assert_eq!(dep.display_name(), "firewall");
    }
}
