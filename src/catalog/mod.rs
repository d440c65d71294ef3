//! Implementation catalog: which backends exist, in which order to try them.
//!
//! The catalog owns an ordered list of [`CatalogSource`]s. Enumeration is
//! lazy and restartable: every call to [`ImplCatalog::enumerate`] starts a
//! fresh walk, and a source is only consulted once the walk reaches it.
//!
//! Candidates come out grouped by kind (hardware, then software, then
//! pseudo). Within a kind, sources are visited by ascending priority, ties
//! broken by insertion order.
//!
//! ```rust,ignore
//! use mxdispatch::prelude::*;
//!
//! let mut catalog = ImplCatalog::new();
//! catalog.add_source(0, BuiltinSource::new("builtin").with(
//!     ImplDescriptor::builtin(pseudo::pseudo_module(), ImplKind::Pseudo),
//! ));
//! for candidate in catalog.enumerate(None, InterfaceFlags::empty()) {
//!     println!("{}", candidate.name());
//! }
//! ```

mod descriptor;
mod source;

pub use descriptor::{ImplDescriptor, Location};
pub use source::{BuiltinSource, CatalogSource, DirectorySource};

use crate::abi::{ImplKind, InterfaceFlags};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

struct Entry {
    priority: i32,
    source: Arc<dyn CatalogSource>,
}

/// Ordered collection of catalog sources.
pub struct ImplCatalog {
    entries: Vec<Entry>,
    snapshot: Arc<[Arc<dyn CatalogSource>]>,
}

impl ImplCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            snapshot: Arc::from(Vec::new()),
        }
    }

    /// Add a source. Lower `priority` values are consulted first.
    pub fn add_source(&mut self, priority: i32, source: impl CatalogSource + 'static) {
        self.add_shared(priority, Arc::new(source));
    }

    /// Add a source that is already shared.
    pub fn add_shared(&mut self, priority: i32, source: Arc<dyn CatalogSource>) {
        tracing::debug!(source = source.name(), priority, "added catalog source");
        // Insert after every entry with the same priority to keep
        // insertion order among equals.
        let pos = self.entries.partition_point(|e| e.priority <= priority);
        self.entries.insert(pos, Entry { priority, source });
        self.snapshot = self.entries.iter().map(|e| Arc::clone(&e.source)).collect();
    }

    /// Number of sources.
    pub fn source_count(&self) -> usize {
        self.entries.len()
    }

    /// Walk the candidates matching `kind` (`None` for any) and `interfaces`.
    ///
    /// The returned iterator holds a snapshot of the source list, so the
    /// catalog may be modified while it is in use.
    pub fn enumerate(&self, kind: Option<ImplKind>, interfaces: InterfaceFlags) -> Candidates {
        let kinds = match kind {
            Some(kind) => vec![kind],
            None => ImplKind::ALL.to_vec(),
        };
        Candidates {
            sources: Arc::clone(&self.snapshot),
            kinds: kinds.into(),
            next_source: 0,
            interfaces,
            pending: VecDeque::new(),
        }
    }
}

impl Default for ImplCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ImplCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (e.priority, e.source.name())))
            .finish()
    }
}

/// Lazy iterator over catalog candidates.
pub struct Candidates {
    sources: Arc<[Arc<dyn CatalogSource>]>,
    kinds: VecDeque<ImplKind>,
    next_source: usize,
    interfaces: InterfaceFlags,
    pending: VecDeque<ImplDescriptor>,
}

impl Iterator for Candidates {
    type Item = ImplDescriptor;

    fn next(&mut self) -> Option<ImplDescriptor> {
        loop {
            if let Some(candidate) = self.pending.pop_front() {
                return Some(candidate);
            }
            let kind = *self.kinds.front()?;
            match self.sources.get(self.next_source) {
                Some(source) => {
                    self.next_source += 1;
                    let interfaces = self.interfaces;
                    self.pending.extend(
                        source
                            .candidates(kind)
                            .into_iter()
                            .filter(|d| d.kind() == kind && d.matches_interfaces(interfaces)),
                    );
                }
                None => {
                    self.kinds.pop_front();
                    self.next_source = 0;
                }
            }
        }
    }
}

impl fmt::Debug for Candidates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidates")
            .field("kinds", &self.kinds)
            .field("next_source", &self.next_source)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StaticModule;

    fn desc(name: &str, kind: ImplKind) -> ImplDescriptor {
        ImplDescriptor::builtin(StaticModule::new(name), kind)
    }

    fn names(candidates: Candidates) -> Vec<String> {
        candidates.map(|d| d.name().to_string()).collect()
    }

    #[test]
    fn test_kind_order_then_priority() {
        let mut catalog = ImplCatalog::new();
        catalog.add_source(
            10,
            BuiltinSource::new("late")
                .with(desc("sw-late", ImplKind::Software))
                .with(desc("hw-late", ImplKind::Hardware)),
        );
        catalog.add_source(
            0,
            BuiltinSource::new("early")
                .with(desc("pseudo", ImplKind::Pseudo))
                .with(desc("sw-early", ImplKind::Software)),
        );

        assert_eq!(
            names(catalog.enumerate(None, InterfaceFlags::empty())),
            ["hw-late", "sw-early", "sw-late", "pseudo"]
        );
        assert_eq!(
            names(catalog.enumerate(Some(ImplKind::Software), InterfaceFlags::empty())),
            ["sw-early", "sw-late"]
        );
    }

    #[test]
    fn test_equal_priority_keeps_insertion_order() {
        let mut catalog = ImplCatalog::new();
        catalog.add_source(5, BuiltinSource::new("a").with(desc("a", ImplKind::Software)));
        catalog.add_source(5, BuiltinSource::new("b").with(desc("b", ImplKind::Software)));
        catalog.add_source(1, BuiltinSource::new("c").with(desc("c", ImplKind::Software)));
        assert_eq!(names(catalog.enumerate(None, InterfaceFlags::empty())), ["c", "a", "b"]);
    }

    #[test]
    fn test_interface_filter() {
        let mut catalog = ImplCatalog::new();
        catalog.add_source(
            0,
            BuiltinSource::new("gpu")
                .with(desc("va", ImplKind::Hardware).with_interfaces(InterfaceFlags::VAAPI))
                .with(desc("dx", ImplKind::Hardware).with_interfaces(InterfaceFlags::D3D11))
                .with(desc("unknown", ImplKind::Hardware)),
        );
        assert_eq!(
            names(catalog.enumerate(None, InterfaceFlags::VAAPI)),
            ["va", "unknown"]
        );
    }

    #[test]
    fn test_empty_and_restartable() {
        let catalog = ImplCatalog::new();
        assert_eq!(catalog.enumerate(None, InterfaceFlags::empty()).count(), 0);

        let mut catalog = ImplCatalog::new();
        catalog.add_source(0, BuiltinSource::new("one").with(desc("x", ImplKind::Pseudo)));
        let first = names(catalog.enumerate(None, InterfaceFlags::empty()));
        let second = names(catalog.enumerate(None, InterfaceFlags::empty()));
        assert_eq!(first, second);
    }

    #[test]
    fn test_snapshot_survives_modification() {
        let mut catalog = ImplCatalog::new();
        catalog.add_source(0, BuiltinSource::new("one").with(desc("x", ImplKind::Pseudo)));
        let walk = catalog.enumerate(None, InterfaceFlags::empty());
        catalog.add_source(0, BuiltinSource::new("two").with(desc("y", ImplKind::Pseudo)));
        assert_eq!(names(walk), ["x"]);
        assert_eq!(catalog.source_count(), 2);
    }
}
