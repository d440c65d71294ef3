//! Catalog sources: where candidates come from.

use super::descriptor::{ImplDescriptor, Location};
use crate::abi::{ImplKind, InterfaceFlags};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Produces backend candidates of a given kind.
///
/// Must be deterministic: the same environment yields the same candidates
/// in the same order.
pub trait CatalogSource: Send + Sync {
    /// Source name for logs.
    fn name(&self) -> &str;

    /// Candidates of `kind`, in this source's priority order.
    ///
    /// Called lazily, only once the catalog reaches this source.
    fn candidates(&self, kind: ImplKind) -> Vec<ImplDescriptor>;
}

/// Shared libraries of one kind found in a directory.
///
/// Files with the platform's library extension are offered in file-name
/// order. A missing or unreadable directory yields nothing.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    name: String,
    dir: PathBuf,
    kind: ImplKind,
    interfaces: InterfaceFlags,
}

impl DirectorySource {
    /// Offer every library in `dir` as a `kind` backend.
    ///
    /// # Safety
    ///
    /// Selected libraries are loaded and run. Every library in `dir` must be
    /// a trusted backend.
    pub unsafe fn new(dir: impl Into<PathBuf>, kind: ImplKind) -> Self {
        let dir = dir.into();
        Self {
            name: format!("{}:{}", kind, dir.display()),
            dir,
            kind,
            interfaces: InterfaceFlags::empty(),
        }
    }

    /// Declare the interfaces every backend in the directory supports.
    pub fn with_interfaces(mut self, interfaces: InterfaceFlags) -> Self {
        self.interfaces = interfaces;
        self
    }

    /// The scanned directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn scan(&self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %self.dir.display(), error = %e, "backend directory not readable");
                return Vec::new();
            }
        };
        let mut libraries: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension() == Some(OsStr::new(std::env::consts::DLL_EXTENSION))
            })
            .collect();
        libraries.sort();
        libraries
    }
}

impl CatalogSource for DirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn candidates(&self, kind: ImplKind) -> Vec<ImplDescriptor> {
        if kind != self.kind {
            return Vec::new();
        }
        self.scan()
            .into_iter()
            .map(|path| {
                let name = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                // SAFETY: `DirectorySource::new` made the caller vouch for
                // every library in the directory.
                let location = unsafe { Location::library(path) };
                ImplDescriptor::new(name, location, self.kind).with_interfaces(self.interfaces)
            })
            .collect()
    }
}

/// A fixed list of descriptors, typically in-process backends.
#[derive(Debug, Clone, Default)]
pub struct BuiltinSource {
    name: String,
    descriptors: Vec<ImplDescriptor>,
}

impl BuiltinSource {
    /// An empty source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptors: Vec::new(),
        }
    }

    /// Append a descriptor; earlier descriptors are offered first.
    pub fn with(mut self, descriptor: ImplDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the source is empty.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl CatalogSource for BuiltinSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn candidates(&self, kind: ImplKind) -> Vec<ImplDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| d.kind() == kind)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StaticModule;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_directory_scan_is_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        let ext = std::env::consts::DLL_EXTENSION;
        touch(tmp.path(), &format!("mx_b.{ext}"));
        touch(tmp.path(), &format!("mx_a.{ext}"));
        touch(tmp.path(), "README.txt");
        std::fs::create_dir(tmp.path().join(format!("subdir.{ext}"))).unwrap();

        let source = unsafe { DirectorySource::new(tmp.path(), ImplKind::Hardware) }
            .with_interfaces(InterfaceFlags::VAAPI);
        let names: Vec<_> = source
            .candidates(ImplKind::Hardware)
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, ["mx_a", "mx_b"]);
        assert!(source.candidates(ImplKind::Software).is_empty());

        let first = &source.candidates(ImplKind::Hardware)[0];
        assert_eq!(first.interfaces(), InterfaceFlags::VAAPI);
        assert!(first.location().path().is_some());
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let source = unsafe { DirectorySource::new("/nonexistent/mxdispatch", ImplKind::Software) };
        assert!(source.candidates(ImplKind::Software).is_empty());
    }

    #[test]
    fn test_builtin_filters_by_kind() {
        let source = BuiltinSource::new("builtin")
            .with(ImplDescriptor::builtin(StaticModule::new("hw"), ImplKind::Hardware))
            .with(ImplDescriptor::builtin(StaticModule::new("sw1"), ImplKind::Software))
            .with(ImplDescriptor::builtin(StaticModule::new("sw2"), ImplKind::Software));

        let names: Vec<_> = source
            .candidates(ImplKind::Software)
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, ["sw1", "sw2"]);
        assert_eq!(source.len(), 3);
    }
}
