//! Integration tests for backend discovery: directory sources, config,
//! fallback past candidates that fail to load.

mod common;

use common::*;
use mxdispatch::abi::{ImplKind, InterfaceFlags, PluginUid};
use mxdispatch::backend::pseudo;
use mxdispatch::catalog::{BuiltinSource, ImplDescriptor};
use mxdispatch::config::{DispatchConfig, ENV_DIR_PRIORITY, env_var};
use mxdispatch::context::DispatchContext;
use mxdispatch::error::Error;
use mxdispatch::session::{InitParams, Session, SessionState};
use mxdispatch::version::ApiVersion;
use std::path::Path;
use std::sync::Arc;

fn fake_library(dir: &Path, stem: &str) {
    let name = format!("{stem}.{}", std::env::consts::DLL_EXTENSION);
    std::fs::write(dir.join(name), b"not a library").unwrap();
}

fn names(context: &DispatchContext, kind: Option<ImplKind>) -> Vec<String> {
    context
        .enumerate(kind, InterfaceFlags::empty())
        .map(|d| d.name().to_string())
        .collect()
}

/// A context scanning `dir` for software backends, with the pseudo backend
/// behind it.
fn directory_context(dir: &Path) -> Arc<DispatchContext> {
    init_tracing();
    let config = DispatchConfig::default().with_backend_dir(dir, ImplKind::Software, 0);
    // SAFETY: the directory only holds files that fail to load.
    let context = unsafe { DispatchContext::from_config(config) };
    context.add_backend(
        100,
        ImplDescriptor::builtin(pseudo::pseudo_module(), ImplKind::Pseudo),
    );
    context
}

// ============================================================================
// Enumeration
// ============================================================================

#[test]
fn test_kinds_then_priority() {
    let context = DispatchContext::new();
    context.add_source(
        20,
        BuiltinSource::new("late")
            .with(ImplDescriptor::builtin(pseudo::pseudo_module(), ImplKind::Pseudo))
            .with(ImplDescriptor::builtin(
                pseudo::software_module().named("sw-late"),
                ImplKind::Software,
            )),
    );
    context.add_source(
        10,
        BuiltinSource::new("early").with(ImplDescriptor::builtin(
            pseudo::software_module().named("sw-early"),
            ImplKind::Software,
        )),
    );

    assert_eq!(names(&context, None), ["sw-early", "sw-late", "pseudo"]);
    assert_eq!(names(&context, Some(ImplKind::Pseudo)), ["pseudo"]);
    assert!(names(&context, Some(ImplKind::Hardware)).is_empty());

    // Every walk starts over.
    assert_eq!(names(&context, None), names(&context, None));
}

#[test]
fn test_declared_interfaces_filter_candidates() {
    let context = DispatchContext::new();
    context.add_backend(
        0,
        ImplDescriptor::builtin(pseudo::software_module().named("d3d"), ImplKind::Software)
            .with_interfaces(InterfaceFlags::D3D11),
    );
    context.add_backend(
        1,
        ImplDescriptor::builtin(pseudo::software_module().named("undeclared"), ImplKind::Software),
    );

    let vaapi: Vec<_> = context
        .enumerate(None, InterfaceFlags::VAAPI)
        .map(|d| d.name().to_string())
        .collect();
    assert_eq!(vaapi, ["undeclared"]);
    assert_eq!(names(&context, None), ["d3d", "undeclared"]);
}

#[test]
fn test_snapshot_survives_catalog_change() {
    let context = DispatchContext::with_pseudo_backend();
    let mut walk = context.enumerate(None, InterfaceFlags::empty());
    context.add_backend(
        0,
        ImplDescriptor::builtin(pseudo::software_module(), ImplKind::Software),
    );

    assert_eq!(walk.next().map(|d| d.name().to_string()), Some("pseudo".into()));
    assert!(walk.next().is_none());
    assert_eq!(names(&context, None), ["pseudo-software", "pseudo"]);
}

// ============================================================================
// Directory sources
// ============================================================================

#[test]
fn test_unloadable_library_is_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    fake_library(tmp.path(), "mx_broken");
    let context = directory_context(tmp.path());

    assert_eq!(names(&context, None), ["mx_broken", "pseudo"]);

    let session = Session::open(&context, InitParams::new(ApiVersion::new(2, 0))).unwrap();
    assert_eq!(session.backend_name(), Some("pseudo"));
    assert_eq!(session.kind(), Some(ImplKind::Pseudo));
}

#[test]
fn test_only_unloadable_candidates() {
    let tmp = tempfile::tempdir().unwrap();
    fake_library(tmp.path(), "mx_a");
    fake_library(tmp.path(), "mx_b");
    init_tracing();
    let config = DispatchConfig::default().with_backend_dir(tmp.path(), ImplKind::Software, 0);
    // SAFETY: the directory only holds files that fail to load.
    let context = unsafe { DispatchContext::from_config(config) };

    let mut session = Session::new(&context);
    let result = session.init(InitParams::new(ApiVersion::new(1, 0)));
    assert_eq!(
        result,
        Err(Error::NoMatchingImplementation {
            kind: None,
            version: ApiVersion::new(1, 0),
        })
    );
    assert_eq!(session.state(), SessionState::Uninitialized);
}

#[test]
fn test_missing_directory_contributes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let context = directory_context(&tmp.path().join("absent"));
    assert_eq!(names(&context, None), ["pseudo"]);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_environment_directories_first() {
    let tmp = tempfile::tempdir().unwrap();
    let value = tmp.path().as_os_str().to_owned();
    let config = DispatchConfig::from_lookup(|name| {
        (name == env_var(ImplKind::Hardware)).then(|| value.clone())
    });

    let hardware: Vec<_> = config
        .backend_dirs
        .iter()
        .filter(|d| d.kind == ImplKind::Hardware)
        .collect();
    let env = hardware
        .iter()
        .min_by_key(|d| d.priority)
        .expect("hardware directories");
    assert_eq!(env.priority, ENV_DIR_PRIORITY);
    assert_eq!(env.path, tmp.path());
}

#[test]
fn test_configured_plugins_are_registered() {
    let uid = PluginUid([0x5A; 16]);
    let config = DispatchConfig::default().with_plugin(uid, "/opt/mx/plugins/libmx_rot.so");
    // SAFETY: nothing is loaded unless the plugin is requested.
    let context = unsafe { DispatchContext::from_config(config) };

    let location = context.plugin_location(uid).unwrap();
    assert_eq!(
        location.path(),
        Some(Path::new("/opt/mx/plugins/libmx_rot.so"))
    );
    assert!(context.plugin_location(PluginUid([0x5B; 16])).is_none());
}
