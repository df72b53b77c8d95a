use std::collections::HashMap;
use std::path::Path;

use bindscope_core::analyzer::{attempt_bind, Analyzer};
use bindscope_core::framework::{FrameworkKind, FrameworkVersion};
use bindscope_core::inspect::{InspectError, Inspector, InspectorPipeline};
use bindscope_core::model::{
    BinaryKind, ModuleData, ModuleVersion, Reference, ReferenceKind,
};
use tempfile::tempdir;

fn v(text: &str) -> ModuleVersion {
    text.parse().expect("version")
}

/// Serves canned records keyed by file name, in the fake-backend style used
/// for orchestration tests.
struct TableInspector {
    modules: HashMap<String, ModuleData>,
}

impl TableInspector {
    fn new(entries: Vec<(&str, ModuleData)>) -> Self {
        Self {
            modules: entries.into_iter().map(|(name, module)| (name.to_string(), module)).collect(),
        }
    }
}

impl Inspector for TableInspector {
    fn inspect(&self, file: &Path) -> Result<ModuleData, InspectError> {
        let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        match self.modules.get(name) {
            Some(module) => Ok(module.clone()),
            None => Ok(ModuleData::failure("unknown fixture")),
        }
    }

    fn name(&self) -> &'static str {
        "table"
    }
}

fn analyzer_for(entries: Vec<(&str, ModuleData)>) -> Analyzer {
    Analyzer::new(InspectorPipeline::new(vec![Box::new(TableInspector::new(entries))]))
}

fn managed_module(name: &str, version: &str, references: Vec<Reference>) -> ModuleData {
    ModuleData {
        binary_name: name.to_string(),
        version: Some(v(version)),
        binary_kind: BinaryKind::Managed,
        references,
        ..ModuleData::default()
    }
}

fn touch(dir: &Path, name: &str) {
    std::fs::write(dir.join(name), name.as_bytes()).unwrap();
}

fn edge_sums(graph: &bindscope_core::graph::Graph) -> (usize, usize) {
    (
        graph.iter().map(|node| node.outgoing).sum(),
        graph.iter().map(|node| node.incoming).sum(),
    )
}

#[test]
fn empty_directory_yields_empty_graph() {
    let dir = tempdir().expect("tempdir");
    let analyzer = analyzer_for(vec![]);
    let graph = analyzer.analyze_dir(dir.path(), None).expect("analyze");
    assert!(graph.is_empty());
}

#[test]
fn non_module_files_are_not_candidates() {
    let dir = tempdir().expect("tempdir");
    touch(dir.path(), "readme.txt");
    touch(dir.path(), "data.json");
    let analyzer = analyzer_for(vec![]);
    let graph = analyzer.analyze_dir(dir.path(), None).expect("analyze");
    assert!(graph.is_empty());
}

#[test]
fn file_without_references_is_a_single_isolated_node() {
    let dir = tempdir().expect("tempdir");
    touch(dir.path(), "solo.dll");
    let analyzer = analyzer_for(vec![("solo.dll", managed_module("Solo", "1.0", vec![]))]);
    let graph = analyzer.analyze_dir(dir.path(), None).expect("analyze");
    assert_eq!(graph.len(), 1);
    let node = graph.iter().next().unwrap();
    assert_eq!(node.incoming, 0);
    assert_eq!(node.outgoing, 0);
    assert_eq!(node.weight, 0.0);
    assert!(node.errors.is_empty());
}

#[test]
fn circular_references_resolve_to_two_nodes_and_two_edges() {
    let dir = tempdir().expect("tempdir");
    touch(dir.path(), "a.dll");
    touch(dir.path(), "b.dll");
    let analyzer = analyzer_for(vec![
        (
            "a.dll",
            managed_module("A", "1.0", vec![Reference::managed("B", Some(v("1.0")), None)]),
        ),
        (
            "b.dll",
            managed_module("B", "1.0", vec![Reference::managed("A", Some(v("1.0")), None)]),
        ),
    ]);
    let graph = analyzer.analyze_dir(dir.path(), None).expect("analyze");
    assert_eq!(graph.len(), 2);
    for node in graph.iter() {
        assert_eq!(node.incoming, 1);
        assert_eq!(node.outgoing, 1);
        assert!(!node.module.is_stub());
        assert!((node.weight - 3.0_f64.ln()).abs() < 1e-12);
    }
    let (outgoing, incoming) = edge_sums(&graph);
    assert_eq!(outgoing, incoming);
}

#[test]
fn unresolved_references_share_one_stub() {
    let dir = tempdir().expect("tempdir");
    touch(dir.path(), "a.dll");
    touch(dir.path(), "b.dll");
    let missing = || Reference::managed("Missing", Some(v("1.0")), None);
    let analyzer = analyzer_for(vec![
        ("a.dll", managed_module("A", "1.0", vec![missing()])),
        ("b.dll", managed_module("B", "1.0", vec![missing()])),
    ]);
    let graph = analyzer.analyze_dir(dir.path(), None).expect("analyze");
    assert_eq!(graph.len(), 3);

    let stubs: Vec<_> = graph.iter().filter(|node| node.module.is_stub()).collect();
    assert_eq!(stubs.len(), 1);
    let stub = stubs[0];
    assert_eq!(stub.module.binary_name, "Missing");
    assert_eq!(stub.module.version, Some(v("1.0")));
    assert_eq!(stub.module.binary_kind, BinaryKind::Managed);
    assert_eq!(stub.incoming, 2);
    assert_eq!(stub.outgoing, 0);

    let (outgoing, incoming) = edge_sums(&graph);
    assert_eq!(outgoing, incoming);
}

#[test]
fn binding_is_case_insensitive_on_name() {
    let dir = tempdir().expect("tempdir");
    touch(dir.path(), "app.dll");
    touch(dir.path(), "helpers.dll");
    let analyzer = analyzer_for(vec![
        (
            "app.dll",
            managed_module("App", "1.0", vec![Reference::managed("HELPERS", Some(v("1.0")), None)]),
        ),
        ("helpers.dll", managed_module("Helpers", "1.0", vec![])),
    ]);
    let graph = analyzer.analyze_dir(dir.path(), None).expect("analyze");
    assert_eq!(graph.len(), 2);
    assert_eq!(graph.iter().filter(|node| node.module.is_stub()).count(), 0);
}

#[test]
fn down_grade_binding_is_flagged_on_the_source_node() {
    let dir = tempdir().expect("tempdir");
    touch(dir.path(), "app.dll");
    touch(dir.path(), "lib.dll");
    let analyzer = analyzer_for(vec![
        (
            "app.dll",
            managed_module("App", "1.0", vec![Reference::managed("Lib", Some(v("2.0")), None)]),
        ),
        ("lib.dll", managed_module("Lib", "1.5", vec![])),
    ]);
    let graph = analyzer.analyze_dir(dir.path(), None).expect("analyze");
    assert_eq!(graph.len(), 2);

    let app = graph.iter().find(|node| node.module.binary_name == "App").unwrap();
    assert_eq!(app.errors.len(), 1);
    assert_eq!(app.errors[0], "down-grade: requested v2.0.0.0 but resolved v1.5.0.0");
}

#[test]
fn cross_framework_violation_names_the_target() {
    let dir = tempdir().expect("tempdir");
    touch(dir.path(), "app.dll");
    touch(dir.path(), "stdlib.dll");

    let mut app = managed_module("App", "1.0", vec![Reference::managed("StdLib", Some(v("1.0")), None)]);
    app.framework = FrameworkVersion::new(FrameworkKind::CoreApp, v("2.2"));
    let mut stdlib = managed_module("StdLib", "1.0", vec![]);
    stdlib.framework = FrameworkVersion::new(FrameworkKind::Standard, v("2.1"));

    let analyzer = analyzer_for(vec![("app.dll", app), ("stdlib.dll", stdlib)]);
    let graph = analyzer.analyze_dir(dir.path(), None).expect("analyze");

    let app = graph.iter().find(|node| node.module.binary_name == "App").unwrap();
    assert_eq!(app.errors.len(), 1);
    assert_eq!(app.errors[0], "cross-framework: StdLib v1.0.0.0 is a higher-level framework");
}

#[test]
fn codebase_hint_must_name_the_resolved_file() {
    let dir = tempdir().expect("tempdir");
    touch(dir.path(), "app.dll");
    touch(dir.path(), "Helpers.dll");

    let mut matching = Reference::managed("Helpers", Some(v("1.0")), None);
    matching.codebase_hint = Some("Helpers.dll".to_string());
    let mut mismatching = Reference::managed("Helpers", Some(v("1.0")), None);
    mismatching.codebase_hint = Some("Override/Helpers.dll".to_string());

    let analyzer = analyzer_for(vec![
        ("app.dll", managed_module("App", "1.0", vec![matching, mismatching])),
        ("Helpers.dll", managed_module("Helpers", "1.0", vec![])),
    ]);
    let graph = analyzer.analyze_dir(dir.path(), None).expect("analyze");

    // The matching hint binds to the live node; the mismatching one falls
    // back to a stub.
    assert_eq!(graph.len(), 3);
    let stubs: Vec<_> = graph.iter().filter(|node| node.module.is_stub()).collect();
    assert_eq!(stubs.len(), 1);
    assert_eq!(stubs[0].module.binary_name, "Helpers");

    let live_helpers = graph
        .iter()
        .find(|node| node.module.binary_name == "Helpers" && !node.module.is_stub())
        .unwrap();
    assert_eq!(live_helpers.incoming, 1);
}

#[test]
fn platform_invoke_references_do_not_bind_managed_candidates() {
    let dir = tempdir().expect("tempdir");
    touch(dir.path(), "app.dll");
    touch(dir.path(), "audio.dll");
    let analyzer = analyzer_for(vec![
        (
            "app.dll",
            managed_module("App", "1.0", vec![Reference::platform_invoke("audio")]),
        ),
        // Same name, but a managed module; the platform-invoke reference
        // needs a native target.
        ("audio.dll", managed_module("audio", "1.0", vec![])),
    ]);
    let graph = analyzer.analyze_dir(dir.path(), None).expect("analyze");
    assert_eq!(graph.len(), 3);

    let stub = graph.iter().find(|node| node.module.is_stub()).unwrap();
    assert_eq!(stub.module.binary_name, "audio");
    assert_eq!(stub.module.binary_kind, BinaryKind::Native);
    assert_eq!(stub.module.version, None);
}

#[test]
fn single_file_graph_has_one_placeholder_per_reference() {
    let dir = tempdir().expect("tempdir");
    touch(dir.path(), "mod.dll");
    let references = vec![
        Reference::managed("Foundation", Some(v("1.8.5")), None),
        Reference::managed("Mod.Core", Some(v("20.0.3613.0")), None),
        Reference::platform_invoke("native_audio"),
    ];
    let analyzer = analyzer_for(vec![("mod.dll", managed_module("Mod", "20.0.3613.0", references))]);
    let graph = analyzer.analyze_file(&dir.path().join("mod.dll"), None).expect("analyze");

    assert_eq!(graph.len(), 4);
    let root = graph.iter().find(|node| !node.module.is_stub()).unwrap();
    assert_eq!(root.outgoing, 3);
    assert_eq!(root.incoming, 0);
    let placeholder_kinds: Vec<BinaryKind> = graph
        .iter()
        .filter(|node| node.module.is_stub())
        .map(|node| node.module.binary_kind)
        .collect();
    assert_eq!(
        placeholder_kinds,
        vec![BinaryKind::Managed, BinaryKind::Managed, BinaryKind::Native]
    );

    let (outgoing, incoming) = edge_sums(&graph);
    assert_eq!(outgoing, incoming);
}

#[test]
fn repeated_inspection_is_served_from_the_cache() {
    let dir = tempdir().expect("tempdir");
    touch(dir.path(), "solo.dll");
    let analyzer = analyzer_for(vec![("solo.dll", managed_module("Solo", "1.0", vec![]))]);

    let file = dir.path().join("solo.dll");
    let first = analyzer.inspect_cached(&file, None).expect("first");
    let second = analyzer.inspect_cached(&file, None).expect("second");
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(analyzer.cached_modules(), 1);
}

#[test]
fn attempt_bind_tolerates_major_version_mismatch() {
    let candidate = ModuleData {
        binary_name: "Lib".to_string(),
        version: Some(v("3.0")),
        binary_kind: BinaryKind::Managed,
        file_path: Some("/x/Lib.dll".into()),
        ..ModuleData::default()
    };
    // Warns, but binds: side-by-side installs are a recorded gap.
    assert!(attempt_bind(&candidate, "Lib", BinaryKind::Managed, Some(v("2.0")), None));
    assert!(!attempt_bind(&candidate, "Other", BinaryKind::Managed, Some(v("3.0")), None));
    assert!(!attempt_bind(&candidate, "Lib", BinaryKind::Native, None, None));
}

#[test]
fn unknown_reference_kinds_produce_unknown_stubs() {
    let dir = tempdir().expect("tempdir");
    touch(dir.path(), "app.dll");
    let reference = Reference {
        binary_name: "Mystery".to_string(),
        declared_version: None,
        effective_version: None,
        full_name: None,
        codebase_hint: None,
        kind: ReferenceKind::Unknown,
    };
    let analyzer = analyzer_for(vec![("app.dll", managed_module("App", "1.0", vec![reference]))]);
    let graph = analyzer.analyze_dir(dir.path(), None).expect("analyze");
    let stub = graph.iter().find(|node| node.module.is_stub()).unwrap();
    assert_eq!(stub.module.binary_kind, BinaryKind::Unknown);
}
