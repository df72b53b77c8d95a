//! Analysis orchestration: cached inspection, parallel directory scans, and
//! the binding simulation that turns inspected modules into a dependency
//! graph.
//!
//! Binding mirrors the runtime's own process per reference: candidates must
//! match on name (case-insensitive) and binary kind, a major-version
//! mismatch is logged but tolerated, and a codebase hint constrains which
//! file may satisfy the reference. References no live module satisfies fall
//! back to shared stub nodes, at most one per (name, version, kind).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::cache::InspectionCache;
use crate::framework::{self, FrameworkVersion};
use crate::graph::{Graph, NodeId};
use crate::inspect::{InspectError, InspectorPipeline};
use crate::model::{has_module_extension, BinaryKind, ModuleData, ModuleVersion};
use crate::packages::PackageIndex;

pub struct Analyzer {
    pipeline: InspectorPipeline,
    cache: InspectionCache,
}

impl Analyzer {
    pub fn new(pipeline: InspectorPipeline) -> Self {
        Self { pipeline, cache: InspectionCache::new() }
    }

    pub fn with_default_pipeline() -> Self {
        Self::new(InspectorPipeline::with_defaults())
    }

    /// Number of files inspected so far in this analyzer's lifetime.
    pub fn cached_modules(&self) -> usize {
        self.cache.len()
    }

    /// Inspect one file, serving repeats from the in-memory cache keyed by
    /// absolute path. When a package index is supplied, the record is
    /// annotated with the packages that could have supplied the file.
    pub fn inspect_cached(
        &self,
        file: &Path,
        packages: Option<&PackageIndex>,
    ) -> Result<Arc<ModuleData>, InspectError> {
        let key = std::fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
        self.cache.get_or_try_insert(key, || {
            let mut module = self.pipeline.run(file)?;
            if let Some(index) = packages {
                for (package, _) in index.resolve(&module.binary_name, Some(&module.content_hash)) {
                    module.source_packages.insert(package);
                }
            }
            Ok(module)
        })
    }

    /// Graph for a single file: the root module plus one placeholder child
    /// per declared reference.
    pub fn analyze_file(
        &self,
        file: &Path,
        packages: Option<&PackageIndex>,
    ) -> Result<Graph, InspectError> {
        let module = self.inspect_cached(file, packages)?;
        let mut graph = Graph::new();
        let root = graph.add_node((*module).clone());
        for reference in module.references.clone() {
            let child = graph.add_node(ModuleData::stub(
                reference.binary_name.clone(),
                reference.target_version(),
                reference.full_name.clone(),
                reference.kind.target_kind(),
            ));
            graph.node_mut(root).deps.push(child);
        }
        graph.finalize();
        Ok(graph)
    }

    /// Graph for a directory: inspect every candidate module in parallel,
    /// then simulate binding for every reference.
    pub fn analyze_dir(
        &self,
        dir: &Path,
        packages: Option<&PackageIndex>,
    ) -> Result<Graph, InspectError> {
        let candidates = enumerate_candidates(dir)?;
        debug!(dir = %dir.display(), candidates = candidates.len(), "scanning directory");

        let inspected: Vec<Arc<ModuleData>> = candidates
            .par_iter()
            .map(|file| self.inspect_cached(file, packages))
            .collect::<Result<_, _>>()?;

        let mut modules: Vec<ModuleData> =
            inspected.iter().map(|module| (**module).clone()).collect();
        modules.sort_by(|a, b| a.file_path.cmp(&b.file_path));

        let mut graph = Graph::new();
        for module in modules {
            graph.add_node(module);
        }
        let live = graph.len();
        let mut stubs: Vec<NodeId> = Vec::new();

        for source in 0..live {
            let source_id = NodeId(source);
            let references = graph.node(source_id).module.references.clone();
            let source_framework = graph.node(source_id).module.framework;

            for reference in &references {
                let name = reference.binary_name.as_str();
                let version = reference.target_version();
                let kind = reference.kind.target_kind();
                let hint = reference.codebase_hint.as_deref();

                let mut target = (0..live).map(NodeId).find(|&candidate| {
                    candidate != source_id
                        && attempt_bind(&graph.node(candidate).module, name, kind, version, hint)
                });
                if target.is_none() {
                    target = stubs.iter().copied().find(|&stub| {
                        attempt_bind(&graph.node(stub).module, name, kind, version, None)
                    });
                }
                let target = target.unwrap_or_else(|| {
                    let mut stub = ModuleData::stub(
                        name.to_string(),
                        version,
                        reference.full_name.clone(),
                        kind,
                    );
                    if let Some(index) = packages {
                        for (package, _) in index.resolve(name, None) {
                            stub.source_packages.insert(package);
                        }
                    }
                    let id = graph.add_node(stub);
                    stubs.push(id);
                    id
                });

                let errors = binding_errors(
                    &source_framework,
                    &graph.node(target).module,
                    version,
                );
                let source_node = graph.node_mut(source_id);
                source_node.deps.push(target);
                source_node.errors.extend(errors);
            }
        }

        graph.finalize();
        Ok(graph)
    }
}

/// Regular files directly under `dir` whose extension names a module,
/// compared case-insensitively, in path order.
fn enumerate_candidates(dir: &Path) -> Result<Vec<PathBuf>, InspectError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|source| InspectError::Io { path: dir.to_path_buf(), source })?;
    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| InspectError::Io { path: dir.to_path_buf(), source })?;
        let path = entry.path();
        if path.is_file() && has_module_extension(&path) {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates)
}

/// Whether `candidate` satisfies a reference to `name` of the given kind and
/// version under an optional codebase constraint.
pub fn attempt_bind(
    candidate: &ModuleData,
    name: &str,
    kind: BinaryKind,
    version: Option<ModuleVersion>,
    codebase_hint: Option<&str>,
) -> bool {
    if !candidate.binary_name.eq_ignore_ascii_case(name) {
        return false;
    }
    if candidate.binary_kind != kind {
        warn!(
            candidate = %candidate.binary_name,
            candidate_kind = ?candidate.binary_kind,
            requested_kind = ?kind,
            "rejecting candidate with wrong binary kind"
        );
        return false;
    }
    if let (Some(candidate_version), Some(requested)) = (candidate.version, version) {
        // Known gap: side-by-side installs would need this to fail, but the
        // simulated binder only warns.
        if candidate_version.major != requested.major {
            warn!(
                candidate = %candidate.binary_name,
                candidate_version = %candidate_version,
                requested_version = %requested,
                "major version mismatch while binding"
            );
        }
    }
    if let Some(hint) = codebase_hint.filter(|hint| !hint.is_empty()) {
        let Some(file) = candidate.file_path.as_deref() else {
            return false;
        };
        let expected = file.parent().map(|dir| dir.join(hint));
        if expected.as_deref() != Some(file) {
            return false;
        }
    }
    true
}

/// Error strings to attach to the source node after a successful bind.
fn binding_errors(
    source_framework: &FrameworkVersion,
    target: &ModuleData,
    requested: Option<ModuleVersion>,
) -> Vec<String> {
    let mut errors = Vec::new();
    if !target.is_stub() {
        if let (Some(resolved), Some(requested)) = (target.version, requested) {
            if resolved < requested {
                errors.push(format!(
                    "down-grade: requested v{requested} but resolved v{resolved}"
                ));
            }
        }
    }
    if source_framework.is_known() && target.framework.is_known() {
        match framework::legal(source_framework, &target.framework) {
            Ok(true) => {}
            Ok(false) => {
                let version = target
                    .version
                    .or(requested)
                    .map(|v| format!(" v{v}"))
                    .unwrap_or_default();
                errors.push(format!(
                    "cross-framework: {}{version} is a higher-level framework",
                    target.binary_name
                ));
            }
            Err(err) => {
                warn!(target = %target.binary_name, error = %err, "cross-framework check failed");
                errors.push(err.to_string());
            }
        }
    }
    errors
}
