use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use bindscope_core::analyzer::Analyzer;
use bindscope_core::packages::PackageIndex;

use crate::commands::render_graph;

/// Options for the analyze command.
#[derive(Debug, Default)]
pub struct AnalyzeOptions {
    /// Emit JSON instead of human-readable text.
    pub json: bool,
    /// Package roots to index; the per-user cache when empty.
    pub package_roots: Vec<PathBuf>,
    /// Skip package-cache resolution entirely.
    pub no_packages: bool,
    /// Override the persistent hash-cache location.
    pub hash_cache: Option<PathBuf>,
}

/// Analyze a file or directory and print its dependency graph.
pub fn analyze_command(path: &Path, options: &AnalyzeOptions) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("No such file or directory: {}", path.display());
    }

    let packages = if options.no_packages {
        None
    } else {
        let roots = if options.package_roots.is_empty() {
            PackageIndex::default_roots()
        } else {
            options.package_roots.clone()
        };
        let cache_path = options
            .hash_cache
            .clone()
            .unwrap_or_else(PackageIndex::default_hash_cache_path);
        let index = PackageIndex::initialize_with_cache(&roots, cache_path);
        debug!(packages = index.package_count(), "package index ready");
        Some(index)
    };

    let analyzer = Analyzer::with_default_pipeline();
    let graph = if path.is_dir() {
        analyzer.analyze_dir(path, packages.as_ref())
    } else {
        analyzer.analyze_file(path, packages.as_ref())
    }
    .with_context(|| format!("Failed to analyze {}", path.display()))?;

    if let Some(index) = &packages {
        if let Err(err) = index.commit() {
            warn!(error = %err, "failed to persist the package hash cache");
        }
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
    } else {
        print!("{}", render_graph(&graph));
    }
    Ok(())
}
