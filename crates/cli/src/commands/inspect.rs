use std::path::Path;

use anyhow::{Context, Result};

use bindscope_core::inspect::InspectorPipeline;

use crate::commands::render_module_line;

/// Inspect one module and print its record without running the binder.
pub fn inspect_command(path: &Path, json: bool) -> Result<()> {
    let module = InspectorPipeline::with_defaults()
        .run(path)
        .with_context(|| format!("Failed to inspect {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&module)?);
        return Ok(());
    }

    println!("{}", render_module_line(&module));
    if let Some(full_name) = &module.full_name {
        println!("  Full name: {full_name}");
    }
    if !module.framework_id.is_empty() {
        println!("  Framework: {}", module.framework_id);
    }
    println!("  Hash: {}", module.content_hash);
    if !module.loader_error.is_empty() {
        println!("  Loader error: {}", module.loader_error);
    }
    if module.references.is_empty() {
        println!("  References: (none)");
    } else {
        println!("  References:");
        for reference in &module.references {
            let declared = reference
                .declared_version
                .map(|v| format!(" v{v}"))
                .unwrap_or_default();
            let redirected = match (reference.declared_version, reference.effective_version) {
                (Some(declared), Some(effective)) if declared != effective => {
                    format!(" -> v{effective}")
                }
                _ => String::new(),
            };
            let codebase = reference
                .codebase_hint
                .as_deref()
                .map(|hint| format!(" (codebase {hint})"))
                .unwrap_or_default();
            println!(
                "    {}{declared}{redirected} [{:?}]{codebase}",
                reference.binary_name, reference.kind
            );
        }
    }
    if !module.source_packages.is_empty() {
        println!("  Packages:");
        for package in &module.source_packages {
            println!("    {} {}", package.name, package.version);
        }
    }
    Ok(())
}
