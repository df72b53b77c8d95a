use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use bindscope_core::inspect::InspectorPipeline;

/// Inspect one module and write its binary-encoded record to stdout.
///
/// The counterpart of the subprocess-bridge inspector: a parent process
/// spawns this command and decodes the stream with the module codec.
pub fn bridge_command(path: &Path) -> Result<()> {
    let module = InspectorPipeline::with_defaults()
        .run(path)
        .with_context(|| format!("Failed to inspect {}", path.display()))?;
    let bytes = module.to_bytes();
    std::io::stdout()
        .write_all(&bytes)
        .context("Failed to write the encoded record to stdout")?;
    Ok(())
}
