//! Subprocess-bridge inspector.
//!
//! Runs a helper executable that inspects one file in its own process and
//! writes the binary-encoded `ModuleData` to standard output. Useful when a
//! module must be read in isolation from the host process; the in-tree
//! readers do not need it, so the bridge is not part of the default
//! pipeline.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::inspect::{InspectError, Inspector};
use crate::model::ModuleData;

pub struct SubprocessBridge {
    helper: PathBuf,
    args: Vec<String>,
}

impl SubprocessBridge {
    /// `helper` is invoked as `helper [args...] <file>`.
    pub fn new(helper: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self { helper: helper.into(), args }
    }
}

impl Inspector for SubprocessBridge {
    fn inspect(&self, file: &Path) -> Result<ModuleData, InspectError> {
        let output = Command::new(&self.helper)
            .args(&self.args)
            .arg(file)
            .output()
            .map_err(|err| {
                InspectError::Failure(format!(
                    "failed to spawn bridge helper {}: {err}",
                    self.helper.display()
                ))
            })?;
        if !output.status.success() {
            return Err(InspectError::Failure(format!(
                "bridge helper exited with {}",
                output.status
            )));
        }
        match ModuleData::from_bytes(&output.stdout) {
            Ok(module) => Ok(module),
            // A garbled stream is recoverable: keep the file in the graph
            // with the decode failure recorded on it.
            Err(err) => Ok(ModuleData::failure(format!("Failed to decode bridge output: {err}"))),
        }
    }

    fn name(&self) -> &'static str {
        "bridge"
    }
}
