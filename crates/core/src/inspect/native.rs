//! Native-binary inspector.
//!
//! Delegates to an external dump utility and parses its textual report. The
//! report parser is a pure function over the report text so it can be
//! exercised without the tool installed. The tool may optionally be staged
//! into a scoped temporary directory owned by the inspector; the directory is
//! removed on drop on all exit paths, tolerating already-missing files.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use tracing::debug;

use crate::inspect::{InspectError, Inspector};
use crate::model::{BinaryKind, ModuleData, Platform, Reference};

/// Environment variable naming the dump utility executable.
pub const DUMP_TOOL_ENV: &str = "BINDSCOPE_DUMP_TOOL";

/// Fallback executable name resolved through `PATH`.
const DEFAULT_DUMP_TOOL: &str = "dumpbin";

/// Report marker identifying a native executable.
const FILE_HEADER_MARKER: &str = "FILE HEADER VALUES";

/// Report marker opening the import-dependency block.
const DEPENDENCIES_MARKER: &str = "Image has the following dependencies";

pub struct NativeInspector {
    tool: PathBuf,
    /// Keeps a staged copy of the tool alive; removed on drop.
    _staging: Option<TempDir>,
}

impl NativeInspector {
    /// Resolve the dump tool from `BINDSCOPE_DUMP_TOOL`, falling back to a
    /// `PATH` lookup of the default name.
    pub fn from_env() -> Self {
        let tool = env::var_os(DUMP_TOOL_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DUMP_TOOL));
        Self { tool, _staging: None }
    }

    pub fn with_tool(tool: impl Into<PathBuf>) -> Self {
        Self { tool: tool.into(), _staging: None }
    }

    /// Copy the tool into a scoped temporary directory and run it from
    /// there. The copy and its directory live exactly as long as the
    /// inspector.
    pub fn staged(tool: &Path) -> std::io::Result<Self> {
        let staging = TempDir::new()?;
        let file_name = tool.file_name().unwrap_or_else(|| "dump-tool".as_ref());
        let staged = staging.path().join(file_name);
        std::fs::copy(tool, &staged)?;
        Ok(Self { tool: staged, _staging: Some(staging) })
    }
}

impl Inspector for NativeInspector {
    fn inspect(&self, file: &Path) -> Result<ModuleData, InspectError> {
        let output = Command::new(&self.tool).arg(file).output().map_err(|err| {
            InspectError::Failure(format!(
                "failed to spawn dump tool {}: {err}",
                self.tool.display()
            ))
        })?;
        if !output.status.success() {
            return Err(InspectError::Failure(format!(
                "dump tool exited with {}",
                output.status
            )));
        }
        let report = String::from_utf8_lossy(&output.stdout);
        debug!(file = %file.display(), bytes = report.len(), "parsed dump report");
        Ok(parse_dump_report(&report))
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

/// Interpret a dump-utility report as a native module record.
///
/// A report without the file-header block is a soft failure; machine lines
/// select the platform; the dependency block (entries start two lines below
/// the marker and run to the first blank line) yields lower-cased,
/// extension-stripped native imports.
pub fn parse_dump_report(report: &str) -> ModuleData {
    if !report.contains(FILE_HEADER_MARKER) {
        return ModuleData::failure("File is not a native executable");
    }

    let mut module = ModuleData { binary_kind: BinaryKind::Native, ..ModuleData::default() };

    let lines: Vec<&str> = report.lines().collect();
    for (index, line) in lines.iter().enumerate() {
        if line.contains("machine (x64)") {
            module.platform = Platform::Amd64;
        } else if line.contains("machine (x86)") {
            module.platform = Platform::X86;
        } else if line.contains(DEPENDENCIES_MARKER) {
            for entry in lines.iter().skip(index + 2) {
                let entry = entry.trim();
                if entry.is_empty() {
                    break;
                }
                let stem = Path::new(entry)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_lowercase())
                    .unwrap_or_else(|| entry.to_lowercase());
                module.references.push(Reference::native_import(stem));
            }
        }
    }

    module
}
