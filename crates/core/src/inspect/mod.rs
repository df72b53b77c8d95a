//! Inspector contract and the ordered inspection pipeline.
//!
//! An inspector turns a file path into a [`ModuleData`]. The pipeline tries
//! each inspector in order: a raised error is logged and the next inspector
//! runs; a result with an empty loader error wins immediately; otherwise the
//! first soft-failure result seen is kept as the best effort. The pipeline
//! then normalizes the record (file path, binary name, content hash) so
//! downstream consumers never see partial identity.

pub mod bridge;
pub mod managed;
pub mod metadata;
pub mod native;
pub mod pe;

use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::ModuleData;

/// Error type for inspection operations.
#[derive(Debug, Error)]
pub enum InspectError {
    /// The inspection target does not exist; raised to the caller.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// An individual inspector failed outright; the pipeline logs this and
    /// moves on to the next inspector.
    #[error("{0}")]
    Failure(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Trait implemented by module inspectors (managed reader, native dump
/// parser, subprocess bridge).
pub trait Inspector: Send + Sync {
    fn inspect(&self, file: &Path) -> Result<ModuleData, InspectError>;
    fn name(&self) -> &'static str;
}

/// Ordered list of inspectors tried in turn for each file.
pub struct InspectorPipeline {
    inspectors: Vec<Box<dyn Inspector>>,
}

impl InspectorPipeline {
    pub fn new(inspectors: Vec<Box<dyn Inspector>>) -> Self {
        Self { inspectors }
    }

    /// The standard order: the managed reader first, then the native dump
    /// inspector.
    pub fn with_defaults() -> Self {
        Self::new(vec![
            Box::new(managed::ManagedInspector::new()),
            Box::new(native::NativeInspector::from_env()),
        ])
    }

    /// Run the pipeline over one file and normalize the winning record.
    pub fn run(&self, file: &Path) -> Result<ModuleData, InspectError> {
        if !file.is_file() {
            return Err(InspectError::FileNotFound(file.to_path_buf()));
        }

        let mut best: Option<ModuleData> = None;
        for inspector in &self.inspectors {
            match inspector.inspect(file) {
                Ok(module) => {
                    if module.loader_error.is_empty() {
                        best = Some(module);
                        break;
                    }
                    debug!(
                        inspector = inspector.name(),
                        file = %file.display(),
                        error = %module.loader_error,
                        "inspector declined file"
                    );
                    if best.is_none() {
                        best = Some(module);
                    }
                }
                Err(err) => {
                    warn!(
                        inspector = inspector.name(),
                        file = %file.display(),
                        error = %err,
                        "inspector failed"
                    );
                }
            }
        }

        let mut module =
            best.unwrap_or_else(|| ModuleData::failure("No inspector produced a result"));
        self.normalize(file, &mut module);
        Ok(module)
    }

    fn normalize(&self, file: &Path, module: &mut ModuleData) {
        if module.file_path.is_none() {
            module.file_path = Some(file.to_path_buf());
        }
        if module.binary_name.is_empty() {
            module.binary_name =
                file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        }
        if module.content_hash.is_empty() {
            match md5_file(file) {
                Ok(hash) => module.content_hash = hash,
                Err(err) => {
                    // Hashing failures stay on the record instead of
                    // aborting the scan.
                    if module.loader_error.is_empty() {
                        module.loader_error = format!("Failed to hash file: {err}");
                    }
                }
            }
        }
    }
}

/// Lower-case MD5 hex of a byte slice.
pub fn md5_bytes(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Compute the lower-case MD5 hex of a file's contents.
pub fn md5_file(path: &Path) -> std::io::Result<String> {
    let file = fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Md5::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
