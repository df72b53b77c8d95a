//! Core data model for inspected modules, their references, and package ids.
//!
//! `ModuleData` is the immutable record produced by the inspector pipeline for
//! one file (or synthesized for a stub). `Reference` is one outbound edge
//! candidate: a managed assembly reference, a platform-invoke target, or a
//! native import-table entry. Both carry a compact positional binary encoding
//! (see [`codec`]) used by the subprocess bridge and the persistent caches.

pub mod codec;
pub mod version;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::framework::FrameworkVersion;
pub use version::{ModuleVersion, VersionParseError};

/// File extensions (lower-case, no dot) that identify candidate modules.
pub const MODULE_EXTENSIONS: [&str; 2] = ["dll", "exe"];

/// True when the path carries one of the runtime's module extensions,
/// compared case-insensitively.
pub fn has_module_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MODULE_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m)))
        .unwrap_or(false)
}

/// Strip a trailing module extension from a name, case-insensitively.
///
/// `"Foundation.JSON.dll"` and `"Foundation.JSON"` normalize to the same key.
pub fn trim_module_extension(name: &str) -> &str {
    for ext in MODULE_EXTENSIONS {
        let suffix_len = ext.len() + 1;
        if name.len() > suffix_len {
            let split = name.len() - suffix_len;
            if let (Some(stem), Some(tail)) = (name.get(..split), name.get(split..)) {
                if tail.starts_with('.') && tail[1..].eq_ignore_ascii_case(ext) {
                    return stem;
                }
            }
        }
    }
    name
}

/// Processor/platform targeted by a module.
///
/// Declaration order is the wire encoding; do not reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Platform {
    #[default]
    Unknown,
    AnyCpu,
    AnyCpuPrefer32,
    Amd64,
    X86,
}

impl Platform {
    pub fn to_u32(self) -> u32 {
        match self {
            Platform::Unknown => 0,
            Platform::AnyCpu => 1,
            Platform::AnyCpuPrefer32 => 2,
            Platform::Amd64 => 3,
            Platform::X86 => 4,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Platform::Unknown),
            1 => Some(Platform::AnyCpu),
            2 => Some(Platform::AnyCpuPrefer32),
            3 => Some(Platform::Amd64),
            4 => Some(Platform::X86),
            _ => None,
        }
    }
}

/// Kind of binary a module turned out to be.
///
/// Declaration order is the wire encoding; do not reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BinaryKind {
    Managed,
    Native,
    #[default]
    Unknown,
}

impl BinaryKind {
    pub fn to_u32(self) -> u32 {
        match self {
            BinaryKind::Managed => 0,
            BinaryKind::Native => 1,
            BinaryKind::Unknown => 2,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(BinaryKind::Managed),
            1 => Some(BinaryKind::Native),
            2 => Some(BinaryKind::Unknown),
            _ => None,
        }
    }
}

/// How a reference was declared by the source module.
///
/// Declaration order is the wire encoding; do not reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReferenceKind {
    ManagedRef,
    PlatformInvoke,
    NativeImport,
    #[default]
    Unknown,
}

impl ReferenceKind {
    pub fn to_u32(self) -> u32 {
        match self {
            ReferenceKind::ManagedRef => 0,
            ReferenceKind::PlatformInvoke => 1,
            ReferenceKind::NativeImport => 2,
            ReferenceKind::Unknown => 3,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(ReferenceKind::ManagedRef),
            1 => Some(ReferenceKind::PlatformInvoke),
            2 => Some(ReferenceKind::NativeImport),
            3 => Some(ReferenceKind::Unknown),
            _ => None,
        }
    }

    /// The binary kind a reference of this kind binds against.
    pub fn target_kind(self) -> BinaryKind {
        match self {
            ReferenceKind::ManagedRef => BinaryKind::Managed,
            ReferenceKind::PlatformInvoke | ReferenceKind::NativeImport => BinaryKind::Native,
            ReferenceKind::Unknown => BinaryKind::Unknown,
        }
    }
}

/// One declared dependency from a module to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub binary_name: String,
    /// Version as declared in the source module's manifest, when known.
    pub declared_version: Option<ModuleVersion>,
    /// Version after binding-override application; equals the declared
    /// version when no redirect matched.
    pub effective_version: Option<ModuleVersion>,
    pub full_name: Option<String>,
    /// Relative path constraining where the reference must resolve.
    pub codebase_hint: Option<String>,
    pub kind: ReferenceKind,
}

impl Reference {
    /// A managed assembly reference; the effective version starts equal to
    /// the declared one.
    pub fn managed(
        binary_name: impl Into<String>,
        version: Option<ModuleVersion>,
        full_name: Option<String>,
    ) -> Self {
        Self {
            binary_name: binary_name.into(),
            declared_version: version,
            effective_version: version,
            full_name,
            codebase_hint: None,
            kind: ReferenceKind::ManagedRef,
        }
    }

    /// A platform-invoke target. Calls into native modules carry no managed
    /// version.
    pub fn platform_invoke(binary_name: impl Into<String>) -> Self {
        Self {
            binary_name: binary_name.into(),
            declared_version: None,
            effective_version: None,
            full_name: None,
            codebase_hint: None,
            kind: ReferenceKind::PlatformInvoke,
        }
    }

    /// A native import-table entry.
    pub fn native_import(binary_name: impl Into<String>) -> Self {
        Self {
            binary_name: binary_name.into(),
            declared_version: None,
            effective_version: None,
            full_name: None,
            codebase_hint: None,
            kind: ReferenceKind::NativeImport,
        }
    }

    /// The version binding resolves against: effective when an override
    /// applied, declared otherwise.
    pub fn target_version(&self) -> Option<ModuleVersion> {
        self.effective_version.or(self.declared_version)
    }
}

/// A package identity from a local package cache: directory-level name and
/// version string, compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId {
    pub name: String,
    pub version: String,
}

impl PackageId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { name: name.into(), version: version.into() }
    }
}

/// The record produced by inspecting one file, immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModuleData {
    /// Absent for stub nodes synthesized from unresolved references.
    pub file_path: Option<PathBuf>,
    /// Never empty after pipeline normalization (defaults to the file stem).
    pub binary_name: String,
    /// Fully qualified name, e.g. `Name, Version=v, Culture=c, PublicKeyToken=t`.
    pub full_name: Option<String>,
    pub version: Option<ModuleVersion>,
    /// The raw target-framework identifier string, empty when unknown.
    pub framework_id: String,
    pub framework: FrameworkVersion,
    pub platform: Platform,
    pub binary_kind: BinaryKind,
    /// Lower-case MD5 hex of the file bytes; empty for stubs.
    pub content_hash: String,
    /// Empty on success; otherwise the best inspector's failure message.
    pub loader_error: String,
    pub references: Vec<Reference>,
    /// Packages from the local cache that could have supplied this module.
    pub source_packages: BTreeSet<PackageId>,
}

impl ModuleData {
    /// A soft-failure record: the inspector recognized that the file is not
    /// its format (or could not read it) without raising an error.
    pub fn failure(message: impl Into<String>) -> Self {
        Self { loader_error: message.into(), ..Self::default() }
    }

    /// A placeholder record for a reference that no live module satisfied.
    pub fn stub(
        binary_name: impl Into<String>,
        version: Option<ModuleVersion>,
        full_name: Option<String>,
        kind: BinaryKind,
    ) -> Self {
        Self {
            binary_name: binary_name.into(),
            version,
            full_name,
            binary_kind: kind,
            ..Self::default()
        }
    }

    pub fn is_stub(&self) -> bool {
        self.file_path.is_none()
    }
}
