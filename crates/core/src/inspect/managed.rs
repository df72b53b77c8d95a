//! Managed-module inspector.
//!
//! Reads a managed PE image with the in-tree PE and metadata readers:
//! identity from the Assembly table, platform from the COFF machine word and
//! CLR flags, the target framework from the assembly-level attribute, one
//! managed reference per AssemblyRef row (well-known foundation assemblies
//! excluded), and one platform-invoke reference per distinct import scope.
//! Finishes by applying the sidecar binding overrides to the managed
//! references.

use std::path::Path;

use tracing::debug;

use crate::framework::FrameworkVersion;
use crate::inspect::metadata::MetadataReader;
use crate::inspect::pe::{
    PeInfo, COR_FLAG_32BIT_PREFERRED, COR_FLAG_32BIT_REQUIRED, COR_FLAG_ILONLY, MACHINE_AMD64,
    MACHINE_I386,
};
use crate::inspect::{md5_bytes, InspectError, Inspector};
use crate::model::{
    trim_module_extension, BinaryKind, ModuleData, Platform, Reference, ReferenceKind,
};
use crate::overrides;

/// Assemblies every managed module references implicitly; edges to them say
/// nothing about the application's own dependency shape.
const FOUNDATION_ASSEMBLIES: [&str; 2] = ["mscorlib", "System"];

#[derive(Default)]
pub struct ManagedInspector;

impl ManagedInspector {
    pub fn new() -> Self {
        Self
    }
}

impl Inspector for ManagedInspector {
    fn inspect(&self, file: &Path) -> Result<ModuleData, InspectError> {
        let bytes = std::fs::read(file)
            .map_err(|source| InspectError::Io { path: file.to_path_buf(), source })?;

        let pe = match PeInfo::parse(&bytes) {
            Ok(pe) => pe,
            Err(err) => return Ok(ModuleData::failure(err.to_string())),
        };
        let Some(clr) = pe.clr else {
            return Ok(ModuleData::failure("File is not a managed module"));
        };
        let Some(metadata_offset) = pe.rva_to_offset(clr.metadata_rva) else {
            return Ok(ModuleData::failure("Managed metadata directory is unmapped"));
        };
        let metadata_end = metadata_offset.saturating_add(clr.metadata_size as usize);
        let Some(metadata_bytes) = bytes.get(metadata_offset..metadata_end.min(bytes.len())) else {
            return Ok(ModuleData::failure("Managed metadata directory is out of bounds"));
        };
        let reader = match MetadataReader::parse(metadata_bytes) {
            Ok(reader) => reader,
            Err(err) => {
                return Ok(ModuleData::failure(format!("Failed to read managed metadata: {err}")))
            }
        };

        let mut module = ModuleData {
            binary_kind: BinaryKind::Managed,
            platform: platform_of(&pe, clr.flags),
            content_hash: md5_bytes(&bytes),
            file_path: Some(file.to_path_buf()),
            ..ModuleData::default()
        };

        if let Some(assembly) = reader.assembly() {
            module.full_name = Some(assembly.full_name());
            module.version = Some(assembly.version);
            module.binary_name = assembly.name;
        } else if let Some(name) = reader.module_name() {
            module.binary_name = name;
        }

        if let Some(framework_id) = reader.target_framework() {
            module.framework = FrameworkVersion::parse(&framework_id);
            module.framework_id = framework_id;
        }

        for reference in reader.assembly_refs() {
            if FOUNDATION_ASSEMBLIES.iter().any(|f| *f == reference.name) {
                continue;
            }
            let full_name = reference.full_name();
            module.references.push(Reference::managed(
                reference.name,
                Some(reference.version),
                Some(full_name),
            ));
        }

        for scope in reader.pinvoke_scopes() {
            // Import scopes may carry the library extension; native modules
            // are identified by their stem.
            let name = trim_module_extension(&scope).to_string();
            let already_present = module
                .references
                .iter()
                .any(|r| r.kind == ReferenceKind::PlatformInvoke && r.binary_name == name);
            if !already_present {
                module.references.push(Reference::platform_invoke(name));
            }
        }

        let rules = overrides::parse_sidecar_config(file);
        if !rules.is_empty() {
            debug!(file = %file.display(), rules = rules.len(), "applying binding overrides");
            overrides::apply_overrides(&mut module.references, &rules);
        }

        Ok(module)
    }

    fn name(&self) -> &'static str {
        "managed"
    }
}

/// Platform precedence over the machine word, image shape, and CLR flags.
/// The 32-bit-preferred flag narrows the IL-only/I386 case; a 32-bit
/// requirement without the preference is a hard X86 target.
fn platform_of(pe: &PeInfo, cor_flags: u32) -> Platform {
    let il_only = cor_flags & COR_FLAG_ILONLY != 0;
    let required32 = cor_flags & COR_FLAG_32BIT_REQUIRED != 0;
    let prefer32 = cor_flags & COR_FLAG_32BIT_PREFERRED != 0;
    if pe.machine == MACHINE_I386 && il_only && prefer32 {
        return Platform::AnyCpuPrefer32;
    }
    if pe.machine == MACHINE_I386 && il_only && !required32 {
        return Platform::AnyCpu;
    }
    if pe.pe32_plus && pe.machine == MACHINE_AMD64 {
        return Platform::Amd64;
    }
    if pe.machine == MACHINE_I386 && required32 {
        return Platform::X86;
    }
    Platform::Unknown
}
