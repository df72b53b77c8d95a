//! End-to-end managed inspection over a synthesized module image.
//!
//! The fixture builder lays out a minimal PE32/PE32+ image with a CLR
//! header and a metadata block carrying Module, TypeRef, MemberRef,
//! CustomAttribute, ModuleRef, ImplMap, Assembly, and AssemblyRef tables:
//! an assembly `Audio, Version=1.0.0.0` targeting `.NETFramework,Version=v4.5`
//! with references to mscorlib, System, and Foundation plus one
//! platform-invoke import scope.

use std::path::Path;

use bindscope_core::framework::FrameworkKind;
use bindscope_core::inspect::managed::ManagedInspector;
use bindscope_core::inspect::metadata::MetadataReader;
use bindscope_core::inspect::pe::{
    COR_FLAG_32BIT_PREFERRED, COR_FLAG_32BIT_REQUIRED, COR_FLAG_ILONLY, MACHINE_AMD64,
    MACHINE_I386,
};
use bindscope_core::inspect::{Inspector, InspectorPipeline};
use bindscope_core::model::{BinaryKind, ModuleVersion, Platform, ReferenceKind};
use tempfile::tempdir;

struct StringsHeap {
    data: Vec<u8>,
}

impl StringsHeap {
    fn new() -> Self {
        Self { data: vec![0] }
    }

    fn add(&mut self, text: &str) -> u16 {
        if text.is_empty() {
            return 0;
        }
        let offset = self.data.len() as u16;
        self.data.extend_from_slice(text.as_bytes());
        self.data.push(0);
        offset
    }
}

struct BlobHeap {
    data: Vec<u8>,
}

impl BlobHeap {
    fn new() -> Self {
        Self { data: vec![0] }
    }

    fn add(&mut self, bytes: &[u8]) -> u16 {
        assert!(bytes.len() < 0x80, "fixture blobs use single-byte lengths");
        let offset = self.data.len() as u16;
        self.data.push(bytes.len() as u8);
        self.data.extend_from_slice(bytes);
        offset
    }
}

fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn assembly_ref_row(
    rows: &mut Vec<u8>,
    version: (u16, u16, u16, u16),
    name: u16,
) {
    push_u16(rows, version.0);
    push_u16(rows, version.1);
    push_u16(rows, version.2);
    push_u16(rows, version.3);
    push_u32(rows, 0); // flags
    push_u16(rows, 0); // public key or token
    push_u16(rows, name);
    push_u16(rows, 0); // culture
    push_u16(rows, 0); // hash value
}

/// Metadata block: root header, `#~` tables stream, `#Strings`, `#Blob`.
fn build_metadata() -> Vec<u8> {
    let mut strings = StringsHeap::new();
    let mut blobs = BlobHeap::new();

    let module_name = strings.add("Audio.dll");
    let tfa_name = strings.add("TargetFrameworkAttribute");
    let tfa_namespace = strings.add("System.Runtime.Versioning");
    let ctor_name = strings.add(".ctor");
    let native_scope = strings.add("native_audio");
    let import_name = strings.add("play_sound");
    let assembly_name = strings.add("Audio");
    let mscorlib = strings.add("mscorlib");
    let system = strings.add("System");
    let foundation = strings.add("Foundation");

    // Fixed attribute value: prolog, length-prefixed string, no named args.
    let framework_id = ".NETFramework,Version=v4.5";
    let mut tfa_value = vec![0x01, 0x00, framework_id.len() as u8];
    tfa_value.extend_from_slice(framework_id.as_bytes());
    tfa_value.extend_from_slice(&[0x00, 0x00]);
    let tfa_blob = blobs.add(&tfa_value);

    let mut rows = Vec::new();
    // Module
    push_u16(&mut rows, 0); // generation
    push_u16(&mut rows, module_name);
    push_u16(&mut rows, 1); // mvid
    push_u16(&mut rows, 0);
    push_u16(&mut rows, 0);
    // TypeRef: scope = AssemblyRef rid 1 (tag 2 of ResolutionScope)
    push_u16(&mut rows, (1 << 2) | 2);
    push_u16(&mut rows, tfa_name);
    push_u16(&mut rows, tfa_namespace);
    // MemberRef: class = TypeRef rid 1 (tag 1 of MemberRefParent)
    push_u16(&mut rows, (1 << 3) | 1);
    push_u16(&mut rows, ctor_name);
    push_u16(&mut rows, 0); // signature
    // CustomAttribute: parent = Assembly rid 1 (tag 14 of HasCustomAttribute),
    // type = MemberRef rid 1 (tag 3 of CustomAttributeType)
    push_u16(&mut rows, (1 << 5) | 14);
    push_u16(&mut rows, (1 << 3) | 3);
    push_u16(&mut rows, tfa_blob);
    // ModuleRef
    push_u16(&mut rows, native_scope);
    // ImplMap: forwarded = MethodDef rid 1 (tag 1 of MemberForwarded)
    push_u16(&mut rows, 0); // mapping flags
    push_u16(&mut rows, (1 << 1) | 1);
    push_u16(&mut rows, import_name);
    push_u16(&mut rows, 1); // import scope = ModuleRef rid 1
    // Assembly
    push_u32(&mut rows, 0x8004); // hash algorithm
    push_u16(&mut rows, 1);
    push_u16(&mut rows, 0);
    push_u16(&mut rows, 0);
    push_u16(&mut rows, 0);
    push_u32(&mut rows, 0); // flags
    push_u16(&mut rows, 0); // public key
    push_u16(&mut rows, assembly_name);
    push_u16(&mut rows, 0); // culture
    // AssemblyRef rows
    assembly_ref_row(&mut rows, (4, 0, 0, 0), mscorlib);
    assembly_ref_row(&mut rows, (4, 0, 0, 0), system);
    assembly_ref_row(&mut rows, (1, 8, 5, 0), foundation);

    let valid: u64 = (1 << 0x00)
        | (1 << 0x01)
        | (1 << 0x0A)
        | (1 << 0x0C)
        | (1 << 0x1A)
        | (1 << 0x1C)
        | (1 << 0x20)
        | (1 << 0x23);
    let counts = [1u32, 1, 1, 1, 1, 1, 1, 3];

    let mut tables = Vec::new();
    push_u32(&mut tables, 0); // reserved
    tables.push(2); // major
    tables.push(0); // minor
    tables.push(0); // heap sizes
    tables.push(1); // reserved
    tables.extend_from_slice(&valid.to_le_bytes());
    tables.extend_from_slice(&0u64.to_le_bytes()); // sorted
    for count in counts {
        push_u32(&mut tables, count);
    }
    tables.extend_from_slice(&rows);

    // Root header: 32 fixed bytes, then three stream headers of 12, 20, and
    // 16 bytes.
    let header_len = 32 + 12 + 20 + 16;
    let tables_offset = header_len as u32;
    let strings_offset = tables_offset + tables.len() as u32;
    let blob_offset = strings_offset + strings.data.len() as u32;

    let mut metadata = Vec::new();
    push_u32(&mut metadata, 0x424A_5342);
    push_u16(&mut metadata, 1);
    push_u16(&mut metadata, 1);
    push_u32(&mut metadata, 0);
    push_u32(&mut metadata, 12); // version string length
    metadata.extend_from_slice(b"v4.0.30319\0\0");
    push_u16(&mut metadata, 0); // flags
    push_u16(&mut metadata, 3); // stream count
    push_u32(&mut metadata, tables_offset);
    push_u32(&mut metadata, tables.len() as u32);
    metadata.extend_from_slice(b"#~\0\0");
    push_u32(&mut metadata, strings_offset);
    push_u32(&mut metadata, strings.data.len() as u32);
    metadata.extend_from_slice(b"#Strings\0\0\0\0");
    push_u32(&mut metadata, blob_offset);
    push_u32(&mut metadata, blobs.data.len() as u32);
    metadata.extend_from_slice(b"#Blob\0\0\0");
    assert_eq!(metadata.len(), header_len);
    metadata.extend_from_slice(&tables);
    metadata.extend_from_slice(&strings.data);
    metadata.extend_from_slice(&blobs.data);
    metadata
}

/// Wrap a metadata block in a one-section PE image with a CLR header.
fn build_image(machine: u16, pe32_plus: bool, cor_flags: u32) -> Vec<u8> {
    let metadata = build_metadata();
    let optional = 0x58usize;
    let optional_size: usize = if pe32_plus { 0xF0 } else { 0xE0 };
    let section_table = optional + optional_size;
    let section_data_offset = 0x200usize;
    let section_rva = 0x2000u32;
    let clr_header_len = 72usize;
    let section_data_len = (clr_header_len + metadata.len()) as u32;

    let mut image = vec![0u8; section_data_offset + clr_header_len + metadata.len()];
    let put_u16 = |image: &mut [u8], offset: usize, value: u16| {
        image[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    };
    let put_u32 = |image: &mut [u8], offset: usize, value: u32| {
        image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    };

    image[0] = b'M';
    image[1] = b'Z';
    put_u32(&mut image, 0x3c, 0x40);
    image[0x40..0x44].copy_from_slice(b"PE\0\0");
    // COFF header
    put_u16(&mut image, 0x44, machine);
    put_u16(&mut image, 0x46, 1); // one section
    put_u16(&mut image, 0x54, optional_size as u16);
    put_u16(&mut image, 0x56, 0x2022); // characteristics
    // Optional header
    put_u16(&mut image, optional, if pe32_plus { 0x020B } else { 0x010B });
    let (dir_count_offset, dir_offset) = if pe32_plus {
        (optional + 108, optional + 112)
    } else {
        (optional + 92, optional + 96)
    };
    put_u32(&mut image, dir_count_offset, 16);
    put_u32(&mut image, dir_offset + 14 * 8, section_rva); // CLR header RVA
    put_u32(&mut image, dir_offset + 14 * 8 + 4, clr_header_len as u32);
    // Section table
    image[section_table..section_table + 5].copy_from_slice(b".text");
    put_u32(&mut image, section_table + 8, section_data_len); // virtual size
    put_u32(&mut image, section_table + 12, section_rva);
    put_u32(&mut image, section_table + 16, section_data_len); // raw size
    put_u32(&mut image, section_table + 20, section_data_offset as u32);
    // CLR header
    put_u32(&mut image, section_data_offset, clr_header_len as u32);
    put_u16(&mut image, section_data_offset + 4, 2);
    put_u16(&mut image, section_data_offset + 6, 5);
    put_u32(&mut image, section_data_offset + 8, section_rva + clr_header_len as u32);
    put_u32(&mut image, section_data_offset + 12, metadata.len() as u32);
    put_u32(&mut image, section_data_offset + 16, cor_flags);
    // Metadata
    image[section_data_offset + clr_header_len..].copy_from_slice(&metadata);
    image
}

fn v(text: &str) -> ModuleVersion {
    text.parse().expect("version")
}

fn write_fixture(dir: &Path, name: &str, machine: u16, pe32_plus: bool, cor_flags: u32) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, build_image(machine, pe32_plus, cor_flags)).unwrap();
    path
}

#[test]
fn metadata_reader_extracts_identity_refs_and_scopes() {
    let metadata = build_metadata();
    let reader = MetadataReader::parse(&metadata).expect("parse metadata");

    let assembly = reader.assembly().expect("assembly row");
    assert_eq!(assembly.name, "Audio");
    assert_eq!(assembly.version, v("1.0.0.0"));
    assert_eq!(
        assembly.full_name(),
        "Audio, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"
    );

    assert_eq!(reader.module_name().as_deref(), Some("Audio.dll"));

    let refs = reader.assembly_refs();
    assert_eq!(refs.len(), 3);
    assert_eq!(refs[0].name, "mscorlib");
    assert_eq!(refs[1].name, "System");
    assert_eq!(refs[2].name, "Foundation");
    assert_eq!(refs[2].version, v("1.8.5.0"));

    assert_eq!(reader.pinvoke_scopes(), vec!["native_audio".to_string()]);
    assert_eq!(reader.target_framework().as_deref(), Some(".NETFramework,Version=v4.5"));
}

#[test]
fn managed_inspector_reads_the_fixture_end_to_end() {
    let dir = tempdir().expect("tempdir");
    let path = write_fixture(dir.path(), "Audio.dll", MACHINE_I386, false, COR_FLAG_ILONLY);

    let module = InspectorPipeline::new(vec![Box::new(ManagedInspector::new())])
        .run(&path)
        .expect("inspect");

    assert!(module.loader_error.is_empty());
    assert_eq!(module.binary_kind, BinaryKind::Managed);
    assert_eq!(module.platform, Platform::AnyCpu);
    assert_eq!(module.binary_name, "Audio");
    assert_eq!(module.version, Some(v("1.0.0.0")));
    assert_eq!(
        module.full_name.as_deref(),
        Some("Audio, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null")
    );
    assert_eq!(module.framework_id, ".NETFramework,Version=v4.5");
    assert_eq!(module.framework.kind, FrameworkKind::Framework);
    assert_eq!(module.framework.version, v("4.5.0.0"));
    assert_eq!(module.content_hash.len(), 32);

    // mscorlib and System are skipped; Foundation and the platform-invoke
    // scope remain.
    assert_eq!(module.references.len(), 2);
    assert_eq!(module.references[0].binary_name, "Foundation");
    assert_eq!(module.references[0].kind, ReferenceKind::ManagedRef);
    assert_eq!(module.references[0].declared_version, Some(v("1.8.5.0")));
    assert_eq!(module.references[0].effective_version, Some(v("1.8.5.0")));
    assert_eq!(module.references[1].binary_name, "native_audio");
    assert_eq!(module.references[1].kind, ReferenceKind::PlatformInvoke);
    assert_eq!(module.references[1].declared_version, None);
}

#[test]
fn platform_precedence_over_machine_and_flags() {
    let dir = tempdir().expect("tempdir");
    let cases = [
        ("anycpu.dll", MACHINE_I386, false, COR_FLAG_ILONLY, Platform::AnyCpu),
        (
            "prefer32.dll",
            MACHINE_I386,
            false,
            COR_FLAG_ILONLY | COR_FLAG_32BIT_REQUIRED | COR_FLAG_32BIT_PREFERRED,
            Platform::AnyCpuPrefer32,
        ),
        ("amd64.dll", MACHINE_AMD64, true, COR_FLAG_ILONLY, Platform::Amd64),
        (
            "x86.dll",
            MACHINE_I386,
            false,
            COR_FLAG_ILONLY | COR_FLAG_32BIT_REQUIRED,
            Platform::X86,
        ),
    ];
    for (name, machine, pe32_plus, flags, expected) in cases {
        let path = write_fixture(dir.path(), name, machine, pe32_plus, flags);
        let module = ManagedInspector::new().inspect(&path).expect("inspect");
        assert_eq!(module.platform, expected, "platform for {name}");
    }
}

#[test]
fn sidecar_overrides_rewrite_the_fixture_references() {
    let dir = tempdir().expect("tempdir");
    let path = write_fixture(dir.path(), "Audio.dll", MACHINE_I386, false, COR_FLAG_ILONLY);
    std::fs::write(
        dir.path().join("Audio.dll.config"),
        r#"<configuration><runtime><assemblyBinding>
          <dependentAssembly>
            <assemblyIdentity name="Foundation" culture="neutral" />
            <bindingRedirect oldVersion="1.0.0.0-1.9.0.0" newVersion="1.8.5.5" />
            <codeBase version="1.8.5.5" href="Override/Foundation.dll" />
          </dependentAssembly>
        </assemblyBinding></runtime></configuration>"#,
    )
    .unwrap();

    let module = ManagedInspector::new().inspect(&path).expect("inspect");
    let foundation = &module.references[0];
    assert_eq!(foundation.declared_version, Some(v("1.8.5.0")));
    assert_eq!(foundation.effective_version, Some(v("1.8.5.5")));
    assert_eq!(foundation.codebase_hint.as_deref(), Some("Override/Foundation.dll"));
}

#[test]
fn non_pe_bytes_are_a_soft_failure() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("fake.dll");
    std::fs::write(&path, b"this is not a portable executable").unwrap();

    let module = InspectorPipeline::new(vec![Box::new(ManagedInspector::new())])
        .run(&path)
        .expect("pipeline");
    assert_eq!(module.binary_kind, BinaryKind::Unknown);
    assert!(!module.loader_error.is_empty());
    assert_eq!(module.binary_name, "fake");
    assert_eq!(module.content_hash.len(), 32);
}

#[test]
fn pe_without_clr_header_is_not_a_managed_module() {
    let dir = tempdir().expect("tempdir");
    // Zero directory count: parseable PE, no CLR directory.
    let mut image = build_image(MACHINE_I386, false, COR_FLAG_ILONLY);
    let optional = 0x58usize;
    image[optional + 92..optional + 96].copy_from_slice(&0u32.to_le_bytes());
    let path = dir.path().join("plain.dll");
    std::fs::write(&path, image).unwrap();

    let module = ManagedInspector::new().inspect(&path).expect("inspect");
    assert_eq!(module.loader_error, "File is not a managed module");
}
