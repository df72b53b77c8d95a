//! Reader for the CLI metadata block of a managed module.
//!
//! Decodes the metadata root, locates the `#~`/`#-` tables stream and the
//! `#Strings`/`#Blob` heaps, and walks exactly the tables the managed
//! inspector needs: Module, TypeRef, MemberRef, CustomAttribute, ModuleRef,
//! ImplMap, Assembly, and AssemblyRef. Row and index widths are computed for
//! the whole table set so the interesting tables can be located regardless of
//! which other tables the image carries.

use thiserror::Error;

use crate::model::ModuleVersion;

const METADATA_MAGIC: u32 = 0x424a_5342;

const TABLE_COUNT: usize = 0x2D;

const MODULE: usize = 0x00;
const TYPE_REF: usize = 0x01;
const TYPE_DEF: usize = 0x02;
const FIELD_PTR: usize = 0x03;
const FIELD: usize = 0x04;
const METHOD_PTR: usize = 0x05;
const METHOD_DEF: usize = 0x06;
const PARAM_PTR: usize = 0x07;
const PARAM: usize = 0x08;
const INTERFACE_IMPL: usize = 0x09;
const MEMBER_REF: usize = 0x0A;
const CONSTANT: usize = 0x0B;
const CUSTOM_ATTRIBUTE: usize = 0x0C;
const FIELD_MARSHAL: usize = 0x0D;
const DECL_SECURITY: usize = 0x0E;
const CLASS_LAYOUT: usize = 0x0F;
const FIELD_LAYOUT: usize = 0x10;
const STANDALONE_SIG: usize = 0x11;
const EVENT_MAP: usize = 0x12;
const EVENT_PTR: usize = 0x13;
const EVENT: usize = 0x14;
const PROPERTY_MAP: usize = 0x15;
const PROPERTY_PTR: usize = 0x16;
const PROPERTY: usize = 0x17;
const METHOD_SEMANTICS: usize = 0x18;
const METHOD_IMPL: usize = 0x19;
const MODULE_REF: usize = 0x1A;
const TYPE_SPEC: usize = 0x1B;
const IMPL_MAP: usize = 0x1C;
const FIELD_RVA: usize = 0x1D;
const ENC_LOG: usize = 0x1E;
const ENC_MAP: usize = 0x1F;
const ASSEMBLY: usize = 0x20;
const ASSEMBLY_PROCESSOR: usize = 0x21;
const ASSEMBLY_OS: usize = 0x22;
const ASSEMBLY_REF: usize = 0x23;
const ASSEMBLY_REF_PROCESSOR: usize = 0x24;
const ASSEMBLY_REF_OS: usize = 0x25;
const FILE: usize = 0x26;
const EXPORTED_TYPE: usize = 0x27;
const MANIFEST_RESOURCE: usize = 0x28;
const NESTED_CLASS: usize = 0x29;
const GENERIC_PARAM: usize = 0x2A;
const METHOD_SPEC: usize = 0x2B;
const GENERIC_PARAM_CONSTRAINT: usize = 0x2C;

/// HasCustomAttribute tag assigned to the Assembly table.
const HCA_TAG_ASSEMBLY: u32 = 14;
/// CustomAttributeType tag assigned to the MemberRef table.
const CAT_TAG_MEMBER_REF: u32 = 3;
/// MemberRefParent tag assigned to the TypeRef table.
const MRP_TAG_TYPE_REF: u32 = 1;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Metadata root signature mismatch")]
    BadMagic,
    #[error("Truncated metadata at offset {0}")]
    Truncated(usize),
    #[error("Metadata has no tables stream")]
    MissingTablesStream,
    #[error("Metadata declares unsupported table 0x{0:02x}")]
    UnsupportedTable(u32),
}

/// Identity carried by the Assembly table (or an AssemblyRef row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyIdentity {
    pub name: String,
    pub version: ModuleVersion,
    pub culture: String,
}

impl AssemblyIdentity {
    /// Render the four-part display name. Public-key tokens are not
    /// verified, so the token field is always `null`.
    pub fn full_name(&self) -> String {
        let culture = if self.culture.is_empty() { "neutral" } else { self.culture.as_str() };
        format!("{}, Version={}, Culture={}, PublicKeyToken=null", self.name, self.version, culture)
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u16(&mut self) -> Option<u16> {
        let slice = self.data.get(self.pos..self.pos + 2)?;
        self.pos += 2;
        Some(u16::from_le_bytes([slice[0], slice[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        let slice = self.data.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    fn index(&mut self, wide: bool) -> Option<u32> {
        if wide {
            self.u32()
        } else {
            self.u16().map(u32::from)
        }
    }

    fn skip(&mut self, count: usize) {
        self.pos += count;
    }
}

/// Index widths derived from the heap-size flags and row counts.
struct Widths {
    str_wide: bool,
    guid_wide: bool,
    blob_wide: bool,
    counts: [u32; 64],
}

impl Widths {
    fn heap(&self, wide: bool) -> usize {
        if wide {
            4
        } else {
            2
        }
    }

    fn str_size(&self) -> usize {
        self.heap(self.str_wide)
    }

    fn guid_size(&self) -> usize {
        self.heap(self.guid_wide)
    }

    fn blob_size(&self) -> usize {
        self.heap(self.blob_wide)
    }

    fn table_wide(&self, table: usize) -> bool {
        self.counts[table] > 0xFFFF
    }

    fn table_size(&self, table: usize) -> usize {
        self.heap(self.table_wide(table))
    }

    fn coded_wide(&self, bits: u32, members: &[usize]) -> bool {
        let max = members.iter().map(|&t| self.counts[t]).max().unwrap_or(0);
        max >= (1u32 << (16 - bits))
    }

    fn coded_size(&self, bits: u32, members: &[usize]) -> usize {
        self.heap(self.coded_wide(bits, members))
    }
}

const TYPE_DEF_OR_REF: (&[usize], u32) = (&[TYPE_DEF, TYPE_REF, TYPE_SPEC], 2);
const HAS_CONSTANT: (&[usize], u32) = (&[FIELD, PARAM, PROPERTY], 2);
const HAS_CUSTOM_ATTRIBUTE: (&[usize], u32) = (
    &[
        METHOD_DEF,
        FIELD,
        TYPE_REF,
        TYPE_DEF,
        PARAM,
        INTERFACE_IMPL,
        MEMBER_REF,
        MODULE,
        DECL_SECURITY,
        PROPERTY,
        EVENT,
        STANDALONE_SIG,
        MODULE_REF,
        TYPE_SPEC,
        ASSEMBLY,
        ASSEMBLY_REF,
        FILE,
        EXPORTED_TYPE,
        MANIFEST_RESOURCE,
        GENERIC_PARAM,
        GENERIC_PARAM_CONSTRAINT,
        METHOD_SPEC,
    ],
    5,
);
const HAS_FIELD_MARSHAL: (&[usize], u32) = (&[FIELD, PARAM], 1);
const HAS_DECL_SECURITY: (&[usize], u32) = (&[TYPE_DEF, METHOD_DEF, ASSEMBLY], 2);
const MEMBER_REF_PARENT: (&[usize], u32) =
    (&[TYPE_DEF, TYPE_REF, MODULE_REF, METHOD_DEF, TYPE_SPEC], 3);
const HAS_SEMANTICS: (&[usize], u32) = (&[EVENT, PROPERTY], 1);
const METHOD_DEF_OR_REF: (&[usize], u32) = (&[METHOD_DEF, MEMBER_REF], 1);
const MEMBER_FORWARDED: (&[usize], u32) = (&[FIELD, METHOD_DEF], 1);
const IMPLEMENTATION: (&[usize], u32) = (&[FILE, ASSEMBLY_REF, EXPORTED_TYPE], 2);
const CUSTOM_ATTRIBUTE_TYPE: (&[usize], u32) = (&[METHOD_DEF, MEMBER_REF], 3);
const RESOLUTION_SCOPE: (&[usize], u32) = (&[MODULE, MODULE_REF, ASSEMBLY_REF, TYPE_REF], 2);
const TYPE_OR_METHOD_DEF: (&[usize], u32) = (&[TYPE_DEF, METHOD_DEF], 1);

fn coded(widths: &Widths, family: (&[usize], u32)) -> usize {
    widths.coded_size(family.1, family.0)
}

/// Physical row size for a table, per the published row schemas.
fn row_size(table: usize, w: &Widths) -> Result<usize, MetadataError> {
    let size = match table {
        MODULE => 2 + w.str_size() + 3 * w.guid_size(),
        TYPE_REF => coded(w, RESOLUTION_SCOPE) + 2 * w.str_size(),
        TYPE_DEF => {
            4 + 2 * w.str_size()
                + coded(w, TYPE_DEF_OR_REF)
                + w.table_size(FIELD)
                + w.table_size(METHOD_DEF)
        }
        FIELD_PTR => w.table_size(FIELD),
        FIELD => 2 + w.str_size() + w.blob_size(),
        METHOD_PTR => w.table_size(METHOD_DEF),
        METHOD_DEF => 4 + 2 + 2 + w.str_size() + w.blob_size() + w.table_size(PARAM),
        PARAM_PTR => w.table_size(PARAM),
        PARAM => 2 + 2 + w.str_size(),
        INTERFACE_IMPL => w.table_size(TYPE_DEF) + coded(w, TYPE_DEF_OR_REF),
        MEMBER_REF => coded(w, MEMBER_REF_PARENT) + w.str_size() + w.blob_size(),
        CONSTANT => 2 + coded(w, HAS_CONSTANT) + w.blob_size(),
        CUSTOM_ATTRIBUTE => {
            coded(w, HAS_CUSTOM_ATTRIBUTE) + coded(w, CUSTOM_ATTRIBUTE_TYPE) + w.blob_size()
        }
        FIELD_MARSHAL => coded(w, HAS_FIELD_MARSHAL) + w.blob_size(),
        DECL_SECURITY => 2 + coded(w, HAS_DECL_SECURITY) + w.blob_size(),
        CLASS_LAYOUT => 2 + 4 + w.table_size(TYPE_DEF),
        FIELD_LAYOUT => 4 + w.table_size(FIELD),
        STANDALONE_SIG => w.blob_size(),
        EVENT_MAP => w.table_size(TYPE_DEF) + w.table_size(EVENT),
        EVENT_PTR => w.table_size(EVENT),
        EVENT => 2 + w.str_size() + coded(w, TYPE_DEF_OR_REF),
        PROPERTY_MAP => w.table_size(TYPE_DEF) + w.table_size(PROPERTY),
        PROPERTY_PTR => w.table_size(PROPERTY),
        PROPERTY => 2 + w.str_size() + w.blob_size(),
        METHOD_SEMANTICS => 2 + w.table_size(METHOD_DEF) + coded(w, HAS_SEMANTICS),
        METHOD_IMPL => w.table_size(TYPE_DEF) + 2 * coded(w, METHOD_DEF_OR_REF),
        MODULE_REF => w.str_size(),
        TYPE_SPEC => w.blob_size(),
        IMPL_MAP => 2 + coded(w, MEMBER_FORWARDED) + w.str_size() + w.table_size(MODULE_REF),
        FIELD_RVA => 4 + w.table_size(FIELD),
        ENC_LOG => 4 + 4,
        ENC_MAP => 4,
        ASSEMBLY => 4 + 4 * 2 + 4 + w.blob_size() + 2 * w.str_size(),
        ASSEMBLY_PROCESSOR => 4,
        ASSEMBLY_OS => 4 * 3,
        ASSEMBLY_REF => 4 * 2 + 4 + 2 * w.blob_size() + 2 * w.str_size(),
        ASSEMBLY_REF_PROCESSOR => 4 + w.table_size(ASSEMBLY_REF),
        ASSEMBLY_REF_OS => 4 * 3 + w.table_size(ASSEMBLY_REF),
        FILE => 4 + w.str_size() + w.blob_size(),
        EXPORTED_TYPE => 4 + 4 + 2 * w.str_size() + coded(w, IMPLEMENTATION),
        MANIFEST_RESOURCE => 4 + 4 + w.str_size() + coded(w, IMPLEMENTATION),
        NESTED_CLASS => 2 * w.table_size(TYPE_DEF),
        GENERIC_PARAM => 2 + 2 + coded(w, TYPE_OR_METHOD_DEF) + w.str_size(),
        METHOD_SPEC => coded(w, METHOD_DEF_OR_REF) + w.blob_size(),
        GENERIC_PARAM_CONSTRAINT => w.table_size(GENERIC_PARAM) + coded(w, TYPE_DEF_OR_REF),
        other => return Err(MetadataError::UnsupportedTable(other as u32)),
    };
    Ok(size)
}

/// Parsed view over one module's metadata block.
pub struct MetadataReader<'a> {
    strings: &'a [u8],
    blobs: &'a [u8],
    rows: &'a [u8],
    widths: Widths,
    row_sizes: [usize; TABLE_COUNT],
    offsets: [usize; TABLE_COUNT],
}

impl<'a> MetadataReader<'a> {
    /// Parse the metadata block found at the CLR header's metadata directory.
    pub fn parse(metadata: &'a [u8]) -> Result<Self, MetadataError> {
        let mut root = Cursor::new(metadata);
        if root.u32().ok_or(MetadataError::Truncated(0))? != METADATA_MAGIC {
            return Err(MetadataError::BadMagic);
        }
        root.skip(8); // major, minor, reserved
        let version_len = root.u32().ok_or(MetadataError::Truncated(root.pos))? as usize;
        root.skip((version_len + 3) & !3);
        root.skip(2); // flags
        let stream_count = root.u16().ok_or(MetadataError::Truncated(root.pos))? as usize;

        let mut tables_slice: Option<&[u8]> = None;
        let mut strings: &[u8] = &[];
        let mut blobs: &[u8] = &[];
        for _ in 0..stream_count {
            let offset = root.u32().ok_or(MetadataError::Truncated(root.pos))? as usize;
            let size = root.u32().ok_or(MetadataError::Truncated(root.pos))? as usize;
            let name_start = root.pos;
            let mut name_end = name_start;
            while metadata.get(name_end).copied().unwrap_or(0) != 0 {
                name_end += 1;
            }
            let name = &metadata[name_start..name_end];
            // Stream names are NUL-terminated and padded to a 4-byte boundary.
            root.pos = name_start + ((name_end - name_start + 1 + 3) & !3);

            let stream = metadata
                .get(offset..offset.saturating_add(size))
                .ok_or(MetadataError::Truncated(offset))?;
            match name {
                b"#~" | b"#-" => tables_slice = Some(stream),
                b"#Strings" => strings = stream,
                b"#Blob" => blobs = stream,
                _ => {}
            }
        }

        let tables = tables_slice.ok_or(MetadataError::MissingTablesStream)?;
        let mut cursor = Cursor::new(tables);
        cursor.skip(6); // reserved, major, minor
        let heap_sizes =
            *tables.get(6).ok_or(MetadataError::Truncated(6))?;
        cursor.skip(2); // heap sizes, reserved
        let valid_lo = cursor.u32().ok_or(MetadataError::Truncated(cursor.pos))? as u64;
        let valid_hi = cursor.u32().ok_or(MetadataError::Truncated(cursor.pos))? as u64;
        let valid = valid_lo | (valid_hi << 32);
        cursor.skip(8); // sorted mask

        let mut counts = [0u32; 64];
        for (table, count) in counts.iter_mut().enumerate() {
            if valid & (1u64 << table) != 0 {
                *count = cursor.u32().ok_or(MetadataError::Truncated(cursor.pos))?;
            }
        }
        if heap_sizes & 0x40 != 0 {
            cursor.skip(4); // undocumented extra-data word
        }

        let widths = Widths {
            str_wide: heap_sizes & 0x01 != 0,
            guid_wide: heap_sizes & 0x02 != 0,
            blob_wide: heap_sizes & 0x04 != 0,
            counts,
        };

        let mut row_sizes = [0usize; TABLE_COUNT];
        let mut offsets = [0usize; TABLE_COUNT];
        let mut position = 0usize;
        for table in 0..64 {
            if valid & (1u64 << table) == 0 {
                continue;
            }
            if table >= TABLE_COUNT {
                return Err(MetadataError::UnsupportedTable(table as u32));
            }
            let size = row_size(table, &widths)?;
            row_sizes[table] = size;
            offsets[table] = position;
            position += size * counts[table] as usize;
        }

        let rows = tables.get(cursor.pos..).ok_or(MetadataError::Truncated(cursor.pos))?;
        if rows.len() < position {
            return Err(MetadataError::Truncated(cursor.pos + rows.len()));
        }

        Ok(Self { strings, blobs, rows, widths, row_sizes, offsets })
    }

    fn row_count(&self, table: usize) -> u32 {
        self.widths.counts[table]
    }

    /// Raw bytes of a one-based row, `None` when out of range.
    fn row(&self, table: usize, rid: u32) -> Option<&'a [u8]> {
        if rid == 0 || rid > self.row_count(table) {
            return None;
        }
        let size = self.row_sizes[table];
        let start = self.offsets[table] + size * (rid - 1) as usize;
        self.rows.get(start..start + size)
    }

    fn string_at(&self, offset: u32) -> String {
        let start = offset as usize;
        let mut end = start;
        while self.strings.get(end).copied().unwrap_or(0) != 0 {
            end += 1;
        }
        String::from_utf8_lossy(self.strings.get(start..end).unwrap_or(&[])).into_owned()
    }

    fn blob_at(&self, offset: u32) -> Option<&'a [u8]> {
        let data = self.blobs;
        let mut pos = offset as usize;
        let first = *data.get(pos)?;
        let (length, prefix) = if first & 0x80 == 0 {
            ((first & 0x7f) as usize, 1)
        } else if first & 0xC0 == 0x80 {
            let second = *data.get(pos + 1)?;
            ((((first & 0x3f) as usize) << 8) | second as usize, 2)
        } else if first & 0xE0 == 0xC0 {
            let b1 = *data.get(pos + 1)?;
            let b2 = *data.get(pos + 2)?;
            let b3 = *data.get(pos + 3)?;
            (
                (((first & 0x1f) as usize) << 24)
                    | ((b1 as usize) << 16)
                    | ((b2 as usize) << 8)
                    | b3 as usize,
                4,
            )
        } else {
            return None;
        };
        pos += prefix;
        data.get(pos..pos + length)
    }

    /// Name from the Module table, when the table has its one row.
    pub fn module_name(&self) -> Option<String> {
        let mut cursor = Cursor::new(self.row(MODULE, 1)?);
        cursor.skip(2); // generation
        let name = cursor.index(self.widths.str_wide)?;
        Some(self.string_at(name))
    }

    /// Identity from the Assembly table, absent for pure netmodules.
    pub fn assembly(&self) -> Option<AssemblyIdentity> {
        let mut cursor = Cursor::new(self.row(ASSEMBLY, 1)?);
        cursor.skip(4); // hash algorithm
        let major = cursor.u16()?;
        let minor = cursor.u16()?;
        let build = cursor.u16()?;
        let revision = cursor.u16()?;
        cursor.skip(4); // flags
        cursor.skip(self.widths.blob_size()); // public key
        let name = cursor.index(self.widths.str_wide)?;
        let culture = cursor.index(self.widths.str_wide)?;
        Some(AssemblyIdentity {
            name: self.string_at(name),
            version: ModuleVersion::new(
                u32::from(major),
                u32::from(minor),
                u32::from(build),
                u32::from(revision),
            ),
            culture: self.string_at(culture),
        })
    }

    /// All AssemblyRef rows in table order.
    pub fn assembly_refs(&self) -> Vec<AssemblyIdentity> {
        let mut refs = Vec::new();
        for rid in 1..=self.row_count(ASSEMBLY_REF) {
            let Some(row) = self.row(ASSEMBLY_REF, rid) else {
                continue;
            };
            let mut cursor = Cursor::new(row);
            let (Some(major), Some(minor), Some(build), Some(revision)) =
                (cursor.u16(), cursor.u16(), cursor.u16(), cursor.u16())
            else {
                continue;
            };
            cursor.skip(4); // flags
            cursor.skip(self.widths.blob_size()); // public key or token
            let Some(name) = cursor.index(self.widths.str_wide) else {
                continue;
            };
            let Some(culture) = cursor.index(self.widths.str_wide) else {
                continue;
            };
            refs.push(AssemblyIdentity {
                name: self.string_at(name),
                version: ModuleVersion::new(
                    u32::from(major),
                    u32::from(minor),
                    u32::from(build),
                    u32::from(revision),
                ),
                culture: self.string_at(culture),
            });
        }
        refs
    }

    /// Distinct platform-invoke import scopes, deduplicated on the
    /// lower-cased module-ref name.
    pub fn pinvoke_scopes(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        for rid in 1..=self.row_count(IMPL_MAP) {
            let Some(row) = self.row(IMPL_MAP, rid) else {
                continue;
            };
            let mut cursor = Cursor::new(row);
            cursor.skip(2); // mapping flags
            cursor.skip(coded(&self.widths, MEMBER_FORWARDED));
            cursor.skip(self.widths.str_size()); // import name
            let Some(scope_rid) = cursor.index(self.widths.table_wide(MODULE_REF)) else {
                continue;
            };
            if let Some(name) = self.module_ref_name(scope_rid) {
                seen.insert(name.to_lowercase());
            }
        }
        seen.into_iter().collect()
    }

    fn module_ref_name(&self, rid: u32) -> Option<String> {
        let mut cursor = Cursor::new(self.row(MODULE_REF, rid)?);
        let name = cursor.index(self.widths.str_wide)?;
        Some(self.string_at(name))
    }

    /// Value of the assembly-level `TargetFrameworkAttribute`, when present.
    pub fn target_framework(&self) -> Option<String> {
        for rid in 1..=self.row_count(CUSTOM_ATTRIBUTE) {
            let row = self.row(CUSTOM_ATTRIBUTE, rid)?;
            let mut cursor = Cursor::new(row);
            let parent = cursor.index(self.widths.coded_wide(
                HAS_CUSTOM_ATTRIBUTE.1,
                HAS_CUSTOM_ATTRIBUTE.0,
            ))?;
            if parent & 0x1f != HCA_TAG_ASSEMBLY || parent >> 5 != 1 {
                continue;
            }
            let attr_type = cursor.index(self.widths.coded_wide(
                CUSTOM_ATTRIBUTE_TYPE.1,
                CUSTOM_ATTRIBUTE_TYPE.0,
            ))?;
            if attr_type & 0x7 != CAT_TAG_MEMBER_REF {
                continue;
            }
            if !self.member_ref_targets_type(attr_type >> 3, "TargetFrameworkAttribute") {
                continue;
            }
            let value = cursor.index(self.widths.blob_wide)?;
            if let Some(text) = self.blob_at(value).and_then(decode_attribute_string) {
                return Some(text);
            }
        }
        None
    }

    fn member_ref_targets_type(&self, rid: u32, type_name: &str) -> bool {
        let Some(row) = self.row(MEMBER_REF, rid) else {
            return false;
        };
        let mut cursor = Cursor::new(row);
        let Some(class) =
            cursor.index(self.widths.coded_wide(MEMBER_REF_PARENT.1, MEMBER_REF_PARENT.0))
        else {
            return false;
        };
        if class & 0x7 != MRP_TAG_TYPE_REF {
            return false;
        }
        self.type_ref_name(class >> 3).is_some_and(|name| name == type_name)
    }

    fn type_ref_name(&self, rid: u32) -> Option<String> {
        let mut cursor = Cursor::new(self.row(TYPE_REF, rid)?);
        cursor.skip(coded(&self.widths, RESOLUTION_SCOPE));
        let name = cursor.index(self.widths.str_wide)?;
        Some(self.string_at(name))
    }
}

/// Decode the single string argument of a custom-attribute value blob:
/// a `0x0001` prolog followed by a length-prefixed UTF-8 string.
fn decode_attribute_string(blob: &[u8]) -> Option<String> {
    if blob.len() < 3 || blob[0] != 0x01 || blob[1] != 0x00 {
        return None;
    }
    let rest = &blob[2..];
    let first = *rest.first()?;
    if first == 0xFF {
        return None;
    }
    let (length, prefix) = if first & 0x80 == 0 {
        ((first & 0x7f) as usize, 1)
    } else if first & 0xC0 == 0x80 {
        let second = *rest.get(1)?;
        ((((first & 0x3f) as usize) << 8) | second as usize, 2)
    } else if first & 0xE0 == 0xC0 {
        let b1 = *rest.get(1)?;
        let b2 = *rest.get(2)?;
        let b3 = *rest.get(3)?;
        (
            (((first & 0x1f) as usize) << 24)
                | ((b1 as usize) << 16)
                | ((b2 as usize) << 8)
                | b3 as usize,
            4,
        )
    } else {
        return None;
    };
    let bytes = rest.get(prefix..prefix + length)?;
    Some(String::from_utf8_lossy(bytes).into_owned())
}
