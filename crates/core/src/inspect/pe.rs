//! Minimal PE image reader.
//!
//! Decodes only the header fields the inspectors need: the COFF machine
//! word, the optional-header magic (PE32 vs PE32+), the section table for
//! RVA translation, and the CLR runtime header when present. Everything else
//! in the image is opaque.

use thiserror::Error;

pub const MACHINE_I386: u16 = 0x014c;
pub const MACHINE_AMD64: u16 = 0x8664;

/// CLR header flag: IL-only image.
pub const COR_FLAG_ILONLY: u32 = 0x0000_0001;
/// CLR header flag: image requires a 32-bit process.
pub const COR_FLAG_32BIT_REQUIRED: u32 = 0x0000_0002;
/// CLR header flag: image prefers a 32-bit process but runs anywhere.
pub const COR_FLAG_32BIT_PREFERRED: u32 = 0x0002_0000;

#[derive(Debug, Error)]
pub enum PeError {
    #[error("File is not a PE image")]
    NotPe,
    #[error("Truncated PE image at offset {0}")]
    Truncated(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct ClrHeader {
    pub flags: u32,
    pub metadata_rva: u32,
    pub metadata_size: u32,
}

#[derive(Debug, Clone, Copy)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_offset: u32,
    raw_size: u32,
}

/// Decoded header view over a PE image.
#[derive(Debug)]
pub struct PeInfo {
    pub machine: u16,
    /// True for PE32+ (64-bit optional header) images.
    pub pe32_plus: bool,
    pub clr: Option<ClrHeader>,
    sections: Vec<Section>,
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<u16, PeError> {
    let slice = bytes.get(offset..offset + 2).ok_or(PeError::Truncated(offset))?;
    Ok(u16::from_le_bytes([slice[0], slice[1]]))
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, PeError> {
    let slice = bytes.get(offset..offset + 4).ok_or(PeError::Truncated(offset))?;
    Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

impl PeInfo {
    pub fn parse(bytes: &[u8]) -> Result<Self, PeError> {
        if bytes.len() < 0x40 || &bytes[0..2] != b"MZ" {
            return Err(PeError::NotPe);
        }
        let pe_offset = read_u32(bytes, 0x3c)? as usize;
        if bytes.get(pe_offset..pe_offset + 4) != Some(b"PE\0\0".as_slice()) {
            return Err(PeError::NotPe);
        }

        let coff = pe_offset + 4;
        let machine = read_u16(bytes, coff)?;
        let section_count = read_u16(bytes, coff + 2)? as usize;
        let optional_size = read_u16(bytes, coff + 16)? as usize;
        let optional = coff + 20;
        if optional_size < 2 {
            return Err(PeError::NotPe);
        }

        let magic = read_u16(bytes, optional)?;
        let pe32_plus = match magic {
            0x010b => false,
            0x020b => true,
            _ => return Err(PeError::NotPe),
        };

        // Data-directory array position depends on the optional-header shape.
        let (dir_count_offset, dir_offset) =
            if pe32_plus { (optional + 108, optional + 112) } else { (optional + 92, optional + 96) };

        let mut sections = Vec::with_capacity(section_count);
        let section_table = optional + optional_size;
        for index in 0..section_count {
            let entry = section_table + index * 40;
            sections.push(Section {
                virtual_size: read_u32(bytes, entry + 8)?,
                virtual_address: read_u32(bytes, entry + 12)?,
                raw_size: read_u32(bytes, entry + 16)?,
                raw_offset: read_u32(bytes, entry + 20)?,
            });
        }

        let mut info = Self { machine, pe32_plus, clr: None, sections };

        // Directory 14 is the CLR runtime header.
        let dir_count = read_u32(bytes, dir_count_offset)? as usize;
        if dir_count > 14 {
            let clr_rva = read_u32(bytes, dir_offset + 14 * 8)?;
            let clr_size = read_u32(bytes, dir_offset + 14 * 8 + 4)?;
            if clr_rva != 0 && clr_size >= 24 {
                if let Some(clr_offset) = info.rva_to_offset(clr_rva) {
                    info.clr = Some(ClrHeader {
                        metadata_rva: read_u32(bytes, clr_offset + 8)?,
                        metadata_size: read_u32(bytes, clr_offset + 12)?,
                        flags: read_u32(bytes, clr_offset + 16)?,
                    });
                }
            }
        }

        Ok(info)
    }

    /// Translate an RVA into a file offset through the section table.
    pub fn rva_to_offset(&self, rva: u32) -> Option<usize> {
        for section in &self.sections {
            let span = section.virtual_size.max(section.raw_size);
            if rva >= section.virtual_address && rva < section.virtual_address.saturating_add(span)
            {
                let delta = rva - section.virtual_address;
                if delta < section.raw_size {
                    return Some((section.raw_offset + delta) as usize);
                }
                return None;
            }
        }
        None
    }
}
