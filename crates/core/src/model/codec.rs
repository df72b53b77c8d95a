//! Compact positional binary layout for module records.
//!
//! Strings are varint-length-prefixed UTF-8, enumerations are 32-bit
//! little-endian integers in declaration order, collections are preceded by a
//! 32-bit count, and versions travel as their rendered string form (an empty
//! string marks an absent version). The layout is stable: decoding the bytes
//! produced by encoding yields a value-equal record.

use std::path::PathBuf;

use thiserror::Error;

use crate::framework::{FrameworkKind, FrameworkVersion};
use crate::model::{
    BinaryKind, ModuleData, ModuleVersion, PackageId, Platform, Reference, ReferenceKind,
};

/// Recoverable decode failure; callers surface it as a loader error rather
/// than propagating.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Unexpected end of input at offset {0}")]
    UnexpectedEof(usize),
    #[error("Varint exceeds 64 bits at offset {0}")]
    VarintOverflow(usize),
    #[error("Invalid UTF-8 in string at offset {0}")]
    InvalidUtf8(usize),
    #[error("Invalid version string {0:?}")]
    InvalidVersion(String),
    #[error("Invalid {field} discriminant {value}")]
    InvalidEnum { field: &'static str, value: u32 },
}

/// Append-only writer for the positional layout.
#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                break;
            }
            self.buf.push(byte | 0x80);
        }
    }

    pub fn put_str(&mut self, text: &str) {
        self.put_varint(text.len() as u64);
        self.buf.extend_from_slice(text.as_bytes());
    }

    fn put_opt_str(&mut self, text: Option<&str>) {
        self.put_str(text.unwrap_or(""));
    }

    fn put_opt_version(&mut self, version: Option<ModuleVersion>) {
        match version {
            Some(v) => self.put_str(&v.to_string()),
            None => self.put_str(""),
        }
    }
}

/// Cursor-style reader over the positional layout.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn take_u32(&mut self) -> Result<u32, CodecError> {
        if self.remaining() < 4 {
            return Err(CodecError::UnexpectedEof(self.pos));
        }
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn take_varint(&mut self) -> Result<u64, CodecError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof(self.pos))?;
            self.pos += 1;
            if shift >= 64 {
                return Err(CodecError::VarintOverflow(self.pos));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    pub fn take_str(&mut self) -> Result<String, CodecError> {
        let len = self.take_varint()? as usize;
        if self.remaining() < len {
            return Err(CodecError::UnexpectedEof(self.pos));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        let text =
            std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8(self.pos))?.to_string();
        self.pos += len;
        Ok(text)
    }

    fn take_opt_str(&mut self) -> Result<Option<String>, CodecError> {
        let text = self.take_str()?;
        Ok(if text.is_empty() { None } else { Some(text) })
    }

    fn take_opt_version(&mut self) -> Result<Option<ModuleVersion>, CodecError> {
        let text = self.take_str()?;
        if text.is_empty() {
            return Ok(None);
        }
        text.parse().map(Some).map_err(|_| CodecError::InvalidVersion(text))
    }
}

fn encode_reference(enc: &mut Encoder, reference: &Reference) {
    enc.put_str(&reference.binary_name);
    enc.put_opt_version(reference.declared_version);
    enc.put_opt_version(reference.effective_version);
    enc.put_u32(reference.kind.to_u32());
    enc.put_opt_str(reference.full_name.as_deref());
    enc.put_opt_str(reference.codebase_hint.as_deref());
}

fn decode_reference(dec: &mut Decoder<'_>) -> Result<Reference, CodecError> {
    let binary_name = dec.take_str()?;
    let declared_version = dec.take_opt_version()?;
    let effective_version = dec.take_opt_version()?;
    let kind_raw = dec.take_u32()?;
    let kind = ReferenceKind::from_u32(kind_raw)
        .ok_or(CodecError::InvalidEnum { field: "reference kind", value: kind_raw })?;
    let full_name = dec.take_opt_str()?;
    let codebase_hint = dec.take_opt_str()?;
    Ok(Reference { binary_name, declared_version, effective_version, full_name, codebase_hint, kind })
}

impl ModuleData {
    /// Encode into the stable positional layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.put_opt_str(self.file_path.as_ref().and_then(|p| p.to_str()));
        enc.put_str(&self.binary_name);
        enc.put_opt_str(self.full_name.as_deref());
        enc.put_opt_version(self.version);
        enc.put_str(&self.framework_id);
        enc.put_u32(self.framework.kind.to_u32());
        enc.put_str(&self.framework.version.to_string());
        enc.put_u32(self.platform.to_u32());
        enc.put_u32(self.binary_kind.to_u32());
        enc.put_str(&self.content_hash);
        enc.put_str(&self.loader_error);
        enc.put_u32(self.references.len() as u32);
        for reference in &self.references {
            encode_reference(&mut enc, reference);
        }
        enc.put_u32(self.source_packages.len() as u32);
        for package in &self.source_packages {
            enc.put_str(&package.name);
            enc.put_str(&package.version);
        }
        enc.into_bytes()
    }

    /// Decode a record previously produced by [`ModuleData::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(bytes);
        let file_path = dec.take_opt_str()?.map(PathBuf::from);
        let binary_name = dec.take_str()?;
        let full_name = dec.take_opt_str()?;
        let version = dec.take_opt_version()?;
        let framework_id = dec.take_str()?;
        let kind_raw = dec.take_u32()?;
        let framework_kind = FrameworkKind::from_u32(kind_raw)
            .ok_or(CodecError::InvalidEnum { field: "framework kind", value: kind_raw })?;
        let framework_version_text = dec.take_str()?;
        let framework_version = framework_version_text
            .parse()
            .map_err(|_| CodecError::InvalidVersion(framework_version_text))?;
        let platform_raw = dec.take_u32()?;
        let platform = Platform::from_u32(platform_raw)
            .ok_or(CodecError::InvalidEnum { field: "platform", value: platform_raw })?;
        let binary_raw = dec.take_u32()?;
        let binary_kind = BinaryKind::from_u32(binary_raw)
            .ok_or(CodecError::InvalidEnum { field: "binary kind", value: binary_raw })?;
        let content_hash = dec.take_str()?;
        let loader_error = dec.take_str()?;
        let reference_count = dec.take_u32()?;
        let mut references = Vec::with_capacity(reference_count.min(1024) as usize);
        for _ in 0..reference_count {
            references.push(decode_reference(&mut dec)?);
        }
        let package_count = dec.take_u32()?;
        let mut source_packages = std::collections::BTreeSet::new();
        for _ in 0..package_count {
            let name = dec.take_str()?;
            let version = dec.take_str()?;
            source_packages.insert(PackageId::new(name, version));
        }
        Ok(Self {
            file_path,
            binary_name,
            full_name,
            version,
            framework_id,
            framework: FrameworkVersion { kind: framework_kind, version: framework_version },
            platform,
            binary_kind,
            content_hash,
            loader_error,
            references,
            source_packages,
        })
    }
}
