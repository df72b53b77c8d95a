use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A four-part module version.
///
/// Parsing accepts one to four dot-separated numeric parts; missing parts
/// default to zero, so `"1.2"` and `"1.2.0.0"` denote the same version.
/// Ordering is lexicographic over (major, minor, build, revision).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ModuleVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionParseError {
    #[error("Empty version string")]
    Empty,
    #[error("Invalid version part {part:?} in {text:?}")]
    InvalidPart { text: String, part: String },
    #[error("Too many version parts in {0:?}")]
    TooManyParts(String),
}

impl ModuleVersion {
    pub fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self { major, minor, build, revision }
    }
}

impl FromStr for ModuleVersion {
    type Err = VersionParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(VersionParseError::Empty);
        }
        let mut parts = [0u32; 4];
        let mut count = 0;
        for part in trimmed.split('.') {
            if count == 4 {
                return Err(VersionParseError::TooManyParts(trimmed.to_string()));
            }
            parts[count] = part.trim().parse().map_err(|_| VersionParseError::InvalidPart {
                text: trimmed.to_string(),
                part: part.to_string(),
            })?;
            count += 1;
        }
        Ok(Self { major: parts[0], minor: parts[1], build: parts[2], revision: parts[3] })
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.build, self.revision)
    }
}
