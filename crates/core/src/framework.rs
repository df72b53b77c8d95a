//! Target-framework identifiers and cross-framework binding legality.
//!
//! Identifiers look like `.NETFramework,Version=v4.5` and parse into a
//! structured kind + version pair. `legal` answers whether a module targeting
//! `source` may bind a module targeting `target` under the published
//! compatibility rules; the standard-target table is reproduced verbatim and
//! the Core-source-to-Framework-target rule is a deliberately coarse
//! approximation carried over from the runtime's documented behavior.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ModuleVersion;

/// Runtime flavor named by a target-framework identifier.
///
/// Declaration order is the wire encoding; do not reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FrameworkKind {
    Framework,
    Standard,
    CoreApp,
    #[default]
    Unknown,
}

impl FrameworkKind {
    pub fn token(self) -> &'static str {
        match self {
            FrameworkKind::Framework => ".NETFramework",
            FrameworkKind::Standard => ".NETStandard",
            FrameworkKind::CoreApp => ".NETCoreApp",
            FrameworkKind::Unknown => "",
        }
    }

    fn from_token(token: &str) -> Self {
        match token {
            ".NETFramework" => FrameworkKind::Framework,
            ".NETStandard" => FrameworkKind::Standard,
            ".NETCoreApp" => FrameworkKind::CoreApp,
            _ => FrameworkKind::Unknown,
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            FrameworkKind::Framework => 0,
            FrameworkKind::Standard => 1,
            FrameworkKind::CoreApp => 2,
            FrameworkKind::Unknown => 3,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(FrameworkKind::Framework),
            1 => Some(FrameworkKind::Standard),
            2 => Some(FrameworkKind::CoreApp),
            3 => Some(FrameworkKind::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameworkError {
    /// The legality table has no rule for this standard version.
    #[error("unsupported-standard-version: no compatibility rule for .NETStandard {0}")]
    UnsupportedStandardVersion(ModuleVersion),
}

/// Parsed kind + version of a target-framework identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FrameworkVersion {
    pub kind: FrameworkKind,
    pub version: ModuleVersion,
}

impl FrameworkVersion {
    pub fn new(kind: FrameworkKind, version: ModuleVersion) -> Self {
        Self { kind, version }
    }

    /// The value every unparsable identifier collapses to.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_known(&self) -> bool {
        self.kind != FrameworkKind::Unknown
    }

    /// Parse `kindToken(,Version=vX.Y[.Z[.W]])?`; any failure yields the
    /// unknown value rather than an error.
    pub fn parse(text: &str) -> Self {
        let mut segments = text.trim().split(',');
        let kind = FrameworkKind::from_token(segments.next().unwrap_or("").trim());
        if kind == FrameworkKind::Unknown {
            return Self::unknown();
        }
        let mut version = ModuleVersion::default();
        for segment in segments {
            let segment = segment.trim();
            if let Some(value) = segment.strip_prefix("Version=") {
                let value = value.strip_prefix('v').unwrap_or(value);
                match value.parse() {
                    Ok(parsed) => version = parsed,
                    Err(_) => return Self::unknown(),
                }
            }
        }
        Self { kind, version }
    }
}

impl fmt::Display for FrameworkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == FrameworkKind::Unknown {
            return Ok(());
        }
        write!(f, "{},Version=v{}", self.kind.token(), self.version)
    }
}

fn at_least(version: ModuleVersion, major: u32, minor: u32, build: u32) -> bool {
    version >= ModuleVersion::new(major, minor, build, 0)
}

/// Whether a module targeting `source` may legally bind a module targeting
/// `target`.
///
/// Fails only when `target` is a standard version the table does not cover.
pub fn legal(source: &FrameworkVersion, target: &FrameworkVersion) -> Result<bool, FrameworkError> {
    use FrameworkKind::*;

    if source.kind == Unknown || target.kind == Unknown {
        return Ok(true);
    }
    if source.kind == target.kind {
        return Ok(source.version >= target.version);
    }
    if target.kind == Standard {
        let sv = source.version;
        return match (target.version.major, target.version.minor) {
            (1, 0) | (1, 1) => Ok(true),
            (1, 2) => Ok(match source.kind {
                Framework => at_least(sv, 4, 5, 1),
                _ => true,
            }),
            (1, 3) => Ok(match source.kind {
                Framework => at_least(sv, 4, 6, 0),
                _ => true,
            }),
            (1, 4) | (1, 5) | (1, 6) => Ok(match source.kind {
                Framework => at_least(sv, 4, 6, 1),
                _ => true,
            }),
            (2, 0) => Ok(match source.kind {
                Framework => at_least(sv, 4, 6, 1),
                _ => at_least(sv, 2, 0, 0),
            }),
            (2, 1) => Ok(match source.kind {
                Framework => false,
                _ => at_least(sv, 3, 0, 0),
            }),
            _ => Err(FrameworkError::UnsupportedStandardVersion(target.version)),
        };
    }
    match (source.kind, target.kind) {
        // Coarse approximation carried over from the source rules.
        (CoreApp, Framework) => Ok(true),
        (Framework, CoreApp) => Ok(false),
        (Standard, CoreApp) => Ok(false),
        // Standard-targeting sources are not constrained against Framework
        // targets; only the cases above are flagged.
        _ => Ok(true),
    }
}
