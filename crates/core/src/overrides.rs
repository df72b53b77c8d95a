//! Sidecar binding-override configuration.
//!
//! A binary at `app.dll` may carry an `app.dll.config` XML document whose
//! `dependentAssembly` elements declare version redirects and codebase hints.
//! Parsing is best-effort in document order: malformed rules are skipped with
//! a warning and a malformed document yields no rules; the parser never
//! errors.

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

use crate::model::{ModuleVersion, Reference};

/// One redirect or codebase rule targeting a binary name.
///
/// Codebase entries are singleton-range redirects that map a version to
/// itself and attach a hint path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRule {
    pub name: String,
    /// Inclusive `[min, max]` range of versions the rule applies to.
    pub old_range: (ModuleVersion, ModuleVersion),
    pub new_version: Option<ModuleVersion>,
    pub codebase: Option<String>,
}

/// Read `<binary_path>.config` and collect its override rules in document
/// order. A missing or unparsable document yields an empty list.
pub fn parse_sidecar_config(binary_path: &Path) -> Vec<OverrideRule> {
    let mut config_path = binary_path.as_os_str().to_owned();
    config_path.push(".config");
    let config_path = Path::new(&config_path);
    if !config_path.is_file() {
        return Vec::new();
    }
    let content = match std::fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(err) => {
            warn!(path = %config_path.display(), error = %err, "failed to read sidecar config");
            return Vec::new();
        }
    };
    match parse_config_document(&content) {
        Ok(rules) => rules,
        Err(err) => {
            warn!(path = %config_path.display(), error = %err, "failed to parse sidecar config");
            Vec::new()
        }
    }
}

/// Parse the XML text of a sidecar config document.
pub fn parse_config_document(content: &str) -> Result<Vec<OverrideRule>, quick_xml::Error> {
    let mut reader = Reader::from_str(content);
    let mut rules = Vec::new();
    let mut in_dependent_assembly = false;
    let mut current_name: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element) => {
                match element.name().as_ref() {
                    b"dependentAssembly" => {
                        in_dependent_assembly = true;
                        current_name = None;
                    }
                    b"assemblyIdentity" if in_dependent_assembly => {
                        if let Some(name) = attribute(&element, "name") {
                            current_name = Some(name);
                        }
                    }
                    b"bindingRedirect" => {
                        if let Some(name) = current_name.as_deref() {
                            if let Some(rule) = redirect_rule(name, &element) {
                                rules.push(rule);
                            }
                        }
                    }
                    b"codeBase" => {
                        if let Some(name) = current_name.as_deref() {
                            if let Some(rule) = codebase_rule(name, &element) {
                                rules.push(rule);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(element) => {
                if element.name().as_ref() == b"dependentAssembly" {
                    in_dependent_assembly = false;
                    current_name = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rules)
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Option<String> {
    element
        .try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.into_owned())
}

fn parse_version(name: &str, text: &str) -> Option<ModuleVersion> {
    match text.parse() {
        Ok(version) => Some(version),
        Err(err) => {
            warn!(assembly = name, version = text, error = %err, "skipping malformed redirect");
            None
        }
    }
}

fn redirect_rule(name: &str, element: &BytesStart<'_>) -> Option<OverrideRule> {
    let old_version = attribute(element, "oldVersion")?;
    let new_version = attribute(element, "newVersion")?;
    let (min_text, max_text) = match old_version.split_once('-') {
        Some((min, max)) => (min, max),
        None => (old_version.as_str(), old_version.as_str()),
    };
    let min = parse_version(name, min_text)?;
    let max = parse_version(name, max_text)?;
    let new_version = parse_version(name, &new_version)?;
    Some(OverrideRule {
        name: name.to_string(),
        old_range: (min, max),
        new_version: Some(new_version),
        codebase: None,
    })
}

fn codebase_rule(name: &str, element: &BytesStart<'_>) -> Option<OverrideRule> {
    let version_text = attribute(element, "version")?;
    let href = attribute(element, "href")?;
    let version = parse_version(name, &version_text)?;
    Some(OverrideRule {
        name: name.to_string(),
        old_range: (version, version),
        new_version: Some(version),
        codebase: Some(href),
    })
}

/// Bound on override passes; application reaches a fixpoint well before it.
const MAX_OVERRIDE_PASSES: usize = 5;

/// Rewrite each reference's effective version and codebase hint against the
/// rule set, iterating to a fixpoint.
///
/// Name comparison is case-insensitive and the version range is inclusive.
/// References with no effective version (platform-invoke targets) are left
/// untouched. A second application over the same rules makes no change.
pub fn apply_overrides(references: &mut [Reference], rules: &[OverrideRule]) {
    if rules.is_empty() {
        return;
    }
    for _ in 0..MAX_OVERRIDE_PASSES {
        let mut changed = false;
        for reference in references.iter_mut() {
            for rule in rules {
                let Some(effective) = reference.effective_version else {
                    continue;
                };
                if !rule.name.eq_ignore_ascii_case(&reference.binary_name) {
                    continue;
                }
                if effective < rule.old_range.0 || effective > rule.old_range.1 {
                    continue;
                }
                if let Some(new_version) = rule.new_version {
                    if new_version != effective {
                        reference.effective_version = Some(new_version);
                        changed = true;
                    }
                }
                if let Some(codebase) = rule.codebase.as_deref() {
                    if !codebase.is_empty() && reference.codebase_hint.as_deref() != Some(codebase)
                    {
                        reference.codebase_hint = Some(codebase.to_string());
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }
}
