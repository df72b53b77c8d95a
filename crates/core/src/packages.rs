//! Local package-cache index.
//!
//! Walks one or more package root directories laid out as
//! `root/<packageName>/<versionDir>/…` and indexes every module file found
//! beneath a version directory. Queries answer "which package could have
//! supplied this module" by name and optional content hash. Hash computation
//! is amortized through a persistent cache file so repeated runs do not
//! re-read unchanged package contents.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::inspect::md5_file;
use crate::model::codec::{Decoder, Encoder};
use crate::model::{has_module_extension, trim_module_extension, PackageId};

/// Persistent map of file path to lower-case MD5 hex.
///
/// On-disk format: a 32-bit little-endian entry count followed by
/// varint-length-prefixed (path, hash) string pairs.
struct HashCache {
    path: PathBuf,
    entries: HashMap<PathBuf, String>,
}

impl HashCache {
    fn load(path: PathBuf) -> Self {
        let mut cache = Self { path, entries: HashMap::new() };
        let Ok(bytes) = std::fs::read(&cache.path) else {
            return cache;
        };
        let mut dec = Decoder::new(&bytes);
        let Ok(count) = dec.take_u32() else {
            return cache;
        };
        for _ in 0..count {
            let (Ok(file), Ok(hash)) = (dec.take_str(), dec.take_str()) else {
                warn!(path = %cache.path.display(), "hash cache is truncated; ignoring the rest");
                break;
            };
            cache.entries.insert(PathBuf::from(file), hash);
        }
        cache
    }

    fn store(&self) -> std::io::Result<()> {
        let mut enc = Encoder::new();
        enc.put_u32(self.entries.len() as u32);
        for (file, hash) in &self.entries {
            enc.put_str(&file.to_string_lossy());
            enc.put_str(hash);
        }
        std::fs::write(&self.path, enc.into_bytes())
    }

    fn hash_for(&mut self, file: &Path) -> Option<String> {
        if let Some(hash) = self.entries.get(file) {
            return Some(hash.clone());
        }
        match md5_file(file) {
            Ok(hash) => {
                self.entries.insert(file.to_path_buf(), hash.clone());
                Some(hash)
            }
            Err(err) => {
                warn!(file = %file.display(), error = %err, "failed to hash package file");
                None
            }
        }
    }
}

/// Immutable index over one or more package roots.
pub struct PackageIndex {
    entries: BTreeMap<PackageId, BTreeSet<PathBuf>>,
    hashes: Mutex<HashCache>,
}

impl PackageIndex {
    /// The per-user package cache, when a home directory is discoverable.
    pub fn default_roots() -> Vec<PathBuf> {
        dirs::home_dir().map(|home| home.join(".nuget").join("packages")).into_iter().collect()
    }

    pub fn default_hash_cache_path() -> PathBuf {
        std::env::temp_dir().join("bindscope-hash-cache.bin")
    }

    /// Build the index over `roots`, reading the default hash cache.
    pub fn initialize(roots: &[PathBuf]) -> Self {
        Self::initialize_with_cache(roots, Self::default_hash_cache_path())
    }

    /// Build the index over `roots` with an explicit hash-cache location.
    /// Unreadable directories and files are skipped, never fatal.
    pub fn initialize_with_cache(roots: &[PathBuf], hash_cache: PathBuf) -> Self {
        let mut entries: BTreeMap<PackageId, BTreeSet<PathBuf>> = BTreeMap::new();
        for root in roots {
            let packages = match std::fs::read_dir(root) {
                Ok(packages) => packages,
                Err(err) => {
                    debug!(root = %root.display(), error = %err, "skipping package root");
                    continue;
                }
            };
            for package_dir in packages.flatten() {
                if !package_dir.path().is_dir() {
                    continue;
                }
                let package_name = package_dir.file_name().to_string_lossy().into_owned();
                let versions = match std::fs::read_dir(package_dir.path()) {
                    Ok(versions) => versions,
                    Err(err) => {
                        warn!(package = %package_name, error = %err, "skipping package directory");
                        continue;
                    }
                };
                for version_dir in versions.flatten() {
                    let version_name = version_dir.file_name().to_string_lossy().into_owned();
                    if !version_dir.path().is_dir() || !is_version_dir_name(&version_name) {
                        continue;
                    }
                    let id = PackageId::new(package_name.clone(), version_name);
                    let files = entries.entry(id).or_default();
                    collect_module_files(&version_dir.path(), files);
                }
            }
        }
        Self { entries, hashes: Mutex::new(HashCache::load(hash_cache)) }
    }

    pub fn package_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Packages whose contents include a module named `name` (with or
    /// without its extension), optionally constrained to an exact content
    /// hash. Ordering is deterministic for a given index.
    pub fn resolve(&self, name: &str, hash: Option<&str>) -> Vec<(PackageId, PathBuf)> {
        let query = trim_module_extension(name);
        let mut matches = Vec::new();
        for (package, files) in &self.entries {
            for file in files {
                let stem_matches = file
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .is_some_and(|stem| stem.eq_ignore_ascii_case(query));
                if !stem_matches {
                    continue;
                }
                if let Some(expected) = hash {
                    let actual = self.hashes.lock().expect("hash cache lock").hash_for(file);
                    if !actual.is_some_and(|h| h.eq_ignore_ascii_case(expected)) {
                        continue;
                    }
                }
                matches.push((package.clone(), file.clone()));
            }
        }
        matches
    }

    /// Write the hash cache back to its persistent location.
    pub fn commit(&self) -> std::io::Result<()> {
        self.hashes.lock().expect("hash cache lock").store()
    }
}

/// Version directories must start with a digit and contain a dot;
/// letter-prefixed conventions like `v1.2` are intentionally not indexed.
fn is_version_dir_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_digit()) && name.contains('.')
}

fn collect_module_files(dir: &Path, out: &mut BTreeSet<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "skipping unreadable package subtree");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_module_files(&path, out);
        } else if has_module_extension(&path) {
            out.insert(path);
        }
    }
}
