//! Source catalog: the mapping from logical source names to raster files.
//!
//! The catalog is built once at startup, either by scanning a raster directory
//! or from explicit `name=path` mappings (or both, explicit mappings winning).
//! It decides which names exist at all: a tile request for a name outside the
//! catalog is an unknown source, never an open attempt.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, warn};

/// Suffix stripped from file stems when deriving source names.
pub const COG_SUFFIX: &str = "_cog";

/// File extensions recognised during discovery (compared case-insensitively).
const RASTER_EXTENSIONS: &[&str] = &["tif", "tiff"];

/// An explicit `name=path` source mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMapping {
    pub name: String,
    pub path: PathBuf,
}

impl FromStr for SourceMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, path) = s
            .split_once('=')
            .ok_or_else(|| format!("expected name=path, got '{}'", s))?;

        let name = name.trim();
        let path = path.trim();

        if !is_valid_name(name) {
            return Err(format!("invalid source name '{}'", name));
        }
        if path.is_empty() {
            return Err(format!("empty path for source '{}'", name));
        }

        Ok(Self {
            name: name.to_string(),
            path: PathBuf::from(path),
        })
    }
}

impl fmt::Display for SourceMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.path.display())
    }
}

/// Names end up as a single URL path segment.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.chars().any(char::is_whitespace)
}

/// Derive a source name from a raster file name.
///
/// Returns `None` for files without a raster extension. A trailing `_cog` on
/// the stem is dropped, so `satellite_2024_cog.tif` serves as
/// `satellite_2024`.
pub fn source_name(file_name: &str) -> Option<String> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if !RASTER_EXTENSIONS
        .iter()
        .any(|ext| extension.eq_ignore_ascii_case(ext))
    {
        return None;
    }

    let name = stem.strip_suffix(COG_SUFFIX).unwrap_or(stem);
    is_valid_name(name).then(|| name.to_string())
}

/// Sorted mapping of source names to raster paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCatalog {
    entries: BTreeMap<String, PathBuf>,
}

impl SourceCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `dir` for raster files.
    ///
    /// A missing or unreadable directory yields an empty catalog. When two
    /// files map to the same name (`a.tif` and `a_cog.tif`), the `_cog` file
    /// wins.
    pub fn discover(dir: &Path) -> Self {
        let mut catalog = Self::new();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Raster directory not readable");
                return catalog;
            }
        };

        let mut files: Vec<(String, PathBuf)> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let file_name = entry.file_name().to_str()?.to_string();
                Some((file_name, entry.path()))
            })
            .collect();
        files.sort();

        for (file_name, path) in files {
            if let Some(name) = source_name(&file_name) {
                let is_cog = file_name.contains(COG_SUFFIX);
                if catalog.contains(&name) && !is_cog {
                    continue;
                }
                debug!(source = %name, path = %path.display(), "Discovered raster");
                catalog.entries.insert(name, path);
            }
        }

        catalog
    }

    /// Add or replace a source.
    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.entries.insert(name.into(), path.into());
    }

    /// Apply explicit mappings on top of the current entries.
    pub fn with_mappings(mut self, mappings: &[SourceMapping]) -> Self {
        for mapping in mappings {
            self.insert(mapping.name.clone(), mapping.path.clone());
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Path of the raster backing `name`.
    pub fn path(&self, name: &str) -> Option<&Path> {
        self.entries.get(name).map(PathBuf::as_path)
    }

    /// Source names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
