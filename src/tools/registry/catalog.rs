//! Tool catalog: lightweight, always-resident metadata for every known
//! tool, loaded without constructing (or loading the code for) the tool
//! itself. Built-ins are registered directly; a `tools/` manifest directory
//! under the data dir can add further entries, scanned the way the plugin
//! loader discovers plugin directories — one bad manifest is logged and
//! skipped, never aborting the whole scan.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

const MANIFEST_EXT: &str = "json";

/// Catalog-level metadata for a tool: enough to rank and describe it
/// without having loaded its implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub priority: u8,
    /// Present only for manifest-discovered entries; built-ins have none.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_path: Option<PathBuf>,
}

/// One manifest file under a scanned tool directory, e.g.
/// `DATA_DIR/tools/weather.json`.
#[derive(Debug, Deserialize)]
struct ToolManifest {
    name: String,
    description: String,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    sensitive: bool,
    #[serde(default = "default_priority")]
    priority: u8,
}

fn default_priority() -> u8 {
    50
}

/// A flat, name-keyed catalog built from built-in entries plus whatever a
/// manifest-directory scan discovers. The catalog never holds loaded tool
/// instances — that is the dynamic cache's job.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    entries: std::collections::HashMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog { entries: std::collections::HashMap::new() }
    }

    pub fn insert(&mut self, entry: CatalogEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<CatalogEntry> {
        self.entries.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn list(&self) -> Vec<&CatalogEntry> {
        let mut entries: Vec<&CatalogEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn by_category<'a>(&'a self, category: &'a str) -> Vec<&'a CatalogEntry> {
        self.list()
            .into_iter()
            .filter(|e| e.categories.iter().any(|c| c == category))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.list().into_iter().map(|e| e.name.clone()).collect()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.list().into_iter().map(|e| e.description.clone()).collect()
    }

    /// Scan a manifest directory and merge discovered entries in, skipping
    /// unreadable or malformed files with a warning rather than aborting.
    /// A missing directory is not an error — it simply contributes nothing.
    pub fn scan_dir(&mut self, dir: &Path) -> Result<usize> {
        if !dir.exists() || !dir.is_dir() {
            return Ok(0);
        }

        let mut added = 0;
        let read = std::fs::read_dir(dir)?;
        for entry in read.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXT) {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(contents) => match serde_json::from_str::<ToolManifest>(&contents) {
                    Ok(manifest) => {
                        self.insert(CatalogEntry {
                            name: manifest.name,
                            description: manifest.description,
                            categories: manifest.categories,
                            sensitive: manifest.sensitive,
                            priority: manifest.priority,
                            source_path: Some(path),
                        });
                        added += 1;
                    }
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed tool manifest"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "could not read tool manifest"),
            }
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            description: format!("{name} does things"),
            categories: vec!["misc".to_string()],
            sensitive: false,
            priority: 50,
            source_path: None,
        }
    }

    #[test]
    fn insert_and_get_round_trip() {
        let mut cat = Catalog::new();
        cat.insert(entry("alpha"));
        assert!(cat.contains("alpha"));
        assert_eq!(cat.get("alpha").unwrap().description, "alpha does things");
    }

    #[test]
    fn list_is_sorted_by_name() {
        let mut cat = Catalog::new();
        cat.insert(entry("zeta"));
        cat.insert(entry("alpha"));
        let names: Vec<String> = cat.list().into_iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn scan_dir_skips_malformed_manifests_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("good.json"),
            r#"{"name":"good_tool","description":"a good tool","categories":["misc"]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();

        let mut cat = Catalog::new();
        let added = cat.scan_dir(dir.path()).unwrap();
        assert_eq!(added, 1);
        assert!(cat.contains("good_tool"));
        assert!(!cat.contains("bad"));
    }

    #[test]
    fn scan_dir_on_missing_directory_is_not_an_error() {
        let mut cat = Catalog::new();
        let added = cat.scan_dir(Path::new("/does/not/exist")).unwrap();
        assert_eq!(added, 0);
    }
}
