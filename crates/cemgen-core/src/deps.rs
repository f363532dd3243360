//! Dependency tracking for incremental rebuilds.
//!
//! Three maps live under one read-write lock: content hashes per file,
//! forward dependencies per module (style imports and value imports),
//! and the reverse index from CSS files to the modules whose styles
//! import them. The reverse index is the only structure incremental
//! invalidation needs: a changed CSS file fans in to its dependents.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::error::AnalyzerError;

/// Forward dependencies of one module.
#[derive(Debug, Clone, Default)]
pub struct ModuleDeps {
    /// Resolved module paths of CSS files the module's styles import.
    pub style_imports: Vec<String>,
    /// Resolved module paths of local value imports.
    pub imported_files: Vec<String>,
    pub last_modified: Option<SystemTime>,
}

#[derive(Debug, Default)]
struct TrackerState {
    file_hashes: HashMap<PathBuf, [u8; 32]>,
    module_deps: HashMap<String, ModuleDeps>,
    css_reverse_deps: HashMap<String, Vec<String>>,
}

/// Records module dependencies and file content hashes.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    state: RwLock<TrackerState>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a file's current content and store the digest.
    pub fn update_file_hash(&self, fs_path: &Path) -> Result<[u8; 32], AnalyzerError> {
        let digest = hash_file(fs_path)?;
        self.state
            .write()
            .file_hashes
            .insert(fs_path.to_path_buf(), digest);
        Ok(digest)
    }

    /// Whether a file's content differs from the stored digest. Unknown
    /// files count as changed.
    pub fn has_file_changed(&self, fs_path: &Path) -> bool {
        let stored = self.state.read().file_hashes.get(fs_path).copied();
        match (stored, hash_file(fs_path)) {
            (Some(stored), Ok(current)) => stored != current,
            _ => true,
        }
    }

    /// Record a module's dependencies, replacing previous entries and
    /// maintaining the reverse index.
    pub fn record_dependencies(
        &self,
        module_path: &str,
        style_imports: &[String],
        imported_files: &[String],
    ) {
        let mut state = self.state.write();

        // Remove stale reverse entries from a previous recording.
        if let Some(previous) = state.module_deps.get(module_path).cloned() {
            for css in &previous.style_imports {
                if let Some(dependents) = state.css_reverse_deps.get_mut(css) {
                    dependents.retain(|m| m != module_path);
                }
            }
        }

        let mut deps = ModuleDeps {
            style_imports: dedup(style_imports),
            imported_files: dedup(imported_files),
            last_modified: Some(SystemTime::now()),
        };
        deps.style_imports.sort();
        deps.imported_files.sort();

        for css in &deps.style_imports {
            let dependents = state.css_reverse_deps.entry(css.clone()).or_default();
            if !dependents.contains(&module_path.to_string()) {
                dependents.push(module_path.to_string());
            }
        }

        state.module_deps.insert(module_path.to_string(), deps);
    }

    /// Every module that directly matches a changed path, plus every
    /// module whose CSS dependencies include a changed CSS file.
    pub fn modules_affected_by(&self, changed_module_paths: &[String]) -> Vec<String> {
        let state = self.state.read();
        let mut affected: Vec<String> = Vec::new();

        for changed in changed_module_paths {
            if state.module_deps.contains_key(changed) {
                push_unique(&mut affected, changed.clone());
            }
            if let Some(dependents) = state.css_reverse_deps.get(changed) {
                for module in dependents {
                    push_unique(&mut affected, module.clone());
                }
            }
        }

        affected.sort();
        affected
    }

    /// Forward dependencies recorded for a module.
    pub fn dependencies_of(&self, module_path: &str) -> Option<ModuleDeps> {
        self.state.read().module_deps.get(module_path).cloned()
    }

    /// Number of tracked modules.
    pub fn tracked_modules(&self) -> usize {
        self.state.read().module_deps.len()
    }
}

/// SHA-256 of a file's content.
pub fn hash_file(path: &Path) -> Result<[u8; 32], AnalyzerError> {
    let content = std::fs::read(path).map_err(|e| AnalyzerError::source_read(path, e))?;
    Ok(hash_bytes(&content))
}

/// SHA-256 of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn dedup(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        push_unique(&mut out, item.clone());
    }
    out
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.contains(&value) {
        out.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_unknown_file_counts_as_changed() {
        let tracker = DependencyTracker::new();
        assert!(tracker.has_file_changed(Path::new("/does/not/exist.ts")));
    }

    #[test]
    fn test_hash_update_and_change_detection() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.ts");
        fs::write(&path, "export class A {}").unwrap();

        let tracker = DependencyTracker::new();
        tracker.update_file_hash(&path).unwrap();
        assert!(!tracker.has_file_changed(&path));

        fs::write(&path, "export class A { changed = true; }").unwrap();
        assert!(tracker.has_file_changed(&path));
    }

    #[test]
    fn test_css_reverse_index_fans_in() {
        let tracker = DependencyTracker::new();
        tracker.record_dependencies(
            "src/button.ts",
            &["src/button.css".to_string()],
            &[],
        );
        tracker.record_dependencies(
            "src/card.ts",
            &["src/button.css".to_string(), "src/card.css".to_string()],
            &[],
        );

        let affected = tracker.modules_affected_by(&["src/button.css".to_string()]);
        assert_eq!(affected, vec!["src/button.ts", "src/card.ts"]);
    }

    #[test]
    fn test_direct_module_change() {
        let tracker = DependencyTracker::new();
        tracker.record_dependencies("src/a.ts", &[], &[]);
        let affected = tracker.modules_affected_by(&["src/a.ts".to_string()]);
        assert_eq!(affected, vec!["src/a.ts"]);
    }

    #[test]
    fn test_rerecording_clears_stale_reverse_entries() {
        let tracker = DependencyTracker::new();
        tracker.record_dependencies("src/a.ts", &["src/old.css".to_string()], &[]);
        tracker.record_dependencies("src/a.ts", &["src/new.css".to_string()], &[]);

        assert!(tracker
            .modules_affected_by(&["src/old.css".to_string()])
            .is_empty());
        assert_eq!(
            tracker.modules_affected_by(&["src/new.css".to_string()]),
            vec!["src/a.ts"]
        );
    }

    #[test]
    fn test_dependencies_deduplicated() {
        let tracker = DependencyTracker::new();
        tracker.record_dependencies(
            "src/a.ts",
            &["src/x.css".to_string(), "src/x.css".to_string()],
            &["src/b.ts".to_string(), "src/b.ts".to_string()],
        );
        let deps = tracker.dependencies_of("src/a.ts").unwrap();
        assert_eq!(deps.style_imports.len(), 1);
        assert_eq!(deps.imported_files.len(), 1);
    }
}
