//! Workspace context: the seam between the analysis engine and the host
//! project.
//!
//! The session reads sources, resolves module specifiers and writes the
//! output manifest exclusively through [`WorkspaceContext`], so tests can
//! substitute fixtures and the CLI can wire a real project directory via
//! [`FsWorkspace`].

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::error::AnalyzerError;

/// Generation options handed to the session by the host.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Input glob patterns (simple and double-star).
    pub files: Vec<String>,
    /// Exclusion glob patterns applied after expansion.
    pub exclude: Vec<String>,
    /// Output path for the serialized manifest, relative to the root.
    pub output: Option<String>,
    /// Glob matching demo files.
    pub demo_file_glob: Option<String>,
    /// Path to the design-token spec file, relative to the root.
    pub design_tokens_spec: Option<String>,
    /// Token name prefix applied during the design-token merge.
    pub design_tokens_prefix: Option<String>,
    /// Affected-module count beyond which an incremental run falls back
    /// to a full generation.
    pub incremental_threshold: usize,
    /// Watch debounce in milliseconds.
    pub debounce_ms: u64,
    pub verbose: bool,
}

impl GenerateOptions {
    pub fn with_files(files: Vec<String>) -> Self {
        Self {
            files,
            incremental_threshold: 3,
            debounce_ms: 100,
            ..Default::default()
        }
    }
}

/// The host package's manifest, as far as the engine needs it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackageManifest {
    pub name: String,
    pub exports: Option<serde_json::Value>,
    pub main: Option<String>,
    pub types: Option<String>,
    pub typings: Option<String>,
    #[serde(rename = "customElements")]
    pub custom_elements: Option<String>,
}

/// Host-project access used by the session and processors.
pub trait WorkspaceContext: Send + Sync {
    /// Project root directory.
    fn root(&self) -> &Path;

    /// Expand a glob pattern to matching file paths under the root.
    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>, AnalyzerError>;

    /// Read a source file as text.
    fn read_file(&self, path: &Path) -> Result<String, AnalyzerError>;

    /// Map a module path to its filesystem path.
    fn module_to_fs(&self, module_path: &str) -> PathBuf;

    /// Map a filesystem path back to a module path.
    fn fs_to_module(&self, fs_path: &Path) -> String;

    /// Resolve a specifier relative to a module. Returns `None` for
    /// bare (package) specifiers.
    fn resolve_dependency(&self, from_module: &str, specifier: &str) -> Option<String>;

    /// Open a writer for the output manifest.
    fn output_writer(&self, path: &Path) -> Result<Box<dyn Write + Send>, AnalyzerError>;

    /// The host package's manifest.
    fn package_manifest(&self) -> Result<PackageManifest, AnalyzerError>;

    /// Generation options.
    fn options(&self) -> &GenerateOptions;
}

/// Filesystem-backed workspace rooted at a project directory.
pub struct FsWorkspace {
    root: PathBuf,
    options: GenerateOptions,
}

impl FsWorkspace {
    pub fn new(root: impl Into<PathBuf>, options: GenerateOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    fn exclude_set(&self) -> Result<GlobSet, AnalyzerError> {
        build_glob_set(&self.options.exclude)
    }
}

impl WorkspaceContext for FsWorkspace {
    fn root(&self) -> &Path {
        &self.root
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>, AnalyzerError> {
        let glob = Glob::new(pattern)
            .map_err(|e| AnalyzerError::Resolve {
                specifier: pattern.to_string(),
                name: String::new(),
                message: e.to_string(),
            })?
            .compile_matcher();
        let exclude = self.exclude_set()?;

        let mut paths: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.root).ok()?;
                if glob.is_match(relative) && !exclude.is_match(relative) {
                    Some(entry.into_path())
                } else {
                    None
                }
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn read_file(&self, path: &Path) -> Result<String, AnalyzerError> {
        fs::read_to_string(path).map_err(|e| AnalyzerError::source_read(path, e))
    }

    fn module_to_fs(&self, module_path: &str) -> PathBuf {
        self.root.join(module_path)
    }

    fn fs_to_module(&self, fs_path: &Path) -> String {
        let relative = fs_path.strip_prefix(&self.root).unwrap_or(fs_path);
        path_to_module_string(relative)
    }

    fn resolve_dependency(&self, from_module: &str, specifier: &str) -> Option<String> {
        resolve_relative_specifier(from_module, specifier)
    }

    fn output_writer(&self, path: &Path) -> Result<Box<dyn Write + Send>, AnalyzerError> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(&absolute)?;
        Ok(Box::new(file))
    }

    fn package_manifest(&self) -> Result<PackageManifest, AnalyzerError> {
        let path = self.root.join("package.json");
        if !path.exists() {
            return Ok(PackageManifest::default());
        }
        let text = self.read_file(&path)?;
        serde_json::from_str(&text).map_err(AnalyzerError::Serialize)
    }

    fn options(&self) -> &GenerateOptions {
        &self.options
    }
}

/// Compile a list of patterns into one matcher; empty list matches nothing.
pub fn build_glob_set(patterns: &[String]) -> Result<GlobSet, AnalyzerError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| AnalyzerError::Resolve {
            specifier: pattern.clone(),
            name: String::new(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| AnalyzerError::Resolve {
        specifier: patterns.join(","),
        name: String::new(),
        message: e.to_string(),
    })
}

/// Normalize a relative path into forward-slash module form.
fn path_to_module_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.join("/")
}

/// Resolve `./` and `../` specifiers against the directory of the
/// importing module. Bare specifiers are not local dependencies.
pub fn resolve_relative_specifier(from_module: &str, specifier: &str) -> Option<String> {
    if !specifier.starts_with('.') {
        return None;
    }

    let mut segments: Vec<&str> = from_module.split('/').collect();
    segments.pop(); // drop the file name

    for part in specifier.split('/') {
        match part {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace(root: &Path) -> FsWorkspace {
        FsWorkspace::new(
            root,
            GenerateOptions::with_files(vec!["src/**/*.ts".to_string()]),
        )
    }

    #[test]
    fn test_glob_expansion_and_exclusion() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src/inner")).unwrap();
        fs::write(tmp.path().join("src/a.ts"), "export {};").unwrap();
        fs::write(tmp.path().join("src/inner/b.ts"), "export {};").unwrap();
        fs::write(tmp.path().join("src/a.test.ts"), "export {};").unwrap();
        fs::write(tmp.path().join("readme.md"), "# hi").unwrap();

        let mut options = GenerateOptions::with_files(vec!["src/**/*.ts".to_string()]);
        options.exclude = vec!["**/*.test.ts".to_string()];
        let ws = FsWorkspace::new(tmp.path(), options);

        let paths = ws.glob("src/**/*.ts").unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| !p.to_string_lossy().contains("test")));
    }

    #[test]
    fn test_module_path_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace(tmp.path());
        let module = "src/components/button.ts";
        let fs_path = ws.module_to_fs(module);
        assert_eq!(ws.fs_to_module(&fs_path), module);
    }

    #[test]
    fn test_resolve_relative_specifier() {
        assert_eq!(
            resolve_relative_specifier("src/components/button.ts", "./button.css"),
            Some("src/components/button.css".to_string())
        );
        assert_eq!(
            resolve_relative_specifier("src/components/button.ts", "../shared/tokens.css"),
            Some("src/shared/tokens.css".to_string())
        );
        assert_eq!(resolve_relative_specifier("src/a.ts", "lit"), None);
        assert_eq!(resolve_relative_specifier("src/a.ts", "@lit/reactive-element"), None);
    }

    #[test]
    fn test_package_manifest_defaults_when_absent() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace(tmp.path());
        let manifest = ws.package_manifest().unwrap();
        assert!(manifest.name.is_empty());
        assert!(manifest.custom_elements.is_none());
    }

    #[test]
    fn test_package_manifest_parses() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("package.json"),
            r#"{"name": "@acme/widgets", "main": "index.js", "customElements": "custom-elements.json"}"#,
        )
        .unwrap();
        let ws = workspace(tmp.path());
        let manifest = ws.package_manifest().unwrap();
        assert_eq!(manifest.name, "@acme/widgets");
        assert_eq!(manifest.custom_elements.as_deref(), Some("custom-elements.json"));
    }

    #[test]
    fn test_output_writer_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let ws = workspace(tmp.path());
        let mut writer = ws.output_writer(Path::new("dist/custom-elements.json")).unwrap();
        writer.write_all(b"{}").unwrap();
        drop(writer);
        assert!(tmp.path().join("dist/custom-elements.json").exists());
    }
}
