//! Design-token collaborator.
//!
//! During preprocess the session asks the loader for the project's
//! design tokens; during postprocess token documentation merges into the
//! CSS custom properties of every custom element. A loader returning
//! `Ok(None)` means "no tokens configured".

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::AnalyzerError;
use crate::manifest::ClassDeclaration;
use crate::workspace::WorkspaceContext;

/// One design token's documentation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DesignToken {
    pub value: Option<String>,
    pub description: String,
    pub syntax: Option<String>,
}

/// Loaded design tokens, keyed by custom property name (`--x`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesignTokens {
    tokens: BTreeMap<String, DesignToken>,
}

impl DesignTokens {
    pub fn new(tokens: BTreeMap<String, DesignToken>) -> Self {
        Self { tokens }
    }

    pub fn get(&self, name: &str) -> Option<&DesignToken> {
        self.tokens.get(name)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Merge token documentation into a custom element's CSS custom
    /// properties. Token data fills empty fields only; the analyzed
    /// source stays authoritative.
    pub fn merge_into(&self, class: &mut ClassDeclaration, prefix: Option<&str>) {
        for property in &mut class.css_properties {
            let lookup = match prefix {
                Some(prefix) => property
                    .name
                    .strip_prefix("--")
                    .and_then(|rest| rest.strip_prefix(prefix))
                    .map(|rest| format!("--{}", rest.trim_start_matches('-')))
                    .unwrap_or_else(|| property.name.clone()),
                None => property.name.clone(),
            };
            let Some(token) = self.tokens.get(&lookup).or_else(|| self.tokens.get(&property.name))
            else {
                continue;
            };
            if property.description.is_empty() {
                property.description = token.description.clone();
            }
            if property.default.is_none() {
                property.default = token.value.clone();
            }
            if property.syntax.is_none() {
                property.syntax = token.syntax.clone();
            }
        }
    }
}

/// Loads design tokens for a workspace.
pub trait DesignTokenLoader: Send + Sync {
    /// `Ok(None)` without error means no tokens are configured.
    fn load(&self, ctx: &dyn WorkspaceContext) -> Result<Option<DesignTokens>, AnalyzerError>;
}

/// Cache-backed loader for a JSON token file: a flat map of custom
/// property names to token entries.
#[derive(Debug, Default)]
pub struct JsonTokenLoader {
    cached: Mutex<Option<DesignTokens>>,
}

impl JsonTokenLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DesignTokenLoader for JsonTokenLoader {
    fn load(&self, ctx: &dyn WorkspaceContext) -> Result<Option<DesignTokens>, AnalyzerError> {
        if let Some(cached) = self.cached.lock().clone() {
            return Ok(Some(cached));
        }

        let Some(spec) = ctx.options().design_tokens_spec.as_deref() else {
            return Ok(None);
        };
        let path = ctx.root().join(spec);
        if !path.exists() {
            return Err(AnalyzerError::DesignTokens(format!(
                "token spec not found: {}",
                path.display()
            )));
        }

        let text = ctx.read_file(&path)?;
        let raw: BTreeMap<String, DesignToken> = serde_json::from_str(&text)
            .map_err(|e| AnalyzerError::DesignTokens(format!("{}: {}", path.display(), e)))?;

        let tokens = DesignTokens::new(
            raw.into_iter()
                .map(|(name, token)| {
                    let name = if name.starts_with("--") {
                        name
                    } else {
                        format!("--{}", name)
                    };
                    (name, token)
                })
                .collect(),
        );
        *self.cached.lock() = Some(tokens.clone());
        Ok(Some(tokens))
    }
}

/// Convenience for tests and hosts that already hold token data.
pub struct StaticTokenLoader(pub DesignTokens);

impl DesignTokenLoader for StaticTokenLoader {
    fn load(&self, _ctx: &dyn WorkspaceContext) -> Result<Option<DesignTokens>, AnalyzerError> {
        Ok(Some(self.0.clone()))
    }
}

/// Path helper used by the watcher to detect token-spec changes.
pub fn is_token_spec(ctx: &dyn WorkspaceContext, path: &Path) -> bool {
    ctx.options()
        .design_tokens_spec
        .as_deref()
        .is_some_and(|spec| ctx.root().join(spec) == path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::CssCustomProperty;
    use crate::workspace::{FsWorkspace, GenerateOptions};
    use std::fs;
    use tempfile::TempDir;

    fn tokens() -> DesignTokens {
        let mut map = BTreeMap::new();
        map.insert(
            "--accent".to_string(),
            DesignToken {
                value: Some("#ff00ff".to_string()),
                description: "Accent color".to_string(),
                syntax: Some("<color>".to_string()),
            },
        );
        DesignTokens::new(map)
    }

    #[test]
    fn test_merge_fills_empty_fields_only() {
        let mut class = ClassDeclaration::new("El", 0);
        class.css_properties.push(CssCustomProperty {
            name: "--accent".into(),
            default: Some("blue".into()),
            ..Default::default()
        });

        tokens().merge_into(&mut class, None);
        let prop = &class.css_properties[0];
        // Analyzed default wins; token fills the rest.
        assert_eq!(prop.default.as_deref(), Some("blue"));
        assert_eq!(prop.description, "Accent color");
        assert_eq!(prop.syntax.as_deref(), Some("<color>"));
    }

    #[test]
    fn test_prefix_lookup() {
        let mut class = ClassDeclaration::new("El", 0);
        class.css_properties.push(CssCustomProperty {
            name: "--acme-accent".into(),
            ..Default::default()
        });
        tokens().merge_into(&mut class, Some("acme"));
        assert_eq!(class.css_properties[0].description, "Accent color");
    }

    #[test]
    fn test_json_loader_reads_and_caches() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("tokens.json"),
            r##"{"accent": {"value": "#123456", "description": "Accent"}}"##,
        )
        .unwrap();
        let mut options = GenerateOptions::with_files(vec![]);
        options.design_tokens_spec = Some("tokens.json".to_string());
        let ws = FsWorkspace::new(tmp.path(), options);

        let loader = JsonTokenLoader::new();
        let loaded = loader.load(&ws).unwrap().unwrap();
        assert_eq!(loaded.get("--accent").unwrap().description, "Accent");

        // Cached on subsequent loads, even if the file goes away.
        fs::remove_file(tmp.path().join("tokens.json")).unwrap();
        assert!(loader.load(&ws).unwrap().is_some());
    }

    #[test]
    fn test_no_spec_means_no_tokens() {
        let tmp = TempDir::new().unwrap();
        let ws = FsWorkspace::new(tmp.path(), GenerateOptions::with_files(vec![]));
        let loader = JsonTokenLoader::new();
        assert!(loader.load(&ws).unwrap().is_none());
    }

    #[test]
    fn test_missing_spec_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut options = GenerateOptions::with_files(vec![]);
        options.design_tokens_spec = Some("nope.json".to_string());
        let ws = FsWorkspace::new(tmp.path(), options);
        let loader = JsonTokenLoader::new();
        assert!(matches!(
            loader.load(&ws),
            Err(AnalyzerError::DesignTokens(_))
        ));
    }
}
