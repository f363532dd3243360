//! Demo-file discovery.
//!
//! Demo files matched by the configured glob are scanned for custom
//! element tag usage. The resulting map mutates modules in place,
//! attaching demo references to the elements they exercise.

use std::collections::HashMap;

use tracing::trace;

use crate::error::AnalyzerError;
use crate::manifest::{Demo, Module};
use crate::workspace::WorkspaceContext;

/// Demo URLs per custom element tag name.
#[derive(Debug, Clone, Default)]
pub struct DemoMap {
    by_tag: HashMap<String, Vec<String>>,
}

impl DemoMap {
    /// Scan demo files under the workspace for tag usage.
    ///
    /// A demo file is associated with a tag when its content contains
    /// `<tag` or its file stem equals the tag name.
    pub fn discover(
        ctx: &dyn WorkspaceContext,
        glob: &str,
        tags: &[String],
    ) -> Result<Self, AnalyzerError> {
        let mut by_tag: HashMap<String, Vec<String>> = HashMap::new();

        for path in ctx.glob(glob)? {
            let url = ctx.fs_to_module(&path);
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let content = ctx.read_file(&path).unwrap_or_default();

            for tag in tags {
                if stem == *tag || content.contains(&format!("<{}", tag)) {
                    by_tag.entry(tag.clone()).or_default().push(url.clone());
                }
            }
        }

        for urls in by_tag.values_mut() {
            urls.sort();
            urls.dedup();
        }
        trace!(tags = by_tag.len(), "demo discovery complete");
        Ok(Self { by_tag })
    }

    pub fn urls_for(&self, tag: &str) -> &[String] {
        self.by_tag.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Attach demo references to the module's custom elements in place.
    pub fn attach(&self, module: &mut Module) {
        for class in module.custom_elements_mut() {
            let Some(tag) = class.tag_name.clone() else {
                continue;
            };
            for url in self.urls_for(&tag) {
                if !class.demos.iter().any(|d| &d.url == url) {
                    class.demos.push(Demo {
                        url: url.clone(),
                        description: String::new(),
                    });
                }
            }
            class.demos.sort_by(|a, b| a.url.cmp(&b.url));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ClassDeclaration, Declaration};
    use crate::workspace::{FsWorkspace, GenerateOptions};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discovery_by_content_and_stem() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("demos")).unwrap();
        fs::write(
            tmp.path().join("demos/buttons.html"),
            "<my-button label=\"go\"></my-button>",
        )
        .unwrap();
        fs::write(tmp.path().join("demos/my-card.html"), "<main></main>").unwrap();

        let ws = FsWorkspace::new(tmp.path(), GenerateOptions::with_files(vec![]));
        let tags = vec!["my-button".to_string(), "my-card".to_string()];
        let demos = DemoMap::discover(&ws, "demos/**/*.html", &tags).unwrap();

        assert_eq!(demos.urls_for("my-button"), ["demos/buttons.html"]);
        assert_eq!(demos.urls_for("my-card"), ["demos/my-card.html"]);
    }

    #[test]
    fn test_attach_mutates_module_in_place() {
        let mut by_tag = HashMap::new();
        by_tag.insert(
            "my-el".to_string(),
            vec!["demos/my-el.html".to_string()],
        );
        let demos = DemoMap { by_tag };

        let mut module = Module::new("src/my-el.ts");
        let mut class = ClassDeclaration::new("MyEl", 0);
        class.custom_element = true;
        class.tag_name = Some("my-el".into());
        module.declarations.push(Declaration::Class(class));

        demos.attach(&mut module);
        demos.attach(&mut module); // idempotent

        let Declaration::Class(class) = &module.declarations[0] else {
            panic!("expected class");
        };
        assert_eq!(class.demos.len(), 1);
        assert_eq!(class.demos[0].url, "demos/my-el.html");
    }
}
