//! The `validate` command: schema and referential checks on an existing
//! manifest file.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use cemgen_core::{Export, Package, MANIFEST_SCHEMA_VERSION};
use tracing::info;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Manifest file to validate
    #[arg(default_value = "custom-elements.json")]
    manifest: PathBuf,
}

pub fn execute(args: ValidateArgs, global: GlobalOptions) -> Result<()> {
    let path = if args.manifest.is_absolute() {
        args.manifest.clone()
    } else {
        global.project_root().join(&args.manifest)
    };

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let package: Package =
        serde_json::from_str(&text).context("manifest is not valid CEM JSON")?;

    let mut problems = Vec::new();

    if package.schema_version != MANIFEST_SCHEMA_VERSION {
        problems.push(format!(
            "unexpected schemaVersion '{}' (expected '{}')",
            package.schema_version, MANIFEST_SCHEMA_VERSION
        ));
    }

    for module in &package.modules {
        let declared: Vec<&str> = module.declarations.iter().map(|d| d.name()).collect();
        for export in &module.exports {
            let target = export.declaration();
            // Local references must point at a declaration in the module.
            if target.module.is_none()
                && target.package.is_none()
                && !declared.contains(&target.name.as_str())
            {
                problems.push(format!(
                    "{}: export '{}' references undeclared '{}'",
                    module.path,
                    export_name(export),
                    target.name
                ));
            }
        }
    }

    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("  - {}", problem);
        }
        bail!("{} validation problem(s) in {}", problems.len(), path.display());
    }

    info!(
        modules = package.modules.len(),
        manifest = %path.display(),
        "manifest is valid"
    );
    Ok(())
}

fn export_name(export: &Export) -> &str {
    export.name()
}
