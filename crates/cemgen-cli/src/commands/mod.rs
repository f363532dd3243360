//! CLI subcommands.

pub mod generate;
pub mod validate;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use cemgen_config::{CemConfig, ConfigLoader};
use cemgen_core::{FsWorkspace, GenerateOptions, JsonTokenLoader, Session};

/// Load and validate the merged configuration for a project.
pub fn load_config(
    root: &Path,
    overrides: &cemgen_config::ConfigOverrides,
) -> Result<CemConfig> {
    let mut loader = ConfigLoader::new();
    let config = loader
        .load(root, Some(overrides))
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Build the core generation options from the merged configuration.
pub fn to_generate_options(config: &CemConfig, verbose: bool) -> GenerateOptions {
    GenerateOptions {
        files: config.generate.files.clone(),
        exclude: config.generate.exclude.clone(),
        output: config.generate.output.clone(),
        demo_file_glob: config.generate.demo_discovery.file_glob.clone(),
        design_tokens_spec: config.generate.design_tokens.spec.clone(),
        design_tokens_prefix: config.generate.design_tokens.prefix.clone(),
        incremental_threshold: config.generate.incremental_threshold,
        debounce_ms: config.generate.watch.debounce_ms,
        verbose,
    }
}

/// Construct a session and workspace for a project.
pub fn build_session(root: &Path, options: GenerateOptions) -> Result<(Arc<Session>, Arc<FsWorkspace>)> {
    let workspace = Arc::new(FsWorkspace::new(root, options));
    let session = Session::new(root, Some(Arc::new(JsonTokenLoader::new())))
        .context("failed to initialize analysis session")?;
    Ok((Arc::new(session), workspace))
}

/// Resolve the output path from options and the package manifest.
pub fn output_path(workspace: &FsWorkspace) -> Result<std::path::PathBuf> {
    use cemgen_core::WorkspaceContext;
    if let Some(output) = &workspace.options().output {
        return Ok(workspace.root().join(output));
    }
    let manifest = workspace.package_manifest()?;
    let name = manifest
        .custom_elements
        .unwrap_or_else(|| "custom-elements.json".to_string());
    Ok(workspace.root().join(name))
}
