//! The `generate` command: one full analysis pass plus manifest write.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use cemgen_core::{CancellationToken, WorkspaceContext};
use tracing::{info, warn};

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Write the manifest to this path instead of the configured output
    #[arg(long, short = 'o')]
    output: Option<String>,

    /// Print the manifest to stdout instead of writing a file
    #[arg(long)]
    stdout: bool,
}

pub fn execute(args: GenerateArgs, global: GlobalOptions) -> Result<()> {
    let root = global.project_root();
    let mut overrides = global.to_config_overrides();
    overrides.output = args.output.clone();
    let config = super::load_config(&root, &overrides)?;

    let options = super::to_generate_options(&config, global.verbose);
    let (session, workspace) = super::build_session(&root, options)?;

    let outcome = session
        .generate_full(workspace.as_ref(), &CancellationToken::new())
        .context("generation failed")?;
    for error in outcome.errors.iter() {
        warn!(%error, "analysis warning");
    }

    let json = session.serialize_manifest()?;
    if args.stdout {
        println!("{}", json);
        return Ok(());
    }

    let output = super::output_path(&workspace)?;
    let mut writer = workspace.output_writer(&output)?;
    writer.write_all(json.as_bytes())?;
    writer.flush()?;
    info!(
        modules = outcome.package.modules.len(),
        output = %output.display(),
        "manifest written"
    );
    Ok(())
}
