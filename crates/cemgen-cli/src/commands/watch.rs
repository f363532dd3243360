//! The `watch` command: incremental regeneration on file change.

use anyhow::{Context, Result};
use clap::Args;
use cemgen_core::{CancellationToken, FileWatcher};
use tracing::info;

use crate::GlobalOptions;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Debounce interval in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,
}

pub fn execute(args: WatchArgs, global: GlobalOptions) -> Result<()> {
    let root = global.project_root();
    let overrides = global.to_config_overrides();
    let config = super::load_config(&root, &overrides)?;

    let mut options = super::to_generate_options(&config, global.verbose);
    if let Some(debounce) = args.debounce_ms {
        options.debounce_ms = debounce;
    }
    let (session, workspace) = super::build_session(&root, options)?;

    info!(root = %root.display(), "watching for changes");
    let mut watcher =
        FileWatcher::new(session, workspace).context("failed to start watcher")?;
    watcher
        .run(&CancellationToken::new())
        .context("watch loop failed")
}
