//! Watch mode: filesystem events drive incremental regeneration.
//!
//! The loop runs `Idle → Debouncing → Generating → Idle`. A new event
//! while generating cancels the in-flight generation and restarts the
//! debounce. Writing the output manifest records its content hash and
//! modification time together, so the watcher's own write never
//! triggers a rebuild: an event for the output path whose mtime falls
//! within the tolerance window and whose content hashes equal is
//! dropped before it reaches the pending set.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use globset::GlobSet;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::cancel::CancellationToken;
use crate::deps::{hash_bytes, hash_file};
use crate::error::AnalyzerError;
use crate::session::Session;
use crate::workspace::{build_glob_set, WorkspaceContext};

/// Mtime window within which an output event may be our own write.
const SELF_WRITE_TOLERANCE: Duration = Duration::from_secs(1);

/// Default debounce when the configuration gives none.
const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Hash and mtime of the last manifest write, recorded together.
#[derive(Debug, Clone)]
struct OutputRecord {
    hash: [u8; 32],
    mtime: SystemTime,
}

#[derive(Debug)]
enum WatchState {
    Idle,
    Debouncing { deadline: Instant },
    Generating,
}

struct Generation {
    token: CancellationToken,
    handle: JoinHandle<bool>,
}

/// Filesystem watcher driving the session.
pub struct FileWatcher {
    session: Arc<Session>,
    workspace: Arc<dyn WorkspaceContext>,
    input_globs: GlobSet,
    demo_globs: GlobSet,
    output_path: PathBuf,
    debounce: Duration,
    last_output: Arc<Mutex<Option<OutputRecord>>>,
    pending: HashSet<String>,
    demo_files_changed: bool,
    current: Option<Generation>,
}

impl FileWatcher {
    pub fn new(
        session: Arc<Session>,
        workspace: Arc<dyn WorkspaceContext>,
    ) -> Result<Self, AnalyzerError> {
        let options = workspace.options();
        let input_globs = build_glob_set(&options.files)?;
        let demo_globs = build_glob_set(
            options
                .demo_file_glob
                .as_ref()
                .map(std::slice::from_ref)
                .unwrap_or(&[]),
        )?;
        let output_path = output_path_for(workspace.as_ref())?;
        let debounce = Duration::from_millis(if options.debounce_ms == 0 {
            DEFAULT_DEBOUNCE_MS
        } else {
            options.debounce_ms
        });

        Ok(Self {
            session,
            workspace,
            input_globs,
            demo_globs,
            output_path,
            debounce,
            last_output: Arc::new(Mutex::new(None)),
            pending: HashSet::new(),
            demo_files_changed: false,
            current: None,
        })
    }

    /// Watch the project root until the shutdown token fires.
    ///
    /// Performs one full generation before entering the event loop so
    /// the output exists and its write record is primed.
    pub fn run(&mut self, shutdown: &CancellationToken) -> Result<(), AnalyzerError> {
        let (tx, rx) = channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(|e| AnalyzerError::Io(std::io::Error::other(e.to_string())))?;
        watcher
            .watch(self.workspace.root(), RecursiveMode::Recursive)
            .map_err(|e| AnalyzerError::Io(std::io::Error::other(e.to_string())))?;

        // Initial build primes the manifest and the self-write record.
        let token = CancellationToken::new();
        match self.session.generate_full(self.workspace.as_ref(), &token) {
            Ok(outcome) => {
                for error in outcome.errors.iter() {
                    warn!(%error, "analysis warning");
                }
                if let Err(e) = write_output(
                    &self.session,
                    self.workspace.as_ref(),
                    &self.output_path,
                    &self.last_output,
                ) {
                    warn!(error = %e, "initial manifest write failed");
                }
            }
            Err(e) => warn!(error = %e, "initial generation failed"),
        }

        self.event_loop(&rx, shutdown)
    }

    fn event_loop(
        &mut self,
        rx: &Receiver<notify::Result<Event>>,
        shutdown: &CancellationToken,
    ) -> Result<(), AnalyzerError> {
        let mut state = WatchState::Idle;
        loop {
            if shutdown.is_cancelled() {
                if let Some(generation) = self.current.take() {
                    generation.token.cancel();
                    let _ = generation.handle.join();
                }
                return Ok(());
            }

            let timeout = match &state {
                WatchState::Debouncing { deadline } => {
                    deadline.saturating_duration_since(Instant::now())
                }
                _ => Duration::from_millis(50),
            };

            match rx.recv_timeout(timeout) {
                Ok(Ok(event)) => {
                    if self.handle_event(&event) {
                        if matches!(state, WatchState::Generating) {
                            if let Some(generation) = self.current.take() {
                                debug!("new change cancels in-flight generation");
                                generation.token.cancel();
                                let _ = generation.handle.join();
                            }
                        }
                        state = WatchState::Debouncing {
                            deadline: Instant::now() + self.debounce,
                        };
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "watch event error"),
                Err(RecvTimeoutError::Timeout) => match &state {
                    WatchState::Debouncing { deadline } if Instant::now() >= *deadline => {
                        self.start_generation();
                        state = WatchState::Generating;
                    }
                    WatchState::Generating => {
                        if self
                            .current
                            .as_ref()
                            .is_some_and(|g| g.handle.is_finished())
                        {
                            self.finish_generation();
                            state = WatchState::Idle;
                        }
                    }
                    _ => {}
                },
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }

    /// Filter one filesystem event into the pending set. Returns true
    /// when anything new became pending.
    fn handle_event(&mut self, event: &Event) -> bool {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return false;
        }

        let mut added = false;
        for path in &event.paths {
            if let Some(module) = self.classify_path(path) {
                trace!(module, "pending change");
                added |= self.pending.insert(module);
            }
        }
        added
    }

    /// Map an event path to a pending module path, applying self-write
    /// suppression and glob filters.
    fn classify_path(&mut self, path: &Path) -> Option<String> {
        if self.is_own_write(path) {
            trace!(path = %path.display(), "self-write suppressed");
            return None;
        }

        let relative = path.strip_prefix(self.workspace.root()).ok()?;
        let is_input = self.input_globs.is_match(relative);
        let is_demo = self.demo_globs.is_match(relative);
        if !is_input && !is_demo {
            return None;
        }
        if is_demo {
            self.demo_files_changed = true;
        }
        Some(self.workspace.fs_to_module(path))
    }

    /// Whether an event for the output path is our own last write.
    fn is_own_write(&self, path: &Path) -> bool {
        if path != self.output_path {
            return false;
        }
        let Some(record) = self.last_output.lock().clone() else {
            return false;
        };
        let Ok(metadata) = std::fs::metadata(path) else {
            return false;
        };
        let Ok(mtime) = metadata.modified() else {
            return false;
        };
        let within_tolerance = match mtime.duration_since(record.mtime) {
            Ok(delta) => delta <= SELF_WRITE_TOLERANCE,
            Err(e) => e.duration() <= SELF_WRITE_TOLERANCE,
        };
        if !within_tolerance {
            return false;
        }
        match hash_file(path) {
            Ok(hash) => hash == record.hash,
            Err(_) => false,
        }
    }

    /// Snapshot and clear the pending set, then generate on a worker
    /// thread under a fresh cancellation token.
    fn start_generation(&mut self) {
        let changed: Vec<String> = {
            let mut drained: Vec<String> = self.pending.drain().collect();
            drained.sort();
            drained
        };
        let run_demo_discovery = self.demo_files_changed;
        let skip_demo_discovery = !run_demo_discovery;

        if let Some(generation) = self.current.take() {
            generation.token.cancel();
            let _ = generation.handle.join();
        }

        info!(changed = changed.len(), "regenerating manifest");
        let token = CancellationToken::new();
        let session = Arc::clone(&self.session);
        let workspace = Arc::clone(&self.workspace);
        let output_path = self.output_path.clone();
        let last_output = Arc::clone(&self.last_output);
        let thread_token = token.clone();

        let handle = std::thread::spawn(move || {
            match session.process_changed_files(
                workspace.as_ref(),
                &changed,
                skip_demo_discovery,
                &thread_token,
            ) {
                Ok(outcome) => {
                    for error in outcome.errors.iter() {
                        warn!(%error, "analysis warning");
                    }
                    match write_output(&session, workspace.as_ref(), &output_path, &last_output) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(error = %e, "manifest write failed");
                            false
                        }
                    }
                }
                Err(AnalyzerError::Cancelled) => {
                    debug!("generation cancelled");
                    false
                }
                Err(e) => {
                    warn!(error = %e, "generation failed");
                    false
                }
            }
        });

        if run_demo_discovery {
            // Cleared once discovery has run for this cycle.
            self.demo_files_changed = false;
        }
        self.current = Some(Generation { token, handle });
    }

    fn finish_generation(&mut self) {
        if let Some(generation) = self.current.take() {
            match generation.handle.join() {
                Ok(true) => debug!("generation complete"),
                Ok(false) => debug!("generation ended without output"),
                Err(_) => warn!("generation thread panicked"),
            }
        }
    }

    #[cfg(test)]
    fn pending(&self) -> &HashSet<String> {
        &self.pending
    }
}

/// Resolve the output manifest path: explicit option first, then the
/// package manifest's `customElements` field, then the default.
fn output_path_for(ctx: &dyn WorkspaceContext) -> Result<PathBuf, AnalyzerError> {
    if let Some(output) = &ctx.options().output {
        return Ok(ctx.root().join(output));
    }
    let manifest = ctx.package_manifest()?;
    let name = manifest
        .custom_elements
        .unwrap_or_else(|| "custom-elements.json".to_string());
    Ok(ctx.root().join(name))
}

/// Serialize the committed manifest, write it through the workspace's
/// output writer, and record the content hash and mtime together.
fn write_output(
    session: &Session,
    ctx: &dyn WorkspaceContext,
    output_path: &Path,
    last_output: &Mutex<Option<OutputRecord>>,
) -> Result<(), AnalyzerError> {
    let json = session.serialize_manifest()?;
    let mut writer = ctx.output_writer(output_path)?;
    writer.write_all(json.as_bytes())?;
    writer.flush()?;
    drop(writer);

    let mtime = std::fs::metadata(output_path)
        .and_then(|m| m.modified())
        .unwrap_or_else(|_| SystemTime::now());
    *last_output.lock() = Some(OutputRecord {
        hash: hash_bytes(json.as_bytes()),
        mtime,
    });
    Ok(())
}
