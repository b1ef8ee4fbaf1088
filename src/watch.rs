//! Watch mode.
//!
//! A coordinator thread owns the output directory. Filesystem events arrive
//! debounced (`notify-debouncer-mini`) and are folded into
//! [`PendingChanges`]; one pass at a time runs on a worker thread that owns
//! the [`Engine`] while it works.
//!
//! When a change arrives while a pass is running, the running pass is
//! cancelled and its changes go back into the pending set, so the next pass
//! covers both. The latest state of the tree always wins and two passes
//! never write the output concurrently: only the coordinator commits.
//!
//! A change to `quarry.toml` or the safelist rebuilds the engine from the
//! reloaded config and forces a full pass.

use crate::config::{ConfigError, SiteConfig, load_config};
use crate::diagnostics::Diagnostic;
use crate::emit::{EmitError, publish};
use crate::report::{BuildMode, BuildReport};
use crate::scan::{Change, classify_change, scan};
use crate::scheduler::{CancelToken, Engine, EngineError, PassMode, PassOutcome};
use notify_debouncer_mini::notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

pub const DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Emit(#[from] EmitError),
}

/// Changes seen but not yet covered by a completed pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingChanges {
    nodes: BTreeSet<String>,
    everything: bool,
}

impl PendingChanges {
    pub fn add(&mut self, change: Change) {
        match change {
            Change::Node(key) => {
                self.nodes.insert(key);
            }
            Change::Everything => self.everything = true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.everything && self.nodes.is_empty()
    }

    /// Take everything pending, leaving the set empty.
    pub fn take(&mut self) -> PendingChanges {
        std::mem::take(self)
    }

    /// Put back the changes of a pass that did not complete.
    pub fn restore(&mut self, batch: PendingChanges) {
        self.everything |= batch.everything;
        self.nodes.extend(batch.nodes);
    }

    /// Whether the config must be reloaded before the pass.
    pub fn reloads_config(&self) -> bool {
        self.everything
    }

    pub fn mode(&self) -> PassMode {
        if self.everything {
            PassMode::Full
        } else {
            PassMode::Incremental(self.nodes.clone())
        }
    }
}

enum Msg {
    Changed(Vec<PathBuf>),
    WatchFailed(notify::Error),
    Done {
        engine: Box<Engine>,
        batch: PendingChanges,
        result: Result<PassOutcome, EngineError>,
    },
}

struct Coordinator<'a, F> {
    root: &'a Path,
    config_path: &'a Path,
    config: SiteConfig,
    /// `None` while a worker holds it.
    engine: Option<Box<Engine>>,
    running: Option<CancelToken>,
    pending: PendingChanges,
    tx: mpsc::Sender<Msg>,
    on_pass: F,
}

impl<F: FnMut(&BuildReport)> Coordinator<'_, F> {
    fn changed(&mut self, paths: Vec<PathBuf>) {
        let before = self.pending.clone();
        for path in paths {
            if let Some(change) = classify_change(self.root, &self.config, &path) {
                tracing::debug!(path = %path.display(), ?change, "change");
                self.pending.add(change);
            }
        }
        if self.pending == before {
            return;
        }
        match &self.running {
            Some(token) => {
                tracing::info!("change during pass; cancelling it");
                token.cancel();
            }
            None => self.start(),
        }
    }

    /// Start a pass over everything pending, if nothing is running.
    fn start(&mut self) {
        if self.running.is_some() || self.pending.is_empty() {
            return;
        }
        let batch = self.pending.take();
        if batch.reloads_config() && !self.reload() {
            return;
        }
        let mode = batch.mode();
        self.spawn(batch, mode);
    }

    /// Rebuild the engine from the config on disk. A rejected config keeps
    /// the previous engine and is reported as a failed pass.
    fn reload(&mut self) -> bool {
        let config = match load_config(self.config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("config rejected, keeping the previous one: {e}");
                let source = self.config_path.display().to_string();
                self.report_failure(BuildMode::Full, e.to_diagnostic(&source));
                return false;
            }
        };
        match Engine::new(config.clone()) {
            Ok(engine) => {
                self.config = config;
                self.engine = Some(Box::new(engine));
                true
            }
            Err(e) => {
                tracing::warn!("could not rebuild engine: {e}");
                false
            }
        }
    }

    fn spawn(&mut self, batch: PendingChanges, mode: PassMode) {
        let Some(mut engine) = self.engine.take() else {
            self.pending.restore(batch);
            return;
        };
        let input = match scan(self.root, &self.config) {
            Ok(input) => input,
            Err(e) => {
                // The next completed pass diffs against the last one, so
                // nothing is lost by dropping the batch here.
                tracing::warn!("scan failed: {e}");
                self.engine = Some(engine);
                let build_mode = match mode {
                    PassMode::Full => BuildMode::Full,
                    PassMode::Incremental(_) => BuildMode::Incremental,
                };
                self.report_failure(build_mode, e.to_diagnostic(self.root));
                return;
            }
        };

        let token = CancelToken::new();
        self.running = Some(token.clone());
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = engine.run_pass(input, mode, &token);
            // The coordinator is gone only when watch mode is shutting down.
            let _ = tx.send(Msg::Done {
                engine,
                batch,
                result,
            });
        });
    }

    /// Show a pass that could not start as a failed report.
    fn report_failure(&mut self, mode: BuildMode, diagnostic: Diagnostic) {
        let report = BuildReport::new(mode).finish(vec![diagnostic]);
        (self.on_pass)(&report);
    }

    fn done(
        &mut self,
        engine: Box<Engine>,
        batch: PendingChanges,
        result: Result<PassOutcome, EngineError>,
    ) -> Result<(), WatchError> {
        self.running = None;
        self.engine = Some(engine);
        match result {
            Ok(PassOutcome::Completed(output)) => {
                let output_dir = self.root.join(&self.config.paths.output);
                publish(self.root, &output_dir, &output)?;
                (self.on_pass)(&output.report);
            }
            Ok(PassOutcome::Cancelled) => {
                tracing::debug!("pass cancelled; requeueing its changes");
                self.pending.restore(batch);
            }
            Err(e) => {
                tracing::warn!("pass failed: {e}");
                self.pending.restore(batch);
                return Err(e.into());
            }
        }
        self.start();
        Ok(())
    }
}

/// Build once, then rebuild on every change under `root` until the watcher
/// stops. `on_pass` sees the report of every completed pass.
pub fn watch(
    root: &Path,
    config_path: &Path,
    on_pass: impl FnMut(&BuildReport),
) -> Result<(), WatchError> {
    let config = load_config(config_path)?;
    let engine = Engine::new(config.clone())?;
    let (tx, rx) = mpsc::channel();

    let events = tx.clone();
    let mut debouncer = new_debouncer(DEBOUNCE, move |res: DebounceEventResult| {
        let msg = match res {
            Ok(events) => Msg::Changed(events.into_iter().map(|e| e.path).collect()),
            Err(e) => Msg::WatchFailed(e),
        };
        let _ = events.send(msg);
    })?;
    debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
    tracing::info!(root = %root.display(), "watching for changes");

    let mut coordinator = Coordinator {
        root,
        config_path,
        config,
        engine: Some(Box::new(engine)),
        running: None,
        pending: PendingChanges::default(),
        tx,
        on_pass,
    };
    coordinator.spawn(PendingChanges::default(), PassMode::Full);

    while let Ok(msg) = rx.recv() {
        match msg {
            Msg::Changed(paths) => coordinator.changed(paths),
            Msg::WatchFailed(e) => tracing::warn!("watcher error: {e}"),
            Msg::Done {
                engine,
                batch,
                result,
            } => coordinator.done(engine, batch, result)?,
        }
    }
    Ok(())
}
