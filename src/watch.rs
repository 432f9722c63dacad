//! File system watcher for watch mode.
//!
//! Monitors the content and static roots and rebuilds on change.
//!
//! # Architecture
//!
//! ```text
//! notify events ──┐
//!                 ├──▶ channel ──▶ event loop ──▶ Scheduler
//! build results ──┘                    │
//!                                      ▼
//!                          build thread (owns the engine)
//! ```
//!
//! Builds run on their own thread so file events keep arriving while one is
//! in progress. The engine moves into the build thread and comes back with
//! the result; the [`Scheduler`] decides whether another build follows.
//! Any burst of events during a build yields exactly one follow-up build.

use crate::engine::{BuildEngine, BuildError, BuildSummary};
use crate::scheduler::Scheduler;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::thread;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error(transparent)]
    Build(#[from] BuildError),
}

enum Message {
    Fs(notify::Result<Event>),
    BuildFinished(Box<BuildEngine>, Result<BuildSummary, BuildError>),
}

/// Check if path is a temp/backup file (editor artifacts).
pub fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// An add, change or remove touching at least one non-temp file.
pub fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event.paths.iter().any(|p| !is_temp_file(p))
}

fn spawn_build(mut engine: BuildEngine, tx: Sender<Message>) {
    thread::spawn(move || {
        let result = engine.build();
        // The receiver only goes away when the loop has ended.
        let _ = tx.send(Message::BuildFinished(Box::new(engine), result));
    });
}

/// Build once, then rebuild on every relevant change until the watcher
/// stops. `on_build` sees every completed build's summary.
///
/// Returns an error when the watcher cannot be set up or a build finds the
/// content root unreadable.
pub fn watch(
    engine: BuildEngine,
    mut on_build: impl FnMut(&BuildSummary),
) -> Result<(), WatchError> {
    let (tx, rx) = mpsc::channel();
    let fs_tx = tx.clone();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
        let _ = fs_tx.send(Message::Fs(event));
    })?;

    let dirs = engine.dirs().clone();
    for dir in [&dirs.content, &dirs.static_dir] {
        if dir.exists() {
            watcher.watch(dir, RecursiveMode::Recursive)?;
            info!(dir = %dir.display(), "watching");
        }
    }

    let mut scheduler = Scheduler::new();
    let mut idle = Some(engine);
    scheduler.queue_build();
    let mut start = scheduler.mark_ready();

    loop {
        if start && let Some(engine) = idle.take() {
            debug!("starting build");
            spawn_build(engine, tx.clone());
        }
        start = match rx.recv() {
            Ok(Message::Fs(Ok(event))) if is_relevant(&event) => {
                debug!(paths = ?event.paths, "change");
                scheduler.queue_build()
            }
            Ok(Message::Fs(Ok(_))) => false,
            Ok(Message::Fs(Err(e))) => {
                warn!(error = %e, "watch error");
                false
            }
            Ok(Message::BuildFinished(engine, result)) => {
                on_build(&result?);
                idle = Some(*engine);
                scheduler.finish()
            }
            Err(mpsc::RecvError) => break,
        };
    }
    Ok(())
}
