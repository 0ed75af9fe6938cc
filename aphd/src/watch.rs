//! The watch loop.
//!
//! One thread blocks on acme's `log` and forwards events over a channel.
//! Each save gets its own blocking task running the save handler; the loop
//! never waits for a task before reading the next event. Tasks for the same
//! window may overlap.

use std::future::Future;

use aph_common::errors::{Coded, ErrorCode};
use aph_common::{
    Acme, AcmeError, EventLog, HandlerError, LogEvent, PipelineReport, SaveHandler, WindowId,
};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Result of handling one save.
#[derive(Debug)]
pub struct TaskOutcome {
    pub id: WindowId,
    pub name: String,
    pub result: Result<PipelineReport, HandlerError>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(&self.result, Ok(report) if report.is_success())
    }

    /// Stage failures are warnings; anything that kept the pipeline from
    /// running is an error.
    fn log(&self) {
        let (id, name) = (self.id, &self.name);
        match &self.result {
            Ok(report) if report.ignored => debug!("Window {} ({}) opted out", id, name),
            Ok(report) => match &report.error {
                Some(e) => warn!(code = %e.code().code_string(), "{}: {}", name, e),
                None => debug!("{}: {} stages passed", name, report.ran().len()),
            },
            Err(e) => error!(code = %e.code().code_string(), "Window {} ({}): {}", id, name, e),
        }
    }
}

/// Starts a handling task per actionable event.
#[derive(Clone)]
pub struct Scheduler {
    handler: SaveHandler,
}

impl Scheduler {
    pub fn new(handler: SaveHandler) -> Self {
        Self { handler }
    }

    /// Start handling `event` if it is a save of a named window.
    ///
    /// Returns immediately; the handle resolves when the pipeline is done.
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, event: &LogEvent) -> Option<JoinHandle<TaskOutcome>> {
        if !event.is_actionable() {
            return None;
        }
        let handler = self.handler.clone();
        let id = event.id;
        let name = event.name.clone();
        debug!("Dispatching save of {} in window {}", name, id);
        Some(tokio::task::spawn_blocking(move || {
            let result = handler.handle(id, &name);
            let outcome = TaskOutcome { id, name, result };
            outcome.log();
            outcome
        }))
    }
}

type EventReceiver = mpsc::UnboundedReceiver<Result<LogEvent, AcmeError>>;

/// Follows acme's event log and dispatches saves.
pub struct Watcher {
    acme: Acme,
    scheduler: Scheduler,
    tasks: JoinSet<Result<TaskOutcome, JoinError>>,
}

impl Watcher {
    pub fn new(acme: Acme, scheduler: Scheduler) -> Self {
        Self {
            acme,
            scheduler,
            tasks: JoinSet::new(),
        }
    }

    /// Tasks started and not yet reaped.
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Watch until the log ends (an error) or `shutdown` completes.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), AcmeError>
    where
        F: Future<Output = ()>,
    {
        let mut events = self.spawn_reader()?;
        tokio::pin!(shutdown);
        info!("Watching acme log");

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutting down with {} tasks still running", self.running());
                    return Ok(());
                }
                msg = events.recv() => match msg {
                    Some(Ok(event)) => {
                        if let Some(handle) = self.scheduler.dispatch(&event) {
                            self.tasks.spawn(handle);
                        }
                    }
                    Some(Err(e)) => {
                        error!(code = %e.code().code_string(), "acme log failed: {}", e);
                        return Err(e);
                    }
                    None => return Err(AcmeError::LogClosed),
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    reap(joined);
                }
            }
        }
    }

    /// Wait for every running task.
    #[cfg(test)]
    pub async fn drain(&mut self) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            if let Some(outcome) = reap(joined) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Open the log on its own connection and read it on a dedicated thread.
    fn spawn_reader(&self) -> Result<EventReceiver, AcmeError> {
        let conn = self.acme.connect()?;
        let mut log = EventLog::open(&conn)?;
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("acme-log".to_string())
            .spawn(move || {
                let _conn = conn;
                loop {
                    let next = log.next_event();
                    let failed = next.is_err();
                    if tx.send(next).is_err() || failed {
                        return;
                    }
                }
            })
            .map_err(|e| AcmeError::io("log", e))?;
        Ok(rx)
    }
}

fn reap(joined: Result<Result<TaskOutcome, JoinError>, JoinError>) -> Option<TaskOutcome> {
    match joined.and_then(|inner| inner) {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(
                code = %ErrorCode::InternalTaskPanicked.code_string(),
                "Save handler task failed: {}",
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aph_common::config::{RewriteStrategy, StageConfig};
    use aph_common::testing::{FakeAcme, write_script};
    use aph_common::{PipelineExecutor, RootResolver, Stage};
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Setup {
        acme: FakeAcme,
        dir: TempDir,
        scheduler: Scheduler,
    }

    impl Setup {
        fn new(check_exit: i32) -> Self {
            Self::with_check(&format!(
                "#!/bin/sh\necho \"$1\" >> ../calls\nexit {check_exit}\n"
            ))
        }

        /// Check tool runs with the project directory as cwd; the temp dir
        /// is its parent.
        fn with_check(script: &str) -> Self {
            let acme = FakeAcme::new();
            let dir = TempDir::new().unwrap();
            let check = write_script(dir.path(), "check", script);
            let executor = PipelineExecutor::new("NoAph", RewriteStrategy::Reload)
                .with_stage(Stage::Check, StageConfig::new(&check.to_string_lossy()));
            let handler =
                SaveHandler::new(acme.handle(), RootResolver::new("false"), executor, "");
            Self {
                acme,
                dir,
                scheduler: Scheduler::new(handler),
            }
        }

        /// A saved file in its own project directory.
        fn file(&self, project: &str, name: &str) -> (PathBuf, WindowId) {
            let root = std::fs::canonicalize(self.dir.path()).unwrap().join(project);
            std::fs::create_dir_all(&root).unwrap();
            let path = root.join(name);
            std::fs::write(&path, "x").unwrap();
            (path.clone(), self.acme.add_window(&path.to_string_lossy(), "x"))
        }

        fn calls(&self) -> Vec<String> {
            let mut calls: Vec<String> = std::fs::read_to_string(self.dir.path().join("calls"))
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect();
            calls.sort();
            calls
        }
    }

    #[tokio::test]
    async fn test_dispatch_ignores_non_saves() {
        let setup = Setup::new(0);
        assert!(setup.scheduler.dispatch(&LogEvent::new(1, "focus", "/a")).is_none());
        assert!(setup.scheduler.dispatch(&LogEvent::new(1, "new", "")).is_none());
        assert!(setup.scheduler.dispatch(&LogEvent::new(1, "put", "")).is_none());
    }

    #[tokio::test]
    async fn test_dispatch_runs_pipeline() {
        let setup = Setup::new(0);
        let (path, id) = setup.file("p", "a.x");

        let handle = setup
            .scheduler
            .dispatch(&LogEvent::new(id.get(), "put", path.to_string_lossy()))
            .unwrap();
        let outcome = handle.await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.id, id);
        assert_eq!(setup.calls(), vec!["a.x"]);
    }

    #[tokio::test]
    async fn test_dispatch_reports_stage_failure() {
        let setup = Setup::new(1);
        let (path, id) = setup.file("p", "a.x");
        let outcome = setup
            .scheduler
            .dispatch(&LogEvent::new(id.get(), "put", path.to_string_lossy()))
            .unwrap()
            .await
            .unwrap();
        assert!(!outcome.is_success());
        let report = outcome.result.unwrap();
        assert_eq!(report.failed(), Some(Stage::Check));
    }

    #[tokio::test]
    async fn test_dispatch_for_closed_window_fails() {
        let setup = Setup::new(0);
        let outcome = setup
            .scheduler
            .dispatch(&LogEvent::new(99, "put", "/gone/a.x"))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(
            outcome.result.unwrap_err().code(),
            ErrorCode::WindowNotFound
        );
    }

    #[tokio::test]
    async fn test_run_dispatches_until_log_closes() {
        let setup = Setup::new(0);
        let (a, a_id) = setup.file("p", "a.x");
        let (b, b_id) = setup.file("q", "b.x");
        setup.acme.emit(a_id, "focus", &a.to_string_lossy());
        setup.acme.emit(a_id, "put", &a.to_string_lossy());
        setup.acme.emit(b_id, "put", &b.to_string_lossy());
        setup.acme.emit(b_id, "put", "");
        setup.acme.close_log();

        let mut watcher = Watcher::new(setup.acme.handle(), setup.scheduler.clone());
        let result = watcher.run(std::future::pending()).await;
        assert!(matches!(result, Err(AcmeError::LogClosed)));

        let outcomes = watcher.drain().await;
        assert!(outcomes.len() <= 2);
        assert!(outcomes.iter().all(TaskOutcome::is_success));
        assert_eq!(watcher.running(), 0);
        assert_eq!(setup.calls(), vec!["a.x", "b.x"]);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let setup = Setup::new(0);
        let mut watcher = Watcher::new(setup.acme.handle(), setup.scheduler.clone());
        watcher.run(async {}).await.unwrap();
        assert_eq!(watcher.running(), 0);
    }

    #[tokio::test]
    async fn test_run_fails_without_acme() {
        let setup = Setup::new(0);
        setup.acme.fail_connections(true);
        let mut watcher = Watcher::new(setup.acme.handle(), setup.scheduler.clone());
        let err = watcher.run(std::future::pending()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AcmeConnectFailed);
    }

    #[tokio::test]
    async fn test_slow_pipeline_does_not_block_other_windows() {
        // `slow.x` waits for a `release` file; `fast.x` finishes at once.
        let setup = Setup::with_check(
            "#!/bin/sh\n\
             if [ \"$1\" = slow.x ]; then\n\
             while [ ! -e ../release ]; do sleep 0.05; done\n\
             fi\n\
             echo \"$1\" >> ../calls\n",
        );
        let (slow, slow_id) = setup.file("p", "slow.x");
        let (fast, fast_id) = setup.file("q", "fast.x");
        setup.acme.emit(slow_id, "put", &slow.to_string_lossy());
        setup.acme.emit(fast_id, "put", &fast.to_string_lossy());

        let calls = setup.dir.path().join("calls");
        let fast_done = async {
            while !std::fs::read_to_string(&calls).is_ok_and(|c| c.contains("fast.x")) {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        };
        let mut watcher = Watcher::new(setup.acme.handle(), setup.scheduler.clone());
        tokio::time::timeout(std::time::Duration::from_secs(10), watcher.run(fast_done))
            .await
            .expect("fast save was held up by the slow one")
            .unwrap();

        assert_eq!(setup.calls(), vec!["fast.x"]);
        assert!(watcher.running() >= 1);

        std::fs::write(setup.dir.path().join("release"), "").unwrap();
        let outcomes = watcher.drain().await;
        assert!(outcomes.iter().all(TaskOutcome::is_success));
        assert_eq!(setup.calls(), vec!["fast.x", "slow.x"]);
    }
}
