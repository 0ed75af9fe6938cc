//! End-to-end saves against the in-memory acme with real tool scripts.

use std::path::{Path, PathBuf};

use aph_common::config::{AphConfig, RewriteStrategy, StageConfig};
use aph_common::pipeline::{PipelineError, Stage};
use aph_common::testing::{FakeAcme, TestLogger, TestPhase, init_global_test_logging, write_script};
use aph_common::{Addr, Coded, ErrorCode, SaveHandler};
use tempfile::TempDir;

#[ctor::ctor]
fn setup() {
    init_global_test_logging();
}

/// A project at `<tmp>/repo` with `src/main.x`, and tool scripts that log
/// `stage cwd args` lines to `<tmp>/calls`.
struct Project {
    tmp: TempDir,
    root: PathBuf,
    file: PathBuf,
}

impl Project {
    fn new(contents: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let base = std::fs::canonicalize(tmp.path()).unwrap();
        let root = base.join("repo");
        std::fs::create_dir_all(root.join("src")).unwrap();
        let file = root.join("src/main.x");
        std::fs::write(&file, contents).unwrap();
        Self { tmp, root, file }
    }

    fn bin(&self) -> PathBuf {
        let bin = self.tmp.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        bin
    }

    fn tool(&self, stage: Stage, exit: i32) -> StageConfig {
        let calls = self.tmp.path().join("calls");
        let script = write_script(
            &self.bin(),
            stage.name(),
            &format!(
                "#!/bin/sh\necho \"{} $(pwd) $*\" >> '{}'\necho \"{} output\"\nexit {exit}\n",
                stage.name(),
                calls.display(),
                stage.name(),
            ),
        );
        StageConfig::new(&script.to_string_lossy())
    }

    fn resolver(&self) -> String {
        write_script(
            &self.bin(),
            "root",
            &format!("#!/bin/sh\necho '{}'\n", self.root.display()),
        )
        .to_string_lossy()
        .into_owned()
    }

    fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.tmp.path().join("calls"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn config(&self, exits: [i32; 4]) -> AphConfig {
        let mut config = AphConfig::default();
        config.resolver.command = self.resolver();
        for (stage, exit) in Stage::ORDER.into_iter().zip(exits) {
            *config.stages.get_mut(stage) = self.tool(stage, exit);
        }
        config
    }

    fn name(&self) -> String {
        self.file.to_string_lossy().into_owned()
    }
}

fn root_window_name(root: &Path) -> String {
    format!("{}/", root.display())
}

#[test]
fn test_build_failure_stops_before_test() {
    let logger = TestLogger::for_test("save_pipeline::build_failure");
    let project = Project::new("x\n");
    let acme = FakeAcme::new();
    let id = acme.add_window(&project.name(), "x\n");

    let handler = SaveHandler::from_config(acme.handle(), &project.config([0, 0, 2, 0]));
    let report = handler.handle(id, &project.name()).unwrap();
    logger.log(TestPhase::Verify, format!("report: {:?}", report.stages));

    let root = project.root.display().to_string();
    assert_eq!(
        project.calls(),
        vec![
            format!("format {root} src/main.x"),
            format!("check {root} src/main.x"),
            format!("build {root} src/main.x"),
        ]
    );
    assert_eq!(report.ran(), vec![Stage::Format, Stage::Check, Stage::Build]);
    let err = report.into_result().unwrap_err();
    assert!(err.to_string().contains("build"));
    assert!(matches!(
        err,
        PipelineError::StageFailed {
            stage: Stage::Build,
            exit_code: Some(2),
            ..
        }
    ));
    assert_eq!(err.code(), ErrorCode::StageFailed);

    let log = acme
        .window_named(&root_window_name(&project.root))
        .expect("log window");
    assert_eq!(
        acme.errors(log),
        "format output\ncheck output\nbuild output\n"
    );
    logger.pass();
}

#[test]
fn test_check_failure_is_the_reported_error() {
    let project = Project::new("x\n");
    let acme = FakeAcme::new();
    let id = acme.add_window(&project.name(), "x\n");

    let handler = SaveHandler::from_config(acme.handle(), &project.config([0, 1, 0, 0]));
    let report = handler.handle(id, &project.name()).unwrap();
    assert_eq!(report.failed(), Some(Stage::Check));
    assert_eq!(project.calls().len(), 2);
}

#[test]
fn test_formatter_rewrite_refreshes_window() {
    let project = Project::new("a b");
    let acme = FakeAcme::new();
    let id = acme.add_window(&project.name(), "a b");
    acme.set_dot(id, 0, 1);

    let mut config = project.config([0, 0, 0, 0]);
    let formatter = write_script(&project.bin(), "fmt", "#!/bin/sh\nprintf 'a  b' > \"$1\"\n");
    config.stages.format = StageConfig::new(&formatter.to_string_lossy());

    let report = SaveHandler::from_config(acme.handle(), &config)
        .handle(id, &project.name())
        .unwrap();
    assert!(report.is_success());
    assert!(report.rewrote);
    assert_eq!(acme.body(id), "a  b");
    assert!(!acme.is_dirty(id));
    assert_eq!(acme.dot(id), Addr::new(0, 1));
    assert_eq!(project.calls().len(), 3);
}

#[test]
fn test_replace_strategy_keeps_undo_marks_balanced() {
    let project = Project::new("a b");
    let acme = FakeAcme::new();
    let id = acme.add_window(&project.name(), "a b");

    let mut config = project.config([0, 0, 0, 0]);
    config.watch.rewrite = RewriteStrategy::Replace;
    let formatter = write_script(&project.bin(), "fmt", "#!/bin/sh\nprintf 'a  b' > \"$1\"\n");
    config.stages.format = StageConfig::new(&formatter.to_string_lossy());

    SaveHandler::from_config(acme.handle(), &config)
        .handle(id, &project.name())
        .unwrap();
    let log = acme.ctl_log(id);
    let nomark = log.iter().position(|c| c == "nomark").unwrap();
    let mark = log.iter().position(|c| c == "mark").unwrap();
    assert!(nomark < mark);
    assert_eq!(acme.body(id), "a  b");
}

#[test]
fn test_ignore_marker_in_tag() {
    let project = Project::new("x\n");
    let acme = FakeAcme::new();
    let id = acme.add_window(&project.name(), "x\n");
    acme.set_tag_extra(id, " Del Snarf NoAph | Look");

    let report = SaveHandler::from_config(acme.handle(), &project.config([0, 0, 0, 0]))
        .handle(id, &project.name())
        .unwrap();
    assert!(report.ignored);
    assert!(project.calls().is_empty());
}

#[test]
fn test_resolver_failure_uses_file_directory() {
    let project = Project::new("x\n");
    let acme = FakeAcme::new();
    let id = acme.add_window(&project.name(), "x\n");

    let mut config = project.config([0, 0, 0, 0]);
    config.resolver.command = "false".into();
    SaveHandler::from_config(acme.handle(), &config)
        .handle(id, &project.name())
        .unwrap();

    let src = project.root.join("src");
    assert!(project.calls()[0].starts_with(&format!("format {} main.x", src.display())));
    assert!(acme.window_named(&root_window_name(&src)).is_some());
}

#[test]
fn test_named_log_window() {
    let project = Project::new("x\n");
    let acme = FakeAcme::new();
    let id = acme.add_window(&project.name(), "x\n");

    let mut config = project.config([0, 0, 0, 0]);
    config.watch.log_window = ".guide".into();
    SaveHandler::from_config(acme.handle(), &config)
        .handle(id, &project.name())
        .unwrap();

    let guide = acme
        .window_named(&project.root.join(".guide").to_string_lossy())
        .expect("guide window");
    assert!(acme.errors(guide).contains("test output"));
}

#[test]
fn test_window_closed_before_handling() {
    let project = Project::new("x\n");
    let acme = FakeAcme::new();
    let id = acme.add_window(&project.name(), "x\n");
    acme.delete_window(id);

    let err = SaveHandler::from_config(acme.handle(), &project.config([0, 0, 0, 0]))
        .handle(id, &project.name())
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::WindowNotFound);
    assert!(project.calls().is_empty());
}
