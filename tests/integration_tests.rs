//! Integration tests for chainrun
//!
//! These tests run whole pipelines through the library and the CLI.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use chainrun::links::{
    AssertInDs, Break, ForkDataCollector, ForkIndex, RepeatChain, SkipChainIfEmpty,
    SkipChainIfEmptyOptions, ToDs,
};
use chainrun::persistence;
use chainrun::store::DataStore;
use chainrun::{
    Chain, Link, LinkError, LinkResult, PersistMode, ProcessManager, RunError, Services, Settings,
    StatusCode, StoreError,
};

/// Helper to create a chainrun Command
fn chainrun() -> Command {
    cargo_bin_cmd!("chainrun")
}

fn settings_in(dir: &TempDir) -> Settings {
    Settings {
        analysis_name: "integration".to_string(),
        results_dir: dir.path().join("results"),
        ..Settings::default()
    }
}

fn write_pipeline(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("pipeline.toml");
    fs::write(&path, content).unwrap();
    path
}

type Journal = Arc<Mutex<Vec<String>>>;

/// Records every lifecycle call and returns a fixed status from execute.
#[derive(Clone)]
struct Recorder {
    name: String,
    status: StatusCode,
    journal: Journal,
}

impl Recorder {
    fn new(name: &str, status: StatusCode, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            status,
            journal: journal.clone(),
        }
    }

    fn log(&self, phase: &str) {
        self.journal.lock().unwrap().push(format!("{}:{}", phase, self.name));
    }
}

impl Link for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, _services: &mut Services) -> LinkResult {
        self.log("init");
        Ok(StatusCode::Success)
    }

    fn execute(&mut self, _services: &mut Services) -> LinkResult {
        self.log("exec");
        Ok(self.status)
    }

    fn finalize(&mut self, _services: &mut Services) -> LinkResult {
        self.log("final");
        Ok(StatusCode::Success)
    }
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

// =============================================================================
// Persistence and resume
// =============================================================================

mod persistence_tests {
    use super::*;

    fn two_chain_manager(settings: Settings) -> ProcessManager {
        let mut manager = ProcessManager::new(settings);
        manager
            .add(
                Chain::new("chain1")
                    .with_link(ToDs::with_value("store_a", "a", 1))
                    .unwrap(),
            )
            .unwrap();
        manager
            .add(
                Chain::new("chain2")
                    .with_link(AssertInDs::with_keys("check_a", &["a"]))
                    .unwrap()
                    .with_link(ToDs::with_value("store_b", "b", 2))
                    .unwrap(),
            )
            .unwrap();
        manager
    }

    #[tokio::test]
    async fn test_each_chain_persists_and_resumes() {
        let dir = TempDir::new().unwrap();

        let mut settings = settings_in(&dir);
        settings.persist = PersistMode::EachChain;
        let mut manager = two_chain_manager(settings.clone());
        let report = manager.run().await;
        assert!(report.is_success(), "{:?}", report.error);

        let service_dir = manager.services().service_data_dir();
        assert!(service_dir.join("_chain1").join("datastore.json").exists());
        assert!(service_dir.join("_chain2").join("datastore.json").exists());

        // A fresh manager resuming at chain2 imports chain1's DataStore
        let resumed_settings = settings.with_single_chain("chain2");
        let mut resumed = two_chain_manager(resumed_settings);
        let report = resumed.run().await;
        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(report.chains.len(), 1);
        assert_eq!(report.chains[0].name, "chain2");

        let ds = &resumed.services().datastore;
        assert_eq!(ds.get("a").unwrap(), &json!(1));
        assert_eq!(ds.get("b").unwrap(), &json!(2));
    }

    #[tokio::test]
    async fn test_resume_without_snapshot_fails() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir).with_single_chain("chain2");

        let mut manager = two_chain_manager(settings);
        let report = manager.run().await;

        assert!(!report.is_success());
        assert!(matches!(report.error, Some(RunError::Persistence(_))));
        assert!(report.chains.is_empty());
    }

    #[tokio::test]
    async fn test_last_chain_persists_only_final_chain() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_in(&dir);
        settings.persist = PersistMode::LastChain;

        let mut manager = two_chain_manager(settings);
        let report = manager.run().await;
        assert!(report.is_success());

        let service_dir = manager.services().service_data_dir();
        assert!(!service_dir.join("_chain1").exists());
        assert!(service_dir.join("_chain2").join("datastore.json").exists());

        let marker = fs::read_to_string(service_dir.join("latest")).unwrap();
        assert_eq!(marker.trim(), "_chain2");
    }

    #[tokio::test]
    async fn test_snapshot_unchanged_by_later_chain() {
        let dir = TempDir::new().unwrap();
        let slot = dir.path().join("slots").join("start.json");

        let mut manager = ProcessManager::new(settings_in(&dir));
        manager.services_mut().datastore.set("number", 1);
        persistence::persist(&manager.services().datastore, &slot).unwrap();

        manager
            .add(
                Chain::new("Start")
                    .with_link(ToDs::with_value("set_number", "number", 2).force(true))
                    .unwrap(),
            )
            .unwrap();
        let report = manager.run().await;
        assert!(report.is_success(), "{:?}", report.error);

        let restored: DataStore = persistence::restore(&slot).unwrap();
        assert_eq!(restored.get_i64("number").unwrap(), 1);
        assert_eq!(manager.services().datastore.get_i64("number").unwrap(), 2);
    }
}

// =============================================================================
// Forked chains
// =============================================================================

mod forking {
    use super::*;

    #[tokio::test]
    async fn test_fork_collects_every_worker_index() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_in(&dir);
        settings.max_workers = Some(8);

        let mut manager = ProcessManager::new(settings);
        manager
            .add(
                Chain::new("fork")
                    .with_fork(100)
                    .with_link(ForkIndex::with_store_key("index", "collected"))
                    .unwrap()
                    .with_link(ForkDataCollector::with_keys("collector", &["collected"]))
                    .unwrap(),
            )
            .unwrap();

        let report = manager.run().await;
        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(report.chain("fork").unwrap().fork_width, 100);

        let collected = manager.services().datastore.get_list("collected").unwrap();
        let mut indices: Vec<u64> = collected.iter().filter_map(Value::as_u64).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..100).collect::<Vec<u64>>());

        // Fork bookkeeping does not leak into the next chain
        assert!(!manager.services().config.is_forked());
    }

    #[tokio::test]
    async fn test_fork_failure_reports_chain() {
        let dir = TempDir::new().unwrap();
        let journal: Journal = Arc::default();

        let mut manager = ProcessManager::new(settings_in(&dir));
        manager
            .add(
                Chain::new("fork")
                    .with_fork(4)
                    .with_link(Recorder::new("fails", StatusCode::Failure, &journal))
                    .unwrap(),
            )
            .unwrap();
        manager
            .add(
                Chain::new("after")
                    .with_link(Recorder::new("never", StatusCode::Success, &journal))
                    .unwrap(),
            )
            .unwrap();

        let report = manager.run().await;
        assert!(!report.is_success());
        let error = report.error.unwrap();
        assert_eq!(error.chain(), Some("fork"));
        assert_eq!(error.link(), Some("fails"));
        assert!(!entries(&journal).iter().any(|e| e.ends_with(":never")));
    }

    /// Reads a key nobody stored.
    #[derive(Clone)]
    struct Reader;

    impl Link for Reader {
        fn name(&self) -> &str {
            "reader"
        }

        fn execute(&mut self, services: &mut Services) -> LinkResult {
            services.datastore.get("absent")?;
            Ok(StatusCode::Success)
        }
    }

    #[tokio::test]
    async fn test_fork_failure_keeps_link_and_error_kind() {
        let dir = TempDir::new().unwrap();

        let mut manager = ProcessManager::new(settings_in(&dir));
        manager
            .add(Chain::new("fork").with_fork(3).with_link(Reader).unwrap())
            .unwrap();

        let report = manager.run().await;
        let error = report.error.unwrap();
        assert_eq!(error.chain(), Some("fork"));
        assert_eq!(error.link(), Some("reader"));
        assert!(matches!(error, RunError::WorkerFailure { worker: 0, .. }));

        let link_error = std::error::Error::source(&error)
            .and_then(|inner| inner.source())
            .and_then(|e| e.downcast_ref::<LinkError>());
        match link_error {
            Some(LinkError::Store(StoreError::KeyNotFound { key })) => {
                assert_eq!(key, "absent")
            }
            other => panic!("Expected KeyNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_repeat_inside_fork_runs_per_worker() {
        let dir = TempDir::new().unwrap();
        let journal: Journal = Arc::default();

        let mut manager = ProcessManager::new(settings_in(&dir));
        manager
            .add(
                Chain::new("fork")
                    .with_fork(4)
                    .with_link(Recorder::new("work", StatusCode::Success, &journal))
                    .unwrap()
                    .with_link(RepeatChain::with_max_count("again", 2))
                    .unwrap(),
            )
            .unwrap();

        let report = manager.run().await;
        assert!(report.is_success(), "{:?}", report.error);
        let chain = report.chain("fork").unwrap();
        assert_eq!(chain.repeats, 2);
        assert_eq!(chain.executed_links, 2);

        let log = entries(&journal);
        let count = |entry: &str| log.iter().filter(|e| *e == entry).count();
        // Initialize runs once in the parent, execute three passes per worker
        assert_eq!(count("init:work"), 1);
        assert_eq!(count("exec:work"), 12);
        assert_eq!(count("final:work"), 4);
    }

    #[tokio::test]
    async fn test_repeat_ceiling_inside_fork_fails_run() {
        let dir = TempDir::new().unwrap();
        let journal: Journal = Arc::default();

        let mut manager = ProcessManager::new(settings_in(&dir));
        manager
            .add(
                Chain::new("fork")
                    .with_fork(3)
                    .with_repeat_limit(1)
                    .with_link(Recorder::new("spin", StatusCode::RepeatChain, &journal))
                    .unwrap(),
            )
            .unwrap();

        let report = manager.run().await;
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.chain("fork").unwrap().repeats, 1);
        match report.error {
            Some(RunError::WorkerFailure { worker, source, .. }) => {
                assert_eq!(worker, 0);
                assert!(matches!(*source, RunError::RepeatLimitExceeded { limit: 1, .. }));
            }
            other => panic!("Expected WorkerFailure, got {:?}", other),
        }
        assert!(!entries(&journal).contains(&"final:spin".to_string()));
    }
}

// =============================================================================
// Control-flow signals
// =============================================================================

mod signals {
    use super::*;

    #[tokio::test]
    async fn test_failure_stops_later_chains() {
        let dir = TempDir::new().unwrap();
        let journal: Journal = Arc::default();

        let mut manager = ProcessManager::new(settings_in(&dir));
        manager
            .add(
                Chain::new("first")
                    .with_link(Recorder::new("ok", StatusCode::Success, &journal))
                    .unwrap()
                    .with_link(Break::failure("stop"))
                    .unwrap(),
            )
            .unwrap();
        manager
            .add(
                Chain::new("second")
                    .with_link(Recorder::new("late", StatusCode::Success, &journal))
                    .unwrap(),
            )
            .unwrap();

        let report = manager.run().await;
        assert_eq!(report.status, StatusCode::Failure);
        assert_eq!(report.exit_code(), 1);
        let error = report.error.as_ref().unwrap();
        assert_eq!(error.chain(), Some("first"));
        assert_eq!(error.link(), Some("stop"));

        // The later chain is never initialized
        assert_eq!(entries(&journal), vec!["init:ok", "exec:ok"]);
    }

    #[tokio::test]
    async fn test_repeat_does_not_reinitialize() {
        let dir = TempDir::new().unwrap();
        let journal: Journal = Arc::default();

        let mut manager = ProcessManager::new(settings_in(&dir));
        manager
            .add(
                Chain::new("loop")
                    .with_link(Recorder::new("work", StatusCode::Success, &journal))
                    .unwrap()
                    .with_link(RepeatChain::with_max_count("again", 2))
                    .unwrap(),
            )
            .unwrap();

        let report = manager.run().await;
        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(report.chain("loop").unwrap().repeats, 2);
        assert_eq!(
            entries(&journal),
            vec!["init:work", "exec:work", "exec:work", "exec:work", "final:work"]
        );
    }

    #[tokio::test]
    async fn test_repeat_ceiling_fails_run() {
        let dir = TempDir::new().unwrap();
        let journal: Journal = Arc::default();

        let mut manager = ProcessManager::new(settings_in(&dir));
        manager
            .add(
                Chain::new("endless")
                    .with_repeat_limit(5)
                    .with_link(Recorder::new("spin", StatusCode::RepeatChain, &journal))
                    .unwrap(),
            )
            .unwrap();

        let report = manager.run().await;
        assert!(matches!(
            report.error,
            Some(RunError::RepeatLimitExceeded { limit: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_skip_finalizes_initialized_links_and_continues() {
        let dir = TempDir::new().unwrap();
        let journal: Journal = Arc::default();

        let mut manager = ProcessManager::new(settings_in(&dir));
        manager
            .add(
                Chain::new("skipped")
                    .with_link(Recorder::new("before", StatusCode::Success, &journal))
                    .unwrap()
                    .with_link(SkipChainIfEmpty::new(SkipChainIfEmptyOptions {
                        name: "empty_check".to_string(),
                        keys: vec!["rows".to_string()],
                        skip_missing: true,
                        skip_zero_len: true,
                        check_at_initialize: false,
                        check_at_execute: true,
                    }))
                    .unwrap()
                    .with_link(Recorder::new("after", StatusCode::Success, &journal))
                    .unwrap(),
            )
            .unwrap();
        manager
            .add(
                Chain::new("next")
                    .with_link(Recorder::new("next", StatusCode::Success, &journal))
                    .unwrap(),
            )
            .unwrap();
        manager.services_mut().datastore.set("rows", json!([]));

        let report = manager.run().await;
        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(report.chain("skipped").unwrap().status, StatusCode::SkipChain);

        let log = entries(&journal);
        assert!(log.contains(&"final:before".to_string()));
        assert!(log.contains(&"init:after".to_string()));
        assert!(!log.contains(&"exec:after".to_string()));
        // Initialized links are finalized even when the skip came first
        assert!(log.contains(&"final:after".to_string()));
        assert!(log.contains(&"exec:next".to_string()));
    }

    #[tokio::test]
    async fn test_break_chain_completes_run() {
        let dir = TempDir::new().unwrap();
        let journal: Journal = Arc::default();

        let mut manager = ProcessManager::new(settings_in(&dir));
        manager
            .add(
                Chain::new("stopper")
                    .with_link(Break::break_chain("halt"))
                    .unwrap(),
            )
            .unwrap();
        manager
            .add(
                Chain::new("unreached")
                    .with_link(Recorder::new("unreached", StatusCode::Success, &journal))
                    .unwrap(),
            )
            .unwrap();

        let report = manager.run().await;
        assert!(report.is_success());
        assert_eq!(report.status, StatusCode::BreakChain);
        assert_eq!(report.exit_code(), 0);
        assert!(entries(&journal).is_empty());
    }
}

// =============================================================================
// CLI
// =============================================================================

mod cli {
    use super::*;

    const PIPELINE: &str = r#"
[settings]
analysis_name = "cli"
persist = "last_chain"

[[chains]]
name = "Start"

[[chains.links]]
type = "to_ds"
store_key = "number"
value = 2

[[chains]]
name = "Fork"
fork = 5

[[chains.links]]
type = "fork_index"
store_key = "collected"

[[chains.links]]
type = "fork_data_collector"
keys = ["collected"]
"#;

    const FAILING_PIPELINE: &str = r#"
[[chains]]
name = "Broken"

[[chains.links]]
type = "assert_in_ds"
keys = ["missing"]
"#;

    #[test]
    fn test_chainrun_help() {
        chainrun().arg("--help").assert().success();
    }

    #[test]
    fn test_chainrun_version() {
        chainrun().arg("--version").assert().success();
    }

    #[test]
    fn test_run_pipeline() {
        let dir = TempDir::new().unwrap();
        let pipeline = write_pipeline(&dir, PIPELINE);

        chainrun()
            .current_dir(dir.path())
            .arg("run")
            .arg(&pipeline)
            .arg("--results-dir")
            .arg(dir.path().join("out"))
            .assert()
            .success()
            .stdout(predicate::str::contains("Start"))
            .stdout(predicate::str::contains("Run completed"));

        let snapshot = dir
            .path()
            .join("out/cli/proc_service_data/v0/_Fork/datastore.json");
        let content = fs::read_to_string(snapshot).unwrap();
        let ds: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(ds["number"], json!(2));
        assert_eq!(ds["collected"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_run_json_report() {
        let dir = TempDir::new().unwrap();
        let pipeline = write_pipeline(&dir, PIPELINE);

        let output = chainrun()
            .current_dir(dir.path())
            .args(["run", "--json", "--persist", "none"])
            .arg(&pipeline)
            .output()
            .unwrap();
        assert!(output.status.success());

        let report: Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["chains"].as_array().unwrap().len(), 2);
        assert!(report["error"].is_null());
    }

    #[test]
    fn test_run_failure_exit_code() {
        let dir = TempDir::new().unwrap();
        let pipeline = write_pipeline(&dir, FAILING_PIPELINE);

        chainrun()
            .current_dir(dir.path())
            .arg("run")
            .arg(&pipeline)
            .assert()
            .code(1)
            .stdout(predicate::str::contains("Run failed"));
    }

    #[test]
    fn test_run_unknown_chain() {
        let dir = TempDir::new().unwrap();
        let pipeline = write_pipeline(&dir, PIPELINE);

        chainrun()
            .current_dir(dir.path())
            .arg("run")
            .arg(&pipeline)
            .args(["--end-with", "Nope"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("Nope"));
    }

    #[test]
    fn test_run_missing_pipeline() {
        let dir = TempDir::new().unwrap();

        chainrun()
            .current_dir(dir.path())
            .args(["run", "does-not-exist.toml"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("does-not-exist.toml"));
    }

    #[test]
    fn test_run_with_settings_file_and_profile() {
        let dir = TempDir::new().unwrap();
        let pipeline = write_pipeline(&dir, PIPELINE);
        let settings = dir.path().join("chainrun.toml");
        fs::write(&settings, "analysis_name = \"from_file\"\npersist = \"last_chain\"\n").unwrap();

        chainrun()
            .current_dir(dir.path())
            .arg("run")
            .arg(&pipeline)
            .arg("--settings")
            .arg(&settings)
            .arg("--results-dir")
            .arg(dir.path().join("out"))
            .arg("--profile")
            .assert()
            .success()
            .stdout(predicate::str::contains("Link timings"))
            .stdout(predicate::str::contains("ForkIndex"));

        assert!(dir.path().join("out/from_file/proc_service_data").exists());
        assert!(!dir.path().join("out/cli").exists());
    }

    #[test]
    fn test_event_looper_prints_input_lines() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("words.txt"), "# words\ncherry\napple\ncherry\n").unwrap();
        let pipeline = write_pipeline(
            &dir,
            r#"
[[chains]]
name = "Lines"

[[chains.links]]
type = "event_looper"
filename = "words.txt"
store_key = "words"
sort = true
unique = true

[[chains.links]]
type = "line_printer"
read_key = "words"
"#,
        );

        chainrun()
            .current_dir(dir.path())
            .arg("run")
            .arg(&pipeline)
            .assert()
            .success()
            .stdout(predicate::str::contains("apple\ncherry\n"))
            .stdout(predicate::str::contains("# words").not());
    }

    #[test]
    fn test_chains_lists_links() {
        let dir = TempDir::new().unwrap();
        let pipeline = write_pipeline(&dir, PIPELINE);

        chainrun()
            .arg("chains")
            .arg(&pipeline)
            .assert()
            .success()
            .stdout(predicate::str::contains("2 chain(s)"))
            .stdout(predicate::str::contains("Fork (fork 5)"))
            .stdout(predicate::str::contains("ForkDataCollector"));
    }
}
