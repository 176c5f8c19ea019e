//! Dispatcher integration tests against an in-memory backend
//!
//! Exercises the parse -> route -> authorize -> dispatch path, the
//! unauthenticated gate, the unknown-verb passthrough, and a full bulk
//! transfer driven through the engine.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;

use ps_cli::dispatch::{Dispatcher, LoopSignal};
use ps_cli::exit_code::ExitCode;
use ps_cli::output::{OutputConfig, Printer};
use ps_core::{
    Backend, BackendKind, Config, ConfigManager, Confirm, Credentials, EndpointDescriptor, Error,
    InfoStream, LineStream, MountTable, ProgressFn, PutOutcome, Result, SessionManager,
    TransferItem, TransferPlan, VPath,
};

/// In-memory backend recording what the dispatcher asked of it
struct MemBackend {
    authed: AtomicBool,
    commands: AtomicU64,
    gets: AtomicU64,
}

impl MemBackend {
    fn new(authed: bool) -> Self {
        Self {
            authed: AtomicBool::new(authed),
            commands: AtomicU64::new(0),
            gets: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Backend for MemBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::S3
    }
    async fn connect(&self) -> Result<()> {
        Ok(())
    }
    async fn login(&self, _credentials: Option<Credentials>) -> Result<()> {
        self.authed.store(true, Ordering::SeqCst);
        Ok(())
    }
    async fn logout(&self) -> Result<()> {
        self.authed.store(false, Ordering::SeqCst);
        Ok(())
    }
    async fn endpoint(&self) -> EndpointDescriptor {
        EndpointDescriptor::new(BackendKind::S3, "https://mem.example.com")
    }
    async fn status(&self) -> String {
        "mem".into()
    }
    async fn authenticated(&self) -> bool {
        self.authed.load(Ordering::SeqCst)
    }
    async fn cd(&self, path: &VPath) -> Result<VPath> {
        Ok(path.clone())
    }
    async fn ls(&self, _pattern: &VPath) -> Result<LineStream> {
        Ok(Box::pin(futures::stream::iter(vec![
            Ok("[Folder] sub/".to_string()),
            Ok("          42 | a.txt".to_string()),
        ])))
    }
    async fn info(&self, _path: &VPath) -> Result<InfoStream> {
        Ok(Box::pin(futures::stream::iter(vec![Ok((
            "content-length".to_string(),
            "42".to_string(),
        ))])))
    }
    async fn get_plan(&self, pattern: &VPath, local_dir: &Path) -> Result<TransferPlan> {
        let items = (0..3)
            .map(|i| TransferItem {
                source: pattern.child(&format!("f{i}")).as_str().to_string(),
                dest: local_dir.join(format!("f{i}")).to_string_lossy().into_owned(),
                expected_bytes: Some(10),
                handle: None,
            })
            .collect();
        Ok(TransferPlan::from_items(items))
    }
    async fn get(&self, item: &TransferItem, _progress: ProgressFn) -> Result<u64> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(item.expected_bytes.unwrap_or(0))
    }
    async fn put(
        &self,
        _remote_dir: &VPath,
        local_file: &Path,
        _progress: ProgressFn,
    ) -> Result<PutOutcome> {
        Ok(PutOutcome::Stored(std::fs::metadata(local_file)?.len()))
    }
    async fn mkdir(&self, _path: &VPath) -> Result<()> {
        Ok(())
    }
    async fn rmdir(&self, _path: &VPath, _confirm: Confirm<'_>) -> Result<()> {
        Ok(())
    }
    async fn rm(&self, _pattern: &VPath, confirm: Confirm<'_>) -> Result<u64> {
        if !confirm("delete?") {
            return Err(Error::Cancelled);
        }
        Ok(2)
    }
    async fn command(&self, _line: &str) -> Result<String> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        Ok("<result/>".to_string())
    }
}

fn quiet_printer() -> Printer {
    Printer::new(OutputConfig {
        quiet: true,
        no_progress: true,
        ..Default::default()
    })
}

fn session(dir: &tempfile::TempDir) -> SessionManager {
    let cm = ConfigManager::with_path(dir.path().join("config.toml"));
    cm.save(&Config::default()).unwrap();
    SessionManager::new(cm, "default")
}

fn dispatcher_with(backend: Arc<MemBackend>) -> (Dispatcher, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut router = MountTable::new();
    router.mount("/data", backend).unwrap();
    let dispatcher = Dispatcher::new(router, session(&dir), quiet_printer(), 4, true, false)
        .unwrap();
    (dispatcher, dir)
}

#[tokio::test]
async fn test_local_verbs_run_without_mounts() {
    let dir = tempfile::tempdir().unwrap();
    let router = MountTable::new();
    let mut dispatcher =
        Dispatcher::new(router, session(&dir), quiet_printer(), 4, true, false).unwrap();

    assert_eq!(
        dispatcher.dispatch("pwd").await,
        LoopSignal::Continue(ExitCode::Success)
    );
    assert_eq!(
        dispatcher.dispatch("lpwd").await,
        LoopSignal::Continue(ExitCode::Success)
    );
}

#[tokio::test]
async fn test_remote_verb_requires_authentication() {
    let backend = Arc::new(MemBackend::new(false));
    let (mut dispatcher, _dir) = dispatcher_with(Arc::clone(&backend));

    assert_eq!(
        dispatcher.dispatch("ls /data").await,
        LoopSignal::Continue(ExitCode::AuthError)
    );

    backend.authed.store(true, Ordering::SeqCst);
    assert_eq!(
        dispatcher.dispatch("ls /data").await,
        LoopSignal::Continue(ExitCode::Success)
    );
}

#[tokio::test]
async fn test_no_backend_for_unmounted_path() {
    let backend = Arc::new(MemBackend::new(true));
    let (mut dispatcher, _dir) = dispatcher_with(backend);

    assert_eq!(
        dispatcher.dispatch("ls /elsewhere").await,
        LoopSignal::Continue(ExitCode::NotFound)
    );
}

#[tokio::test]
async fn test_cd_then_relative_ls() {
    let backend = Arc::new(MemBackend::new(true));
    let (mut dispatcher, _dir) = dispatcher_with(backend);

    assert_eq!(
        dispatcher.dispatch("cd /data/sub").await,
        LoopSignal::Continue(ExitCode::Success)
    );
    assert!(dispatcher.prompt().contains("/data/sub"));
    assert_eq!(
        dispatcher.dispatch("ls .").await,
        LoopSignal::Continue(ExitCode::Success)
    );
}

#[tokio::test]
async fn test_unknown_verb_forwards_to_adapter() {
    let backend = Arc::new(MemBackend::new(true));
    let (mut dispatcher, _dir) = dispatcher_with(Arc::clone(&backend));

    dispatcher.dispatch("cd /data").await;
    assert_eq!(
        dispatcher.dispatch("asset.query :where \"name='x'\"").await,
        LoopSignal::Continue(ExitCode::Success)
    );
    assert_eq!(backend.commands.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_verb_gated_when_unauthenticated() {
    let backend = Arc::new(MemBackend::new(false));
    let dir = tempfile::tempdir().unwrap();
    let mut router = MountTable::new();
    router.mount("/", Arc::clone(&backend) as Arc<dyn Backend>).unwrap();
    let mut dispatcher =
        Dispatcher::new(router, session(&dir), quiet_printer(), 4, true, false).unwrap();

    assert_eq!(
        dispatcher.dispatch("whatever.verb").await,
        LoopSignal::Continue(ExitCode::AuthError)
    );
    assert_eq!(backend.commands.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cd_gated_when_unauthenticated() {
    let backend = Arc::new(MemBackend::new(false));
    let (mut dispatcher, _dir) = dispatcher_with(backend);

    assert_eq!(
        dispatcher.dispatch("cd /data/sub").await,
        LoopSignal::Continue(ExitCode::AuthError)
    );
    assert_eq!(dispatcher.prompt(), "pshell:/> ");
}

#[tokio::test]
async fn test_get_runs_plan_through_engine() {
    let backend = Arc::new(MemBackend::new(true));
    let (mut dispatcher, _dir) = dispatcher_with(Arc::clone(&backend));
    let dest = tempfile::tempdir().unwrap();

    let line = format!("get /data/pics {}", dest.path().display());
    assert_eq!(
        dispatcher.dispatch(&line).await,
        LoopSignal::Continue(ExitCode::Success)
    );
    assert_eq!(backend.gets.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_rm_with_assumed_yes_confirms() {
    let backend = Arc::new(MemBackend::new(true));
    let (mut dispatcher, _dir) = dispatcher_with(backend);

    assert_eq!(
        dispatcher.dispatch("rm /data/a.txt").await,
        LoopSignal::Continue(ExitCode::Success)
    );
}

#[tokio::test]
async fn test_quit_and_empty_lines() {
    let backend = Arc::new(MemBackend::new(true));
    let (mut dispatcher, _dir) = dispatcher_with(backend);

    assert_eq!(
        dispatcher.dispatch("").await,
        LoopSignal::Continue(ExitCode::Success)
    );
    assert_eq!(dispatcher.dispatch("quit").await, LoopSignal::Quit);
    assert_eq!(dispatcher.dispatch("exit").await, LoopSignal::Quit);
}

#[tokio::test]
async fn test_processes_reports_and_resizes() {
    let backend = Arc::new(MemBackend::new(true));
    let (mut dispatcher, _dir) = dispatcher_with(backend);

    assert_eq!(
        dispatcher.dispatch("processes").await,
        LoopSignal::Continue(ExitCode::Success)
    );
    assert_eq!(
        dispatcher.dispatch("processes 8").await,
        LoopSignal::Continue(ExitCode::Success)
    );
    assert_eq!(
        dispatcher.dispatch("processes eight").await,
        LoopSignal::Continue(ExitCode::UsageError)
    );
}

#[tokio::test]
async fn test_put_uploads_local_file() {
    let backend = Arc::new(MemBackend::new(true));
    let (mut dispatcher, _dir) = dispatcher_with(backend);
    let src = tempfile::tempdir().unwrap();
    std::fs::write(src.path().join("up.bin"), vec![0u8; 128]).unwrap();

    let line = format!("put /data/incoming {}", src.path().join("up.bin").display());
    assert_eq!(
        dispatcher.dispatch(&line).await,
        LoopSignal::Continue(ExitCode::Success)
    );
}
