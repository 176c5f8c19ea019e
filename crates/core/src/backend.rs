//! Backend contract
//!
//! Every storage adapter implements [`Backend`]. Inputs are virtual paths
//! already covered by the adapter's mount; the adapter strips its own prefix
//! and never applies the router's cwd. Outputs never leak backend-native
//! path syntax.
//!
//! Listings and transfer plans are lazy, finite, single-pass pull streams.
//! A [`TransferPlan`] carries its `(files, bytes)` header in the struct so
//! totals are always known before the first item is drained.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::endpoint::{BackendKind, Credentials, DelegateLifetime, EndpointDescriptor, SsoKeySet};
use crate::error::{Error, Result};
use crate::vpath::VPath;

/// Lazy sequence of display lines (`ls`)
pub type LineStream = BoxStream<'static, Result<String>>;

/// Lazy sequence of key/value rows (`file`/info)
pub type InfoStream = BoxStream<'static, Result<(String, String)>>;

/// Lazy sequence of transfer items
pub type ItemStream = BoxStream<'static, Result<TransferItem>>;

/// Byte-progress callback invoked with deltas as data moves
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Progress callback that discards updates
pub fn noop_progress() -> ProgressFn {
    Arc::new(|_| {})
}

/// Destructive-operation confirmation callback; receives a one-line prompt
pub type Confirm<'a> = &'a (dyn Fn(&str) -> bool + Send + Sync);

/// One (source, destination) pair processed by a transfer worker
#[derive(Debug, Clone)]
pub struct TransferItem {
    /// Source: virtual path for downloads, local path for uploads
    pub source: String,

    /// Destination: local path for downloads, virtual directory for uploads
    pub dest: String,

    /// Size announced by the planner, when known
    pub expected_bytes: Option<u64>,

    /// Backend-opaque source handle (asset id, data URL); round-tripped
    /// from the planner to the per-file primitive untouched
    pub handle: Option<String>,
}

/// A planned bulk transfer: totals first, then the items
pub struct TransferPlan {
    /// Number of files the plan will yield
    pub files: u64,

    /// Total bytes across all files
    pub bytes: u64,

    /// The items, yielded lazily and exactly once
    pub items: ItemStream,
}

impl TransferPlan {
    /// Build a plan from an already-materialized item list
    pub fn from_items(items: Vec<TransferItem>) -> Self {
        let files = items.len() as u64;
        let bytes = items.iter().filter_map(|i| i.expected_bytes).sum();
        Self {
            files,
            bytes,
            items: Box::pin(futures::stream::iter(items.into_iter().map(Ok))),
        }
    }
}

impl std::fmt::Debug for TransferPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferPlan")
            .field("files", &self.files)
            .field("bytes", &self.bytes)
            .finish_non_exhaustive()
    }
}

/// Result of a single `put`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Uploaded this many bytes
    Stored(u64),
    /// Elided: destination already holds identical content
    Skipped,
}

/// Lifecycle rule knob: day count plus enable toggle
#[derive(Debug, Clone, Copy)]
pub struct LifecycleRuleSpec {
    /// Day threshold for the rule
    pub days: u32,
    /// Whether the rule is active
    pub enabled: bool,
}

/// `lifecycle` verb payload
#[derive(Debug, Clone)]
pub enum LifecycleAction {
    /// Report current lifecycle and versioning state
    Show,
    /// Install the bucket lifecycle configuration
    Set {
        /// Abort-incomplete-multipart-upload rule
        abort_multipart: Option<LifecycleRuleSpec>,
        /// Expire-noncurrent-versions rule
        expire_noncurrent: Option<LifecycleRuleSpec>,
    },
    /// Toggle versioning: `true` → Enabled, `false` → Suspended
    Versioning(bool),
}

/// Contract implemented by each storage adapter.
///
/// An adapter in state *unauthenticated* fails every operation except
/// `connect`, `login`, and `status`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Which adapter this is
    fn kind(&self) -> BackendKind;

    /// Probe reachability and, where a token is stored, reestablish the
    /// session
    async fn connect(&self) -> Result<()>;

    /// Authenticate; `None` means use stored credentials or tokens
    async fn login(&self, credentials: Option<Credentials>) -> Result<()>;

    /// Drop the session
    async fn logout(&self) -> Result<()>;

    /// Create or destroy a delegated token
    async fn delegate(&self, lifetime: DelegateLifetime) -> Result<Option<String>> {
        let _ = lifetime;
        Err(Error::Unsupported("token delegation".into()))
    }

    /// Current endpoint descriptor (with live token material)
    async fn endpoint(&self) -> EndpointDescriptor;

    /// One-line human-readable status
    async fn status(&self) -> String;

    /// Whether the adapter currently holds a usable session
    async fn authenticated(&self) -> bool;

    /// Validate a directory path and return its canonical form
    async fn cd(&self, path: &VPath) -> Result<VPath>;

    /// List entries; directories are distinguished by their line prefix
    async fn ls(&self, pattern: &VPath) -> Result<LineStream>;

    /// Metadata rows for a path
    async fn info(&self, path: &VPath) -> Result<InfoStream>;

    /// Plan a download of everything matching `pattern` into `local_dir`
    async fn get_plan(&self, pattern: &VPath, local_dir: &Path) -> Result<TransferPlan>;

    /// Fetch one planned file; returns bytes transferred
    async fn get(&self, item: &TransferItem, progress: ProgressFn) -> Result<u64>;

    /// Upload one local file into a remote directory.
    ///
    /// Must return [`PutOutcome::Skipped`] without touching the wire when
    /// the destination already holds an object of identical length (and
    /// checksum, where cheaply available).
    async fn put(&self, remote_dir: &VPath, local_file: &Path, progress: ProgressFn)
        -> Result<PutOutcome>;

    /// Create a container or directory
    async fn mkdir(&self, path: &VPath) -> Result<()>;

    /// Remove a directory; non-empty removal requires confirmation
    async fn rmdir(&self, path: &VPath, confirm: Confirm<'_>) -> Result<()>;

    /// Remove files matching a pattern; returns the number removed
    async fn rm(&self, pattern: &VPath, confirm: Confirm<'_>) -> Result<u64>;

    /// Make matching content publicly readable; returns one line per
    /// affected entry (policy grant or presigned URL)
    async fn publish(&self, pattern: &VPath) -> Result<Vec<String>> {
        let _ = pattern;
        Err(Error::Unsupported("publish".into()))
    }

    /// Revoke prior grants; returns the number of statements removed
    async fn unpublish(&self, pattern: &VPath) -> Result<u64> {
        let _ = pattern;
        Err(Error::Unsupported("unpublish".into()))
    }

    /// Bucket lifecycle and versioning management
    async fn lifecycle(&self, path: &VPath, action: &LifecycleAction) -> Result<Vec<String>> {
        let _ = (path, action);
        Err(Error::Unsupported("lifecycle management".into()))
    }

    /// Same-backend copy; `peer` is set when the destination resolves to a
    /// different mount of the same kind
    async fn copy(
        &self,
        src: &VPath,
        dst: &VPath,
        peer: Option<Arc<dyn Backend>>,
        confirm: Confirm<'_>,
    ) -> Result<()> {
        let _ = (src, dst, peer, confirm);
        Err(Error::Unsupported("copy".into()))
    }

    /// Raw passthrough for verbs the dispatcher does not know
    async fn command(&self, line: &str) -> Result<String> {
        Err(Error::Unsupported(format!("command: {line}")))
    }

    /// Authenticated actor name, for SSO bootstrap
    async fn identity(&self) -> Result<String> {
        Err(Error::Unsupported("identity".into()))
    }

    /// Project-scoped credentials for provisioning a peer backend
    async fn sso_keys(&self) -> Result<Vec<SsoKeySet>> {
        Err(Error::Unsupported("SSO key retrieval".into()))
    }
}

/// Constructs adapters from descriptors; implemented where the adapter
/// crates are linked together
pub trait BackendFactory: Send + Sync {
    /// Build a backend client for a mount prefix and its descriptor.
    ///
    /// Adapters strip the prefix themselves, so they need to know it.
    fn create(&self, prefix: &str, descriptor: &EndpointDescriptor) -> Result<Arc<dyn Backend>>;
}

/// Local upload planning: walk a directory tree and emit one item per file,
/// totals first. Used by the dispatcher for `put` of a directory.
pub fn plan_local_uploads(local: &Path, remote_dir: &VPath) -> Result<TransferPlan> {
    fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                out.push(path);
            } else if path.is_dir() {
                walk(&path, out)?;
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    if local.is_file() {
        files.push(local.to_path_buf());
    } else if local.is_dir() {
        walk(local, &mut files)?;
    } else {
        return Err(Error::NotFound(local.display().to_string()));
    }

    let base = if local.is_dir() { local } else { local.parent().unwrap_or(local) };
    let mut items = Vec::with_capacity(files.len());
    for path in files {
        let size = std::fs::metadata(&path)?.len();
        let rel = path
            .strip_prefix(base)
            .unwrap_or(&path)
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let dest = if rel.is_empty() {
            remote_dir.clone()
        } else {
            VPath::new(&format!("{}/{}", remote_dir.as_str(), rel))?
        };
        items.push(TransferItem {
            source: path.to_string_lossy().into_owned(),
            dest: dest.as_str().to_string(),
            expected_bytes: Some(size),
            handle: None,
        });
    }
    Ok(TransferPlan::from_items(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_plan_totals_precede_items() {
        let items = vec![
            TransferItem {
                source: "/a/x".into(),
                dest: "/tmp/x".into(),
                expected_bytes: Some(10),
                handle: None,
            },
            TransferItem {
                source: "/a/y".into(),
                dest: "/tmp/y".into(),
                expected_bytes: Some(32),
                handle: None,
            },
        ];
        let plan = TransferPlan::from_items(items);
        assert_eq!(plan.files, 2);
        assert_eq!(plan.bytes, 42);
    }

    #[tokio::test]
    async fn test_plan_items_drain_once() {
        let plan = TransferPlan::from_items(vec![TransferItem {
            source: "/a".into(),
            dest: "/b".into(),
            expected_bytes: None,
            handle: None,
        }]);
        let drained: Vec<_> = plan.items.collect().await;
        assert_eq!(drained.len(), 1);
    }

    #[test]
    fn test_local_upload_walker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"world!").unwrap();

        let remote = VPath::new("/bucket/dest").unwrap();
        let plan = plan_local_uploads(dir.path(), &remote).unwrap();
        assert_eq!(plan.files, 2);
        assert_eq!(plan.bytes, 11);
    }

    #[test]
    fn test_local_upload_missing_source() {
        let remote = VPath::root();
        let err = plan_local_uploads(Path::new("/definitely/not/here"), &remote).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
