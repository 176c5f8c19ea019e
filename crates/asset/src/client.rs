//! Asset-store adapter
//!
//! Wraps the XML service protocol behind the `Backend` contract. The
//! adapter owns one session token; every service call carries it, and an
//! expired-session reply triggers exactly one re-authentication attempt
//! with the stored delegated token before the error surfaces.
//!
//! Virtual paths map directly onto server namespaces: the path with the
//! mount prefix stripped is the namespace path, and a leaf segment names an
//! asset within its namespace.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use ps_core::{
    Backend, BackendKind, Confirm, Credentials, DelegateLifetime, EndpointDescriptor, Error,
    InfoStream, LineStream, ProgressFn, PutOutcome, Result, SsoKeySet, TransferItem, TransferPlan,
    VPath,
};

use crate::service::ServiceTransport;
use crate::xml::{self, XmlElement};

/// Page size for draining server-side query iterators
const ITERATOR_PAGE: u32 = 100;

struct Inner {
    prefix: String,
    transport: ServiceTransport,
    descriptor: RwLock<EndpointDescriptor>,
}

/// Asset-store backend client; cheap to clone
#[derive(Clone)]
pub struct AssetClient {
    inner: Arc<Inner>,
}

/// One entry of a namespace listing
#[derive(Debug, Clone)]
struct AssetEntry {
    name: String,
    id: Option<String>,
    size: u64,
    is_namespace: bool,
}

impl AssetClient {
    /// Build a client for a mount prefix and endpoint descriptor
    pub fn new(mount_prefix: &str, descriptor: EndpointDescriptor) -> Result<Self> {
        let transport = ServiceTransport::new(&descriptor.url, &descriptor.timeout_config())?;
        Ok(Self {
            inner: Arc::new(Inner {
                prefix: mount_prefix.trim_end_matches('/').to_string(),
                transport,
                descriptor: RwLock::new(descriptor),
            }),
        })
    }

    async fn session(&self) -> Result<String> {
        self.inner
            .descriptor
            .read()
            .await
            .session_token
            .clone()
            .ok_or_else(|| Error::Auth("not authenticated; login first".into()))
    }

    /// Execute a service verb, re-authenticating once on session expiry
    async fn execute(&self, verb: &str, args: &[XmlElement]) -> Result<XmlElement> {
        match self.execute_once(verb, args).await {
            Err(e) if e.is_auth_expiry() => {
                self.reauthenticate().await?;
                self.execute_once(verb, args).await
            }
            other => other,
        }
    }

    async fn execute_once(&self, verb: &str, args: &[XmlElement]) -> Result<XmlElement> {
        let session = self.session().await?;
        let body = xml::execute_request(&session, verb, args);
        self.inner.transport.post_xml(body).await
    }

    /// One re-login attempt via the stored delegated token
    async fn reauthenticate(&self) -> Result<()> {
        let token = self
            .inner
            .descriptor
            .read()
            .await
            .delegate_token
            .clone()
            .ok_or_else(|| Error::Auth("session expired and no delegated token stored".into()))?;
        tracing::debug!("session expired, retrying with delegated token");
        self.logon_with_token(&token).await
    }

    async fn logon_with_token(&self, token: &str) -> Result<()> {
        let doc = self
            .inner
            .transport
            .post_xml(xml::token_logon_request(token))
            .await?;
        self.store_session(&doc).await
    }

    async fn store_session(&self, logon_reply: &XmlElement) -> Result<()> {
        let session = logon_reply
            .value_of("reply/result/session")
            .or_else(|| {
                logon_reply
                    .find("reply/result/session")
                    .and_then(|e| e.attr("id"))
            })
            .ok_or_else(|| Error::Protocol("logon reply carried no session".into()))?
            .to_string();
        let mut descriptor = self.inner.descriptor.write().await;
        descriptor.session_token = Some(session);
        Ok(())
    }

    /// Server namespace path for a virtual path under this mount
    fn namespace_of(&self, path: &VPath) -> String {
        path.strip_mount(&self.inner.prefix).as_str().to_string()
    }

    /// Full virtual path for a server namespace path
    fn to_virtual(&self, namespace_path: &str) -> String {
        format!("{}{namespace_path}", self.inner.prefix)
    }

    async fn asset_meta(&self, path: &VPath) -> Result<XmlElement> {
        let args = vec![XmlElement::with_text(
            "id",
            format!("path={}", self.namespace_of(path)),
        )];
        let doc = self.execute("asset.get", &args).await?;
        doc.find("reply/result/asset")
            .cloned()
            .ok_or_else(|| Error::Protocol("asset.get reply carried no asset".into()))
    }

    async fn namespace_exists(&self, path: &VPath) -> Result<bool> {
        let args = vec![XmlElement::with_text(
            "namespace",
            self.namespace_of(path),
        )];
        let doc = self.execute("asset.namespace.exists", &args).await?;
        Ok(doc.value_of("reply/result/exists") == Some("true"))
    }

    /// Direct children of a namespace
    async fn list_namespace(&self, path: &VPath) -> Result<Vec<AssetEntry>> {
        let args = vec![XmlElement::with_text(
            "namespace",
            self.namespace_of(path),
        )];
        let doc = self.execute("asset.namespace.list", &args).await?;
        let result = doc
            .find("reply/result/namespace")
            .ok_or_else(|| Error::NotFound(path.as_str().to_string()))?;

        let mut entries = Vec::new();
        for child in result.children_named("namespace") {
            entries.push(AssetEntry {
                name: child.text.clone(),
                id: None,
                size: 0,
                is_namespace: true,
            });
        }
        for asset in result.children_named("asset") {
            entries.push(AssetEntry {
                name: asset.text.clone(),
                id: asset.attr("id").map(str::to_string),
                size: asset
                    .attr("size")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                is_namespace: false,
            });
        }
        Ok(entries)
    }

    /// Entries matching a glob in the pattern's parent namespace
    async fn glob_entries(&self, pattern: &VPath) -> Result<Vec<AssetEntry>> {
        let matcher = glob::Pattern::new(pattern.file_name())
            .map_err(|e| Error::InvalidPath(format!("bad pattern: {e}")))?;
        let entries = self.list_namespace(&pattern.parent()).await?;
        Ok(entries
            .into_iter()
            .filter(|e| matcher.matches(&e.name))
            .collect())
    }

    async fn query_count(&self, where_clause: &str) -> Result<u64> {
        let args = vec![
            XmlElement::with_text("where", where_clause),
            XmlElement::with_text("action", "count"),
        ];
        let doc = self.execute("asset.query", &args).await?;
        doc.value_of("reply/result/value")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::Protocol("asset.query count reply malformed".into()))
    }

    async fn query_size_sum(&self, where_clause: &str) -> Result<u64> {
        let args = vec![
            XmlElement::with_text("where", where_clause),
            XmlElement::with_text("action", "sum"),
            XmlElement::with_text("xpath", "content/size"),
        ];
        let doc = self.execute("asset.query", &args).await?;
        doc.value_of("reply/result/value")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::Protocol("asset.query sum reply malformed".into()))
    }

    /// Open a server-side result iterator over a subtree query
    async fn open_iterator(&self, where_clause: &str) -> Result<String> {
        let args = vec![
            XmlElement::with_text("where", where_clause),
            XmlElement::with_text("action", "get-meta"),
            XmlElement::with_text("as", "iterator"),
        ];
        let doc = self.execute("asset.query", &args).await?;
        doc.value_of("reply/result/iterator")
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol("asset.query opened no iterator".into()))
    }

    /// Drain one page; the server closes the iterator on the last page
    async fn iterate_page(&self, iterator: &str) -> Result<(Vec<XmlElement>, bool)> {
        let args = vec![
            XmlElement::with_text("id", iterator),
            XmlElement::with_text("size", ITERATOR_PAGE.to_string()),
        ];
        let doc = self.execute("asset.query.iterate", &args).await?;
        let result = doc
            .find("reply/result")
            .ok_or_else(|| Error::Protocol("iterate reply carried no result".into()))?;
        let complete = result.attr("complete") == Some("true");
        let assets = result.children_named("asset").cloned().collect();
        Ok((assets, complete))
    }

    /// Upload one file into a namespace, then await the server's final ACK
    /// within the endpoint's retry budget.
    async fn upload(
        &self,
        namespace: &str,
        local_file: &Path,
        size: u64,
        progress: ProgressFn,
    ) -> Result<u64> {
        let name = local_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath(local_file.display().to_string()))?;
        let asset_path = format!("{}/{}", namespace.trim_end_matches('/'), name);

        let session = self.session().await?;
        let args = vec![
            XmlElement::with_text("id", format!("path={asset_path}")),
            XmlElement::with_text("create", "true"),
        ];
        let request = xml::execute_request(&session, "asset.set", &args);
        self.inner
            .transport
            .post_multipart(request, local_file, progress)
            .await?;

        self.await_upload_ack(&asset_path, size).await?;
        Ok(size)
    }

    /// The final ACK may lag the upload; poll until the stored size matches.
    async fn await_upload_ack(&self, asset_path: &str, expected_size: u64) -> Result<()> {
        let retry = self.inner.descriptor.read().await.retry_config();
        let mut last_err: Option<Error> = None;

        for attempt in 1..=retry.max_attempts {
            let probe = VPath::new(asset_path)?;
            match self.asset_meta(&probe).await {
                Ok(asset) => {
                    let stored: u64 = asset
                        .value_of("size")
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0);
                    if stored == expected_size {
                        return Ok(());
                    }
                    last_err = Some(Error::Protocol(format!(
                        "stored size {stored} != uploaded {expected_size}"
                    )));
                }
                Err(e) => last_err = Some(e),
            }
            tokio::time::sleep(std::time::Duration::from_millis(
                retry.backoff_step_ms * attempt as u64,
            ))
            .await;
        }
        Err(last_err.unwrap_or_else(|| {
            Error::Network(format!("no upload acknowledgement for {asset_path}"))
        }))
    }

    fn entry_line(entry: &AssetEntry) -> String {
        if entry.is_namespace {
            format!("[Namespace] {}", entry.name)
        } else {
            format!("{:>12} | {}", entry.size, entry.name)
        }
    }
}

#[async_trait]
impl Backend for AssetClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Asset
    }

    async fn connect(&self) -> Result<()> {
        let descriptor = self.inner.descriptor.read().await.clone();

        if descriptor.session_token.is_some() {
            match self.execute_once("server.ping", &[]).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_auth_expiry() => {}
                Err(e) => return Err(e),
            }
        }
        if let Some(token) = &descriptor.delegate_token {
            return self.logon_with_token(token).await;
        }
        if let (Some(user), Some(secret)) = (&descriptor.access_id, &descriptor.secret) {
            let domain = descriptor.domain.clone().unwrap_or_default();
            let doc = self
                .inner
                .transport
                .post_xml(xml::logon_request(&domain, user, secret))
                .await?;
            return self.store_session(&doc).await;
        }
        Err(Error::Auth("no stored credentials; login required".into()))
    }

    async fn login(&self, credentials: Option<Credentials>) -> Result<()> {
        let Some(credentials) = credentials else {
            return self.connect().await;
        };
        if let Some(token) = &credentials.token {
            self.logon_with_token(token).await?;
            let mut descriptor = self.inner.descriptor.write().await;
            descriptor.delegate_token = Some(token.clone());
            return Ok(());
        }

        let user = credentials
            .user
            .ok_or_else(|| Error::Auth("user name required".into()))?;
        let password = credentials
            .password
            .ok_or_else(|| Error::Auth("password required".into()))?;
        let domain = credentials.domain.unwrap_or_default();

        let doc = self
            .inner
            .transport
            .post_xml(xml::logon_request(&domain, &user, &password))
            .await?;
        self.store_session(&doc).await?;

        let mut descriptor = self.inner.descriptor.write().await;
        descriptor.access_id = Some(user);
        if !domain.is_empty() {
            descriptor.domain = Some(domain);
        }
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        if self.session().await.is_ok() {
            if let Err(e) = self.execute_once("system.logoff", &[]).await {
                tracing::debug!(error = %e, "logoff call failed, dropping session anyway");
            }
        }
        let mut descriptor = self.inner.descriptor.write().await;
        descriptor.session_token = None;
        Ok(())
    }

    async fn delegate(&self, lifetime: DelegateLifetime) -> Result<Option<String>> {
        match lifetime {
            DelegateLifetime::Days(days) => {
                let args = vec![XmlElement::with_text("validity", days.to_string())];
                let doc = self.execute("secure.identity.token.create", &args).await?;
                let token = doc
                    .value_of("reply/result/token")
                    .ok_or_else(|| Error::Protocol("token create reply carried no token".into()))?
                    .to_string();
                let mut descriptor = self.inner.descriptor.write().await;
                descriptor.delegate_token = Some(token.clone());
                Ok(Some(token))
            }
            DelegateLifetime::Off => {
                let args = vec![XmlElement::with_text("all", "true")];
                self.execute("secure.identity.token.destroy", &args).await?;
                let mut descriptor = self.inner.descriptor.write().await;
                descriptor.delegate_token = None;
                Ok(None)
            }
        }
    }

    async fn endpoint(&self) -> EndpointDescriptor {
        self.inner.descriptor.read().await.clone()
    }

    async fn status(&self) -> String {
        let descriptor = self.inner.descriptor.read().await;
        let who = descriptor.access_id.as_deref().unwrap_or("-");
        let state = if descriptor.session_token.is_some() {
            "session active"
        } else if descriptor.delegate_token.is_some() {
            "offline (token stored)"
        } else {
            "offline"
        };
        format!("asset store {} user {who} {state}", descriptor.url)
    }

    async fn authenticated(&self) -> bool {
        self.inner.descriptor.read().await.session_token.is_some()
    }

    async fn cd(&self, path: &VPath) -> Result<VPath> {
        if self.namespace_exists(path).await? {
            Ok(path.clone())
        } else {
            Err(Error::NotFound(path.as_str().to_string()))
        }
    }

    async fn ls(&self, pattern: &VPath) -> Result<LineStream> {
        let entries = if pattern.has_glob() {
            self.glob_entries(pattern).await?
        } else if self.namespace_exists(pattern).await? {
            self.list_namespace(pattern).await?
        } else {
            // a single asset
            let asset = self.asset_meta(pattern).await?;
            vec![AssetEntry {
                name: pattern.file_name().to_string(),
                id: asset.attr("id").map(str::to_string),
                size: asset
                    .value_of("size")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                is_namespace: false,
            }]
        };
        let lines: Vec<Result<String>> = entries
            .iter()
            .map(|e| Ok(Self::entry_line(e)))
            .collect();
        Ok(Box::pin(futures::stream::iter(lines)))
    }

    async fn info(&self, path: &VPath) -> Result<InfoStream> {
        let asset = self.asset_meta(path).await?;
        let mut rows: Vec<Result<(String, String)>> = Vec::new();
        if let Some(id) = asset.attr("id") {
            rows.push(Ok(("id".to_string(), id.to_string())));
        }
        if let Some(version) = asset.attr("version") {
            rows.push(Ok(("version".to_string(), version.to_string())));
        }
        for child in &asset.children {
            if child.children.is_empty() {
                rows.push(Ok((child.name.clone(), child.text.clone())));
            } else {
                for grand in &child.children {
                    rows.push(Ok((
                        format!("{}/{}", child.name, grand.name),
                        grand.text.clone(),
                    )));
                }
            }
        }
        Ok(Box::pin(futures::stream::iter(rows)))
    }

    async fn get_plan(&self, pattern: &VPath, local_dir: &Path) -> Result<TransferPlan> {
        if pattern.has_glob() {
            let parent = pattern.parent();
            let items: Vec<TransferItem> = self
                .glob_entries(pattern)
                .await?
                .into_iter()
                .filter(|e| !e.is_namespace)
                .map(|e| TransferItem {
                    source: parent.child(&e.name).as_str().to_string(),
                    dest: local_dir.join(&e.name).to_string_lossy().into_owned(),
                    expected_bytes: Some(e.size),
                    handle: e.id,
                })
                .collect();
            if items.is_empty() {
                return Err(Error::NotFound(format!("nothing matches {pattern}")));
            }
            return Ok(TransferPlan::from_items(items));
        }

        if !self.namespace_exists(pattern).await? {
            // single asset
            let asset = self.asset_meta(pattern).await?;
            let size = asset
                .value_of("size")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            return Ok(TransferPlan::from_items(vec![TransferItem {
                source: pattern.as_str().to_string(),
                dest: local_dir
                    .join(pattern.file_name())
                    .to_string_lossy()
                    .into_owned(),
                expected_bytes: Some(size),
                handle: asset.attr("id").map(str::to_string),
            }]));
        }

        // whole subtree: totals first, then a server-side iterator in pages
        let where_clause = format!("namespace>='{}'", self.namespace_of(pattern));
        let files = self.query_count(&where_clause).await?;
        let bytes = self.query_size_sum(&where_clause).await?;
        let iterator = self.open_iterator(&where_clause).await?;

        let client = self.clone();
        let root = self.namespace_of(pattern);
        let local_root = local_dir.to_path_buf();
        struct PageState {
            client: AssetClient,
            iterator: String,
            buffer: std::collections::VecDeque<TransferItem>,
            done: bool,
        }
        let state = PageState {
            client,
            iterator,
            buffer: Default::default(),
            done: false,
        };

        let items = futures::stream::try_unfold(state, move |mut state| {
            let root = root.clone();
            let local_root = local_root.clone();
            async move {
                loop {
                    if let Some(item) = state.buffer.pop_front() {
                        return Ok(Some((item, state)));
                    }
                    if state.done {
                        return Ok(None);
                    }
                    let (assets, complete) = state.client.iterate_page(&state.iterator).await?;
                    state.done = complete;
                    for asset in assets {
                        // server paths are namespace paths local to this mount
                        let server_path = asset
                            .attr("path")
                            .map(str::to_string)
                            .unwrap_or_else(|| asset.text.clone());
                        let local = VPath::new(&server_path)?;
                        let rel = local
                            .as_str()
                            .strip_prefix(root.as_str())
                            .unwrap_or(local.file_name())
                            .trim_start_matches('/');
                        let dest: PathBuf = local_root.join(rel);
                        state.buffer.push_back(TransferItem {
                            source: state.client.to_virtual(local.as_str()),
                            dest: dest.to_string_lossy().into_owned(),
                            expected_bytes: asset
                                .value_of("size")
                                .and_then(|s| s.parse().ok()),
                            handle: asset.attr("id").map(str::to_string),
                        });
                    }
                }
            }
        });

        Ok(TransferPlan {
            files,
            bytes,
            items: Box::pin(items),
        })
    }

    async fn get(&self, item: &TransferItem, progress: ProgressFn) -> Result<u64> {
        let id = match &item.handle {
            Some(id) => id.clone(),
            None => {
                let asset = self.asset_meta(&VPath::new(&item.source)?).await?;
                asset
                    .attr("id")
                    .map(str::to_string)
                    .ok_or_else(|| Error::Protocol("asset has no id".into()))?
            }
        };
        let session = self.session().await?;
        self.inner
            .transport
            .download(&id, &session, Path::new(&item.dest), progress)
            .await
    }

    async fn put(
        &self,
        remote_dir: &VPath,
        local_file: &Path,
        progress: ProgressFn,
    ) -> Result<PutOutcome> {
        let size = tokio::fs::metadata(local_file).await?.len();
        let name = local_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath(local_file.display().to_string()))?;

        // skip when the stored asset already matches by length
        let existing = remote_dir.child(&name);
        if let Ok(asset) = self.asset_meta(&existing).await {
            let stored: Option<u64> = asset.value_of("size").and_then(|s| s.parse().ok());
            if stored == Some(size) {
                tracing::debug!(asset = %existing, "identical content present, skipping upload");
                return Ok(PutOutcome::Skipped);
            }
        }

        let moved = self
            .upload(&self.namespace_of(remote_dir), local_file, size, progress)
            .await?;
        Ok(PutOutcome::Stored(moved))
    }

    async fn mkdir(&self, path: &VPath) -> Result<()> {
        let args = vec![XmlElement::with_text(
            "namespace",
            self.namespace_of(path),
        )];
        self.execute("asset.namespace.create", &args).await?;
        Ok(())
    }

    async fn rmdir(&self, path: &VPath, confirm: Confirm<'_>) -> Result<()> {
        if !self.namespace_exists(path).await? {
            return Err(Error::NotFound(path.as_str().to_string()));
        }
        let entries = self.list_namespace(path).await?;
        if !entries.is_empty()
            && !confirm(&format!(
                "namespace {path} contains {} entries; destroy recursively?",
                entries.len()
            ))
        {
            return Err(Error::Cancelled);
        }
        let args = vec![XmlElement::with_text(
            "namespace",
            self.namespace_of(path),
        )];
        self.execute("asset.namespace.destroy", &args).await?;
        Ok(())
    }

    async fn rm(&self, pattern: &VPath, confirm: Confirm<'_>) -> Result<u64> {
        let targets: Vec<AssetEntry> = if pattern.has_glob() {
            self.glob_entries(pattern)
                .await?
                .into_iter()
                .filter(|e| !e.is_namespace)
                .collect()
        } else {
            let asset = self.asset_meta(pattern).await?;
            vec![AssetEntry {
                name: pattern.file_name().to_string(),
                id: asset.attr("id").map(str::to_string),
                size: 0,
                is_namespace: false,
            }]
        };
        if targets.is_empty() {
            return Err(Error::NotFound(format!("nothing matches {pattern}")));
        }
        if !confirm(&format!("destroy {} asset(s)?", targets.len())) {
            return Err(Error::Cancelled);
        }

        let parent = pattern.parent();
        for target in &targets {
            let args = match &target.id {
                Some(id) => vec![XmlElement::with_text("id", id.clone())],
                None => vec![XmlElement::with_text(
                    "id",
                    format!("path={}", self.namespace_of(&parent.child(&target.name))),
                )],
            };
            self.execute("asset.destroy", &args).await?;
        }
        Ok(targets.len() as u64)
    }

    async fn copy(
        &self,
        src: &VPath,
        dst: &VPath,
        _peer: Option<Arc<dyn Backend>>,
        _confirm: Confirm<'_>,
    ) -> Result<()> {
        if src.parent() != dst.parent() {
            return Err(Error::Unsupported(
                "cross-namespace asset copy is not available".into(),
            ));
        }
        let args = vec![
            XmlElement::with_text("id", format!("path={}", self.namespace_of(src))),
            XmlElement::with_text("name", dst.file_name()),
        ];
        self.execute("asset.copy", &args).await?;
        Ok(())
    }

    async fn command(&self, line: &str) -> Result<String> {
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let args = xml::parse_shorthand(rest)?;
        let doc = self.execute(verb, &args).await?;
        Ok(doc
            .find("reply/result")
            .map(|r| r.to_xml())
            .unwrap_or_else(|| doc.to_xml()))
    }

    async fn identity(&self) -> Result<String> {
        let doc = self.execute("actor.self.describe", &[]).await?;
        doc.find("reply/result/actor")
            .and_then(|a| a.attr("name").map(str::to_string).or_else(|| {
                let name = a.value_of("name")?;
                Some(name.to_string())
            }))
            .ok_or_else(|| Error::Protocol("actor description carried no name".into()))
    }

    async fn sso_keys(&self) -> Result<Vec<SsoKeySet>> {
        let actor = self.identity().await?;
        let args = vec![XmlElement::with_text("key", "sso-password")];
        let doc = self.execute("secure.wallet.get", &args).await?;
        let password = doc
            .value_of("reply/result/value")
            .ok_or_else(|| Error::Auth("wallet holds no SSO password".into()))?;
        self.inner.transport.fetch_sso_keys(&actor, password).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AssetClient {
        let mut ep = EndpointDescriptor::new(BackendKind::Asset, "https://assets.example.com");
        ep.session_token = Some("sess".into());
        AssetClient::new("/assets", ep).unwrap()
    }

    #[tokio::test]
    async fn test_authenticated_tracks_session_token() {
        let c = client();
        assert!(c.authenticated().await);

        let mut ep = EndpointDescriptor::new(BackendKind::Asset, "https://assets.example.com");
        ep.delegate_token = Some("tok".into());
        let offline = AssetClient::new("/assets", ep).unwrap();
        assert!(!offline.authenticated().await);
    }

    #[tokio::test]
    async fn test_status_redacts_nothing_sensitive() {
        let c = client();
        let status = c.status().await;
        assert!(status.contains("session active"));
        assert!(!status.contains("sess"));
    }

    #[tokio::test]
    async fn test_operations_require_session() {
        let ep = EndpointDescriptor::new(BackendKind::Asset, "https://assets.example.com");
        let c = AssetClient::new("/assets", ep).unwrap();
        let err = c.session().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_entry_lines_distinguish_directories() {
        let ns = AssetEntry {
            name: "docs".into(),
            id: None,
            size: 0,
            is_namespace: true,
        };
        let file = AssetEntry {
            name: "a.txt".into(),
            id: Some("7".into()),
            size: 1234,
            is_namespace: false,
        };
        assert_eq!(AssetClient::entry_line(&ns), "[Namespace] docs");
        assert_eq!(AssetClient::entry_line(&file), "        1234 | a.txt");
    }

    #[tokio::test]
    async fn test_cross_namespace_copy_unsupported() {
        let c = client();
        let src = VPath::new("/www/a.txt").unwrap();
        let dst = VPath::new("/archive/a.txt").unwrap();
        let noop = |_prompt: &str| true;
        let err = c.copy(&src, &dst, None, &noop).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
