//! S3 adapter
//!
//! Wraps aws-sdk-s3 behind the `Backend` contract. The first segment of the
//! mount-relative path is the bucket, trailing-separator segments are a
//! prefix, and the final segment is a key or glob pattern. Listings use
//! server-side pagination with the `/` delimiter; globbing is evaluated
//! locally against the native listing.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    AbortIncompleteMultipartUpload, BucketLifecycleConfiguration, BucketVersioningStatus, Delete,
    ExpirationStatus, LifecycleRule, LifecycleRuleFilter, NoncurrentVersionExpiration,
    ObjectIdentifier, VersioningConfiguration,
};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use ps_core::{
    Backend, BackendKind, Confirm, Credentials, EndpointDescriptor, Error, InfoStream,
    LifecycleAction, LineStream, ProgressFn, PutOutcome, Result, TransferItem, TransferPlan, VPath,
};

use crate::policy::{PolicyDocument, PUBLIC_SID_PREFIX};
use crate::split::ObjectAddr;

/// Presigned GET URLs stay valid this long
const PRESIGN_LIFETIME: Duration = Duration::from_secs(7 * 24 * 3600);

/// Batch size for bulk deletes
const DELETE_BATCH: usize = 1000;

const DEFAULT_REGION: &str = "us-east-1";

struct Inner {
    prefix: String,
    descriptor: RwLock<EndpointDescriptor>,
    client: RwLock<Option<aws_sdk_s3::Client>>,
}

/// Object-store backend client; cheap to clone
#[derive(Clone)]
pub struct S3Client {
    inner: Arc<Inner>,
}

fn build_sdk_client(descriptor: &EndpointDescriptor) -> Result<aws_sdk_s3::Client> {
    let access = descriptor
        .access_id
        .clone()
        .ok_or_else(|| Error::Auth("no access key; login first".into()))?;
    let secret = descriptor
        .secret
        .clone()
        .ok_or_else(|| Error::Auth("no secret key; login first".into()))?;

    let credentials = aws_credential_types::Credentials::new(
        access,
        secret,
        descriptor.session_token.clone(),
        None,
        "pshell-static-credentials",
    );

    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
        .credentials_provider(credentials)
        .region(aws_sdk_s3::config::Region::new(DEFAULT_REGION.to_string()))
        .endpoint_url(&descriptor.url)
        .force_path_style(true)
        .build();

    Ok(aws_sdk_s3::Client::from_conf(config))
}

fn classify(err: impl std::fmt::Display, what: &str) -> Error {
    let text = err.to_string();
    if text.contains("NotFound") || text.contains("NoSuchKey") || text.contains("NoSuchBucket") {
        Error::NotFound(what.to_string())
    } else if text.contains("AccessDenied") || text.contains("QuotaExceeded") {
        Error::Quota(format!("{what}: {text}"))
    } else if text.contains("BucketNotEmpty") {
        Error::Conflict(format!("{what} is not empty"))
    } else if text.contains("BucketAlreadyOwnedByYou") || text.contains("BucketAlreadyExists") {
        Error::Conflict(format!("{what} already exists"))
    } else {
        Error::Network(text)
    }
}

impl S3Client {
    /// Build a client for a mount prefix and endpoint descriptor
    pub fn new(mount_prefix: &str, descriptor: EndpointDescriptor) -> Result<Self> {
        let client = if descriptor.access_id.is_some() && descriptor.secret.is_some() {
            Some(build_sdk_client(&descriptor)?)
        } else {
            None
        };
        Ok(Self {
            inner: Arc::new(Inner {
                prefix: mount_prefix.trim_end_matches('/').to_string(),
                descriptor: RwLock::new(descriptor),
                client: RwLock::new(client),
            }),
        })
    }

    async fn client(&self) -> Result<aws_sdk_s3::Client> {
        self.inner
            .client
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Auth("no credentials; login first".into()))
    }

    /// Strip this mount's prefix and split into (bucket, key)
    fn addr(&self, path: &VPath) -> ObjectAddr {
        let local = path.strip_mount(&self.inner.prefix);
        let raw = if local.is_root() {
            // preserve bucket-root trailing-slash semantics
            if path.as_str().len() > self.inner.prefix.len() { "/" } else { "" }
        } else {
            local.as_str()
        };
        ObjectAddr::parse(raw)
    }

    /// Rebuild a full virtual path from bucket and key
    fn to_virtual(&self, bucket: &str, key: &str) -> String {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            format!("{}/{bucket}", self.inner.prefix)
        } else {
            format!("{}/{bucket}/{key}", self.inner.prefix, )
        }
    }

    fn bucket_of(&self, path: &VPath) -> Result<String> {
        self.addr(path)
            .bucket
            .ok_or_else(|| Error::InvalidPath(format!("{path} does not name a bucket")))
    }

    /// One listing page: (folder prefixes, (key, size) objects, next token)
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimited: bool,
        token: Option<String>,
    ) -> Result<(Vec<String>, Vec<(String, i64)>, Option<String>)> {
        let client = self.client().await?;
        let mut request = client.list_objects_v2().bucket(bucket);
        if !prefix.is_empty() {
            request = request.prefix(prefix);
        }
        if delimited {
            request = request.delimiter("/");
        }
        if let Some(token) = token {
            request = request.continuation_token(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| classify(e, &format!("{bucket}/{prefix}")))?;

        let folders = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();
        let objects = response
            .contents()
            .iter()
            .filter_map(|o| o.key().map(|k| (k.to_string(), o.size().unwrap_or(0))))
            .collect();
        let next = response
            .is_truncated()
            .unwrap_or(false)
            .then(|| response.next_continuation_token().map(str::to_string))
            .flatten();
        Ok((folders, objects, next))
    }

    /// Every object under a prefix (no delimiter), fully drained
    async fn list_recursive(&self, bucket: &str, prefix: &str) -> Result<Vec<(String, i64)>> {
        let mut all = Vec::new();
        let mut token = None;
        loop {
            let (_, objects, next) = self.list_page(bucket, prefix, false, token).await?;
            all.extend(objects);
            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        Ok(all)
    }

    /// Objects at one level whose leaf name matches the glob
    async fn glob_objects(&self, addr: &ObjectAddr) -> Result<Vec<(String, i64)>> {
        let bucket = addr
            .bucket
            .clone()
            .ok_or_else(|| Error::InvalidPath("glob requires a bucket".into()))?;
        let matcher = glob::Pattern::new(addr.leaf())
            .map_err(|e| Error::InvalidPath(format!("bad pattern: {e}")))?;
        let parent = addr.parent_prefix();

        let mut matched = Vec::new();
        let mut token = None;
        loop {
            let (_, objects, next) = self.list_page(&bucket, &parent, true, token).await?;
            for (key, size) in objects {
                let leaf = key.rsplit('/').next().unwrap_or(&key);
                if matcher.matches(leaf) {
                    matched.push((key, size));
                }
            }
            match next {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        Ok(matched)
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<(i64, Vec<(String, String)>)> {
        let client = self.client().await?;
        let response = client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, &format!("{bucket}/{key}")))?;

        let mut rows = Vec::new();
        let size = response.content_length().unwrap_or(0);
        rows.push(("content-length".to_string(), size.to_string()));
        if let Some(etag) = response.e_tag() {
            rows.push(("etag".to_string(), etag.trim_matches('"').to_string()));
        }
        if let Some(ct) = response.content_type() {
            rows.push(("content-type".to_string(), ct.to_string()));
        }
        if let Some(modified) = response.last_modified() {
            if let Ok(ts) = jiff::Timestamp::from_second(modified.secs()) {
                rows.push(("last-modified".to_string(), ts.to_string()));
            }
        }
        if let Some(sc) = response.storage_class() {
            rows.push(("storage-class".to_string(), sc.as_str().to_string()));
        }
        Ok((size, rows))
    }

    async fn delete_keys(&self, bucket: &str, keys: &[String]) -> Result<u64> {
        let client = self.client().await?;
        let mut deleted = 0u64;
        for batch in keys.chunks(DELETE_BATCH) {
            let objects: Vec<ObjectIdentifier> = batch
                .iter()
                .filter_map(|k| ObjectIdentifier::builder().key(k).build().ok())
                .collect();
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .build()
                .map_err(|e| Error::General(e.to_string()))?;
            let response = client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| classify(e, bucket))?;
            deleted += response.deleted().len() as u64;
            if !response.errors().is_empty() {
                let failed: Vec<_> = response
                    .errors()
                    .iter()
                    .filter_map(|e| e.key())
                    .collect();
                tracing::warn!(?failed, "some objects were not deleted");
            }
        }
        Ok(deleted)
    }

    async fn bucket_info_rows(&self, bucket: &str) -> Result<Vec<(String, String)>> {
        let client = self.client().await?;
        let mut rows = Vec::new();

        match client.get_bucket_acl().bucket(bucket).send().await {
            Ok(acl) => {
                let owner = acl
                    .owner()
                    .and_then(|o| o.display_name().or(o.id()))
                    .unwrap_or("-")
                    .to_string();
                rows.push(("owner".to_string(), owner));
            }
            Err(e) => tracing::debug!(error = %e, "bucket acl unavailable"),
        }

        let objects = self.list_recursive(bucket, "").await?;
        let total: i64 = objects.iter().map(|(_, s)| s).sum();
        rows.push(("objects".to_string(), objects.len().to_string()));
        rows.push(("total-size".to_string(), total.to_string()));

        match client.list_multipart_uploads().bucket(bucket).send().await {
            Ok(mp) => rows.push((
                "incomplete-uploads".to_string(),
                mp.uploads().len().to_string(),
            )),
            Err(e) => tracing::debug!(error = %e, "multipart listing unavailable"),
        }

        match client.get_bucket_versioning().bucket(bucket).send().await {
            Ok(v) => rows.push((
                "versioning".to_string(),
                v.status()
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_else(|| "Disabled".to_string()),
            )),
            Err(e) => tracing::debug!(error = %e, "versioning state unavailable"),
        }

        match client
            .get_bucket_lifecycle_configuration()
            .bucket(bucket)
            .send()
            .await
        {
            Ok(lc) => {
                for rule in lc.rules() {
                    rows.push((
                        format!("lifecycle/{}", rule.id().unwrap_or("rule")),
                        rule.status().as_str().to_string(),
                    ));
                }
            }
            Err(e) => tracing::debug!(error = %e, "no lifecycle configuration"),
        }

        match client.get_bucket_policy().bucket(bucket).send().await {
            Ok(p) => {
                if let Some(body) = p.policy() {
                    let doc = PolicyDocument::parse(body)?;
                    rows.push(("policy-statements".to_string(), doc.statement.len().to_string()));
                    for statement in &doc.statement {
                        if let Some(sid) = &statement.sid {
                            rows.push(("policy-sid".to_string(), sid.clone()));
                        }
                    }
                }
            }
            Err(e) => tracing::debug!(error = %e, "no bucket policy"),
        }

        Ok(rows)
    }

    async fn load_policy(&self, bucket: &str) -> Result<PolicyDocument> {
        let client = self.client().await?;
        match client.get_bucket_policy().bucket(bucket).send().await {
            Ok(response) => PolicyDocument::parse(response.policy().unwrap_or_default()),
            Err(e) => {
                let text = e.to_string();
                if text.contains("NoSuchBucketPolicy") || text.contains("NotFound") {
                    Ok(PolicyDocument::empty())
                } else {
                    Err(classify(e, bucket))
                }
            }
        }
    }

    async fn store_policy(&self, bucket: &str, doc: &PolicyDocument) -> Result<()> {
        let client = self.client().await?;
        if doc.is_empty() {
            client
                .delete_bucket_policy()
                .bucket(bucket)
                .send()
                .await
                .map_err(|e| classify(e, bucket))?;
        } else {
            client
                .put_bucket_policy()
                .bucket(bucket)
                .policy(doc.to_json()?)
                .send()
                .await
                .map_err(|e| classify(e, bucket))?;
        }
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str) -> Result<String> {
        let client = self.client().await?;
        let config = PresigningConfig::expires_in(PRESIGN_LIFETIME)
            .map_err(|e| Error::General(e.to_string()))?;
        let request = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| classify(e, &format!("{bucket}/{key}")))?;
        Ok(request.uri().to_string())
    }
}

#[async_trait]
impl Backend for S3Client {
    fn kind(&self) -> BackendKind {
        BackendKind::S3
    }

    async fn connect(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .list_buckets()
            .send()
            .await
            .map_err(|e| classify(e, "endpoint"))?;
        Ok(())
    }

    async fn login(&self, credentials: Option<Credentials>) -> Result<()> {
        if let Some(credentials) = credentials {
            let mut descriptor = self.inner.descriptor.write().await;
            if let Some(user) = credentials.user {
                descriptor.access_id = Some(user);
            }
            if let Some(password) = credentials.password {
                descriptor.secret = Some(password);
            }
            if credentials.token.is_some() {
                descriptor.session_token = credentials.token;
            }
        }
        let descriptor = self.inner.descriptor.read().await.clone();
        let client = build_sdk_client(&descriptor)?;
        *self.inner.client.write().await = Some(client);
        self.connect().await
    }

    async fn logout(&self) -> Result<()> {
        *self.inner.client.write().await = None;
        let mut descriptor = self.inner.descriptor.write().await;
        descriptor.session_token = None;
        Ok(())
    }

    async fn endpoint(&self) -> EndpointDescriptor {
        self.inner.descriptor.read().await.clone()
    }

    async fn status(&self) -> String {
        let descriptor = self.inner.descriptor.read().await;
        let state = if self.inner.client.read().await.is_some() {
            "keys loaded"
        } else {
            "offline"
        };
        format!(
            "object store {} access {} {state}",
            descriptor.url,
            descriptor.access_id.as_deref().unwrap_or("-"),
        )
    }

    async fn authenticated(&self) -> bool {
        self.inner.client.read().await.is_some()
    }

    async fn cd(&self, path: &VPath) -> Result<VPath> {
        let addr = self.addr(path);
        let Some(bucket) = addr.bucket.clone() else {
            return Ok(path.clone()); // mount root
        };
        let client = self.client().await?;

        if addr.is_bucket() {
            client
                .head_bucket()
                .bucket(&bucket)
                .send()
                .await
                .map_err(|e| classify(e, &bucket))?;
            return Ok(path.clone());
        }

        let prefix = format!("{}/", addr.key.trim_end_matches('/'));
        let (folders, objects, _) = self.list_page(&bucket, &prefix, true, None).await?;
        if folders.is_empty() && objects.is_empty() {
            return Err(Error::NotFound(path.as_str().to_string()));
        }
        Ok(path.clone())
    }

    async fn ls(&self, pattern: &VPath) -> Result<LineStream> {
        let addr = self.addr(pattern);

        // mount root: enumerate buckets
        let Some(bucket) = addr.bucket.clone() else {
            let client = self.client().await?;
            let response = client
                .list_buckets()
                .send()
                .await
                .map_err(|e| classify(e, "endpoint"))?;
            let lines: Vec<Result<String>> = response
                .buckets()
                .iter()
                .filter_map(|b| b.name())
                .map(|name| Ok(format!("[Bucket] {name}")))
                .collect();
            return Ok(Box::pin(futures::stream::iter(lines)));
        };

        if addr.is_glob() {
            let matched = self.glob_objects(&addr).await?;
            let lines: Vec<Result<String>> = matched
                .into_iter()
                .map(|(key, size)| {
                    let leaf = key.rsplit('/').next().unwrap_or(&key).to_string();
                    Ok(format!("{size:>12} | {leaf}"))
                })
                .collect();
            return Ok(Box::pin(futures::stream::iter(lines)));
        }

        // bucket or prefix: lazily paginated, delimiter '/'
        let prefix = if addr.is_bucket() {
            String::new()
        } else if addr.is_prefix() {
            addr.listing_prefix()
        } else {
            // a single object, or a prefix given without its slash
            let client = self.client().await?;
            match client
                .head_object()
                .bucket(&bucket)
                .key(&addr.key)
                .send()
                .await
            {
                Ok(head) => {
                    let size = head.content_length().unwrap_or(0);
                    let leaf = addr.leaf().to_string();
                    return Ok(Box::pin(futures::stream::iter(vec![Ok(format!(
                        "{size:>12} | {leaf}"
                    ))])));
                }
                Err(_) => format!("{}/", addr.key),
            }
        };

        struct PageState {
            client: S3Client,
            bucket: String,
            prefix: String,
            token: Option<String>,
            buffer: std::collections::VecDeque<String>,
            done: bool,
            yielded: bool,
        }
        let state = PageState {
            client: self.clone(),
            bucket,
            prefix,
            token: None,
            buffer: Default::default(),
            done: false,
            yielded: false,
        };

        let lines = futures::stream::try_unfold(state, |mut state| async move {
            loop {
                if let Some(line) = state.buffer.pop_front() {
                    state.yielded = true;
                    return Ok(Some((line, state)));
                }
                if state.done {
                    if !state.yielded && !state.prefix.is_empty() {
                        return Err(Error::NotFound(format!(
                            "{}/{}",
                            state.bucket, state.prefix
                        )));
                    }
                    return Ok(None);
                }
                let (folders, objects, next) = state
                    .client
                    .list_page(&state.bucket, &state.prefix, true, state.token.take())
                    .await?;
                state.done = next.is_none();
                state.token = next;
                for folder in folders {
                    let name = folder
                        .trim_end_matches('/')
                        .rsplit('/')
                        .next()
                        .unwrap_or(&folder)
                        .to_string();
                    state.buffer.push_back(format!("[Folder] {name}/"));
                }
                for (key, size) in objects {
                    if key == state.prefix {
                        continue; // the folder marker itself
                    }
                    let leaf = key.rsplit('/').next().unwrap_or(&key).to_string();
                    state.buffer.push_back(format!("{size:>12} | {leaf}"));
                }
            }
        });
        Ok(Box::pin(lines))
    }

    async fn info(&self, path: &VPath) -> Result<InfoStream> {
        let addr = self.addr(path);
        let Some(bucket) = addr.bucket.clone() else {
            return Err(Error::InvalidPath("info needs a bucket or key".into()));
        };

        let rows: Vec<(String, String)> = if addr.is_bucket() {
            self.bucket_info_rows(&bucket).await?
        } else if addr.is_prefix() {
            let objects = self.list_recursive(&bucket, &addr.listing_prefix()).await?;
            let total: i64 = objects.iter().map(|(_, s)| s).sum();
            vec![
                ("objects".to_string(), objects.len().to_string()),
                ("total-size".to_string(), total.to_string()),
            ]
        } else {
            let (_, rows) = self.head(&bucket, &addr.key).await?;
            rows
        };
        Ok(Box::pin(futures::stream::iter(rows.into_iter().map(Ok))))
    }

    async fn get_plan(&self, pattern: &VPath, local_dir: &Path) -> Result<TransferPlan> {
        let addr = self.addr(pattern);
        let bucket = addr
            .bucket
            .clone()
            .ok_or_else(|| Error::InvalidPath("nothing to download at the mount root".into()))?;

        let mut items = Vec::new();
        if addr.is_glob() {
            for (key, size) in self.glob_objects(&addr).await? {
                let leaf = key.rsplit('/').next().unwrap_or(&key).to_string();
                items.push(TransferItem {
                    source: self.to_virtual(&bucket, &key),
                    dest: local_dir.join(&leaf).to_string_lossy().into_owned(),
                    expected_bytes: Some(size.max(0) as u64),
                    handle: None,
                });
            }
        } else if addr.is_bucket() || addr.is_prefix() {
            let prefix = addr.listing_prefix();
            for (key, size) in self.list_recursive(&bucket, &prefix).await? {
                if key.ends_with('/') {
                    continue; // folder markers carry no content
                }
                let rel = key.strip_prefix(&prefix).unwrap_or(&key);
                items.push(TransferItem {
                    source: self.to_virtual(&bucket, &key),
                    dest: local_dir.join(rel).to_string_lossy().into_owned(),
                    expected_bytes: Some(size.max(0) as u64),
                    handle: None,
                });
            }
        } else {
            let (size, _) = self.head(&bucket, &addr.key).await?;
            items.push(TransferItem {
                source: self.to_virtual(&bucket, &addr.key),
                dest: local_dir
                    .join(addr.leaf())
                    .to_string_lossy()
                    .into_owned(),
                expected_bytes: Some(size.max(0) as u64),
                handle: None,
            });
        }

        if items.is_empty() {
            return Err(Error::NotFound(format!("nothing matches {pattern}")));
        }
        Ok(TransferPlan::from_items(items))
    }

    async fn get(&self, item: &TransferItem, progress: ProgressFn) -> Result<u64> {
        let addr = self.addr(&VPath::new(&item.source)?);
        let bucket = addr
            .bucket
            .clone()
            .ok_or_else(|| Error::InvalidPath(item.source.clone()))?;
        let client = self.client().await?;

        let response = client
            .get_object()
            .bucket(&bucket)
            .key(&addr.key)
            .send()
            .await
            .map_err(|e| classify(e, &item.source))?;

        let dest = Path::new(&item.dest);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut out = tokio::fs::File::create(dest).await?;
        let mut body = response.body;
        let mut total = 0u64;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| Error::Network(format!("download interrupted: {e}")))?
        {
            out.write_all(&chunk).await?;
            total += chunk.len() as u64;
            progress(chunk.len() as u64);
        }
        out.flush().await?;
        Ok(total)
    }

    async fn put(
        &self,
        remote_dir: &VPath,
        local_file: &Path,
        progress: ProgressFn,
    ) -> Result<PutOutcome> {
        let addr = self.addr(remote_dir);
        let bucket = addr
            .bucket
            .clone()
            .ok_or_else(|| Error::InvalidPath("cannot upload to the mount root".into()))?;
        let name = local_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath(local_file.display().to_string()))?;
        let key = format!("{}{name}", addr.listing_prefix());

        let size = tokio::fs::metadata(local_file).await?.len();

        // identical-content check: equal length elides the upload
        if let Ok((existing, _)) = self.head(&bucket, &key).await {
            if existing >= 0 && existing as u64 == size {
                tracing::debug!(key = %key, "identical content present, skipping upload");
                return Ok(PutOutcome::Skipped);
            }
        }

        let client = self.client().await?;
        let body = ByteStream::from_path(local_file)
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        let content_type = mime_guess::from_path(local_file)
            .first()
            .map(|m| m.essence_str().to_string());

        let mut request = client.put_object().bucket(&bucket).key(&key).body(body);
        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }
        request
            .send()
            .await
            .map_err(|e| classify(e, &format!("{bucket}/{key}")))?;

        progress(size);
        Ok(PutOutcome::Stored(size))
    }

    async fn mkdir(&self, path: &VPath) -> Result<()> {
        let addr = self.addr(path);
        let bucket = self.bucket_of(path)?;
        let client = self.client().await?;

        if addr.is_bucket() {
            client
                .create_bucket()
                .bucket(&bucket)
                .send()
                .await
                .map_err(|e| classify(e, &bucket))?;
            return Ok(());
        }

        // folder marker: zero-length object whose key ends in '/'
        let key = format!("{}/", addr.key.trim_end_matches('/'));
        client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .body(ByteStream::from_static(b""))
            .send()
            .await
            .map_err(|e| classify(e, &format!("{bucket}/{key}")))?;
        Ok(())
    }

    async fn rmdir(&self, path: &VPath, confirm: Confirm<'_>) -> Result<()> {
        let addr = self.addr(path);
        let bucket = self.bucket_of(path)?;
        let client = self.client().await?;

        if addr.is_bucket() {
            let objects = self.list_recursive(&bucket, "").await?;
            if !confirm(&format!(
                "remove bucket {bucket} and its {} object(s)?",
                objects.len()
            )) {
                return Err(Error::Cancelled);
            }
            if !objects.is_empty() {
                let keys: Vec<String> = objects.into_iter().map(|(k, _)| k).collect();
                self.delete_keys(&bucket, &keys).await?;
            }
            client
                .delete_bucket()
                .bucket(&bucket)
                .send()
                .await
                .map_err(|e| classify(e, &bucket))?;
            return Ok(());
        }

        let prefix = format!("{}/", addr.key.trim_end_matches('/'));
        let objects = self.list_recursive(&bucket, &prefix).await?;
        let non_marker: Vec<&(String, i64)> =
            objects.iter().filter(|(k, _)| *k != prefix).collect();
        if !non_marker.is_empty() {
            return Err(Error::Conflict(format!("{path} is not empty")));
        }
        client
            .delete_object()
            .bucket(&bucket)
            .key(&prefix)
            .send()
            .await
            .map_err(|e| classify(e, &format!("{bucket}/{prefix}")))?;
        Ok(())
    }

    async fn rm(&self, pattern: &VPath, confirm: Confirm<'_>) -> Result<u64> {
        let addr = self.addr(pattern);
        let bucket = self.bucket_of(pattern)?;

        let keys: Vec<String> = if addr.is_glob() {
            self.glob_objects(&addr)
                .await?
                .into_iter()
                .map(|(k, _)| k)
                .collect()
        } else {
            // verify the single key exists before asking for confirmation
            self.head(&bucket, &addr.key).await?;
            vec![addr.key.clone()]
        };

        if keys.is_empty() {
            return Err(Error::NotFound(format!("nothing matches {pattern}")));
        }
        if !confirm(&format!("delete {} object(s)?", keys.len())) {
            return Err(Error::Cancelled);
        }
        self.delete_keys(&bucket, &keys).await
    }

    async fn publish(&self, pattern: &VPath) -> Result<Vec<String>> {
        let addr = self.addr(pattern);
        let bucket = self.bucket_of(pattern)?;

        if addr.is_bucket() {
            let mut doc = self.load_policy(&bucket).await?;
            let suffix = jiff::Timestamp::now().as_millisecond().to_string();
            let sid = doc.grant_public_read(&bucket, &suffix);
            self.store_policy(&bucket, &doc).await?;
            return Ok(vec![format!("bucket {bucket} published ({sid})")]);
        }

        let targets: Vec<String> = if addr.is_glob() {
            self.glob_objects(&addr)
                .await?
                .into_iter()
                .map(|(k, _)| k)
                .collect()
        } else {
            self.head(&bucket, &addr.key).await?;
            vec![addr.key.clone()]
        };
        if targets.is_empty() {
            return Err(Error::NotFound(format!("nothing matches {pattern}")));
        }

        let mut urls = Vec::with_capacity(targets.len());
        for key in targets {
            urls.push(self.presign_get(&bucket, &key).await?);
        }
        Ok(urls)
    }

    async fn unpublish(&self, pattern: &VPath) -> Result<u64> {
        let bucket = self.bucket_of(pattern)?;
        let mut doc = self.load_policy(&bucket).await?;
        let removed = doc.revoke_public_read();
        if removed > 0 || doc.is_empty() {
            self.store_policy(&bucket, &doc).await?;
        }
        Ok(removed)
    }

    async fn lifecycle(&self, path: &VPath, action: &LifecycleAction) -> Result<Vec<String>> {
        let bucket = self.bucket_of(path)?;
        let client = self.client().await?;

        match action {
            LifecycleAction::Show => {
                let mut lines = Vec::new();
                match client.get_bucket_versioning().bucket(&bucket).send().await {
                    Ok(v) => lines.push(format!(
                        "versioning: {}",
                        v.status().map(|s| s.as_str()).unwrap_or("Disabled")
                    )),
                    Err(e) => return Err(classify(e, &bucket)),
                }
                match client
                    .get_bucket_lifecycle_configuration()
                    .bucket(&bucket)
                    .send()
                    .await
                {
                    Ok(lc) => {
                        for rule in lc.rules() {
                            let mut detail = String::new();
                            if let Some(abort) = rule.abort_incomplete_multipart_upload() {
                                detail = format!(
                                    "abort-multipart after {} day(s)",
                                    abort.days_after_initiation().unwrap_or(0)
                                );
                            }
                            if let Some(nc) = rule.noncurrent_version_expiration() {
                                detail = format!(
                                    "expire-noncurrent after {} day(s)",
                                    nc.noncurrent_days().unwrap_or(0)
                                );
                            }
                            lines.push(format!(
                                "rule {}: {} {detail}",
                                rule.id().unwrap_or("-"),
                                rule.status().as_str()
                            ));
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "no lifecycle configuration");
                        lines.push("no lifecycle rules".to_string());
                    }
                }
                Ok(lines)
            }

            LifecycleAction::Set {
                abort_multipart,
                expire_noncurrent,
            } => {
                let mut rules = Vec::new();
                if let Some(spec) = abort_multipart {
                    let rule = LifecycleRule::builder()
                        .id("pshell-abort-multipart")
                        .status(if spec.enabled {
                            ExpirationStatus::Enabled
                        } else {
                            ExpirationStatus::Disabled
                        })
                        .filter(LifecycleRuleFilter::builder().prefix("").build())
                        .abort_incomplete_multipart_upload(
                            AbortIncompleteMultipartUpload::builder()
                                .days_after_initiation(spec.days as i32)
                                .build(),
                        )
                        .build()
                        .map_err(|e| Error::General(e.to_string()))?;
                    rules.push(rule);
                }
                if let Some(spec) = expire_noncurrent {
                    let rule = LifecycleRule::builder()
                        .id("pshell-expire-noncurrent")
                        .status(if spec.enabled {
                            ExpirationStatus::Enabled
                        } else {
                            ExpirationStatus::Disabled
                        })
                        .filter(LifecycleRuleFilter::builder().prefix("").build())
                        .noncurrent_version_expiration(
                            NoncurrentVersionExpiration::builder()
                                .noncurrent_days(spec.days as i32)
                                .build(),
                        )
                        .build()
                        .map_err(|e| Error::General(e.to_string()))?;
                    rules.push(rule);
                }
                if rules.is_empty() {
                    return Err(Error::InvalidPath("no lifecycle rules given".into()));
                }
                let count = rules.len();
                let config = BucketLifecycleConfiguration::builder()
                    .set_rules(Some(rules))
                    .build()
                    .map_err(|e| Error::General(e.to_string()))?;
                client
                    .put_bucket_lifecycle_configuration()
                    .bucket(&bucket)
                    .lifecycle_configuration(config)
                    .send()
                    .await
                    .map_err(|e| classify(e, &bucket))?;
                Ok(vec![format!("{count} lifecycle rule(s) installed")])
            }

            LifecycleAction::Versioning(enable) => {
                let status = if *enable {
                    BucketVersioningStatus::Enabled
                } else {
                    BucketVersioningStatus::Suspended
                };
                let config = VersioningConfiguration::builder()
                    .status(status.clone())
                    .build();
                client
                    .put_bucket_versioning()
                    .bucket(&bucket)
                    .versioning_configuration(config)
                    .send()
                    .await
                    .map_err(|e| classify(e, &bucket))?;
                Ok(vec![format!("versioning {}", status.as_str())])
            }
        }
    }

    async fn copy(
        &self,
        src: &VPath,
        dst: &VPath,
        peer: Option<Arc<dyn Backend>>,
        confirm: Confirm<'_>,
    ) -> Result<()> {
        if peer.is_some() {
            return Err(Error::Unsupported(
                "copy across mounts; download and re-upload instead".into(),
            ));
        }
        let src_addr = self.addr(src);
        let dst_addr = self.addr(dst);
        let (Some(src_bucket), Some(dst_bucket)) =
            (src_addr.bucket.clone(), dst_addr.bucket.clone())
        else {
            return Err(Error::InvalidPath("copy needs bucket paths".into()));
        };

        let dst_key = if dst_addr.is_bucket() || dst_addr.is_prefix() {
            format!("{}{}", dst_addr.listing_prefix(), src_addr.leaf())
        } else {
            dst_addr.key.clone()
        };

        if self.head(&dst_bucket, &dst_key).await.is_ok()
            && !confirm(&format!("overwrite {dst_bucket}/{dst_key}?"))
        {
            return Err(Error::Cancelled);
        }

        let client = self.client().await?;
        client
            .copy_object()
            .copy_source(format!("{src_bucket}/{}", src_addr.key))
            .bucket(&dst_bucket)
            .key(&dst_key)
            .send()
            .await
            .map_err(|e| classify(e, src.as_str()))?;
        Ok(())
    }

    async fn identity(&self) -> Result<String> {
        let client = self.client().await?;
        let response = client
            .list_buckets()
            .send()
            .await
            .map_err(|e| classify(e, "endpoint"))?;
        if let Some(owner) = response.owner() {
            if let Some(name) = owner.display_name().or(owner.id()) {
                return Ok(name.to_string());
            }
        }
        self.inner
            .descriptor
            .read()
            .await
            .access_id
            .clone()
            .ok_or_else(|| Error::Auth("no identity available".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(prefix: &str) -> S3Client {
        let mut ep = EndpointDescriptor::new(BackendKind::S3, "https://s3.example.com");
        ep.access_id = Some("AK".into());
        ep.secret = Some("SK".into());
        S3Client::new(prefix, ep).unwrap()
    }

    #[test]
    fn test_addr_strips_mount_prefix() {
        let c = client("/projects/demo");
        let path = VPath::new("/projects/demo/bucket/a/b.txt").unwrap();
        let addr = c.addr(&path);
        assert_eq!(addr.bucket.as_deref(), Some("bucket"));
        assert_eq!(addr.key, "a/b.txt");
    }

    #[test]
    fn test_addr_at_root_mount() {
        let c = client("/");
        let path = VPath::new("/bucket").unwrap();
        let addr = c.addr(&path);
        assert_eq!(addr.bucket.as_deref(), Some("bucket"));
        assert_eq!(addr.key, "");
    }

    #[test]
    fn test_addr_mount_root_is_bucketless() {
        let c = client("/projects/demo");
        let path = VPath::new("/projects/demo").unwrap();
        let addr = c.addr(&path);
        assert_eq!(addr.bucket, None);
        assert_eq!(addr.key, "");
    }

    #[test]
    fn test_to_virtual_roundtrip() {
        let c = client("/projects/demo");
        assert_eq!(
            c.to_virtual("bucket", "a/b.txt"),
            "/projects/demo/bucket/a/b.txt"
        );
        assert_eq!(c.to_virtual("bucket", ""), "/projects/demo/bucket");
    }

    #[tokio::test]
    async fn test_unauthenticated_client_refuses_operations() {
        let ep = EndpointDescriptor::new(BackendKind::S3, "https://s3.example.com");
        let c = S3Client::new("/p", ep).unwrap();
        assert!(!c.authenticated().await);
        let err = c.client().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_logout_drops_keys() {
        let c = client("/p");
        assert!(c.authenticated().await);
        c.logout().await.unwrap();
        assert!(!c.authenticated().await);
    }

    #[test]
    fn test_classify_error_strings() {
        assert!(matches!(classify("NoSuchKey: gone", "x"), Error::NotFound(_)));
        assert!(matches!(
            classify("AccessDenied by policy", "x"),
            Error::Quota(_)
        ));
        assert!(matches!(
            classify("BucketNotEmpty", "x"),
            Error::Conflict(_)
        ));
        assert!(matches!(classify("connection reset", "x"), Error::Network(_)));
    }

    #[tokio::test]
    async fn test_status_mentions_state_not_secrets() {
        let c = client("/p");
        let status = c.status().await;
        assert!(status.contains("keys loaded"));
        assert!(!status.contains("SK"));
    }
}
