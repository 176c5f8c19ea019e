//! HTTPS transport for the asset-store service protocol
//!
//! Requests are XML documents POSTed to the service endpoint; the data
//! channel hangs off the same host. Error replies arrive as
//! `<response><reply><error/><message>…</message></reply></response>` and
//! are classified into the core error taxonomy here, so the client above
//! only ever sees typed errors.

use std::path::Path;
use std::time::Duration;

use ps_core::{Error, ProgressFn, Result, TimeoutConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::xml::{self, XmlElement};

const UPLOAD_CHUNK: usize = 64 * 1024;

/// Transport bound to one service endpoint
pub struct ServiceTransport {
    http: reqwest::Client,
    base: url::Url,
    mount_timeout: Duration,
}

impl ServiceTransport {
    /// Build a transport for a base URL with the endpoint's timeouts
    pub fn new(base_url: &str, timeouts: &TimeoutConfig) -> Result<Self> {
        let base = url::Url::parse(base_url)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base,
            mount_timeout: Duration::from_secs(timeouts.mount_secs),
        })
    }

    fn service_url(&self) -> Result<url::Url> {
        self.base.join("service").map_err(Error::from)
    }

    fn data_url(&self, asset_id: &str) -> Result<url::Url> {
        self.base.join(&format!("data/{asset_id}")).map_err(Error::from)
    }

    /// POST a request document and parse the reply envelope
    pub async fn post_xml(&self, body: String) -> Result<XmlElement> {
        let response = self
            .http
            .post(self.service_url()?)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed reading response body: {e}")))?;
        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        let doc = xml::parse(&text)?;
        check_reply(&doc)?;
        Ok(doc)
    }

    /// POST a request document plus one streamed binary attachment.
    ///
    /// Used for uploads; the long mount-scale timeout applies.
    pub async fn post_multipart(
        &self,
        request_xml: String,
        file: &Path,
        progress: ProgressFn,
    ) -> Result<XmlElement> {
        let handle = tokio::fs::File::open(file).await?;
        let stream = futures::stream::try_unfold(handle, move |mut f| {
            let progress = progress.clone();
            async move {
                let mut buf = vec![0u8; UPLOAD_CHUNK];
                let n = f.read(&mut buf).await?;
                if n == 0 {
                    return Ok::<_, std::io::Error>(None);
                }
                buf.truncate(n);
                progress(n as u64);
                Ok(Some((buf, f)))
            }
        });

        let attachment = reqwest::multipart::Part::stream(reqwest::Body::wrap_stream(stream))
            .file_name(
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "attachment".to_string()),
            )
            .mime_str("application/octet-stream")
            .map_err(|e| Error::Protocol(format!("bad attachment mime: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .text("request", request_xml)
            .part("attachment", attachment);

        let response = self
            .http
            .post(self.service_url()?)
            .timeout(self.mount_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed reading response body: {e}")))?;
        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        let doc = xml::parse(&text)?;
        check_reply(&doc)?;
        Ok(doc)
    }

    /// Fetch project-scoped object-store keys from the token service.
    ///
    /// The token service lives beside the asset service and authenticates
    /// with the actor name plus the wallet-held password.
    pub async fn fetch_sso_keys(
        &self,
        actor: &str,
        password: &str,
    ) -> Result<Vec<ps_core::SsoKeySet>> {
        let url = self.base.join("sso/keys").map_err(Error::from)?;
        let response = self
            .http
            .get(url)
            .basic_auth(actor, Some(password))
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, ""));
        }
        response
            .json::<Vec<ps_core::SsoKeySet>>()
            .await
            .map_err(|e| Error::Protocol(format!("malformed token service reply: {e}")))
    }

    /// Stream an asset's content from the data channel into a local file;
    /// returns bytes written
    pub async fn download(
        &self,
        asset_id: &str,
        session: &str,
        dest: &Path,
        progress: ProgressFn,
    ) -> Result<u64> {
        let mut url = self.data_url(asset_id)?;
        url.query_pairs_mut().append_pair("session", session);

        let response = self
            .http
            .get(url)
            .timeout(self.mount_timeout)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, ""));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut out = tokio::fs::File::create(dest).await?;
        let mut total = 0u64;
        let mut response = response;
        while let Some(chunk) = response
            .chunk()
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
}

/// Surface an `<error/>` reply as a typed error
fn check_reply(doc: &XmlElement) -> Result<()> {
    if doc.find("reply/error").is_none() {
        return Ok(());
    }
    let message = doc
        .value_of("reply/message")
        .unwrap_or("unspecified service error")
        .to_string();
    Err(classify_reply(&message))
}

fn classify_reply(message: &str) -> Error {
    let lower = message.to_ascii_lowercase();
    if lower.contains("session") && (lower.contains("invalid") || lower.contains("expired")) {
        Error::Auth(message.to_string())
    } else if lower.contains("logon") || lower.contains("authentication") {
        Error::Auth(message.to_string())
    } else if lower.contains("not found")
        || lower.contains("does not exist")
        || lower.contains("no such")
    {
        Error::NotFound(message.to_string())
    } else if lower.contains("quota") || lower.contains("access denied") || lower.contains("permission")
    {
        Error::Quota(message.to_string())
    } else if lower.contains("already exists") {
        Error::Conflict(message.to_string())
    } else {
        Error::General(message.to_string())
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Network(format!("request timed out: {e}"))
    } else {
        Error::Network(e.to_string())
    }
}

fn status_error(status: reqwest::StatusCode, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::Auth(format!("server returned {status}")),
        404 => Error::NotFound(format!("server returned {status}")),
        _ => Error::Network(format!(
            "server returned {status}{}",
            if body.is_empty() { String::new() } else { format!(": {body}") }
        )),
    }
}
