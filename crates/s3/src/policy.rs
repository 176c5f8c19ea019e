//! Bucket policy documents
//!
//! Public-read grants are appended as statements whose `Sid` carries the
//! `pshell-public-` prefix; revocation removes exactly those statements and
//! leaves any foreign policy intact.

use serde::{Deserialize, Serialize};

use ps_core::{Error, Result};

/// Sid prefix identifying grants written by this tool
pub const PUBLIC_SID_PREFIX: &str = "pshell-public-";

/// A bucket policy document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    /// Policy language version
    pub version: String,

    /// Statements in document order
    #[serde(default)]
    pub statement: Vec<PolicyStatement>,
}

/// One policy statement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    /// Statement id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Allow or Deny
    pub effect: String,

    /// Grantee
    pub principal: serde_json::Value,

    /// Granted actions
    pub action: serde_json::Value,

    /// Affected resources
    pub resource: serde_json::Value,
}

impl PolicyDocument {
    /// Empty policy shell
    pub fn empty() -> Self {
        Self {
            version: "2012-10-17".to_string(),
            statement: Vec::new(),
        }
    }

    /// Parse a policy JSON body; an empty body yields the empty policy
    pub fn parse(body: &str) -> Result<Self> {
        if body.trim().is_empty() {
            return Ok(Self::empty());
        }
        serde_json::from_str(body)
            .map_err(|e| Error::Protocol(format!("malformed bucket policy: {e}")))
    }

    /// Serialize back to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::from)
    }

    /// Append a public-read grant for a whole bucket; returns the new Sid
    pub fn grant_public_read(&mut self, bucket: &str, suffix: &str) -> String {
        let sid = format!("{PUBLIC_SID_PREFIX}{suffix}");
        self.statement.push(PolicyStatement {
            sid: Some(sid.clone()),
            effect: "Allow".to_string(),
            principal: serde_json::json!({ "AWS": ["*"] }),
            action: serde_json::json!(["s3:ListBucket", "s3:GetObject"]),
            resource: serde_json::json!([
                format!("arn:aws:s3:::{bucket}"),
                format!("arn:aws:s3:::{bucket}/*"),
            ]),
        });
        sid
    }

    /// Drop every statement written by this tool; returns how many fell
    pub fn revoke_public_read(&mut self) -> u64 {
        let before = self.statement.len();
        self.statement.retain(|s| {
            !s.sid
                .as_deref()
                .map(|sid| sid.starts_with(PUBLIC_SID_PREFIX))
                .unwrap_or(false)
        });
        (before - self.statement.len()) as u64
    }

    /// Whether the document grants nothing
    pub fn is_empty(&self) -> bool {
        self.statement.is_empty()
    }
}
