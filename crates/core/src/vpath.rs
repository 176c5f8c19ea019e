//! Virtual path handling
//!
//! A virtual path is an absolute POSIX-style path (`/` separator) over the
//! unified namespace. Canonicalization folds `.`/`..` and duplicate
//! separators and strips any trailing slash except on the root itself, so a
//! canonical path compares bytewise. Paths are case-sensitive and carried as
//! UTF-8 strings; backend-native syntax never leaks through this type.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An absolute, canonical virtual path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VPath(String);

impl VPath {
    /// The virtual root `/`
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Canonicalize an absolute path string.
    ///
    /// Fails when the input is empty or relative. `..` above the root
    /// saturates at the root.
    pub fn new(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidPath("path cannot be empty".into()));
        }
        if !raw.starts_with('/') {
            return Err(Error::InvalidPath(format!("not an absolute path: {raw}")));
        }
        Ok(Self(canonical_segments(raw)))
    }

    /// Join a possibly-relative argument onto a working directory.
    ///
    /// Absolute arguments ignore `cwd`; a surrounding quote pair on the raw
    /// argument is stripped first.
    pub fn resolve(cwd: &VPath, raw: &str) -> Result<Self> {
        let raw = strip_quotes(raw);
        if raw.is_empty() {
            return Ok(cwd.clone());
        }
        if raw.starts_with('/') {
            Self::new(raw)
        } else {
            Self::new(&format!("{}/{}", cwd.as_str(), raw))
        }
    }

    /// The path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the virtual root
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Final path segment, empty for the root
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Parent path; the root is its own parent
    pub fn parent(&self) -> VPath {
        if self.is_root() {
            return self.clone();
        }
        match self.0.rfind('/') {
            Some(0) | None => VPath::root(),
            Some(pos) => VPath(self.0[..pos].to_string()),
        }
    }

    /// Whether `prefix` covers this path at a segment boundary.
    ///
    /// The root prefix covers everything; otherwise the prefix must be
    /// followed by `/` or end-of-string.
    pub fn under(&self, prefix: &str) -> bool {
        if prefix.is_empty() || prefix == "/" {
            return true;
        }
        match self.0.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Remainder after a mount prefix, always absolute.
    ///
    /// `/projects/foo/bar` with prefix `/projects` gives `/foo/bar`; an
    /// exact prefix match gives `/`.
    pub fn strip_mount(&self, prefix: &str) -> VPath {
        if prefix.is_empty() || prefix == "/" {
            return self.clone();
        }
        match self.0.strip_prefix(prefix) {
            Some("") => VPath::root(),
            Some(rest) if rest.starts_with('/') => VPath(rest.to_string()),
            _ => self.clone(),
        }
    }

    /// Append one segment
    pub fn child(&self, name: &str) -> VPath {
        if self.is_root() {
            VPath(format!("/{name}"))
        } else {
            VPath(format!("{}/{name}", self.0))
        }
    }

    /// Whether the final segment carries `*` or `?` glob metacharacters
    pub fn has_glob(&self) -> bool {
        self.file_name().contains(['*', '?'])
    }
}

impl std::fmt::Display for VPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strip one surrounding quote pair, if present
pub fn strip_quotes(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

fn canonical_segments(raw: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for seg in raw.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    if out.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", out.join("/"))
    }
}
