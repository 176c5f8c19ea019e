//! Local-side verbs
//!
//! `lpwd`/`lcd`/`lls` operate on the local filesystem cwd the shell keeps
//! for itself; they never touch a backend and run even when every mount is
//! offline.

use std::path::{Path, PathBuf};

use ps_core::{Error, Result};

/// Local working directory state
#[derive(Debug, Clone)]
pub struct LocalCwd {
    cwd: PathBuf,
}

impl LocalCwd {
    /// Start at the process working directory
    pub fn new() -> Result<Self> {
        Ok(Self {
            cwd: std::env::current_dir()?,
        })
    }

    /// Current local directory
    pub fn path(&self) -> &Path {
        &self.cwd
    }

    /// Resolve an argument against the local cwd
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let candidate = Path::new(raw);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.cwd.join(candidate)
        }
    }

    /// Change the local directory; the target must exist
    pub fn cd(&mut self, raw: &str) -> Result<&Path> {
        let target = self.resolve(raw);
        let canonical = target
            .canonicalize()
            .map_err(|_| Error::NotFound(target.display().to_string()))?;
        if !canonical.is_dir() {
            return Err(Error::Conflict(format!(
                "{} is not a directory",
                canonical.display()
            )));
        }
        self.cwd = canonical;
        Ok(&self.cwd)
    }

    /// List a local directory (or the cwd); directories are marked
    pub fn ls(&self, raw: Option<&str>) -> Result<Vec<String>> {
        let target = match raw {
            Some(raw) => self.resolve(raw),
            None => self.cwd.clone(),
        };
        let mut lines = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(&target)
            .map_err(|_| Error::NotFound(target.display().to_string()))?
            .filter_map(|e| e.ok())
            .collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata()?;
            if meta.is_dir() {
                lines.push(format!("[Dir] {name}/"));
            } else {
                lines.push(format!("{:>12} | {name}", meta.len()));
            }
        }
        Ok(lines)
    }
}

/// Expand a local source argument for `put`: a glob pattern, a file, or a
/// directory
pub fn expand_local_sources(base: &LocalCwd, raw: &str) -> Result<Vec<PathBuf>> {
    if raw.contains(['*', '?']) {
        let pattern = base.resolve(raw);
        let pattern = pattern.to_string_lossy();
        let mut files = Vec::new();
        for entry in
            glob::glob(&pattern).map_err(|e| Error::InvalidPath(format!("bad pattern: {e}")))?
        {
            let path = entry.map_err(|e| Error::Io(e.into_error()))?;
            if path.is_file() {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(Error::NotFound(format!("nothing matches {raw}")));
        }
        return Ok(files);
    }

    let path = base.resolve(raw);
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    Ok(vec![path])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> (LocalCwd, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"one").unwrap();
        std::fs::write(dir.path().join("b.log"), b"two").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let cwd = LocalCwd {
            cwd: dir.path().to_path_buf(),
        };
        (cwd, dir)
    }

    #[test]
    fn test_ls_marks_directories() {
        let (cwd, _dir) = sandbox();
        let lines = cwd.ls(None).unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().any(|l| l == "[Dir] sub/"));
        assert!(lines.iter().any(|l| l.ends_with("| a.txt")));
    }

    #[test]
    fn test_cd_rejects_missing_and_files() {
        let (mut cwd, _dir) = sandbox();
        assert!(matches!(cwd.cd("nope"), Err(Error::NotFound(_))));
        assert!(matches!(cwd.cd("a.txt"), Err(Error::Conflict(_))));
        cwd.cd("sub").unwrap();
        assert!(cwd.path().ends_with("sub"));
    }

    #[test]
    fn test_expand_glob_sources() {
        let (cwd, _dir) = sandbox();
        let files = expand_local_sources(&cwd, "*.txt").unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("a.txt"));

        assert!(matches!(
            expand_local_sources(&cwd, "*.gone"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_expand_single_file() {
        let (cwd, _dir) = sandbox();
        let files = expand_local_sources(&cwd, "b.log").unwrap();
        assert_eq!(files.len(), 1);
    }
}
