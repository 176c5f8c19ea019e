//! Integration tests for the pshell binary
//!
//! These tests require a running S3-compatible server.
//!
//! Run with:
//! ```bash
//! docker run -d --name minio -p 9000:9000 \
//!     -e MINIO_ROOT_USER=accesskey \
//!     -e MINIO_ROOT_PASSWORD=secretkey \
//!     minio/minio server /data
//!
//! TEST_S3_ENDPOINT=http://127.0.0.1:9000 \
//! TEST_S3_ACCESS_KEY=accesskey \
//! TEST_S3_SECRET_KEY=secretkey \
//! cargo test --features integration
//! ```

#![cfg(feature = "integration")]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Path to the pshell binary under test
fn pshell_binary() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_pshell") {
        return PathBuf::from(path);
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .map(|root| root.join("target/debug/pshell"))
        .unwrap_or_else(|| PathBuf::from("pshell"))
}

/// S3 test endpoint from the environment
fn test_endpoint() -> Option<(String, String, String)> {
    let endpoint = std::env::var("TEST_S3_ENDPOINT").ok()?;
    let access = std::env::var("TEST_S3_ACCESS_KEY").ok()?;
    let secret = std::env::var("TEST_S3_SECRET_KEY").ok()?;
    Some((endpoint, access, secret))
}

/// Write a config with one s3 mount at /store and return its location
fn seed_config() -> Option<(TempDir, PathBuf)> {
    let (endpoint, access, secret) = test_endpoint()?;
    let dir = tempfile::tempdir().ok()?;
    let config_path = dir.path().join("config.toml");
    let body = format!(
        r#"[default.endpoints."/store"]
kind = "s3"
url = "{endpoint}"
access_id = "{access}"
secret = "{secret}"
"#
    );
    std::fs::write(&config_path, body).ok()?;
    Some((dir, config_path))
}

/// Run one-shot `pshell -c <line>` against the seeded config
fn run_pshell(config: &Path, line: &str) -> Output {
    Command::new(pshell_binary())
        .arg("--config")
        .arg(config)
        .arg("--no-progress")
        .arg("-y")
        .arg("-c")
        .arg(line)
        .output()
        .expect("failed to execute pshell")
}

fn unique_bucket(tag: &str) -> String {
    format!(
        "it-{tag}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    )
}

#[test]
fn test_mkdir_ls_rmdir_bucket() {
    let Some((_dir, config)) = seed_config() else {
        eprintln!("skipping: TEST_S3_* not set");
        return;
    };
    let bucket = unique_bucket("basic");

    let output = run_pshell(&config, &format!("mkdir /store/{bucket}"));
    assert!(output.status.success(), "mkdir failed: {output:?}");

    let output = run_pshell(&config, "ls /store");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(&bucket));

    let output = run_pshell(&config, &format!("rmdir /store/{bucket}"));
    assert!(output.status.success(), "rmdir failed: {output:?}");
}

#[test]
fn test_put_get_roundtrip_and_skip() {
    let Some((_dir, config)) = seed_config() else {
        eprintln!("skipping: TEST_S3_* not set");
        return;
    };
    let bucket = unique_bucket("xfer");
    assert!(run_pshell(&config, &format!("mkdir /store/{bucket}")).status.success());

    let work = tempfile::tempdir().unwrap();
    let file = work.path().join("payload.bin");
    std::fs::write(&file, vec![7u8; 4096]).unwrap();

    // first put uploads, second put skips on identical length
    let line = format!("put /store/{bucket} {}", file.display());
    let output = run_pshell(&config, &line);
    assert!(output.status.success(), "put failed: {output:?}");

    let output = run_pshell(&config, &line);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("skipped"));

    // round-trip back to disk
    let down = tempfile::tempdir().unwrap();
    let line = format!("get /store/{bucket}/payload.bin {}", down.path().display());
    let output = run_pshell(&config, &line);
    assert!(output.status.success(), "get failed: {output:?}");
    let fetched = std::fs::read(down.path().join("payload.bin")).unwrap();
    assert_eq!(fetched.len(), 4096);

    // cleanup
    assert!(run_pshell(&config, &format!("rmdir /store/{bucket}")).status.success());
}

#[test]
fn test_exit_codes_for_script_mode() {
    let Some((_dir, config)) = seed_config() else {
        eprintln!("skipping: TEST_S3_* not set");
        return;
    };

    // unknown path under the mount -> not-found exit code
    let output = run_pshell(&config, "file /store/definitely-not-here-000/x");
    assert_eq!(output.status.code(), Some(5), "stderr: {output:?}");

    // path outside every mount -> not-found exit code
    let output = run_pshell(&config, "ls /nowhere");
    assert_eq!(output.status.code(), Some(5));
}
