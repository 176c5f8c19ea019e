//! Configuration management
//!
//! The configuration file holds one section per profile; each profile keeps
//! connection options plus an `endpoints` table mapping mount prefixes to
//! endpoint descriptors. The file is the only persisted shared resource and
//! has a single writer (the session manager), which replaces it atomically
//! (write to temp, rename).

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointDescriptor;
use crate::error::{Error, Result};

/// Default profile name
pub const DEFAULT_PROFILE: &str = "default";

/// One configuration profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    /// Asset-store server host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// `http` or `https`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// Server port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Authentication domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Default asset namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Last session token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Delegated token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Mount prefix → endpoint descriptor
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub endpoints: BTreeMap<String, EndpointDescriptor>,

    /// Encrypt the data channel
    #[serde(default)]
    pub encrypt: bool,

    /// Verbose protocol diagnostics
    #[serde(default)]
    pub debug: bool,
}

/// Full configuration: profile name → profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    /// All profiles
    pub profiles: BTreeMap<String, Profile>,
}

impl Config {
    /// Get a profile, if present
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Get or create a profile
    pub fn profile_mut(&mut self, name: &str) -> &mut Profile {
        self.profiles.entry(name.to_string()).or_default()
    }
}

/// Loads and saves the configuration file
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a manager at the default location.
    ///
    /// Uses the user config directory when available, otherwise the current
    /// working directory.
    pub fn new() -> Result<Self> {
        let config_path = match dirs::config_dir() {
            Some(dir) => dir.join("pshell").join("config.toml"),
            None => std::env::current_dir()
                .map_err(|e| Error::Config(format!("no usable config location: {e}")))?
                .join("pshell.toml"),
        };
        Ok(Self { config_path })
    }

    /// Create a manager with an explicit path (used by tests and `--config`)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// The configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load the configuration; a missing file yields the default
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(&self.config_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save the configuration atomically.
    ///
    /// Writes a sibling temp file and renames it over the target so a
    /// crashed writer never leaves a torn config. Permissions are 600 on
    /// unix; the file carries credential material.
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        let tmp = self.config_path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp, &self.config_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{BackendKind, EndpointDescriptor};
    use tempfile::TempDir;

    fn temp_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp_dir.path().join("config.toml"));
        (manager, temp_dir)
    }

    fn sample_config() -> Config {
        let mut config = Config::default();
        let profile = config.profile_mut(DEFAULT_PROFILE);
        profile.server = Some("assets.example.com".into());
        profile.protocol = Some("https".into());
        profile.port = Some(443);
        profile.domain = Some("corp".into());
        profile.encrypt = true;

        let mut ep = EndpointDescriptor::new(BackendKind::Asset, "https://assets.example.com");
        ep.domain = Some("corp".into());
        profile.endpoints.insert("/assets".into(), ep);

        let mut s3 = EndpointDescriptor::new(BackendKind::S3, "https://s3.example.com");
        s3.access_id = Some("AK".into());
        s3.secret = Some("SK".into());
        profile.endpoints.insert("/projects/demo".into(), s3);
        config
    }

    #[test]
    fn test_load_missing_returns_default() {
        let (manager, _dir) = temp_manager();
        let config = manager.load().unwrap();
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let (manager, _dir) = temp_manager();
        let config = sample_config();
        manager.save(&config).unwrap();

        let loaded = manager.load().unwrap();
        let profile = loaded.profile(DEFAULT_PROFILE).unwrap();
        assert_eq!(profile.server.as_deref(), Some("assets.example.com"));
        assert_eq!(profile.port, Some(443));
        assert!(profile.encrypt);
        assert_eq!(profile.endpoints.len(), 2);
        assert_eq!(profile.endpoints["/projects/demo"].kind, BackendKind::S3);
        assert_eq!(
            profile.endpoints["/projects/demo"].access_id.as_deref(),
            Some("AK")
        );
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let (manager, dir) = temp_manager();
        manager.save(&sample_config()).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty());
        assert!(manager.config_path().exists());
    }

    #[test]
    fn test_save_overwrites_previous() {
        let (manager, _dir) = temp_manager();
        manager.save(&sample_config()).unwrap();

        let mut config = manager.load().unwrap();
        config.profile_mut(DEFAULT_PROFILE).session = Some("tok123".into());
        manager.save(&config).unwrap();

        let loaded = manager.load().unwrap();
        assert_eq!(
            loaded.profile(DEFAULT_PROFILE).unwrap().session.as_deref(),
            Some("tok123")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_restrictive() {
        use std::os::unix::fs::PermissionsExt;
        let (manager, _dir) = temp_manager();
        manager.save(&sample_config()).unwrap();
        let mode = std::fs::metadata(manager.config_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
