//! Credential and session lifecycle
//!
//! The session manager owns the configuration file: it materializes mounts
//! from a profile at startup, rewrites the file atomically after any
//! credential mutation, and runs the SSO bootstrap that turns one
//! authenticated backend's identity into mounts for another. Secrets are
//! redacted from every diagnostic it emits.

use std::sync::Arc;

use crate::backend::{Backend, BackendFactory};
use crate::config::{Config, ConfigManager, Profile};
use crate::endpoint::{BackendKind, EndpointDescriptor};
use crate::error::{Error, Result};
use crate::router::MountTable;
use crate::vpath::VPath;

/// Outcome of one mount attempt during startup
#[derive(Debug, Clone)]
pub struct MountAttempt {
    /// Mount prefix
    pub prefix: String,
    /// Whether token reconnect succeeded; offline mounts await `login`
    pub online: bool,
}

/// Orchestrates profiles, mounts, and credential persistence
pub struct SessionManager {
    config_manager: ConfigManager,
    profile: String,
}

impl SessionManager {
    /// Manager over a profile in the given config
    pub fn new(config_manager: ConfigManager, profile: impl Into<String>) -> Self {
        Self {
            config_manager,
            profile: profile.into(),
        }
    }

    /// Profile name in use
    pub fn profile_name(&self) -> &str {
        &self.profile
    }

    /// Load the active profile; missing profiles come back empty
    pub fn load_profile(&self) -> Result<Profile> {
        let config = self.config_manager.load()?;
        Ok(config.profile(&self.profile).cloned().unwrap_or_default())
    }

    /// Build and mount every configured endpoint.
    ///
    /// Each mount attempts a token-based reconnect; failures leave the
    /// mount offline rather than aborting startup.
    pub async fn startup(
        &self,
        factory: &dyn BackendFactory,
        router: &mut MountTable,
    ) -> Result<Vec<MountAttempt>> {
        let profile = self.load_profile()?;
        let mut attempts = Vec::with_capacity(profile.endpoints.len() + 1);

        // server/protocol/port profile options describe an asset store at
        // the virtual root unless an explicit endpoint already covers it
        if let Some(server) = &profile.server {
            let covered = profile.endpoints.keys().any(|k| k == "/" || k.is_empty());
            if !covered {
                let protocol = profile.protocol.as_deref().unwrap_or("https");
                let port = profile.port.unwrap_or(443);
                let mut descriptor = EndpointDescriptor::new(
                    BackendKind::Asset,
                    format!("{protocol}://{server}:{port}"),
                );
                descriptor.domain = profile.domain.clone();
                descriptor.session_token = profile.session.clone();
                descriptor.delegate_token = profile.token.clone();
                attempts.push(self.mount_one(factory, router, "/", &descriptor).await?);
            }
        }

        for (prefix, descriptor) in &profile.endpoints {
            attempts.push(self.mount_one(factory, router, prefix, descriptor).await?);
        }
        Ok(attempts)
    }

    async fn mount_one(
        &self,
        factory: &dyn BackendFactory,
        router: &mut MountTable,
        prefix: &str,
        descriptor: &EndpointDescriptor,
    ) -> Result<MountAttempt> {
        let backend = factory.create(prefix, descriptor)?;
        let online = match backend.connect().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(mount = %prefix, error = %e, "reconnect failed, mount offline");
                false
            }
        };
        router.mount(prefix, backend)?;
        Ok(MountAttempt {
            prefix: prefix.to_string(),
            online,
        })
    }

    /// Store a descriptor under a mount prefix and rewrite the config
    pub fn update_endpoint(&self, prefix: &str, descriptor: EndpointDescriptor) -> Result<()> {
        let mut config = self.config_manager.load()?;
        config
            .profile_mut(&self.profile)
            .endpoints
            .insert(prefix.to_string(), descriptor);
        self.config_manager.save(&config)
    }

    /// Drop a mount's descriptor and rewrite the config
    pub fn remove_endpoint(&self, prefix: &str) -> Result<()> {
        let mut config = self.config_manager.load()?;
        let removed = config
            .profile_mut(&self.profile)
            .endpoints
            .remove(prefix)
            .is_some();
        if !removed {
            return Err(Error::NotFound(format!("endpoint {prefix}")));
        }
        self.config_manager.save(&config)
    }

    /// Persist a backend's current descriptor (after login, logout, or
    /// delegation changed its token material)
    pub async fn persist_backend(&self, prefix: &str, backend: &Arc<dyn Backend>) -> Result<()> {
        let descriptor = backend.endpoint().await;
        self.update_endpoint(prefix, descriptor)
    }

    /// SSO bootstrap: use an authenticated source backend to provision and
    /// mount object-store credentials.
    ///
    /// The source reports the actor's project-scoped key sets; each becomes
    /// an s3 mount under `mount_root` and lands in the profile. Returns the
    /// prefixes mounted.
    pub async fn delegate_sso(
        &self,
        factory: &dyn BackendFactory,
        router: &mut MountTable,
        source_prefix: &str,
        mount_root: &str,
    ) -> Result<Vec<String>> {
        let source = router.backend_for(&VPath::new(source_prefix)?)?;
        if !source.authenticated().await {
            return Err(Error::Auth(format!(
                "{source_prefix} is not authenticated; login first"
            )));
        }

        let actor = source.identity().await?;
        tracing::info!(actor = %actor, "SSO bootstrap");

        let key_sets = source.sso_keys().await?;
        if key_sets.is_empty() {
            return Err(Error::NotFound(format!("no projects delegated to {actor}")));
        }

        let root = VPath::new(mount_root)?;
        let mut config = self.config_manager.load()?;
        let mut mounted = Vec::with_capacity(key_sets.len());

        for keys in key_sets {
            let prefix = root.child(&keys.project);
            let mut descriptor = EndpointDescriptor::new(BackendKind::S3, keys.url.clone());
            descriptor.access_id = Some(keys.access.clone());
            descriptor.secret = Some(keys.secret.clone());

            let backend = factory.create(prefix.as_str(), &descriptor)?;
            if let Err(e) = backend.connect().await {
                tracing::warn!(mount = %prefix, error = %e, "provisioned mount unreachable");
            }
            router.mount(prefix.as_str(), backend)?;
            config
                .profile_mut(&self.profile)
                .endpoints
                .insert(prefix.as_str().to_string(), descriptor);
            mounted.push(prefix.as_str().to_string());
        }

        self.config_manager.save(&config)?;
        Ok(mounted)
    }

    /// Redacted descriptors for diagnostics; raw secrets never leave here
    pub fn describe_endpoints(&self) -> Result<Vec<(String, EndpointDescriptor)>> {
        let profile = self.load_profile()?;
        Ok(profile
            .endpoints
            .iter()
            .map(|(prefix, ep)| (prefix.clone(), ep.redacted()))
            .collect())
    }

    /// Direct access to the loaded config (for startup checks)
    pub fn load_config(&self) -> Result<Config> {
        self.config_manager.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        Confirm, InfoStream, LineStream, ProgressFn, PutOutcome, TransferItem, TransferPlan,
    };
    use crate::endpoint::{Credentials, SsoKeySet};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    struct FakeBackend {
        descriptor: EndpointDescriptor,
        reachable: bool,
        authed: AtomicBool,
        keys: Vec<SsoKeySet>,
    }

    impl FakeBackend {
        fn new(descriptor: EndpointDescriptor, reachable: bool) -> Self {
            Self {
                descriptor,
                reachable,
                authed: AtomicBool::new(true),
                keys: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        fn kind(&self) -> BackendKind {
            self.descriptor.kind
        }
        async fn connect(&self) -> Result<()> {
            if self.reachable {
                Ok(())
            } else {
                Err(Error::Network("unreachable".into()))
            }
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
            self.descriptor.clone()
        }
        async fn status(&self) -> String {
            "fake".into()
        }
        async fn authenticated(&self) -> bool {
            self.authed.load(Ordering::SeqCst)
        }
        async fn cd(&self, path: &VPath) -> Result<VPath> {
            Ok(path.clone())
        }
        async fn ls(&self, _pattern: &VPath) -> Result<LineStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
        async fn info(&self, _path: &VPath) -> Result<InfoStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
        async fn get_plan(&self, _pattern: &VPath, _local_dir: &Path) -> Result<TransferPlan> {
            Ok(TransferPlan::from_items(vec![]))
        }
        async fn get(&self, _item: &TransferItem, _progress: ProgressFn) -> Result<u64> {
            Ok(0)
        }
        async fn put(
            &self,
            _remote_dir: &VPath,
            _local_file: &Path,
            _progress: ProgressFn,
        ) -> Result<PutOutcome> {
            Ok(PutOutcome::Stored(0))
        }
        async fn mkdir(&self, _path: &VPath) -> Result<()> {
            Ok(())
        }
        async fn rmdir(&self, _path: &VPath, _confirm: Confirm<'_>) -> Result<()> {
            Ok(())
        }
        async fn rm(&self, _pattern: &VPath, _confirm: Confirm<'_>) -> Result<u64> {
            Ok(0)
        }
        async fn identity(&self) -> Result<String> {
            Ok("alice".into())
        }
        async fn sso_keys(&self) -> Result<Vec<SsoKeySet>> {
            Ok(self.keys.clone())
        }
    }

    struct FakeFactory {
        reachable: bool,
    }

    impl BackendFactory for FakeFactory {
        fn create(&self, _prefix: &str, descriptor: &EndpointDescriptor) -> Result<Arc<dyn Backend>> {
            Ok(Arc::new(FakeBackend::new(descriptor.clone(), self.reachable)))
        }
    }

    fn manager_with_profile(endpoints: Vec<(&str, EndpointDescriptor)>) -> (SessionManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let cm = ConfigManager::with_path(dir.path().join("config.toml"));
        let mut config = Config::default();
        for (prefix, ep) in endpoints {
            config
                .profile_mut("default")
                .endpoints
                .insert(prefix.to_string(), ep);
        }
        cm.save(&config).unwrap();
        (SessionManager::new(cm, "default"), dir)
    }

    #[tokio::test]
    async fn test_startup_mounts_all_endpoints() {
        let (manager, _dir) = manager_with_profile(vec![
            ("/assets", EndpointDescriptor::new(BackendKind::Asset, "https://a")),
            ("/projects/x", EndpointDescriptor::new(BackendKind::S3, "https://s")),
        ]);
        let mut router = MountTable::new();
        let attempts = manager
            .startup(&FakeFactory { reachable: true }, &mut router)
            .await
            .unwrap();

        assert_eq!(attempts.len(), 2);
        assert!(attempts.iter().all(|a| a.online));
        assert_eq!(router.mounts().len(), 2);
    }

    #[tokio::test]
    async fn test_startup_synthesizes_root_asset_mount() {
        let dir = TempDir::new().unwrap();
        let cm = ConfigManager::with_path(dir.path().join("config.toml"));
        let mut config = Config::default();
        let profile = config.profile_mut("default");
        profile.server = Some("assets.example.com".into());
        profile.protocol = Some("https".into());
        profile.port = Some(8443);
        profile.session = Some("stored-session".into());
        cm.save(&config).unwrap();
        let manager = SessionManager::new(cm, "default");

        let mut router = MountTable::new();
        let attempts = manager
            .startup(&FakeFactory { reachable: true }, &mut router)
            .await
            .unwrap();

        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].prefix, "/");
        let backend = router.backend_for(&VPath::root()).unwrap();
        let ep = backend.endpoint().await;
        assert_eq!(ep.kind, BackendKind::Asset);
        assert_eq!(ep.url, "https://assets.example.com:8443");
        assert_eq!(ep.session_token.as_deref(), Some("stored-session"));
    }

    #[tokio::test]
    async fn test_startup_offline_mount_still_mounted() {
        let (manager, _dir) = manager_with_profile(vec![(
            "/assets",
            EndpointDescriptor::new(BackendKind::Asset, "https://a"),
        )]);
        let mut router = MountTable::new();
        let attempts = manager
            .startup(&FakeFactory { reachable: false }, &mut router)
            .await
            .unwrap();

        assert!(!attempts[0].online);
        assert_eq!(router.mounts().len(), 1);
    }

    #[tokio::test]
    async fn test_persist_backend_rewrites_config() {
        let (manager, _dir) = manager_with_profile(vec![]);
        let mut ep = EndpointDescriptor::new(BackendKind::Asset, "https://a");
        ep.session_token = Some("fresh-token".into());
        let backend: Arc<dyn Backend> = Arc::new(FakeBackend::new(ep, true));

        manager.persist_backend("/assets", &backend).await.unwrap();

        let profile = manager.load_profile().unwrap();
        assert_eq!(
            profile.endpoints["/assets"].session_token.as_deref(),
            Some("fresh-token")
        );
    }

    #[tokio::test]
    async fn test_delegate_sso_mounts_and_persists() {
        let (manager, _dir) = manager_with_profile(vec![]);
        let mut router = MountTable::new();

        let mut source = FakeBackend::new(
            EndpointDescriptor::new(BackendKind::Asset, "https://a"),
            true,
        );
        source.keys = vec![
            SsoKeySet {
                project: "alpha".into(),
                url: "https://s3.example.com".into(),
                access: "AK1".into(),
                secret: "SK1".into(),
            },
            SsoKeySet {
                project: "beta".into(),
                url: "https://s3.example.com".into(),
                access: "AK2".into(),
                secret: "SK2".into(),
            },
        ];
        router.mount("/assets", Arc::new(source)).unwrap();

        let mounted = manager
            .delegate_sso(&FakeFactory { reachable: true }, &mut router, "/assets", "/projects")
            .await
            .unwrap();

        assert_eq!(mounted, vec!["/projects/alpha", "/projects/beta"]);
        assert_eq!(router.mounts().len(), 3);

        let profile = manager.load_profile().unwrap();
        assert_eq!(profile.endpoints.len(), 2);
        assert_eq!(
            profile.endpoints["/projects/alpha"].access_id.as_deref(),
            Some("AK1")
        );
    }

    #[tokio::test]
    async fn test_delegate_sso_requires_authenticated_source() {
        let (manager, _dir) = manager_with_profile(vec![]);
        let mut router = MountTable::new();

        let source = FakeBackend::new(
            EndpointDescriptor::new(BackendKind::Asset, "https://a"),
            true,
        );
        source.authed.store(false, Ordering::SeqCst);
        router.mount("/assets", Arc::new(source)).unwrap();

        let err = manager
            .delegate_sso(&FakeFactory { reachable: true }, &mut router, "/assets", "/projects")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_describe_endpoints_redacts() {
        let mut ep = EndpointDescriptor::new(BackendKind::S3, "https://s");
        ep.secret = Some("raw-secret".into());
        let (manager, _dir) = manager_with_profile(vec![("/p", ep)]);

        let described = manager.describe_endpoints().unwrap();
        assert_eq!(described.len(), 1);
        assert_eq!(described[0].1.secret.as_deref(), Some("<redacted>"));
    }
}
