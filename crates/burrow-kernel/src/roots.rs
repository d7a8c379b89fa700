//! Well-known filesystem roots.
//!
//! Each [`Role`] (resources, cache, temp, ...) maps to a [`VfsFile`] built
//! once per process. The mapping comes from a [`RootsConfig`], which may be
//! installed with [`configure`] before the first [`get`]; otherwise the
//! defaults apply.
//!
//! # Config Format
//!
//! ```ron
//! (
//!     roots: {
//!         UserHome: Local(path: "~/sandbox"),
//!         Temp: Memory,
//!     },
//!     resource_dirs: ["~/.local/share/burrow/assets"],
//!     jail_resources: true,
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use strum::{Display, EnumCount, EnumIter, EnumString, VariantArray};

use crate::constants::{APP_DIR_NAME, ROOTS_CONFIG_ENV};
use crate::vfs::{
    AssetBackend, AssetBundle, DirBundle, JailVfs, LocalBackend, MemoryBackend, MergedVfs, Vfs,
    VfsFile,
};

/// Well-known roots.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    EnumCount,
    VariantArray,
)]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    /// Packaged read-only resources (merged over attached bundles).
    Resources,
    RootLocal,
    Application,
    ApplicationData,
    Cache,
    ExternalStorage,
    UserHome,
    Temp,
}

impl Role {
    /// Backend used when the config does not name one.
    ///
    /// `Resources` is always a merged root; a configured spec only adds its
    /// first layer, so its default contributes nothing on disk.
    pub fn default_spec(self) -> RootSpec {
        match self {
            Role::Resources | Role::Cache => RootSpec::Memory,
            Role::Temp => RootSpec::TempDir,
            Role::UserHome => RootSpec::Home,
            Role::ApplicationData => RootSpec::DataDir,
            Role::RootLocal | Role::Application | Role::ExternalStorage => RootSpec::Cwd,
        }
    }
}

/// Where a root lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootSpec {
    /// A host directory; `~` is expanded.
    Local { path: String },
    /// Process working directory.
    Cwd,
    /// The user's home directory.
    Home,
    /// Platform data directory plus the application name.
    DataDir,
    /// System temporary directory.
    TempDir,
    /// Fresh in-memory filesystem.
    Memory,
}

impl RootSpec {
    /// Host directory for the disk-backed variants.
    pub fn host_path(&self) -> Option<PathBuf> {
        match self {
            RootSpec::Local { path } => Some(expand_path(path)),
            RootSpec::Cwd => Some(cwd()),
            RootSpec::Home => Some(dirs::home_dir().unwrap_or_else(cwd)),
            RootSpec::DataDir => Some(
                dirs::data_dir()
                    .map(|d| d.join(APP_DIR_NAME))
                    .unwrap_or_else(cwd),
            ),
            RootSpec::TempDir => Some(std::env::temp_dir()),
            RootSpec::Memory => None,
        }
    }

    pub fn build(&self) -> Arc<dyn Vfs> {
        match self.host_path() {
            Some(path) => Arc::new(LocalBackend::new(path)),
            None => Arc::new(MemoryBackend::new()),
        }
    }
}

fn cwd() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn expand_path(path: &str) -> PathBuf {
    shellexpand::tilde(path).as_ref().into()
}

/// Errors loading or installing a roots configuration.
#[derive(Debug, thiserror::Error)]
pub enum RootsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("roots already initialized")]
    AlreadyConfigured,
}

/// Role → backend table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootsConfig {
    /// Overrides; roles not listed use [`Role::default_spec`].
    pub roots: BTreeMap<Role, RootSpec>,
    /// Directories attached to the resources root as bundles, in order.
    pub resource_dirs: Vec<String>,
    /// Reject `..` escapes on the resources root.
    pub jail_resources: bool,
}

impl Default for RootsConfig {
    fn default() -> Self {
        Self {
            roots: BTreeMap::new(),
            resource_dirs: Vec::new(),
            jail_resources: true,
        }
    }
}

impl RootsConfig {
    pub fn parse(text: &str) -> Result<Self, RootsError> {
        Ok(ron::from_str(text)?)
    }

    /// Load a RON config file; `~` in `path` is expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RootsError> {
        let path = expand_path(&path.as_ref().to_string_lossy());
        let text = std::fs::read_to_string(&path)?;
        tracing::debug!(path = %path.display(), "loaded roots config");
        Self::parse(&text)
    }

    /// Config named by the `BURROW_ROOTS` environment variable, if set.
    pub fn from_env() -> Result<Option<Self>, RootsError> {
        match std::env::var_os(ROOTS_CONFIG_ENV) {
            Some(path) => Self::load(PathBuf::from(path)).map(Some),
            None => Ok(None),
        }
    }

    pub fn spec(&self, role: Role) -> RootSpec {
        self.roots
            .get(&role)
            .cloned()
            .unwrap_or_else(|| role.default_spec())
    }
}

/// A built set of roots.
pub struct Roots {
    /// One handle per role, indexed by `role as usize`.
    files: [VfsFile; Role::COUNT],
    resources: Arc<MergedVfs>,
}

impl std::fmt::Debug for Roots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Roots")
            .field("files", &self.files)
            .field("resources", &self.resources)
            .finish()
    }
}

impl Roots {
    pub fn build(config: &RootsConfig) -> Self {
        let resources = Arc::new(MergedVfs::default());
        if let Some(spec) = config.roots.get(&Role::Resources) {
            resources.push(spec.build());
        }
        for dir in &config.resource_dirs {
            resources.push(Arc::new(AssetBackend::new(DirBundle::new(expand_path(dir)))));
        }

        let resources_vfs: Arc<dyn Vfs> = if config.jail_resources {
            Arc::new(JailVfs::new(resources.clone(), ""))
        } else {
            resources.clone()
        };

        let files = std::array::from_fn(|i| {
            let role = Role::VARIANTS[i];
            let vfs = match role {
                Role::Resources => resources_vfs.clone(),
                _ => config.spec(role).build(),
            };
            tracing::debug!(%role, backend = vfs.name(), "root built");
            VfsFile::root(vfs)
        });

        Self { files, resources }
    }

    pub fn get(&self, role: Role) -> VfsFile {
        self.files[role as usize].clone()
    }

    /// Append a bundle to the resources root; later lookups see it.
    pub fn attach_resources(&self, bundle: impl AssetBundle + 'static) {
        self.resources.push(Arc::new(AssetBackend::new(bundle)));
    }
}

static CONFIG: OnceLock<RootsConfig> = OnceLock::new();
static ROOTS: OnceLock<Roots> = OnceLock::new();

/// Install the process-wide configuration. Must run before the first
/// [`get`]; a second call fails.
pub fn configure(config: RootsConfig) -> Result<(), RootsError> {
    if ROOTS.get().is_some() {
        return Err(RootsError::AlreadyConfigured);
    }
    CONFIG
        .set(config)
        .map_err(|_| RootsError::AlreadyConfigured)
}

fn roots() -> &'static Roots {
    ROOTS.get_or_init(|| {
        let config = CONFIG.get_or_init(RootsConfig::default);
        Roots::build(config)
    })
}

/// The process-wide root for `role`.
pub fn get(role: Role) -> VfsFile {
    roots().get(role)
}

/// Append a bundle to the process-wide resources root.
pub fn attach_resources(bundle: impl AssetBundle + 'static) {
    roots().attach_resources(bundle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{ErrorKind, StaticBundle};
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_role_names() {
        assert_eq!(Role::from_str("user_home").unwrap(), Role::UserHome);
        assert_eq!(Role::ApplicationData.to_string(), "application_data");
        assert_eq!(Role::iter().count(), 8);
    }

    #[test]
    fn test_default_specs() {
        let config = RootsConfig::default();
        assert_eq!(config.spec(Role::Cache), RootSpec::Memory);
        assert_eq!(config.spec(Role::Temp), RootSpec::TempDir);
        assert_eq!(config.spec(Role::Application), RootSpec::Cwd);
        assert_eq!(config.spec(Role::Resources), RootSpec::Memory);
        assert_eq!(RootSpec::TempDir.host_path(), Some(std::env::temp_dir()));
        assert!(config.jail_resources);
    }

    #[test]
    fn test_parse_ron() {
        let config = RootsConfig::parse(
            r#"(
                roots: {
                    UserHome: Local(path: "/srv/home"),
                    Temp: Memory,
                },
                resource_dirs: ["assets"],
            )"#,
        )
        .unwrap();

        assert_eq!(
            config.spec(Role::UserHome),
            RootSpec::Local {
                path: "/srv/home".into()
            }
        );
        assert_eq!(config.spec(Role::Temp), RootSpec::Memory);
        assert_eq!(config.resource_dirs, vec!["assets"]);
        assert!(config.jail_resources);

        assert!(matches!(RootsConfig::parse("(roots: 3)"), Err(RootsError::Ron(_))));
    }

    #[test]
    fn test_tilde_expansion() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let spec = RootSpec::Local {
            path: "~/burrow-test".into(),
        };
        assert_eq!(spec.host_path(), Some(home.join("burrow-test")));
    }

    #[test]
    fn test_every_role_has_its_own_root() {
        for (i, role) in Role::VARIANTS.iter().enumerate() {
            assert_eq!(*role as usize, i);
        }
        assert_eq!(Role::iter().count(), Role::COUNT);

        let mut config = RootsConfig::default();
        config.roots.insert(Role::UserHome, RootSpec::Memory);
        let roots = Roots::build(&config);
        assert_eq!(roots.get(Role::Resources).vfs().name(), "jail");
        assert_eq!(roots.get(Role::UserHome).vfs().name(), "memory");
        assert_eq!(roots.get(Role::RootLocal).vfs().name(), "local");
        assert!(!Arc::ptr_eq(
            roots.get(Role::Cache).vfs(),
            roots.get(Role::UserHome).vfs()
        ));
    }

    #[tokio::test]
    async fn test_build_and_attach_resources() {
        let mut config = RootsConfig::default();
        config.roots.insert(Role::Temp, RootSpec::Memory);
        let roots = Roots::build(&config);

        let cache = roots.get(Role::Cache);
        cache.child("k").write_all(b"v").await.unwrap();
        assert_eq!(cache.child("k").read_string().await.unwrap(), "v");
        assert_eq!(roots.get(Role::Temp).vfs().name(), "memory");

        let logo = roots.get(Role::Resources).child("logo.txt");
        assert!(!logo.exists().await.unwrap());
        roots.attach_resources(StaticBundle::new().with("logo.txt", b"burrow".as_slice()));
        assert_eq!(logo.read_string().await.unwrap(), "burrow");

        let escape = roots.get(Role::Resources).child("../etc/passwd");
        assert_eq!(escape.read_all().await.unwrap_err().kind(), ErrorKind::AccessDenied);
    }
}
