//! Application directory resolution.
//!
//! Follows the XDG base directory layout on Unix and the usual per-user
//! locations on Windows. Every directory is created on resolution and, on
//! Unix, restricted to its owner.

use crate::error::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Directory name used under each base directory.
pub const APP_DIR_NAME: &str = "jot";

/// Database file name inside the data directory.
pub const DATABASE_FILE_NAME: &str = "jot.db";

/// Monitor socket file name inside the runtime directory.
pub const SOCKET_FILE_NAME: &str = "monitor.sock";

#[cfg(unix)]
const DIRECTORY_MODE: u32 = 0o700;

/// Errors raised while resolving or creating application directories.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The home directory could not be determined.
    #[error("cannot determine the home directory")]
    HomeNotFound,

    /// A required environment variable is unset.
    #[error("environment variable {0} is not set")]
    MissingVariable(&'static str),

    /// A directory could not be created or its permissions set.
    #[error("cannot prepare directory {}: {source}", path.display())]
    Io {
        /// Directory being prepared.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::HomeNotFound | Self::MissingVariable(_) => ErrorKind::User,
            Self::Io { .. } => ErrorKind::Storage,
        }
    }
}

/// Resolved per-user directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
    runtime_dir: PathBuf,
}

impl AppPaths {
    /// Resolves directories from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a base directory cannot be determined or
    /// a directory cannot be created.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve_with(|name| std::env::var(name).ok(), dirs::home_dir().as_deref())
    }

    /// Resolves directories using `lookup` for environment variables and
    /// `home` as the home directory.
    ///
    /// Empty variables count as unset. A leading `~` is expanded.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a base directory cannot be determined or
    /// a directory cannot be created.
    pub fn resolve_with<F>(lookup: F, home: Option<&Path>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_path = |name: &str| -> Option<PathBuf> {
            lookup(name)
                .filter(|value| !value.is_empty())
                .map(|value| expand_home(&value, home))
        };
        let home_dir = || home.ok_or(ConfigError::HomeNotFound);

        let (config_dir, data_dir, runtime_dir) = if cfg!(windows) {
            let appdata = env_path("APPDATA").ok_or(ConfigError::MissingVariable("APPDATA"))?;
            let local = env_path("LOCALAPPDATA")
                .ok_or(ConfigError::MissingVariable("LOCALAPPDATA"))?;
            let temp = env_path("TEMP").ok_or(ConfigError::MissingVariable("TEMP"))?;
            (
                appdata.join(APP_DIR_NAME),
                local.join(APP_DIR_NAME),
                temp.join(APP_DIR_NAME),
            )
        } else {
            let config_home = match env_path("XDG_CONFIG_HOME") {
                Some(path) => path,
                None => home_dir()?.join(".config"),
            };
            let data_home = match env_path("XDG_DATA_HOME") {
                Some(path) => path,
                None => home_dir()?.join(".local").join("share"),
            };
            let data_dir = data_home.join(APP_DIR_NAME);
            let runtime_dir = env_path("XDG_RUNTIME_DIR")
                .map_or_else(|| data_dir.clone(), |base| base.join(APP_DIR_NAME));
            (config_home.join(APP_DIR_NAME), data_dir, runtime_dir)
        };

        Self::create(config_dir, data_dir, runtime_dir)
    }

    /// Places all three directories under `root`, for tests and portable
    /// installs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when a directory cannot be created.
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let base = root.as_ref();
        Self::create(
            base.join("config"),
            base.join("data"),
            base.join("runtime"),
        )
    }

    fn create(
        config_dir: PathBuf,
        data_dir: PathBuf,
        runtime_dir: PathBuf,
    ) -> Result<Self, ConfigError> {
        for dir in [&config_dir, &data_dir, &runtime_dir] {
            ensure_directory(dir)?;
        }
        debug!(
            config = %config_dir.display(),
            data = %data_dir.display(),
            runtime = %runtime_dir.display(),
            "resolved application directories"
        );
        Ok(Self {
            config_dir,
            data_dir,
            runtime_dir,
        })
    }

    /// Returns the configuration directory.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Returns the data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the runtime directory.
    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    /// Returns the task database file path.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    /// Returns the monitor socket path.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.runtime_dir.join(SOCKET_FILE_NAME)
    }
}

fn expand_home(value: &str, home: Option<&Path>) -> PathBuf {
    match (value.strip_prefix('~'), home) {
        (Some(""), Some(dir)) => dir.to_path_buf(),
        (Some(rest), Some(dir)) if rest.starts_with('/') => dir.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(value),
    }
}

fn ensure_directory(path: &Path) -> Result<(), ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(path).map_err(io_error)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(DIRECTORY_MODE))
            .map_err(io_error)?;
    }
    Ok(())
}
