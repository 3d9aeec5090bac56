use serde::Deserialize;
use std::{
    env,
    path::{Path, PathBuf},
};

use ve_ledger::FEED_LIMIT;
use ve_local::PlatformIdSource;

use crate::lock::Cooldown;

const DATA_DIR_NAME: &str = ".ve";
const LEDGER_FILE: &str = "ledger.db";
const LOCAL_STORE_FILE: &str = "local.json";

#[derive(Debug, Default, Deserialize)]
pub struct VeConfig {
    pub lesson: Option<LessonConfig>,
    pub storage: Option<StorageConfig>,
    pub identity: Option<IdentityConfig>,
    pub feed: Option<FeedConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LessonConfig {
    /// Seconds between completing a lesson and the next attempt.
    pub cooldown_secs: Option<u32>,
    /// JSON file of lesson definitions replacing the built-in catalog.
    pub catalog: Option<String>,
    /// Lesson id to open; defaults to the first catalog entry.
    pub lesson: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    pub data_dir: Option<String>,
    pub ledger_path: Option<String>,
    pub local_store_path: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct IdentityConfig {
    /// File holding the raw platform id (default `/etc/machine-id`).
    pub device_source: Option<String>,
    /// Raw platform id, overriding `device_source`.
    pub platform_id: Option<String>,
    pub auth_uid: Option<String>,
}

// The raw platform id must not reach the logs.
impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("device_source", &self.device_source)
            .field(
                "platform_id",
                &if self.platform_id.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .field("auth_uid", &self.auth_uid)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedConfig {
    pub limit: Option<usize>,
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(open) = rest.find("${") {
        let (before, after) = rest.split_at(open);
        out.push_str(before);
        let name_start = &after[2..];
        let Some(close) = name_start.find('}') else {
            out.push_str(after);
            return out;
        };
        let var = &name_start[..close];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &name_start[close + 1..];
    }

    out.push_str(rest);
    out
}

fn expand_path(value: &str) -> PathBuf {
    PathBuf::from(expand_env_vars(value))
}

impl VeConfig {
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        Self::load_from(&path)
    }

    /// Read `path`; a missing file is `Ok(None)`.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    #[must_use]
    pub fn cooldown(&self) -> Cooldown {
        self.lesson
            .as_ref()
            .and_then(|lesson| lesson.cooldown_secs)
            .map(Cooldown::from_secs)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.lesson
            .as_ref()
            .and_then(|lesson| lesson.catalog.as_deref())
            .map(expand_path)
    }

    #[must_use]
    pub fn lesson_id(&self) -> Option<&str> {
        self.lesson.as_ref().and_then(|lesson| lesson.lesson.as_deref())
    }

    /// `~/.ve`, or `./.ve` when no home directory is known.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = self
            .storage
            .as_ref()
            .and_then(|storage| storage.data_dir.as_deref())
        {
            return expand_path(dir);
        }
        dirs::home_dir().map_or_else(|| PathBuf::from(DATA_DIR_NAME), |home| home.join(DATA_DIR_NAME))
    }

    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.storage
            .as_ref()
            .and_then(|storage| storage.ledger_path.as_deref())
            .map_or_else(|| self.data_dir().join(LEDGER_FILE), expand_path)
    }

    #[must_use]
    pub fn local_store_path(&self) -> PathBuf {
        self.storage
            .as_ref()
            .and_then(|storage| storage.local_store_path.as_deref())
            .map_or_else(|| self.data_dir().join(LOCAL_STORE_FILE), expand_path)
    }

    #[must_use]
    pub fn platform_id_source(&self) -> PlatformIdSource {
        let Some(identity) = &self.identity else {
            return PlatformIdSource::default();
        };
        if let Some(raw) = &identity.platform_id {
            return PlatformIdSource::Explicit(expand_env_vars(raw));
        }
        identity
            .device_source
            .as_deref()
            .map(|path| PlatformIdSource::File(expand_path(path)))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn auth_uid(&self) -> Option<String> {
        self.identity
            .as_ref()
            .and_then(|identity| identity.auth_uid.as_deref())
            .map(expand_env_vars)
    }

    /// Feed length, never above [`FEED_LIMIT`].
    #[must_use]
    pub fn feed_limit(&self) -> usize {
        self.feed
            .as_ref()
            .and_then(|feed| feed.limit)
            .unwrap_or(FEED_LIMIT)
            .min(FEED_LIMIT)
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DATA_DIR_NAME).join("config.toml"))
}
