//! Stable pseudonymous installation identity.

use std::fmt::Write as _;
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use ve_types::{DeviceId, LessonError};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("platform id source {path} is unreadable: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("platform id is empty")]
    Empty,
}

impl From<IdentityError> for LessonError {
    fn from(value: IdentityError) -> Self {
        LessonError::IdentityUnavailable(value.to_string())
    }
}

pub trait IdentityProvider: Send + Sync {
    /// Deterministic per installation.
    fn stable_device_id(&self) -> Result<DeviceId, IdentityError>;
}

/// Where the raw platform identifier comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformIdSource {
    Explicit(String),
    File(PathBuf),
}

impl Default for PlatformIdSource {
    fn default() -> Self {
        Self::File(PathBuf::from("/etc/machine-id"))
    }
}

/// SHA-256 of the platform id, hex encoded. The raw id never leaves the device.
#[derive(Debug, Clone, Default)]
pub struct HashedDeviceId {
    source: PlatformIdSource,
}

impl HashedDeviceId {
    #[must_use]
    pub fn new(source: PlatformIdSource) -> Self {
        Self { source }
    }

    fn raw_id(&self) -> Result<String, IdentityError> {
        let raw = match &self.source {
            PlatformIdSource::Explicit(value) => value.clone(),
            PlatformIdSource::File(path) => {
                std::fs::read_to_string(path).map_err(|source| IdentityError::Unreadable {
                    path: path.display().to_string(),
                    source,
                })?
            }
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(IdentityError::Empty);
        }
        Ok(raw.to_owned())
    }
}

#[must_use]
pub fn hash_platform_id(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

impl IdentityProvider for HashedDeviceId {
    fn stable_device_id(&self) -> Result<DeviceId, IdentityError> {
        let hashed = hash_platform_id(&self.raw_id()?);
        // Hex digests are never empty and never contain '/'.
        DeviceId::new(hashed).map_err(|_| IdentityError::Empty)
    }
}
