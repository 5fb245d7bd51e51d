//! Reuse of a previous dense reconstruction

use crate::colmap::COLMAP_STAGES;
use crate::images::ImageEntry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// When an existing fused point cloud may stand in for a fresh run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReusePolicy {
    /// Always run every stage.
    #[default]
    Off,
    /// Reuse whenever the fused cloud exists. A stale cache key only warns.
    Presence,
    /// Reuse only when the fused cloud exists and its cache key matches.
    Fingerprint,
}

/// What the dense result is computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputFingerprint {
    /// A folder of photographs, as listed by [`crate::list_images`].
    Images(Vec<ImageEntry>),
    /// A video file and the frame sampling applied to it. Frames extracted
    /// from it are rewritten on every run, so they are not part of the key.
    Video { file: ImageEntry, sampling: String },
}

/// Fingerprint of everything that determines the dense result: the engine
/// executable, the stage argument templates and the input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn compute(colmap_bin: &str, input: &InputFingerprint) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"engine\0");
        hasher.update(colmap_bin.as_bytes());
        for stage in &COLMAP_STAGES {
            hasher.update(b"\0stage\0");
            hasher.update(stage.template().as_bytes());
        }
        match input {
            InputFingerprint::Images(images) => {
                for image in images {
                    hasher.update(b"\0image\0");
                    hash_entry(&mut hasher, image);
                }
            }
            InputFingerprint::Video { file, sampling } => {
                hasher.update(b"\0video\0");
                hash_entry(&mut hasher, file);
                hasher.update(b"\0sampling\0");
                hasher.update(sampling.as_bytes());
            }
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sidecar file holding the key of `artifact`.
    pub fn sidecar(artifact: &Path) -> PathBuf {
        let mut name = artifact.as_os_str().to_os_string();
        name.push(".key");
        PathBuf::from(name)
    }

    /// Key stored next to `artifact`, if any.
    pub fn load(artifact: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(Self::sidecar(artifact)).ok()?;
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(Self(text.to_string()))
        }
    }

    pub fn store(&self, artifact: &Path) -> std::io::Result<()> {
        std::fs::write(Self::sidecar(artifact), format!("{}\n", self.0))
    }
}

fn hash_entry(hasher: &mut blake3::Hasher, entry: &ImageEntry) {
    hasher.update(entry.name.as_bytes());
    hasher.update(&entry.size.to_le_bytes());
    hasher.update(&entry.modified_ns.to_le_bytes());
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ReusePolicy {
    /// Whether `artifact` may be reused under this policy.
    pub fn allows_reuse(self, artifact: &Path, current: &CacheKey) -> bool {
        if self == ReusePolicy::Off || !artifact.is_file() {
            return false;
        }
        let stored = CacheKey::load(artifact);
        match self {
            ReusePolicy::Off => false,
            ReusePolicy::Presence => {
                if let Some(stored) = stored.filter(|s| s != current) {
                    tracing::warn!(
                        artifact = %artifact.display(),
                        stored = %stored,
                        current = %current,
                        "reusing a dense result built from different inputs or settings"
                    );
                }
                true
            }
            ReusePolicy::Fingerprint => match stored {
                Some(stored) if &stored == current => true,
                Some(_) => {
                    tracing::info!(
                        artifact = %artifact.display(),
                        "cache key changed, recomputing"
                    );
                    false
                }
                None => {
                    tracing::info!(
                        artifact = %artifact.display(),
                        "no cache key recorded, recomputing"
                    );
                    false
                }
            },
        }
    }
}
