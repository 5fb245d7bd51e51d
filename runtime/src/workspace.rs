//! Per-run workspace layout

use crate::Result;
use std::path::{Path, PathBuf};

/// Directory tree owned by one run.
///
/// ```text
/// <root>/
///   frames/        extracted video frames (video input only)
///   database.db    feature/match database
///   sparse/        sparse models (model 0 is consumed)
///   dense/         undistorted images, depth maps, fused.ply
///   meshes/        exported meshes
///   run.json       run manifest
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    /// Resolve `root` to an absolute path and create every sub-area.
    ///
    /// Idempotent; existing content is never removed.
    pub fn ensure(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };

        let layout = Self { root };
        for dir in [
            layout.root.clone(),
            layout.frames_dir(),
            layout.sparse_dir(),
            layout.dense_dir(),
            layout.meshes_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }

        tracing::debug!(root = %layout.root.display(), "workspace ready");
        Ok(layout)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join("frames")
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("database.db")
    }

    pub fn sparse_dir(&self) -> PathBuf {
        self.root.join("sparse")
    }

    pub fn dense_dir(&self) -> PathBuf {
        self.root.join("dense")
    }

    pub fn meshes_dir(&self) -> PathBuf {
        self.root.join("meshes")
    }

    pub fn fused_cloud_path(&self) -> PathBuf {
        self.dense_dir().join("fused.ply")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("run.json")
    }
}
