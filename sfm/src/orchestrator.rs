use crate::cache::{CacheKey, InputFingerprint, ReusePolicy};
use crate::colmap;
use crate::images::list_images;
use crate::Result;
use recon_runtime::{CommandRunner, StageCommand, StageGraph, WorkspaceLayout};
use std::path::{Path, PathBuf};

/// Result of the sparse-to-dense step.
#[derive(Debug, Clone)]
pub struct SfmOutcome {
    pub fused_cloud: PathBuf,
    pub reused: bool,
    pub cache_key: CacheKey,
    /// Commands that were executed, in order. Empty when reused.
    pub commands: Vec<StageCommand>,
}

#[derive(Debug, Clone)]
pub struct SfmOrchestrator {
    pub colmap_bin: String,
    pub reuse: ReusePolicy,
}

impl Default for SfmOrchestrator {
    fn default() -> Self {
        Self {
            colmap_bin: "colmap".to_string(),
            reuse: ReusePolicy::Off,
        }
    }
}

impl SfmOrchestrator {
    pub fn new(colmap_bin: impl Into<String>, reuse: ReusePolicy) -> Self {
        Self {
            colmap_bin: colmap_bin.into(),
            reuse,
        }
    }

    pub fn cache_key(&self, input: &InputFingerprint) -> CacheKey {
        CacheKey::compute(&self.colmap_bin, input)
    }

    /// The existing dense result in `layout`, when the reuse policy accepts
    /// it for `cache_key`.
    pub fn reusable(&self, layout: &WorkspaceLayout, cache_key: &CacheKey) -> Option<SfmOutcome> {
        let fused_cloud = layout.fused_cloud_path();
        if !self.reuse.allows_reuse(&fused_cloud, cache_key) {
            return None;
        }
        tracing::info!(
            fused = %fused_cloud.display(),
            "reusing existing dense reconstruction"
        );
        Some(SfmOutcome {
            fused_cloud,
            reused: true,
            cache_key: cache_key.clone(),
            commands: Vec::new(),
        })
    }

    /// Produce `dense/fused.ply` for `images` inside `layout`, keyed on the
    /// image listing.
    ///
    /// The image folder is validated before anything runs. Stages run
    /// strictly one after another; the first failure is returned and
    /// partial artifacts stay on disk.
    pub fn run(
        &self,
        images: &Path,
        layout: &WorkspaceLayout,
        runner: &dyn CommandRunner,
    ) -> Result<SfmOutcome> {
        let listing = list_images(images)?;
        let cache_key = self.cache_key(&InputFingerprint::Images(listing));
        self.run_keyed(images, cache_key, layout, runner)
    }

    /// Like [`run`](Self::run), with the cache key supplied by the caller.
    /// Used when `images` are derived from another input, such as frames
    /// sampled from a video.
    pub fn run_keyed(
        &self,
        images: &Path,
        cache_key: CacheKey,
        layout: &WorkspaceLayout,
        runner: &dyn CommandRunner,
    ) -> Result<SfmOutcome> {
        let listing = list_images(images)?;
        if let Some(outcome) = self.reusable(layout, &cache_key) {
            return Ok(outcome);
        }
        let fused_cloud = layout.fused_cloud_path();

        tracing::info!(
            images = listing.len(),
            engine = %self.colmap_bin,
            workspace = %layout.root().display(),
            "running sparse and dense reconstruction"
        );

        let graph = StageGraph::build(colmap::plan(&self.colmap_bin, images, layout))?;
        graph.execute(runner)?;

        cache_key.store(&fused_cloud)?;
        let commands = graph
            .topology_order()
            .iter()
            .map(|&id| graph.node(id).command.clone())
            .collect();

        Ok(SfmOutcome {
            fused_cloud,
            reused: false,
            cache_key,
            commands,
        })
    }
}
