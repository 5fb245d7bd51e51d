//! Pipeline driver
//!
//! ```text
//! START -> [video: extract frames] -> SFM_MVS -> MESH
//!       -> [export public copy] -> [package viewer] -> DONE
//! ```
//!
//! Every step blocks until it is finished. The first error ends the run;
//! nothing already written to the workspace is rolled back.

use crate::config::{InputSource, PipelineConfig};
use crate::export::{copy_public, package_viewer, PackagedViewer};
use crate::Result;
use recon_3d::{default_processor, MeshEngine, MeshReport, PointCloudProcessor};
use recon_runtime::{
    default_workspace, CommandRunner, ProcessRunner, RunIdSource, StageCommand,
    TimestampRunIds, WorkspaceLayout,
};
use recon_sfm::{describe_file, CacheKey, InputFingerprint};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub run_id: String,
    pub workspace: PathBuf,
    pub glb_path: PathBuf,
    pub public_path: Option<PathBuf>,
    pub viewer: Option<PackagedViewer>,
    pub sfm_reused: bool,
    pub frames_extracted: Option<usize>,
    pub mesh: MeshReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// Contents of `run.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub run_id: String,
    pub status: RunStatus,
    pub config: PipelineConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sfm_cache_key: Option<CacheKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sfm_reused: Option<bool>,
    /// COLMAP commands executed by this run, in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sfm_commands: Vec<StageCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_extracted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glb: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunManifest {
    fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    runner: Arc<dyn CommandRunner>,
    run_ids: Arc<dyn RunIdSource>,
    processor: Option<Arc<dyn PointCloudProcessor>>,
}

impl Pipeline {
    /// Pipeline running real processes, time-based run ids and the default
    /// geometry backend.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            runner: Arc::new(ProcessRunner),
            run_ids: Arc::new(TimestampRunIds),
            processor: None,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_run_ids(mut self, run_ids: Arc<dyn RunIdSource>) -> Self {
        self.run_ids = run_ids;
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn PointCloudProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self) -> Result<PipelineResult> {
        self.config.validate()?;

        let run_id = self.run_ids.next_id();
        let root = self
            .config
            .workspace
            .clone()
            .unwrap_or_else(|| default_workspace(&self.config.outputs_dir, &run_id));
        let layout = WorkspaceLayout::ensure(&root)?;
        tracing::info!(run_id = %run_id, workspace = %layout.root().display(), "starting run");

        let mut manifest = RunManifest {
            run_id: run_id.clone(),
            status: RunStatus::Running,
            config: self.config.clone(),
            sfm_cache_key: None,
            sfm_reused: None,
            sfm_commands: Vec::new(),
            frames_extracted: None,
            glb: None,
            error: None,
        };
        manifest.write(&layout.manifest_path())?;

        match self.run_stages(&run_id, &layout, &mut manifest) {
            Ok(result) => {
                manifest.status = RunStatus::Completed;
                manifest.write(&layout.manifest_path())?;
                Ok(result)
            }
            Err(err) => {
                manifest.status = RunStatus::Failed;
                manifest.error = Some(err.to_string());
                if let Err(write_err) = manifest.write(&layout.manifest_path()) {
                    tracing::warn!(error = %write_err, "could not record failed run");
                }
                Err(err)
            }
        }
    }

    fn run_stages(
        &self,
        run_id: &str,
        layout: &WorkspaceLayout,
        manifest: &mut RunManifest,
    ) -> Result<PipelineResult> {
        let runner = self.runner.as_ref();

        let sfm_step = self.config.sfm();
        let (sfm, frames_extracted) = match &self.config.input {
            InputSource::Video(video) => {
                let sampler = self.config.frame_sampler();
                let cache_key = sfm_step.cache_key(&InputFingerprint::Video {
                    file: describe_file(video)?,
                    sampling: sampler.filter(),
                });
                match sfm_step.reusable(layout, &cache_key) {
                    Some(outcome) => {
                        tracing::info!("[extract] dense result reused, frames not resampled");
                        (outcome, None)
                    }
                    None => {
                        let frames_dir = layout.frames_dir();
                        tracing::info!(dir = %frames_dir.display(), "[extract] sampling frames from video");
                        let count = sampler.extract(video, &frames_dir, runner)?;
                        manifest.frames_extracted = Some(count);
                        let outcome = sfm_step.run_keyed(&frames_dir, cache_key, layout, runner)?;
                        (outcome, Some(count))
                    }
                }
            }
            InputSource::Images(dir) => (sfm_step.run(dir, layout, runner)?, None),
        };
        manifest.sfm_cache_key = Some(sfm.cache_key.clone());
        manifest.sfm_reused = Some(sfm.reused);
        manifest.sfm_commands = sfm.commands.clone();
        tracing::info!(fused = %sfm.fused_cloud.display(), "[done] dense point cloud");

        let processor = match &self.processor {
            Some(p) => Arc::clone(p),
            None => default_processor()?,
        };
        let glb_path = layout.meshes_dir().join(&self.config.glb_name);
        let mesh = MeshEngine::new(processor, self.config.mesh_params())
            .run(&sfm.fused_cloud, &glb_path)?;
        manifest.glb = Some(glb_path.clone());

        let public_path = if self.config.export_public {
            Some(copy_public(&glb_path, &absolute(&self.config.public_path)?)?)
        } else {
            None
        };

        let viewer = match &self.config.page_output {
            Some(out) => Some(package_viewer(
                &glb_path,
                &absolute(out)?,
                &self.config.dist_dir,
                &self.config.glb_name,
            )?),
            None => None,
        };

        Ok(PipelineResult {
            run_id: run_id.to_string(),
            workspace: layout.root().to_path_buf(),
            glb_path,
            public_path,
            viewer,
            sfm_reused: sfm.reused,
            frames_extracted,
            mesh,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
