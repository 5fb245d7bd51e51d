//! Pipeline configuration

use crate::{Error, Result};
use recon_3d::MeshParams;
use recon_sfm::{ReusePolicy, SfmOrchestrator};
use recon_videoio::FrameSampler;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the photographs come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    /// A folder of photographs.
    Images(PathBuf),
    /// A video file sampled into `frames/` inside the workspace.
    Video(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input: InputSource,
    /// Run workspace; `<outputs_dir>/run-<id>` when unset.
    pub workspace: Option<PathBuf>,
    pub outputs_dir: PathBuf,
    pub fps: f64,
    pub max_size: u32,
    pub colmap_bin: String,
    pub ffmpeg_bin: String,
    pub poisson_depth: usize,
    pub target_triangles: usize,
    /// File name of the mesh under `meshes/`.
    pub glb_name: String,
    pub reuse: ReusePolicy,
    pub export_public: bool,
    pub public_path: PathBuf,
    /// Package the viewer together with the mesh into this directory.
    pub page_output: Option<PathBuf>,
    /// Built viewer assets copied when packaging.
    pub dist_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: InputSource::Images(PathBuf::from("images")),
            workspace: None,
            outputs_dir: PathBuf::from("outputs"),
            fps: 2.0,
            max_size: 2048,
            colmap_bin: "colmap".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            poisson_depth: 10,
            target_triangles: 50_000,
            glb_name: "model.glb".to_string(),
            reuse: ReusePolicy::Off,
            export_public: false,
            public_path: PathBuf::from("public/models/generated.glb"),
            page_output: None,
            dist_dir: PathBuf::from("dist"),
        }
    }
}

impl PipelineConfig {
    pub fn for_images(dir: impl Into<PathBuf>) -> Self {
        Self {
            input: InputSource::Images(dir.into()),
            ..Default::default()
        }
    }

    pub fn for_video(file: impl Into<PathBuf>) -> Self {
        Self {
            input: InputSource::Video(file.into()),
            ..Default::default()
        }
    }

    pub fn mesh_params(&self) -> MeshParams {
        MeshParams {
            poisson_depth: self.poisson_depth,
            target_triangles: self.target_triangles,
            ..Default::default()
        }
    }

    pub fn frame_sampler(&self) -> FrameSampler {
        FrameSampler {
            ffmpeg_bin: self.ffmpeg_bin.clone(),
            fps: self.fps,
            max_size: self.max_size,
        }
    }

    pub fn sfm(&self) -> SfmOrchestrator {
        SfmOrchestrator::new(self.colmap_bin.clone(), self.reuse)
    }

    /// Check everything that can be checked without running a tool.
    pub fn validate(&self) -> Result<()> {
        match &self.input {
            InputSource::Images(dir) if !dir.is_dir() => {
                return Err(Error::InvalidInput(format!(
                    "Images folder not found: {}",
                    dir.display()
                )));
            }
            InputSource::Video(file) => {
                if !file.is_file() {
                    return Err(Error::InvalidInput(format!(
                        "Video not found: {}",
                        file.display()
                    )));
                }
                self.frame_sampler().validate()?;
            }
            InputSource::Images(_) => {}
        }

        if self.glb_name.is_empty()
            || self.glb_name.contains(['/', '\\'])
            || self.glb_name == "."
            || self.glb_name == ".."
        {
            return Err(Error::InvalidInput(format!(
                "GLB name must be a plain file name, got {:?}",
                self.glb_name
            )));
        }

        self.mesh_params().validate()?;

        if self.page_output.is_some() && !self.dist_dir.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Viewer build not found: {}. Build the viewer first.",
                self.dist_dir.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.fps, 2.0);
        assert_eq!(config.max_size, 2048);
        assert_eq!(config.poisson_depth, 10);
        assert_eq!(config.target_triangles, 50_000);
        assert_eq!(config.glb_name, "model.glb");
        assert_eq!(config.public_path, PathBuf::from("public/models/generated.glb"));
        assert_eq!(config.reuse, ReusePolicy::Off);
        assert_eq!(config.mesh_params().outlier_neighbors, 30);
    }

    #[test]
    fn test_serde_fills_missing_fields() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"input": {"video": "clip.mp4"}, "reuse": "fingerprint"}"#)
                .unwrap();
        assert_eq!(config.input, InputSource::Video(PathBuf::from("clip.mp4")));
        assert_eq!(config.reuse, ReusePolicy::Fingerprint);
        assert_eq!(config.colmap_bin, "colmap");
    }

    #[test]
    fn test_validation() {
        let dir = tempfile::tempdir().unwrap();

        let missing = PipelineConfig::for_images(dir.path().join("nope"));
        assert_eq!(missing.validate().unwrap_err().kind(), ErrorKind::InputValidation);

        let video = PipelineConfig::for_video(dir.path().join("clip.mp4"));
        assert_eq!(video.validate().unwrap_err().kind(), ErrorKind::InputValidation);

        let mut ok = PipelineConfig::for_images(dir.path());
        assert!(ok.validate().is_ok());

        ok.glb_name = "../escape.glb".into();
        assert!(ok.validate().is_err());
        ok.glb_name = "model.glb".into();

        ok.page_output = Some(dir.path().join("web"));
        ok.dist_dir = dir.path().join("dist");
        assert_eq!(ok.validate().unwrap_err().kind(), ErrorKind::InputValidation);

        ok.page_output = None;
        ok.poisson_depth = 0;
        assert_eq!(ok.validate().unwrap_err().kind(), ErrorKind::InputValidation);
    }
}
