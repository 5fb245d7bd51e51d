//! Video input
//!
//! Samples still frames out of a video with the `ffmpeg` command line so
//! they can be fed to the reconstruction like a photo folder.

use recon_runtime::{CommandRunner, StageCommand};
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, VideoError>;

#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Video not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("No frames extracted into {}", .0.display())]
    NoFrames(PathBuf),

    #[error(transparent)]
    Stage(#[from] recon_runtime::Error),
}

/// File name pattern handed to ffmpeg; frames are numbered from 1.
pub const FRAME_PATTERN: &str = "frame_%06d.jpg";

/// Stage name used for logging and error attribution.
pub const STAGE_NAME: &str = "extract_frames";

/// Frame sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSampler {
    pub ffmpeg_bin: String,
    /// Frames sampled per second of video.
    pub fps: f64,
    /// Longest edge of the extracted frames, in pixels.
    pub max_size: u32,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            fps: 2.0,
            max_size: 2048,
        }
    }
}

impl FrameSampler {
    pub fn validate(&self) -> Result<()> {
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(VideoError::InvalidParameters(format!(
                "fps must be positive, got {}",
                self.fps
            )));
        }
        if self.max_size == 0 {
            return Err(VideoError::InvalidParameters(
                "max size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// `fps=<fps>` followed by a scale that bounds the longer edge by
    /// `max_size` and keeps the other edge even.
    pub fn filter(&self) -> String {
        let m = self.max_size;
        format!(
            "fps={},scale='if(gt(iw,ih),{m},-2)':'if(gt(ih,iw),{m},-2)'",
            self.fps
        )
    }

    pub fn command(&self, video: &Path, frames_dir: &Path) -> StageCommand {
        StageCommand::new(&self.ffmpeg_bin)
            .arg("-y")
            .path_arg("-i", video)
            .arg("-vf")
            .arg(self.filter())
            .arg("-q:v")
            .arg("2")
            .arg(frames_dir.join(FRAME_PATTERN).display().to_string())
    }

    /// Extract frames from `video` into `frames_dir` and return how many were
    /// written.
    pub fn extract(
        &self,
        video: &Path,
        frames_dir: &Path,
        runner: &dyn CommandRunner,
    ) -> Result<usize> {
        self.validate()?;
        if !video.is_file() {
            return Err(VideoError::NotFound(video.to_path_buf()));
        }
        std::fs::create_dir_all(frames_dir)?;
        let stale = clear_frames(frames_dir)?;
        if stale > 0 {
            tracing::debug!(removed = stale, dir = %frames_dir.display(), "cleared old frames");
        }

        tracing::info!(
            video = %video.display(),
            fps = self.fps,
            max_size = self.max_size,
            "extracting frames"
        );
        runner.run(STAGE_NAME, &self.command(video, frames_dir))?;

        let count = count_frames(frames_dir)?;
        if count == 0 {
            return Err(VideoError::NoFrames(frames_dir.to_path_buf()));
        }
        tracing::info!(frames = count, dir = %frames_dir.display(), "frames ready");
        Ok(count)
    }
}

fn is_frame(name: &str) -> bool {
    name.starts_with("frame_") && name.ends_with(".jpg")
}

/// Number of `frame_*.jpg` files in `dir`.
pub fn count_frames(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        if is_frame(&entry?.file_name().to_string_lossy()) {
            count += 1;
        }
    }
    Ok(count)
}

/// Remove `frame_*.jpg` files left in `dir` by an earlier extraction.
/// Other files are kept.
pub fn clear_frames(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if is_frame(&entry.file_name().to_string_lossy()) && entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_expression() {
        let sampler = FrameSampler::default();
        assert_eq!(
            sampler.filter(),
            "fps=2,scale='if(gt(iw,ih),2048,-2)':'if(gt(ih,iw),2048,-2)'"
        );
        let sampler = FrameSampler {
            fps: 0.5,
            max_size: 1024,
            ..Default::default()
        };
        assert!(sampler.filter().starts_with("fps=0.5,scale='if(gt(iw,ih),1024,-2)'"));
    }

    #[test]
    fn test_command_line() {
        let cmd = FrameSampler::default().command(Path::new("/v/in.mp4"), Path::new("/w/frames"));
        assert_eq!(cmd.program, "ffmpeg");
        assert_eq!(
            cmd.args,
            vec![
                "-y",
                "-i",
                "/v/in.mp4",
                "-vf",
                "fps=2,scale='if(gt(iw,ih),2048,-2)':'if(gt(ih,iw),2048,-2)'",
                "-q:v",
                "2",
                "/w/frames/frame_%06d.jpg",
            ]
        );
    }

    #[test]
    fn test_parameter_validation() {
        for sampler in [
            FrameSampler {
                fps: 0.0,
                ..Default::default()
            },
            FrameSampler {
                fps: f64::NAN,
                ..Default::default()
            },
            FrameSampler {
                max_size: 0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                sampler.validate(),
                Err(VideoError::InvalidParameters(_))
            ));
        }
    }
}
