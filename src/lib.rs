//! Photo/video to mesh reconstruction pipeline
//!
//! Ties the workspace crates together: frames are sampled from a video (or a
//! photo folder is used as is), COLMAP turns them into a dense point cloud,
//! and the in-process geometry backend turns that cloud into a clean,
//! normalized GLB that can be copied into a web viewer.

pub use recon_3d as geometry;
pub use recon_core as core;
pub use recon_io as io;
pub use recon_runtime as runtime;
pub use recon_sfm as sfm;
pub use recon_videoio as videoio;

pub mod config;
pub mod export;
pub mod pipeline;

pub use config::{InputSource, PipelineConfig};
pub use export::{copy_public, package_viewer, viewer_hint, PackagedViewer};
pub use pipeline::{Pipeline, PipelineResult, RunManifest, RunStatus};

/// Initialize the global Rayon thread pool used by the geometry stages.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `RECON_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<recon_core::PoolSize> {
    Ok(recon_core::init_global_thread_pool(num_threads)?)
}

/// Failure classes reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or unusable inputs, detected before any external tool runs.
    InputValidation,
    /// An external tool failed or left nothing usable behind.
    ExternalStage,
    /// Intermediate data that cannot be turned into a mesh.
    DataIntegrity,
    /// The geometry backend is not compiled in.
    MissingCapability,
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Geometry(#[from] recon_core::Error),

    #[error(transparent)]
    Stage(#[from] recon_runtime::Error),

    #[error(transparent)]
    Sfm(#[from] recon_sfm::Error),

    #[error(transparent)]
    Video(#[from] recon_videoio::VideoError),

    #[error("Run manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn stage_kind(e: &recon_runtime::Error) -> ErrorKind {
    use recon_runtime::Error as E;
    match e {
        E::StageFailed { .. } | E::Spawn { .. } | E::MissingOutput { .. } | E::Cycle(_) => {
            ErrorKind::ExternalStage
        }
        E::MissingInput { .. } => ErrorKind::InputValidation,
        E::Io(_) => ErrorKind::Io,
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use recon_core::Error as G;
        use recon_sfm::Error as S;
        use recon_videoio::VideoError as V;

        match self {
            Error::InvalidInput(_) => ErrorKind::InputValidation,
            Error::Geometry(e) => match e {
                G::InvalidInput(_) => ErrorKind::InputValidation,
                G::BackendUnavailable(_) => ErrorKind::MissingCapability,
                G::Io(_) | G::Export(_) => ErrorKind::Io,
                G::EmptyPointCloud(_)
                | G::EmptyMesh(_)
                | G::DegenerateGeometry(_)
                | G::Parse(_)
                | G::UnsupportedFormat(_)
                | G::InvalidData(_) => ErrorKind::DataIntegrity,
            },
            Error::Stage(e) => stage_kind(e),
            Error::Sfm(e) => match e {
                S::ImagesNotFound(_) | S::NoImages(_) => ErrorKind::InputValidation,
                S::Stage(e) => stage_kind(e),
                S::Io(_) => ErrorKind::Io,
            },
            Error::Video(e) => match e {
                V::NotFound(_) | V::InvalidParameters(_) => ErrorKind::InputValidation,
                V::NoFrames(_) => ErrorKind::ExternalStage,
                V::Stage(e) => stage_kind(e),
                V::Io(_) => ErrorKind::Io,
            },
            Error::Manifest(_) | Error::Io(_) => ErrorKind::Io,
        }
    }

    /// The external stage failure behind this error, if any.
    pub fn stage_error(&self) -> Option<&recon_runtime::Error> {
        match self {
            Error::Stage(e) => Some(e),
            Error::Sfm(recon_sfm::Error::Stage(e)) => Some(e),
            Error::Video(recon_videoio::VideoError::Stage(e)) => Some(e),
            _ => None,
        }
    }

    /// Process exit code: the failing tool's own status when it is a valid
    /// exit code, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        self.stage_error()
            .and_then(|e| e.exit_status())
            .and_then(|code| u8::try_from(code).ok())
            .filter(|&code| code != 0)
            .unwrap_or(1)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_failed(status: Option<i32>) -> recon_runtime::Error {
        recon_runtime::Error::StageFailed {
            stage: "mapper".into(),
            command: "colmap mapper".into(),
            status,
        }
    }

    #[test]
    fn test_exit_code_follows_stage_status() {
        let err = Error::from(recon_sfm::Error::Stage(stage_failed(Some(3))));
        assert_eq!(err.kind(), ErrorKind::ExternalStage);
        assert_eq!(err.exit_code(), 3);

        assert_eq!(Error::from(stage_failed(Some(300))).exit_code(), 1);
        assert_eq!(Error::from(stage_failed(Some(-2))).exit_code(), 1);
        assert_eq!(Error::from(stage_failed(None)).exit_code(), 1);
        assert_eq!(Error::InvalidInput("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_error_taxonomy() {
        let cases = [
            (
                Error::from(recon_core::Error::EmptyPointCloud("x".into())),
                ErrorKind::DataIntegrity,
            ),
            (
                Error::from(recon_core::Error::DegenerateGeometry("x".into())),
                ErrorKind::DataIntegrity,
            ),
            (
                Error::from(recon_core::Error::BackendUnavailable("x".into())),
                ErrorKind::MissingCapability,
            ),
            (
                Error::from(recon_sfm::Error::NoImages("imgs".into())),
                ErrorKind::InputValidation,
            ),
            (
                Error::from(recon_videoio::VideoError::NotFound("v.mp4".into())),
                ErrorKind::InputValidation,
            ),
            (
                Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk")),
                ErrorKind::Io,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{}", err);
        }
    }
}
