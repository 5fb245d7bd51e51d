//! Structure from Motion / Multi-View Stereo orchestration
//!
//! Drives an external COLMAP executable through its six-stage
//! sparse-to-dense pipeline inside a run workspace and hands back the fused
//! dense point cloud. The stages themselves are opaque; this crate only
//! builds their command lines, orders them, checks the files they leave
//! behind and decides when a previous result can be reused.

pub mod cache;
pub mod colmap;
pub mod images;
pub mod orchestrator;

pub use cache::{CacheKey, InputFingerprint, ReusePolicy};
pub use colmap::{ColmapStage, COLMAP_STAGES};
pub use images::{describe_file, list_images, ImageEntry, IMAGE_EXTENSIONS};
pub use orchestrator::{SfmOrchestrator, SfmOutcome};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Images directory not found: {}", .0.display())]
    ImagesNotFound(PathBuf),

    #[error("No images (jpg, jpeg, png, tif, tiff, bmp) found in {}", .0.display())]
    NoImages(PathBuf),

    #[error(transparent)]
    Stage(#[from] recon_runtime::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
