//! Core types shared by the reconstruction workspace
//!
//! Holds the point cloud container passed between the I/O and geometry
//! crates, the common error type, and the global CPU pool setup.

pub mod point_cloud;
pub mod runtime;

pub use point_cloud::{PointCloud, PointCloudf32, PointCloudf64};
pub use runtime::{current_cpu_threads, init_global_thread_pool, PoolSize, CPU_THREADS_ENV};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Point cloud is empty: {0}")]
    EmptyPointCloud(String),

    #[error("Mesh is empty: {0}")]
    EmptyMesh(String),

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Geometry backend not available: {0}")]
    BackendUnavailable(String),

    #[error("Export failed: {0}")]
    Export(String),
}

impl Error {
    /// True for failures where the data itself is unusable (as opposed to
    /// I/O or configuration problems).
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            Self::EmptyPointCloud(_) | Self::EmptyMesh(_) | Self::DegenerateGeometry(_)
        )
    }
}
