pub mod engine;
pub mod filtering;
pub mod mesh;
#[cfg(feature = "native")]
pub mod native;
pub mod processor;
pub mod spatial;

pub use engine::{MeshEngine, MeshReport};
pub use filtering::{estimate_normals, mean_point_spacing, remove_statistical_outliers};
pub use mesh::processing::simplify_quadric_decimation;
pub use mesh::reconstruction::{create_sphere_point_cloud, reconstruct_surface};
pub use mesh::topology::{repair_topology, RepairReport};
pub use mesh::TriangleMesh;
#[cfg(feature = "native")]
pub use native::NativeProcessor;
pub use processor::{default_processor, MeshParams, PointCloudProcessor};
pub use recon_core::{Error, PointCloud, Result};
pub use spatial::PointIndex;
