//! Point cloud processing capability
//!
//! The mesh engine only talks to a [`PointCloudProcessor`]. Backends are
//! resolved at the moment the mesh stage runs, so a build without any
//! geometry backend still validates inputs and drives the external stages
//! before reporting [`Error::BackendUnavailable`].

use crate::mesh::TriangleMesh;
use recon_core::{Error, PointCloud, Result};
use std::path::Path;
use std::sync::Arc;

/// Operations the mesh stage needs from a geometry backend.
pub trait PointCloudProcessor: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    fn load(&self, path: &Path) -> Result<PointCloud>;

    /// Statistical outlier removal over `neighbors` nearest points.
    fn remove_outliers(
        &self,
        cloud: &PointCloud,
        neighbors: usize,
        std_ratio: f64,
    ) -> Result<PointCloud>;

    fn reconstruct_surface(&self, cloud: &PointCloud, depth: usize) -> Result<TriangleMesh>;

    fn simplify(&self, mesh: &mut TriangleMesh, target_triangles: usize) -> Result<()>;

    fn repair_topology(&self, mesh: &mut TriangleMesh) -> Result<()>;

    fn compute_normals(&self, mesh: &mut TriangleMesh) -> Result<()>;

    fn normalize(&self, mesh: &mut TriangleMesh) -> Result<()>;

    fn export(&self, mesh: &TriangleMesh, path: &Path) -> Result<()>;
}

/// Parameters of one mesh stage run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshParams {
    /// Grid depth of the surface reconstruction (nominal resolution `2^depth`).
    pub poisson_depth: usize,
    pub target_triangles: usize,
    pub outlier_neighbors: usize,
    pub outlier_std_ratio: f64,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            poisson_depth: 10,
            target_triangles: 50_000,
            outlier_neighbors: 30,
            outlier_std_ratio: 2.0,
        }
    }
}

impl MeshParams {
    pub fn validate(&self) -> Result<()> {
        let max_depth = crate::mesh::reconstruction::MAX_DEPTH;
        if self.poisson_depth == 0 || self.poisson_depth > max_depth {
            return Err(Error::InvalidInput(format!(
                "poisson depth must be in 1..={}, got {}",
                max_depth, self.poisson_depth
            )));
        }
        if self.target_triangles == 0 {
            return Err(Error::InvalidInput(
                "target triangle count must be positive".into(),
            ));
        }
        if self.outlier_neighbors == 0 {
            return Err(Error::InvalidInput(
                "outlier neighbour count must be positive".into(),
            ));
        }
        if !(self.outlier_std_ratio.is_finite() && self.outlier_std_ratio > 0.0) {
            return Err(Error::InvalidInput(format!(
                "outlier std ratio must be positive, got {}",
                self.outlier_std_ratio
            )));
        }
        Ok(())
    }
}

/// Resolve the compiled-in geometry backend.
#[cfg(feature = "native")]
pub fn default_processor() -> Result<Arc<dyn PointCloudProcessor>> {
    Ok(Arc::new(crate::native::NativeProcessor))
}

/// Resolve the compiled-in geometry backend.
#[cfg(not(feature = "native"))]
pub fn default_processor() -> Result<Arc<dyn PointCloudProcessor>> {
    Err(Error::BackendUnavailable(
        "no point cloud processing backend compiled in (enable the `native` feature of recon-3d)"
            .into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = MeshParams::default();
        assert_eq!(params.poisson_depth, 10);
        assert_eq!(params.target_triangles, 50_000);
        assert_eq!(params.outlier_neighbors, 30);
        assert_eq!(params.outlier_std_ratio, 2.0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_invalid_params() {
        let bad = [
            MeshParams {
                poisson_depth: 0,
                ..Default::default()
            },
            MeshParams {
                poisson_depth: 40,
                ..Default::default()
            },
            MeshParams {
                target_triangles: 0,
                ..Default::default()
            },
            MeshParams {
                outlier_std_ratio: f64::NAN,
                ..Default::default()
            },
        ];
        for params in bad {
            assert!(matches!(params.validate(), Err(Error::InvalidInput(_))));
        }
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_native_backend_resolves() {
        assert_eq!(default_processor().unwrap().name(), "native");
    }

    #[cfg(not(feature = "native"))]
    #[test]
    fn test_missing_backend_is_reported() {
        assert!(matches!(
            default_processor(),
            Err(Error::BackendUnavailable(_))
        ));
    }
}
