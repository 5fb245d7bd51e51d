//! Mesh stage: fused point cloud in, normalized GLB out.

use crate::processor::{MeshParams, PointCloudProcessor};
use recon_core::{Error, Result};
use std::path::Path;
use std::sync::Arc;

/// Statistics of one mesh stage run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeshReport {
    pub points_loaded: usize,
    pub points_kept: usize,
    pub reconstructed_triangles: usize,
    pub vertices: usize,
    pub triangles: usize,
    /// Largest bounding-box side before normalization.
    pub original_extent: f32,
}

pub struct MeshEngine {
    processor: Arc<dyn PointCloudProcessor>,
    params: MeshParams,
}

impl MeshEngine {
    pub fn new(processor: Arc<dyn PointCloudProcessor>, params: MeshParams) -> Self {
        Self { processor, params }
    }

    pub fn params(&self) -> &MeshParams {
        &self.params
    }

    /// Load `fused`, rebuild a clean normalized surface and write it to
    /// `output` as GLB.
    pub fn run(&self, fused: &Path, output: &Path) -> Result<MeshReport> {
        self.params.validate()?;
        let p = self.processor.as_ref();
        let mut report = MeshReport::default();

        tracing::info!(
            backend = p.name(),
            input = %fused.display(),
            "loading fused point cloud"
        );
        let cloud = p.load(fused)?;
        report.points_loaded = cloud.len();
        if cloud.is_empty() {
            return Err(Error::EmptyPointCloud(format!(
                "{} contains no points",
                fused.display()
            )));
        }

        let cloud = p.remove_outliers(
            &cloud,
            self.params.outlier_neighbors,
            self.params.outlier_std_ratio,
        )?;
        report.points_kept = cloud.len();
        if cloud.is_empty() {
            return Err(Error::EmptyPointCloud(
                "no points left after outlier removal".into(),
            ));
        }
        tracing::info!(
            loaded = report.points_loaded,
            kept = report.points_kept,
            "removed statistical outliers"
        );

        let mut mesh = p.reconstruct_surface(&cloud, self.params.poisson_depth)?;
        drop(cloud);
        report.reconstructed_triangles = mesh.num_faces();
        tracing::info!(
            depth = self.params.poisson_depth,
            triangles = report.reconstructed_triangles,
            "reconstructed surface"
        );

        p.simplify(&mut mesh, self.params.target_triangles)?;
        p.repair_topology(&mut mesh)?;
        if mesh.is_empty() {
            return Err(Error::EmptyMesh(
                "no triangles left after simplification and repair".into(),
            ));
        }
        p.compute_normals(&mut mesh)?;

        report.original_extent = mesh.max_extent();
        p.normalize(&mut mesh)?;
        report.vertices = mesh.num_vertices();
        report.triangles = mesh.num_faces();

        p.export(&mesh, output)?;
        tracing::info!(
            output = %output.display(),
            vertices = report.vertices,
            triangles = report.triangles,
            "exported mesh"
        );
        Ok(report)
    }
}
