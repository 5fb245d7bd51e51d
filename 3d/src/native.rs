//! In-process geometry backend

use crate::filtering::remove_statistical_outliers;
use crate::mesh::processing::simplify_quadric_decimation;
use crate::mesh::reconstruction;
use crate::mesh::topology;
use crate::mesh::TriangleMesh;
use crate::processor::PointCloudProcessor;
use recon_core::{PointCloud, Result};
use std::path::Path;

/// CPU backend built on rayon and an R*-tree neighbour index.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProcessor;

impl PointCloudProcessor for NativeProcessor {
    fn name(&self) -> &str {
        "native"
    }

    fn load(&self, path: &Path) -> Result<PointCloud> {
        recon_io::read_ply_file(path)
    }

    fn remove_outliers(
        &self,
        cloud: &PointCloud,
        neighbors: usize,
        std_ratio: f64,
    ) -> Result<PointCloud> {
        Ok(remove_statistical_outliers(cloud, neighbors, std_ratio).0)
    }

    fn reconstruct_surface(&self, cloud: &PointCloud, depth: usize) -> Result<TriangleMesh> {
        reconstruction::reconstruct_surface(cloud, depth)
    }

    fn simplify(&self, mesh: &mut TriangleMesh, target_triangles: usize) -> Result<()> {
        simplify_quadric_decimation(mesh, target_triangles);
        Ok(())
    }

    fn repair_topology(&self, mesh: &mut TriangleMesh) -> Result<()> {
        topology::repair_topology(mesh);
        Ok(())
    }

    fn compute_normals(&self, mesh: &mut TriangleMesh) -> Result<()> {
        mesh.compute_vertex_normals();
        Ok(())
    }

    fn normalize(&self, mesh: &mut TriangleMesh) -> Result<()> {
        mesh.normalize()
    }

    fn export(&self, mesh: &TriangleMesh, path: &Path) -> Result<()> {
        recon_io::write_glb(path, &mesh.to_buffers()?)
    }
}
