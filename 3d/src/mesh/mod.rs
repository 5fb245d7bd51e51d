//! Triangle Mesh Data Structure
//!
//! Indexed triangle mesh with optional per-vertex normals and colors, plus the
//! normalization and buffer conversion used at export time.

use nalgebra::{Point3, Vector3};
use recon_core::{Error, Result};
use recon_io::MeshBuffers;

/// Triangle mesh with vertices and face indices
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3<f32>>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3<f32>>>,
    pub colors: Option<Vec<Point3<f32>>>,
}

impl TriangleMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vertices_and_faces(vertices: Vec<Point3<f32>>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
            colors: None,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Unnormalized face normal; its length is twice the triangle area.
    pub fn face_cross(&self, face: &[usize; 3]) -> Vector3<f32> {
        let v0 = self.vertices[face[0]];
        let e1 = self.vertices[face[1]] - v0;
        let e2 = self.vertices[face[2]] - v0;
        e1.cross(&e2)
    }

    pub fn face_area(&self, face: &[usize; 3]) -> f32 {
        self.face_cross(face).norm() * 0.5
    }

    /// Compute unit face normals. Zero-area faces get a zero vector.
    pub fn compute_face_normals(&self) -> Vec<Vector3<f32>> {
        self.faces
            .iter()
            .map(|face| {
                self.face_cross(face)
                    .try_normalize(f32::EPSILON)
                    .unwrap_or_else(Vector3::zeros)
            })
            .collect()
    }

    /// Compute vertex normals by area-weighted averaging of adjacent faces.
    ///
    /// A vertex whose accumulated normal vanishes gets +Z.
    pub fn compute_vertex_normals(&mut self) {
        let mut vertex_normals: Vec<Vector3<f32>> = vec![Vector3::zeros(); self.vertices.len()];

        for face in &self.faces {
            let weighted = self.face_cross(face);
            for &vertex_idx in face.iter() {
                vertex_normals[vertex_idx] += weighted;
            }
        }

        for normal in vertex_normals.iter_mut() {
            *normal = normal.try_normalize(1e-20).unwrap_or_else(Vector3::z);
        }

        self.normals = Some(vertex_normals);
    }

    /// Axis-aligned bounds, or `None` for a mesh without vertices.
    pub fn bounds(&self) -> Option<(Point3<f32>, Point3<f32>)> {
        let first = *self.vertices.first()?;
        let mut min = first;
        let mut max = first;

        for v in &self.vertices {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            min.z = min.z.min(v.z);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
            max.z = max.z.max(v.z);
        }

        Some((min, max))
    }

    /// Largest side of the bounding box.
    pub fn max_extent(&self) -> f32 {
        match self.bounds() {
            Some((min, max)) => (max - min).max(),
            None => 0.0,
        }
    }

    /// Arithmetic mean of the vertex positions.
    pub fn centroid(&self) -> Option<Point3<f32>> {
        if self.vertices.is_empty() {
            return None;
        }
        let mut sum = Vector3::<f64>::zeros();
        for v in &self.vertices {
            sum += Vector3::new(v.x as f64, v.y as f64, v.z as f64);
        }
        let mean = sum / self.vertices.len() as f64;
        Some(Point3::new(mean.x as f32, mean.y as f32, mean.z as f32))
    }

    /// Calculate surface area
    pub fn surface_area(&self) -> f32 {
        self.faces.iter().map(|face| self.face_area(face)).sum()
    }

    /// Center on the vertex centroid and scale so the largest bounding-box
    /// side becomes exactly 1.
    ///
    /// Fails with [`Error::DegenerateGeometry`] when the mesh has no extent.
    pub fn normalize(&mut self) -> Result<()> {
        let extent = self.max_extent();
        if !(extent.is_finite() && extent > 0.0) {
            return Err(Error::DegenerateGeometry(format!(
                "mesh bounding box has extent {}",
                extent
            )));
        }
        let centroid = self
            .centroid()
            .ok_or_else(|| Error::EmptyMesh("cannot normalize a mesh without vertices".into()))?;

        let scale = 1.0 / extent as f64;
        for v in self.vertices.iter_mut() {
            for k in 0..3 {
                v[k] = ((v[k] as f64 - centroid[k] as f64) * scale) as f32;
            }
        }

        tracing::debug!(
            extent,
            centroid = ?centroid,
            "normalized mesh to unit extent"
        );
        Ok(())
    }

    /// Flatten into GLB-ready buffers. Normals are computed when missing.
    pub fn to_buffers(&self) -> Result<MeshBuffers> {
        if self.is_empty() {
            return Err(Error::EmptyMesh("mesh has no triangles to export".into()));
        }

        let normals = match &self.normals {
            Some(n) if n.len() == self.vertices.len() => n.clone(),
            _ => {
                let mut copy = self.clone();
                copy.compute_vertex_normals();
                copy.normals.unwrap_or_default()
            }
        };

        let mut indices = Vec::with_capacity(self.faces.len() * 3);
        for face in &self.faces {
            for &i in face {
                let i = u32::try_from(i)
                    .map_err(|_| Error::Export(format!("vertex index {} exceeds u32", i)))?;
                indices.push(i);
            }
        }

        Ok(MeshBuffers {
            positions: self.vertices.iter().map(|v| [v.x, v.y, v.z]).collect(),
            normals: normals.iter().map(|n| [n.x, n.y, n.z]).collect(),
            colors: self
                .colors
                .as_ref()
                .filter(|c| c.len() == self.vertices.len())
                .map(|c| c.iter().map(|c| [c.x, c.y, c.z]).collect()),
            indices,
        })
    }
}

pub mod processing;
pub mod reconstruction;
pub mod topology;
