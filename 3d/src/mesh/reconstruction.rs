//! Surface Reconstruction from Point Clouds
//!
//! Oriented implicit-surface reconstruction:
//! - a signed function `f(x)` is built from the oriented samples, as the
//!   inverse-distance weighted mean of `n_i · (x - p_i)` over the nearest
//!   samples (positive outside, negative inside);
//! - `f` is evaluated on a sparse band of grid cells around the samples;
//! - the zero level set is extracted with marching tetrahedra (each cube is
//!   split into six tetrahedra along its main diagonal, which keeps the
//!   triangulation consistent between neighbouring cubes);
//! - vertex colors are transferred from the nearest sample.

use super::TriangleMesh;
use crate::filtering::{estimate_normals, mean_point_spacing};
use crate::spatial::PointIndex;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use recon_core::{Error, PointCloud, Result};
use std::collections::{HashMap, HashSet};

/// Deepest supported grid subdivision.
pub const MAX_DEPTH: usize = 16;

/// Samples blended into the implicit function at each grid corner.
const FUNCTION_NEIGHBORS: usize = 8;

/// Neighbourhood used when normals have to be estimated.
const NORMAL_NEIGHBORS: usize = 16;

/// Grid cells are never finer than this multiple of the mean sample spacing.
const SPACING_FACTOR: f32 = 2.0;

type GridKey = (i32, i32, i32);

/// Corner offsets, indexed as `x + 2y + 4z`.
const CORNERS: [GridKey; 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (0, 1, 0),
    (1, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (0, 1, 1),
    (1, 1, 1),
];

/// Freudenthal split of a cube into six tetrahedra sharing the 0-7 diagonal.
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

/// Grid placement for a reconstruction run.
#[derive(Debug, Clone, Copy)]
pub struct GridSpec {
    pub origin: Point3<f32>,
    pub voxel_size: f32,
}

impl GridSpec {
    /// Cell size is `extent / 2^depth`, clamped to stay above the sample
    /// spacing. The grid is padded by one cell on every side.
    pub fn for_cloud(cloud: &PointCloud, depth: usize) -> Result<Self> {
        if depth == 0 || depth > MAX_DEPTH {
            return Err(Error::InvalidInput(format!(
                "reconstruction depth must be in 1..={}, got {}",
                MAX_DEPTH, depth
            )));
        }
        let (min, max) = cloud
            .bounds()
            .ok_or_else(|| Error::EmptyPointCloud("no points to reconstruct".into()))?;
        let extent = (max - min).max();
        if !(extent.is_finite() && extent > 0.0) {
            return Err(Error::EmptyMesh(format!(
                "point cloud has extent {}, no surface can be extracted",
                extent
            )));
        }

        let nominal = extent / (1u32 << depth) as f32;
        let voxel_size = nominal.max(SPACING_FACTOR * mean_point_spacing(cloud));
        Ok(Self {
            origin: min - Vector3::repeat(voxel_size),
            voxel_size,
        })
    }

    fn cell_of(&self, p: &Point3<f32>) -> GridKey {
        let rel = (p - self.origin) / self.voxel_size;
        (
            rel.x.floor() as i32,
            rel.y.floor() as i32,
            rel.z.floor() as i32,
        )
    }

    fn position(&self, key: GridKey) -> Point3<f32> {
        self.origin + Vector3::new(key.0 as f32, key.1 as f32, key.2 as f32) * self.voxel_size
    }
}

/// Signed implicit function defined by oriented samples.
struct ImplicitFunction<'a> {
    points: &'a [Point3<f32>],
    normals: &'a [Vector3<f32>],
    index: PointIndex,
    softening: f32,
}

impl<'a> ImplicitFunction<'a> {
    fn new(points: &'a [Point3<f32>], normals: &'a [Vector3<f32>], voxel_size: f32) -> Self {
        Self {
            points,
            normals,
            index: PointIndex::new(points),
            softening: (0.1 * voxel_size).powi(2),
        }
    }

    fn eval(&self, x: &Point3<f32>) -> f32 {
        let mut weighted = 0.0f32;
        let mut total = 0.0f32;
        for (i, d) in self.index.k_nearest(x, FUNCTION_NEIGHBORS) {
            let w = 1.0 / (d * d + self.softening);
            weighted += w * self.normals[i].dot(&(x - self.points[i]));
            total += w;
        }
        if total > 0.0 {
            weighted / total
        } else {
            f32::INFINITY
        }
    }
}

/// Reconstruct a triangle surface from the cloud at the given grid depth.
///
/// Normals are estimated when the cloud carries none. Fails with
/// [`Error::EmptyMesh`] when no surface crosses the sampled band.
pub fn reconstruct_surface(cloud: &PointCloud, depth: usize) -> Result<TriangleMesh> {
    if cloud.is_empty() {
        return Err(Error::EmptyPointCloud("no points to reconstruct".into()));
    }

    let mut oriented;
    let cloud = match &cloud.normals {
        Some(n) if n.len() == cloud.len() => cloud,
        _ => {
            oriented = cloud.clone();
            estimate_normals(&mut oriented, NORMAL_NEIGHBORS);
            &oriented
        }
    };
    let normals = cloud.normals.as_deref().unwrap_or_default();

    let grid = GridSpec::for_cloud(cloud, depth)?;
    let function = ImplicitFunction::new(&cloud.points, normals, grid.voxel_size);

    // Band of cells around the samples, dilated by one cell.
    let occupied: HashSet<GridKey> = cloud.points.iter().map(|p| grid.cell_of(p)).collect();
    let mut cells: HashSet<GridKey> = HashSet::with_capacity(occupied.len() * 4);
    for &(x, y, z) in &occupied {
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    cells.insert((x + dx, y + dy, z + dz));
                }
            }
        }
    }
    let mut cells: Vec<GridKey> = cells.into_iter().collect();
    cells.sort_unstable();

    let mut corner_keys: HashSet<GridKey> = HashSet::with_capacity(cells.len() * 2);
    for &(x, y, z) in &cells {
        for &(dx, dy, dz) in &CORNERS {
            corner_keys.insert((x + dx, y + dy, z + dz));
        }
    }
    let corner_keys: Vec<GridKey> = corner_keys.into_iter().collect();
    let values: HashMap<GridKey, f32> = corner_keys
        .par_iter()
        .map(|&key| (key, function.eval(&grid.position(key))))
        .collect();

    tracing::debug!(
        points = cloud.len(),
        depth,
        voxel_size = grid.voxel_size,
        cells = cells.len(),
        corners = values.len(),
        "evaluated implicit function"
    );

    let mut extractor = TetExtractor::new(&grid, &values);
    for &cell in &cells {
        extractor.polygonize_cell(cell);
    }
    let mut mesh = extractor.finish();

    if mesh.faces.is_empty() {
        return Err(Error::EmptyMesh(
            "surface reconstruction produced no triangles".into(),
        ));
    }

    if let Some(colors) = &cloud.colors {
        let index = PointIndex::new(&cloud.points);
        let transferred: Vec<Point3<f32>> = mesh
            .vertices
            .par_iter()
            .map(|v| {
                index
                    .nearest(v)
                    .and_then(|i| colors.get(i).copied())
                    .unwrap_or_else(Point3::origin)
            })
            .collect();
        mesh.colors = Some(transferred);
    }

    tracing::debug!(
        vertices = mesh.num_vertices(),
        triangles = mesh.num_faces(),
        "extracted surface"
    );
    Ok(mesh)
}

/// Marching-tetrahedra extraction with vertices welded per grid edge.
struct TetExtractor<'a> {
    grid: &'a GridSpec,
    values: &'a HashMap<GridKey, f32>,
    edge_vertices: HashMap<(GridKey, GridKey), usize>,
    mesh: TriangleMesh,
}

impl<'a> TetExtractor<'a> {
    fn new(grid: &'a GridSpec, values: &'a HashMap<GridKey, f32>) -> Self {
        Self {
            grid,
            values,
            edge_vertices: HashMap::new(),
            mesh: TriangleMesh::new(),
        }
    }

    fn finish(self) -> TriangleMesh {
        self.mesh
    }

    fn polygonize_cell(&mut self, cell: GridKey) {
        let mut keys = [(0, 0, 0); 8];
        let mut vals = [0.0f32; 8];
        for (c, &(dx, dy, dz)) in CORNERS.iter().enumerate() {
            let key = (cell.0 + dx, cell.1 + dy, cell.2 + dz);
            match self.values.get(&key) {
                Some(&v) if v.is_finite() => {
                    keys[c] = key;
                    vals[c] = v;
                }
                _ => return,
            }
        }

        for tet in &TETRAHEDRA {
            let k = [keys[tet[0]], keys[tet[1]], keys[tet[2]], keys[tet[3]]];
            let v = [vals[tet[0]], vals[tet[1]], vals[tet[2]], vals[tet[3]]];
            self.polygonize_tet(&k, &v);
        }
    }

    fn polygonize_tet(&mut self, keys: &[GridKey; 4], vals: &[f32; 4]) {
        let (inside, outside): (Vec<usize>, Vec<usize>) = (0..4).partition(|&i| vals[i] < 0.0);

        // Direction from the inside corners towards the outside corners.
        let grid = *self.grid;
        let centroid = |set: &[usize]| -> Vector3<f32> {
            set.iter()
                .map(|&i| grid.position(keys[i]).coords)
                .sum::<Vector3<f32>>()
                / set.len() as f32
        };

        match inside.len() {
            1 | 3 => {
                let outward = centroid(&outside) - centroid(&inside);
                let (lone, others) = if inside.len() == 1 {
                    (inside[0], outside)
                } else {
                    (outside[0], inside)
                };
                let a = self.edge_vertex(keys, vals, lone, others[0]);
                let b = self.edge_vertex(keys, vals, lone, others[1]);
                let c = self.edge_vertex(keys, vals, lone, others[2]);
                self.emit([a, b, c], &outward);
            }
            2 => {
                let outward = centroid(&outside) - centroid(&inside);
                let (i0, i1) = (inside[0], inside[1]);
                let (o0, o1) = (outside[0], outside[1]);
                let a = self.edge_vertex(keys, vals, i0, o0);
                let b = self.edge_vertex(keys, vals, i0, o1);
                let c = self.edge_vertex(keys, vals, i1, o1);
                let d = self.edge_vertex(keys, vals, i1, o0);
                self.emit([a, b, c], &outward);
                self.emit([a, c, d], &outward);
            }
            _ => {}
        }
    }

    fn edge_vertex(&mut self, keys: &[GridKey; 4], vals: &[f32; 4], i: usize, j: usize) -> usize {
        let (ka, va, kb, vb) = if keys[i] <= keys[j] {
            (keys[i], vals[i], keys[j], vals[j])
        } else {
            (keys[j], vals[j], keys[i], vals[i])
        };

        if let Some(&idx) = self.edge_vertices.get(&(ka, kb)) {
            return idx;
        }

        let t = (va / (va - vb)).clamp(0.0, 1.0);
        let pa = self.grid.position(ka);
        let pb = self.grid.position(kb);
        let p = pa + (pb - pa) * t;

        let idx = self.mesh.vertices.len();
        self.mesh.vertices.push(p);
        self.edge_vertices.insert((ka, kb), idx);
        idx
    }

    fn emit(&mut self, mut face: [usize; 3], outward: &Vector3<f32>) {
        if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
            return;
        }
        if self.mesh.face_cross(&face).dot(outward) < 0.0 {
            face.swap(1, 2);
        }
        self.mesh.faces.push(face);
    }
}

/// Evenly distributed samples on a sphere (Fibonacci lattice) with outward
/// normals.
pub fn create_sphere_point_cloud(center: Point3<f32>, radius: f32, num_points: usize) -> PointCloud {
    let phi = std::f32::consts::PI * (3.0 - 5.0_f32.sqrt());

    let mut points = Vec::with_capacity(num_points);
    let mut normals = Vec::with_capacity(num_points);

    for i in 0..num_points {
        let y = 1.0 - (i as f32 / (num_points - 1).max(1) as f32) * 2.0;
        let radius_at_y = (1.0 - y * y).max(0.0).sqrt();
        let theta = phi * i as f32;

        let normal = Vector3::new(theta.cos() * radius_at_y, y, theta.sin() * radius_at_y);
        points.push(center + radius * normal);
        normals.push(normal);
    }

    PointCloud {
        points,
        normals: Some(normals),
        colors: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifold_edges(mesh: &TriangleMesh) -> bool {
        let mut counts: HashMap<(usize, usize), usize> = HashMap::new();
        for f in &mesh.faces {
            for k in 0..3 {
                let (a, b) = (f[k], f[(k + 1) % 3]);
                *counts.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }
        counts.values().all(|&c| c <= 2)
    }

    #[test]
    fn test_sphere_reconstruction_hugs_surface() {
        let cloud = create_sphere_point_cloud(Point3::new(1.0, 2.0, 3.0), 2.0, 2000);
        let mesh = reconstruct_surface(&cloud, 6).unwrap();
        assert!(mesh.num_faces() > 100);

        for v in &mesh.vertices {
            let r = (v - Point3::new(1.0, 2.0, 3.0)).norm();
            assert!((r - 2.0).abs() < 0.35, "vertex at radius {}", r);
        }
        assert!(manifold_edges(&mesh));
    }

    #[test]
    fn test_faces_are_oriented_outward() {
        let cloud = create_sphere_point_cloud(Point3::origin(), 1.0, 1500);
        let mesh = reconstruct_surface(&cloud, 5).unwrap();
        let outward = mesh
            .faces
            .iter()
            .filter(|f| {
                let c = (mesh.vertices[f[0]].coords
                    + mesh.vertices[f[1]].coords
                    + mesh.vertices[f[2]].coords)
                    / 3.0;
                mesh.face_cross(f).dot(&c) > 0.0
            })
            .count();
        assert!(outward as f32 > 0.95 * mesh.num_faces() as f32);
    }

    #[test]
    fn test_normals_estimated_when_missing() {
        let mut cloud = create_sphere_point_cloud(Point3::origin(), 1.0, 1500);
        cloud.normals = None;
        let mesh = reconstruct_surface(&cloud, 5).unwrap();
        assert!(mesh.num_faces() > 100);
    }

    #[test]
    fn test_colors_follow_nearest_sample() {
        let mut cloud = create_sphere_point_cloud(Point3::origin(), 1.0, 1500);
        let colors = cloud
            .points
            .iter()
            .map(|p| {
                if p.y > 0.0 {
                    Point3::new(1.0, 0.0, 0.0)
                } else {
                    Point3::new(0.0, 0.0, 1.0)
                }
            })
            .collect();
        cloud.colors = Some(colors);
        let mesh = reconstruct_surface(&cloud, 5).unwrap();
        let colors = mesh.colors.as_ref().unwrap();
        assert_eq!(colors.len(), mesh.num_vertices());
        for (v, c) in mesh.vertices.iter().zip(colors) {
            if v.y > 0.3 {
                assert_eq!(c.x, 1.0);
            }
        }
    }

    #[test]
    fn test_degenerate_inputs() {
        let single = PointCloud::new(vec![Point3::new(1.0, 1.0, 1.0)]);
        assert!(matches!(
            reconstruct_surface(&single, 8),
            Err(Error::EmptyMesh(_))
        ));
        assert!(matches!(
            reconstruct_surface(&PointCloud::default(), 8),
            Err(Error::EmptyPointCloud(_))
        ));
        let cloud = create_sphere_point_cloud(Point3::origin(), 1.0, 100);
        assert!(matches!(
            reconstruct_surface(&cloud, 0),
            Err(Error::InvalidInput(_))
        ));
    }
}
