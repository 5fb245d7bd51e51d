//! Mesh Processing Operations
//!
//! Quadric error metric simplification (Garland & Heckbert): repeatedly
//! collapse the edge whose merged vertex has the lowest summed squared
//! distance to the planes of its original neighbourhood.

use super::topology::remove_unreferenced_vertices;
use super::TriangleMesh;
use nalgebra::{Matrix4, Point3, Vector3, Vector4};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

type Quadric = Matrix4<f64>;

#[derive(Debug)]
struct Collapse {
    cost: f64,
    u: usize,
    v: usize,
    stamp_u: u32,
    stamp_v: u32,
    target: Point3<f64>,
}

impl PartialEq for Collapse {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Collapse {}

impl PartialOrd for Collapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Collapse {
    // Reversed so the max-heap pops the cheapest collapse first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| (other.u, other.v).cmp(&(self.u, self.v)))
    }
}

fn to_f64(p: &Point3<f32>) -> Point3<f64> {
    Point3::new(p.x as f64, p.y as f64, p.z as f64)
}

fn face_plane(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Option<(Vector4<f64>, f64)> {
    let cross = (b - a).cross(&(c - a));
    let norm = cross.norm();
    if norm <= f64::EPSILON {
        return None;
    }
    let n = cross / norm;
    Some((Vector4::new(n.x, n.y, n.z, -n.dot(&a.coords)), norm * 0.5))
}

fn quadric_error(q: &Quadric, p: &Point3<f64>) -> f64 {
    let h = Vector4::new(p.x, p.y, p.z, 1.0);
    (h.transpose() * q * h)[(0, 0)].max(0.0)
}

struct Decimator {
    positions: Vec<Point3<f64>>,
    quadrics: Vec<Quadric>,
    vertex_faces: Vec<Vec<usize>>,
    faces: Vec<[usize; 3]>,
    face_alive: Vec<bool>,
    vertex_alive: Vec<bool>,
    stamps: Vec<u32>,
    live_faces: usize,
    colors: Option<Vec<Point3<f32>>>,
}

impl Decimator {
    fn new(mesh: &TriangleMesh) -> Self {
        let positions: Vec<Point3<f64>> = mesh.vertices.iter().map(to_f64).collect();
        let mut quadrics = vec![Quadric::zeros(); positions.len()];
        let mut vertex_faces = vec![Vec::new(); positions.len()];

        for (fi, f) in mesh.faces.iter().enumerate() {
            for &i in f {
                vertex_faces[i].push(fi);
            }
            if let Some((plane, area)) =
                face_plane(&positions[f[0]], &positions[f[1]], &positions[f[2]])
            {
                let k = plane * plane.transpose() * area;
                for &i in f {
                    quadrics[i] += k;
                }
            }
        }

        Self {
            quadrics,
            vertex_faces,
            faces: mesh.faces.clone(),
            face_alive: vec![true; mesh.faces.len()],
            vertex_alive: vec![true; positions.len()],
            stamps: vec![0; positions.len()],
            live_faces: mesh.faces.len(),
            colors: mesh
                .colors
                .clone()
                .filter(|c| c.len() == mesh.vertices.len()),
            positions,
        }
    }

    fn neighbors(&self, v: usize) -> HashSet<usize> {
        let mut out = HashSet::new();
        for &f in &self.vertex_faces[v] {
            if self.face_alive[f] {
                for &i in &self.faces[f] {
                    if i != v {
                        out.insert(i);
                    }
                }
            }
        }
        out
    }

    fn plan(&self, u: usize, v: usize) -> Collapse {
        let q = self.quadrics[u] + self.quadrics[v];
        let pu = self.positions[u];
        let pv = self.positions[v];
        let mid = Point3::from((pu.coords + pv.coords) * 0.5);

        let mut solve = q;
        solve.set_row(3, &Vector4::new(0.0, 0.0, 0.0, 1.0).transpose());
        let edge_len = (pv - pu).norm();
        let optimal = solve
            .try_inverse()
            .map(|inv| inv * Vector4::new(0.0, 0.0, 0.0, 1.0))
            .map(|h| Point3::new(h.x, h.y, h.z))
            .filter(|p| p.coords.iter().all(|c| c.is_finite()))
            .filter(|p| (p - mid).norm() <= 2.0 * edge_len.max(f64::EPSILON));

        let (target, cost) = match optimal {
            Some(p) => (p, quadric_error(&q, &p)),
            None => [pu, pv, mid]
                .into_iter()
                .map(|p| (p, quadric_error(&q, &p)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .unwrap_or((mid, 0.0)),
        };

        Collapse {
            cost,
            u,
            v,
            stamp_u: self.stamps[u],
            stamp_v: self.stamps[v],
            target,
        }
    }

    fn is_current(&self, c: &Collapse) -> bool {
        self.vertex_alive[c.u]
            && self.vertex_alive[c.v]
            && self.stamps[c.u] == c.stamp_u
            && self.stamps[c.v] == c.stamp_v
    }

    /// Link condition plus a normal-flip check on every surviving face.
    fn is_valid(&self, c: &Collapse) -> bool {
        let shared_faces = self.vertex_faces[c.u]
            .iter()
            .filter(|&&f| self.face_alive[f] && self.faces[f].contains(&c.v))
            .count();
        let nu = self.neighbors(c.u);
        let nv = self.neighbors(c.v);
        if nu.intersection(&nv).count() > shared_faces {
            return false;
        }

        for &w in &[c.u, c.v] {
            for &f in &self.vertex_faces[w] {
                if !self.face_alive[f] {
                    continue;
                }
                let face = self.faces[f];
                if face.contains(&c.u) && face.contains(&c.v) {
                    continue;
                }
                let before = face.map(|i| self.positions[i]);
                let after = face.map(|i| if i == w { c.target } else { self.positions[i] });
                let n0: Vector3<f64> = (before[1] - before[0]).cross(&(before[2] - before[0]));
                let n1: Vector3<f64> = (after[1] - after[0]).cross(&(after[2] - after[0]));
                if n0.dot(&n1) <= 0.0 {
                    return false;
                }
            }
        }
        true
    }

    fn collapse(&mut self, c: &Collapse) {
        let (u, v) = (c.u, c.v);

        if let Some(colors) = self.colors.as_mut() {
            let cu = colors[u].coords;
            let cv = colors[v].coords;
            colors[u] = Point3::from((cu + cv) * 0.5);
        }

        self.positions[u] = c.target;
        let qv = self.quadrics[v];
        self.quadrics[u] += qv;
        self.vertex_alive[v] = false;
        self.stamps[u] += 1;
        self.stamps[v] += 1;

        let moved = std::mem::take(&mut self.vertex_faces[v]);
        for f in moved {
            if !self.face_alive[f] {
                continue;
            }
            if self.faces[f].contains(&u) {
                self.face_alive[f] = false;
                self.live_faces -= 1;
                continue;
            }
            for i in self.faces[f].iter_mut() {
                if *i == v {
                    *i = u;
                }
            }
            self.vertex_faces[u].push(f);
        }
        let alive = &self.face_alive;
        self.vertex_faces[u].retain(|&f| alive[f]);
    }
}

/// Quadric-error decimation down to roughly `target_triangles` faces.
///
/// No-op when the mesh is already at or below the target. Vertex colors are
/// blended across collapses; normals are dropped and must be recomputed.
pub fn simplify_quadric_decimation(mesh: &mut TriangleMesh, target_triangles: usize) {
    if mesh.faces.len() <= target_triangles {
        return;
    }
    let start_faces = mesh.faces.len();

    let mut state = Decimator::new(mesh);
    let mut heap = BinaryHeap::new();
    let mut seen = HashSet::new();
    for f in &mesh.faces {
        for k in 0..3 {
            let (a, b) = (f[k], f[(k + 1) % 3]);
            let edge = (a.min(b), a.max(b));
            if edge.0 != edge.1 && seen.insert(edge) {
                heap.push(state.plan(edge.0, edge.1));
            }
        }
    }

    while state.live_faces > target_triangles {
        let Some(candidate) = heap.pop() else {
            break;
        };
        if !state.is_current(&candidate) || !state.is_valid(&candidate) {
            continue;
        }
        state.collapse(&candidate);

        let u = candidate.u;
        for w in state.neighbors(u) {
            heap.push(state.plan(u.min(w), u.max(w)));
        }
    }

    mesh.vertices = state
        .positions
        .iter()
        .map(|p| Point3::new(p.x as f32, p.y as f32, p.z as f32))
        .collect();
    mesh.faces = state
        .faces
        .iter()
        .zip(&state.face_alive)
        .filter(|(_, &alive)| alive)
        .map(|(f, _)| *f)
        .collect();
    mesh.colors = state.colors;
    mesh.normals = None;
    remove_unreferenced_vertices(mesh);

    tracing::debug!(
        before = start_faces,
        after = mesh.faces.len(),
        target = target_triangles,
        "quadric decimation"
    );
}
