//! Mesh topology cleanup
//!
//! Each pass returns the number of removed elements. Vertex attributes
//! (normals, colors) are compacted together with the vertices.

use super::TriangleMesh;
use std::collections::{HashMap, HashSet};

/// Counts removed by [`repair_topology`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub degenerate_triangles: usize,
    pub duplicated_triangles: usize,
    pub duplicated_vertices: usize,
    pub non_manifold_triangles: usize,
    pub unreferenced_vertices: usize,
}

/// Run every cleanup pass in order: degenerate triangles, duplicated
/// triangles, duplicated vertices, non-manifold edges, then unreferenced
/// vertices.
pub fn repair_topology(mesh: &mut TriangleMesh) -> RepairReport {
    let mut report = RepairReport {
        degenerate_triangles: remove_degenerate_triangles(mesh),
        duplicated_triangles: remove_duplicated_triangles(mesh),
        duplicated_vertices: remove_duplicated_vertices(mesh),
        ..Default::default()
    };
    // Welding vertices can make two triangles identical.
    report.duplicated_triangles += remove_duplicated_triangles(mesh);
    report.non_manifold_triangles = remove_non_manifold_edges(mesh);
    report.unreferenced_vertices = remove_unreferenced_vertices(mesh);

    tracing::debug!(?report, "repaired mesh topology");
    report
}

fn is_degenerate(face: &[usize; 3]) -> bool {
    face[0] == face[1] || face[1] == face[2] || face[0] == face[2]
}

/// Drop triangles that reference the same vertex more than once.
pub fn remove_degenerate_triangles(mesh: &mut TriangleMesh) -> usize {
    let before = mesh.faces.len();
    mesh.faces.retain(|f| !is_degenerate(f));
    before - mesh.faces.len()
}

/// Drop triangles using the same three vertices as an earlier one,
/// regardless of winding.
pub fn remove_duplicated_triangles(mesh: &mut TriangleMesh) -> usize {
    let before = mesh.faces.len();
    let mut seen: HashSet<[usize; 3]> = HashSet::with_capacity(before);
    mesh.faces.retain(|f| {
        let mut key = *f;
        key.sort_unstable();
        seen.insert(key)
    });
    before - mesh.faces.len()
}

fn position_key(v: &nalgebra::Point3<f32>) -> [u32; 3] {
    // -0.0 and 0.0 share a key
    [
        (v.x + 0.0).to_bits(),
        (v.y + 0.0).to_bits(),
        (v.z + 0.0).to_bits(),
    ]
}

/// Merge vertices with identical positions into the first occurrence.
///
/// Triangles that collapse as a result are dropped.
pub fn remove_duplicated_vertices(mesh: &mut TriangleMesh) -> usize {
    let mut first: HashMap<[u32; 3], usize> = HashMap::with_capacity(mesh.vertices.len());
    let mut remap = Vec::with_capacity(mesh.vertices.len());
    let mut keep = Vec::with_capacity(mesh.vertices.len());

    for v in &mesh.vertices {
        let next = keep.len();
        let slot = *first.entry(position_key(v)).or_insert(next);
        if slot == next {
            keep.push(remap.len());
        }
        remap.push(slot);
    }

    let removed = mesh.vertices.len() - keep.len();
    if removed == 0 {
        return 0;
    }

    compact_vertices(mesh, &keep);
    for face in mesh.faces.iter_mut() {
        for i in face.iter_mut() {
            *i = remap[*i];
        }
    }
    mesh.faces.retain(|f| !is_degenerate(f));
    removed
}

/// Ensure no edge is shared by more than two triangles by dropping the
/// smallest-area triangles on each offending edge.
pub fn remove_non_manifold_edges(mesh: &mut TriangleMesh) -> usize {
    let mut edge_faces: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    for (fi, f) in mesh.faces.iter().enumerate() {
        for k in 0..3 {
            let (a, b) = (f[k], f[(k + 1) % 3]);
            edge_faces.entry((a.min(b), a.max(b))).or_default().push(fi);
        }
    }

    let mut edges: Vec<(&(usize, usize), &Vec<usize>)> =
        edge_faces.iter().filter(|(_, fs)| fs.len() > 2).collect();
    if edges.is_empty() {
        return 0;
    }
    edges.sort_unstable_by_key(|(e, _)| **e);

    let areas: Vec<f32> = mesh.faces.iter().map(|f| mesh.face_area(f)).collect();
    let mut alive = vec![true; mesh.faces.len()];

    for (_, faces) in edges {
        let mut live: Vec<usize> = faces.iter().copied().filter(|&f| alive[f]).collect();
        if live.len() <= 2 {
            continue;
        }
        live.sort_by(|&a, &b| areas[a].total_cmp(&areas[b]).then(a.cmp(&b)));
        for &f in &live[..live.len() - 2] {
            alive[f] = false;
        }
    }

    let before = mesh.faces.len();
    let mut idx = 0;
    mesh.faces.retain(|_| {
        let keep = alive[idx];
        idx += 1;
        keep
    });
    before - mesh.faces.len()
}

/// Drop vertices no triangle references.
pub fn remove_unreferenced_vertices(mesh: &mut TriangleMesh) -> usize {
    let mut referenced = vec![false; mesh.vertices.len()];
    for f in &mesh.faces {
        for &i in f {
            referenced[i] = true;
        }
    }

    let keep: Vec<usize> = (0..mesh.vertices.len()).filter(|&i| referenced[i]).collect();
    let removed = mesh.vertices.len() - keep.len();
    if removed == 0 {
        return 0;
    }

    let mut remap = vec![usize::MAX; mesh.vertices.len()];
    for (new, &old) in keep.iter().enumerate() {
        remap[old] = new;
    }
    compact_vertices(mesh, &keep);
    for face in mesh.faces.iter_mut() {
        for i in face.iter_mut() {
            *i = remap[*i];
        }
    }
    removed
}

/// Keep only the listed vertices (in order) together with their attributes.
fn compact_vertices(mesh: &mut TriangleMesh, keep: &[usize]) {
    fn pick<T: Copy>(values: &[T], keep: &[usize]) -> Vec<T> {
        keep.iter().map(|&i| values[i]).collect()
    }

    let count = mesh.vertices.len();
    mesh.vertices = pick(&mesh.vertices, keep);
    mesh.normals = mesh
        .normals
        .as_ref()
        .filter(|n| n.len() == count)
        .map(|n| pick(n, keep));
    mesh.colors = mesh
        .colors
        .as_ref()
        .filter(|c| c.len() == count)
        .map(|c| pick(c, keep));
}
