//! Binary glTF (GLB) mesh export
//!
//! Writes a single-mesh, single-primitive asset: positions, normals, optional
//! vertex colors and `u32` indices packed into one embedded buffer. No
//! texture coordinates or materials are emitted.

use crate::{Error, Result};
use gltf::json;
use json::validation::Checked::Valid;
use json::validation::USize64;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Flat vertex/index buffers ready for upload to a viewer.
#[derive(Debug, Clone, Default)]
pub struct MeshBuffers {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub colors: Option<Vec<[f32; 3]>>,
    pub indices: Vec<u32>,
}

impl MeshBuffers {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn validate(&self) -> Result<()> {
        if self.positions.is_empty() || self.indices.is_empty() {
            return Err(Error::Export("mesh has no geometry".to_string()));
        }
        if self.normals.len() != self.positions.len() {
            return Err(Error::Export(format!(
                "normal count {} does not match vertex count {}",
                self.normals.len(),
                self.positions.len()
            )));
        }
        if let Some(colors) = &self.colors {
            if colors.len() != self.positions.len() {
                return Err(Error::Export(format!(
                    "color count {} does not match vertex count {}",
                    colors.len(),
                    self.positions.len()
                )));
            }
        }
        if self.indices.len() % 3 != 0 {
            return Err(Error::Export("index count is not a multiple of 3".to_string()));
        }
        if let Some(&bad) = self
            .indices
            .iter()
            .find(|&&i| i as usize >= self.positions.len())
        {
            return Err(Error::Export(format!("index {} out of range", bad)));
        }
        Ok(())
    }
}

fn push_vec3s(bin: &mut Vec<u8>, values: &[[f32; 3]]) -> (usize, usize) {
    let offset = bin.len();
    for v in values {
        for c in v {
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    (offset, bin.len() - offset)
}

fn vec3_bounds(values: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for v in values {
        for k in 0..3 {
            min[k] = min[k].min(v[k]);
            max[k] = max[k].max(v[k]);
        }
    }
    (min, max)
}

fn buffer_view(
    offset: usize,
    length: usize,
    target: json::buffer::Target,
) -> json::buffer::View {
    json::buffer::View {
        buffer: json::Index::new(0),
        byte_length: USize64::from(length),
        byte_offset: Some(USize64::from(offset)),
        byte_stride: None,
        extensions: Default::default(),
        extras: Default::default(),
        name: None,
        target: Some(Valid(target)),
    }
}

fn accessor(
    view: u32,
    count: usize,
    component: json::accessor::ComponentType,
    type_: json::accessor::Type,
    bounds: Option<([f32; 3], [f32; 3])>,
) -> json::Accessor {
    json::Accessor {
        buffer_view: Some(json::Index::new(view)),
        byte_offset: Some(USize64(0)),
        count: USize64::from(count),
        component_type: Valid(json::accessor::GenericComponentType(component)),
        extensions: Default::default(),
        extras: Default::default(),
        type_: Valid(type_),
        min: bounds.map(|(min, _)| json::Value::from(min.to_vec())),
        max: bounds.map(|(_, max)| json::Value::from(max.to_vec())),
        name: None,
        normalized: false,
        sparse: None,
    }
}

/// Encode the mesh as an in-memory GLB.
pub fn encode_glb(mesh: &MeshBuffers) -> Result<Vec<u8>> {
    mesh.validate()?;

    let mut bin = Vec::new();
    let mut views = Vec::new();
    let mut accessors = Vec::new();
    let mut attributes = BTreeMap::new();

    let (offset, length) = push_vec3s(&mut bin, &mesh.positions);
    views.push(buffer_view(offset, length, json::buffer::Target::ArrayBuffer));
    accessors.push(accessor(
        0,
        mesh.positions.len(),
        json::accessor::ComponentType::F32,
        json::accessor::Type::Vec3,
        Some(vec3_bounds(&mesh.positions)),
    ));
    attributes.insert(Valid(json::mesh::Semantic::Positions), json::Index::new(0));

    let (offset, length) = push_vec3s(&mut bin, &mesh.normals);
    views.push(buffer_view(offset, length, json::buffer::Target::ArrayBuffer));
    accessors.push(accessor(
        1,
        mesh.normals.len(),
        json::accessor::ComponentType::F32,
        json::accessor::Type::Vec3,
        None,
    ));
    attributes.insert(Valid(json::mesh::Semantic::Normals), json::Index::new(1));

    if let Some(colors) = &mesh.colors {
        let (offset, length) = push_vec3s(&mut bin, colors);
        let slot = views.len() as u32;
        views.push(buffer_view(offset, length, json::buffer::Target::ArrayBuffer));
        accessors.push(accessor(
            slot,
            colors.len(),
            json::accessor::ComponentType::F32,
            json::accessor::Type::Vec3,
            None,
        ));
        attributes.insert(Valid(json::mesh::Semantic::Colors(0)), json::Index::new(slot));
    }

    let offset = bin.len();
    for i in &mesh.indices {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    let index_slot = views.len() as u32;
    views.push(buffer_view(
        offset,
        bin.len() - offset,
        json::buffer::Target::ElementArrayBuffer,
    ));
    accessors.push(accessor(
        index_slot,
        mesh.indices.len(),
        json::accessor::ComponentType::U32,
        json::accessor::Type::Scalar,
        None,
    ));

    let primitive = json::mesh::Primitive {
        attributes,
        extensions: Default::default(),
        extras: Default::default(),
        indices: Some(json::Index::new(index_slot)),
        material: None,
        mode: Valid(json::mesh::Mode::Triangles),
        targets: None,
    };

    let root = json::Root {
        accessors,
        buffers: vec![json::Buffer {
            byte_length: USize64::from(bin.len()),
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            uri: None,
        }],
        buffer_views: views,
        meshes: vec![json::Mesh {
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            primitives: vec![primitive],
            weights: None,
        }],
        nodes: vec![json::Node {
            mesh: Some(json::Index::new(0)),
            ..Default::default()
        }],
        scenes: vec![json::Scene {
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            nodes: vec![json::Index::new(0)],
        }],
        scene: Some(json::Index::new(0)),
        ..Default::default()
    };

    let json_bytes =
        json::serialize::to_vec(&root).map_err(|e| Error::Export(format!("glTF JSON: {}", e)))?;

    let length = 12 + 8 + padded(json_bytes.len()) + 8 + padded(bin.len());
    let glb = gltf::binary::Glb {
        header: gltf::binary::Header {
            magic: *b"glTF",
            version: 2,
            length: u32::try_from(length)
                .map_err(|_| Error::Export("mesh exceeds the 4 GiB GLB limit".to_string()))?,
        },
        json: Cow::Owned(json_bytes),
        bin: Some(Cow::Owned(bin)),
    };

    glb.to_vec()
        .map_err(|e| Error::Export(format!("GLB encoding: {}", e)))
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

/// Write the mesh as a GLB file, creating parent directories as needed.
pub fn write_glb<P: AsRef<Path>>(path: P, mesh: &MeshBuffers) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_glb(mesh)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&bytes)?;
    writer.flush()?;

    tracing::debug!(
        path = %path.display(),
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        bytes = bytes.len(),
        "wrote GLB"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> MeshBuffers {
        MeshBuffers {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            colors: None,
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn test_glb_header_and_geometry() {
        let bytes = encode_glb(&triangle()).unwrap();
        assert_eq!(&bytes[0..4], b"glTF");
        assert_eq!(bytes.len() % 4, 0);

        let gltf = gltf::Gltf::from_slice(&bytes).unwrap();
        let mesh = gltf.meshes().next().unwrap();
        let primitive = mesh.primitives().next().unwrap();
        assert!(primitive.get(&gltf::Semantic::Positions).is_some());
        assert!(primitive.get(&gltf::Semantic::Normals).is_some());
        assert!(primitive.get(&gltf::Semantic::TexCoords(0)).is_none());
        assert_eq!(primitive.indices().unwrap().count(), 3);

        let positions = primitive.get(&gltf::Semantic::Positions).unwrap();
        assert_eq!(positions.count(), 3);
        assert!(positions.max().is_some());
    }

    #[test]
    fn test_colors_are_optional_attribute() {
        let mut mesh = triangle();
        mesh.colors = Some(vec![[1.0, 0.0, 0.0]; 3]);
        let bytes = encode_glb(&mesh).unwrap();
        let gltf = gltf::Gltf::from_slice(&bytes).unwrap();
        let primitive = gltf.meshes().next().unwrap().primitives().next().unwrap();
        assert!(primitive.get(&gltf::Semantic::Colors(0)).is_some());
    }

    #[test]
    fn test_rejects_bad_buffers() {
        let mut mesh = triangle();
        mesh.indices = vec![0, 1, 7];
        assert!(matches!(encode_glb(&mesh), Err(Error::Export(_))));

        let mut mesh = triangle();
        mesh.normals.pop();
        assert!(matches!(encode_glb(&mesh), Err(Error::Export(_))));

        assert!(matches!(
            encode_glb(&MeshBuffers::default()),
            Err(Error::Export(_))
        ));
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meshes").join("nested").join("model.glb");
        write_glb(&path, &triangle()).unwrap();
        assert!(path.exists());
    }
}
