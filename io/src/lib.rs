//! 3D File I/O Module
//!
//! Reads dense point clouds and writes finished meshes:
//! - PLY (Polygon File Format), ascii and binary, read and write
//! - GLB (binary glTF 2.0), write

pub mod glb;
pub mod ply;

pub use glb::{encode_glb, write_glb, MeshBuffers};
pub use ply::{read_ply, read_ply_file, write_ply, write_ply_file, PlyFormat};

pub use recon_core::{Error, Result};
