//! I/O operations for meshes
//!
//! This crate reads ASCII and binary STL files into [`TriangleMesh`] and
//! writes meshes back out as binary STL.

pub mod stl;
pub mod error;

pub use error::*;
pub use stl::{
    detect_encoding, read_stl_from_bytes, read_stl_with_encoding, write_binary_stl, StlEncoding,
    StlReader, StlWriter,
};

use std::path::Path;
use stlnorm_core::{Result, TriangleMesh};

/// Trait for reading meshes from files
pub trait MeshReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh>;
}

/// Trait for writing meshes to files
pub trait MeshWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()>;
}

/// True when the path carries an `.stl` extension in any letter case
pub fn is_stl_path<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|s| s.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("stl"))
}

fn unsupported(path: &Path) -> stlnorm_core::Error {
    IoError::InvalidFormat {
        format: format!("{:?}", path.extension().unwrap_or_default()),
    }
    .into()
}

/// Auto-detect format and read mesh
pub fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
    let path = path.as_ref();
    if is_stl_path(path) {
        StlReader::read_mesh(path)
    } else {
        Err(unsupported(path))
    }
}

/// Auto-detect format and write mesh
pub fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    if is_stl_path(path) {
        StlWriter::write_mesh(mesh, path)
    } else {
        Err(unsupported(path))
    }
}
