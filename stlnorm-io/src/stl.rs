//! STL format support
//!
//! Reads both ASCII and binary STL and always writes binary STL. Facet
//! normals stored in the input are discarded; the writer recomputes them from
//! the triangle winding.

use crate::error::IoError;
use crate::{MeshReader, MeshWriter};
use std::fmt;
use std::fs;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;
use stlnorm_core::{Error, Point3f, Result, TriangleMesh};
use tempfile::NamedTempFile;

/// Size of the free-form header that opens a binary STL file
pub const BINARY_HEADER_LEN: usize = 80;

/// Header plus the little-endian u32 triangle count
const BINARY_PREAMBLE_LEN: usize = BINARY_HEADER_LEN + 4;

/// Normal, three vertices and the attribute byte count
const BINARY_TRIANGLE_LEN: usize = 50;

/// On-disk encoding of an STL file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StlEncoding {
    Ascii,
    Binary,
}

impl fmt::Display for StlEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StlEncoding::Ascii => write!(f, "ASCII STL"),
            StlEncoding::Binary => write!(f, "Binary STL"),
        }
    }
}

/// Guess the encoding of raw STL content.
///
/// A file whose length matches the triangle count in its preamble is binary
/// even if the header happens to start with `solid`. Otherwise a leading
/// `solid` keyword means ASCII.
pub fn detect_encoding(bytes: &[u8]) -> Result<StlEncoding> {
    if bytes.len() >= BINARY_PREAMBLE_LEN {
        let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as u64;
        let expected = BINARY_PREAMBLE_LEN as u64 + count * BINARY_TRIANGLE_LEN as u64;
        if expected == bytes.len() as u64 {
            return Ok(StlEncoding::Binary);
        }
    }

    let trimmed = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|start| &bytes[start..])
        .unwrap_or(&[]);
    if trimmed.starts_with(b"solid") {
        return Ok(StlEncoding::Ascii);
    }

    if bytes.len() >= BINARY_PREAMBLE_LEN {
        Ok(StlEncoding::Binary)
    } else {
        Err(IoError::ParseError {
            message: format!("{} bytes is too short for an STL file", bytes.len()),
        }
        .into())
    }
}

/// Rewrite the opening line of ASCII STL as `solid <name>`.
///
/// stl_io only takes text for ASCII when it opens with `solid` plus a space;
/// anything looser goes to its binary reader.
fn canonical_ascii_header(bytes: &[u8]) -> Vec<u8> {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let rest = bytes[start..].strip_prefix(b"solid").unwrap_or(&bytes[start..]);
    let line_end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
    let line = &rest[..line_end];
    let name_start = line.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(line.len());
    let name_end = line.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(name_start, |i| i + 1);
    let name = &line[name_start..name_end];

    let mut out = Vec::with_capacity(rest.len() + 8);
    out.extend_from_slice(b"solid ");
    out.extend_from_slice(name);
    out.extend_from_slice(&rest[line_end..]);
    out
}

/// Parse STL content held in memory, returning the mesh and the encoding it
/// was stored in.
pub fn read_stl_from_bytes(bytes: &[u8]) -> Result<(TriangleMesh, StlEncoding)> {
    let encoding = detect_encoding(bytes)?;

    if encoding == StlEncoding::Binary {
        let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as u64;
        let needed = BINARY_PREAMBLE_LEN as u64 + count * BINARY_TRIANGLE_LEN as u64;
        if (bytes.len() as u64) < needed {
            return Err(IoError::ParseError {
                message: format!(
                    "binary STL truncated: {} triangles need {} bytes, found {}",
                    count,
                    needed,
                    bytes.len()
                ),
            }
            .into());
        }
    }

    let mut owned;
    let mut data = bytes;
    match encoding {
        StlEncoding::Binary if data.starts_with(b"solid") => {
            // stl_io probes for ASCII by the leading keyword alone
            owned = bytes.to_vec();
            owned[..5].fill(0);
            data = &owned;
        }
        StlEncoding::Ascii => {
            owned = canonical_ascii_header(bytes);
            data = &owned;
        }
        StlEncoding::Binary => {}
    }

    let indexed = stl_io::read_stl(&mut Cursor::new(data)).map_err(|e| IoError::ParseError {
        message: format!("malformed {}: {}", encoding, e),
    })?;

    let vertices = indexed
        .vertices
        .iter()
        .map(|v| Point3f::new(v[0], v[1], v[2]))
        .collect();
    let faces = indexed.faces.iter().map(|f| f.vertices).collect();

    let mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
    mesh.validate()?;
    Ok((mesh, encoding))
}

/// Read an STL file, also reporting which encoding it used
pub fn read_stl_with_encoding<P: AsRef<Path>>(path: P) -> Result<(TriangleMesh, StlEncoding)> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    read_stl_from_bytes(&bytes).map_err(|e| match e {
        Error::InvalidData(msg) => Error::InvalidData(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Encode a mesh as binary STL into any writer
pub fn write_binary_stl<W: Write>(writer: &mut W, mesh: &TriangleMesh) -> Result<()> {
    if u32::try_from(mesh.faces.len()).is_err() {
        return Err(IoError::WriteError {
            message: format!("{} triangles exceed the binary STL limit", mesh.faces.len()),
        }
        .into());
    }

    let vertex = |i: usize| {
        let p = mesh.vertices[i];
        stl_io::Vertex::new([p.x, p.y, p.z])
    };
    let normals = mesh.calculate_face_normals();
    let triangles = mesh.faces.iter().zip(normals.iter()).map(|(face, n)| stl_io::Triangle {
        normal: stl_io::Normal::new([n.x, n.y, n.z]),
        vertices: [vertex(face[0]), vertex(face[1]), vertex(face[2])],
    });

    stl_io::write_stl(writer, triangles)?;
    Ok(())
}

pub struct StlReader;
pub struct StlWriter;

impl MeshReader for StlReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
        read_stl_with_encoding(path).map(|(mesh, _)| mesh)
    }
}

impl MeshWriter for StlWriter {
    /// Writes binary STL through a temporary sibling file that replaces the
    /// destination only once fully written. Existing file permissions are kept.
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        mesh.validate()?;
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            write_binary_stl(&mut writer, mesh)?;
            writer.flush()?;
        }
        if let Ok(meta) = fs::metadata(path) {
            tmp.as_file().set_permissions(meta.permissions())?;
        }
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}
