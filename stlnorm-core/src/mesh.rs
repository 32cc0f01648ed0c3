//! Mesh data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A triangle mesh with vertices and faces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
    pub colors: Option<Vec<[u8; 3]>>,
}

/// Counts of elements removed by [`TriangleMesh::repair`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub welded_vertices: usize,
    pub degenerate_faces: usize,
    pub duplicate_faces: usize,
    pub unreferenced_vertices: usize,
}

impl RepairReport {
    /// True when the repair pass changed nothing
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
            colors: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
            colors: None,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, vertex: Point3f) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a face to the mesh
    pub fn add_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    /// Unit normal of a single face, `None` for zero-area faces
    pub fn face_normal(&self, face_index: usize) -> Option<Vector3f> {
        let face = self.faces.get(face_index)?;
        let v0 = self.vertices[face[0]];
        let v1 = self.vertices[face[1]];
        let v2 = self.vertices[face[2]];
        (v1 - v0).cross(&(v2 - v0)).try_normalize(f32::EPSILON)
    }

    /// Calculate face normals. Degenerate faces get a zero vector.
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        (0..self.faces.len())
            .map(|fi| self.face_normal(fi).unwrap_or_else(Vector3f::zeros))
            .collect()
    }

    /// Axis-aligned bounding box of all vertices
    pub fn bounding_box(&self) -> Option<(Point3f, Point3f)> {
        let first = *self.vertices.first()?;
        let mut min = first;
        let mut max = first;

        for vertex in &self.vertices {
            min.x = min.x.min(vertex.x);
            min.y = min.y.min(vertex.y);
            min.z = min.z.min(vertex.z);

            max.x = max.x.max(vertex.x);
            max.y = max.y.max(vertex.y);
            max.z = max.z.max(vertex.z);
        }

        Some((min, max))
    }

    /// Check index bounds and coordinate finiteness
    pub fn validate(&self) -> Result<()> {
        if let Some(i) = self
            .vertices
            .iter()
            .position(|v| !v.iter().all(|c| c.is_finite()))
        {
            return Err(Error::InvalidData(format!(
                "vertex {} has a non-finite coordinate",
                i
            )));
        }
        let nv = self.vertices.len();
        if let Some(fi) = self.faces.iter().position(|f| f.iter().any(|&i| i >= nv)) {
            return Err(Error::InvalidData(format!(
                "face {} references a vertex outside 0..{}",
                fi, nv
            )));
        }
        Ok(())
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Set vertex colors
    pub fn set_colors(&mut self, colors: Vec<[u8; 3]>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }

    /// Drop faces that use the same vertex index more than once.
    /// Returns the number of faces removed.
    pub fn remove_degenerate_faces(&mut self) -> usize {
        let before = self.faces.len();
        self.faces
            .retain(|f| f[0] != f[1] && f[1] != f[2] && f[2] != f[0]);
        before - self.faces.len()
    }

    /// Drop faces spanning the same vertex set as an earlier face,
    /// regardless of winding. Returns the number of faces removed.
    pub fn remove_duplicate_faces(&mut self) -> usize {
        let before = self.faces.len();
        let mut seen = HashSet::with_capacity(before);
        self.faces.retain(|f| {
            let mut key = *f;
            key.sort_unstable();
            seen.insert(key)
        });
        before - self.faces.len()
    }

    /// Remove vertices that no face references and remap face indices.
    /// Returns the number of vertices removed.
    pub fn remove_unreferenced_vertices(&mut self) -> usize {
        let mut used = vec![false; self.vertices.len()];
        for face in &self.faces {
            for &i in face {
                used[i] = true;
            }
        }

        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut next = 0usize;
        for (old, &keep) in used.iter().enumerate() {
            if keep {
                remap[old] = next;
                next += 1;
            }
        }

        let removed = self.vertices.len() - next;
        if removed == 0 {
            return 0;
        }

        self.vertices = compact(&self.vertices, &used);
        if let Some(normals) = self.normals.take() {
            self.normals = Some(compact(&normals, &used));
        }
        if let Some(colors) = self.colors.take() {
            self.colors = Some(compact(&colors, &used));
        }
        for face in &mut self.faces {
            for i in face.iter_mut() {
                *i = remap[*i];
            }
        }
        removed
    }

    /// Merge vertices that share a position.
    ///
    /// With `epsilon == 0.0` positions must match exactly; otherwise vertices
    /// falling into the same cell of an `epsilon`-sized grid are merged into
    /// the first one seen. Faces collapsed by the merge are dropped. Returns
    /// the number of vertices merged away.
    pub fn weld_vertices(&mut self, epsilon: f32) -> usize {
        let mut cells: HashMap<[i64; 3], usize> = HashMap::with_capacity(self.vertices.len());
        let mut remap = Vec::with_capacity(self.vertices.len());
        let mut keep = vec![false; self.vertices.len()];
        let mut next = 0usize;

        for (i, v) in self.vertices.iter().enumerate() {
            let key = weld_key(v, epsilon);
            let target = *cells.entry(key).or_insert_with(|| {
                keep[i] = true;
                let idx = next;
                next += 1;
                idx
            });
            remap.push(target);
        }

        let merged = self.vertices.len() - next;
        if merged == 0 {
            return 0;
        }

        self.vertices = compact(&self.vertices, &keep);
        if let Some(normals) = self.normals.take() {
            self.normals = Some(compact(&normals, &keep));
        }
        if let Some(colors) = self.colors.take() {
            self.colors = Some(compact(&colors, &keep));
        }
        for face in &mut self.faces {
            for i in face.iter_mut() {
                *i = remap[*i];
            }
        }
        self.remove_degenerate_faces();
        merged
    }

    /// Run the standard cleanup used before decimation: exact weld,
    /// degenerate and duplicate face removal, unreferenced vertex removal.
    pub fn repair(&mut self) -> RepairReport {
        let welded_vertices = self.weld_vertices(0.0);
        let degenerate_faces = self.remove_degenerate_faces();
        let duplicate_faces = self.remove_duplicate_faces();
        let unreferenced_vertices = self.remove_unreferenced_vertices();
        RepairReport {
            welded_vertices,
            degenerate_faces,
            duplicate_faces,
            unreferenced_vertices,
        }
    }

    /// Clear the mesh
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.faces.clear();
        self.normals = None;
        self.colors = None;
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

fn compact<T: Copy>(values: &[T], keep: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(keep)
        .filter_map(|(v, &k)| k.then_some(*v))
        .collect()
}

fn weld_key(v: &Point3f, epsilon: f32) -> [i64; 3] {
    if epsilon > 0.0 {
        [
            (v.x / epsilon).round() as i64,
            (v.y / epsilon).round() as i64,
            (v.z / epsilon).round() as i64,
        ]
    } else {
        // +0.0 and -0.0 compare equal but differ in bits
        let bits = |c: f32| if c == 0.0 { 0 } else { c.to_bits() as i64 };
        [bits(v.x), bits(v.y), bits(v.z)]
    }
}
