//! Mesh simplification for stlnorm
//!
//! Provides quadric error metric (QEM) edge-collapse decimation over a
//! half-edge view of a [`TriangleMesh`]:
//! - [`Quadric`] error matrices and boundary constraint planes
//! - [`QuadricDecimator`], the collapse driver
//! - [`MeshSimplifier`], the entry point shared by callers

pub mod quadric_error;
pub mod edge_collapse;
mod half_edge;

pub use quadric_error::Quadric;
pub use edge_collapse::{DecimationStats, QuadricDecimator};

use stlnorm_core::{Error, Result, TriangleMesh};

/// Reduce the number of faces of a mesh
pub trait MeshSimplifier {
    /// Simplify until the mesh has at most `target_faces` faces, or until no
    /// further collapse is allowed.
    fn simplify_to_face_count(&self, mesh: &TriangleMesh, target_faces: usize) -> Result<TriangleMesh>;

    /// Simplify with a reduction ratio (0.0 = no reduction, 1.0 = maximum reduction)
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh> {
        if !(0.0..=1.0).contains(&reduction_ratio) {
            return Err(Error::InvalidData(
                "reduction_ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        if mesh.is_empty() {
            return Err(Error::InvalidData("Mesh is empty".to_string()));
        }
        if reduction_ratio == 0.0 {
            return Ok(mesh.clone());
        }

        let target_faces = ((1.0 - reduction_ratio) * mesh.face_count() as f32) as usize;
        self.simplify_to_face_count(mesh, target_faces)
    }
}
