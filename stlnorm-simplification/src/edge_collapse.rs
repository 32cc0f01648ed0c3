//! Quadric edge-collapse decimation
//!
//! Iteratively collapses the cheapest edge under the quadric error metric
//! (QEM) until the face budget is met, using the half-edge mesh for local
//! topology queries. Every candidate is re-validated when popped: stale queue
//! entries, link-condition violations and normal flips are skipped.

use crate::half_edge::{HalfEdgeMesh, INVALID};
use crate::quadric_error::Quadric;
use crate::MeshSimplifier;
use priority_queue::PriorityQueue;
use std::cmp::Ordering;
use stlnorm_core::{Error, Point3f, Result, TriangleMesh};

#[derive(Debug, Clone)]
struct EdgeCost {
    position: Point3f,
    cost: f64,
}

impl PartialEq for EdgeCost {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost) == Ordering::Equal
    }
}
impl Eq for EdgeCost {}

impl PartialOrd for EdgeCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCost {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: smallest cost first
        other.cost.total_cmp(&self.cost)
    }
}

#[inline]
fn edge_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

/// Outcome counters of a decimation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecimationStats {
    pub original_faces: usize,
    pub final_faces: usize,
    pub collapses: usize,
}

/// Quadric edge-collapse decimator.
///
/// Defaults keep open boundaries fixed and refuse collapses that turn any
/// surviving face by more than 90 degrees.
#[derive(Debug, Clone)]
pub struct QuadricDecimator {
    /// Never move or remove vertices on an open boundary
    pub preserve_boundary: bool,
    /// Reject collapses that rotate an incident face normal too far
    pub preserve_normal: bool,
    /// Largest accepted normal rotation, in degrees
    pub max_normal_deviation_deg: f64,
    /// Weight of boundary constraint planes when boundaries may move
    pub boundary_weight: f64,
    /// Stop when the minimum collapse cost exceeds this threshold
    pub max_error: Option<f64>,
    /// Place merged vertices at the quadric minimum instead of an endpoint
    pub optimal_placement: bool,
}

impl Default for QuadricDecimator {
    fn default() -> Self {
        Self {
            preserve_boundary: true,
            preserve_normal: true,
            max_normal_deviation_deg: 90.0,
            boundary_weight: 100.0,
            max_error: None,
            optimal_placement: true,
        }
    }
}

impl QuadricDecimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(max_error: Option<f64>, preserve_boundary: bool, boundary_weight: f64) -> Self {
        Self {
            max_error,
            preserve_boundary,
            boundary_weight,
            ..Self::default()
        }
    }

    pub fn preserve_normal(mut self, enabled: bool) -> Self {
        self.preserve_normal = enabled;
        self
    }

    pub fn optimal_placement(mut self, enabled: bool) -> Self {
        self.optimal_placement = enabled;
        self
    }

    /// Decimate to at most `target_faces` faces where topology allows,
    /// reporting how far it got.
    pub fn decimate_with_stats(
        &self,
        mesh: &TriangleMesh,
        target_faces: usize,
    ) -> Result<(TriangleMesh, DecimationStats)> {
        if mesh.is_empty() {
            return Err(Error::InvalidData("Mesh is empty".to_string()));
        }
        mesh.validate()?;

        let original_faces = mesh.face_count();
        if original_faces <= target_faces {
            let stats = DecimationStats {
                original_faces,
                final_faces: original_faces,
                collapses: 0,
            };
            return Ok((mesh.clone(), stats));
        }

        let mut working = mesh.clone();
        working.remove_degenerate_faces();
        working.remove_duplicate_faces();

        let mut hem = HalfEdgeMesh::from_triangle_mesh(&working);
        let boundary_weight = (!self.preserve_boundary).then_some(self.boundary_weight);
        hem.initialize_quadrics(boundary_weight);

        let mut queue = self.build_queue(&hem);
        let mut collapses = 0usize;

        while hem.active_face_count > target_faces {
            let Some(((a, b), edge_cost)) = queue.pop() else {
                break;
            };

            if let Some(threshold) = self.max_error {
                if edge_cost.cost > threshold {
                    break;
                }
            }

            if !hem.is_alive(a) || !hem.is_alive(b) || hem.edge_half_edge(a, b).is_none() {
                continue;
            }
            if !self.can_collapse(&hem, a, b, &edge_cost.position) {
                continue;
            }

            let removed_ring = hem.neighbors(b);
            if !hem.collapse_edge(a, b, edge_cost.position) {
                continue;
            }
            collapses += 1;

            for n in removed_ring {
                queue.remove(&edge_key(b, n));
            }
            for n in hem.neighbors(a) {
                let key = edge_key(a, n);
                match self.edge_cost(&hem, a, n) {
                    Some(cost) => {
                        queue.push(key, cost);
                    }
                    None => {
                        queue.remove(&key);
                    }
                }
            }
        }

        let result = hem.to_triangle_mesh();
        let stats = DecimationStats {
            original_faces,
            final_faces: result.face_count(),
            collapses,
        };
        Ok((result, stats))
    }

    fn build_queue(&self, hem: &HalfEdgeMesh) -> PriorityQueue<(usize, usize), EdgeCost> {
        let mut queue = PriorityQueue::with_capacity(hem.half_edges.len() / 2 + 1);
        for (he_idx, he) in hem.half_edges.iter().enumerate() {
            let key = edge_key(hem.source(he_idx), he.target);
            if queue.get(&key).is_some() {
                continue;
            }
            if let Some(cost) = self.edge_cost(hem, key.0, key.1) {
                queue.push(key, cost);
            }
        }
        queue
    }

    /// Cost and placement of collapsing `{v1, v2}`, or `None` when the edge
    /// may never collapse under the current options.
    fn edge_cost(&self, hem: &HalfEdgeMesh, v1: usize, v2: usize) -> Option<EdgeCost> {
        if hem.locked[v1] || hem.locked[v2] {
            return None;
        }
        if self.preserve_boundary && (hem.is_boundary_vertex(v1) || hem.is_boundary_vertex(v2)) {
            return None;
        }

        let q: Quadric = hem.quadrics[v1] + hem.quadrics[v2];
        let p1 = hem.positions[v1];
        let p2 = hem.positions[v2];

        let mid = Point3f::from((p1.coords + p2.coords) * 0.5);
        // Nearly flat neighborhoods put the minimum far off the edge
        let optimal = if self.optimal_placement {
            q.optimal_point()
                .filter(|p| (p - mid).norm() <= (p1 - p2).norm())
        } else {
            None
        };
        let (position, cost) = match optimal {
            Some(p) => (p, q.evaluate(&p)),
            None => {
                [p1, p2, mid]
                    .into_iter()
                    .map(|p| (p, q.evaluate(&p)))
                    .min_by(|x, y| x.1.total_cmp(&y.1))?
            }
        };
        Some(EdgeCost { position, cost })
    }

    fn can_collapse(&self, hem: &HalfEdgeMesh, v1: usize, v2: usize, position: &Point3f) -> bool {
        if hem.locked[v1] || hem.locked[v2] {
            return false;
        }
        let Some(h) = hem.edge_half_edge(v1, v2) else {
            return false;
        };

        let b1 = hem.is_boundary_vertex(v1);
        let b2 = hem.is_boundary_vertex(v2);
        if self.preserve_boundary && (b1 || b2) {
            return false;
        }
        // Joining two boundary vertices through the interior pinches the surface
        if b1 && b2 && hem.half_edges[h].twin != INVALID {
            return false;
        }
        if !hem.check_link_condition(v1, v2) {
            return false;
        }
        if hem.merged_valence(v1, v2) < 3 {
            return false;
        }

        let min_cos = self
            .preserve_normal
            .then(|| self.max_normal_deviation_deg.to_radians().cos());
        !hem.collapse_distorts_faces(v1, v2, position, min_cos)
    }
}

impl MeshSimplifier for QuadricDecimator {
    fn simplify_to_face_count(&self, mesh: &TriangleMesh, target_faces: usize) -> Result<TriangleMesh> {
        self.decimate_with_stats(mesh, target_faces)
            .map(|(result, _)| result)
    }
}
