//! Half-edge connectivity used by the edge-collapse decimator
//!
//! Built from an indexed triangle mesh. Edges shared by more than two faces,
//! or by two faces with inconsistent winding, are left unpaired and treated
//! as boundary. Vertices whose incident faces do not form a single fan are
//! marked locked and never take part in a collapse.

use crate::quadric_error::{triangle_normal, Quadric};
use nalgebra::Vector3;
use std::collections::{HashMap, HashSet};
use stlnorm_core::{Point3f, TriangleMesh, Vector3f};

pub(crate) const INVALID: usize = usize::MAX;

/// Height over longest edge below which a collapsed face counts as a sliver
const MIN_SHAPE_RATIO: f64 = 1e-4;

#[derive(Debug, Clone)]
pub(crate) struct HalfEdge {
    pub target: usize,
    pub twin: usize,
    pub next: usize,
    pub prev: usize,
    pub face: usize,
}

pub(crate) struct HalfEdgeMesh {
    pub half_edges: Vec<HalfEdge>,
    /// One outgoing half-edge per vertex (INVALID if removed or isolated)
    pub vertex_edge: Vec<usize>,
    /// One half-edge per face (INVALID if removed)
    pub face_edge: Vec<usize>,
    pub active_face_count: usize,
    pub positions: Vec<Point3f>,
    pub normals: Option<Vec<Vector3f>>,
    pub colors: Option<Vec<[u8; 3]>>,
    pub quadrics: Vec<Quadric>,
    pub vertex_removed: Vec<bool>,
    pub locked: Vec<bool>,
}

impl HalfEdgeMesh {
    /// Faces must be free of repeated indices.
    pub fn from_triangle_mesh(mesh: &TriangleMesh) -> Self {
        let nv = mesh.vertices.len();
        let nf = mesh.faces.len();

        let mut half_edges = Vec::with_capacity(nf * 3);
        let mut vertex_edge = vec![INVALID; nv];
        let mut face_edge = Vec::with_capacity(nf);
        let mut incident = vec![0usize; nv];

        for (fi, face) in mesh.faces.iter().enumerate() {
            let base = fi * 3;
            for j in 0..3usize {
                half_edges.push(HalfEdge {
                    target: face[(j + 1) % 3],
                    twin: INVALID,
                    next: base + (j + 1) % 3,
                    prev: base + (j + 2) % 3,
                    face: fi,
                });
                if vertex_edge[face[j]] == INVALID {
                    vertex_edge[face[j]] = base + j;
                }
                incident[face[j]] += 1;
            }
            face_edge.push(base);
        }

        // Pair twins; a directed edge seen twice stays unpaired
        let mut directed: HashMap<(usize, usize), usize> = HashMap::with_capacity(nf * 3);
        let mut repeated: HashSet<(usize, usize)> = HashSet::new();
        for (he_idx, he) in half_edges.iter().enumerate() {
            let src = half_edges[he.prev].target;
            if directed.insert((src, he.target), he_idx).is_some() {
                repeated.insert((src, he.target));
            }
        }
        for he_idx in 0..half_edges.len() {
            if half_edges[he_idx].twin != INVALID {
                continue;
            }
            let src = half_edges[half_edges[he_idx].prev].target;
            let tgt = half_edges[he_idx].target;
            if repeated.contains(&(src, tgt)) || repeated.contains(&(tgt, src)) {
                continue;
            }
            if let Some(&twin_idx) = directed.get(&(tgt, src)) {
                if half_edges[twin_idx].twin == INVALID {
                    half_edges[he_idx].twin = twin_idx;
                    half_edges[twin_idx].twin = he_idx;
                }
            }
        }

        let mut hem = HalfEdgeMesh {
            half_edges,
            vertex_edge,
            face_edge,
            active_face_count: nf,
            positions: mesh.vertices.clone(),
            normals: mesh.normals.clone(),
            colors: mesh.colors.clone(),
            quadrics: vec![Quadric::zero(); nv],
            vertex_removed: vec![false; nv],
            locked: vec![false; nv],
        };

        for v in 0..nv {
            if hem.vertex_edge[v] != INVALID && hem.outgoing_half_edges(v).len() != incident[v] {
                hem.locked[v] = true;
            }
        }
        hem
    }

    #[inline]
    pub fn source(&self, he: usize) -> usize {
        self.half_edges[self.half_edges[he].prev].target
    }

    #[inline]
    pub fn is_alive(&self, v: usize) -> bool {
        !self.vertex_removed[v] && self.vertex_edge[v] != INVALID
    }

    pub fn face_vertices(&self, fi: usize) -> Option<[usize; 3]> {
        let he0 = self.face_edge[fi];
        if he0 == INVALID {
            return None;
        }
        let he1 = self.half_edges[he0].next;
        Some([
            self.source(he0),
            self.half_edges[he0].target,
            self.half_edges[he1].target,
        ])
    }

    /// Accumulate face-plane quadrics, plus weighted boundary constraint
    /// planes when `boundary_weight` is given.
    pub fn initialize_quadrics(&mut self, boundary_weight: Option<f64>) {
        for fi in 0..self.face_edge.len() {
            let Some([v0, v1, v2]) = self.face_vertices(fi) else {
                continue;
            };
            let (p0, p1, p2) = (self.positions[v0], self.positions[v1], self.positions[v2]);
            if let Some(q) = Quadric::from_triangle(&p0, &p1, &p2) {
                self.quadrics[v0] += q;
                self.quadrics[v1] += q;
                self.quadrics[v2] += q;
            }

            let Some(weight) = boundary_weight else {
                continue;
            };
            let Some(normal) = triangle_normal(&p0, &p1, &p2) else {
                continue;
            };
            let mut he = self.face_edge[fi];
            for _ in 0..3 {
                if self.half_edges[he].twin == INVALID {
                    let a = self.source(he);
                    let b = self.half_edges[he].target;
                    if let Some(q) = Quadric::boundary_constraint(
                        &self.positions[a],
                        &self.positions[b],
                        &normal,
                        weight,
                    ) {
                        self.quadrics[a] += q;
                        self.quadrics[b] += q;
                    }
                }
                he = self.half_edges[he].next;
            }
        }
    }

    /// Get all outgoing half-edges from a vertex (handles boundary vertices).
    pub fn outgoing_half_edges(&self, v: usize) -> Vec<usize> {
        let start = self.vertex_edge[v];
        if start == INVALID {
            return vec![];
        }

        let limit = self.half_edges.len();
        let mut result = Vec::new();
        let mut current = start;

        // Rotate counterclockwise: current.prev.twin
        loop {
            result.push(current);
            let prev = self.half_edges[current].prev;
            let twin = self.half_edges[prev].twin;
            if twin == INVALID || result.len() > limit {
                break;
            }
            current = twin;
            if current == start {
                return result;
            }
        }

        // Boundary: also rotate clockwise from start via twin.next
        let twin_of_start = self.half_edges[start].twin;
        if twin_of_start != INVALID {
            let mut current = self.half_edges[twin_of_start].next;
            while current != start && result.len() <= limit {
                result.push(current);
                let twin = self.half_edges[current].twin;
                if twin == INVALID {
                    break;
                }
                current = self.half_edges[twin].next;
            }
        }

        result
    }

    /// Adjacent vertices, including the far end of an incoming boundary edge
    pub fn neighbors(&self, v: usize) -> HashSet<usize> {
        let mut result = HashSet::new();
        for he in self.outgoing_half_edges(v) {
            result.insert(self.half_edges[he].target);
            let prev = self.half_edges[he].prev;
            if self.half_edges[prev].twin == INVALID {
                result.insert(self.source(prev));
            }
        }
        result
    }

    pub fn is_boundary_vertex(&self, v: usize) -> bool {
        self.outgoing_half_edges(v)
            .iter()
            .any(|&he| self.half_edges[he].twin == INVALID)
    }

    pub fn find_half_edge(&self, from: usize, to: usize) -> Option<usize> {
        self.outgoing_half_edges(from)
            .into_iter()
            .find(|&he| self.half_edges[he].target == to)
    }

    /// A half-edge of the undirected edge `{a, b}` in either direction
    pub fn edge_half_edge(&self, a: usize, b: usize) -> Option<usize> {
        self.find_half_edge(a, b).or_else(|| self.find_half_edge(b, a))
    }

    /// Check the link condition: common neighbors must equal exactly the
    /// face apices opposite the edge (2 for interior, 1 for boundary).
    pub fn check_link_condition(&self, v1: usize, v2: usize) -> bool {
        let h = match self.edge_half_edge(v1, v2) {
            Some(h) => h,
            None => return false,
        };
        let n1 = self.neighbors(v1);
        let n2 = self.neighbors(v2);
        let common_count = n1.intersection(&n2).count();
        let expected = if self.half_edges[h].twin == INVALID { 1 } else { 2 };
        common_count == expected
    }

    /// Number of distinct vertices that would surround the merged vertex
    pub fn merged_valence(&self, v1: usize, v2: usize) -> usize {
        let mut ring = self.neighbors(v1);
        ring.extend(self.neighbors(v2));
        ring.remove(&v1);
        ring.remove(&v2);
        ring.len()
    }

    /// Whether moving `v1` and `v2` to `new_pos` would squash a surviving
    /// incident face into a sliver, or turn its normal further than allowed by
    /// `min_cos` (cosine of the maximum deviation).
    pub fn collapse_distorts_faces(
        &self,
        v1: usize,
        v2: usize,
        new_pos: &Point3f,
        min_cos: Option<f64>,
    ) -> bool {
        let mut faces = HashSet::new();
        for v in [v1, v2] {
            for he in self.outgoing_half_edges(v) {
                faces.insert(self.half_edges[he].face);
            }
        }

        for fi in faces {
            let Some(verts) = self.face_vertices(fi) else {
                continue;
            };
            if verts.contains(&v1) && verts.contains(&v2) {
                continue;
            }
            let old = verts.map(|i| self.positions[i]);
            let new = verts.map(|i| if i == v1 || i == v2 { *new_pos } else { self.positions[i] });

            let Some(new_n) = well_shaped_normal(&new) else {
                // Slivers already present in the input may stay slivers
                if well_shaped_normal(&old).is_some() || triangle_normal(&new[0], &new[1], &new[2]).is_none() {
                    return true;
                }
                continue;
            };
            if let (Some(min_cos), Some(old_n)) = (min_cos, triangle_normal(&old[0], &old[1], &old[2])) {
                if old_n.dot(&new_n) < min_cos {
                    return true;
                }
            }
        }
        false
    }

    /// Collapse the edge `{v1, v2}`, merging v2 into v1 at `new_pos`.
    /// Returns true on success.
    pub fn collapse_edge(&mut self, v1: usize, v2: usize, new_pos: Point3f) -> bool {
        let h = match self.edge_half_edge(v1, v2) {
            Some(h) => h,
            None => return false,
        };

        let h_twin = self.half_edges[h].twin;
        let h_next = self.half_edges[h].next;
        let h_prev = self.half_edges[h].prev;
        let face_a = self.half_edges[h].face;
        let h_next_twin = self.half_edges[h_next].twin;
        let h_prev_twin = self.half_edges[h_prev].twin;
        let c = self.half_edges[h_next].target;

        let (face_b, ht_next, ht_prev, ht_next_twin, ht_prev_twin, d) = if h_twin != INVALID {
            let hn = self.half_edges[h_twin].next;
            let hp = self.half_edges[h_twin].prev;
            (
                self.half_edges[h_twin].face,
                hn,
                hp,
                self.half_edges[hn].twin,
                self.half_edges[hp].twin,
                self.half_edges[hn].target,
            )
        } else {
            (INVALID, INVALID, INVALID, INVALID, INVALID, INVALID)
        };

        // Snapshot fans before any modification
        let v1_outgoing = self.outgoing_half_edges(v1);
        let v2_outgoing = self.outgoing_half_edges(v2);
        let c_outgoing = self.outgoing_half_edges(c);
        let d_outgoing = if d != INVALID {
            self.outgoing_half_edges(d)
        } else {
            Vec::new()
        };

        // Re-pair twins across face A
        if h_next_twin != INVALID {
            self.half_edges[h_next_twin].twin = h_prev_twin;
        }
        if h_prev_twin != INVALID {
            self.half_edges[h_prev_twin].twin = h_next_twin;
        }
        self.remove_face(face_a, [h, h_next, h_prev]);

        if face_b != INVALID {
            if ht_next_twin != INVALID {
                self.half_edges[ht_next_twin].twin = ht_prev_twin;
            }
            if ht_prev_twin != INVALID {
                self.half_edges[ht_prev_twin].twin = ht_next_twin;
            }
            self.remove_face(face_b, [h_twin, ht_next, ht_prev]);
        }

        // Redirect all v2 references to v1
        for &he in &v2_outgoing {
            let prev = self.half_edges[he].prev;
            self.half_edges[prev].target = v1;

            let twin = self.half_edges[he].twin;
            if twin != INVALID && self.half_edges[twin].face != INVALID {
                self.half_edges[twin].target = v1;
            }
        }

        self.vertex_edge[v1] = self.first_live_outgoing(v1, v1_outgoing.iter().chain(&v2_outgoing));
        self.vertex_edge[c] = self.first_live_outgoing(c, c_outgoing.iter());
        if d != INVALID {
            self.vertex_edge[d] = self.first_live_outgoing(d, d_outgoing.iter());
        }

        self.vertex_edge[v2] = INVALID;
        self.vertex_removed[v2] = true;

        let v2_quadric = self.quadrics[v2];
        self.positions[v1] = new_pos;
        self.quadrics[v1] += v2_quadric;

        if let Some(ref mut normals) = self.normals {
            let avg = (normals[v1] + normals[v2]).normalize();
            if avg.iter().all(|x| x.is_finite()) {
                normals[v1] = avg;
            }
        }

        if let Some(ref mut colors) = self.colors {
            let c1 = colors[v1];
            let c2 = colors[v2];
            colors[v1] = [
                ((c1[0] as u16 + c2[0] as u16) / 2) as u8,
                ((c1[1] as u16 + c2[1] as u16) / 2) as u8,
                ((c1[2] as u16 + c2[2] as u16) / 2) as u8,
            ];
        }

        true
    }

    fn remove_face(&mut self, fi: usize, edges: [usize; 3]) {
        for he in edges {
            self.half_edges[he].face = INVALID;
        }
        self.face_edge[fi] = INVALID;
        self.active_face_count -= 1;
    }

    fn is_live_outgoing(&self, he: usize, v: usize) -> bool {
        self.half_edges[he].face != INVALID && self.source(he) == v
    }

    /// Pick a surviving outgoing half-edge among `candidates`, scanning the
    /// whole mesh when none survive (locked vertices have unseen fans).
    fn first_live_outgoing<'a>(&self, v: usize, candidates: impl Iterator<Item = &'a usize>) -> usize {
        candidates
            .copied()
            .find(|&he| self.is_live_outgoing(he, v))
            .or_else(|| (0..self.half_edges.len()).find(|&he| self.is_live_outgoing(he, v)))
            .unwrap_or(INVALID)
    }

    pub fn to_triangle_mesh(&self) -> TriangleMesh {
        let mut old_to_new = vec![INVALID; self.positions.len()];
        let mut new_positions = Vec::new();
        let mut new_normals = Vec::new();
        let mut new_colors = Vec::new();

        for i in 0..self.positions.len() {
            if !self.is_alive(i) {
                continue;
            }
            old_to_new[i] = new_positions.len();
            new_positions.push(self.positions[i]);
            if let Some(ref normals) = self.normals {
                new_normals.push(normals[i]);
            }
            if let Some(ref colors) = self.colors {
                new_colors.push(colors[i]);
            }
        }

        let new_faces = (0..self.face_edge.len())
            .filter_map(|fi| self.face_vertices(fi))
            .map(|f| f.map(|v| old_to_new[v]))
            .filter(|f| {
                !f.contains(&INVALID) && f[0] != f[1] && f[1] != f[2] && f[2] != f[0]
            })
            .collect();

        let mut mesh = TriangleMesh::from_vertices_and_faces(new_positions, new_faces);
        if self.normals.is_some() {
            mesh.set_normals(new_normals);
        }
        if self.colors.is_some() {
            mesh.set_colors(new_colors);
        }
        mesh
    }
}

fn well_shaped_normal(p: &[Point3f; 3]) -> Option<Vector3<f64>> {
    let v = p.map(|q| Vector3::new(q.x as f64, q.y as f64, q.z as f64));
    let e = [v[1] - v[0], v[2] - v[1], v[0] - v[2]];
    let longest = e.iter().map(|x| x.norm_squared()).fold(0.0, f64::max);
    let cross = e[0].cross(&(v[2] - v[0]));
    if longest == 0.0 || cross.norm() <= MIN_SHAPE_RATIO * longest {
        return None;
    }
    Some(cross.normalize())
}
