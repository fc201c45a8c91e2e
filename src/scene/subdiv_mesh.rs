use index_vec::IndexVec;
use indexmap::IndexMap;

use crate::geometry::{FloatType, WorldPoint};

use super::SceneError;

/// Number of half-edges of a face, only quad meshes are supported
const FACE_EDGES: usize = 4;

index_vec::define_index_type! {
    pub struct HalfEdgeIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

#[derive(Clone, Debug)]
struct HalfEdgeData {
    start_vertex: u32,
    opposite: Option<HalfEdgeIdx>,
    crease_weight: FloatType,
}

/// Quad-only subdivision surface control mesh in half-edge representation.
///
/// Half-edges of face `f` are stored at indices `4f..4f + 4`, in the order of
/// the face's vertices, so `next` and `prev` never need a lookup.
#[derive(Clone, Debug)]
pub struct SubdivMesh {
    vertices: Vec<WorldPoint>,
    vertex_creases: Vec<FloatType>,
    half_edges: IndexVec<HalfEdgeIdx, HalfEdgeData>,
    /// Half-edge for every directed edge `(from, to)`
    edge_lookup: IndexMap<(u32, u32), HalfEdgeIdx>,
}

impl SubdivMesh {
    /// Creates the mesh from vertex positions and quads of vertex indices.
    /// All faces must be consistently oriented and every directed edge may be used only once.
    pub fn new(vertices: Vec<WorldPoint>, faces: &[[u32; 4]]) -> Result<SubdivMesh, SceneError> {
        let mut half_edges: IndexVec<HalfEdgeIdx, HalfEdgeData> = IndexVec::with_capacity(faces.len() * FACE_EDGES);
        let mut edge_lookup = IndexMap::with_capacity(faces.len() * FACE_EDGES);

        for face in faces {
            for (i, &from) in face.iter().enumerate() {
                let to = face[(i + 1) % FACE_EDGES];
                for index in [from, to] {
                    if index as usize >= vertices.len() {
                        return Err(SceneError::VertexOutOfRange {
                            index,
                            count: vertices.len(),
                        });
                    }
                }

                let idx = half_edges.push(HalfEdgeData {
                    start_vertex: from,
                    opposite: None,
                    crease_weight: 0.0,
                });
                if edge_lookup.insert((from, to), idx).is_some() {
                    return Err(SceneError::NonManifoldEdge { from, to });
                }
            }
        }

        for (&(from, to), &idx) in edge_lookup.iter() {
            half_edges[idx].opposite = edge_lookup.get(&(to, from)).copied();
        }

        Ok(SubdivMesh {
            vertex_creases: vec![0.0; vertices.len()],
            vertices,
            half_edges,
            edge_lookup,
        })
    }

    /// Sets crease weight of the edge between two vertices (both half-edges).
    pub fn set_edge_crease(&mut self, a: u32, b: u32, weight: FloatType) -> Result<(), SceneError> {
        let mut found = false;
        for key in [(a, b), (b, a)] {
            if let Some(&idx) = self.edge_lookup.get(&key) {
                self.half_edges[idx].crease_weight = weight;
                found = true;
            }
        }

        if found {
            Ok(())
        } else {
            Err(SceneError::UnknownEdge { from: a, to: b })
        }
    }

    pub fn set_vertex_crease(&mut self, vertex: u32, weight: FloatType) -> Result<(), SceneError> {
        let count = self.vertices.len();
        let crease = self
            .vertex_creases
            .get_mut(vertex as usize)
            .ok_or(SceneError::VertexOutOfRange {
                index: vertex,
                count,
            })?;
        *crease = weight;
        Ok(())
    }

    pub fn face_count(&self) -> usize {
        self.half_edges.len() / FACE_EDGES
    }

    pub fn vertex_positions(&self) -> &[WorldPoint] {
        &self.vertices
    }

    /// First half-edge of a face, None if the face doesn't exist.
    pub fn half_edge_for_face(&self, face: usize) -> Option<HalfEdge<'_>> {
        if face < self.face_count() {
            Some(self.half_edge(HalfEdgeIdx::from_usize(face * FACE_EDGES)))
        } else {
            None
        }
    }

    pub fn half_edge(&self, index: HalfEdgeIdx) -> HalfEdge<'_> {
        assert!(index.index() < self.half_edges.len());
        HalfEdge { mesh: self, index }
    }
}

/// Borrowed handle to a half-edge of a `SubdivMesh`.
/// All navigation is a pure query on the mesh topology.
#[derive(Copy, Clone)]
pub struct HalfEdge<'m> {
    mesh: &'m SubdivMesh,
    index: HalfEdgeIdx,
}

/// What a walk around a vertex found
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VertexFan {
    /// Number of faces visited
    pub faces: usize,
    /// The walk stopped at an edge without opposite
    pub border: bool,
    /// Some edge or the vertex itself has non-zero crease weight
    pub creased: bool,
}

impl VertexFan {
    /// Interior vertex of valence 4 without creases.
    pub fn is_regular(&self) -> bool {
        self.faces == 4 && !self.border && !self.creased
    }
}

impl<'m> HalfEdge<'m> {
    fn data(&self) -> &'m HalfEdgeData {
        &self.mesh.half_edges[self.index]
    }

    fn with_index(&self, index: usize) -> HalfEdge<'m> {
        HalfEdge {
            mesh: self.mesh,
            index: HalfEdgeIdx::from_usize(index),
        }
    }

    pub fn index(&self) -> HalfEdgeIdx {
        self.index
    }

    pub fn mesh(&self) -> &'m SubdivMesh {
        self.mesh
    }

    pub fn face(&self) -> usize {
        self.index.index() / FACE_EDGES
    }

    pub fn next(&self) -> HalfEdge<'m> {
        let base = self.face() * FACE_EDGES;
        self.with_index(base + (self.index.index() - base + 1) % FACE_EDGES)
    }

    pub fn prev(&self) -> HalfEdge<'m> {
        let base = self.face() * FACE_EDGES;
        self.with_index(base + (self.index.index() - base + FACE_EDGES - 1) % FACE_EDGES)
    }

    /// The half-edge going the opposite direction in the neighbouring face,
    /// None on a border.
    pub fn try_opposite(&self) -> Option<HalfEdge<'m>> {
        self.data().opposite.map(|index| HalfEdge {
            mesh: self.mesh,
            index,
        })
    }

    /// The half-edge going the opposite direction in the neighbouring face.
    /// Panics on border edges, callers must only use it on closed neighbourhoods.
    pub fn opposite(&self) -> HalfEdge<'m> {
        self.try_opposite()
            .expect("Half-edge navigation crossed a mesh border")
    }

    /// Next half-edge leaving the same start vertex, in the neighbouring face.
    /// None on a border.
    pub fn rotate(&self) -> Option<HalfEdge<'m>> {
        self.try_opposite().map(|h| h.next())
    }

    /// Half-edge leaving the same start vertex in the face diagonally across the vertex.
    /// Only meaningful around valence 4 vertices.
    pub fn half_circle(&self) -> HalfEdge<'m> {
        self.opposite().next().opposite().next()
    }

    pub fn start_vertex_index(&self) -> usize {
        self.data().start_vertex as usize
    }

    pub fn end_vertex_index(&self) -> usize {
        self.next().start_vertex_index()
    }

    pub fn start_vertex(&self) -> &'m WorldPoint {
        &self.mesh.vertices[self.start_vertex_index()]
    }

    pub fn edge_crease_weight(&self) -> FloatType {
        self.data().crease_weight
    }

    pub fn vertex_crease_weight(&self) -> FloatType {
        self.mesh.vertex_creases[self.start_vertex_index()]
    }

    /// Half-edges leaving the start vertex, each one following `prev().opposite()` of
    /// the previous one. Starts at a border edge if the vertex lies on a border, so
    /// that all faces around the vertex are visited.
    pub fn one_ring(&self) -> impl Iterator<Item = HalfEdge<'m>> + use<'m> {
        // Walks are bounded by the number of half-edges in case the mesh is not a manifold
        let limit = self.mesh.half_edges.len();

        let mut start = *self;
        for _ in 0..limit {
            match start.rotate() {
                None => break,
                Some(next) if next == *self => {
                    start = *self;
                    break;
                }
                Some(next) => start = next,
            }
        }

        let mut current = Some(start);
        let mut steps = 0;
        std::iter::from_fn(move || {
            let h = current?;
            steps += 1;
            current = h
                .prev()
                .try_opposite()
                .filter(|next| *next != start && steps < limit);
            Some(h)
        })
    }

    /// Walks around the start vertex, collecting its topology.
    pub fn vertex_fan(&self) -> VertexFan {
        let mut ret = VertexFan {
            faces: 0,
            border: false,
            creased: self.vertex_crease_weight() > 0.0,
        };

        let mut last = *self;
        for h in self.one_ring() {
            ret.faces += 1;
            ret.creased |= h.edge_crease_weight() > 0.0;
            last = h;
        }

        // The ring ends at the other border edge, which is incoming to the vertex
        let incoming = last.prev();
        if incoming.try_opposite().is_none() {
            ret.border = true;
            ret.creased |= incoming.edge_crease_weight() > 0.0;
        }

        ret
    }

    pub fn is_regular_vertex(&self) -> bool {
        self.vertex_fan().is_regular()
    }

    /// Half-edges of this face, starting with self.
    pub fn face_edges(&self) -> [HalfEdge<'m>; 4] {
        let e1 = self.next();
        let e2 = e1.next();
        [*self, e1, e2, e2.next()]
    }

    /// Vertex fans of the four corners of this face, in `face_edges` order.
    pub fn face_fans(&self) -> [VertexFan; 4] {
        self.face_edges().map(|h| h.vertex_fan())
    }

    /// All four vertices of the face are regular.
    pub fn is_face_regular(&self) -> bool {
        self.face_fans().iter().all(VertexFan::is_regular)
    }

    /// Some vertex of the face lies on a mesh border.
    pub fn face_has_borders(&self) -> bool {
        self.face_fans().iter().any(|fan| fan.border)
    }

    /// Some vertex of the face or an edge around it is creased.
    pub fn face_has_creases(&self) -> bool {
        self.face_fans().iter().any(|fan| fan.creased)
    }
}

impl PartialEq for HalfEdge<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.mesh, other.mesh) && self.index == other.index
    }
}

impl std::fmt::Debug for HalfEdge<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HalfEdge")
            .field("index", &self.index)
            .field("start_vertex", &self.data().start_vertex)
            .field("opposite", &self.data().opposite)
            .finish()
    }
}
