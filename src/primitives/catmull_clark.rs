//! Control point neighbourhoods of subdivision patches, as consumed by tessellation.

use assert2::debug_assert;

use crate::{
    geometry::{FloatType, WorldBox, WorldPoint},
    scene::{GeomId, HalfEdge},
};

use super::SubdivPatch;

/// A vertex with its one-ring: for each outgoing edge the vertex at the other end
/// of the edge followed by the vertex diagonally across the face.
/// Border vertices have one more edge than faces, the extra edge vertex closes the ring.
#[derive(Clone, Debug, PartialEq)]
pub struct CatmullClark1Ring {
    pub vertex: WorldPoint,
    pub ring: Vec<WorldPoint>,
    /// Crease weights of the outgoing edges, in ring order
    pub crease_weights: Vec<FloatType>,
    pub vertex_crease_weight: FloatType,
    /// Number of edges incident to the vertex
    pub valence: usize,
    /// Position in `ring` of the edge vertex that lies on the border
    pub border_index: Option<usize>,
}

impl CatmullClark1Ring {
    /// Collects the one-ring around the start vertex of the half-edge, of any valence.
    pub fn init(h: HalfEdge<'_>, vertices: &[WorldPoint]) -> CatmullClark1Ring {
        let mut ret = CatmullClark1Ring {
            vertex: vertices[h.start_vertex_index()],
            ring: Vec::with_capacity(8),
            crease_weights: Vec::with_capacity(4),
            vertex_crease_weight: h.vertex_crease_weight(),
            valence: 0,
            border_index: None,
        };

        let mut last = h;
        for edge in h.one_ring() {
            ret.ring.push(vertices[edge.end_vertex_index()]);
            ret.ring.push(vertices[edge.next().next().start_vertex_index()]);
            ret.crease_weights.push(edge.edge_crease_weight());
            ret.valence += 1;
            last = edge;
        }

        let incoming = last.prev();
        if incoming.try_opposite().is_none() {
            ret.border_index = Some(ret.ring.len());
            ret.ring.push(vertices[incoming.start_vertex_index()]);
            ret.crease_weights.push(incoming.edge_crease_weight());
            ret.valence += 1;
        }

        ret
    }

    pub fn has_border(&self) -> bool {
        self.border_index.is_some()
    }

    pub fn edge_vertices(&self) -> impl Iterator<Item = &WorldPoint> {
        self.ring.iter().step_by(2)
    }

    pub fn face_vertices(&self) -> impl Iterator<Item = &WorldPoint> {
        self.ring.iter().skip(1).step_by(2)
    }

    pub fn bounds(&self) -> WorldBox {
        let mut ret = WorldBox::new(self.vertex, self.vertex);
        for p in self.ring.iter() {
            ret.include_point(p);
        }
        ret
    }
}

/// Neighbourhood of a face of arbitrary topology: one ring for each of its corners.
#[derive(Clone, Debug, PartialEq)]
pub struct IrregularCatmullClarkPatch {
    pub rings: [CatmullClark1Ring; 4],
    pub geom_id: GeomId,
    pub prim_id: u32,
}

impl IrregularCatmullClarkPatch {
    pub fn bounds(&self) -> WorldBox {
        self.rings
            .iter()
            .map(|ring| ring.bounds())
            .reduce(|a, b| a.union(&b))
            .unwrap_or_else(WorldBox::empty)
    }
}

impl From<&SubdivPatch<'_>> for IrregularCatmullClarkPatch {
    fn from(patch: &SubdivPatch<'_>) -> Self {
        let edges = patch.first_half_edge().face_edges();
        IrregularCatmullClarkPatch {
            rings: edges.map(|h| CatmullClark1Ring::init(h, patch.vertices())),
            geom_id: patch.geom_id(),
            prim_id: patch.prim_id(),
        }
    }
}

/// Regular 4x4 control point grid of a B-spline patch.
/// The centre 2x2 points are the vertices of the face itself.
#[derive(Clone, Debug, PartialEq)]
pub struct RegularCatmullClarkPatch {
    pub v: [[WorldPoint; 4]; 4],
}

/// Grid cells filled from the diagonal neighbour face of each corner, in the order of
/// the face's vertices starting at the corner.
const CORNER_CELLS: [[(usize, usize); 4]; 4] = [
    [(1, 1), (1, 0), (0, 0), (0, 1)],
    [(1, 2), (0, 2), (0, 3), (1, 3)],
    [(2, 2), (2, 3), (3, 3), (3, 2)],
    [(2, 1), (3, 1), (3, 0), (2, 0)],
];

impl From<&SubdivPatch<'_>> for RegularCatmullClarkPatch {
    /// Only valid for regular patches (all four corners interior, valence 4).
    fn from(patch: &SubdivPatch<'_>) -> Self {
        debug_assert!(patch.is_regular());

        let vertices = patch.vertices();
        let mut v = [[WorldPoint::origin(); 4]; 4];

        for (corner, cells) in patch.first_half_edge().face_edges().iter().zip(CORNER_CELLS) {
            let mut e = corner.half_circle();
            for (row, col) in cells {
                v[row][col] = vertices[e.start_vertex_index()];
                e = e.next();
            }
        }

        RegularCatmullClarkPatch { v }
    }
}

impl RegularCatmullClarkPatch {
    pub fn bounds(&self) -> WorldBox {
        WorldBox::from_points(self.v.iter().flatten()).unwrap_or_else(WorldBox::empty)
    }
}
