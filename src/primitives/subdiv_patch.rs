use std::iter::Peekable;

use crate::{
    bvh::{BuildError, BuildSettings, PrimRef, PrimRefWriter, PrimitiveBuilder, fill_blocks},
    geometry::{WorldBox, WorldPoint},
    scene::{GeomId, Geometry, HalfEdge, Scene, SceneError, SubdivMesh, VertexFan},
};

use super::{GeometryRanges, PackedPrimId, PrimitiveType};

/// Topology summary of a patch, computed when the patch is filled.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PatchFlags(u8);

impl PatchFlags {
    pub const REGULAR: PatchFlags = PatchFlags(1);
    pub const HAS_BORDERS: PatchFlags = PatchFlags(2);
    pub const HAS_CREASES: PatchFlags = PatchFlags(4);

    pub fn empty() -> PatchFlags {
        PatchFlags(0)
    }

    pub fn contains(&self, other: PatchFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for PatchFlags {
    type Output = PatchFlags;

    fn bitor(self, rhs: PatchFlags) -> PatchFlags {
        PatchFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for PatchFlags {
    fn bitor_assign(&mut self, rhs: PatchFlags) {
        self.0 |= rhs.0
    }
}

/// Leaf record of a subdivision surface: one quad face of a control mesh.
///
/// The patch borrows the mesh, tessellation reads the neighbourhood through
/// `first_half_edge` when the patch is hit.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SubdivPatch<'s> {
    first_half_edge: HalfEdge<'s>,
    vertices: &'s [WorldPoint],
    geom_id: GeomId,
    prim: PackedPrimId,
    flags: PatchFlags,
    subdivision_level: u32,
}

impl<'s> SubdivPatch<'s> {
    /// Panics if `prim_id` doesn't fit into 31 bits.
    pub fn new(
        first_half_edge: HalfEdge<'s>,
        vertices: &'s [WorldPoint],
        geom_id: GeomId,
        prim_id: u32,
        subdivision_level: u32,
        last: bool,
    ) -> SubdivPatch<'s> {
        let fans = first_half_edge.face_fans();
        let mut flags = PatchFlags::empty();
        if fans.iter().all(VertexFan::is_regular) {
            flags |= PatchFlags::REGULAR;
        }
        if fans.iter().any(|fan| fan.border) {
            flags |= PatchFlags::HAS_BORDERS;
        }
        if fans.iter().any(|fan| fan.creased) {
            flags |= PatchFlags::HAS_CREASES;
        }

        SubdivPatch {
            first_half_edge,
            vertices,
            geom_id,
            prim: PackedPrimId::new(prim_id, last),
            flags,
            subdivision_level,
        }
    }

    /// Creates the patch from the next reference of a stream.
    /// The patch is marked as last in list mode if the stream ends after it.
    /// Panics if the stream is empty.
    pub fn fill_from_iter<'r, I>(
        prims: &mut Peekable<I>,
        scene: &'s Scene,
        list: bool,
        subdivision_level: u32,
    ) -> Result<SubdivPatch<'s>, SceneError>
    where
        I: Iterator<Item = &'r PrimRef>,
    {
        let prim = prims
            .next()
            .expect("Filling a patch needs a primitive reference");
        let last = list && prims.peek().is_none();
        Self::from_prim_ref(prim, scene, last, subdivision_level)
    }

    /// Creates the patch from `prims[*i]` and advances `i`.
    /// The patch is marked as last in list mode if `i` reaches `end`.
    pub fn fill_from_slice(
        prims: &[PrimRef],
        i: &mut usize,
        end: usize,
        scene: &'s Scene,
        list: bool,
        subdivision_level: u32,
    ) -> Result<SubdivPatch<'s>, SceneError> {
        let prim = &prims[*i];
        *i += 1;
        Self::from_prim_ref(prim, scene, list && *i >= end, subdivision_level)
    }

    fn from_prim_ref(
        prim: &PrimRef,
        scene: &'s Scene,
        last: bool,
        subdivision_level: u32,
    ) -> Result<SubdivPatch<'s>, SceneError> {
        let mesh = scene.subdiv_mesh(prim.geom_id)?;
        let first_half_edge = face_half_edge(prim.geom_id, mesh, prim.prim_id)?;
        Ok(SubdivPatch::new(
            first_half_edge,
            mesh.vertex_positions(),
            prim.geom_id,
            prim.prim_id,
            subdivision_level,
            last,
        ))
    }

    pub fn first_half_edge(&self) -> HalfEdge<'s> {
        self.first_half_edge
    }

    pub fn vertices(&self) -> &'s [WorldPoint] {
        self.vertices
    }

    pub fn geom_id(&self) -> GeomId {
        self.geom_id
    }

    pub fn prim_id(&self) -> u32 {
        self.prim.prim_id()
    }

    pub fn flags(&self) -> PatchFlags {
        self.flags
    }

    pub fn is_regular(&self) -> bool {
        self.flags.contains(PatchFlags::REGULAR)
    }

    pub fn subdivision_level(&self) -> u32 {
        self.subdivision_level
    }
}

impl PrimitiveType for SubdivPatch<'_> {
    fn blocks_for(count: usize) -> usize {
        count
    }

    /// Bounds of all faces around the corners of the patch, the control points
    /// that influence the limit surface.
    fn bounds(&self) -> WorldBox {
        neighbourhood_bounds(self.first_half_edge)
    }

    fn is_last(&self) -> bool {
        self.prim.is_last()
    }
}

fn neighbourhood_bounds(first_half_edge: HalfEdge<'_>) -> WorldBox {
    let mut ret = WorldBox::empty();
    for corner in first_half_edge.face_edges() {
        for h in corner.one_ring() {
            for e in h.face_edges() {
                ret.include_point(e.start_vertex());
            }
        }
    }
    ret
}

fn face_half_edge<'m>(
    geom_id: GeomId,
    mesh: &'m SubdivMesh,
    face: u32,
) -> Result<HalfEdge<'m>, SceneError> {
    mesh.half_edge_for_face(face as usize)
        .ok_or(SceneError::PrimitiveOutOfRange {
            geom_id: geom_id.raw(),
            prim_id: face,
        })
}

/// Builds a BVH over the faces of all subdivision meshes of a scene.
#[derive(Debug)]
pub struct SubdivPatchBuilder<'s> {
    scene: &'s Scene,
    ranges: GeometryRanges,
}

impl<'s> SubdivPatchBuilder<'s> {
    pub fn new(scene: &'s Scene) -> SubdivPatchBuilder<'s> {
        SubdivPatchBuilder {
            scene,
            ranges: GeometryRanges::new(scene, |geometry| match geometry {
                Geometry::SubdivMesh(mesh) => Some(mesh.face_count()),
                _ => None,
            }),
        }
    }
}

impl<'s> PrimitiveBuilder for SubdivPatchBuilder<'s> {
    type Primitive = SubdivPatch<'s>;

    fn builder_name(&self) -> &'static str {
        "subdivision patches"
    }

    fn primitive_count(&self) -> usize {
        self.ranges.total()
    }

    fn compute_prim_refs(
        &self,
        _settings: &BuildSettings,
        writer: &mut PrimRefWriter<'_>,
    ) -> Result<(), BuildError> {
        let range = writer.task().range(self.ranges.total());
        for (geom_id, faces) in self.ranges.split(range) {
            let mesh = self.scene.subdiv_mesh(geom_id)?;
            for face in faces {
                let h = face_half_edge(geom_id, mesh, face as u32)?;
                writer.push(PrimRef::new(neighbourhood_bounds(h), geom_id, face as u32))?;
            }
        }
        Ok(())
    }

    fn create_leaf(
        &self,
        settings: &BuildSettings,
        refs: &[PrimRef],
        out: &mut [Option<SubdivPatch<'s>>],
    ) -> Result<(), BuildError> {
        fill_blocks(refs, out, |prims| {
            Ok(SubdivPatch::fill_from_iter(
                prims,
                self.scene,
                settings.list_mode,
                settings.subdivision_level,
            )?)
        })
    }
}
