use std::iter::Peekable;

use arrayvec::ArrayVec;
use simba::simd::{SimdBool as _, SimdValue as _};

use crate::{
    bvh::{
        BuildError, BuildSettings, LeafIntersector, PrimRef, PrimRefWriter, PrimitiveBuilder,
        fill_blocks,
    },
    geometry::{INVALID_ID, PACKET_SIZE, RayPacket, Triangle, WorldBox, WorldPoint, WorldPoint8},
    scene::{GeomId, Geometry, Scene, SceneError, TriangleMesh},
    util::{bit_iter, simba::simd_windows},
};

use super::{GeometryRanges, PrimitiveType};

/// Polygon leaf block: up to eight triangles in structure-of-arrays layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Triangle8 {
    triangles: Triangle<WorldPoint8>,
    geom_ids: [u32; PACKET_SIZE],
    prim_ids: [u32; PACKET_SIZE],
    /// Lanes holding a triangle
    valid: u64,
    last: bool,
}

/// One lane of a `Triangle8` before packing
type TriangleLane = (Triangle<WorldPoint>, GeomId, u32);

impl Triangle8 {
    /// Packs up to eight triangles, remaining lanes are invalid.
    /// Panics if `lanes` is empty.
    fn new(lanes: &[TriangleLane], last: bool) -> Triangle8 {
        let (triangles, mask) = simd_windows::<Triangle<WorldPoint8>>(
            lanes.iter().map(|(triangle, _, _)| triangle.clone()),
        )
        .next()
        .expect("A triangle block needs at least one triangle");

        let mut geom_ids = [INVALID_ID; PACKET_SIZE];
        let mut prim_ids = [INVALID_ID; PACKET_SIZE];
        for (i, (_, geom_id, prim_id)) in lanes.iter().enumerate() {
            geom_ids[i] = geom_id.raw();
            prim_ids[i] = *prim_id;
        }

        Triangle8 {
            triangles,
            geom_ids,
            prim_ids,
            valid: mask.bitmask(),
            last,
        }
    }

    /// Creates a block from up to eight next references of a stream.
    /// The block is marked as last in list mode if the stream ends after it.
    /// Panics if the stream is empty.
    pub fn fill_from_iter<'r, I>(
        prims: &mut Peekable<I>,
        scene: &Scene,
        list: bool,
    ) -> Result<Triangle8, SceneError>
    where
        I: Iterator<Item = &'r PrimRef>,
    {
        let lanes = resolve_lanes(prims.by_ref().take(PACKET_SIZE), scene)?;
        let last = list && prims.peek().is_none();
        Ok(Triangle8::new(&lanes, last))
    }

    /// Creates a block from up to eight references starting at `prims[*i]`, never
    /// reading past `end`, and advances `i`.
    /// The block is marked as last in list mode if `i` reaches `end`.
    pub fn fill_from_slice(
        prims: &[PrimRef],
        i: &mut usize,
        end: usize,
        scene: &Scene,
        list: bool,
    ) -> Result<Triangle8, SceneError> {
        let count = (end - *i).min(PACKET_SIZE);
        let lanes = resolve_lanes(prims[*i..*i + count].iter(), scene)?;
        *i += count;
        Ok(Triangle8::new(&lanes, list && *i >= end))
    }

    pub fn triangles(&self) -> &Triangle<WorldPoint8> {
        &self.triangles
    }

    /// Bit mask of lanes holding a triangle
    pub fn valid_lanes(&self) -> u64 {
        self.valid
    }

    /// Geometry id of a lane, None for invalid lanes
    pub fn geom_id(&self, lane: usize) -> Option<GeomId> {
        (self.valid & (1 << lane) != 0).then(|| GeomId::from_raw(self.geom_ids[lane]))
    }

    /// Primitive id of a lane, None for invalid lanes
    pub fn prim_id(&self, lane: usize) -> Option<u32> {
        (self.valid & (1 << lane) != 0).then_some(self.prim_ids[lane])
    }
}

fn resolve_lanes<'r>(
    prims: impl Iterator<Item = &'r PrimRef>,
    scene: &Scene,
) -> Result<ArrayVec<TriangleLane, PACKET_SIZE>, SceneError> {
    let mut ret = ArrayVec::new();
    for prim in prims.take(PACKET_SIZE) {
        let mesh = scene.triangle_mesh(prim.geom_id)?;
        ret.push((triangle(prim.geom_id, mesh, prim.prim_id)?, prim.geom_id, prim.prim_id));
    }
    Ok(ret)
}

fn triangle(geom_id: GeomId, mesh: &TriangleMesh, prim_id: u32) -> Result<Triangle<WorldPoint>, SceneError> {
    mesh.triangle(prim_id as usize)
        .ok_or(SceneError::PrimitiveOutOfRange {
            geom_id: geom_id.raw(),
            prim_id,
        })
}

impl PrimitiveType for Triangle8 {
    fn blocks_for(count: usize) -> usize {
        count.div_ceil(PACKET_SIZE)
    }

    fn primitive_count(&self) -> usize {
        self.valid.count_ones() as usize
    }

    fn bounds(&self) -> WorldBox {
        bit_iter(self.valid).fold(WorldBox::empty(), |acc, lane| {
            acc.union(&self.triangles.extract(lane).bounds())
        })
    }

    fn is_last(&self) -> bool {
        self.last
    }
}

/// Closest hit intersection of ray packets with triangle blocks.
///
/// Writes distance, barycentric coordinates, geometric normal and ids of the hit
/// triangle into the lane.
#[derive(Copy, Clone, Debug, Default)]
pub struct TriangleIntersector;

impl LeafIntersector<Triangle8> for TriangleIntersector {
    fn intersect(&self, packet: &mut RayPacket, active: u64, blocks: &[Triangle8]) {
        for lane in bit_iter(active) {
            let mut ray = packet.extract(lane);
            let mut hit = false;

            for block in blocks {
                let hits = block.triangles.intersect(&ray);
                for i in bit_iter(hits.mask.bitmask() & block.valid) {
                    let t = hits.t.extract(i);
                    if t > ray.t_far {
                        continue;
                    }
                    ray.t_far = t;
                    ray.uv = hits.uv.extract(i);
                    ray.normal = block.triangles.normals().map(|x| x.extract(i));
                    ray.geom_id = block.geom_ids[i];
                    ray.prim_id = block.prim_ids[i];
                    hit = true;
                }
            }

            if hit {
                packet.replace(lane, ray);
            }
        }
    }
}

/// Builds a BVH over the triangle meshes of a scene, eight triangles per block.
#[derive(Debug)]
pub struct TriangleBuilder<'s> {
    scene: &'s Scene,
    ranges: GeometryRanges,
}

impl<'s> TriangleBuilder<'s> {
    pub fn new(scene: &'s Scene) -> TriangleBuilder<'s> {
        TriangleBuilder {
            scene,
            ranges: GeometryRanges::new(scene, |geometry| match geometry {
                Geometry::TriangleMesh(mesh) => Some(mesh.triangle_count()),
                _ => None,
            }),
        }
    }
}

impl PrimitiveBuilder for TriangleBuilder<'_> {
    type Primitive = Triangle8;

    fn builder_name(&self) -> &'static str {
        "triangles"
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
        for (geom_id, triangle_indices) in self.ranges.split(range) {
            let mesh = self.scene.triangle_mesh(geom_id)?;
            for prim_id in triangle_indices {
                let prim_id = prim_id as u32;
                let bounds = triangle(geom_id, mesh, prim_id)?.bounds();
                writer.push(PrimRef::new(bounds, geom_id, prim_id))?;
            }
        }
        Ok(())
    }

    fn create_leaf(
        &self,
        settings: &BuildSettings,
        refs: &[PrimRef],
        out: &mut [Option<Triangle8>],
    ) -> Result<(), BuildError> {
        fill_blocks(refs, out, |prims| {
            Ok(Triangle8::fill_from_iter(prims, self.scene, settings.list_mode)?)
        })
    }
}
