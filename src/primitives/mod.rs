//! Leaf primitive records and the builders that produce them.

mod bezier_curve;
mod catmull_clark;
mod subdiv_patch;
mod triangle;

pub use bezier_curve::{CurveSegment, HairBuilder};
pub use catmull_clark::{CatmullClark1Ring, IrregularCatmullClarkPatch, RegularCatmullClarkPatch};
pub use subdiv_patch::{PatchFlags, SubdivPatch, SubdivPatchBuilder};
pub use triangle::{Triangle8, TriangleBuilder, TriangleIntersector};

use std::ops::Range;

use crate::{
    geometry::WorldBox,
    scene::{GeomId, Geometry, Scene},
};

/// Storage descriptor of a primitive kind, implemented by the leaf block type itself.
///
/// The builder only ever sizes leaf storage through `blocks_for`, so one block may
/// hold several primitives.
pub trait PrimitiveType: Send + Sync + Sized {
    /// Number of blocks needed to store `count` primitives in a single leaf
    fn blocks_for(count: usize) -> usize;

    /// Size of one stored block in bytes
    fn block_size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Number of primitives stored in this block
    fn primitive_count(&self) -> usize {
        1
    }

    fn bounds(&self) -> WorldBox;

    /// Block is the last one of its leaf (only set in list mode)
    fn is_last(&self) -> bool;
}

/// Bit of the packed primitive id marking the last record of a list mode leaf
const LAST_BIT: u32 = 1 << 31;

/// Primitive id with the last-in-list marker packed into the top bit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct PackedPrimId(u32);

impl PackedPrimId {
    pub fn new(prim_id: u32, last: bool) -> PackedPrimId {
        assert!(prim_id & LAST_BIT == 0, "Primitive id {prim_id} collides with the last marker");
        PackedPrimId(prim_id | if last { LAST_BIT } else { 0 })
    }

    pub fn prim_id(&self) -> u32 {
        self.0 & !LAST_BIT
    }

    pub fn is_last(&self) -> bool {
        self.0 & LAST_BIT != 0
    }
}

/// Global numbering of the primitives of all geometries of one kind in a scene.
///
/// Primitive `i` of the n-th matching geometry has global index
/// `i + sum of primitive counts of the previous matching geometries`.
#[derive(Clone, Debug, Default)]
pub(crate) struct GeometryRanges {
    entries: Vec<(GeomId, Range<usize>)>,
    total: usize,
}

impl GeometryRanges {
    /// `count` returns the number of primitives of a geometry, or None if the geometry
    /// is of some other kind.
    pub fn new(scene: &Scene, mut count: impl FnMut(&Geometry) -> Option<usize>) -> GeometryRanges {
        let mut ret = GeometryRanges::default();
        for (geom_id, geometry) in scene.geometries() {
            if let Some(n) = count(geometry) {
                ret.entries.push((geom_id, ret.total..ret.total + n));
                ret.total += n;
            }
        }
        ret
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Splits a global index range into local primitive ranges of individual geometries.
    pub fn split(&self, range: Range<usize>) -> impl Iterator<Item = (GeomId, Range<usize>)> + '_ {
        self.entries.iter().filter_map(move |(geom_id, global)| {
            let start = global.start.max(range.start);
            let end = global.end.min(range.end);
            (start < end).then(|| (*geom_id, start - global.start..end - global.start))
        })
    }
}
