//! Hair: cubic bezier curves, optionally split into several segments along the parameter.

use std::iter::Peekable;

use crate::{
    bvh::{BuildError, BuildSettings, PrimRef, PrimRefWriter, PrimitiveBuilder, fill_blocks},
    geometry::{FloatType, WorldBox},
    scene::{BezierCurves, CurveVertex, GeomId, Geometry, Scene, SceneError},
};

use super::{GeometryRanges, PackedPrimId, PrimitiveType};

/// Bits of `PrimRef::sub_id` holding the piece index, the piece count is stored above them.
const PIECE_BITS: u32 = 16;
const PIECE_MASK: u32 = (1 << PIECE_BITS) - 1;

/// Leaf record of a hair: the part of a curve between parameters `t0` and `t1`,
/// with its own bezier control points.
#[derive(Clone, Debug, PartialEq)]
pub struct CurveSegment {
    control_points: [CurveVertex; 4],
    t0: FloatType,
    t1: FloatType,
    geom_id: GeomId,
    prim: PackedPrimId,
}

impl CurveSegment {
    /// Segment of the curve given by `control_points` between parameters `t0` and `t1`.
    /// Panics if `prim_id` doesn't fit into 31 bits.
    pub fn new(
        control_points: &[CurveVertex; 4],
        t0: FloatType,
        t1: FloatType,
        geom_id: GeomId,
        prim_id: u32,
        last: bool,
    ) -> CurveSegment {
        CurveSegment {
            control_points: sub_curve(control_points, t0, t1),
            t0,
            t1,
            geom_id,
            prim: PackedPrimId::new(prim_id, last),
        }
    }

    /// Creates the segment from the next reference of a stream.
    /// The segment is marked as last in list mode if the stream ends after it.
    /// Panics if the stream is empty.
    pub fn fill_from_iter<'r, I>(
        prims: &mut Peekable<I>,
        scene: &Scene,
        list: bool,
    ) -> Result<CurveSegment, SceneError>
    where
        I: Iterator<Item = &'r PrimRef>,
    {
        let prim = prims
            .next()
            .expect("Filling a curve segment needs a primitive reference");
        let last = list && prims.peek().is_none();
        Self::from_prim_ref(prim, scene, last)
    }

    /// Creates the segment from `prims[*i]` and advances `i`.
    /// The segment is marked as last in list mode if `i` reaches `end`.
    pub fn fill_from_slice(
        prims: &[PrimRef],
        i: &mut usize,
        end: usize,
        scene: &Scene,
        list: bool,
    ) -> Result<CurveSegment, SceneError> {
        let prim = &prims[*i];
        *i += 1;
        Self::from_prim_ref(prim, scene, list && *i >= end)
    }

    fn from_prim_ref(prim: &PrimRef, scene: &Scene, last: bool) -> Result<CurveSegment, SceneError> {
        let curves = scene.curves(prim.geom_id)?;
        let control_points = curve(prim.geom_id, curves, prim.prim_id)?;
        let (t0, t1) = piece_range(prim.sub_id);
        Ok(CurveSegment::new(
            &control_points,
            t0,
            t1,
            prim.geom_id,
            prim.prim_id,
            last,
        ))
    }

    pub fn control_points(&self) -> &[CurveVertex; 4] {
        &self.control_points
    }

    /// Parameter range of the segment within its source curve
    pub fn t_range(&self) -> (FloatType, FloatType) {
        (self.t0, self.t1)
    }

    pub fn geom_id(&self) -> GeomId {
        self.geom_id
    }

    pub fn prim_id(&self) -> u32 {
        self.prim.prim_id()
    }

    /// Point on the segment, `t` in [0, 1] spans the segment only.
    pub fn point_at(&self, t: FloatType) -> CurveVertex {
        blossom(&self.control_points, [t, t, t])
    }
}

impl PrimitiveType for CurveSegment {
    fn blocks_for(count: usize) -> usize {
        count
    }

    fn bounds(&self) -> WorldBox {
        hull_bounds(&self.control_points)
    }

    fn is_last(&self) -> bool {
        self.prim.is_last()
    }
}

fn lerp(a: &CurveVertex, b: &CurveVertex, t: FloatType) -> CurveVertex {
    CurveVertex {
        position: a.position + (b.position - a.position) * t,
        radius: a.radius + (b.radius - a.radius) * t,
    }
}

/// De Casteljau evaluation with a different parameter on every level.
/// Symmetric in `u`, `blossom(p, [t, t, t])` is the curve point at `t`.
fn blossom(p: &[CurveVertex; 4], u: [FloatType; 3]) -> CurveVertex {
    let l1 = [lerp(&p[0], &p[1], u[0]), lerp(&p[1], &p[2], u[0]), lerp(&p[2], &p[3], u[0])];
    let l2 = [lerp(&l1[0], &l1[1], u[1]), lerp(&l1[1], &l1[2], u[1])];
    lerp(&l2[0], &l2[1], u[2])
}

/// Control points of the part of the curve between `t0` and `t1`
fn sub_curve(p: &[CurveVertex; 4], t0: FloatType, t1: FloatType) -> [CurveVertex; 4] {
    if t0 == 0.0 && t1 == 1.0 {
        return *p;
    }
    [
        blossom(p, [t0, t0, t0]),
        blossom(p, [t0, t0, t1]),
        blossom(p, [t0, t1, t1]),
        blossom(p, [t1, t1, t1]),
    ]
}

/// Box around the control polygon, grown by the largest radius.
/// Contains the whole swept curve by the convex hull property.
fn hull_bounds(p: &[CurveVertex; 4]) -> WorldBox {
    let mut ret = WorldBox::empty();
    let mut radius: FloatType = 0.0;
    for v in p {
        ret.include_point(&v.position);
        radius = radius.max(v.radius.abs());
    }
    WorldBox::new(ret.min.map(|x| x - radius), ret.max.map(|x| x + radius))
}

fn control_polygon_length(p: &[CurveVertex; 4]) -> FloatType {
    p.windows(2)
        .map(|w| (w[1].position - w[0].position).norm())
        .sum()
}

/// Parameter range of a piece encoded in `sub_id`, zero means the whole curve.
fn piece_range(sub_id: u32) -> (FloatType, FloatType) {
    let piece = sub_id & PIECE_MASK;
    let count = (sub_id >> PIECE_BITS).max(1);
    (
        piece as FloatType / count as FloatType,
        (piece + 1) as FloatType / count as FloatType,
    )
}

fn curve(geom_id: GeomId, curves: &BezierCurves, prim_id: u32) -> Result<[CurveVertex; 4], SceneError> {
    curves
        .curve(prim_id as usize)
        .ok_or(SceneError::PrimitiveOutOfRange {
            geom_id: geom_id.raw(),
            prim_id,
        })
}

/// Builds a BVH over the hair curves of a scene.
///
/// Curves longer than `max_segment_length` are split into several references, the
/// reference buffer growth factor must leave room for the extra ones.
#[derive(Debug)]
pub struct HairBuilder<'s> {
    scene: &'s Scene,
    ranges: GeometryRanges,
}

impl<'s> HairBuilder<'s> {
    pub fn new(scene: &'s Scene) -> HairBuilder<'s> {
        HairBuilder {
            scene,
            ranges: GeometryRanges::new(scene, |geometry| match geometry {
                Geometry::Curves(curves) => Some(curves.curve_count()),
                _ => None,
            }),
        }
    }

    /// Number of equal parameter pieces a curve is split into.
    pub fn segment_count(control_points: &[CurveVertex; 4], settings: &BuildSettings) -> u32 {
        let pieces = (control_polygon_length(control_points) / settings.max_segment_length).ceil();
        if pieces.is_nan() || pieces < 1.0 {
            1
        } else {
            (pieces.min(settings.max_segments as FloatType) as u32).max(1)
        }
    }
}

impl PrimitiveBuilder for HairBuilder<'_> {
    type Primitive = CurveSegment;

    fn builder_name(&self) -> &'static str {
        "hair"
    }

    fn primitive_count(&self) -> usize {
        self.ranges.total()
    }

    fn compute_prim_refs(
        &self,
        settings: &BuildSettings,
        writer: &mut PrimRefWriter<'_>,
    ) -> Result<(), BuildError> {
        let range = writer.task().range(self.ranges.total());
        for (geom_id, curve_indices) in self.ranges.split(range) {
            let curves = self.scene.curves(geom_id)?;
            for prim_id in curve_indices {
                let prim_id = prim_id as u32;
                let control_points = curve(geom_id, curves, prim_id)?;
                let count = Self::segment_count(&control_points, settings);

                for piece in 0..count {
                    let sub_id = piece | count << PIECE_BITS;
                    let (t0, t1) = piece_range(sub_id);
                    let bounds = hull_bounds(&sub_curve(&control_points, t0, t1));
                    writer.push(PrimRef::with_sub_id(bounds, geom_id, prim_id, sub_id))?;
                }
            }
        }
        Ok(())
    }

    fn create_leaf(
        &self,
        settings: &BuildSettings,
        refs: &[PrimRef],
        out: &mut [Option<CurveSegment>],
    ) -> Result<(), BuildError> {
        fill_blocks(refs, out, |prims| {
            Ok(CurveSegment::fill_from_iter(prims, self.scene, settings.list_mode)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bvh::build_bvh, geometry::WorldPoint};
    use assert2::{assert, let_assert};
    use test_case::test_case;

    fn close(a: &CurveVertex, b: &CurveVertex) -> bool {
        (a.position - b.position).norm() < 1e-5 && (a.radius - b.radius).abs() < 1e-5
    }

    /// Straight strand along z of the given length
    fn straight(length: FloatType) -> [CurveVertex; 4] {
        std::array::from_fn(|i| {
            CurveVertex::new(WorldPoint::new(0.0, 0.0, length * i as FloatType / 3.0), 0.1)
        })
    }

    fn bent() -> [CurveVertex; 4] {
        [
            CurveVertex::new(WorldPoint::new(0.0, 0.0, 0.0), 0.2),
            CurveVertex::new(WorldPoint::new(1.0, 2.0, 0.0), 0.15),
            CurveVertex::new(WorldPoint::new(3.0, 2.0, 1.0), 0.1),
            CurveVertex::new(WorldPoint::new(4.0, 0.0, 1.0), 0.05),
        ]
    }

    fn hair_scene(curve_count: u32) -> Scene {
        let mut vertices = Vec::new();
        for i in 0..curve_count {
            for v in straight(3.0) {
                vertices.push(CurveVertex::new(
                    v.position + WorldPoint::new(i as FloatType, 0.0, 0.0).coords,
                    v.radius,
                ));
            }
        }
        let curves = (0..curve_count).map(|i| 4 * i).collect();

        let mut scene = Scene::new();
        scene.add(Geometry::Curves(BezierCurves::new(vertices, curves).unwrap()));
        scene
    }

    #[test]
    fn whole_curve_keeps_control_points() {
        let segment = CurveSegment::new(&bent(), 0.0, 1.0, GeomId::from_raw(0), 3, false);
        assert!(*segment.control_points() == bent());
        assert!(segment.t_range() == (0.0, 1.0));
    }

    #[test_case(0.0, 0.5)]
    #[test_case(0.25, 0.5)]
    #[test_case(0.5, 1.0)]
    fn segment_follows_the_curve(t0: FloatType, t1: FloatType) {
        let p = bent();
        let segment = CurveSegment::new(&p, t0, t1, GeomId::from_raw(0), 0, false);

        for i in 0..=10 {
            let local = i as FloatType / 10.0;
            let global = t0 + (t1 - t0) * local;
            let expected = blossom(&p, [global, global, global]);
            assert!(close(&segment.point_at(local), &expected), "t = {global}");
        }
    }

    #[test]
    fn bounds_contain_the_swept_curve() {
        let segment = CurveSegment::new(&bent(), 0.2, 0.7, GeomId::from_raw(0), 0, false);
        let bounds = segment.bounds();
        let bounds = WorldBox::new(bounds.min.map(|x| x - 1e-4), bounds.max.map(|x| x + 1e-4));
        for i in 0..=20 {
            let v = segment.point_at(i as FloatType / 20.0);
            let r = WorldPoint::new(v.radius, v.radius, v.radius).coords;
            assert!(bounds.contains_point(&(v.position - r)));
            assert!(bounds.contains_point(&(v.position + r)));
        }
    }

    #[test_case(FloatType::INFINITY, 16, 1 ; "unlimited")]
    #[test_case(1.0, 16, 3 ; "split by length")]
    #[test_case(0.7, 16, 5 ; "rounded up")]
    #[test_case(0.1, 4, 4 ; "capped")]
    fn segment_counts(max_segment_length: FloatType, max_segments: u32, expected: u32) {
        let settings = BuildSettings::builder()
            .max_segment_length(max_segment_length)
            .max_segments(max_segments)
            .build();
        assert!(HairBuilder::segment_count(&straight(3.0), &settings) == expected);
    }

    #[test]
    fn piece_ranges() {
        assert!(piece_range(0) == (0.0, 1.0));
        assert!(piece_range(1 | 4 << PIECE_BITS) == (0.25, 0.5));
        assert!(piece_range(3 | 4 << PIECE_BITS) == (0.75, 1.0));
    }

    #[test]
    fn both_fills_agree() {
        let scene = hair_scene(2);
        let prims = [
            PrimRef::with_sub_id(WorldBox::empty(), GeomId::from_raw(0), 1, 1 | 2 << PIECE_BITS),
            PrimRef::with_sub_id(WorldBox::empty(), GeomId::from_raw(0), 0, 0),
        ];

        let mut iter = prims.iter().peekable();
        let mut i = 0;
        for _ in 0..2 {
            let from_iter = CurveSegment::fill_from_iter(&mut iter, &scene, true).unwrap();
            let from_slice = CurveSegment::fill_from_slice(&prims, &mut i, 2, &scene, true).unwrap();
            assert!(from_iter == from_slice);
            assert!(from_iter.prim_id() == prims[i - 1].prim_id);
        }

        i = 0;
        let first = CurveSegment::fill_from_slice(&prims, &mut i, 2, &scene, true).unwrap();
        assert!(first.t_range() == (0.5, 1.0));
        assert!(!first.is_last());
        let second = CurveSegment::fill_from_slice(&prims, &mut i, 2, &scene, true).unwrap();
        assert!(second.is_last());
    }

    #[test]
    fn curve_out_of_range() {
        let scene = hair_scene(2);
        let prims = [PrimRef::new(WorldBox::empty(), GeomId::from_raw(0), 2)];
        let_assert!(
            Err(SceneError::PrimitiveOutOfRange {
                geom_id: 0,
                prim_id: 2
            }) = CurveSegment::fill_from_iter(&mut prims.iter().peekable(), &scene, false)
        );
    }

    #[test]
    fn builder_splits_curves() {
        let scene = hair_scene(10);
        let settings = BuildSettings::builder()
            .max_segment_length(1.0)
            .growth_factor(3.0)
            .max_leaf_size(2)
            .build();
        let bvh = build_bvh(&HairBuilder::new(&scene), &settings).unwrap();
        bvh.validate().unwrap();
        assert!(bvh.primitive_count() == 30);

        for prim_id in 0..10 {
            let mut ranges: Vec<_> = bvh
                .blocks()
                .iter()
                .filter(|s| s.prim_id() == prim_id)
                .map(|s| s.t_range())
                .collect();
            ranges.sort_by(|a, b| a.0.total_cmp(&b.0));
            assert!(ranges.len() == 3);
            assert!(ranges[0].0 == 0.0);
            assert!(ranges[2].1 == 1.0);
            assert!(ranges[0].1 == ranges[1].0);
            assert!(ranges[1].1 == ranges[2].0);
        }
    }

    #[test]
    fn splitting_beyond_growth_factor_overflows() {
        let scene = hair_scene(10);
        let settings = BuildSettings::builder()
            .max_segment_length(1.0)
            .task_count(1)
            .build();
        let_assert!(
            Err(BuildError::PrimRefOverflow { task: 0, .. }) =
                build_bvh(&HairBuilder::new(&scene), &settings)
        );
    }
}
