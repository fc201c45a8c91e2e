use assert2::debug_assert;
use simba::simd::{SimdBool as _, SimdPartialOrd as _, SimdValue as _};

use super::{Bvh, NodeLink};
use crate::{
    geometry::{
        PACKET_SIZE, PacketBoxIntersectionExt as _, RayPacket, SimdFloatType, WorldBox,
        WorldVector8,
    },
    util::{bit_iter, simba::SimbaWorkarounds as _},
};

/// Intersects rays with the blocks of a leaf.
///
/// Implementations record hits by writing the hit fields of the lanes they hit
/// and shrinking `t_far` of those lanes to the hit distance.
pub trait LeafIntersector<P> {
    /// Only lanes set in `active` may be modified.
    fn intersect(&self, packet: &mut RayPacket, active: u64, blocks: &[P]);
}

const ALL_LANES: u64 = (1 << PACKET_SIZE) - 1;

impl<P> Bvh<P> {
    /// Intersects the lanes set in `valid` with the tree, leaving the closest hit
    /// of every lane in the packet.
    pub fn intersect(
        &self,
        packet: &mut RayPacket,
        valid: u64,
        intersector: &impl LeafIntersector<P>,
    ) {
        let valid = valid & ALL_LANES;
        debug_assert!(
            packet.nonempty_segments() & valid == valid,
            "Active lanes must have t_near <= t_far"
        );

        if self.is_empty() || valid == 0 {
            return;
        }

        let inv_direction = packet.direction.map(|d| d.inverse());

        let (active, t1) = clip_box(&self.bounding_box, packet, &inv_direction, valid);
        if active == 0 {
            return;
        }

        let mut stack = vec![(self.root, active, t1)];

        while let Some((link, active, t1)) = stack.pop() {
            // Lanes may have found a closer hit since the node was pushed
            let active = active & t1.simd_le(packet.t_far).bitmask();
            if active == 0 {
                continue;
            }

            match link.decode() {
                NodeLink::Null => continue,
                NodeLink::Inner { index } => {
                    let node = &self.inner_nodes[index];
                    let children: [_; 2] = std::array::from_fn(|i| {
                        let (active, t1) =
                            clip_box(&node.child_bounds[i], packet, &inv_direction, active);
                        (node.child_links[i], active, t1)
                    });

                    // Nearer child is pushed last, to be popped first
                    let first_lane = bit_iter(active).next().unwrap_or(0);
                    let order = if children[1].2.extract(first_lane)
                        < children[0].2.extract(first_lane)
                    {
                        [0, 1]
                    } else {
                        [1, 0]
                    };

                    for i in order {
                        if children[i].1 != 0 {
                            stack.push(children[i]);
                        }
                    }
                }
                NodeLink::Leaf { blocks } => {
                    intersector.intersect(
                        packet,
                        active,
                        self.blocks[blocks.into_range()].as_raw_slice(),
                    );
                }
            }
        }
    }
}

/// Clips the ray segments of the active lanes to the box.
/// Returns the lanes that still have a non empty segment and their entry distance.
fn clip_box(
    bounds: &WorldBox,
    packet: &RayPacket,
    inv_direction: &WorldVector8,
    active: u64,
) -> (u64, SimdFloatType) {
    let (t1, t2) = bounds.intersect_packet(&packet.origin, inv_direction);
    let t1 = t1.simd_max(packet.t_near);
    let t2 = t2.simd_min(packet.t_far);
    (t1.simd_le(t2).bitmask() & active, t1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bvh::{BuildSettings, build_bvh},
        geometry::{FloatType, Ray, WorldPoint, WorldVector},
        primitives::TriangleBuilder,
        scene::{Geometry, Scene, TriangleMesh},
    };
    use assert2::assert;
    use simba::simd::SimdValue;
    use std::cell::Cell;

    /// Records which lanes reached any leaf, without reporting hits
    #[derive(Default)]
    struct LaneRecorder {
        visited: Cell<u64>,
        leaf_count: Cell<usize>,
    }

    impl<P> LeafIntersector<P> for LaneRecorder {
        fn intersect(&self, _packet: &mut RayPacket, active: u64, _blocks: &[P]) {
            self.visited.set(self.visited.get() | active);
            self.leaf_count.set(self.leaf_count.get() + 1);
        }
    }

    /// Row of unit triangles in the z = 0 plane, triangle i spans x in [2i, 2i + 1]
    fn triangle_row(n: u32) -> Scene {
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();
        for i in 0..n {
            let x = 2.0 * i as FloatType;
            vertices.push(WorldPoint::new(x, 0.0, 0.0));
            vertices.push(WorldPoint::new(x + 1.0, 0.0, 0.0));
            vertices.push(WorldPoint::new(x, 1.0, 0.0));
            triangles.push([3 * i, 3 * i + 1, 3 * i + 2]);
        }
        let mut scene = Scene::new();
        scene.add(Geometry::TriangleMesh(
            TriangleMesh::new(vertices, triangles).unwrap(),
        ));
        scene
    }

    fn down_ray(x: FloatType, y: FloatType) -> Ray {
        Ray::new(
            WorldPoint::new(x, y, 10.0),
            WorldVector::new(0.0, 0.0, -1.0),
        )
    }

    #[test]
    fn empty_tree_is_noop() {
        let scene = Scene::new();
        let bvh = build_bvh(&TriangleBuilder::new(&scene), &BuildSettings::default()).unwrap();

        let mut packet = RayPacket::splat(down_ray(0.0, 0.0));
        let before = packet;
        let recorder = LaneRecorder::default();
        bvh.intersect(&mut packet, ALL_LANES, &recorder);

        assert!(packet == before);
        assert!(recorder.leaf_count.get() == 0);
    }

    #[test]
    fn missing_rays_visit_no_leaves() {
        let scene = triangle_row(64);
        let settings = BuildSettings::builder().max_leaf_size(8).build();
        let bvh = build_bvh(&TriangleBuilder::new(&scene), &settings).unwrap();

        let mut packet = RayPacket::splat(down_ray(0.5, 5.0));
        let recorder = LaneRecorder::default();
        bvh.intersect(&mut packet, ALL_LANES, &recorder);
        assert!(recorder.leaf_count.get() == 0);
    }

    #[test]
    fn only_valid_lanes_are_traversed() {
        let scene = triangle_row(64);
        let bvh = build_bvh(&TriangleBuilder::new(&scene), &BuildSettings::default()).unwrap();

        let mut packet = RayPacket::splat(down_ray(0.25, 0.25));
        let recorder = LaneRecorder::default();
        bvh.intersect(&mut packet, 0b1010_0001, &recorder);
        assert!(recorder.visited.get() == 0b1010_0001);
    }

    #[test]
    fn lanes_are_culled_by_segment() {
        let scene = triangle_row(64);
        let bvh = build_bvh(&TriangleBuilder::new(&scene), &BuildSettings::default()).unwrap();

        let mut short = down_ray(0.25, 0.25);
        short.t_far = 5.0;
        let mut packet = RayPacket::splat(down_ray(0.25, 0.25));
        packet.replace(3, short);

        let recorder = LaneRecorder::default();
        bvh.intersect(&mut packet, ALL_LANES, &recorder);
        assert!(recorder.visited.get() == ALL_LANES & !(1 << 3));
    }

    #[test]
    fn each_lane_reaches_its_own_leaf() {
        let scene = triangle_row(256);
        let settings = BuildSettings::builder().max_leaf_size(8).build();
        let bvh = build_bvh(&TriangleBuilder::new(&scene), &settings).unwrap();

        let rays: [Ray; PACKET_SIZE] =
            std::array::from_fn(|i| down_ray(0.25 + 64.0 * i as FloatType, 0.25));
        let mut packet = RayPacket::from_single_rays(&rays);
        let recorder = LaneRecorder::default();
        bvh.intersect(&mut packet, ALL_LANES, &recorder);

        assert!(recorder.visited.get() == ALL_LANES);
        // Lanes are spread far apart, every one of them needs at least one leaf
        assert!(recorder.leaf_count.get() >= PACKET_SIZE);
    }
}
