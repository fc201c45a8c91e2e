mod aabb;
mod ray_box_intersection;
mod ray_packet;
mod ray_triangle_intersection;
mod triangle;

pub use aabb::AABB;
pub use ray_box_intersection::PacketBoxIntersectionExt;
pub use ray_packet::{PACKET_SIZE, RayPacket};
pub use ray_triangle_intersection::PackHits;
pub use triangle::{BarycentricCoordinates, Triangle};

use nalgebra::{Point3, Vector3};
use simba::simd::{WideBoolF32x8, WideF32x8};

pub type FloatType = f32;
pub type SimdFloatType = WideF32x8;
pub type SimdMaskType = WideBoolF32x8;

pub type WorldPoint = Point3<FloatType>;
pub type WorldVector = Vector3<FloatType>;
pub type WorldBox = AABB<WorldPoint>;
pub type WorldPoint8 = Point3<SimdFloatType>;
pub type WorldVector8 = Vector3<SimdFloatType>;
pub type WorldBox8 = AABB<WorldPoint8>;

pub const EPSILON: FloatType = 1e-6;

/// Value of the id fields of a ray that didn't hit anything.
/// Has the same bit pattern as -1.
pub const INVALID_ID: u32 = u32::MAX;

/// Single ray record, one lane of a `RayPacket`.
///
/// Unlike the packet this is meant for scalar fallback paths and for
/// constructing packets, so the direction is kept exactly as given (not normalized).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ray {
    pub origin: WorldPoint,
    pub direction: WorldVector,
    /// Start of the ray segment
    pub t_near: FloatType,
    /// End of the ray segment, shrinks as closer hits are found
    pub t_far: FloatType,
    /// Motion blur sample time in [0, 1]
    pub time: FloatType,
    /// Geometry visibility bits
    pub mask: u32,

    /// Geometric normal of the hit, not normalized
    pub normal: WorldVector,
    pub uv: BarycentricCoordinates<FloatType>,
    pub geom_id: u32,
    pub prim_id: u32,
    pub inst_id: u32,
}

impl Ray {
    /// Ray over the whole positive half line, visible to all geometry, with no hit.
    pub fn new(origin: WorldPoint, direction: WorldVector) -> Ray {
        Ray::with_segment(origin, direction, 0.0, FloatType::INFINITY)
    }

    pub fn with_segment(
        origin: WorldPoint,
        direction: WorldVector,
        t_near: FloatType,
        t_far: FloatType,
    ) -> Ray {
        Ray {
            origin,
            direction,
            t_near,
            t_far,
            time: 0.0,
            mask: u32::MAX,
            normal: WorldVector::zeros(),
            uv: BarycentricCoordinates::default(),
            geom_id: INVALID_ID,
            prim_id: INVALID_ID,
            inst_id: INVALID_ID,
        }
    }

    pub fn point_at(&self, distance: FloatType) -> WorldPoint {
        self.origin + self.direction * distance
    }

    pub fn is_hit(&self) -> bool {
        self.geom_id != INVALID_ID
    }
}

impl Default for Ray {
    fn default() -> Self {
        Ray::with_segment(WorldPoint::origin(), WorldVector::zeros(), 0.0, 0.0)
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use proptest::prelude::*;

    /// Helper macro that creates a wrapper arnound a type that implemetns Deref and Arbitary
    macro_rules! arbitrary_wrapper {
        ( $wrapper_name:ident ( $type:ty ) -> $block:block ) => {
            #[derive(Copy, Clone, Debug)]
            pub struct $wrapper_name(pub $type);

            impl std::ops::Deref for $wrapper_name {
                type Target = $type;
                fn deref(&self) -> &$type {
                    &self.0
                }
            }

            impl Arbitrary for $wrapper_name {
                type Parameters = ();
                type Strategy = proptest::strategy::BoxedStrategy<Self>;
                fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
                    $block.prop_map(|x| $wrapper_name(x)).boxed()
                }
            }
        };
    }

    fn simple_float() -> BoxedStrategy<f32> {
        any::<i32>().prop_map(|n| n as f32 * 1e-4).boxed()
    }

    fn simple_positive_float() -> BoxedStrategy<f32> {
        any::<u32>().prop_map(|n| n as f32 * 1e-4).boxed()
    }

    fn world_point() -> BoxedStrategy<WorldPoint> {
        (simple_float(), simple_float(), simple_float())
            .prop_map(|coords| WorldPoint::new(coords.0, coords.1, coords.2))
            .boxed()
    }

    fn world_vector() -> BoxedStrategy<WorldVector> {
        (simple_float(), simple_float(), simple_float())
            .prop_map(|coords| WorldVector::new(coords.0, coords.1, coords.2))
            .boxed()
    }

    /// Either a valid id or the invalid sentinel
    fn id() -> BoxedStrategy<u32> {
        prop_oneof![Just(INVALID_ID), 0..1000u32].boxed()
    }

    arbitrary_wrapper! {
        WorldPointWrapper(WorldPoint) -> {
            world_point()
        }
    }

    arbitrary_wrapper! {
        WorldBoxWrapper(WorldBox) -> {
            (world_point(), simple_positive_float(), simple_positive_float(), simple_positive_float())
                .prop_map(|(min, sx, sy, sz)| {
                    WorldBox::new(min, min + WorldVector::new(sx, sy, sz))
                })
        }
    }

    arbitrary_wrapper! {
        RayWrapper(Ray) -> {
            (
                (world_point(), world_vector(), simple_positive_float(), simple_positive_float()),
                (0.0f32..=1.0f32, any::<u32>(), world_vector(), simple_float(), simple_float()),
                (id(), id(), id()),
            )
                .prop_map(|(
                    (origin, direction, t_near, length),
                    (time, mask, normal, u, v),
                    (geom_id, prim_id, inst_id),
                )| {
                    Ray {
                        origin,
                        direction,
                        t_near,
                        t_far: t_near + length,
                        time,
                        mask,
                        normal,
                        uv: BarycentricCoordinates { u, v },
                        geom_id,
                        prim_id,
                        inst_id,
                    }
                })
        }
    }
}
