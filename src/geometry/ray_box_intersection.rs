use simba::simd::SimdValue;

use crate::{
    geometry::{SimdFloatType, WorldBox, WorldBox8, WorldPoint8, WorldVector8},
    util::simba::{SimbaWorkarounds as _, fast_max, fast_min},
};

pub trait PacketBoxIntersectionExt {
    /// Calculate first and last intersection of each ray of a packet with the box
    fn intersect_packet(
        &self,
        origin: &WorldPoint8,
        inv_direction: &WorldVector8,
    ) -> (SimdFloatType, SimdFloatType);
}

impl PacketBoxIntersectionExt for WorldBox {
    /// Calculates intersection of a ray packet with a single box.
    /// Returns minimum and maximum distance along each ray, lane intersects if min <= max.
    /// `inv_direction` is the componentwise inverse of the ray directions, as calculated
    /// by `SimbaWorkarounds::inverse`.
    fn intersect_packet(
        &self,
        origin: &WorldPoint8,
        inv_direction: &WorldVector8,
    ) -> (SimdFloatType, SimdFloatType) {
        let b = WorldBox8::splat(self.clone());

        // Componentwise distances along the rays to the box's min and max corners
        // The multiplication is NAN if the ray is starting inside the slab bounding plane
        // and is parallel to it. In this case we blend to +-infinity, so that the range becomes infinite
        let to_box_min = (b.min - origin)
            .component_mul(inv_direction)
            .map(|x| SimdFloatType::neg_infinity().select(x.is_nan(), x));
        let to_box_max = (b.max - origin)
            .component_mul(inv_direction)
            .map(|x| SimdFloatType::infinity().select(x.is_nan(), x));

        // Correctly ordered (min_t <= max_t)
        let componentwise_min_t = to_box_min.zip_map(&to_box_max, |a, b| fast_min(a, b));
        let componentwise_max_t = to_box_min.zip_map(&to_box_max, |a, b| fast_max(a, b));

        let min_t = fast_max(
            componentwise_min_t.x,
            fast_max(componentwise_min_t.y, componentwise_min_t.z),
        );
        let max_t = fast_min(
            componentwise_max_t.x,
            fast_min(componentwise_max_t.y, componentwise_max_t.z),
        );

        (min_t, max_t)
    }
}
