use simba::simd::{SimdPartialOrd as _, SimdValue};

use super::{BarycentricCoordinates, Ray, SimdFloatType, SimdMaskType, Triangle, WorldPoint8, WorldVector8};
use crate::util::simba::fma_dot;

/// Intersections of one ray with a pack of triangles.
#[derive(Clone, Debug)]
pub struct PackHits {
    /// Lanes hit within the ray segment
    pub mask: SimdMaskType,
    pub t: SimdFloatType,
    pub uv: BarycentricCoordinates<SimdFloatType>,
}

impl Triangle<WorldPoint8> {
    /// Calculates ray intersection with the (two sided) triangle pack.
    /// Only hits with distance inside `[t_near, t_far]` of the ray are reported.
    /// Adapted from https://en.wikipedia.org/wiki/M%C3%B6ller%E2%80%93Trumbore_intersection_algorithm#Rust_implementation
    pub fn intersect(&self, ray: &Ray) -> PackHits {
        let origin = ray.origin.map(SimdFloatType::splat);
        let direction = ray.direction.map(SimdFloatType::splat);

        let e1 = self[1] - self[0];
        let e2 = self[2] - self[0];

        let ray_cross_e2 = direction.cross(&e2);
        let det = fma_dot(&e1, &ray_cross_e2);

        let inv_det = SimdFloatType::ONE / det; // May be infinite
        let s = origin - self[0];
        let u = inv_det * fma_dot(&s, &ray_cross_e2);

        let s_cross_e1 = s.cross(&e1);
        let v = inv_det * fma_dot(&direction, &s_cross_e1);
        let t = inv_det * fma_dot(&e2, &s_cross_e1);

        let mask = u.simd_ge(SimdFloatType::ZERO)
            & v.simd_ge(SimdFloatType::ZERO)
            & (u + v).simd_le(SimdFloatType::ONE)
            & t.simd_ge(SimdFloatType::splat(ray.t_near))
            & t.simd_le(SimdFloatType::splat(ray.t_far));
        PackHits {
            mask,
            t,
            uv: BarycentricCoordinates { u, v },
        }
    }

    /// Geometric normals, not normalized
    pub fn normals(&self) -> WorldVector8 {
        (self[1] - self[0]).cross(&(self[2] - self[0]))
    }
}
