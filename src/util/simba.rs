use simba::simd::{SimdBool, SimdValue, WideBoolF32x8, WideF32x8};
use wide::{CmpEq as _, f32x8};

use crate::geometry::{SimdFloatType, WorldVector8};

pub trait SimbaWorkarounds: SimdValue {
    fn is_nan(self) -> Self::SimdBool;

    fn infinity() -> Self;
    fn neg_infinity() -> Self;

    /// Componentwise inverse.
    /// Zeros get turned into positive infinity regardless of the sign of the zero
    fn inverse(self) -> Self;
}

impl SimbaWorkarounds for WideF32x8 {
    #[inline(always)]
    fn is_nan(self) -> Self::SimdBool {
        WideBoolF32x8(self.0.is_nan())
    }

    #[inline(always)]
    fn infinity() -> Self {
        Self::splat(f32::INFINITY)
    }

    #[inline(always)]
    fn neg_infinity() -> Self {
        Self::splat(f32::NEG_INFINITY)
    }

    #[inline(always)]
    fn inverse(self) -> Self {
        let is_zero = self.0.cmp_eq(f32x8::ZERO);
        WideF32x8(is_zero.blend(f32x8::splat(f32::INFINITY), f32x8::ONE / self.0))
    }
}

#[inline(always)]
pub fn fast_min(a: WideF32x8, b: WideF32x8) -> WideF32x8 {
    WideF32x8(a.0.fast_min(b.0))
}

#[inline(always)]
pub fn fast_max(a: WideF32x8, b: WideF32x8) -> WideF32x8 {
    WideF32x8(a.0.fast_max(b.0))
}

/// Dot product using fused multiply-add
#[inline(always)]
pub fn fma_dot(a: &WorldVector8, b: &WorldVector8) -> SimdFloatType {
    WideF32x8(a.z.0.mul_add(b.z.0, a.y.0.mul_add(b.y.0, a.x.0 * b.x.0)))
}

/// Converts a flat iterator of elements into an iterator of SIMD values and mask.
/// If input iterator length is not divisible by T::LANES, remainder of the last
/// vector will be filled with the content of T::default() and mask will be false.
pub fn simd_windows<T: SimdValue + Default>(
    value: impl IntoIterator<Item = T::Element>,
) -> impl Iterator<Item = (T, T::SimdBool)>
where
    T::SimdBool: SimdValue,
    <T::SimdBool as SimdValue>::Element: From<bool>,
{
    let mut iter = value.into_iter();
    std::iter::from_fn(move || {
        let mut t = T::default();
        let mut mask = <T::SimdBool as SimdValue>::splat(false.into());

        for (j, v) in (0..T::LANES).zip(&mut iter) {
            t.replace(j, v);
            mask.replace(j, true.into());
        }

        if mask.any() { Some((t, mask)) } else { None }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use test_case::test_case;

    #[test]
    fn simd_windows_exact_fill() {
        let input = 0..16;
        let result: Vec<_> = simd_windows::<WideF32x8>(input.map(|x| x as f32)).collect();
        assert!(result.len() == 2);
        assert!(result[0].0.extract(0) == 0.0);
        assert!(result[0].0.extract(7) == 7.0);
        assert!(result[1].0.extract(0) == 8.0);
        assert!(result[1].0.extract(7) == 15.0);
    }

    #[test]
    fn simd_windows_partial_fill() {
        let input = 0..10;
        let result: Vec<_> = simd_windows::<WideF32x8>(input.map(|x| x as f32)).collect();
        assert!(result.len() == 2);
        assert!(result[0].0.extract(0) == 0.0);
        assert!(result[1].0.extract(1) == 9.0);
        assert!(!result[1].1.extract(2));
        assert!(!result[1].1.extract(7));
    }

    #[test]
    fn simd_windows_empty() {
        let input = std::iter::empty::<f32>();
        let result: Vec<_> = simd_windows::<WideF32x8>(input).collect();
        assert!(result.is_empty());
    }

    #[test_case(2.0, 0.5 ; "positive")]
    #[test_case(-4.0, -0.25 ; "negative")]
    #[test_case(0.0, f32::INFINITY ; "zero")]
    #[test_case(-0.0, f32::INFINITY ; "negative_zero")]
    fn inverse(value: f32, expected: f32) {
        let inv = WideF32x8::splat(value).inverse();
        assert!(inv.extract(3) == expected);
    }

    #[test]
    fn fma_dot_matches_nalgebra_dot() {
        let a = WorldVector8::new(
            WideF32x8::splat(1.0),
            WideF32x8::splat(-2.0),
            WideF32x8::splat(0.5),
        );
        let b = WorldVector8::new(
            WideF32x8::splat(3.0),
            WideF32x8::splat(4.0),
            WideF32x8::splat(8.0),
        );
        assert!(fma_dot(&a, &b).extract(0) == a.dot(&b).extract(0));
        assert!(fma_dot(&a, &b).extract(5) == -1.0);
    }
}
