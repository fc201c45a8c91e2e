//! Structure-of-arrays packet of rays, the unit of work of the packet traversal.

use std::{array, fmt::Display};

use simba::simd::{SimdBool as _, SimdPartialOrd as _, SimdValue};
use wide::i32x8;

use crate::{
    geometry::{
        BarycentricCoordinates, INVALID_ID, Ray, SimdFloatType, SimdMaskType, WorldPoint,
        WorldPoint8, WorldVector, WorldVector8,
    },
    util::simba::simd_windows,
};

/// Number of rays in a packet.
pub const PACKET_SIZE: usize = <SimdFloatType as SimdValue>::LANES;

/// Eight rays in structure-of-arrays layout.
///
/// The first group of fields are inputs of a query, the second group are outputs,
/// reset to "no hit" on construction. All output mutation happens in traversal and
/// in leaf intersectors.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayPacket {
    pub origin: WorldPoint8,
    pub direction: WorldVector8,
    pub t_near: SimdFloatType,
    pub t_far: SimdFloatType,
    pub time: SimdFloatType,
    pub mask: i32x8,

    pub normal: WorldVector8,
    pub uv: BarycentricCoordinates<SimdFloatType>,
    pub geom_id: i32x8,
    pub prim_id: i32x8,
    pub inst_id: i32x8,
}

impl RayPacket {
    /// Constructs the packet from ray inputs, with all hit fields set to "no hit".
    pub fn new(
        origin: WorldPoint8,
        direction: WorldVector8,
        t_near: SimdFloatType,
        t_far: SimdFloatType,
        time: SimdFloatType,
        mask: i32x8,
    ) -> RayPacket {
        let invalid = i32x8::splat(INVALID_ID as i32);
        RayPacket {
            origin,
            direction,
            t_near,
            t_far,
            time,
            mask,
            normal: WorldVector8::new(
                SimdFloatType::splat(0.0),
                SimdFloatType::splat(0.0),
                SimdFloatType::splat(0.0),
            ),
            uv: BarycentricCoordinates::splat(BarycentricCoordinates::default()),
            geom_id: invalid,
            prim_id: invalid,
            inst_id: invalid,
        }
    }

    /// Lanes that have hit something.
    pub fn hit(&self) -> [bool; PACKET_SIZE] {
        let geom_ids = self.geom_id.to_array();
        array::from_fn(|i| geom_ids[i] as u32 != INVALID_ID)
    }

    /// Bit mask of lanes whose ray segment is not empty (t_near <= t_far).
    pub fn nonempty_segments(&self) -> u64 {
        self.t_near.simd_le(self.t_far).bitmask()
    }

    /// Transposes the packet into single rays.
    pub fn to_single_rays(&self) -> [Ray; PACKET_SIZE] {
        array::from_fn(|i| self.extract(i))
    }

    /// Transposes single rays into a packet, exact inverse of `to_single_rays`.
    pub fn from_single_rays(rays: &[Ray; PACKET_SIZE]) -> RayPacket {
        let mut ret = RayPacket::default();
        for (i, ray) in rays.iter().enumerate() {
            ret.replace(i, *ray);
        }
        ret
    }

    /// Packs a stream of rays into packets.
    /// Each packet comes with a bit mask of lanes that carry a ray from the input,
    /// lanes of the last packet that have no ray are default and not set in the mask.
    pub fn packets(rays: impl IntoIterator<Item = Ray>) -> impl Iterator<Item = (RayPacket, u64)> {
        simd_windows::<RayPacket>(rays).map(|(packet, valid)| (packet, valid.bitmask()))
    }
}

impl Default for RayPacket {
    fn default() -> Self {
        RayPacket::splat(Ray::default())
    }
}

fn extract_id(v: &i32x8, i: usize) -> u32 {
    v.as_array_ref()[i] as u32
}

fn replace_id(v: &mut i32x8, i: usize, id: u32) {
    let mut lanes = v.to_array();
    lanes[i] = id as i32;
    *v = i32x8::new(lanes);
}

fn select_ids(cond: u64, a: i32x8, b: i32x8) -> i32x8 {
    let a = a.to_array();
    let b = b.to_array();
    i32x8::new(array::from_fn(|i| if cond & (1 << i) != 0 { a[i] } else { b[i] }))
}

fn extract_point(p: &WorldPoint8, i: usize) -> WorldPoint {
    p.map(|x| x.extract(i))
}

fn extract_vector(v: &WorldVector8, i: usize) -> WorldVector {
    v.map(|x| x.extract(i))
}

/// Scalar (single lane) view of a ray, required by simba for the packet's `Element` type.
impl SimdValue for Ray {
    const LANES: usize = 1;

    type Element = Ray;

    type SimdBool = bool;

    fn splat(val: Ray) -> Self {
        val
    }

    fn extract(&self, _: usize) -> Ray {
        *self
    }

    unsafe fn extract_unchecked(&self, _: usize) -> Ray {
        *self
    }

    fn replace(&mut self, _: usize, val: Ray) {
        *self = val
    }

    unsafe fn replace_unchecked(&mut self, _: usize, val: Ray) {
        *self = val
    }

    fn select(self, cond: bool, other: Self) -> Self {
        if cond { self } else { other }
    }
}

impl SimdValue for RayPacket {
    const LANES: usize = PACKET_SIZE;

    type Element = Ray;

    type SimdBool = SimdMaskType;

    fn splat(val: Ray) -> Self {
        RayPacket {
            origin: val.origin.map(SimdFloatType::splat),
            direction: val.direction.map(SimdFloatType::splat),
            t_near: SimdFloatType::splat(val.t_near),
            t_far: SimdFloatType::splat(val.t_far),
            time: SimdFloatType::splat(val.time),
            mask: i32x8::splat(val.mask as i32),
            normal: val.normal.map(SimdFloatType::splat),
            uv: BarycentricCoordinates::splat(val.uv),
            geom_id: i32x8::splat(val.geom_id as i32),
            prim_id: i32x8::splat(val.prim_id as i32),
            inst_id: i32x8::splat(val.inst_id as i32),
        }
    }

    fn extract(&self, i: usize) -> Ray {
        Ray {
            origin: extract_point(&self.origin, i),
            direction: extract_vector(&self.direction, i),
            t_near: self.t_near.extract(i),
            t_far: self.t_far.extract(i),
            time: self.time.extract(i),
            mask: extract_id(&self.mask, i),
            normal: extract_vector(&self.normal, i),
            uv: self.uv.extract(i),
            geom_id: extract_id(&self.geom_id, i),
            prim_id: extract_id(&self.prim_id, i),
            inst_id: extract_id(&self.inst_id, i),
        }
    }

    unsafe fn extract_unchecked(&self, i: usize) -> Ray {
        self.extract(i)
    }

    fn replace(&mut self, i: usize, val: Ray) {
        self.origin
            .coords
            .zip_apply(&val.origin.coords, |x, y| x.replace(i, y));
        self.direction.zip_apply(&val.direction, |x, y| x.replace(i, y));
        self.t_near.replace(i, val.t_near);
        self.t_far.replace(i, val.t_far);
        self.time.replace(i, val.time);
        replace_id(&mut self.mask, i, val.mask);
        self.normal.zip_apply(&val.normal, |x, y| x.replace(i, y));
        self.uv.replace(i, val.uv);
        replace_id(&mut self.geom_id, i, val.geom_id);
        replace_id(&mut self.prim_id, i, val.prim_id);
        replace_id(&mut self.inst_id, i, val.inst_id);
    }

    unsafe fn replace_unchecked(&mut self, i: usize, val: Ray) {
        self.replace(i, val)
    }

    fn select(self, cond: SimdMaskType, other: Self) -> Self {
        let bits = cond.bitmask();
        RayPacket {
            origin: self
                .origin
                .coords
                .zip_map(&other.origin.coords, |x, y| x.select(cond, y))
                .into(),
            direction: self.direction.zip_map(&other.direction, |x, y| x.select(cond, y)),
            t_near: self.t_near.select(cond, other.t_near),
            t_far: self.t_far.select(cond, other.t_far),
            time: self.time.select(cond, other.time),
            mask: select_ids(bits, self.mask, other.mask),
            normal: self.normal.zip_map(&other.normal, |x, y| x.select(cond, y)),
            uv: self.uv.select(cond, other.uv),
            geom_id: select_ids(bits, self.geom_id, other.geom_id),
            prim_id: select_ids(bits, self.prim_id, other.prim_id),
            inst_id: select_ids(bits, self.inst_id, other.inst_id),
        }
    }
}

impl Display for RayPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{ org = {:?}, dir = {:?}, near = {:?}, far = {:?}, time = {:?}, mask = {:?}, ",
            self.origin, self.direction, self.t_near, self.t_far, self.time, self.mask
        )?;
        write!(
            f,
            "instID = {:?}, geomID = {:?}, primID = {:?}, u = {:?}, v = {:?}, Ng = {:?} }}",
            self.inst_id, self.geom_id, self.prim_id, self.uv.u, self.uv.v, self.normal
        )
    }
}
