pub mod bvh;
pub mod geometry;
pub mod primitives;
pub mod scene;
pub mod util;

pub use bvh::{BuildError, BuildSettings, Bvh, build_bvh};
pub use geometry::{PACKET_SIZE, Ray, RayPacket};
pub use scene::{Geometry, Scene, SceneError};
