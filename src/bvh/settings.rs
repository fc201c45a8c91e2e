use bon::Builder;

use crate::geometry::FloatType;

use super::BuildError;

/// Parameters of a BVH build.
///
/// Only the generic part is interpreted by the builder itself, `subdivision_level`,
/// `max_segment_length` and `max_segments` are read by the primitive kinds that need them.
#[derive(Builder, Clone, Debug, PartialEq)]
pub struct BuildSettings {
    /// Leaves never hold more primitives than this
    #[builder(default = 8)]
    pub max_leaf_size: usize,

    /// Number of centroid bins per axis for SAH evaluation
    #[builder(default = 16)]
    pub bin_count: usize,

    /// Over-allocation of the primitive reference buffer relative to the primitive count
    #[builder(default = 1.15)]
    pub growth_factor: f32,

    /// Depth from which nodes are split at median instead of by SAH
    #[builder(default = 64)]
    pub max_depth: usize,

    /// Smallest reference range that is partitioned in a parallel task
    #[builder(default = 1024)]
    pub parallel_threshold: usize,

    /// Number of slices for the reference computation and leaf creation phases
    #[builder(default = rayon::current_num_threads())]
    pub task_count: usize,

    /// Mark the last primitive of each leaf
    #[builder(default = false)]
    pub list_mode: bool,

    /// Tessellation density hint stored in subdivision patches
    #[builder(default = 0)]
    pub subdivision_level: u32,

    /// Hair curves are split into pieces with control polygon at most this long
    #[builder(default = FloatType::INFINITY)]
    pub max_segment_length: FloatType,

    /// Upper bound on the number of pieces of a single hair curve
    #[builder(default = 16)]
    pub max_segments: u32,
}

impl BuildSettings {
    /// Pieces of one curve are numbered within the low 16 bits of `sub_id`.
    pub const MAX_SEGMENTS_LIMIT: u32 = u16::MAX as u32;

    pub fn validate(&self) -> Result<(), BuildError> {
        let fail = |message: &str| Err(BuildError::InvalidSettings(message.to_string()));

        if self.max_leaf_size == 0 {
            return fail("max_leaf_size must be at least 1");
        }
        if self.bin_count < 2 {
            return fail("bin_count must be at least 2");
        }
        if !self.growth_factor.is_finite() || self.growth_factor < 1.0 {
            return fail("growth_factor must be a finite number >= 1");
        }
        if self.max_depth == 0 {
            return fail("max_depth must be at least 1");
        }
        if self.task_count == 0 {
            return fail("task_count must be at least 1");
        }
        if self.max_segments == 0 || self.max_segments > Self::MAX_SEGMENTS_LIMIT {
            return fail("max_segments must be between 1 and 65535");
        }
        if self.max_segment_length.is_nan() || self.max_segment_length <= 0.0 {
            return fail("max_segment_length must be positive");
        }

        Ok(())
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        BuildSettings::builder().build()
    }
}
