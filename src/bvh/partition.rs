//! Recursive binned SAH partitioning of primitive references.

use std::{cmp::Reverse, ops::Range};

use ordered_float::OrderedFloat;

use crate::geometry::{FloatType, WorldBox};

use super::{BuildSettings, PrimRef};

/// Temporary tree produced by partitioning, flattened into the final layout afterwards.
/// Leaves refer to ranges of the reordered reference array.
#[derive(Debug)]
pub(super) enum BuildNode {
    Leaf {
        bounds: WorldBox,
        range: Range<usize>,
    },
    Inner {
        bounds: WorldBox,
        children: Box<[BuildNode; 2]>,
    },
}

impl BuildNode {
    pub fn bounds(&self) -> &WorldBox {
        match self {
            BuildNode::Leaf { bounds, .. } => bounds,
            BuildNode::Inner { bounds, .. } => bounds,
        }
    }

    /// Number of nodes in the subtree, including self
    #[cfg(test)]
    pub fn node_count(&self) -> usize {
        match self {
            BuildNode::Leaf { .. } => 1,
            BuildNode::Inner { children, .. } => {
                1 + children[0].node_count() + children[1].node_count()
            }
        }
    }
}

/// Reorders `refs` so that every leaf of the returned tree is a contiguous range.
/// `refs` must not be empty.
pub(super) fn partition(refs: &mut [PrimRef], settings: &BuildSettings) -> BuildNode {
    assert!(!refs.is_empty());
    partition_recursive(refs, 0, 0, settings)
}

fn partition_recursive(
    refs: &mut [PrimRef],
    offset: usize,
    depth: usize,
    settings: &BuildSettings,
) -> BuildNode {
    let bounds = refs
        .iter()
        .fold(WorldBox::empty(), |acc, r| acc.union(&r.bounds));

    if refs.len() <= settings.max_leaf_size {
        return BuildNode::Leaf {
            bounds,
            range: offset..offset + refs.len(),
        };
    }

    let centroid_bounds = centroid_bounds(refs);
    let sah_split = if depth < settings.max_depth {
        find_sah_split(refs, &centroid_bounds, settings.bin_count)
    } else {
        None
    };

    let mid = match sah_split {
        Some(split) => itertools::partition(refs.iter_mut(), |r| split.goes_left(r)),
        None => median_split(refs, &centroid_bounds),
    };
    debug_assert!(0 < mid && mid < refs.len());

    let parallel = refs.len() >= settings.parallel_threshold;
    let (left, right) = refs.split_at_mut(mid);

    let (left, right) = if parallel {
        rayon::join(
            || partition_recursive(left, offset, depth + 1, settings),
            || partition_recursive(right, offset + mid, depth + 1, settings),
        )
    } else {
        (
            partition_recursive(left, offset, depth + 1, settings),
            partition_recursive(right, offset + mid, depth + 1, settings),
        )
    };

    BuildNode::Inner {
        bounds,
        children: Box::new([left, right]),
    }
}

fn centroid_bounds(refs: &[PrimRef]) -> WorldBox {
    let mut ret = WorldBox::empty();
    for r in refs {
        ret.include_point(&r.centroid());
    }
    ret
}

#[derive(Clone, Debug)]
struct Bin {
    bounds: WorldBox,
    count: usize,
}

impl Default for Bin {
    fn default() -> Self {
        Bin {
            bounds: WorldBox::empty(),
            count: 0,
        }
    }
}

/// Split plane between two bins along an axis
#[derive(Copy, Clone, Debug, PartialEq)]
struct SahSplit {
    axis: usize,
    /// References in bins below this index go to the left child
    boundary: usize,
    min: FloatType,
    scale: FloatType,
    bin_count: usize,
}

impl SahSplit {
    fn bin_index(&self, r: &PrimRef) -> usize {
        let pos = (r.centroid()[self.axis] - self.min) * self.scale;
        // Negative and NaN values saturate to zero
        (pos as usize).min(self.bin_count - 1)
    }

    fn goes_left(&self, r: &PrimRef) -> bool {
        self.bin_index(r) < self.boundary
    }
}

/// Finds the cheapest split over all axes and bin boundaries, with ties broken by
/// larger axis extent, then lower axis index, then lower boundary.
/// Returns None when no split would leave both sides non-empty.
fn find_sah_split(
    refs: &[PrimRef],
    centroid_bounds: &WorldBox,
    bin_count: usize,
) -> Option<SahSplit> {
    let mut bins = vec![Bin::default(); bin_count];
    let mut right_areas = vec![0.0; bin_count];
    let mut best = None;

    for axis in 0..3 {
        let extent = centroid_bounds.extent(axis);
        if extent.is_nan() || extent <= 0.0 {
            continue;
        }

        let mut split = SahSplit {
            axis,
            boundary: 0,
            min: centroid_bounds.min[axis],
            scale: bin_count as FloatType / extent,
            bin_count,
        };

        bins.fill(Bin::default());
        for r in refs {
            let bin = &mut bins[split.bin_index(r)];
            bin.bounds = bin.bounds.union(&r.bounds);
            bin.count += 1;
        }

        // right_areas[b] is the area of everything in bins b..
        let mut right_bounds = WorldBox::empty();
        for b in (1..bin_count).rev() {
            right_bounds = right_bounds.union(&bins[b].bounds);
            right_areas[b] = right_bounds.surface_area();
        }

        let mut left_bounds = WorldBox::empty();
        let mut left_count = 0;
        for boundary in 1..bin_count {
            left_bounds = left_bounds.union(&bins[boundary - 1].bounds);
            left_count += bins[boundary - 1].count;
            let right_count = refs.len() - left_count;
            if left_count == 0 || right_count == 0 {
                continue;
            }

            let cost = left_bounds.surface_area() * left_count as FloatType
                + right_areas[boundary] * right_count as FloatType;
            let key = (
                OrderedFloat(cost),
                Reverse(OrderedFloat(extent)),
                axis,
                boundary,
            );

            if best.as_ref().is_none_or(|(best_key, _)| key < *best_key) {
                split.boundary = boundary;
                best = Some((key, split));
            }
        }
    }

    best.map(|(_, split)| split)
}

/// Splits at the median centroid along the widest centroid axis.
/// Always leaves both sides non-empty for at least two references.
fn median_split(refs: &mut [PrimRef], centroid_bounds: &WorldBox) -> usize {
    let axis = (0..3)
        .max_by_key(|&axis| (OrderedFloat(centroid_bounds.extent(axis)), Reverse(axis)))
        .unwrap_or(0);
    let mid = refs.len() / 2;
    refs.select_nth_unstable_by_key(mid, |r| OrderedFloat(r.centroid()[axis]));
    mid
}
