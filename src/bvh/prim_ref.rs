//! Primitive references and the pre-sized buffer they are computed into.

use std::ops::Range;

use crate::{
    geometry::{WorldBox, WorldPoint},
    scene::GeomId,
};

use super::BuildError;

/// Bounding box of a primitive (or of a piece of it) with the ids needed to find it again.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrimRef {
    pub bounds: WorldBox,
    pub geom_id: GeomId,
    pub prim_id: u32,
    /// Identifies the piece for primitive kinds that split a primitive into
    /// several references, zero otherwise.
    pub sub_id: u32,
}

impl PrimRef {
    pub fn new(bounds: WorldBox, geom_id: GeomId, prim_id: u32) -> PrimRef {
        PrimRef::with_sub_id(bounds, geom_id, prim_id, 0)
    }

    pub fn with_sub_id(bounds: WorldBox, geom_id: GeomId, prim_id: u32, sub_id: u32) -> PrimRef {
        PrimRef {
            bounds,
            geom_id,
            prim_id,
            sub_id,
        }
    }

    pub fn centroid(&self) -> WorldPoint {
        self.bounds.centroid()
    }
}

/// One of `thread_count` equal slices of a parallel phase.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TaskSlice {
    pub thread_index: usize,
    pub thread_count: usize,
}

impl TaskSlice {
    pub fn new(thread_index: usize, thread_count: usize) -> TaskSlice {
        assert!(thread_index < thread_count);
        TaskSlice {
            thread_index,
            thread_count,
        }
    }

    /// All slices of a phase split into `thread_count` tasks
    pub fn all(thread_count: usize) -> impl Iterator<Item = TaskSlice> {
        (0..thread_count).map(move |i| TaskSlice::new(i, thread_count))
    }

    /// Contiguous sub range of `0..count` handled by this task.
    /// Ranges of all tasks of a phase cover `0..count` without overlaps.
    pub fn range(&self, count: usize) -> Range<usize> {
        let start = count * self.thread_index / self.thread_count;
        let end = count * (self.thread_index + 1) / self.thread_count;
        start..end
    }
}

/// Reference buffer over-allocated by the growth factor.
///
/// Each task writes into its own statically computed region, proportional to
/// the part of the primitive range the task handles. The regions are compacted
/// into a single contiguous array once all tasks are done.
#[derive(Debug)]
pub struct PrimRefBuffer {
    refs: Vec<PrimRef>,
    regions: Vec<Range<usize>>,
}

impl PrimRefBuffer {
    pub fn new(primitive_count: usize, growth_factor: f32, task_count: usize) -> PrimRefBuffer {
        let scaled = |i: usize| (i as f64 * growth_factor as f64).ceil() as usize;
        let regions: Vec<_> = TaskSlice::all(task_count)
            .map(|task| {
                let range = task.range(primitive_count);
                scaled(range.start)..scaled(range.end)
            })
            .collect();

        PrimRefBuffer {
            refs: vec![PrimRef::default(); scaled(primitive_count)],
            regions,
        }
    }

    pub fn capacity(&self) -> usize {
        self.refs.len()
    }

    /// Writers for every task region, in task order
    pub fn writers(&mut self) -> Vec<PrimRefWriter<'_>> {
        let mut rest = self.refs.as_mut_slice();
        let mut offset = 0;
        let mut ret = Vec::with_capacity(self.regions.len());

        for (thread_index, region) in self.regions.iter().enumerate() {
            let (_gap, tail) = std::mem::take(&mut rest).split_at_mut(region.start - offset);
            let (current, tail) = tail.split_at_mut(region.len());
            ret.push(PrimRefWriter {
                task: TaskSlice::new(thread_index, self.regions.len()),
                region: current,
                len: 0,
            });
            rest = tail;
            offset = region.end;
        }

        ret
    }

    /// Moves the used part of every region to the front and drops the rest.
    /// `used` holds the number of references written by each task.
    pub fn compact(mut self, used: &[usize]) -> Vec<PrimRef> {
        assert!(used.len() == self.regions.len());

        let mut write = 0;
        for (region, &len) in self.regions.iter().zip(used) {
            assert!(len <= region.len());
            for read in region.start..region.start + len {
                self.refs.swap(write, read);
                write += 1;
            }
        }

        self.refs.truncate(write);
        self.refs
    }
}

/// Exclusive access to one task's region of a `PrimRefBuffer`.
#[derive(Debug)]
pub struct PrimRefWriter<'a> {
    task: TaskSlice,
    region: &'a mut [PrimRef],
    len: usize,
}

impl PrimRefWriter<'_> {
    pub fn task(&self) -> TaskSlice {
        self.task
    }

    /// Appends a reference, fails once the region is full.
    pub fn push(&mut self, prim_ref: PrimRef) -> Result<(), BuildError> {
        let capacity = self.region.len();
        let slot = self
            .region
            .get_mut(self.len)
            .ok_or(BuildError::PrimRefOverflow {
                task: self.task.thread_index,
                capacity,
            })?;
        *slot = prim_ref;
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
