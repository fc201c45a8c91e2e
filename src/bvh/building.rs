//! Generic BVH construction, parametrized by the primitive kind through `PrimitiveBuilder`.

use std::{ops::Range, time::Instant};

use index_vec::IndexVec;
use rayon::prelude::*;
use thiserror::Error;

use crate::{geometry::WorldBox, primitives::PrimitiveType, scene::SceneError};

use super::{
    BlockIdx, BuildSettings, Bvh, CompressedNodeLink, InnerNode, NodeIdx, PrimRef,
    PrimRefBuffer, PrimRefWriter, TaskSlice,
    partition::{BuildNode, partition},
};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum BuildError {
    #[error("Task {task} produced more primitive references than its region holds ({capacity})")]
    PrimRefOverflow { task: usize, capacity: usize },

    #[error("Invalid build settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error("Block {block} was not filled by its leaf")]
    UnfilledLeaf { block: usize },

    #[error("Leaf ran out of blocks with {refs_left} references left")]
    LeafOverfilled { refs_left: usize },
}

/// References of one leaf together with the block slots the leaf must fill.
#[derive(Debug)]
pub struct LeafSlot<'a, P> {
    pub refs: &'a [PrimRef],
    pub blocks: &'a mut [Option<P>],
}

/// Primitive kind specific parts of a BVH build.
///
/// `build_bvh` calls these in a fixed order: `primitive_count`, then `compute_prim_refs`
/// once for every task, then (after partitioning) `create_accel` once for every task.
/// Everything except partitioning can be overridden.
pub trait PrimitiveBuilder: Sync {
    type Primitive: PrimitiveType;

    /// Human readable name, used in log messages
    fn builder_name(&self) -> &'static str;

    /// Number of source primitives, sizes the reference buffer.
    fn primitive_count(&self) -> usize;

    /// Pushes references for the primitives of the writer's task slice.
    fn compute_prim_refs(
        &self,
        settings: &BuildSettings,
        writer: &mut PrimRefWriter<'_>,
    ) -> Result<(), BuildError>;

    /// Fills the block slots of a contiguous run of leaves.
    fn create_accel(
        &self,
        settings: &BuildSettings,
        _task: TaskSlice,
        leaves: &mut [LeafSlot<'_, Self::Primitive>],
    ) -> Result<(), BuildError> {
        for leaf in leaves {
            self.create_leaf(settings, leaf.refs, leaf.blocks)?;
        }
        Ok(())
    }

    /// Fills the blocks of a single leaf, `out` has `blocks_for(refs.len())` slots.
    fn create_leaf(
        &self,
        settings: &BuildSettings,
        refs: &[PrimRef],
        out: &mut [Option<Self::Primitive>],
    ) -> Result<(), BuildError>;
}

/// Builds a BVH over all primitives provided by the builder.
pub fn build_bvh<B: PrimitiveBuilder>(
    builder: &B,
    settings: &BuildSettings,
) -> Result<Bvh<B::Primitive>, BuildError> {
    settings.validate()?;
    let max_blocks = <B::Primitive as PrimitiveType>::blocks_for(settings.max_leaf_size);
    if max_blocks > CompressedNodeLink::MAX_COUNT as usize {
        return Err(BuildError::InvalidSettings(format!(
            "max_leaf_size {} needs {max_blocks} blocks per leaf, limit is {}",
            settings.max_leaf_size,
            CompressedNodeLink::MAX_COUNT
        )));
    }

    let name = builder.builder_name();
    log::info!("{name}: building");
    let start = Instant::now();

    let primitive_count = builder.primitive_count();
    let mut refs = compute_prim_refs(builder, settings, primitive_count)?;
    log::debug!(
        "{name}: {} references from {primitive_count} primitives",
        refs.len()
    );

    if refs.is_empty() {
        log::info!("{name}: done, empty tree");
        return Ok(Bvh {
            bounding_box: WorldBox::empty(),
            root: CompressedNodeLink::NULL,
            inner_nodes: IndexVec::new(),
            blocks: IndexVec::new(),
            primitive_count: 0,
            max_leaf_size: settings.max_leaf_size,
        });
    }

    let tree = partition(&mut refs, settings);

    let mut layout = Layout::default();
    let root = layout.flatten::<B::Primitive>(&tree);
    log::debug!(
        "{name}: {} inner nodes, {} leaves, {} blocks",
        layout.inner_nodes.len(),
        layout.leaves.len(),
        layout.block_count
    );

    let blocks = create_accel(builder, settings, &refs, &layout)?;

    let bvh = Bvh {
        bounding_box: tree.bounds().clone(),
        root,
        inner_nodes: layout.inner_nodes,
        blocks,
        primitive_count: refs.len(),
        max_leaf_size: settings.max_leaf_size,
    };

    log::info!(
        "{name}: done, {} primitives in {:.2?}",
        bvh.primitive_count,
        start.elapsed()
    );
    Ok(bvh)
}

fn compute_prim_refs<B: PrimitiveBuilder>(
    builder: &B,
    settings: &BuildSettings,
    primitive_count: usize,
) -> Result<Vec<PrimRef>, BuildError> {
    let mut buffer =
        PrimRefBuffer::new(primitive_count, settings.growth_factor, settings.task_count);

    let used: Vec<usize> = {
        let mut writers = buffer.writers();
        writers
            .par_iter_mut()
            .try_for_each(|writer| builder.compute_prim_refs(settings, writer))?;
        writers.iter().map(|writer| writer.len()).collect()
    };

    Ok(buffer.compact(&used))
}

#[derive(Clone, Debug)]
struct LeafLayout {
    refs: Range<usize>,
    blocks: Range<usize>,
}

/// Final node arena and leaf placement, produced from the partition tree.
#[derive(Debug, Default)]
struct Layout {
    inner_nodes: IndexVec<NodeIdx, InnerNode>,
    leaves: Vec<LeafLayout>,
    block_count: usize,
}

impl Layout {
    fn flatten<P: PrimitiveType>(&mut self, node: &BuildNode) -> CompressedNodeLink {
        match node {
            BuildNode::Leaf { range, .. } => {
                let count = P::blocks_for(range.len());
                let first = self.block_count;
                self.block_count += count;
                self.leaves.push(LeafLayout {
                    refs: range.clone(),
                    blocks: first..self.block_count,
                });
                CompressedNodeLink::new_leaf(BlockIdx::from_usize(first), count as u32)
            }
            BuildNode::Inner { children, .. } => {
                // Create placeholder node that will be overwriten later
                self.inner_nodes.push(InnerNode::default());
                let node_index = self.inner_nodes.last_idx();

                let child_links = [
                    self.flatten::<P>(&children[0]),
                    self.flatten::<P>(&children[1]),
                ];

                self.inner_nodes[node_index] = InnerNode {
                    child_bounds: [children[0].bounds().clone(), children[1].bounds().clone()],
                    child_links,
                };

                CompressedNodeLink::new_inner(node_index)
            }
        }
    }
}

fn create_accel<B: PrimitiveBuilder>(
    builder: &B,
    settings: &BuildSettings,
    refs: &[PrimRef],
    layout: &Layout,
) -> Result<IndexVec<BlockIdx, B::Primitive>, BuildError> {
    let mut slots: Vec<Option<B::Primitive>> = (0..layout.block_count).map(|_| None).collect();

    {
        let mut leaf_slots = Vec::with_capacity(layout.leaves.len());
        let mut rest = slots.as_mut_slice();
        for leaf in &layout.leaves {
            let (current, tail) = std::mem::take(&mut rest).split_at_mut(leaf.blocks.len());
            leaf_slots.push(LeafSlot {
                refs: &refs[leaf.refs.clone()],
                blocks: current,
            });
            rest = tail;
        }

        let leaf_count = leaf_slots.len();
        let mut tasks = Vec::with_capacity(settings.task_count);
        let mut rest = leaf_slots.as_mut_slice();
        for task in TaskSlice::all(settings.task_count) {
            let (current, tail) = std::mem::take(&mut rest).split_at_mut(task.range(leaf_count).len());
            tasks.push((task, current));
            rest = tail;
        }

        tasks
            .into_par_iter()
            .try_for_each(|(task, leaves)| builder.create_accel(settings, task, leaves))?;
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(block, slot)| slot.ok_or(BuildError::UnfilledLeaf { block }))
        .collect()
}

/// Fills the blocks of a leaf in reference order until the references run out.
/// Each call of `fill` consumes one or more references, all of them must be consumed
/// by the time the blocks run out.
pub(crate) fn fill_blocks<P>(
    refs: &[PrimRef],
    out: &mut [Option<P>],
    mut fill: impl FnMut(&mut std::iter::Peekable<std::slice::Iter<'_, PrimRef>>) -> Result<P, BuildError>,
) -> Result<(), BuildError> {
    let mut iter = refs.iter().peekable();
    for slot in out.iter_mut() {
        if iter.peek().is_none() {
            break;
        }
        *slot = Some(fill(&mut iter)?);
    }

    let refs_left = iter.count();
    if refs_left > 0 {
        return Err(BuildError::LeafOverfilled { refs_left });
    }
    Ok(())
}
