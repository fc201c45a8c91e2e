mod building;
mod partition;
mod prim_ref;
mod printing;
mod settings;
mod traversal;

pub use building::{BuildError, LeafSlot, PrimitiveBuilder, build_bvh};
pub(crate) use building::fill_blocks;
pub use prim_ref::{PrimRef, PrimRefBuffer, PrimRefWriter, TaskSlice};
pub use printing::BvhStatistics;
pub use settings::BuildSettings;
pub use traversal::LeafIntersector;

use index_vec::IndexVec;
use thiserror::Error;

use crate::{geometry::WorldBox, primitives::PrimitiveType};

/// Binary bounding volume hierarchy with leaf blocks of primitive type `P`.
///
/// Leaves reference contiguous runs of blocks in a single arena, in depth-first order
/// of the tree.
#[derive(Clone, Debug)]
pub struct Bvh<P> {
    bounding_box: WorldBox,
    root: CompressedNodeLink,

    inner_nodes: IndexVec<NodeIdx, InnerNode>,
    blocks: IndexVec<BlockIdx, P>,

    primitive_count: usize,
    max_leaf_size: usize,
}

#[derive(Clone, Debug, Default)]
pub struct InnerNode {
    pub child_bounds: [WorldBox; 2],
    pub child_links: [CompressedNodeLink; 2],
}

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CompressedNodeLink(u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeLink {
    Null,
    Inner { index: NodeIdx },
    Leaf { blocks: BlockIdxRange },
}

impl CompressedNodeLink {
    const COUNT_BITS: u32 = 4;
    const COUNT_MASK: u32 = (1 << Self::COUNT_BITS) - 1;
    const NULL_VALUE: u32 = (u32::MAX >> Self::COUNT_BITS) << Self::COUNT_BITS;

    pub const MAX_INDEX: u32 = (u32::MAX >> Self::COUNT_BITS) - 1;
    pub const MIN_COUNT: u32 = 1;
    pub const MAX_COUNT: u32 = (1 << Self::COUNT_BITS) - 1;

    pub const NULL: Self = Self(Self::NULL_VALUE);

    /// Create a new leaf link, panics if index or count are out of range
    fn new_leaf(index: BlockIdx, count: u32) -> Self {
        assert!(count >= Self::MIN_COUNT);
        assert!(count <= Self::MAX_COUNT);
        Self(index.raw() << Self::COUNT_BITS | count)
    }

    /// Create a new inner node link, panics if index is out of range
    fn new_inner(index: NodeIdx) -> Self {
        Self(index.raw() << Self::COUNT_BITS)
    }

    pub fn decode(&self) -> NodeLink {
        if self.is_null() {
            NodeLink::Null
        } else {
            let count = self.0 & Self::COUNT_MASK;
            let index = self.0 >> Self::COUNT_BITS;

            if count == 0 {
                NodeLink::Inner {
                    index: NodeIdx::from_raw_unchecked(index),
                }
            } else {
                NodeLink::Leaf {
                    blocks: BlockIdxRange::new(BlockIdx::from_raw_unchecked(index), count),
                }
            }
        }
    }

    pub fn is_null(&self) -> bool {
        self.0 == Self::NULL_VALUE
    }
}

impl Default for CompressedNodeLink {
    fn default() -> Self {
        Self::NULL
    }
}

impl std::fmt::Debug for CompressedNodeLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeLink")
            .field("0", &self.0)
            .field("<decoded>", &self.decode())
            .finish()
    }
}

index_vec::define_index_type! {
    pub struct NodeIdx = u32;
    MAX_INDEX = CompressedNodeLink::MAX_INDEX as usize;
    IMPL_RAW_CONVERSIONS = true;
}

index_vec::define_index_type! {
    pub struct BlockIdx = u32;
    MAX_INDEX = CompressedNodeLink::MAX_INDEX as usize;
    IMPL_RAW_CONVERSIONS = true;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockIdxRange {
    pub first: BlockIdx,
    pub last: BlockIdx,
}

impl BlockIdxRange {
    pub fn new(first: BlockIdx, count: u32) -> BlockIdxRange {
        BlockIdxRange {
            first,
            last: first + (count as usize),
        }
    }

    pub fn into_range(self) -> std::ops::Range<BlockIdx> {
        self.first..self.last
    }

    pub fn len(&self) -> usize {
        self.last.index() - self.first.index()
    }

    pub fn is_empty(&self) -> bool {
        self.first == self.last
    }
}

/// Leaf of a BVH as seen by `Bvh::leaves`
#[derive(Debug)]
pub struct Leaf<'a, P> {
    pub bounds: WorldBox,
    pub depth: usize,
    pub blocks: &'a [P],
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Child {child} of inner node {node} is not contained in the node's bounds")]
    ChildOutsideParent { node: usize, child: usize },

    #[error("Block {block} is not contained in its leaf's bounds")]
    BlockOutsideLeaf { block: usize },

    #[error("Leaf starting at block {first_block} holds {count} primitives, limit is {limit}")]
    LeafTooLarge {
        first_block: usize,
        count: usize,
        limit: usize,
    },

    #[error("Inner node {node} has a null child")]
    NullChild { node: usize },

    #[error("Tree holds {found} primitives, expected {expected}")]
    PrimitiveCountMismatch { expected: usize, found: usize },
}

impl<P> Bvh<P> {
    pub fn bounding_box(&self) -> &WorldBox {
        &self.bounding_box
    }

    /// Number of primitive references the tree was built from
    pub fn primitive_count(&self) -> usize {
        self.primitive_count
    }

    /// Number of inner nodes
    pub fn node_count(&self) -> usize {
        self.inner_nodes.len()
    }

    pub fn blocks(&self) -> &[P] {
        self.blocks.as_raw_slice()
    }

    pub fn root(&self) -> NodeLink {
        self.root.decode()
    }

    pub fn inner_node(&self, index: NodeIdx) -> &InnerNode {
        &self.inner_nodes[index]
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_null()
    }

    /// Iterates over all leaves, in depth first order (same as the block order).
    pub fn leaves(&self) -> impl Iterator<Item = Leaf<'_, P>> {
        let mut stack = vec![(self.root, self.bounding_box.clone(), 0usize)];

        std::iter::from_fn(move || {
            while let Some((link, bounds, depth)) = stack.pop() {
                match link.decode() {
                    NodeLink::Null => continue,
                    NodeLink::Inner { index } => {
                        let node = &self.inner_nodes[index];
                        // Pushed in reverse, so that the first child is popped first
                        for i in (0..2).rev() {
                            stack.push((
                                node.child_links[i],
                                node.child_bounds[i].clone(),
                                depth + 1,
                            ));
                        }
                    }
                    NodeLink::Leaf { blocks } => {
                        return Some(Leaf {
                            bounds,
                            depth,
                            blocks: self.blocks[blocks.into_range()].as_raw_slice(),
                        });
                    }
                }
            }
            None
        })
    }
}

impl<P: PrimitiveType> Bvh<P> {
    /// Checks the structural invariants of the tree: child bounds inside parent bounds,
    /// leaf blocks inside leaf bounds, leaf sizes and total primitive count.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (node_index, node) in self.inner_nodes.iter_enumerated() {
            for child in 0..2 {
                if node.child_links[child].is_null() {
                    return Err(ValidationError::NullChild {
                        node: node_index.index(),
                    });
                }
            }
        }

        let mut stack = vec![(self.root, self.bounding_box.clone())];
        let mut found = 0;

        while let Some((link, bounds)) = stack.pop() {
            match link.decode() {
                NodeLink::Null => {}
                NodeLink::Inner { index } => {
                    let node = &self.inner_nodes[index];
                    for child in 0..2 {
                        if !bounds.contains_box(&node.child_bounds[child]) {
                            return Err(ValidationError::ChildOutsideParent {
                                node: index.index(),
                                child,
                            });
                        }
                        stack.push((node.child_links[child], node.child_bounds[child].clone()));
                    }
                }
                NodeLink::Leaf { blocks } => {
                    let mut count = 0;
                    for block_index in blocks.first.index()..blocks.last.index() {
                        let block = &self.blocks[BlockIdx::from_usize(block_index)];
                        if !bounds.contains_box(&block.bounds()) {
                            return Err(ValidationError::BlockOutsideLeaf { block: block_index });
                        }
                        count += block.primitive_count();
                    }

                    if count > self.max_leaf_size {
                        return Err(ValidationError::LeafTooLarge {
                            first_block: blocks.first.index(),
                            count,
                            limit: self.max_leaf_size,
                        });
                    }
                    found += count;
                }
            }
        }

        if found != self.primitive_count {
            return Err(ValidationError::PrimitiveCountMismatch {
                expected: self.primitive_count,
                found,
            });
        }

        Ok(())
    }
}
