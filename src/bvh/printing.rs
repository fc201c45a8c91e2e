use crate::{geometry::WorldBox, primitives::PrimitiveType, util::Stats};

use super::{Bvh, CompressedNodeLink, NodeLink};

/// Shape of a built tree, for diagnostics
#[derive(Clone, Debug, PartialEq)]
pub struct BvhStatistics {
    /// Depth of leaves, root leaf has depth 0
    pub depth: Stats,
    /// Number of primitives per leaf
    pub leaf_fill: Stats,
    /// Number of blocks per leaf
    pub leaf_blocks: Stats,
    pub inner_node_count: usize,
}

impl<P: PrimitiveType> Bvh<P> {
    pub fn statistics(&self) -> BvhStatistics {
        BvhStatistics {
            depth: self.depth_statistics_recursive(self.root),
            leaf_fill: self
                .leaves()
                .map(|leaf| leaf.blocks.iter().map(|b| b.primitive_count()).sum())
                .collect(),
            leaf_blocks: self.leaves().map(|leaf| leaf.blocks.len()).collect(),
            inner_node_count: self.inner_nodes.len(),
        }
    }

    pub fn log_statistics(&self) {
        let stats = self.statistics();
        log::info!(
            "BVH: {} primitives, {} inner nodes, {} blocks of {} B",
            self.primitive_count,
            stats.inner_node_count,
            self.blocks.len(),
            P::block_size()
        );
        log::info!("Depth: {}", stats.depth);
        log::info!("Leaf fill: {}", stats.leaf_fill);
        log::info!("Blocks per leaf: {}", stats.leaf_blocks);
    }

    /// Logs every node of the tree at debug level.
    pub fn print_tree(&self) {
        self.print_recursive(0, self.root, &self.bounding_box);
    }

    fn depth_statistics_recursive(&self, link: CompressedNodeLink) -> Stats {
        match link.decode() {
            NodeLink::Null => Stats::default(),
            NodeLink::Leaf { .. } => Stats::new_single(0),
            NodeLink::Inner { index } => {
                let node = &self.inner_nodes[index];
                self.depth_statistics_recursive(node.child_links[0])
                    .merge(&self.depth_statistics_recursive(node.child_links[1]))
                    .shifted(1)
            }
        }
    }

    fn print_recursive(&self, indent: usize, link: CompressedNodeLink, enclosing_box: &WorldBox) {
        let prefix = "  ".repeat(indent);
        match link.decode() {
            NodeLink::Null => log::debug!("{prefix}- <EMPTY>"),
            NodeLink::Inner { index } => {
                log::debug!(
                    "{prefix}- I{}: {:?}-{:?}",
                    index.index(),
                    enclosing_box.min,
                    enclosing_box.max
                );
                let node = &self.inner_nodes[index];
                for (child_link, child_box) in node.child_links.iter().zip(&node.child_bounds) {
                    self.print_recursive(indent + 1, *child_link, child_box);
                }
            }
            NodeLink::Leaf { blocks } => {
                log::debug!(
                    "{prefix}- L{}+{}: {:?}-{:?}",
                    blocks.first.index(),
                    blocks.len(),
                    enclosing_box.min,
                    enclosing_box.max
                );
                for block in self.blocks[blocks.into_range()].iter() {
                    let bounds = block.bounds();
                    log::debug!(
                        "{prefix}  {}x {:?}-{:?}{}",
                        block.primitive_count(),
                        bounds.min,
                        bounds.max,
                        if block.is_last() { " (last)" } else { "" }
                    );
                }
            }
        }
    }
}
