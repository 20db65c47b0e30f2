//! The cell tree, a bounding interval hierarchy over the cells of a volume mesh.
//!
//! Each internal node splits its cells in two groups along one axis, and stores the largest
//! extent of the left group (`lmax`) and the smallest extent of the right group (`rmin`) on that
//! axis. Unlike a k-d tree the two intervals may overlap, so every cell belongs to exactly one
//! leaf and no cell is ever duplicated.
//!
//! Both the nodes and the cell indices of the leaves are stored in flat arrays. The nodes are laid
//! out breadth-first and the two children of an internal node always sit next to each other.
//!
//! The construction is described in: C. Garth and K. I. Joy, *Fast, Memory-Efficient Cell
//! Location in Unstructured Grids for Visualization*, IEEE TVCG 16(6), 2010.

mod builder;
mod traversal;

pub use builder::TreeConfig;
pub(crate) use traversal::Frame;

/// A node of the cell tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Node {
    /// A leaf holding the cells `leaves[start..start + size]`.
    Leaf { start: usize, size: usize },
    /// An internal node whose children are `children` and `children + 1`.
    Internal {
        dim: usize,
        children: usize,
        lmax: f64,
        rmin: f64,
    },
}

/// A spatial index over the cells of a volume mesh.
#[derive(Debug, Clone)]
pub struct CellTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) leaves: Vec<usize>,
    depth: usize,
    // Slack on the split planes, at least as large as the bounds slack of any cell
    pub(crate) tolerance: f64,
}

impl CellTree {
    pub(crate) fn from_parts(nodes: Vec<Node>, leaves: Vec<usize>, tolerance: f64) -> Self {
        let depth = max_depth(&nodes);
        Self {
            nodes,
            leaves,
            depth,
            tolerance,
        }
    }

    /// The number of edges between the root and the deepest leaf.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The number of cells indexed by the tree.
    pub fn cell_count(&self) -> usize {
        self.leaves.len()
    }

    /// The cell indices of all the leaves, one leaf after the other.
    pub fn leaves(&self) -> &[usize] {
        &self.leaves
    }

    /// The cell indices of the leaves, grouped by leaf in breadth-first order.
    pub fn leaf_cells(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.nodes.iter().filter_map(|node| match *node {
            Node::Leaf { start, size } => Some(&self.leaves[start..start + size]),
            Node::Internal { .. } => None,
        })
    }

    /// Returns the number of internal nodes and leaves of the tree.
    pub fn node_count(&self) -> (usize, usize) {
        self.nodes
            .iter()
            .fold((0, 0), |(internal, leaves), node| match node {
                Node::Internal { .. } => (internal + 1, leaves),
                Node::Leaf { .. } => (internal, leaves + 1),
            })
    }

    /// Checks the invariants of the tree.
    ///
    /// Useful for debugging purposes.
    ///
    /// # Panics
    ///
    /// Panics if a node points outside the node array, if the leaves overlap or leave holes, or if
    /// a cell is missing or duplicated.
    pub fn check(&self) {
        assert!(!self.nodes.is_empty(), "There should be a root node");
        let mut covered = 0;
        for (idx, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Internal { dim, children, .. } => {
                    assert!(dim < 3, "Node {} splits along an invalid axis", idx);
                    assert!(
                        children > idx && children + 1 < self.nodes.len(),
                        "Node {} has invalid children",
                        idx
                    );
                }
                Node::Leaf { start, size } => {
                    assert!(
                        start + size <= self.leaves.len(),
                        "Leaf {} points outside the leaf array",
                        idx
                    );
                    covered += size;
                }
            }
        }
        assert_eq!(covered, self.leaves.len(), "Leaves should cover every cell once");

        let mut seen = vec![false; self.leaves.len()];
        for &cell in self.leaves.iter() {
            assert!(cell < seen.len(), "Cell {} is out of range", cell);
            assert!(!seen[cell], "Cell {} appears twice", cell);
            seen[cell] = true;
        }
    }

    /// Prints some statistics of the tree.
    ///
    /// Useful for debugging purposes.
    ///
    /// These statistics are:
    /// - Number of internal nodes and leaves
    /// - Depth and average number of cells per leaf
    pub fn print_stats(&self) {
        let (internal, leaves) = self.node_count();
        println!(
            "Cell tree counts:\n\t{} internal node(s)\n\t{} lea(f/ves)\n\t{} cell(s)",
            internal,
            leaves,
            self.cell_count(),
        );
        println!();
        println!(
            "Depth: {}\nAverage cells per leaf: {:.2}",
            self.depth,
            self.cell_count() as f64 / leaves as f64
        );
    }
}

fn max_depth(nodes: &[Node]) -> usize {
    let mut max = 0;
    let mut stack = vec![(0, 0)];
    while let Some((idx, depth)) = stack.pop() {
        match nodes.get(idx) {
            Some(Node::Internal { children, .. }) => {
                stack.push((*children, depth + 1));
                stack.push((*children + 1, depth + 1));
            }
            Some(Node::Leaf { .. }) => max = max.max(depth),
            None => {}
        }
    }
    max
}
