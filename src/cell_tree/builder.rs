use std::collections::VecDeque;

use crate::cell::LOCAL_TOLERANCE;
use crate::error::LocatorError;
use crate::geometry::BoundingBox;
use crate::mesh::VolumeMesh;

use super::{CellTree, Node};

const BUCKET_COUNT: usize = 6;

/// Parameters of the construction of a [`CellTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Nodes with fewer cells than this are not split.
    pub leaf_size: usize,
    /// Trees deeper than this are rejected.
    pub max_depth: usize,
    /// Builds the two halves below the root on two threads.
    pub parallel: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            leaf_size: 8,
            max_depth: 32,
            parallel: false,
        }
    }
}

impl TreeConfig {
    pub fn with_leaf_size(mut self, leaf_size: usize) -> Self {
        self.leaf_size = leaf_size;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

// The bounding box of a cell, along with its index in the mesh.
#[derive(Debug, Clone, Copy)]
struct PerCell {
    bbox: BoundingBox,
    index: usize,
}

impl PerCell {
    fn centroid(&self, dim: usize) -> f64 {
        0.5 * (self.bbox.min[dim] + self.bbox.max[dim])
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    min: f64,
    max: f64,
    count: usize,
}

impl Default for Bucket {
    fn default() -> Self {
        Self {
            min: f64::MAX,
            max: -f64::MAX,
            count: 0,
        }
    }
}

impl Bucket {
    fn add(&mut self, min: f64, max: f64) {
        self.min = self.min.min(min);
        self.max = self.max.max(max);
        self.count += 1;
    }

    fn merge(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            count: self.count + other.count,
        }
    }
}

// A split of a node: the axis, and the first cell of the right half.
#[derive(Debug, Clone, Copy)]
struct Split {
    dim: usize,
    mid: usize,
}

impl CellTree {
    /// Builds the cell tree of `mesh`.
    ///
    /// Fails if the resulting tree is deeper than [`TreeConfig::max_depth`].
    pub fn build(mesh: &VolumeMesh, config: &TreeConfig) -> Result<Self, LocatorError> {
        let mut cells: Vec<_> = (0..mesh.cell_count())
            .map(|index| PerCell {
                bbox: BoundingBox::of_cell(mesh, index),
                index,
            })
            .collect();
        let bounds = bounds_of(&cells);

        let nodes = if config.parallel {
            build_parallel(&mut cells, &bounds, config.leaf_size)
        } else {
            let mut builder = Builder::new(config.leaf_size);
            builder.split(0, &mut cells, 0, &bounds);
            breadth_first(&builder.nodes)
        };
        let leaves = cells.iter().map(|cell| cell.index).collect();
        let tolerance = LOCAL_TOLERANCE * bounds.extent().into_iter().fold(1., f64::max);
        let tree = Self::from_parts(nodes, leaves, tolerance);

        if tree.depth() > config.max_depth {
            return Err(LocatorError::TraversalDepthExceeded {
                depth: tree.depth(),
                max_depth: config.max_depth,
            });
        }
        let (internal, leaf_count) = tree.node_count();
        log::debug!(
            "Built a cell tree over {} cells: {} internal nodes, {} leaves, depth {}",
            tree.cell_count(),
            internal,
            leaf_count,
            tree.depth()
        );

        Ok(tree)
    }
}

// Accumulates nodes in pre-order, each split appending its two children at the end.
struct Builder {
    nodes: Vec<Node>,
    leaf_size: usize,
}

impl Builder {
    fn new(leaf_size: usize) -> Self {
        Self {
            nodes: vec![Node::Leaf { start: 0, size: 0 }],
            leaf_size,
        }
    }

    fn split(&mut self, node: usize, cells: &mut [PerCell], start: usize, bounds: &BoundingBox) {
        self.nodes[node] = Node::Leaf {
            start,
            size: cells.len(),
        };
        let Some(Split { dim, mid }) = choose_split(cells, bounds, self.leaf_size) else {
            return;
        };

        let (left, right) = cells.split_at_mut(mid);
        let (left_bounds, right_bounds) = (bounds_of(left), bounds_of(right));
        let children = self.nodes.len();
        self.nodes.push(Node::Leaf { start, size: mid });
        self.nodes.push(Node::Leaf {
            start: start + mid,
            size: right.len(),
        });
        self.nodes[node] = Node::Internal {
            dim,
            children,
            lmax: left_bounds.max[dim],
            rmin: right_bounds.min[dim],
        };

        self.split(children, left, start, &left_bounds);
        self.split(children + 1, right, start + mid, &right_bounds);
    }
}

// Splits the root once, then builds each half on its own thread and merges the two sub-trees.
fn build_parallel(cells: &mut [PerCell], bounds: &BoundingBox, leaf_size: usize) -> Vec<Node> {
    let Some(Split { dim, mid }) = choose_split(cells, bounds, leaf_size) else {
        return vec![Node::Leaf {
            start: 0,
            size: cells.len(),
        }];
    };

    let (left, right) = cells.split_at_mut(mid);
    let (left_bounds, right_bounds) = (bounds_of(left), bounds_of(right));
    let root = Node::Internal {
        dim,
        children: 1,
        lmax: left_bounds.max[dim],
        rmin: right_bounds.min[dim],
    };
    let build_half = |half: &mut [PerCell], bounds: &BoundingBox| {
        let mut builder = Builder::new(leaf_size);
        builder.split(0, half, 0, bounds);
        builder.nodes
    };
    let (left_nodes, right_nodes) = rayon::join(
        || build_half(left, &left_bounds),
        || build_half(right, &right_bounds),
    );

    merge(root, &left_nodes, &right_nodes, mid)
}

// Lays out the two sub-trees breadth-first below `root`, as if they had been built in one go.
fn merge(root: Node, left: &[Node], right: &[Node], left_cell_count: usize) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(1 + left.len() + right.len());
    // `true` for the nodes coming from the right sub-tree
    let mut from_right = Vec::with_capacity(nodes.capacity());
    nodes.push(root);
    from_right.push(false);

    let mut queue = VecDeque::from([(false, 0), (true, 0)]);
    let mut next = 3;
    while let Some((is_right, idx)) = queue.pop_front() {
        let half = if is_right { right } else { left };
        let node = match half[idx] {
            Node::Internal {
                dim,
                children,
                lmax,
                rmin,
            } => {
                queue.push_back((is_right, children));
                queue.push_back((is_right, children + 1));
                next += 2;
                Node::Internal {
                    dim,
                    children: next - 2,
                    lmax,
                    rmin,
                }
            }
            leaf => leaf,
        };
        nodes.push(node);
        from_right.push(is_right);
    }

    for (node, _) in nodes.iter_mut().zip(from_right).filter(|(_, right)| *right) {
        if let Node::Leaf { start, .. } = node {
            *start += left_cell_count;
        }
    }
    nodes
}

// Re-lays out a pre-order node array breadth-first.
fn breadth_first(pre_order: &[Node]) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(pre_order.len());
    let mut queue = VecDeque::from([0]);
    let mut next = 1;
    while let Some(idx) = queue.pop_front() {
        let node = match pre_order[idx] {
            Node::Internal {
                dim,
                children,
                lmax,
                rmin,
            } => {
                queue.push_back(children);
                queue.push_back(children + 1);
                next += 2;
                Node::Internal {
                    dim,
                    children: next - 2,
                    lmax,
                    rmin,
                }
            }
            leaf => leaf,
        };
        nodes.push(node);
    }
    nodes
}

fn bounds_of(cells: &[PerCell]) -> BoundingBox {
    cells.iter().fold(BoundingBox::empty(), |mut bounds, cell| {
        bounds.extend(&cell.bbox);
        bounds
    })
}

// Chooses how to split `cells` and reorders them accordingly.
//
// Returns `None` if the node should stay a leaf.
fn choose_split(cells: &mut [PerCell], bounds: &BoundingBox, leaf_size: usize) -> Option<Split> {
    let n = cells.len();
    if n < 2 || n < leaf_size {
        return None;
    }

    if let Some((dim, plane)) = best_plane(cells, bounds) {
        let bucket = |cell: &PerCell| bucket_index(cell.centroid(dim), bounds, dim);
        let (mut left, right): (Vec<_>, Vec<_>) =
            cells.iter().copied().partition(|cell| bucket(cell) < plane);
        let mid = left.len();
        if mid > 0 && mid < n {
            left.extend(right);
            cells.copy_from_slice(&left);
            return Some(Split { dim, mid });
        }
    }

    // Median split along the largest extent
    let extent = bounds.extent();
    let dim = (0..3)
        .max_by(|&a, &b| extent[a].total_cmp(&extent[b]))
        .unwrap_or(0);
    let mid = n / 2;
    cells.select_nth_unstable_by(mid, |a, b| a.centroid(dim).total_cmp(&b.centroid(dim)));
    Some(Split { dim, mid })
}

// Finds the cheapest split plane over the bucket boundaries of the three axes, as the axis and
// the index of the first bucket of the right half.
fn best_plane(cells: &[PerCell], bounds: &BoundingBox) -> Option<(usize, usize)> {
    let extent = bounds.extent();
    let mut best: Option<(f64, usize, usize)> = None;

    for dim in 0..3 {
        if !(extent[dim] > 0.) {
            continue;
        }
        let mut buckets = [Bucket::default(); BUCKET_COUNT];
        for cell in cells {
            let b = bucket_index(cell.centroid(dim), bounds, dim);
            buckets[b].add(cell.bbox.min[dim], cell.bbox.max[dim]);
        }

        for plane in 1..BUCKET_COUNT {
            let left = buckets[..plane]
                .iter()
                .fold(Bucket::default(), |acc, b| acc.merge(b));
            let right = buckets[plane..]
                .iter()
                .fold(Bucket::default(), |acc, b| acc.merge(b));
            if left.count == 0 || right.count == 0 {
                continue;
            }
            let covered = |b: &Bucket| (b.max - b.min) / extent[dim];
            let cost = covered(&left) * left.count as f64 + covered(&right) * right.count as f64;
            if best.map_or(true, |(best_cost, ..)| cost < best_cost) {
                best = Some((cost, dim, plane));
            }
        }
    }

    best.map(|(_, dim, plane)| (dim, plane))
}

fn bucket_index(centroid: f64, bounds: &BoundingBox, dim: usize) -> usize {
    let extent = bounds.max[dim] - bounds.min[dim];
    if !(extent > 0.) {
        return 0;
    }
    let b = ((centroid - bounds.min[dim]) / extent * BUCKET_COUNT as f64).floor();
    // Negative and NaN values saturate to 0
    (b as usize).min(BUCKET_COUNT - 1)
}
