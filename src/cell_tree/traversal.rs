use crate::geometry::Point3;

use super::{CellTree, Node};

/// An entry of the traversal stack: a node to visit and the node it was reached from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Frame {
    pub(crate) node: usize,
    pub(crate) parent: usize,
}

impl Frame {
    pub(crate) const ROOT: Frame = Frame { node: 0, parent: 0 };
}

/// A successful traversal: the cell containing the point and the parent of its leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Hit {
    pub(crate) cell: usize,
    pub(crate) parent: usize,
}

impl CellTree {
    /// A stack large enough to hold a whole traversal without growing, plus one seed.
    pub(crate) fn new_stack(&self) -> Vec<Frame> {
        Vec::with_capacity(self.depth() + 2)
    }

    /// Depth-first search from the root.
    pub(crate) fn find<F>(&self, point: &Point3, stack: &mut Vec<Frame>, contains: &mut F) -> Option<Hit>
    where
        F: FnMut(usize) -> bool,
    {
        stack.clear();
        stack.push(Frame::ROOT);
        self.traverse(point, stack, contains)
    }

    /// Depth-first search from `seed` first, then from the root.
    pub(crate) fn find_seeded<F>(
        &self,
        point: &Point3,
        seed: usize,
        stack: &mut Vec<Frame>,
        contains: &mut F,
    ) -> Option<Hit>
    where
        F: FnMut(usize) -> bool,
    {
        stack.clear();
        stack.push(Frame::ROOT);
        if seed != 0 {
            stack.push(Frame {
                node: seed,
                parent: seed,
            });
        }
        self.traverse(point, stack, contains)
    }

    /// Resumes the search saved in `stack`, then searches again from the root if it fails.
    ///
    /// On success `stack` holds the frames still pending, topped by the leaf of the hit.
    pub(crate) fn find_resumed<F>(
        &self,
        point: &Point3,
        stack: &mut Vec<Frame>,
        contains: &mut F,
    ) -> Option<Hit>
    where
        F: FnMut(usize) -> bool,
    {
        if !stack.is_empty() {
            if let Some(hit) = self.traverse(point, stack, contains) {
                return Some(hit);
            }
        }
        self.find(point, stack, contains)
    }

    // On success the leaf frame of the hit is pushed back on top of the stack, so that the next
    // search can resume from it.
    fn traverse<F>(&self, point: &Point3, stack: &mut Vec<Frame>, contains: &mut F) -> Option<Hit>
    where
        F: FnMut(usize) -> bool,
    {
        while let Some(frame) = stack.pop() {
            match self.nodes[frame.node] {
                Node::Leaf { start, size } => {
                    let found = self.leaves[start..start + size]
                        .iter()
                        .copied()
                        .find(|&cell| contains(cell));
                    if let Some(cell) = found {
                        stack.push(frame);
                        return Some(Hit {
                            cell,
                            parent: frame.parent,
                        });
                    }
                }
                Node::Internal { .. } => self.push_children(point, frame, stack),
            }
        }
        None
    }

    /// Visits every leaf whose range holds `point` and returns the smallest cell containing it.
    pub(crate) fn find_smallest<F>(
        &self,
        point: &Point3,
        stack: &mut Vec<Frame>,
        contains: &mut F,
    ) -> Option<usize>
    where
        F: FnMut(usize) -> bool,
    {
        stack.clear();
        stack.push(Frame::ROOT);
        let mut smallest: Option<usize> = None;
        while let Some(frame) = stack.pop() {
            match self.nodes[frame.node] {
                Node::Leaf { start, size } => {
                    for &cell in self.leaves[start..start + size].iter() {
                        if smallest.map_or(true, |s| cell < s) && contains(cell) {
                            smallest = Some(cell);
                        }
                    }
                }
                Node::Internal { .. } => self.push_children(point, frame, stack),
            }
        }
        smallest
    }

    fn push_children(&self, point: &Point3, frame: Frame, stack: &mut Vec<Frame>) {
        let Node::Internal {
            dim,
            children,
            lmax,
            rmin,
        } = self.nodes[frame.node]
        else {
            return;
        };
        let p = point[dim];
        let left = Frame {
            node: children,
            parent: frame.node,
        };
        let right = Frame {
            node: children + 1,
            parent: frame.node,
        };
        match (p <= lmax + self.tolerance, p >= rmin - self.tolerance) {
            // The nearer child is pushed last, so it is visited first
            (true, true) if lmax - p < p - rmin => {
                stack.push(left);
                stack.push(right);
            }
            (true, true) => {
                stack.push(right);
                stack.push(left);
            }
            (true, false) => stack.push(left),
            (false, true) => stack.push(right),
            (false, false) => {}
        }
    }
}
