use std::sync::Arc;

use crate::cell::Cell;
use crate::cell_locator::{CacheMode, CellLocator};
use crate::cell_tree::{CellTree, Frame, TreeConfig};
use crate::error::LocatorError;
use crate::geometry::Point3;
use crate::mesh::VolumeMesh;

/// A cell locator backed by a [`CellTree`].
///
/// It supports every kind of cells. Building the tree takes `O(n log n)` time for a mesh with `n`
/// cells, after which each query visits `O(log n)` nodes on well-shaped meshes.
///
/// With [`CacheMode::Half`] a query starts from the parent of the leaf of the previous hit, and
/// with [`CacheMode::Full`] it resumes the previous traversal right where it stopped. Both pay
/// off when successive query points are close to each other, e.g. along a streamline.
///
/// # Example
///
/// ```
/// use volloc::{CellLocator, CellTreeLocator, CellType, VolumeMesh};
///
/// let mesh = VolumeMesh::grid(CellType::Hexahedron, [0.; 3], [1.; 3], [4, 4, 4])?;
/// let mut locator = CellTreeLocator::new();
/// locator.attach(&mesh)?;
/// locator.build()?;
///
/// assert_eq!(locator.find_cell(&[0.1, 0.1, 0.1]), Some(0));
/// assert_eq!(locator.find_cell(&[2., 0., 0.]), None);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct CellTreeLocator<'a> {
    mesh: Option<&'a VolumeMesh>,
    cell: Option<Cell<'a>>,
    tree: Option<Arc<CellTree>>,
    config: TreeConfig,
    cache_mode: CacheMode,
    cache: Cache,
}

#[derive(Debug, Clone, Default)]
struct Cache {
    // Parent of the leaf of the last hit
    seed: Option<usize>,
    // Traversal stack at the last hit
    snapshot: Vec<Frame>,
    // Stack of the search among several cells containing the point
    scratch: Vec<Frame>,
}

impl<'a> CellTreeLocator<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// The tree, once built.
    pub fn tree(&self) -> Option<&CellTree> {
        self.tree.as_deref()
    }
}

impl<'a> CellLocator<'a> for CellTreeLocator<'a> {
    fn attach(&mut self, mesh: &'a VolumeMesh) -> Result<(), LocatorError> {
        self.mesh = Some(mesh);
        self.cell = Some(Cell::new(mesh));
        self.tree = None;
        self.clear_cache();
        Ok(())
    }

    fn build(&mut self) -> Result<(), LocatorError> {
        let mesh = self.mesh.ok_or(LocatorError::NotAttached)?;
        let tree = CellTree::build(mesh, &self.config)?;
        self.cache.snapshot = tree.new_stack();
        self.cache.seed = None;
        self.tree = Some(Arc::new(tree));
        Ok(())
    }

    fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    fn set_cache_mode(&mut self, mode: CacheMode) {
        self.cache_mode = mode;
        self.clear_cache();
    }

    fn clear_cache(&mut self) {
        self.cache.seed = None;
        self.cache.snapshot.clear();
    }

    fn try_find_cell(&mut self, point: &Point3) -> Result<Option<usize>, LocatorError> {
        let (Some(cell), Some(tree)) = (self.cell.as_mut(), self.tree.as_deref()) else {
            return Err(LocatorError::NotBuilt);
        };
        let mut contains = |idx: usize| {
            cell.bind(idx);
            cell.contains(point)
        };

        let Cache {
            seed,
            snapshot,
            scratch,
        } = &mut self.cache;
        let hit = match self.cache_mode {
            CacheMode::Off => tree.find(point, snapshot, &mut contains),
            CacheMode::Half => {
                let hit = match *seed {
                    Some(seed) => tree.find_seeded(point, seed, snapshot, &mut contains),
                    None => tree.find(point, snapshot, &mut contains),
                };
                if let Some(hit) = hit {
                    *seed = Some(hit.parent);
                }
                hit
            }
            CacheMode::Full => tree.find_resumed(point, snapshot, &mut contains),
        };
        if self.cache_mode != CacheMode::Full {
            snapshot.clear();
        }
        let Some(hit) = hit else {
            return Ok(None);
        };

        // The first cell found depends on where the search started, settle ties on faces
        cell.bind(hit.cell);
        if !cell.is_near_boundary(point) {
            return Ok(Some(hit.cell));
        }
        let mut contains = |idx: usize| {
            cell.bind(idx);
            cell.contains(point)
        };
        let smallest = tree.find_smallest(point, scratch, &mut contains);
        Ok(Some(smallest.map_or(hit.cell, |smallest| smallest.min(hit.cell))))
    }
}
