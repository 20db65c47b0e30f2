use rayon::prelude::*;

use crate::error::LocatorError;
use crate::geometry::Point3;
use crate::mesh::VolumeMesh;

/// Where a locator starts looking for the next query point.
///
/// The cache only changes how fast a cell is found, never which cell is found. A point on a face
/// shared by several cells resolves to the smallest of their indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CacheMode {
    /// Every query starts from scratch.
    #[default]
    Off,
    /// Queries start close to the previous hit.
    Half,
    /// Queries resume exactly where the previous hit left off.
    Full,
}

/// A trait to locate one or several query points within a volume mesh.
///
/// A locator is first attached to a mesh, then built, and can then answer queries. Queries take
/// `&mut self` because they update the cache of the locator. To query from several threads, clone
/// the locator: clones share the search structure and own their cache.
pub trait CellLocator<'a> {
    /// Binds the locator to `mesh`.
    ///
    /// Fails if the locator does not support the kind of cells of the mesh.
    fn attach(&mut self, mesh: &'a VolumeMesh) -> Result<(), LocatorError>;

    /// Builds the search structure of the attached mesh.
    fn build(&mut self) -> Result<(), LocatorError>;

    fn cache_mode(&self) -> CacheMode;

    /// Changes the cache mode. The cache is cleared.
    fn set_cache_mode(&mut self, mode: CacheMode);

    /// Forgets everything learned from previous queries.
    fn clear_cache(&mut self);

    /// Locates one query point within the mesh.
    ///
    /// Returns `Ok(None)` if the query point does not lie in any cell of the mesh, and an error if
    /// the locator is not built.
    fn try_find_cell(&mut self, point: &Point3) -> Result<Option<usize>, LocatorError>;

    /// Locates one query point within the mesh.
    ///
    /// Returns [`None`] if the query point does not lie in any cell of the mesh.
    ///
    /// # Panics
    ///
    /// Panics if the locator has not been attached and built.
    fn find_cell(&mut self, point: &Point3) -> Option<usize> {
        match self.try_find_cell(point) {
            Ok(cell) => cell,
            Err(err) => panic!("Cannot locate a point: {}", err),
        }
    }

    /// Locates several query points within the mesh, in order.
    fn locate_many(&mut self, points: &[Point3]) -> Vec<Option<usize>> {
        points.iter().map(|point| self.find_cell(point)).collect()
    }

    /// Locates several query points within the mesh in parallel.
    ///
    /// Each worker queries its own clone of the locator.
    fn par_locate_many(&self, points: &[Point3]) -> Vec<Option<usize>>
    where
        Self: Clone + Sync,
    {
        points
            .par_iter()
            .map_init(|| self.clone(), |locator, point| locator.find_cell(point))
            .collect()
    }
}
