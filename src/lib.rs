//! Point location in unstructured volume meshes.
//!
//! Given a mesh made of 3D cells and a query point, a locator finds the cell containing the point.
//! Two locators are available, both implementing the [`CellLocator`] trait:
//! - [`CellTreeLocator`] builds a [`CellTree`], a bounding interval hierarchy over the cells, and
//!   works with every kind of cells.
//! - [`CellAdjacencyGraphLocator`] builds no spatial index and walks from cell to cell across
//!   shared faces instead. It only works with tetrahedral meshes.
//!
//! Both locators can cache the result of the previous query to speed up the next one, which pays
//! off when successive query points are close to each other.
//!
//! ```
//! use volloc::{CacheMode, CellLocator, CellTreeLocator, CellType, VolumeMesh};
//!
//! let mesh = VolumeMesh::grid(CellType::Tetrahedron, [0.; 3], [1.; 3], [10, 10, 10])?;
//! let mut locator = CellTreeLocator::new();
//! locator.attach(&mesh)?;
//! locator.build()?;
//! locator.set_cache_mode(CacheMode::Full);
//!
//! let cells = locator.locate_many(&[[0.05, 0.15, 0.35], [0.95, 0.15, 0.35], [1.5, 0., 0.]]);
//! assert!(cells[0].is_some());
//! assert!(cells[1].is_some());
//! assert_eq!(cells[2], None);
//! # Ok::<(), anyhow::Error>(())
//! ```

mod adjacency_graph;
mod adjacency_graph_locator;
mod cell;
mod cell_locator;
mod cell_tree;
mod cell_tree_locator;
mod error;
mod geometry;
mod mesh;

pub use adjacency_graph::{cell_faces, AdjacencyGraph, BoundaryFace};
pub use adjacency_graph_locator::{CellAdjacencyGraphLocator, WalkConfig};
pub use cell::{Cell, LOCAL_TOLERANCE};
pub use cell_locator::{CacheMode, CellLocator};
pub use cell_tree::{CellTree, TreeConfig};
pub use cell_tree_locator::CellTreeLocator;
pub use error::LocatorError;
pub use geometry::{BoundingBox, Point3};
pub use mesh::{CellType, VolumeMesh};
