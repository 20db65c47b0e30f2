//! A reusable view on one cell of a [`VolumeMesh`].

mod shape;

use rand::Rng;
use smallvec::SmallVec;

use crate::geometry::{add, distance, scale, sub, BoundingBox, Mat3, Point3};
use crate::mesh::{CellType, VolumeMesh};

/// Tolerance on local coordinates when testing containment, so that points on a face shared by
/// two cells belong to at least one of them.
pub const LOCAL_TOLERANCE: f64 = 1e-9;

// Points closer than this to the boundary of a cell, in local coordinates, may also lie in a
// neighbor, whatever the relative sizes of the two cells.
const BOUNDARY_BAND: f64 = 1e-6;

const MAX_NEWTON_ITERATIONS: usize = 100;
const NEWTON_TOLERANCE: f64 = 1e-12;

/// A cell of a mesh, bound to one cell index at a time.
///
/// Binding copies the node coordinates of the cell into a small inline buffer, so that a single
/// `Cell` can be re-bound over and over during a query without allocating.
#[derive(Debug, Clone)]
pub struct Cell<'a> {
    mesh: &'a VolumeMesh,
    index: usize,
    coords: SmallVec<[Point3; 20]>,
    bounds: BoundingBox,
}

impl<'a> Cell<'a> {
    /// Creates an unbound cell of `mesh`, which contains nothing until [`Cell::bind`] is called.
    pub fn new(mesh: &'a VolumeMesh) -> Self {
        Self {
            mesh,
            index: 0,
            coords: SmallVec::new(),
            bounds: BoundingBox::empty(),
        }
    }

    /// Binds the cell `index` of the mesh.
    pub fn bind(&mut self, index: usize) {
        self.index = index;
        self.coords.clear();
        self.coords.extend(
            self.mesh
                .cell_nodes(index)
                .iter()
                .map(|&node| self.mesh.coords(node)),
        );
        self.bounds = BoundingBox::from_points(self.coords.iter().copied());
    }

    pub fn mesh(&self) -> &'a VolumeMesh {
        self.mesh
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn cell_type(&self) -> CellType {
        self.mesh.cell_type()
    }

    /// The coordinates of the nodes of the bound cell.
    pub fn coords(&self) -> &[Point3] {
        &self.coords
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// The average of the node coordinates.
    pub fn center(&self) -> Point3 {
        let sum = self.coords.iter().fold([0.; 3], |acc, &p| add(acc, p));
        scale(sum, 1. / self.coords.len() as f64)
    }

    /// Maps local coordinates to the global space.
    pub fn local_to_global(&self, local: Point3) -> Point3 {
        shape::weights(self.cell_type(), local)
            .iter()
            .zip(&self.coords)
            .fold([0.; 3], |acc, (&w, &p)| add(acc, scale(p, w)))
    }

    /// Maps `point` to the local coordinates of the bound cell with Newton-Raphson iterations.
    ///
    /// Returns [`None`] if the iterations do not converge or hit a singular Jacobian, which
    /// happens for points far from a non-affine cell.
    pub fn global_to_local(&self, point: &Point3) -> Option<Point3> {
        let cell_type = self.cell_type();
        if cell_type == CellType::Point {
            return (distance(self.coords[0], *point) <= LOCAL_TOLERANCE).then_some([0.; 3]);
        }

        let mut local = shape::local_center(cell_type);
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let residual = sub(*point, self.local_to_global(local));
            let delta = self.jacobian(local).solve(residual)?;
            local = add(local, delta);
            if delta.iter().all(|d| d.abs() <= NEWTON_TOLERANCE) {
                return Some(local);
            }
        }
        None
    }

    /// Returns `true` if `point` lies in the bound cell.
    pub fn contains(&self, point: &Point3) -> bool {
        let tolerance = LOCAL_TOLERANCE * self.bounds.extent().into_iter().fold(1., f64::max);
        if !self.bounds.contains(point, tolerance) {
            return false;
        }
        self.global_to_local(point)
            .map_or(false, |local| shape::contains_local(self.cell_type(), local, LOCAL_TOLERANCE))
    }

    /// Returns `true` if `point` lies close enough to the boundary of the bound cell to possibly
    /// belong to a neighbor as well.
    pub fn is_near_boundary(&self, point: &Point3) -> bool {
        self.global_to_local(point).map_or(true, |local| {
            shape::boundary_slack(self.cell_type(), local) <= BOUNDARY_BAND
        })
    }

    /// Draws a random point inside the bound cell.
    pub fn random_sampling<R: Rng>(&self, rng: &mut R) -> Point3 {
        self.local_to_global(shape::random_local(self.cell_type(), rng))
    }

    // Derivatives of the global coordinates with respect to the local ones.
    fn jacobian(&self, local: Point3) -> Mat3 {
        let mut jac = [[0.; 3]; 3];
        for (grad, p) in shape::gradients(self.cell_type(), local)
            .iter()
            .zip(&self.coords)
        {
            for (row, &pr) in jac.iter_mut().zip(p) {
                for (entry, &g) in row.iter_mut().zip(grad) {
                    *entry += pr * g;
                }
            }
        }
        Mat3(jac)
    }
}
