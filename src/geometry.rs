use crate::mesh::VolumeMesh;

/// A point (or vector) of the 3D space.
pub type Point3 = [f64; 3];

pub(crate) fn add([x0, y0, z0]: Point3, [x1, y1, z1]: Point3) -> Point3 {
    [x0 + x1, y0 + y1, z0 + z1]
}

pub(crate) fn sub([x0, y0, z0]: Point3, [x1, y1, z1]: Point3) -> Point3 {
    [x0 - x1, y0 - y1, z0 - z1]
}

pub(crate) fn scale([x, y, z]: Point3, s: f64) -> Point3 {
    [x * s, y * s, z * s]
}

pub(crate) fn dot([x0, y0, z0]: Point3, [x1, y1, z1]: Point3) -> f64 {
    x0 * x1 + y0 * y1 + z0 * z1
}

pub(crate) fn cross([x0, y0, z0]: Point3, [x1, y1, z1]: Point3) -> Point3 {
    [y0 * z1 - z0 * y1, z0 * x1 - x0 * z1, x0 * y1 - y0 * x1]
}

pub(crate) fn distance(a: Point3, b: Point3) -> f64 {
    let d = sub(a, b);
    dot(d, d).sqrt()
}

/// A 3x3 matrix stored row by row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Mat3(pub(crate) [[f64; 3]; 3]);

impl Mat3 {
    /// Builds a matrix whose columns are the three given vectors.
    pub(crate) fn from_columns(c0: Point3, c1: Point3, c2: Point3) -> Self {
        Self([
            [c0[0], c1[0], c2[0]],
            [c0[1], c1[1], c2[1]],
            [c0[2], c1[2], c2[2]],
        ])
    }

    fn column(&self, j: usize) -> Point3 {
        [self.0[0][j], self.0[1][j], self.0[2][j]]
    }

    pub(crate) fn determinant(&self) -> f64 {
        dot(self.column(0), cross(self.column(1), self.column(2)))
    }

    #[cfg(test)]
    pub(crate) fn mul_vec(&self, v: Point3) -> Point3 {
        [dot(self.0[0], v), dot(self.0[1], v), dot(self.0[2], v)]
    }

    /// Solves `self * x = rhs` with Cramer's rule.
    ///
    /// Returns [`None`] if the matrix is singular.
    pub(crate) fn solve(&self, rhs: Point3) -> Option<Point3> {
        let det = self.determinant();
        if det == 0. || !det.is_finite() {
            return None;
        }
        let (c0, c1, c2) = (self.column(0), self.column(1), self.column(2));
        let x = [
            dot(rhs, cross(c1, c2)) / det,
            dot(c0, cross(rhs, c2)) / det,
            dot(c0, cross(c1, rhs)) / det,
        ];
        x.iter().all(|v| v.is_finite()).then_some(x)
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point3,
    pub max: Point3,
}

impl BoundingBox {
    /// The empty box, i.e. the neutral element of [`BoundingBox::extend`].
    pub fn empty() -> Self {
        Self {
            min: [f64::MAX; 3],
            max: [-f64::MAX; 3],
        }
    }

    /// The smallest box containing all the given points.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = Point3>,
    {
        let mut bbox = Self::empty();
        for point in points {
            bbox.add_point(point);
        }
        bbox
    }

    /// Computes the bounding box of the cell `index` of `mesh` from its node coordinates.
    pub fn of_cell(mesh: &VolumeMesh, index: usize) -> Self {
        Self::from_points(mesh.cell_nodes(index).iter().map(|&node| mesh.coords(node)))
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|d| self.min[d] > self.max[d])
    }

    pub fn add_point(&mut self, point: Point3) {
        for d in 0..3 {
            self.min[d] = self.min[d].min(point[d]);
            self.max[d] = self.max[d].max(point[d]);
        }
    }

    pub fn extend(&mut self, other: &Self) {
        for d in 0..3 {
            self.min[d] = self.min[d].min(other.min[d]);
            self.max[d] = self.max[d].max(other.max[d]);
        }
    }

    pub fn extent(&self) -> Point3 {
        sub(self.max, self.min)
    }

    /// Returns `true` if `point` lies in the box inflated by `tolerance` on every side.
    pub fn contains(&self, point: &Point3, tolerance: f64) -> bool {
        (0..3).all(|d| point[d] >= self.min[d] - tolerance && point[d] <= self.max[d] + tolerance)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}
