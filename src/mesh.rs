use std::collections::HashMap;
use std::fmt::Display;

use anyhow::{anyhow, Result};
use itertools::iproduct;

use crate::geometry::{add, scale, BoundingBox, Point3};

/// The kind of cells an unstructured volume mesh is made of.
///
/// Node ordering follows the VTK conventions:
/// - [`Tetrahedron`](CellType::Tetrahedron): 4 corners.
/// - [`QuadraticTetrahedron`](CellType::QuadraticTetrahedron): 4 corners, then the mid-edge nodes
///   of edges (0,1), (1,2), (2,0), (0,3), (1,3), (2,3).
/// - [`Hexahedron`](CellType::Hexahedron): bottom quad (0..4) then top quad (4..8), both in the
///   same rotational order.
/// - [`QuadraticHexahedron`](CellType::QuadraticHexahedron): 8 corners, then the mid-edge nodes
///   of the bottom edges, the top edges and the vertical edges.
/// - [`Pyramid`](CellType::Pyramid): base quad (0..4), then the apex.
/// - [`Prism`](CellType::Prism): bottom triangle (0..3), then top triangle (3..6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellType {
    Point,
    Tetrahedron,
    QuadraticTetrahedron,
    Hexahedron,
    QuadraticHexahedron,
    Pyramid,
    Prism,
}

impl CellType {
    /// The number of nodes of a cell of this kind.
    pub fn node_count(&self) -> usize {
        match self {
            CellType::Point => 1,
            CellType::Tetrahedron => 4,
            CellType::QuadraticTetrahedron => 10,
            CellType::Hexahedron => 8,
            CellType::QuadraticHexahedron => 20,
            CellType::Pyramid => 5,
            CellType::Prism => 6,
        }
    }
}

impl Display for CellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CellType::Point => "point",
            CellType::Tetrahedron => "tetrahedron",
            CellType::QuadraticTetrahedron => "quadratic tetrahedron",
            CellType::Hexahedron => "hexahedron",
            CellType::QuadraticHexahedron => "quadratic hexahedron",
            CellType::Pyramid => "pyramid",
            CellType::Prism => "prism",
        };
        write!(f, "{}", name)
    }
}

/// An unstructured volume mesh with a single kind of cells.
#[derive(Debug, Clone)]
pub struct VolumeMesh {
    cell_type: CellType,
    points: Vec<Point3>,
    connections: Vec<usize>,
}

impl VolumeMesh {
    /// Constructs a new `VolumeMesh`.
    ///
    /// `connections` holds the node indices of every cell, one cell after the other.
    ///
    /// Fails if the length of `connections` is not a multiple of the number of nodes per cell, or
    /// if a node index is out of bounds.
    pub fn new(cell_type: CellType, points: Vec<Point3>, connections: Vec<usize>) -> Result<Self> {
        let stride = cell_type.node_count();
        if connections.len() % stride != 0 {
            return Err(anyhow!(
                "The number of connections ({}) is not a multiple of the number of nodes of a {} ({}).",
                connections.len(),
                cell_type,
                stride
            ));
        }
        if let Some(&node) = connections.iter().find(|&&node| node >= points.len()) {
            return Err(anyhow!(
                "Node index {} is out of bounds (the mesh has {} nodes).",
                node,
                points.len()
            ));
        }

        Ok(Self {
            cell_type,
            points,
            connections,
        })
    }

    /// Creates a structured grid of the box `[min, max]` made of `cell_type` cells.
    ///
    /// The box is divided into `nx * ny * nz` hexahedra, numbered along x first, then y, then z.
    /// Each hexahedron is then kept as is or split depending on `cell_type`:
    /// - 6 tetrahedra sharing the main diagonal (Kuhn triangulation),
    /// - 2 prisms,
    /// - 6 pyramids whose apex is the center of the hexahedron,
    /// - its 8 corners for point cells.
    ///
    /// Quadratic cells get their mid-edge nodes shared between neighboring cells.
    pub fn grid(cell_type: CellType, min: Point3, max: Point3, n: [usize; 3]) -> Result<Self> {
        if n.iter().any(|&n| n == 0) {
            return Err(anyhow!("The grid should have at least one cell along each axis."));
        }
        if (0..3).any(|d| min[d] >= max[d]) {
            return Err(anyhow!("The lower corner of the grid should be below its upper corner."));
        }

        let [nx, ny, nz] = n;
        let step = [
            (max[0] - min[0]) / nx as f64,
            (max[1] - min[1]) / ny as f64,
            (max[2] - min[2]) / nz as f64,
        ];
        let mut points: Vec<_> = iproduct!(0..=nz, 0..=ny, 0..=nx)
            .map(|(k, j, i)| {
                [
                    min[0] + i as f64 * step[0],
                    min[1] + j as f64 * step[1],
                    min[2] + k as f64 * step[2],
                ]
            })
            .collect();
        let node = |i: usize, j: usize, k: usize| i + (nx + 1) * (j + (ny + 1) * k);

        if cell_type == CellType::Point {
            let connections = (0..points.len()).collect();
            return Self::new(cell_type, points, connections);
        }

        let mut connections = Vec::new();
        let mut mid_nodes = HashMap::new();
        for (k, j, i) in iproduct!(0..nz, 0..ny, 0..nx) {
            let hex = [
                node(i, j, k),
                node(i + 1, j, k),
                node(i + 1, j + 1, k),
                node(i, j + 1, k),
                node(i, j, k + 1),
                node(i + 1, j, k + 1),
                node(i + 1, j + 1, k + 1),
                node(i, j + 1, k + 1),
            ];
            match cell_type {
                CellType::Hexahedron => connections.extend(hex),
                CellType::QuadraticHexahedron => {
                    connections.extend(hex);
                    for [a, b] in HEXAHEDRON_EDGES {
                        let mid = mid_node(&mut points, &mut mid_nodes, hex[a], hex[b]);
                        connections.push(mid);
                    }
                }
                CellType::Tetrahedron | CellType::QuadraticTetrahedron => {
                    for tet in KUHN_TETRAHEDRA {
                        let corners = tet.map(|c| hex[c]);
                        connections.extend(corners);
                        if cell_type == CellType::QuadraticTetrahedron {
                            for [a, b] in TETRAHEDRON_EDGES {
                                let mid =
                                    mid_node(&mut points, &mut mid_nodes, corners[a], corners[b]);
                                connections.push(mid);
                            }
                        }
                    }
                }
                CellType::Prism => {
                    connections.extend([0, 1, 2, 4, 5, 6].map(|c| hex[c]));
                    connections.extend([0, 2, 3, 4, 6, 7].map(|c| hex[c]));
                }
                CellType::Pyramid => {
                    let center = scale(
                        hex.iter().fold([0.; 3], |acc, &idx| add(acc, points[idx])),
                        1. / 8.,
                    );
                    let apex = points.len();
                    points.push(center);
                    for face in HEXAHEDRON_FACES {
                        connections.extend(face.map(|c| hex[c]));
                        connections.push(apex);
                    }
                }
                CellType::Point => unreachable!("Point grids are handled above"),
            }
        }

        Self::new(cell_type, points, connections)
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn cell_count(&self) -> usize {
        self.connections.len() / self.cell_type.node_count()
    }

    pub fn node_count(&self) -> usize {
        self.points.len()
    }

    /// The coordinates of all the nodes.
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// The coordinates of the node `idx`.
    pub fn coords(&self, idx: usize) -> Point3 {
        self.points[idx]
    }

    /// The flattened node indices of all the cells.
    pub fn connections(&self) -> &[usize] {
        &self.connections
    }

    /// The node indices of the cell `idx`.
    pub fn cell_nodes(&self, idx: usize) -> &[usize] {
        let stride = self.cell_type.node_count();
        &self.connections[idx * stride..(idx + 1) * stride]
    }

    /// An iterator over the node indices of every cell.
    pub fn cells(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.connections.chunks_exact(self.cell_type.node_count())
    }

    /// The bounding box of the whole mesh.
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(self.cells().flatten().map(|&idx| self.coords(idx)))
    }
}

// Corner pairs of the mid-edge nodes of a quadratic tetrahedron.
const TETRAHEDRON_EDGES: [[usize; 2]; 6] = [[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];

// Corner pairs of the mid-edge nodes of a quadratic hexahedron.
const HEXAHEDRON_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

// Quadrilateral faces of a hexahedron, each one a closed loop.
const HEXAHEDRON_FACES: [[usize; 4]; 6] = [
    [0, 1, 2, 3],
    [4, 5, 6, 7],
    [0, 1, 5, 4],
    [1, 2, 6, 5],
    [2, 3, 7, 6],
    [3, 0, 4, 7],
];

// Each tetrahedron follows a monotone path from corner 0 to corner 6 of the hexahedron, one
// axis at a time, so the split is conforming between neighboring hexahedra.
const KUHN_TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 2, 6],
    [0, 1, 5, 6],
    [0, 3, 2, 6],
    [0, 3, 7, 6],
    [0, 4, 5, 6],
    [0, 4, 7, 6],
];

fn mid_node(
    points: &mut Vec<Point3>,
    mid_nodes: &mut HashMap<(usize, usize), usize>,
    a: usize,
    b: usize,
) -> usize {
    let key = if a < b { (a, b) } else { (b, a) };
    *mid_nodes.entry(key).or_insert_with(|| {
        points.push(scale(add(points[a], points[b]), 0.5));
        points.len() - 1
    })
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;
    use rstest::rstest;

    use super::*;

    #[test]
    fn create_mesh_with_single_tetrahedron() -> Result<()> {
        let points = vec![[0., 0., 0.], [1., 0., 0.], [0., 1., 0.], [0., 0., 1.]];
        let mesh = VolumeMesh::new(CellType::Tetrahedron, points, vec![0, 1, 2, 3])?;

        assert_eq!(mesh.cell_count(), 1);
        assert_eq!(mesh.node_count(), 4);
        assert_eq!(mesh.cell_nodes(0), &[0, 1, 2, 3]);

        Ok(())
    }

    #[test]
    fn invalid_connections_return_error() {
        let points = vec![[0., 0., 0.], [1., 0., 0.], [0., 1., 0.], [0., 0., 1.]];

        // Not a multiple of the number of nodes per cell
        assert!(VolumeMesh::new(CellType::Tetrahedron, points.clone(), vec![0, 1, 2]).is_err());
        // Out of bounds node index
        assert!(VolumeMesh::new(CellType::Tetrahedron, points, vec![0, 1, 2, 4]).is_err());
    }

    #[test]
    fn empty_mesh() -> Result<()> {
        let mesh = VolumeMesh::new(CellType::Hexahedron, Vec::new(), Vec::new())?;

        assert_eq!(mesh.cell_count(), 0);
        assert!(mesh.bounds().is_empty());

        Ok(())
    }

    #[test]
    fn iterate_over_cells() -> Result<()> {
        let mesh = VolumeMesh::grid(CellType::Hexahedron, [0.; 3], [2., 1., 1.], [2, 1, 1])?;

        let mut cells = mesh.cells();

        assert_eq!(cells.next(), Some([0, 1, 4, 3, 6, 7, 10, 9].as_slice()));
        assert_eq!(cells.next(), Some([1, 2, 5, 4, 7, 8, 11, 10].as_slice()));
        assert_eq!(cells.next(), None);

        Ok(())
    }

    #[test]
    fn invalid_grid_returns_error() {
        assert!(VolumeMesh::grid(CellType::Hexahedron, [0.; 3], [1.; 3], [0, 1, 1]).is_err());
        assert!(VolumeMesh::grid(CellType::Hexahedron, [0.; 3], [1., 0., 1.], [1, 1, 1]).is_err());
    }

    #[rstest]
    #[case(CellType::Point, 27, 27)]
    #[case(CellType::Tetrahedron, 48, 27)]
    // 54 grid edges, 36 face diagonals and 8 main diagonals
    #[case(CellType::QuadraticTetrahedron, 48, 27 + 54 + 36 + 8)]
    #[case(CellType::Hexahedron, 8, 27)]
    #[case(CellType::QuadraticHexahedron, 8, 27 + 54)]
    #[case(CellType::Pyramid, 48, 27 + 8)]
    #[case(CellType::Prism, 16, 27)]
    fn grid_sizes(
        #[case] cell_type: CellType,
        #[case] cell_count: usize,
        #[case] node_count: usize,
    ) -> Result<()> {
        let mesh = VolumeMesh::grid(cell_type, [0.; 3], [1.; 3], [2, 2, 2])?;

        assert_eq!(mesh.cell_type(), cell_type);
        assert_eq!(mesh.cell_count(), cell_count);
        assert_eq!(mesh.node_count(), node_count);
        assert!(mesh.cells().all(|cell| cell.iter().all_unique()));
        assert_eq!(mesh.bounds(), BoundingBox::from_points([[0.; 3], [1.; 3]]));

        Ok(())
    }
}
