use std::collections::HashMap;

use smallvec::SmallVec;

use crate::error::LocatorError;
use crate::mesh::{CellType, VolumeMesh};

// Faces of a tetrahedron, as triangles of its corner nodes.
const TETRAHEDRON_FACES: [&[usize]; 4] = [&[0, 1, 2], &[0, 2, 3], &[0, 3, 1], &[1, 3, 2]];

// Faces of a hexahedron, as quadrilaterals of its corner nodes.
const HEXAHEDRON_FACES: [&[usize]; 6] = [
    &[0, 3, 2, 1],
    &[4, 5, 6, 7],
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[3, 0, 4, 7],
];

/// The local corner nodes of each face of a cell of kind `cell_type`.
///
/// Quadratic cells share the faces of their linear counterparts. Returns [`None`] for the kinds
/// without an adjacency graph.
pub fn cell_faces(cell_type: CellType) -> Option<&'static [&'static [usize]]> {
    match cell_type {
        CellType::Tetrahedron | CellType::QuadraticTetrahedron => Some(&TETRAHEDRON_FACES),
        CellType::Hexahedron | CellType::QuadraticHexahedron => Some(&HEXAHEDRON_FACES),
        CellType::Point | CellType::Pyramid | CellType::Prism => None,
    }
}

/// A face of the mesh owned by a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryFace {
    pub cell: usize,
    pub face: usize,
}

/// The face-to-face connectivity of the cells of a mesh.
///
/// Two cells are neighbors across a face if they share all the corner nodes of that face.
#[derive(Debug, Clone)]
pub struct AdjacencyGraph {
    faces_per_cell: usize,
    neighbors: Vec<Option<usize>>,
    boundary_faces: Vec<BoundaryFace>,
}

impl AdjacencyGraph {
    /// Builds the adjacency graph of a tetrahedral or hexahedral mesh.
    ///
    /// Fails with [`LocatorError::UnsupportedCellKind`] for any other kind of cells.
    pub fn new(mesh: &VolumeMesh) -> Result<Self, LocatorError> {
        let cell_type = mesh.cell_type();
        let faces = cell_faces(cell_type).ok_or(LocatorError::UnsupportedCellKind(cell_type))?;
        let faces_per_cell = faces.len();
        let mut neighbors = vec![None; mesh.cell_count() * faces_per_cell];

        let mut open_faces: HashMap<SmallVec<[usize; 4]>, usize> = HashMap::new();
        for (cell, nodes) in mesh.cells().enumerate() {
            for (face, corners) in faces.iter().enumerate() {
                let mut key: SmallVec<[usize; 4]> = corners.iter().map(|&c| nodes[c]).collect();
                key.sort_unstable();
                let slot = cell * faces_per_cell + face;
                match open_faces.remove(&key) {
                    Some(other) => {
                        neighbors[slot] = Some(other / faces_per_cell);
                        neighbors[other] = Some(cell);
                    }
                    None => {
                        open_faces.insert(key, slot);
                    }
                }
            }
        }

        let boundary_faces: Vec<_> = neighbors
            .iter()
            .enumerate()
            .filter(|(_, neighbor)| neighbor.is_none())
            .map(|(slot, _)| BoundaryFace {
                cell: slot / faces_per_cell,
                face: slot % faces_per_cell,
            })
            .collect();
        log::debug!(
            "Built an adjacency graph over {} cells with {} boundary faces",
            mesh.cell_count(),
            boundary_faces.len()
        );

        Ok(Self {
            faces_per_cell,
            neighbors,
            boundary_faces,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.neighbors.len() / self.faces_per_cell
    }

    pub fn faces_per_cell(&self) -> usize {
        self.faces_per_cell
    }

    /// The cell on the other side of the face `face` of `cell`, or [`None`] on the boundary.
    pub fn neighbor(&self, cell: usize, face: usize) -> Option<usize> {
        self.neighbors[cell * self.faces_per_cell + face]
    }

    /// The faces owned by a single cell, ordered by cell and then by face.
    pub fn boundary_faces(&self) -> &[BoundaryFace] {
        &self.boundary_faces
    }
}
