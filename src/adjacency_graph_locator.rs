use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use smallvec::{smallvec, SmallVec};

use crate::adjacency_graph::{cell_faces, AdjacencyGraph};
use crate::cell::Cell;
use crate::cell_locator::{CacheMode, CellLocator};
use crate::error::LocatorError;
use crate::geometry::{cross, distance, dot, sub, Mat3, Point3};
use crate::mesh::{CellType, VolumeMesh};

// Added to the step budget of a walk, so that tiny meshes still get a few steps.
const EXTRA_STEPS: usize = 16;

/// Parameters of a [`CellAdjacencyGraphLocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkConfig {
    /// Number of random cells probed to pick the start of a walk.
    pub random_probes: usize,
    /// A walk gives up after this many steps per cell of the mesh.
    pub steps_per_cell: usize,
    /// Seed of the random source of the locator.
    pub seed: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            random_probes: 30,
            steps_per_cell: 4,
            seed: 1234,
        }
    }
}

impl WalkConfig {
    pub fn with_random_probes(mut self, random_probes: usize) -> Self {
        self.random_probes = random_probes;
        self
    }

    pub fn with_steps_per_cell(mut self, steps_per_cell: usize) -> Self {
        self.steps_per_cell = steps_per_cell;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// A cell locator walking from cell to cell across shared faces.
///
/// A query follows the segment from the center of a start cell to the query point, stepping into
/// the neighbor across the face where the segment leaves the current cell. When the segment leaves
/// the mesh, the walk jumps to the last boundary face the segment crosses before the query point.
///
/// No spatial index is built, only the [`AdjacencyGraph`] of the mesh. The start cell is the last
/// hit (with [`CacheMode::Half`] or [`CacheMode::Full`]) or the closest of a few random cells, so
/// queries are cheapest when successive query points are close to each other.
///
/// Only tetrahedral meshes are supported.
#[derive(Debug, Clone)]
pub struct CellAdjacencyGraphLocator<'a> {
    mesh: Option<&'a VolumeMesh>,
    graph: Option<Arc<AdjacencyGraph>>,
    config: WalkConfig,
    cache_mode: CacheMode,
    cell: Option<Cell<'a>>,
    hint: Option<usize>,
    rng: ChaCha8Rng,
}

impl<'a> Default for CellAdjacencyGraphLocator<'a> {
    fn default() -> Self {
        Self::with_config(WalkConfig::default())
    }
}

impl<'a> CellAdjacencyGraphLocator<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WalkConfig) -> Self {
        Self {
            mesh: None,
            graph: None,
            config,
            cache_mode: CacheMode::default(),
            cell: None,
            hint: None,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
        }
    }

    pub fn config(&self) -> &WalkConfig {
        &self.config
    }

    /// The adjacency graph, once built.
    pub fn graph(&self) -> Option<&AdjacencyGraph> {
        self.graph.as_deref()
    }
}

impl<'a> CellLocator<'a> for CellAdjacencyGraphLocator<'a> {
    fn attach(&mut self, mesh: &'a VolumeMesh) -> Result<(), LocatorError> {
        self.graph = None;
        self.hint = None;
        match mesh.cell_type() {
            CellType::Tetrahedron | CellType::QuadraticTetrahedron => {
                self.mesh = Some(mesh);
                self.cell = Some(Cell::new(mesh));
                Ok(())
            }
            cell_type => {
                self.mesh = None;
                self.cell = None;
                Err(LocatorError::UnsupportedCellKind(cell_type))
            }
        }
    }

    fn build(&mut self) -> Result<(), LocatorError> {
        let mesh = self.mesh.ok_or(LocatorError::NotAttached)?;
        self.graph = Some(Arc::new(AdjacencyGraph::new(mesh)?));
        self.hint = None;
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
        self.hint = None;
    }

    fn try_find_cell(&mut self, point: &Point3) -> Result<Option<usize>, LocatorError> {
        let (Some(mesh), Some(graph), Some(cell)) =
            (self.mesh, self.graph.as_deref(), self.cell.as_mut())
        else {
            return Err(LocatorError::NotBuilt);
        };
        if mesh.cell_count() == 0 {
            return Ok(None);
        }

        let start = match (self.cache_mode, self.hint) {
            (CacheMode::Half | CacheMode::Full, Some(hint)) => hint,
            _ => random_start(cell, &mut self.rng, self.config.random_probes, point),
        };
        let max_steps = self.config.steps_per_cell * mesh.cell_count() + EXTRA_STEPS;
        let found = walk(mesh, graph, cell, &mut self.rng, start, max_steps, point)
            .map(|_| smallest_containing(graph, cell, point));
        if found.is_some() {
            self.hint = found;
        }
        Ok(found)
    }
}

// The cell whose center is the closest to `point` among a few random cells.
fn random_start<R: Rng>(cell: &mut Cell, rng: &mut R, probes: usize, point: &Point3) -> usize {
    let cell_count = cell.mesh().cell_count();
    let mut best = (0, f64::INFINITY);
    for _ in 0..probes.max(1) {
        let idx = rng.gen_range(0..cell_count);
        cell.bind(idx);
        let dist = distance(cell.center(), *point);
        if dist < best.1 {
            best = (idx, dist);
        }
    }
    best.0
}

// Walks from `start` towards `point`. On success `cell` is left bound to a cell containing it.
fn walk<R: Rng>(
    mesh: &VolumeMesh,
    graph: &AdjacencyGraph,
    cell: &mut Cell,
    rng: &mut R,
    start: usize,
    max_steps: usize,
    point: &Point3,
) -> Option<usize> {
    cell.bind(start);
    let mut origin = cell.center();
    let mut step = 0.;

    for _ in 0..max_steps {
        if cell.contains(point) {
            return Some(cell.index());
        }

        let Some((face, t)) = exit_face(cell, &origin, point, step) else {
            // The segment misses the faces ahead, start over from inside the cell
            origin = cell.random_sampling(rng);
            step = 0.;
            continue;
        };
        step = t;
        match graph.neighbor(cell.index(), face) {
            Some(next) => cell.bind(next),
            None => {
                let (next, t) = reentry(mesh, graph, cell, &origin, point, step)?;
                log::trace!("Jumping to cell {} through the boundary", next);
                step = t;
                cell.bind(next);
            }
        }
    }

    log::warn!(
        "Walk towards {:?} did not terminate after {} steps",
        point,
        max_steps
    );
    None
}

// The smallest cell containing `point` among the cells reached from the bound one through faces
// shared by two cells containing it.
fn smallest_containing(graph: &AdjacencyGraph, cell: &mut Cell, point: &Point3) -> usize {
    let found = cell.index();
    if !cell.is_near_boundary(point) {
        return found;
    }

    let mut smallest = found;
    let mut visited: SmallVec<[usize; 32]> = smallvec![found];
    let mut pending: SmallVec<[usize; 32]> = smallvec![found];
    while let Some(idx) = pending.pop() {
        for face in 0..graph.faces_per_cell() {
            let Some(next) = graph.neighbor(idx, face) else {
                continue;
            };
            if visited.contains(&next) {
                continue;
            }
            visited.push(next);
            cell.bind(next);
            if cell.contains(point) {
                smallest = smallest.min(next);
                pending.push(next);
            }
        }
    }
    cell.bind(smallest);
    smallest
}

// The face of `cell` where the segment from `origin` to `point` leaves it, after the parameter
// `step`, along with the parameter of the crossing.
fn exit_face(cell: &Cell, origin: &Point3, point: &Point3, step: f64) -> Option<(usize, f64)> {
    let faces = cell_faces(cell.cell_type())?;
    let coords = cell.coords();
    faces
        .iter()
        .enumerate()
        .filter_map(|(face, corners)| {
            let triangle = [coords[corners[0]], coords[corners[1]], coords[corners[2]]];
            intersect(origin, point, &triangle)
                .filter(|&t| t > step && t <= 1.)
                .map(|t| (face, t))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

// The boundary face where the segment from `origin` to `point` enters the mesh for the last time
// before `point`, after the parameter `step`.
//
// Returns `None` if the segment does not enter the mesh again, i.e. the point is outside.
fn reentry(
    mesh: &VolumeMesh,
    graph: &AdjacencyGraph,
    cell: &mut Cell,
    origin: &Point3,
    point: &Point3,
    step: f64,
) -> Option<(usize, f64)> {
    let faces = cell_faces(mesh.cell_type())?;
    let direction = sub(*point, *origin);

    let (last, t) = graph
        .boundary_faces()
        .iter()
        .filter_map(|boundary| {
            let nodes = mesh.cell_nodes(boundary.cell);
            let corners = faces[boundary.face];
            let triangle = [
                mesh.coords(nodes[corners[0]]),
                mesh.coords(nodes[corners[1]]),
                mesh.coords(nodes[corners[2]]),
            ];
            intersect(origin, point, &triangle)
                .filter(|&t| t > step && t < 1.)
                .map(|t| ((boundary.cell, triangle), t))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    // Past the last crossing the segment stays on one side of the boundary
    let (owner, triangle) = last;
    cell.bind(owner);
    let normal = cross(sub(triangle[1], triangle[0]), sub(triangle[2], triangle[0]));
    let inward = dot(normal, sub(cell.center(), triangle[0]));
    (dot(normal, direction) * inward > 0.).then_some((owner, t))
}

// Intersects the segment from `origin` to `point` with a triangle.
//
// Returns the parameter `t` of the crossing along the segment, which may lie outside `[0, 1]`.
fn intersect(origin: &Point3, point: &Point3, [p0, p1, p2]: &[Point3; 3]) -> Option<f64> {
    let m = Mat3::from_columns(sub(*origin, *point), sub(*p1, *p0), sub(*p2, *p0));
    let [t, u, v] = m.solve(sub(*origin, *p0))?;
    (u >= 0. && v >= 0. && u + v <= 1.).then_some(t)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use proptest::prelude::*;
    use rstest::rstest;

    use crate::cell_tree_locator::CellTreeLocator;

    use super::*;

    prop_compose! {
        fn coords_in_range(min: f64, max: f64)
                          (x in min..max, y in min..max, z in min..max) -> [f64; 3] {
            [x, y, z]
        }
    }

    fn built_locator(mesh: &VolumeMesh, config: WalkConfig) -> Result<CellAdjacencyGraphLocator<'_>> {
        let mut locator = CellAdjacencyGraphLocator::with_config(config);
        locator.attach(mesh)?;
        locator.build()?;
        Ok(locator)
    }

    fn centers(mesh: &VolumeMesh) -> Vec<Point3> {
        let mut cell = Cell::new(mesh);
        (0..mesh.cell_count())
            .map(|idx| {
                cell.bind(idx);
                cell.center()
            })
            .collect()
    }

    // A 4x4x1 block of tetrahedra with the cells above x > 0.5 and y > 0.5 removed.
    fn l_shaped_mesh() -> Result<VolumeMesh> {
        let block = VolumeMesh::grid(CellType::Tetrahedron, [0.; 3], [1., 1., 0.25], [4, 4, 1])?;
        let mut cell = Cell::new(&block);
        let connections = (0..block.cell_count())
            .filter(|&idx| {
                cell.bind(idx);
                let [x, y, _] = cell.center();
                !(x > 0.5 && y > 0.5)
            })
            .flat_map(|idx| block.cell_nodes(idx).to_vec())
            .collect();
        VolumeMesh::new(CellType::Tetrahedron, block.points().to_vec(), connections)
    }

    #[test]
    fn single_tetrahedron() -> Result<()> {
        let points = vec![[0., 0., 0.], [1., 0., 0.], [0., 1., 0.], [0., 0., 1.]];
        let mesh = VolumeMesh::new(CellType::Tetrahedron, points, vec![0, 1, 2, 3])?;
        let mut locator = built_locator(&mesh, WalkConfig::default())?;

        assert_eq!(locator.find_cell(&[0.25, 0.25, 0.25]), Some(0));
        assert_eq!(locator.find_cell(&[10., 10., 10.]), None);

        Ok(())
    }

    #[test]
    fn point_on_shared_face_resolves_to_one_cell() -> Result<()> {
        let points = vec![
            [0., 0., 0.],
            [1., 0., 0.],
            [0., 1., 0.],
            [0., 0., 1.],
            [1., 1., 1.],
        ];
        let mesh = VolumeMesh::new(CellType::Tetrahedron, points, vec![0, 1, 2, 3, 1, 2, 3, 4])?;
        let mut locator = built_locator(&mesh, WalkConfig::default())?;
        locator.set_cache_mode(CacheMode::Half);

        let point = [0.25, 0.25, 0.5];
        let first = locator.find_cell(&point);

        assert!(matches!(first, Some(0) | Some(1)));
        for _ in 0..5 {
            assert_eq!(locator.find_cell(&point), first);
        }

        Ok(())
    }

    #[rstest]
    #[case(CellType::Point)]
    #[case(CellType::Hexahedron)]
    #[case(CellType::QuadraticHexahedron)]
    #[case(CellType::Pyramid)]
    #[case(CellType::Prism)]
    fn unsupported_cell_kinds(#[case] cell_type: CellType) -> Result<()> {
        let mesh = VolumeMesh::grid(cell_type, [0.; 3], [1.; 3], [1, 1, 1])?;
        let mut locator = CellAdjacencyGraphLocator::new();

        assert_eq!(
            locator.attach(&mesh),
            Err(LocatorError::UnsupportedCellKind(cell_type))
        );
        assert_eq!(locator.build(), Err(LocatorError::NotAttached));

        Ok(())
    }

    #[test]
    fn empty_mesh() -> Result<()> {
        let mesh = VolumeMesh::new(CellType::Tetrahedron, Vec::new(), Vec::new())?;
        let mut locator = built_locator(&mesh, WalkConfig::default())?;

        assert_eq!(locator.find_cell(&[0., 0., 0.]), None);

        Ok(())
    }

    #[rstest]
    fn every_cell_contains_its_center(
        #[values(CellType::Tetrahedron, CellType::QuadraticTetrahedron)] cell_type: CellType,
        #[values(CacheMode::Off, CacheMode::Half, CacheMode::Full)] cache_mode: CacheMode,
    ) -> Result<()> {
        let mesh = VolumeMesh::grid(cell_type, [0.; 3], [2., 1., 1.], [4, 3, 3])?;
        let mut locator = built_locator(&mesh, WalkConfig::default())?;
        locator.set_cache_mode(cache_mode);

        for (idx, center) in centers(&mesh).iter().enumerate() {
            assert_eq!(locator.find_cell(center), Some(idx));
        }
        assert_eq!(locator.find_cell(&[10., 0.5, 0.5]), None);
        assert_eq!(locator.find_cell(&[-1e-3, 0.5, 0.5]), None);

        Ok(())
    }

    #[test]
    fn walk_crosses_gaps_in_non_convex_meshes() -> Result<()> {
        let mesh = l_shaped_mesh()?;
        let mut locator = built_locator(&mesh, WalkConfig::default())?;
        locator.set_cache_mode(CacheMode::Full);
        let mut tree_locator = CellTreeLocator::new();
        tree_locator.attach(&mesh)?;
        tree_locator.build()?;

        // Alternate between both arms, the segment between them leaves the mesh
        let points = [
            [0.9, 0.1, 0.13],
            [0.1, 0.9, 0.07],
            [0.95, 0.42, 0.15],
            [0.43, 0.95, 0.05],
            [0.8, 0.33, 0.15],
        ];
        for point in points.iter() {
            let found = locator.find_cell(point);
            assert!(found.is_some());
            assert_eq!(found, tree_locator.find_cell(point));
        }
        // In the notch
        assert_eq!(locator.find_cell(&[0.75, 0.75, 0.1]), None);

        Ok(())
    }

    #[test]
    fn walk_gives_up_after_the_step_budget() -> Result<()> {
        let mesh = VolumeMesh::grid(CellType::Tetrahedron, [0.; 3], [20., 1., 1.], [20, 1, 1])?;
        let first = [0.3, 0.6, 0.45];
        let last = [19.3, 0.6, 0.45];

        // Enough probes to start right at the first point
        let config = WalkConfig::default()
            .with_steps_per_cell(0)
            .with_random_probes(1000);
        let mut locator = built_locator(&mesh, config)?;
        locator.set_cache_mode(CacheMode::Half);
        assert!(locator.find_cell(&first).is_some());
        assert_eq!(locator.find_cell(&last), None);

        let mut locator = built_locator(&mesh, WalkConfig::default())?;
        locator.set_cache_mode(CacheMode::Half);
        assert!(locator.find_cell(&first).is_some());
        assert!(locator.find_cell(&last).is_some());

        Ok(())
    }

    #[test]
    fn same_seed_gives_same_walks() -> Result<()> {
        let mesh = VolumeMesh::grid(CellType::Tetrahedron, [0.; 3], [1.; 3], [5, 5, 5])?;
        let mut first = built_locator(&mesh, WalkConfig::default().with_seed(42))?;
        let mut second = first.clone();
        let points = centers(&mesh);

        assert_eq!(first.locate_many(&points), second.locate_many(&points));
        assert_eq!(
            first.par_locate_many(&points),
            (0..mesh.cell_count()).map(Some).collect::<Vec<_>>()
        );

        Ok(())
    }

    #[rstest]
    #[case([0.5, 0.41, 0.23])]
    #[case([0.5, 0.5, 0.5])]
    #[case([0.2, 1. / 3., 0.7])]
    fn face_points_do_not_depend_on_the_random_start(#[case] point: Point3) -> Result<()> {
        let mesh = VolumeMesh::grid(CellType::Tetrahedron, [0.; 3], [1.; 3], [6, 6, 6])?;
        let mut locator = built_locator(&mesh, WalkConfig::default())?;
        let mut tree_locator = CellTreeLocator::new();
        tree_locator.attach(&mesh)?;
        tree_locator.build()?;
        let expected = tree_locator.find_cell(&point);

        assert!(expected.is_some());
        for _ in 0..200 {
            assert_eq!(locator.find_cell(&point), expected);
        }

        Ok(())
    }

    proptest! {
        #[test]
        fn walk_agrees_with_tree(
            points in prop::collection::vec(coords_in_range(-0.25, 1.25), 1..50)
        ) {
            let mesh = VolumeMesh::grid(CellType::Tetrahedron, [0.; 3], [1.; 3], [3, 3, 3]).unwrap();
            let mut walk_locator = built_locator(&mesh, WalkConfig::default()).unwrap();
            walk_locator.set_cache_mode(CacheMode::Full);
            let mut tree_locator = CellTreeLocator::new();
            tree_locator.attach(&mesh).unwrap();
            tree_locator.build().unwrap();

            for point in points.iter() {
                prop_assert_eq!(walk_locator.find_cell(point), tree_locator.find_cell(point));
            }
        }
    }
}
