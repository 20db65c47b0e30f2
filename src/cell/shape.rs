//! Interpolation functions of the supported cell kinds, expressed in local coordinates.
//!
//! Every kind is parameterized over `[0, 1]` along each local axis: tetrahedra over the unit
//! simplex, prisms over the unit triangle times `[0, 1]`, hexahedra and pyramids over the unit
//! cube (a pyramid being a hexahedron whose top face collapses onto the apex).

use rand::Rng;
use smallvec::SmallVec;

use crate::geometry::Point3;
use crate::mesh::CellType;

/// Interpolation weights, one per node.
pub(crate) type Weights = SmallVec<[f64; 20]>;

/// Partial derivatives of the interpolation functions along the three local axes, one per node.
pub(crate) type Gradients = SmallVec<[Point3; 20]>;

const TETRAHEDRON_NODES: [Point3; 10] = [
    [0., 0., 0.],
    [1., 0., 0.],
    [0., 1., 0.],
    [0., 0., 1.],
    [0.5, 0., 0.],
    [0.5, 0.5, 0.],
    [0., 0.5, 0.],
    [0., 0., 0.5],
    [0.5, 0., 0.5],
    [0., 0.5, 0.5],
];

const HEXAHEDRON_NODES: [Point3; 20] = [
    [0., 0., 0.],
    [1., 0., 0.],
    [1., 1., 0.],
    [0., 1., 0.],
    [0., 0., 1.],
    [1., 0., 1.],
    [1., 1., 1.],
    [0., 1., 1.],
    [0.5, 0., 0.],
    [1., 0.5, 0.],
    [0.5, 1., 0.],
    [0., 0.5, 0.],
    [0.5, 0., 1.],
    [1., 0.5, 1.],
    [0.5, 1., 1.],
    [0., 0.5, 1.],
    [0., 0., 0.5],
    [1., 0., 0.5],
    [1., 1., 0.5],
    [0., 1., 0.5],
];

const PYRAMID_NODES: [Point3; 5] = [
    [0., 0., 0.],
    [1., 0., 0.],
    [1., 1., 0.],
    [0., 1., 0.],
    [0.5, 0.5, 1.],
];

const PRISM_NODES: [Point3; 6] = [
    [0., 0., 0.],
    [1., 0., 0.],
    [0., 1., 0.],
    [0., 0., 1.],
    [1., 0., 1.],
    [0., 1., 1.],
];

// Corner pairs of the mid-edge nodes of a quadratic tetrahedron.
const TETRAHEDRON_EDGES: [[usize; 2]; 6] = [[0, 1], [1, 2], [2, 0], [0, 3], [1, 3], [2, 3]];

/// The local coordinates of the nodes of a cell of kind `cell_type`.
pub(crate) fn local_nodes(cell_type: CellType) -> &'static [Point3] {
    match cell_type {
        CellType::Point => &TETRAHEDRON_NODES[..1],
        CellType::Tetrahedron => &TETRAHEDRON_NODES[..4],
        CellType::QuadraticTetrahedron => &TETRAHEDRON_NODES,
        CellType::Hexahedron => &HEXAHEDRON_NODES[..8],
        CellType::QuadraticHexahedron => &HEXAHEDRON_NODES,
        CellType::Pyramid => &PYRAMID_NODES,
        CellType::Prism => &PRISM_NODES,
    }
}

/// A point well inside the local domain, used as the starting guess of the inversion.
pub(crate) fn local_center(cell_type: CellType) -> Point3 {
    match cell_type {
        CellType::Point => [0.; 3],
        CellType::Tetrahedron | CellType::QuadraticTetrahedron => [0.25; 3],
        CellType::Hexahedron | CellType::QuadraticHexahedron => [0.5; 3],
        CellType::Pyramid => [0.5, 0.5, 0.25],
        CellType::Prism => [1. / 3., 1. / 3., 0.5],
    }
}

pub(crate) fn weights(cell_type: CellType, local: Point3) -> Weights {
    let [x, y, z] = local;
    match cell_type {
        CellType::Point => Weights::from_slice(&[1.]),
        CellType::Tetrahedron => Weights::from_slice(&barycentric(local)),
        CellType::QuadraticTetrahedron => {
            let l = barycentric(local);
            let corners = l.iter().map(|&li| li * (2. * li - 1.));
            let edges = TETRAHEDRON_EDGES.iter().map(|&[a, b]| 4. * l[a] * l[b]);
            corners.chain(edges).collect()
        }
        CellType::Hexahedron => HEXAHEDRON_NODES[..8]
            .iter()
            .map(|node| (0..3).map(|d| linear(node[d], local[d])).product())
            .collect(),
        CellType::QuadraticHexahedron => HEXAHEDRON_NODES
            .iter()
            .map(|node| serendipity(node, local).0)
            .collect(),
        CellType::Pyramid => {
            let mut w: Weights = PYRAMID_NODES[..4]
                .iter()
                .map(|node| linear(node[0], x) * linear(node[1], y) * (1. - z))
                .collect();
            w.push(z);
            w
        }
        CellType::Prism => {
            let t = [1. - x - y, x, y];
            let mut w: Weights = t.iter().map(|ti| ti * (1. - z)).collect();
            w.extend(t.iter().map(|ti| ti * z));
            w
        }
    }
}

pub(crate) fn gradients(cell_type: CellType, local: Point3) -> Gradients {
    let [x, y, z] = local;
    match cell_type {
        CellType::Point => Gradients::from_slice(&[[0.; 3]]),
        CellType::Tetrahedron => Gradients::from_slice(&BARYCENTRIC_GRADIENTS),
        CellType::QuadraticTetrahedron => {
            let l = barycentric(local);
            let dl = BARYCENTRIC_GRADIENTS;
            let corners = (0..4).map(|i| dl[i].map(|g| (4. * l[i] - 1.) * g));
            let edges = TETRAHEDRON_EDGES
                .iter()
                .map(|&[a, b]| [0, 1, 2].map(|d| 4. * (l[a] * dl[b][d] + l[b] * dl[a][d])));
            corners.chain(edges).collect()
        }
        CellType::Hexahedron => HEXAHEDRON_NODES[..8]
            .iter()
            .map(|node| {
                let f = [0, 1, 2].map(|d| linear(node[d], local[d]));
                let df = [0, 1, 2].map(|d| linear_slope(node[d]));
                [df[0] * f[1] * f[2], f[0] * df[1] * f[2], f[0] * f[1] * df[2]]
            })
            .collect(),
        CellType::QuadraticHexahedron => HEXAHEDRON_NODES
            .iter()
            .map(|node| serendipity(node, local).1)
            .collect(),
        CellType::Pyramid => {
            let mut g: Gradients = PYRAMID_NODES[..4]
                .iter()
                .map(|node| {
                    let (fx, fy) = (linear(node[0], x), linear(node[1], y));
                    let (dfx, dfy) = (linear_slope(node[0]), linear_slope(node[1]));
                    [dfx * fy * (1. - z), fx * dfy * (1. - z), -fx * fy]
                })
                .collect();
            g.push([0., 0., 1.]);
            g
        }
        CellType::Prism => {
            let t = [1. - x - y, x, y];
            let dt = [[-1., -1.], [1., 0.], [0., 1.]];
            let mut g: Gradients = (0..3)
                .map(|i| [dt[i][0] * (1. - z), dt[i][1] * (1. - z), -t[i]])
                .collect();
            g.extend((0..3).map(|i| [dt[i][0] * z, dt[i][1] * z, t[i]]));
            g
        }
    }
}

/// Returns `true` if `local` lies in the local domain of `cell_type`, up to `tolerance`.
pub(crate) fn contains_local(cell_type: CellType, local: Point3, tolerance: f64) -> bool {
    let [x, y, z] = local;
    let in_unit = |v: f64| v >= -tolerance && v <= 1. + tolerance;
    match cell_type {
        CellType::Point => local.iter().all(|v| v.abs() <= tolerance),
        CellType::Tetrahedron | CellType::QuadraticTetrahedron => {
            local.iter().all(|&v| v >= -tolerance) && x + y + z <= 1. + tolerance
        }
        CellType::Hexahedron | CellType::QuadraticHexahedron | CellType::Pyramid => {
            local.iter().all(|&v| in_unit(v))
        }
        CellType::Prism => x >= -tolerance && y >= -tolerance && x + y <= 1. + tolerance && in_unit(z),
    }
}

/// The smallest slack of the local constraints of `cell_type` at `local`, i.e. how deep inside
/// its local domain the point lies. Negative outside.
pub(crate) fn boundary_slack(cell_type: CellType, local: Point3) -> f64 {
    let [x, y, z] = local;
    match cell_type {
        CellType::Point => 0.,
        CellType::Tetrahedron | CellType::QuadraticTetrahedron => {
            x.min(y).min(z).min(1. - x - y - z)
        }
        CellType::Hexahedron | CellType::QuadraticHexahedron | CellType::Pyramid => local
            .iter()
            .fold(f64::INFINITY, |slack, &v| slack.min(v).min(1. - v)),
        CellType::Prism => x.min(y).min(1. - x - y).min(z).min(1. - z),
    }
}

/// Draws a point of the local domain of `cell_type`, uniformly for the simplex, the prism and
/// the cube.
pub(crate) fn random_local<R: Rng>(cell_type: CellType, rng: &mut R) -> Point3 {
    match cell_type {
        CellType::Point => [0.; 3],
        CellType::Tetrahedron | CellType::QuadraticTetrahedron => {
            let (mut s, mut t, mut u): (f64, f64, f64) = rng.gen();
            // Fold the unit cube onto the unit simplex
            if s + t > 1. {
                s = 1. - s;
                t = 1. - t;
            }
            if t + u > 1. {
                let tmp = u;
                u = 1. - s - t;
                t = 1. - tmp;
            } else if s + t + u > 1. {
                let tmp = u;
                u = s + t + u - 1.;
                s = 1. - t - tmp;
            }
            [s, t, u]
        }
        CellType::Prism => {
            let (mut x, mut y, z): (f64, f64, f64) = rng.gen();
            if x + y > 1. {
                x = 1. - x;
                y = 1. - y;
            }
            [x, y, z]
        }
        CellType::Hexahedron | CellType::QuadraticHexahedron | CellType::Pyramid => rng.gen(),
    }
}

const BARYCENTRIC_GRADIENTS: [Point3; 4] = [
    [-1., -1., -1.],
    [1., 0., 0.],
    [0., 1., 0.],
    [0., 0., 1.],
];

fn barycentric([x, y, z]: Point3) -> [f64; 4] {
    [1. - x - y - z, x, y, z]
}

// Linear factor of a node sitting at `node` (0 or 1) along one local axis.
fn linear(node: f64, v: f64) -> f64 {
    if node > 0.5 {
        v
    } else {
        1. - v
    }
}

fn linear_slope(node: f64) -> f64 {
    if node > 0.5 {
        1.
    } else {
        -1.
    }
}

// 20-node serendipity function of the node at `node` and its gradient, evaluated on
// `xi = 2 * local - 1` so that the reference cube is `[-1, 1]^3`.
fn serendipity(node: &Point3, local: Point3) -> (f64, Point3) {
    let s = node.map(|n| 2. * n - 1.);
    let xi = local.map(|v| 2. * v - 1.);
    let f = [0, 1, 2].map(|d| 1. + s[d] * xi[d]);

    let (value, grad) = match s.iter().position(|&sd| sd == 0.) {
        // Corner node
        None => {
            let q = s[0] * xi[0] + s[1] * xi[1] + s[2] * xi[2] - 2.;
            let value = f[0] * f[1] * f[2] * q / 8.;
            let grad = [
                s[0] * f[1] * f[2] * (q + f[0]) / 8.,
                s[1] * f[0] * f[2] * (q + f[1]) / 8.,
                s[2] * f[0] * f[1] * (q + f[2]) / 8.,
            ];
            (value, grad)
        }
        // Mid-edge node, the edge running along axis `a`
        Some(a) => {
            let (b, c) = ((a + 1) % 3, (a + 2) % 3);
            let bubble = 1. - xi[a] * xi[a];
            let value = bubble * f[b] * f[c] / 4.;
            let mut grad = [0.; 3];
            grad[a] = -2. * xi[a] * f[b] * f[c] / 4.;
            grad[b] = bubble * s[b] * f[c] / 4.;
            grad[c] = bubble * f[b] * s[c] / 4.;
            (value, grad)
        }
    };
    // d(xi)/d(local) = 2
    (value, grad.map(|g| 2. * g))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rstest::rstest;

    use super::*;

    const ALL_KINDS: [CellType; 7] = [
        CellType::Point,
        CellType::Tetrahedron,
        CellType::QuadraticTetrahedron,
        CellType::Hexahedron,
        CellType::QuadraticHexahedron,
        CellType::Pyramid,
        CellType::Prism,
    ];

    #[test]
    fn node_counts_match_cell_types() {
        for cell_type in ALL_KINDS {
            let n = cell_type.node_count();
            let local = local_center(cell_type);

            assert_eq!(local_nodes(cell_type).len(), n, "{}", cell_type);
            assert_eq!(weights(cell_type, local).len(), n, "{}", cell_type);
            assert_eq!(gradients(cell_type, local).len(), n, "{}", cell_type);
        }
    }

    #[rstest]
    fn partition_of_unity(
        #[values(
            CellType::Tetrahedron,
            CellType::QuadraticTetrahedron,
            CellType::Hexahedron,
            CellType::QuadraticHexahedron,
            CellType::Pyramid,
            CellType::Prism
        )]
        cell_type: CellType,
    ) {
        let mut rng = ChaCha8Rng::seed_from_u64(1234);
        for _ in 0..50 {
            let local = random_local(cell_type, &mut rng);

            let sum: f64 = weights(cell_type, local).iter().sum();
            let grad_sum = gradients(cell_type, local)
                .iter()
                .fold([0.; 3], |acc, g| [acc[0] + g[0], acc[1] + g[1], acc[2] + g[2]]);

            assert!((sum - 1.).abs() < 1e-12, "{}: {}", cell_type, sum);
            for g in grad_sum {
                assert!(g.abs() < 1e-12, "{}: {:?}", cell_type, grad_sum);
            }
        }
    }

    #[rstest]
    fn weights_reproduce_nodes(
        #[values(
            CellType::Tetrahedron,
            CellType::QuadraticTetrahedron,
            CellType::Hexahedron,
            CellType::QuadraticHexahedron,
            CellType::Pyramid,
            CellType::Prism
        )]
        cell_type: CellType,
    ) {
        for (i, &node) in local_nodes(cell_type).iter().enumerate() {
            let w = weights(cell_type, node);
            for (j, wj) in w.iter().enumerate() {
                let expected = if i == j { 1. } else { 0. };
                assert!(
                    (wj - expected).abs() < 1e-12,
                    "{}: weight {} at node {} is {}",
                    cell_type,
                    j,
                    i,
                    wj
                );
            }
        }
    }

    #[rstest]
    fn gradients_match_finite_differences(
        #[values(
            CellType::QuadraticTetrahedron,
            CellType::Hexahedron,
            CellType::QuadraticHexahedron,
            CellType::Pyramid,
            CellType::Prism
        )]
        cell_type: CellType,
    ) {
        let h = 1e-6;
        let local = [0.2, 0.3, 0.15];
        let grads = gradients(cell_type, local);

        for d in 0..3 {
            let mut forward = local;
            let mut backward = local;
            forward[d] += h;
            backward[d] -= h;
            let wf = weights(cell_type, forward);
            let wb = weights(cell_type, backward);
            for i in 0..cell_type.node_count() {
                let fd = (wf[i] - wb[i]) / (2. * h);
                assert!(
                    (fd - grads[i][d]).abs() < 1e-6,
                    "{}: node {} axis {}",
                    cell_type,
                    i,
                    d
                );
            }
        }
    }

    #[test]
    fn random_samples_are_inside() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for cell_type in ALL_KINDS {
            for _ in 0..200 {
                let local = random_local(cell_type, &mut rng);
                assert!(contains_local(cell_type, local, 1e-12), "{}: {:?}", cell_type, local);
            }
        }
    }

    #[test]
    fn local_containment() {
        assert!(contains_local(CellType::Tetrahedron, [0.2, 0.2, 0.2], 0.));
        assert!(!contains_local(CellType::Tetrahedron, [0.5, 0.5, 0.5], 0.));
        assert!(contains_local(CellType::Tetrahedron, [0.5, 0.5, 1e-10], 1e-9));
        assert!(contains_local(CellType::Prism, [0.4, 0.4, 0.9], 0.));
        assert!(!contains_local(CellType::Prism, [0.6, 0.6, 0.5], 0.));
        assert!(contains_local(CellType::Hexahedron, [0.9, 0.9, 0.9], 0.));
        assert!(!contains_local(CellType::Pyramid, [0.5, 0.5, 1.1], 0.));
    }

    #[test]
    fn boundary_slack_is_the_distance_to_the_nearest_face() {
        assert!((boundary_slack(CellType::Tetrahedron, [0.25; 3]) - 0.25).abs() < 1e-15);
        assert_eq!(boundary_slack(CellType::Tetrahedron, [0.5, 0.5, 0.]), 0.);
        assert!(boundary_slack(CellType::Hexahedron, [0.5, 0.5, 1.2]) < 0.);
        assert!((boundary_slack(CellType::Prism, [0.2, 0.2, 0.9]) - 0.1).abs() < 1e-15);
        assert_eq!(boundary_slack(CellType::Point, [0.; 3]), 0.);
    }
}
