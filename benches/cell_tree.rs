use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use volloc::{CellLocator, CellTree, CellTreeLocator, CellType, TreeConfig, VolumeMesh};

pub fn build_cell_tree(c: &mut Criterion) {
    let (min, max) = ([0.; 3], [10.; 3]);

    let mut group = c.benchmark_group("Build cell tree");
    for n in [5, 20, 40] {
        let mesh = VolumeMesh::grid(CellType::Tetrahedron, min, max, [n, n, n]).unwrap();

        for (name, parallel) in [("Sequential", false), ("Parallel", true)] {
            let config = TreeConfig::default().with_parallel(parallel);
            group.bench_with_input(BenchmarkId::new(name, n), &mesh, |b, m| {
                b.iter(|| CellTree::build(m, &config).unwrap());
            });
        }
    }
    group.finish();
}

pub fn locate_points(c: &mut Criterion) {
    let (min, max) = ([0.; 3], [10.; 3]);

    let mut group = c.benchmark_group("Locate random points");
    for cell_type in [
        CellType::Tetrahedron,
        CellType::Hexahedron,
        CellType::QuadraticHexahedron,
    ] {
        for n in [5, 20] {
            let mesh = VolumeMesh::grid(cell_type, min, max, [n, n, n]).unwrap();
            let mut locator = CellTreeLocator::new();
            locator.attach(&mesh).unwrap();
            locator.build().unwrap();

            let mut rng = rand::thread_rng();
            let query: Vec<_> = (0..4_200)
                .map(|_| [0, 1, 2].map(|_| rng.gen::<f64>() * max[0]))
                .collect();

            group.bench_with_input(
                BenchmarkId::new(cell_type.to_string(), n),
                &query,
                |b, q| {
                    b.iter(|| locator.locate_many(q));
                },
            );
            group.bench_with_input(
                BenchmarkId::new(format!("{} (parallel)", cell_type), n),
                &query,
                |b, q| {
                    b.iter(|| locator.par_locate_many(q));
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, build_cell_tree, locate_points);
criterion_main!(benches);
