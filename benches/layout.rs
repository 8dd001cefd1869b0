use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use fsgraph_wasm::Vec2;
use fsgraph_wasm::geometry::Aabb;
use fsgraph_wasm::graph::NodeId;
use fsgraph_wasm::layout::barnes_hut::{self, BarnesHutTree, Body};
use fsgraph_wasm::layout::{FsEntry, FsLink, LayoutConfig};
use fsgraph_wasm::session::{LayoutSession, SessionConfig};
use fsgraph_wasm::spatial::{BoundingVolumeIndex, SpatialIndex, VolumetricIndex};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

fn random_points(count: usize, seed: u64) -> Vec<(NodeId, Vec2)> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..count as u32)
        .map(|i| (NodeId(i), Vec2::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0))))
        .collect()
}

fn bodies(points: &[(NodeId, Vec2)]) -> Vec<Body> {
    points
        .iter()
        .enumerate()
        .map(|(key, (_, p))| Body::new(key, *p, 1.0))
        .collect()
}

fn hierarchy(count: u32, fanout: u32) -> (Vec<FsEntry>, Vec<FsLink>) {
    let entries = (0..count)
        .map(|id| {
            if id * fanout + 1 < count {
                FsEntry::directory(id, fanout)
            } else {
                FsEntry::file(id, 0)
            }
        })
        .collect();
    let links = (1..count).map(|id| FsLink::new((id - 1) / fanout, id)).collect();
    (entries, links)
}

fn bench_repulsion(c: &mut Criterion) {
    let mut group = c.benchmark_group("repulsion");
    for count in [500usize, 2000] {
        let bodies = bodies(&random_points(count, 1));

        group.bench_with_input(BenchmarkId::new("barnes_hut", count), &bodies, |b, bodies| {
            b.iter(|| {
                let tree = BarnesHutTree::build(bodies);
                let mut total = Vec2::zeros();
                for body in bodies {
                    total += tree.calculate_force(body.key, body.position, 0.5, 0.001);
                }
                black_box(total)
            })
        });

        group.bench_with_input(BenchmarkId::new("brute_force", count), &bodies, |b, bodies| {
            b.iter(|| {
                let mut total = Vec2::zeros();
                for i in 0..bodies.len() {
                    total += barnes_hut::brute_force_repulsion(bodies, i, 0.001);
                }
                black_box(total)
            })
        });
    }
    group.finish();
}

fn bench_layout(c: &mut Criterion) {
    let (entries, links) = hierarchy(1000, 4);
    let config = SessionConfig {
        layout: LayoutConfig {
            max_iterations: 50,
            ..LayoutConfig::default()
        },
        ..SessionConfig::default()
    };

    c.bench_function("layout_1000_entries_50_iterations", |b| {
        b.iter(|| {
            let Ok(mut session) = LayoutSession::with_config(config.clone()) else {
                return;
            };
            black_box(session.layout_entries(black_box(&entries), black_box(&links)));
        })
    });
}

fn bench_index_build(c: &mut Criterion) {
    let points = random_points(10_000, 2);
    let mut group = c.benchmark_group("index_build");

    group.bench_function("bvh", |b| {
        b.iter(|| {
            let mut bvh = BoundingVolumeIndex::new();
            bvh.build(black_box(&points));
            black_box(bvh.node_count())
        })
    });

    group.bench_function("octree", |b| {
        b.iter(|| {
            let mut octree = VolumetricIndex::new();
            black_box(octree.rebuild(black_box(&points)))
        })
    });
    group.finish();
}

fn bench_index_queries(c: &mut Criterion) {
    let points = random_points(10_000, 3);
    let mut bvh = BoundingVolumeIndex::new();
    bvh.build(&points);
    let mut octree = VolumetricIndex::new();
    octree.rebuild(&points);

    let viewport = Aabb::from_corners(Vec2::new(0.4, 0.4), Vec2::new(0.6, 0.6));
    let target = Vec2::new(0.37, 0.61);
    let indices: [(&str, &dyn SpatialIndex); 2] = [("bvh", &bvh), ("octree", &octree)];

    let mut group = c.benchmark_group("index_query");
    for (name, index) in indices {
        group.bench_function(BenchmarkId::new("viewport", name), |b| {
            b.iter(|| black_box(index.query(black_box(&viewport))))
        });
        group.bench_function(BenchmarkId::new("radius", name), |b| {
            b.iter(|| black_box(index.query_radius(black_box(target), 0.05)))
        });
        group.bench_function(BenchmarkId::new("knn_16", name), |b| {
            b.iter(|| black_box(index.nearest_neighbors(black_box(target), 16)))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_repulsion,
    bench_layout,
    bench_index_build,
    bench_index_queries
);
criterion_main!(benches);
