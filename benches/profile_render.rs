//! Profile build + render benchmark

use galera_topology::profile::{ConfigProfileBuilder, TemplateRenderer, WsrepTemplate};
use galera_topology::topology::{ClusterSpec, Flavor, MembershipEncoder, NodeRef, ReplicationSecret};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn create_cluster(size: usize) -> ClusterSpec {
    let mut spec = ClusterSpec::new("bench", ReplicationSecret::new("sstuser:bench"));
    for i in 0..size {
        let ip = format!("10.{}.{}.{}", i / 65536 % 256, i / 256 % 256, i % 256)
            .parse()
            .unwrap();
        spec.add_member(NodeRef::new(format!("node-{:05}", i), ip, Flavor::new(8192)))
            .unwrap();
    }
    spec.mark_established();
    spec
}

fn bench_build_and_render(c: &mut Criterion) {
    let builder = ConfigProfileBuilder::default();
    let template = WsrepTemplate::default();
    let mut group = c.benchmark_group("profile");

    for size in [3usize, 9, 64] {
        let spec = create_cluster(size);
        let node = spec.members()[size / 2].clone();

        group.bench_with_input(BenchmarkId::new("encode_address", size), &spec, |b, spec| {
            b.iter(|| MembershipEncoder::encode_address(black_box(spec.members())))
        });

        group.bench_with_input(BenchmarkId::new("build_render", size), &spec, |b, spec| {
            b.iter(|| {
                let profile = builder.build(black_box(spec), black_box(&node)).unwrap();
                template.render(&profile)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_and_render);
criterion_main!(benches);
