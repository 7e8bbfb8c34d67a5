use bem_core::assembly::assemble_operator;
use bem_core::config::EngineConfig;
use bem_core::fmm::fmm_matvec;
use bem_core::kernel::LaplaceSingle3D;
use bem_core::mesh::{facet_info_table, DofMap};
use bem_core::shapes::regular_sphere;
use bem_core::tensor::Vector;
use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

pub fn dense_assembly_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("dense_assembly");
    group.sample_size(10);

    for level in 1..3 {
        let facets = regular_sphere(level, 1.0);
        let infos = facet_info_table(&facets).unwrap();
        let dofmap = DofMap::<3>::new(infos.len());
        let config = EngineConfig::default();

        group.bench_function(format!("assemble {} facets", infos.len()), |b| {
            b.iter(|| assemble_operator(&infos, &dofmap, &LaplaceSingle3D, &config))
        });
    }
    group.finish();
}

pub fn fmm_matvec_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("fmm_matvec");
    group.sample_size(10);

    let mut rng = StdRng::seed_from_u64(42);
    for n in [500usize, 2000] {
        let points: Vec<Vector<3>> =
            (0..n).map(|_| Vector([rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()])).collect();
        let charges: Vec<f64> = (0..n).map(|_| rng.gen::<f64>() - 0.5).collect();
        let config = EngineConfig::default();

        group.bench_function(format!("fmm matvec, {n} points"), |b| {
            b.iter(|| fmm_matvec(&points, &charges, &points, &LaplaceSingle3D, &config))
        });
    }
    group.finish();
}

criterion_group!(benches, dense_assembly_benchmark, fmm_matvec_benchmark);
criterion_main!(benches);
