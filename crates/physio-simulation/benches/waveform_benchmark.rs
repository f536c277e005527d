//! Performance benchmarks for the experiment engine
//!
//! The engine is ticked once per display frame; a full tetanus train must
//! stay far below a frame budget even with every twitch summed per sample.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use physio_core::{ControlInputs, ExperimentKind, PhysiologicalParameters};
use physio_simulation::{
    cardiac_shape, instantaneous_value, summed_tension, SimulationEngine, StimulusScheduler, Treppe,
    NORMAL_TWITCH,
};

fn bench_waveforms(c: &mut Criterion) {
    let mut group = c.benchmark_group("waveforms");
    let twitch = PhysiologicalParameters::twitch(50.0, 60.0, 90.0, 1.0);
    let rigor = PhysiologicalParameters::sustained(15.0, 50.0, 1.3);

    group.bench_function("twitch_sweep", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for t in 0..250 {
                acc += instantaneous_value(black_box(t as f64), &twitch);
            }
            black_box(acc)
        });
    });

    group.bench_function("heat_rigor_sweep", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for t in 0..250 {
                acc += instantaneous_value(black_box(t as f64 * 4.0), &rigor);
            }
            black_box(acc)
        });
    });

    group.bench_function("cardiac_cycle", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for i in 0..1000 {
                acc += cardiac_shape(black_box(i as f64 / 1000.0));
            }
            black_box(acc)
        });
    });

    group.finish();
}

fn bench_summation(c: &mut Criterion) {
    let mut group = c.benchmark_group("summation");

    for &frequency in &[10.0, 40.0, 100.0] {
        let mut scheduler = StimulusScheduler::periodic(frequency, 3000.0);
        scheduler.due(3000.0);
        let events = scheduler.events().to_vec();

        group.bench_with_input(
            BenchmarkId::new("summed_tension", format!("{}Hz", frequency)),
            &events,
            |b, events| {
                b.iter(|| {
                    summed_tension(
                        black_box(1500.0),
                        events,
                        |_| NORMAL_TWITCH,
                        &Treppe::default(),
                        4.0,
                    )
                });
            },
        );
    }

    group.finish();
}

fn bench_engine_runs(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_run");

    for kind in ExperimentKind::ALL {
        group.bench_with_input(BenchmarkId::new("frames", kind.slug()), &kind, |b, kind| {
            let controls = ControlInputs::default();
            b.iter(|| {
                let mut engine = SimulationEngine::for_kind(*kind);
                engine.start(&controls);
                for _ in 0..240 {
                    engine.advance(16.0, &controls);
                }
                black_box(engine.samples().len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_waveforms, bench_summation, bench_engine_runs);
criterion_main!(benches);
