use std::collections::{HashMap, HashSet};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use colony_core::{Config, Facility, SimClock};

fn benchmark_facility_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("facility_tick");

    for num_racks in [4usize, 8, 16] {
        group.bench_with_input(BenchmarkId::new("step", num_racks), &num_racks, |b, &num_racks| {
            let mut config = Config::default();
            config.facility.num_racks = num_racks;
            let mut facility = Facility::new(config.clone(), None);
            let clock = SimClock::new(config.clock.tick_interval_s, 0.0);

            b.iter(|| {
                black_box(facility.step(
                    &clock,
                    None,
                    &HashMap::new(),
                    &HashMap::new(),
                    &HashSet::new(),
                    &HashSet::new(),
                ))
            });
        });
    }

    group.finish();
}

fn benchmark_facility_sustained_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("facility_sustained_run");

    group.bench_function("720_ticks_default_layout", |b| {
        b.iter(|| {
            let config = Config::default();
            let mut facility = Facility::new(config.clone(), None);
            let mut clock = SimClock::new(config.clock.tick_interval_s, 0.0);
            for _ in 0..720 {
                clock.advance(1);
                black_box(facility.step(
                    &clock,
                    None,
                    &HashMap::new(),
                    &HashMap::new(),
                    &HashSet::new(),
                    &HashSet::new(),
                ));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_facility_tick, benchmark_facility_sustained_run);
criterion_main!(benches);
