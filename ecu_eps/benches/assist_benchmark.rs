//! Benchmark of the assist calculation and limiting chain.

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use ecu_common::calib::AssistMap;
use ecu_diagnostic::DiagnosticStore;
use ecu_eps::{AssistInputs, SafetyLimiter, calculate_assistance};

fn bench_assist_chain(c: &mut Criterion) {
    let map = AssistMap::default();
    let mut limiter = SafetyLimiter::new();
    let mut diag = DiagnosticStore::new();

    let mut t = 0u32;
    c.bench_function("assist_calculate_and_limit", |b| {
        b.iter(|| {
            t = t.wrapping_add(1);
            let inputs = AssistInputs {
                driver_torque_nm: 3.0 + (t % 7) as f32 * 0.1,
                vehicle_speed_kmh: 50.0,
                steering_angle_deg: 10.0,
                steering_velocity_dps: 5.0,
            };
            let mut params =
                calculate_assistance(black_box(&map), black_box(&inputs), t).expect("calc");
            limiter.apply(&mut params, &mut diag, t);
            black_box(params.total_nm);
        })
    });
}

criterion_group!(benches, bench_assist_chain);
criterion_main!(benches);
