//! Criterion benchmarks for the trial loop and batch assembly.
//!
//! Run with:
//!   cargo bench
//!   cargo bench --features parallel
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cogsim::context::{ContextSupplier, TrialContext};
use cogsim::error::Result;
use cogsim::prng::Prng;
use cogsim::simulator::simulate;
use cogsim::variant::TaskVariant;
use cogsim::batch::BatchOrchestrator;

/// Blocks of 3 or 6 stimuli, 60 trials each.
struct BlockedStimuli;

impl ContextSupplier for BlockedStimuli {
    fn name(&self) -> &str {
        "bench-rlwm"
    }

    fn supply(&self, num_steps: usize, rng: &mut Prng) -> Result<Vec<TrialContext>> {
        Ok((0..num_steps)
            .map(|t| {
                let block = (t / 60) as u32;
                let set_size = if block % 2 == 0 { 3 } else { 6 };
                let stimulus = rng.gen_range_usize(0, set_size as usize) as u32;
                TrialContext {
                    stimulus,
                    block,
                    set_size,
                    correct_response: stimulus % 3,
                    ..Default::default()
                }
            })
            .collect())
    }
}

/// Full simulation of one subject over a fixed trajectory.
fn bench_trial_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("trial_loop");
    let variant = TaskVariant::rlwm().expect("rlwm");

    for steps in [100usize, 400, 1600].iter() {
        group.throughput(Throughput::Elements(*steps as u64));
        group.bench_with_input(BenchmarkId::new("rlwm", steps), steps, |b, &steps| {
            let mut rng = Prng::new(42);
            let contexts = BlockedStimuli.supply(steps, &mut rng).expect("context");
            let trajectory = variant
                .trajectory_generator()
                .expect("generator")
                .generate(&[0.05, 0.05], steps, &[], &mut rng)
                .expect("trajectory");
            b.iter(|| {
                let out = simulate(&variant, &trajectory, &[0.2, 4.0], &contexts, &mut rng)
                    .expect("simulate");
                black_box(out.len())
            });
        });
    }

    group.finish();
}

/// End-to-end batch generation, sequential vs. rayon.
fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    group.sample_size(20);
    let variant = TaskVariant::rlwm().expect("rlwm");

    for batch_size in [8usize, 32].iter() {
        group.bench_with_input(
            BenchmarkId::new("sequential", batch_size),
            batch_size,
            |b, &batch_size| {
                let orch = BatchOrchestrator::new(batch_size);
                let mut seed = 0u64;
                b.iter(|| {
                    seed += 1;
                    let batch = orch
                        .simulate_batch(&variant, &BlockedStimuli, seed)
                        .expect("batch");
                    black_box(batch.num_steps)
                });
            },
        );

        #[cfg(feature = "parallel")]
        group.bench_with_input(
            BenchmarkId::new("parallel", batch_size),
            batch_size,
            |b, &batch_size| {
                let orch = BatchOrchestrator::new(batch_size).with_parallel(true);
                let mut seed = 0u64;
                b.iter(|| {
                    seed += 1;
                    let batch = orch
                        .simulate_batch(&variant, &BlockedStimuli, seed)
                        .expect("batch");
                    black_box(batch.num_steps)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_trial_loop, bench_batch);
criterion_main!(benches);
