//! Benchmarks for trial-pair sampling and null distributions

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use cortex_stats_core::StimulusSet;
use cortex_stats_native::config::StimulusDurations;
use cortex_stats_native::neural::{
    BinnedChannel, ChannelRecording, NullDistributionGenerator, StimulusTrials, TrialPairSampler,
};

/// Synthetic channel: stimulus-locked spikes with per-repeat jitter
fn generate_channel(num_stimuli: usize, num_repeats: usize, duration_ms: f64) -> ChannelRecording {
    let stimuli = (0..num_stimuli)
        .map(|s| {
            let repeats = (0..num_repeats)
                .map(|r| {
                    let mut t = 3.0 + s as f64;
                    let mut spikes = Vec::new();
                    while t < duration_ms {
                        spikes.push(t + (r as f64 * 0.37).sin());
                        t += 7.0 + (t * 0.013).sin() * 4.0;
                    }
                    spikes
                })
                .collect();
            StimulusTrials {
                stimulus_id: format!("stim{s}"),
                duration_ms,
                repeats,
            }
        })
        .collect();
    ChannelRecording { stimuli }
}

fn bench_true_distribution(c: &mut Criterion) {
    let mut group = c.benchmark_group("true_distribution");
    let recording = generate_channel(11, 20, 2700.0);
    let sampler = TrialPairSampler::new(1000);

    for bin_width in [10u32, 20, 50, 100].iter() {
        let Ok(channel) = BinnedChannel::from_recording(&recording, *bin_width) else {
            continue;
        };

        group.bench_with_input(BenchmarkId::from_parameter(bin_width), bin_width, |b, _| {
            let mut rng = StdRng::seed_from_u64(0);
            b.iter(|| black_box(sampler.true_distribution(black_box(&channel), &mut rng)));
        });
    }

    group.finish();
}

fn bench_poisson_null(c: &mut Criterion) {
    let mut group = c.benchmark_group("poisson_null");
    let generator = NullDistributionGenerator::new(1000, StimulusDurations::default());

    for bin_width in [10u32, 20, 50, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(bin_width), bin_width, |b, &bw| {
            let mut rng = StdRng::seed_from_u64(0);
            b.iter(|| {
                black_box(generator.poisson_null(bw, StimulusSet::Standard, 10.0, &mut rng))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_true_distribution, bench_poisson_null);
criterion_main!(benches);
