//! Criterion benchmarks for `LatencyProcessor`.
//!
//! Run with: `cargo bench -p meridian-core -- latency/`
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use meridian_core::{AudioBuffer, EventBuffer, LatencyProcessor, MidiEvent};

const SAMPLE_RATE: f64 = 48_000.0;
const BLOCK_SIZE: usize = 256;
const DELAYS: &[usize] = &[0, 64, 1000, 48_000];

fn filled(num_channels: usize, num_frames: usize) -> AudioBuffer {
    let mut buffer = AudioBuffer::new(num_channels, num_frames);
    for ch in 0..num_channels {
        for (i, s) in buffer.channel_mut(ch).iter_mut().enumerate() {
            *s = (i as f32 * 0.01).sin();
        }
    }
    buffer
}

fn bench_audio(c: &mut Criterion) {
    let mut group = c.benchmark_group("latency/audio");
    group.throughput(Throughput::Elements((BLOCK_SIZE * 2) as u64));

    let input = filled(2, BLOCK_SIZE);
    for &delay in DELAYS {
        let mut lp = LatencyProcessor::new();
        lp.set_latency_num_samples(delay);
        lp.prepare_to_play(SAMPLE_RATE, BLOCK_SIZE, 2).unwrap();
        let mut output = AudioBuffer::new(2, BLOCK_SIZE);

        group.bench_with_input(BenchmarkId::new("stereo", delay), &delay, |b, _| {
            b.iter(|| {
                lp.write_audio(black_box(&input));
                lp.read_audio_overwriting(&mut output);
                black_box(output.channel(0)[0]);
            });
        });
    }

    group.finish();
}

fn bench_midi(c: &mut Criterion) {
    let mut group = c.benchmark_group("latency/midi");

    for &per_block in &[1usize, 16, 128] {
        let mut input = EventBuffer::with_capacity(per_block);
        for i in 0..per_block {
            input.push(MidiEvent::note_on(i * BLOCK_SIZE / per_block, 0, 60, 100));
        }
        let mut output = EventBuffer::with_capacity(per_block);
        let mut lp = LatencyProcessor::new().with_events_per_block(per_block);
        lp.set_latency_num_samples(1000);
        lp.prepare_to_play(SAMPLE_RATE, BLOCK_SIZE, 1).unwrap();

        group.bench_with_input(
            BenchmarkId::new("events_per_block", per_block),
            &per_block,
            |b, _| {
                b.iter(|| {
                    lp.write_midi(black_box(&input));
                    output.clear();
                    lp.read_midi(&mut output, BLOCK_SIZE);
                    black_box(output.len());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_audio, bench_midi);
criterion_main!(benches);
