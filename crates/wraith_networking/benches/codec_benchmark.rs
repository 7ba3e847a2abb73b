//! Benchmark for snapshot codec throughput.
//!
//! Encodes and decodes a 64-ghost frame against acked baselines, the
//! server's per-connection hot path.
//!
//! Run with: cargo bench --package wraith_networking --bench codec_benchmark

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use wraith_networking::protocol::{BitReader, BitWriter};
use wraith_networking::{
    predict_fields, AvatarSnapshot, CompressionModel, GhostId, GhostState, SnapshotReader,
    SnapshotWriter, Tick,
};
use wraith_shared::{Quaternion, Vec3};

const GHOSTS: usize = 64;

fn ghost_states(seed: u64, tick: u32) -> Vec<GhostState> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..GHOSTS)
        .map(|_| {
            GhostState::Avatar(AvatarSnapshot::new(
                Tick(tick),
                Vec3::new(
                    rng.gen_range(-200.0..200.0),
                    0.0,
                    rng.gen_range(-200.0..200.0),
                ),
                Quaternion::from_yaw(rng.gen_range(-3.0..3.0)),
            ))
        })
        .collect()
}

fn moved(states: &[GhostState], tick: u32) -> Vec<GhostState> {
    states
        .iter()
        .enumerate()
        .map(|(i, state)| match state.as_avatar() {
            // Every other ghost moves; the rest only tick.
            Some(avatar) if i % 2 == 0 => GhostState::Avatar(AvatarSnapshot::new(
                Tick(tick),
                avatar.position() + Vec3::new(0.1, 0.0, 0.05),
                avatar.rotation(),
            )),
            _ => state.at_tick(Tick(tick)),
        })
        .collect()
}

fn encode(model: &CompressionModel, tick: u32, baselines: &[GhostState], states: &[GhostState]) {
    let mut writer = SnapshotWriter::begin(model, 64 * 1024, Tick(tick), &[]).unwrap();
    for (i, (baseline, state)) in baselines.iter().zip(states).enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let id = GhostId(i as u32);
        black_box(writer.write_ghost(id, None, Some(baseline), state).unwrap());
    }
    black_box(writer.finish().unwrap());
}

fn benchmark_frame_encode(c: &mut Criterion) {
    let model = CompressionModel::default();
    let baselines = ghost_states(1, 100);
    let states = moved(&baselines, 101);

    let mut group = c.benchmark_group("snapshot_frame");
    group.throughput(Throughput::Elements(GHOSTS as u64));
    group.bench_function("encode_64_ghosts", |b| {
        b.iter(|| encode(&model, 101, black_box(&baselines), black_box(&states)));
    });

    let mut writer = SnapshotWriter::begin(&model, 64 * 1024, Tick(101), &[]).unwrap();
    for (i, (baseline, state)) in baselines.iter().zip(&states).enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let id = GhostId(i as u32);
        writer.write_ghost(id, None, Some(baseline), state).unwrap();
    }
    let bytes = writer.finish().unwrap();

    group.bench_function("decode_64_ghosts", |b| {
        b.iter(|| {
            let mut reader = SnapshotReader::open(&model, black_box(&bytes)).unwrap();
            while let Some(entry) = reader
                .next_ghost(|ghost, _| baselines.get(ghost.0 as usize).cloned())
                .unwrap()
            {
                black_box(entry);
            }
        });
    });
    group.finish();
}

fn benchmark_packed_ints(c: &mut Criterion) {
    let model = CompressionModel::default();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let values: Vec<i32> = (0..1024).map(|_| rng.gen_range(-300..300)).collect();

    let mut group = c.benchmark_group("packed_int");
    group.throughput(Throughput::Elements(values.len() as u64));
    group.bench_function("write_1024", |b| {
        b.iter(|| {
            let mut writer = BitWriter::new(16 * 1024);
            for &value in &values {
                model.write_packed_int(&mut writer, black_box(value)).unwrap();
            }
            black_box(writer.finish())
        });
    });

    let mut writer = BitWriter::new(16 * 1024);
    for &value in &values {
        model.write_packed_int(&mut writer, value).unwrap();
    }
    let bytes = writer.finish();
    group.bench_function("read_1024", |b| {
        b.iter(|| {
            let mut reader = BitReader::new(black_box(&bytes));
            for _ in 0..values.len() {
                black_box(model.read_packed_int(&mut reader).unwrap());
            }
        });
    });
    group.finish();
}

fn benchmark_prediction(c: &mut Criterion) {
    c.bench_function("predict_position", |b| {
        let first = Some((Tick(12), [400, -20, 1_000]));
        let second = Some((Tick(10), [200, 0, 900]));
        b.iter(|| {
            black_box(predict_fields(
                black_box(Tick(13)),
                [400, -20, 1_000],
                black_box(first),
                black_box(second),
            ))
        });
    });
}

criterion_group!(
    benches,
    benchmark_frame_encode,
    benchmark_packed_ints,
    benchmark_prediction
);
criterion_main!(benches);
