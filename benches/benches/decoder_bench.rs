use std::hint::black_box;

use bcistream_core::{decode_compressed, encode_deltas, encode_uncompressed, frame, DeltaBlock, Decoder};
use bcistream_transport::{
    ChannelCounters, MappedProducer, MappedRegion, PageCounters, RingLayout, SampleSink,
};
use bcistream_types::SampleVector;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};

const SYNC: [u8; 4] = [0xFF, 0xFF, 0xAA, 0x55];

/// Детерминированный блок дельт с разбросом, похожим на EEG.
fn deltas(seed: i32) -> DeltaBlock {
    let mut block = [[0i32; 16]; 4];
    for (c, ch) in block.iter_mut().enumerate() {
        for (i, d) in ch.iter_mut().enumerate() {
            let x = (seed + c as i32 * 7 + i as i32 * 13) % 29;
            *d = x - 14;
        }
    }
    block
}

/// Payload как у гарнитуры: sync, несжатый сэмпл и 4 сжатых блока.
fn payload() -> Vec<u8> {
    let mut out = SYNC.to_vec();
    out.extend_from_slice(&encode_uncompressed(&[512, 512, 512, 512], None));
    for seed in 0..4 {
        out.extend_from_slice(&encode_deltas(&deltas(seed)).unwrap());
    }
    out
}

fn bench_compressed(c: &mut Criterion) {
    let block = encode_deltas(&deltas(3)).unwrap();

    let mut group = c.benchmark_group("compressed");
    group.throughput(Throughput::Elements(64));
    group.bench_function("decode_block", |b| {
        b.iter(|| black_box(decode_compressed(black_box(&block)).unwrap()))
    });
    group.bench_function("encode_block", |b| {
        let d = deltas(3);
        b.iter(|| black_box(encode_deltas(black_box(&d)).unwrap()))
    });
    group.finish();
}

fn bench_payload(c: &mut Criterion) {
    let payload = payload();

    let mut group = c.benchmark_group("payload");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("frame", |b| {
        b.iter(|| black_box(frame(black_box(&payload)).unwrap()))
    });
    group.bench_function("decode_payload", |b| {
        let mut decoder = Decoder::new();
        b.iter(|| black_box(decoder.decode_payload(black_box(&payload)).unwrap()))
    });
    group.finish();
}

fn bench_ring(c: &mut Criterion) {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let layout = RingLayout::new(3, 256).unwrap();
    let counters = ChannelCounters::new(layout.page_count());
    let mut producer = MappedProducer::new(
        MappedRegion::create(tmp.path(), layout.segment_size()).unwrap(),
        counters.clone(),
        layout,
    )
    .unwrap();

    let sample = SampleVector::new([100, 200, 300, 400]);

    let mut group = c.benchmark_group("ring");
    group.throughput(Throughput::Elements(1));
    // consumer возвращает страницы сразу, чтобы мерить запись, а не дропы
    group.bench_function("append", |b| {
        b.iter(|| {
            black_box(producer.append(black_box(&sample)).unwrap());
            while counters.await_filled_page(Some(std::time::Duration::ZERO)).unwrap() {
                counters.recycle_page().unwrap();
            }
        })
    });
    group.bench_function("append_full_ring", |b| {
        // без consumer кольцо переполняется: мерим путь отбрасывания
        b.iter(|| black_box(producer.append(black_box(&sample)).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_compressed, bench_payload, bench_ring);
criterion_main!(benches);
