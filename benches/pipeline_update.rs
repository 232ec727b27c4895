//! Benchmarks for pipeline updates
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vispipe_rs::pipeline::nodes::{ImageSource, MeanFilter};
use vispipe_rs::pipeline::{BuiltinNode, DataId, Extent, ExtentTranslator, Pipeline, SplitMode};

fn image_chain(size: i32, radius: i32) -> (Pipeline, DataId) {
    let mut pipeline = Pipeline::new();
    let source = pipeline.add_node(BuiltinNode::ImageSource(ImageSource::new(
        Extent::new(0, size - 1, 0, size - 1, 0, 0),
        1.0,
    )));
    let filter = pipeline.add_node(BuiltinNode::MeanFilter(MeanFilter::new(radius)));
    let image = pipeline.output(source, 0).unwrap().unwrap();
    pipeline.set_input(filter, 0, Some(image)).unwrap();
    let smoothed = pipeline.output(filter, 0).unwrap().unwrap();
    (pipeline, smoothed)
}

fn bench_up_to_date_update(c: &mut Criterion) {
    let (mut pipeline, smoothed) = image_chain(64, 1);
    pipeline.update(smoothed).unwrap();

    c.bench_function("up_to_date_update", |b| {
        b.iter(|| pipeline.update(black_box(smoothed)).unwrap())
    });
}

fn bench_streamed_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("streamed_update");

    for size in [32, 64, 128].iter() {
        group.throughput(Throughput::Elements((*size * *size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (mut pipeline, smoothed) = image_chain(size, 1);
            b.iter(|| {
                for piece in 0..4 {
                    pipeline.request_piece(smoothed, piece, 4, 1).unwrap();
                    pipeline.update(smoothed).unwrap();
                }
            })
        });
    }

    group.finish();
}

fn bench_chain_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_depth");

    for depth in [1, 8, 32].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let mut pipeline = Pipeline::new();
            let source = pipeline.add_node(BuiltinNode::ImageSource(ImageSource::new(
                Extent::new(0, 15, 0, 15, 0, 0),
                1.0,
            )));
            let mut last = pipeline.output(source, 0).unwrap().unwrap();
            for _ in 0..depth {
                let filter = pipeline.add_node(BuiltinNode::MeanFilter(MeanFilter::new(1)));
                pipeline.set_input(filter, 0, Some(last)).unwrap();
                last = pipeline.output(filter, 0).unwrap().unwrap();
            }
            b.iter(|| {
                pipeline.modified(source).unwrap();
                pipeline.update(black_box(last)).unwrap();
            })
        });
    }

    group.finish();
}

fn bench_piece_translation(c: &mut Criterion) {
    let whole = Extent::new(0, 511, 0, 511, 0, 255);
    let translator = ExtentTranslator::Split(SplitMode::Block);

    c.bench_function("piece_to_extent_1024", |b| {
        b.iter(|| {
            for piece in 0..1024 {
                black_box(translator.piece_to_extent(piece, 1024, 2, &whole));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_up_to_date_update,
    bench_streamed_update,
    bench_chain_depth,
    bench_piece_translation,
);
criterion_main!(benches);
