//! Segment generator benchmark — measures trapezoidal/triangular
//! profile computation and AMASS level selection cost for a single
//! block at a range of nominal speeds.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use gcode_common::modal::ParserState;
use gcode_common::motion::DirectionBits;
use gcode_common::settings::Settings;
use gcode_core::planner::Planner;
use gcode_core::segment::generate_segments;

fn block_for_rate(rate_mm_min: f32) -> gcode_common::motion::MotionBlock {
    let settings = Settings::default();
    let parser_state = ParserState::default();
    let mut planner = Planner::new();
    let start = [0.0f32; gcode_common::consts::N_AXIS];
    let mut end = start;
    end[0] = 100.0;
    planner.plan_line(&start, &end, &parser_state, &settings).expect("plan_line");

    let mut block = planner.tail_block().cloned().expect("planned block");
    block.programmed_rate = rate_mm_min;
    block.direction_bits = DirectionBits::empty();
    block
}

fn bench_segment(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_generate");
    group.significance_level(0.01);
    group.sample_size(300);

    for &rate in &[100.0f32, 1000.0, 5000.0, 20000.0] {
        let block = block_for_rate(rate);
        group.bench_with_input(BenchmarkId::new("rate_mm_min", rate as u32), &block, |b, block| {
            b.iter(|| {
                let segments = generate_segments(block, 0.0);
                std::hint::black_box(segments.len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_segment);
criterion_main!(benches);
