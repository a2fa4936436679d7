//! Stack walking benchmarks
//!
//! Measures the costs paid on every slow path out of compiled code:
//! - Walking physical frames from the top Exit frame
//! - Expanding inline frames at a safepoint
//! - A full round trip through the call bridge

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ember_jit::bridge::{call_by_name, NativeAddress};
use ember_jit::frames::{enter_jit, FrameKind, FrameWalker, InlineFrameWalker, InlineTableBuilder, NativeStack};
use ember_jit::script::{CodeId, CodeSpec, CodeTable, Pc, Script, ScriptId};
use ember_jit::{ContextId, JitOptions, Runtime};

/// Entry, `depth` JS frames and an Exit frame on top
fn deep_stack(depth: usize) -> NativeStack {
    let mut stack = NativeStack::new(depth * 64 + 1024);
    stack
        .push_frame(FrameKind::Entry { context: ContextId(0) }, 0, 0)
        .unwrap();
    for i in 0..depth {
        stack
            .push_frame(FrameKind::Js { code: CodeId(0) }, 0x1000_0000 + i as u64, 16)
            .unwrap();
    }
    let top = stack
        .push_frame(FrameKind::Exit { target: NativeAddress(0x7000_0000) }, 0x1000_0010, 0)
        .unwrap();
    stack.set_top(Some(top));
    stack
}

// ============================================================================
// Physical frames
// ============================================================================

fn bench_walk_physical_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("walk_physical_frames");
    for depth in [8, 64, 512] {
        let stack = deep_stack(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &stack, |b, stack| {
            b.iter(|| {
                let mut walker = FrameWalker::from_top(stack, stack.top().unwrap()).unwrap();
                let mut frames = 1;
                while walker.more() {
                    walker.advance().unwrap();
                    frames += 1;
                }
                black_box(frames)
            });
        });
    }
    group.finish();
}

// ============================================================================
// Inline frames
// ============================================================================

fn bench_expand_inline_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("expand_inline_frames");
    for depth in [1u32, 4, 16] {
        let chain: Vec<(ScriptId, Pc)> = (0..depth).map(|i| (ScriptId(i), i * 4)).collect();
        let mut table = CodeTable::new();
        let code = table.insert(
            ScriptId(0),
            CodeSpec::new(0x100, InlineTableBuilder::new().record(0x10, &chain).build()),
        );
        let base = table.get(code).unwrap().base;

        let mut stack = NativeStack::new(4096);
        stack
            .push_frame(FrameKind::Entry { context: ContextId(0) }, 0, 0)
            .unwrap();
        stack.push_frame(FrameKind::Js { code }, 0, 16).unwrap();
        let top = stack
            .push_frame(FrameKind::Exit { target: NativeAddress(0x7000_0000) }, base + 0x10, 0)
            .unwrap();

        group.bench_function(BenchmarkId::from_parameter(depth), |b| {
            b.iter(|| {
                let mut frame = FrameWalker::from_top(&stack, top).unwrap();
                frame.advance().unwrap();
                let mut inline = InlineFrameWalker::new(Some(&frame), &table).unwrap();
                while inline.has_more() {
                    inline.advance().unwrap();
                }
                black_box(inline.script().unwrap())
            });
        });
    }
    group.finish();
}

// ============================================================================
// Bridge round trip
// ============================================================================

fn bench_bridge_round_trip(c: &mut Criterion) {
    let mut rt = Runtime::new(JitOptions::default()).unwrap();
    let script = rt.add_script(Script::new("bench"));
    let inline = InlineTableBuilder::new().record(0x10, &[(script, 0)]).build();
    let code = rt.install_code(script, CodeSpec::new(0x100, inline)).unwrap();
    let id = rt.new_context();
    let mut cx = rt.context(id).unwrap();
    enter_jit(&mut cx).unwrap();
    cx.push_js_frame(code, 0, 0).unwrap();
    let ret = cx.code_address(code, 0x10).unwrap();

    c.bench_function("bridge_interrupt_check", |b| {
        b.iter(|| black_box(call_by_name(&mut cx, "InterruptCheck", ret, vec![]).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_walk_physical_frames,
    bench_expand_inline_frames,
    bench_bridge_round_trip,
);
criterion_main!(benches);
