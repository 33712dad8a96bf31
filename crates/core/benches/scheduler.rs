use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use emu_core::scheduler::{
    ExecutionContext, ExitLatch, ExitReason, Machine, Scheduler, SyncMode, ThreadId,
};

const CPU: ThreadId = ThreadId(0);
const PPU: ThreadId = ThreadId(1);

/// A CPU-like primary plus a line-stepping video context and `extra` slow chips
struct BenchMachine {
    contexts: Vec<ExecutionContext>,
    line: u32,
}

impl BenchMachine {
    fn new(extra: usize) -> Self {
        let mut contexts = vec![
            ExecutionContext::new(CPU, "cpu", 21_477_272),
            ExecutionContext::new(PPU, "ppu", 21_477_272),
        ];
        for i in 0..extra {
            contexts.push(ExecutionContext::new(
                ThreadId(2 + i),
                "chip",
                24_607_104,
            ));
        }
        Self { contexts, line: 0 }
    }

    fn threads(&self) -> Vec<ThreadId> {
        self.contexts.iter().map(|c| c.id()).collect()
    }
}

impl Machine for BenchMachine {
    fn context(&self, thread: ThreadId) -> Option<&ExecutionContext> {
        self.contexts.get(thread.0)
    }

    fn step(&mut self, thread: ThreadId, exit: &mut ExitLatch) {
        match thread {
            CPU => self.contexts[0].advance(8),
            PPU => {
                self.contexts[1].advance(1364);
                self.line = (self.line + 1) % 262;
                if self.line == 241 {
                    exit.raise(ExitReason::FrameEvent);
                }
            }
            other => self.contexts[other.0].advance(48),
        }
    }
}

fn bench_free_run_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("free_run_frame");
    for extra in [0usize, 2, 6] {
        group.bench_with_input(BenchmarkId::from_parameter(extra), &extra, |b, &extra| {
            let mut machine = BenchMachine::new(extra);
            let mut scheduler = Scheduler::new(CPU);
            scheduler.init(CPU, machine.threads());
            b.iter(|| black_box(scheduler.enter(&mut machine)));
        });
    }
    group.finish();
}

fn bench_drain_to_reference(c: &mut Criterion) {
    c.bench_function("drain_to_reference", |b| {
        b.iter_batched(
            || {
                let mut machine = BenchMachine::new(2);
                machine.contexts[0].advance(357_368);
                let mut scheduler = Scheduler::new(CPU);
                scheduler.init(CPU, machine.threads());
                scheduler
                    .set_sync_mode(SyncMode::LockToReference, Some(CPU))
                    .unwrap();
                (machine, scheduler)
            },
            |(mut machine, mut scheduler)| {
                for thread in machine.threads() {
                    scheduler.set_target(thread);
                    while scheduler.enter(&mut machine).unwrap() != ExitReason::SynchronizeEvent {}
                }
                black_box(machine.line)
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_free_run_frame, bench_drain_to_reference);
criterion_main!(benches);
