use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use iem_cpu_core::{gpr, CpuMode, CpuState, FlatTestBus, StepOutcome, Vcpu};

fn criterion_config() -> Criterion {
    match std::env::var("IEM_BENCH_PROFILE").as_deref() {
        Ok("ci") => Criterion::default()
            // Keep PR runtime low.
            .warm_up_time(Duration::from_millis(150))
            .measurement_time(Duration::from_millis(400))
            .sample_size(20)
            .noise_threshold(0.05),
        _ => Criterion::default()
            .warm_up_time(Duration::from_secs(1))
            .measurement_time(Duration::from_secs(2))
            .sample_size(50)
            .noise_threshold(0.03),
    }
}

/// A mix of register ALU, memory read-modify-write, prefixes and stack ops.
/// Every entry retires without a complex handler and falls through.
const MIX: &[&[u8]] = &[
    // add rax, rbx
    &[0x48, 0x01, 0xD8],
    // add dword [rsi + 8], 1
    &[0x83, 0x46, 0x08, 0x01],
    // lock inc qword [rsi]
    &[0xF0, 0x48, 0xFF, 0x06],
    // mov ax, [rsi + rcx*2]
    &[0x66, 0x8B, 0x04, 0x4E],
    // push rbx ; pop rbx
    &[0x53],
    &[0x5B],
    // imul eax, ecx, 3
    &[0x6B, 0xC1, 0x03],
    // cmovnz rdx, rax
    &[0x48, 0x0F, 0x45, 0xD0],
];

fn bench_dispatch_mix(c: &mut Criterion) {
    const ROUNDS: u64 = 2_000;

    let mut cpu: Vcpu<FlatTestBus> = Vcpu::new(
        CpuState::new(CpuMode::Bits64),
        FlatTestBus::new(0x2000),
        Default::default(),
    );
    cpu.state.set_gpr(gpr::RSP, 0x1000);
    cpu.state.set_gpr(gpr::RSI, 0x1800);
    cpu.state.set_gpr(gpr::RCX, 4);

    // Sanity-check the setup once outside the measurement loop.
    for bytes in MIX {
        assert!(matches!(
            cpu.decode_and_execute_one(bytes),
            StepOutcome::Retired(_)
        ));
    }

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(ROUNDS * MIX.len() as u64));
    group.bench_function("mixed_mode64", |b| {
        b.iter(|| {
            let mut retired = 0u64;
            for _ in 0..ROUNDS {
                for bytes in MIX {
                    if let StepOutcome::Retired(len) = cpu.decode_and_execute_one(black_box(bytes)) {
                        retired += u64::from(len);
                    }
                }
            }
            black_box(retired);
        });
    });
    group.finish();
}

fn bench_decode_faults(c: &mut Criterion) {
    // lock cmp [rbx], eax: rejected during dispatch with no memory traffic
    const BAD_LOCK: &[u8] = &[0xF0, 0x39, 0x03];
    const ITERS: u64 = 10_000;

    let mut cpu: Vcpu<FlatTestBus> = Vcpu::new(
        CpuState::new(CpuMode::Bits32),
        FlatTestBus::new(0x100),
        Default::default(),
    );

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(ITERS));
    group.bench_function("invalid_lock", |b| {
        b.iter(|| {
            for _ in 0..ITERS {
                black_box(cpu.decode_and_execute_one(black_box(BAD_LOCK)));
            }
        });
    });
    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_dispatch_mix, bench_decode_faults
}
criterion_main!(benches);
