use std::io;
use std::sync::{Arc, Mutex};

use iem::{
    gpr, CpuMode, CpuState, FlatTestBus, IemConfig, LockDomain, Mnemonic, NoComplexOps,
    RexPolicy, StepOutcome, Vcpu,
};

fn vcpu_with(config: IemConfig) -> Vcpu<FlatTestBus> {
    Vcpu::with_shared_locks(
        CpuState::new(CpuMode::Bits64),
        FlatTestBus::new(0x1000),
        NoComplexOps,
        Arc::new(LockDomain::new(config.lock_stripes)),
        config,
    )
}

#[test]
fn rex_policy_decides_whether_rex_survives_a_legacy_prefix() {
    // rex.b, o16, mov ax/r8w, 0x1234
    const BYTES: &[u8] = &[0x41, 0x66, 0xB8, 0x34, 0x12];

    let mut cpu = vcpu_with(IemConfig::default());
    assert_eq!(cpu.decode_and_execute_one(BYTES), StepOutcome::Retired(5));
    assert_eq!(cpu.state.gpr(gpr::RAX), 0x1234);
    assert_eq!(cpu.state.gpr(gpr::R8), 0);

    let mut cpu = vcpu_with(IemConfig {
        rex_policy: RexPolicy::Sticky,
        ..IemConfig::default()
    });
    assert_eq!(cpu.decode_and_execute_one(BYTES), StepOutcome::Retired(5));
    assert_eq!(cpu.state.gpr(gpr::RAX), 0);
    assert_eq!(cpu.state.gpr(gpr::R8), 0x1234);
}

#[test]
fn facade_exposes_member_crates() {
    assert_eq!(iem::decoder::MAX_INST_LEN, 15);
    assert_eq!(iem::types::Width::W32.bytes(), 4);
    assert_eq!(iem::classify_one_byte(0x0F), iem::OpClass::Escape);
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture(f: impl FnOnce()) -> String {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    captured.text()
}

#[test]
fn outcomes_are_logged() {
    let logs = capture(|| {
        let mut cpu = vcpu_with(IemConfig::default());
        // fadd st(0), st(0)
        assert_eq!(
            cpu.decode_and_execute_one(&[0xD8, 0xC0]),
            StepOutcome::NotImplemented(Mnemonic::X87)
        );
        // ud2
        assert!(matches!(
            cpu.decode_and_execute_one(&[0x0F, 0x0B]),
            StepOutcome::Fault(_)
        ));
        // nop, not traced unless enabled
        assert_eq!(cpu.decode_and_execute_one(&[0x90]), StepOutcome::Retired(1));
    });

    assert!(logs.contains("instruction not implemented"), "{logs}");
    assert!(logs.contains("mnemonic=x87"), "{logs}");
    assert!(logs.contains("instruction faulted"), "{logs}");
    assert!(logs.contains("vector=6"), "{logs}");
    assert!(!logs.contains("retired"), "{logs}");
}

#[test]
fn retired_instructions_are_traced_on_request() {
    let logs = capture(|| {
        let mut cpu = vcpu_with(IemConfig {
            trace_retired: true,
            ..IemConfig::default()
        });
        assert_eq!(cpu.decode_and_execute_one(&[0x90]), StepOutcome::Retired(1));
    });

    assert!(logs.contains("retired"), "{logs}");
    assert!(logs.contains("len=1"), "{logs}");
}
