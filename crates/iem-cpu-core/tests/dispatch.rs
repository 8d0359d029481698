use iem_cpu_core::{
    gpr, Access, CpuMode, CpuState, DecodeError, Exception, FlatTestBus, MemFault, MemFaultKind,
    Mnemonic, NoComplexOps, RFlags, SegReg, StepOutcome, TranslateRecord, Vcpu,
};

fn vcpu(mode: CpuMode) -> Vcpu<FlatTestBus> {
    Vcpu::new(CpuState::new(mode), FlatTestBus::new(0x10000), NoComplexOps)
}

#[test]
fn add_eax_imm32_retires_five_bytes() {
    let mut cpu = vcpu(CpuMode::Bits32);
    cpu.state.set_gpr(gpr::RAX, 1);
    cpu.state.set_rip(0x1000);

    let outcome = cpu.decode_and_execute_one(&[0x05, 0x78, 0x56, 0x34, 0x12]);

    assert_eq!(outcome, StepOutcome::Retired(5));
    assert_eq!(cpu.state.gpr(gpr::RAX), 0x1234_5679);
    assert_eq!(cpu.state.rip(), 0x1005);
    assert!(!cpu.state.rflags().contains(RFlags::CF));
}

#[test]
fn absolute_sib_load_maps_once() {
    let mut cpu = Vcpu::new(
        CpuState::new(CpuMode::Bits32),
        FlatTestBus::with_base(0x1000_0000, 0x1000),
        NoComplexOps,
    );
    cpu.mem.load(0x1000_0000, &0xDEAD_BEEFu32.to_le_bytes());

    // mov eax, [0x10000000]
    let outcome = cpu.decode_and_execute_one(&[0x8B, 0x04, 0x25, 0x00, 0x00, 0x00, 0x10]);

    assert_eq!(outcome, StepOutcome::Retired(7));
    assert_eq!(cpu.state.gpr(gpr::RAX), 0xDEAD_BEEF);
    assert_eq!(
        cpu.mem.translations(),
        &[TranslateRecord {
            segment: SegReg::Ds,
            linear: 0x1000_0000,
            len: 4,
            access: Access::Read,
        }]
    );
    assert_eq!(cpu.stats.maps, 1);
    assert_eq!(cpu.stats.commits, 1);
}

#[test]
fn memory_increment_maps_and_commits_exactly_once() {
    let mut cpu = vcpu(CpuMode::Bits32);
    cpu.state.set_gpr(gpr::RAX, 0x100);
    cpu.mem.load(0x100, &5u32.to_le_bytes());

    // inc dword [eax]
    assert_eq!(cpu.decode_and_execute_one(&[0xFF, 0x00]), StepOutcome::Retired(2));

    assert_eq!(cpu.mem.read_u32(0x100), 6);
    assert_eq!(cpu.stats.maps, 1);
    assert_eq!(cpu.stats.commits, 1);
    assert_eq!(cpu.mem.translations().len(), 1);
    assert_eq!(cpu.mem.translations()[0].access, Access::ReadWrite);
}

#[test]
fn page_fault_leaves_state_untouched() {
    let mut cpu = vcpu(CpuMode::Bits32);
    cpu.state.set_gpr(gpr::RAX, 0x100);
    cpu.state.set_rip(0x40);
    cpu.state.set_rflags(RFlags::ZF | RFlags::CF);
    cpu.mem.load(0x100, &5u32.to_le_bytes());
    cpu.mem.inject_page_fault(0x100..0x104);
    let before = cpu.state.clone();

    let outcome = cpu.decode_and_execute_one(&[0xFF, 0x00]);

    assert_eq!(
        outcome,
        StepOutcome::Fault(Exception::MemoryFault(MemFault {
            kind: MemFaultKind::Page,
            segment: SegReg::Ds,
            linear: 0x100,
        }))
    );
    assert_eq!(cpu.state, before);
    assert_eq!(cpu.mem.read_u32(0x100), 5);
    assert_eq!(cpu.stats.commits, 0);
}

#[test]
fn locked_compare_is_rejected_before_any_access() {
    let mut cpu = vcpu(CpuMode::Bits32);
    cpu.state.set_gpr(gpr::RBX, 0x200);
    let before = cpu.state.clone();

    // lock cmp [ebx], eax
    let outcome = cpu.decode_and_execute_one(&[0xF0, 0x39, 0x03]);

    assert_eq!(outcome, StepOutcome::Fault(Exception::InvalidLockUsage));
    assert_eq!(cpu.state, before);
    assert!(cpu.mem.translations().is_empty());
    assert_eq!(cpu.stats.maps, 0);
}

#[test]
fn lock_requires_memory_destination() {
    let mut cpu = vcpu(CpuMode::Bits32);
    let before = cpu.state.clone();
    // lock add eax, eax
    assert_eq!(
        cpu.decode_and_execute_one(&[0xF0, 0x01, 0xC0]),
        StepOutcome::Fault(Exception::InvalidLockUsage)
    );
    assert_eq!(cpu.state, before);

    // lock add [ebx], eax
    cpu.state.set_gpr(gpr::RBX, 0x300);
    cpu.state.set_gpr(gpr::RAX, 7);
    assert_eq!(
        cpu.decode_and_execute_one(&[0xF0, 0x01, 0x03]),
        StepOutcome::Retired(3)
    );
    assert_eq!(cpu.mem.read_u32(0x300), 7);
}

#[test]
fn lock_on_plain_mov_is_invalid() {
    let mut cpu = vcpu(CpuMode::Bits32);
    assert_eq!(
        cpu.decode_and_execute_one(&[0xF0, 0x89, 0x03]),
        StepOutcome::Fault(Exception::InvalidLockUsage)
    );
}

#[test]
fn identical_inputs_give_identical_results() {
    let run = || {
        let mut cpu = vcpu(CpuMode::Bits64);
        cpu.state.set_gpr(gpr::RAX, 0x8000_0000);
        cpu.state.set_gpr(gpr::RBX, 0x8000_0000);
        let outcome = cpu.decode_and_execute_one(&[0x01, 0xD8]);
        (outcome, cpu.state, cpu.stats)
    };
    assert_eq!(run(), run());
    let (outcome, state, _) = run();
    assert_eq!(outcome, StepOutcome::Retired(2));
    assert_eq!(state.gpr(gpr::RAX), 0);
    assert!(state.rflags().contains(RFlags::CF | RFlags::ZF | RFlags::OF));
}

#[test]
fn rex_range_is_inc_dec_outside_long_mode() {
    let mut cpu = vcpu(CpuMode::Bits32);
    cpu.state.set_gpr(gpr::RCX, 0xFFFF_FFFF);
    assert_eq!(cpu.decode_and_execute_one(&[0x41]), StepOutcome::Retired(1));
    assert_eq!(cpu.state.gpr(gpr::RCX), 0);
    assert_eq!(cpu.decode_and_execute_one(&[0x4F]), StepOutcome::Retired(1));
    assert_eq!(cpu.state.gpr(gpr::RDI), 0xFFFF_FFFF);

    let mut cpu = vcpu(CpuMode::Bits64);
    // REX then nop
    assert_eq!(cpu.decode_and_execute_one(&[0x40, 0x90]), StepOutcome::Retired(2));
}

#[test]
fn long_mode_rejects_legacy_only_opcodes() {
    for bytes in [&[0x06][..], &[0x27], &[0x60], &[0x9A, 0, 0, 0, 0, 0, 0], &[0xCE]] {
        let mut cpu = vcpu(CpuMode::Bits64);
        assert_eq!(
            cpu.decode_and_execute_one(bytes),
            StepOutcome::Fault(Exception::InvalidOpcode),
            "{bytes:02x?}"
        );
    }

    let mut cpu = vcpu(CpuMode::Bits32);
    assert_eq!(
        cpu.decode_and_execute_one(&[0x27]),
        StepOutcome::NotImplemented(Mnemonic::Daa)
    );
}

#[test]
fn undefined_encodings_fault() {
    for bytes in [
        &[0xD6][..],
        &[0xF1],
        &[0x0F, 0x0B],
        &[0x0F, 0xFF],
        &[0xFF, 0xF8],
        &[0x8F, 0xC8],
        &[0xFE, 0xD0],
        &[0xF6, 0xC8, 0x00],
        &[0xC6, 0xC8, 0x00],
        &[0xD0, 0xF0],
    ] {
        let mut cpu = vcpu(CpuMode::Bits32);
        let before = cpu.state.clone();
        assert_eq!(
            cpu.decode_and_execute_one(bytes),
            StepOutcome::Fault(Exception::InvalidOpcode),
            "{bytes:02x?}"
        );
        assert_eq!(cpu.state, before);
    }
}

#[test]
fn recognized_but_unimplemented_families() {
    let cases: [(&[u8], CpuMode, Mnemonic); 5] = [
        (&[0xD8, 0xC0], CpuMode::Bits32, Mnemonic::X87),
        (&[0x0F, 0x10, 0xC0], CpuMode::Bits64, Mnemonic::Sse),
        (&[0xC5, 0xF8, 0x77], CpuMode::Bits64, Mnemonic::Vex),
        (&[0xC4, 0x00], CpuMode::Bits32, Mnemonic::Les),
        (&[0x0F, 0xA4, 0xC0, 0x01], CpuMode::Bits32, Mnemonic::Shld),
    ];
    for (bytes, mode, mnemonic) in cases {
        let mut cpu = vcpu(mode);
        let before = cpu.state.clone();
        assert_eq!(
            cpu.decode_and_execute_one(bytes),
            StepOutcome::NotImplemented(mnemonic)
        );
        assert_eq!(cpu.state, before);
    }
}

#[test]
fn truncated_and_overlong_encodings() {
    let mut cpu = vcpu(CpuMode::Bits32);
    assert_eq!(
        cpu.decode_and_execute_one(&[0x05, 0x78, 0x56]),
        StepOutcome::Fault(Exception::MalformedEncoding(DecodeError::UnexpectedEof))
    );
    assert_eq!(cpu.state.rip(), 0);

    let mut bytes = [0x66u8; 16];
    bytes[15] = 0x90;
    assert_eq!(
        cpu.decode_and_execute_one(&bytes),
        StepOutcome::Fault(Exception::MalformedEncoding(DecodeError::TooLong))
    );

    assert_eq!(
        cpu.decode_and_execute_one(&[]),
        StepOutcome::Fault(Exception::MalformedEncoding(DecodeError::UnexpectedEof))
    );
}

#[test]
fn divide_error_keeps_registers() {
    let mut cpu = vcpu(CpuMode::Bits32);
    cpu.state.set_gpr(gpr::RAX, 10);
    let before = cpu.state.clone();
    // div ebx with ebx = 0
    assert_eq!(
        cpu.decode_and_execute_one(&[0xF7, 0xF3]),
        StepOutcome::Fault(Exception::DivideError)
    );
    assert_eq!(cpu.state, before);
}

#[test]
fn conditional_branches() {
    let mut cpu = vcpu(CpuMode::Bits32);
    cpu.state.set_rip(0x1000);
    cpu.state.set_rflags(RFlags::ZF);
    assert_eq!(cpu.decode_and_execute_one(&[0x74, 0x10]), StepOutcome::Retired(2));
    assert_eq!(cpu.state.rip(), 0x1012);

    assert_eq!(cpu.decode_and_execute_one(&[0x75, 0x10]), StepOutcome::Retired(2));
    assert_eq!(cpu.state.rip(), 0x1014);

    // jz rel32 backwards
    assert_eq!(
        cpu.decode_and_execute_one(&[0x0F, 0x84, 0xFA, 0xFF, 0xFF, 0xFF]),
        StepOutcome::Retired(6)
    );
    assert_eq!(cpu.state.rip(), 0x1014);
}

#[test]
fn near_call_and_return() {
    let mut cpu = vcpu(CpuMode::Bits64);
    cpu.state.set_rip(0x1000);
    cpu.state.set_gpr(gpr::RSP, 0x8000);

    assert_eq!(
        cpu.decode_and_execute_one(&[0xE8, 0x10, 0x00, 0x00, 0x00]),
        StepOutcome::Retired(5)
    );
    assert_eq!(cpu.state.rip(), 0x1015);
    assert_eq!(cpu.state.gpr(gpr::RSP), 0x7FF8);
    assert_eq!(cpu.mem.read_u64(0x7FF8), 0x1005);

    assert_eq!(cpu.decode_and_execute_one(&[0xC3]), StepOutcome::Retired(1));
    assert_eq!(cpu.state.rip(), 0x1005);
    assert_eq!(cpu.state.gpr(gpr::RSP), 0x8000);
}

#[test]
fn stack_operand_sizes_in_long_mode() {
    let mut cpu = vcpu(CpuMode::Bits64);
    cpu.state.set_gpr(gpr::RSP, 0x8000);
    cpu.state.set_gpr(gpr::RAX, 0x1122_3344_5566_7788);

    assert_eq!(cpu.decode_and_execute_one(&[0x50]), StepOutcome::Retired(1));
    assert_eq!(cpu.state.gpr(gpr::RSP), 0x7FF8);
    assert_eq!(cpu.decode_and_execute_one(&[0x66, 0x50]), StepOutcome::Retired(2));
    assert_eq!(cpu.state.gpr(gpr::RSP), 0x7FF6);
    assert_eq!(cpu.mem.read_u16(0x7FF6), 0x7788);

    // pop r9
    assert_eq!(cpu.decode_and_execute_one(&[0x66, 0x41, 0x59]), StepOutcome::Retired(3));
    assert_eq!(cpu.state.gpr(gpr::R9), 0x7788);
    assert_eq!(cpu.decode_and_execute_one(&[0x41, 0x59]), StepOutcome::Retired(2));
    assert_eq!(cpu.state.gpr(gpr::R9), 0x1122_3344_5566_7788);
    assert_eq!(cpu.state.gpr(gpr::RSP), 0x8000);
}

#[test]
fn rip_relative_addressing_uses_next_instruction() {
    let mut cpu = vcpu(CpuMode::Bits64);
    cpu.state.set_rip(0x1000);
    cpu.mem.load(0x1016, &0xCAFE_F00Du32.to_le_bytes());

    // mov eax, [rip + 0x10]
    assert_eq!(
        cpu.decode_and_execute_one(&[0x8B, 0x05, 0x10, 0x00, 0x00, 0x00]),
        StepOutcome::Retired(6)
    );
    assert_eq!(cpu.state.gpr(gpr::RAX), 0xCAFE_F00D);

    // cmp dword [rip + 0x10], 0x7F: the immediate follows the displacement.
    cpu.state.set_rip(0x1000);
    cpu.mem.clear_log();
    assert_eq!(
        cpu.decode_and_execute_one(&[0x83, 0x3D, 0x0F, 0x00, 0x00, 0x00, 0x7F]),
        StepOutcome::Retired(7)
    );
    assert_eq!(cpu.mem.translations()[0].linear, 0x1016);
}

#[test]
fn thirty_two_bit_writes_zero_extend_but_compares_do_not() {
    let mut cpu = vcpu(CpuMode::Bits64);
    cpu.state.set_gpr(gpr::RAX, u64::MAX);
    cpu.state.set_gpr(gpr::RBX, 1);

    // cmp eax, ebx
    assert_eq!(cpu.decode_and_execute_one(&[0x39, 0xD8]), StepOutcome::Retired(2));
    assert_eq!(cpu.state.gpr(gpr::RAX), u64::MAX);

    // mov eax, ebx
    assert_eq!(cpu.decode_and_execute_one(&[0x89, 0xD8]), StepOutcome::Retired(2));
    assert_eq!(cpu.state.gpr(gpr::RAX), 1);

    // mov ax, bx keeps the upper bits
    cpu.state.set_gpr(gpr::RAX, u64::MAX);
    assert_eq!(
        cpu.decode_and_execute_one(&[0x66, 0x89, 0xD8]),
        StepOutcome::Retired(3)
    );
    assert_eq!(cpu.state.gpr(gpr::RAX), 0xFFFF_FFFF_FFFF_0001);
}

#[test]
fn high_byte_registers_need_no_rex() {
    let mut cpu = vcpu(CpuMode::Bits64);
    cpu.state.set_gpr(gpr::RAX, 0xAB00);
    cpu.state.set_gpr(gpr::RSP, 0x8000);

    // mov al, ah
    assert_eq!(cpu.decode_and_execute_one(&[0x88, 0xE0]), StepOutcome::Retired(2));
    assert_eq!(cpu.state.gpr(gpr::RAX), 0xABAB);

    // with REX, reg 4 is SPL
    assert_eq!(
        cpu.decode_and_execute_one(&[0x40, 0x88, 0xE0]),
        StepOutcome::Retired(3)
    );
    assert_eq!(cpu.state.gpr(gpr::RAX), 0xAB00);
}

#[test]
fn rex_before_legacy_prefix_is_dropped() {
    let mut cpu = vcpu(CpuMode::Bits64);
    // REX.B, 66, mov ax, 0x1234
    assert_eq!(
        cpu.decode_and_execute_one(&[0x41, 0x66, 0xB8, 0x34, 0x12]),
        StepOutcome::Retired(5)
    );
    assert_eq!(cpu.state.gpr(gpr::RAX), 0x1234);
    assert_eq!(cpu.state.gpr(gpr::R8), 0);

    // mov r8d, imm32
    assert_eq!(
        cpu.decode_and_execute_one(&[0x41, 0xB8, 0x44, 0x33, 0x22, 0x11]),
        StepOutcome::Retired(6)
    );
    assert_eq!(cpu.state.gpr(gpr::R8), 0x1122_3344);
}

#[test]
fn movabs_takes_a_full_immediate() {
    let mut cpu = vcpu(CpuMode::Bits64);
    let bytes = [0x48, 0xB8, 0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11];
    assert_eq!(cpu.decode_and_execute_one(&bytes), StepOutcome::Retired(10));
    assert_eq!(cpu.state.gpr(gpr::RAX), 0x1122_3344_5566_7788);
}

#[test]
fn segment_override_and_limit() {
    let mut cpu = vcpu(CpuMode::Bits32);
    let mut fs = cpu.state.segment(SegReg::Fs);
    fs.base = 0x2000;
    fs.limit = 0xFF;
    cpu.state.set_segment(SegReg::Fs, fs);
    cpu.mem.load(0x2010, &0x55u32.to_le_bytes());

    // mov eax, fs:[0x10]
    assert_eq!(
        cpu.decode_and_execute_one(&[0x64, 0xA1, 0x10, 0x00, 0x00, 0x00]),
        StepOutcome::Retired(6)
    );
    assert_eq!(cpu.state.gpr(gpr::RAX), 0x55);

    // mov eax, fs:[0xFE] crosses the limit
    let outcome = cpu.decode_and_execute_one(&[0x64, 0xA1, 0xFE, 0x00, 0x00, 0x00]);
    let StepOutcome::Fault(fault) = outcome else {
        panic!("expected a fault, got {outcome:?}");
    };
    assert_eq!(fault.vector(), 13);
}

#[test]
fn string_move_single_iteration() {
    let mut cpu = vcpu(CpuMode::Bits32);
    cpu.mem.load(0x100, &[1, 2, 3, 4]);
    cpu.state.set_gpr(gpr::RSI, 0x100);
    cpu.state.set_gpr(gpr::RDI, 0x200);

    assert_eq!(cpu.decode_and_execute_one(&[0xA5]), StepOutcome::Retired(1));
    assert_eq!(cpu.mem.slice(0x200, 4), &[1, 2, 3, 4]);
    assert_eq!(cpu.state.gpr(gpr::RSI), 0x104);
    assert_eq!(cpu.state.gpr(gpr::RDI), 0x204);

    cpu.state.set_rflags(RFlags::DF);
    assert_eq!(cpu.decode_and_execute_one(&[0xAA]), StepOutcome::Retired(1));
    assert_eq!(cpu.state.gpr(gpr::RDI), 0x203);
}

#[test]
fn step_fetches_from_cs_base_plus_rip() {
    let mut cpu = vcpu(CpuMode::Bits32);
    cpu.mem.load(0x500, &[0x05, 0x01, 0x00, 0x00, 0x00]);
    cpu.state.set_rip(0x500);

    assert_eq!(cpu.step(), StepOutcome::Retired(5));
    assert_eq!(cpu.state.gpr(gpr::RAX), 1);

    cpu.state.set_rip(0x2_0000);
    assert!(matches!(
        cpu.step(),
        StepOutcome::Fault(Exception::MemoryFault(MemFault {
            kind: MemFaultKind::Page,
            segment: SegReg::Cs,
            ..
        }))
    ));
}

#[test]
fn step_reports_a_page_fault_for_a_truncated_fetch() {
    let mut cpu = Vcpu::new(
        CpuState::new(CpuMode::Bits32),
        FlatTestBus::new(0x1000),
        NoComplexOps,
    );
    // mov eax, imm32 with only the opcode and one immediate byte mapped
    cpu.mem.load(0xFFE, &[0xB8, 0x78]);
    cpu.state.set_rip(0xFFE);

    assert_eq!(
        cpu.step(),
        StepOutcome::Fault(Exception::MemoryFault(MemFault {
            kind: MemFaultKind::Page,
            segment: SegReg::Cs,
            linear: 0x1000,
        }))
    );
    assert_eq!(cpu.state.rip(), 0xFFE);
    assert_eq!(cpu.state.gpr(gpr::RAX), 0);

    // A short fetch that still holds the whole instruction runs normally.
    cpu.mem.load(0xFFE, &[0x40, 0x90]);
    assert_eq!(cpu.step(), StepOutcome::Retired(1));
    assert_eq!(cpu.state.gpr(gpr::RAX), 1);
}

#[test]
fn step_honours_injected_code_faults() {
    let mut cpu = vcpu(CpuMode::Bits32);
    // add eax, 1 straddling a faulting range
    cpu.mem.load(0x7FE, &[0x05, 0x01, 0x00, 0x00, 0x00]);
    cpu.mem.inject_page_fault(0x800..0x1000);
    cpu.state.set_rip(0x7FE);

    assert_eq!(
        cpu.step(),
        StepOutcome::Fault(Exception::MemoryFault(MemFault {
            kind: MemFaultKind::Page,
            segment: SegReg::Cs,
            linear: 0x800,
        }))
    );

    cpu.mem.clear_faults();
    assert_eq!(cpu.step(), StepOutcome::Retired(5));
    assert_eq!(cpu.state.gpr(gpr::RAX), 1);
}
