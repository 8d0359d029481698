//! Instruction lengths reported on retirement must agree with iced-x86.

use iced_x86::{Decoder, DecoderOptions};
use iem_cpu_core::{
    gpr, ComplexEnv, ComplexExit, ComplexOp, ComplexOps, CpuMode, CpuState, FlatTestBus,
    StepOutcome, Stop, Vcpu,
};

struct Accept;

impl ComplexOps for Accept {
    fn execute(&mut self, _env: ComplexEnv<'_>, _op: ComplexOp) -> Result<ComplexExit, Stop> {
        Ok(ComplexExit::Continue)
    }
}

fn iced_len(bitness: u32, bytes: &[u8]) -> usize {
    let mut decoder = Decoder::with_ip(bitness, bytes, 0, DecoderOptions::NONE);
    let insn = decoder.decode();
    assert!(!insn.is_invalid(), "iced rejected {bytes:02x?}");
    insn.len()
}

fn check(mode: CpuMode, cases: &[&[u8]]) {
    let bitness = match mode {
        CpuMode::Bits16 => 16,
        CpuMode::Bits32 => 32,
        CpuMode::Bits64 => 64,
    };
    for bytes in cases {
        let mut state = CpuState::new(mode);
        state.set_gpr(gpr::RSP, 0x8000);
        let mut cpu = Vcpu::new(state, FlatTestBus::new(0x10000), Accept);

        let outcome = cpu.decode_and_execute_one(bytes);
        let expected = iced_len(bitness, bytes);
        assert_eq!(
            outcome,
            StepOutcome::Retired(expected as u8),
            "length mismatch for {bytes:02x?}"
        );
    }
}

#[test]
fn long_mode_lengths() {
    check(
        CpuMode::Bits64,
        &[
            // add rax, rbx
            &[0x48, 0x01, 0xD8],
            // add rax, 0x7f
            &[0x48, 0x83, 0xC0, 0x7F],
            // add rax, 0x12345678
            &[0x48, 0x81, 0xC0, 0x78, 0x56, 0x34, 0x12],
            // mov rax, imm64
            &[0x48, 0xB8, 1, 2, 3, 4, 5, 6, 7, 8],
            // mov ax, 0x1234
            &[0x66, 0xB8, 0x34, 0x12],
            // mov eax, [rip + 0x10]
            &[0x8B, 0x05, 0x10, 0x00, 0x00, 0x00],
            // mov eax, [rsp + 8]
            &[0x8B, 0x44, 0x24, 0x08],
            // lea rax, [rcx*4 + 0x100]
            &[0x48, 0x8D, 0x04, 0x8D, 0x00, 0x01, 0x00, 0x00],
            // push qword [r12]
            &[0x41, 0xFF, 0x34, 0x24],
            // lock xadd [rax], rbx
            &[0xF0, 0x48, 0x0F, 0xC1, 0x18],
            // movzx eax, cl
            &[0x0F, 0xB6, 0xC1],
            // movsxd rax, ecx
            &[0x48, 0x63, 0xC1],
            // cmovz eax, ecx
            &[0x0F, 0x44, 0xC1],
            // setz al
            &[0x0F, 0x94, 0xC0],
            // shl eax, 4
            &[0xC1, 0xE0, 0x04],
            // neg eax
            &[0xF7, 0xD8],
            // imul eax, eax, 10000
            &[0x69, 0xC0, 0x10, 0x27, 0x00, 0x00],
            // imul eax, eax, 5
            &[0x6B, 0xC0, 0x05],
            // bt eax, 3
            &[0x0F, 0xBA, 0xE0, 0x03],
            // bswap eax
            &[0x0F, 0xC8],
            // call $+5
            &[0xE8, 0x00, 0x00, 0x00, 0x00],
            // jmp $
            &[0xEB, 0xFE],
            // jnz rel32
            &[0x0F, 0x85, 0x00, 0x00, 0x00, 0x00],
            // ret 8
            &[0xC2, 0x08, 0x00],
            // int 0x80
            &[0xCD, 0x80],
            // xgetbv
            &[0x0F, 0x01, 0xD0],
            // cpuid
            &[0x0F, 0xA2],
            // nop word [rax + rax]
            &[0x66, 0x0F, 0x1F, 0x44, 0x00, 0x00],
            // prefetchnta [rax]
            &[0x0F, 0x18, 0x00],
            // mov rax, fs:[0]
            &[0x64, 0x48, 0x8B, 0x04, 0x25, 0x00, 0x00, 0x00, 0x00],
            // mov rax, [moffs64]
            &[0x48, 0xA1, 0, 0, 0, 0, 0, 0, 0, 0],
            // rep stosq
            &[0xF3, 0x48, 0xAB],
            // mov eax, ds
            &[0x8C, 0xD8],
            // pushfq
            &[0x9C],
            // xchg r8, rax
            &[0x49, 0x90],
            // cmpxchg [rax], ecx
            &[0x0F, 0xB1, 0x08],
            // in al, 0x60
            &[0xE4, 0x60],
        ],
    );
}

#[test]
fn protected_mode_lengths() {
    check(
        CpuMode::Bits32,
        &[
            // add eax, 0x12345678
            &[0x05, 0x78, 0x56, 0x34, 0x12],
            // mov eax, [0]
            &[0x8B, 0x04, 0x25, 0x00, 0x00, 0x00, 0x00],
            // mov ax, [eax]
            &[0x66, 0x8B, 0x00],
            // mov eax, [bx + si]
            &[0x67, 0x8B, 0x00],
            // mov eax, [0x1234]
            &[0x67, 0x8B, 0x06, 0x34, 0x12],
            // mov eax, [ebp + 0x10]
            &[0x8B, 0x45, 0x10],
            // inc eax
            &[0x40],
            // call 0x0008:0
            &[0x9A, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00],
            // pushad
            &[0x60],
            // mov eax, cr0
            &[0x0F, 0x20, 0xC0],
            // mov eax, [0]
            &[0xA1, 0x00, 0x00, 0x00, 0x00],
            // push -1
            &[0x6A, 0xFF],
            // push 0x12345678
            &[0x68, 0x78, 0x56, 0x34, 0x12],
            // imul eax, ecx
            &[0x0F, 0xAF, 0xC1],
            // shl eax, cl
            &[0xD3, 0xE0],
            // pop dword [eax]
            &[0x8F, 0x00],
            // loop $
            &[0xE2, 0xFE],
            // lldt ax
            &[0x0F, 0x00, 0xD0],
            // test byte [eax], 1
            &[0xF6, 0x00, 0x01],
            // mov word [eax], 0x1234
            &[0x66, 0xC7, 0x00, 0x34, 0x12],
            // rep movsd
            &[0xF3, 0xA5],
            // lock or dword [esi + ebx*2 + 0x10], 1
            &[0xF0, 0x83, 0x4C, 0x5E, 0x10, 0x01],
        ],
    );
}

#[test]
fn real_mode_lengths() {
    check(
        CpuMode::Bits16,
        &[
            // mov ax, 0x1234
            &[0xB8, 0x34, 0x12],
            // mov eax, 0x12345678
            &[0x66, 0xB8, 0x78, 0x56, 0x34, 0x12],
            // mov ax, [bx]
            &[0x8B, 0x07],
            // mov ax, [bp + di + 0x1234]
            &[0x8B, 0x83, 0x34, 0x12],
            // call rel16
            &[0xE8, 0x00, 0x00],
            // jmp 0xf000:0xfff0
            &[0xEA, 0xF0, 0xFF, 0x00, 0xF0],
            // mov ds, ax
            &[0x8E, 0xD8],
            // add word [es:bx], 1
            &[0x26, 0x83, 0x07, 0x01],
        ],
    );
}
