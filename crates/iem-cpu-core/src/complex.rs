//! Hand-off point for instructions whose semantics live outside the engine:
//! far control transfers, interrupts, I/O, segment loads, repeated string
//! operations and system instructions.
//!
//! The engine decodes operands, builds a [`ComplexOp`] and calls
//! [`ComplexOps::execute`]. The handler decides everything else.

use iem_decoder::Rep;
use iem_types::{Mnemonic, SegReg, Width};

use crate::exception::Stop;
use crate::mem::GuestMemory;
use crate::operand::EffectiveOperand;
use crate::state::CpuState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoPort {
    Imm(u8),
    Dx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOp {
    Movs,
    Cmps,
    Stos,
    Lods,
    Scas,
    Ins,
    Outs,
}

impl StringOp {
    pub const fn mnemonic(self) -> Mnemonic {
        match self {
            StringOp::Movs => Mnemonic::Movs,
            StringOp::Cmps => Mnemonic::Cmps,
            StringOp::Stos => Mnemonic::Stos,
            StringOp::Lods => Mnemonic::Lods,
            StringOp::Scas => Mnemonic::Scas,
            StringOp::Ins => Mnemonic::Ins,
            StringOp::Outs => Mnemonic::Outs,
        }
    }
}

/// System instructions forwarded with their (optional) decoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemOp {
    Sldt,
    Str,
    Lldt,
    Ltr,
    Verr,
    Verw,
    Sgdt,
    Sidt,
    Lgdt,
    Lidt,
    Smsw,
    Lmsw,
    Invlpg,
    Vmcall,
    Vmlaunch,
    Vmresume,
    Vmxoff,
    Monitor,
    Mwait,
    Xgetbv,
    Xsetbv,
    Swapgs,
    Rdtscp,
    Clts,
    Invd,
    Wbinvd,
    Syscall,
    Sysret,
    Sysenter,
    Sysexit,
    Wrmsr,
    Rdmsr,
    Rdtsc,
    Rdpmc,
    Cpuid,
    Rsm,
    Hlt,
    Cli,
    Sti,
}

impl SystemOp {
    pub const fn mnemonic(self) -> Mnemonic {
        match self {
            SystemOp::Sldt => Mnemonic::Sldt,
            SystemOp::Str => Mnemonic::Str,
            SystemOp::Lldt => Mnemonic::Lldt,
            SystemOp::Ltr => Mnemonic::Ltr,
            SystemOp::Verr => Mnemonic::Verr,
            SystemOp::Verw => Mnemonic::Verw,
            SystemOp::Sgdt => Mnemonic::Sgdt,
            SystemOp::Sidt => Mnemonic::Sidt,
            SystemOp::Lgdt => Mnemonic::Lgdt,
            SystemOp::Lidt => Mnemonic::Lidt,
            SystemOp::Smsw => Mnemonic::Smsw,
            SystemOp::Lmsw => Mnemonic::Lmsw,
            SystemOp::Invlpg => Mnemonic::Invlpg,
            SystemOp::Vmcall => Mnemonic::Vmcall,
            SystemOp::Vmlaunch => Mnemonic::Vmlaunch,
            SystemOp::Vmresume => Mnemonic::Vmresume,
            SystemOp::Vmxoff => Mnemonic::Vmxoff,
            SystemOp::Monitor => Mnemonic::Monitor,
            SystemOp::Mwait => Mnemonic::Mwait,
            SystemOp::Xgetbv => Mnemonic::Xgetbv,
            SystemOp::Xsetbv => Mnemonic::Xsetbv,
            SystemOp::Swapgs => Mnemonic::Swapgs,
            SystemOp::Rdtscp => Mnemonic::Rdtscp,
            SystemOp::Clts => Mnemonic::Clts,
            SystemOp::Invd => Mnemonic::Invd,
            SystemOp::Wbinvd => Mnemonic::Wbinvd,
            SystemOp::Syscall => Mnemonic::Syscall,
            SystemOp::Sysret => Mnemonic::Sysret,
            SystemOp::Sysenter => Mnemonic::Sysenter,
            SystemOp::Sysexit => Mnemonic::Sysexit,
            SystemOp::Wrmsr => Mnemonic::Wrmsr,
            SystemOp::Rdmsr => Mnemonic::Rdmsr,
            SystemOp::Rdtsc => Mnemonic::Rdtsc,
            SystemOp::Rdpmc => Mnemonic::Rdpmc,
            SystemOp::Cpuid => Mnemonic::Cpuid,
            SystemOp::Rsm => Mnemonic::Rsm,
            SystemOp::Hlt => Mnemonic::Hlt,
            SystemOp::Cli => Mnemonic::Cli,
            SystemOp::Sti => Mnemonic::Sti,
        }
    }
}

/// A decoded request for a complex-instruction handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexOp {
    FarCall {
        selector: u16,
        offset: u64,
        op_size: Width,
    },
    FarJmp {
        selector: u16,
        offset: u64,
        op_size: Width,
    },
    FarRet {
        op_size: Width,
        pop: u16,
    },
    Int3,
    Int {
        vector: u8,
    },
    Into,
    Iret {
        op_size: Width,
    },
    In {
        port: IoPort,
        width: Width,
    },
    Out {
        port: IoPort,
        width: Width,
    },
    /// A string instruction with a repeat prefix, or `ins`/`outs` with or
    /// without one.
    String {
        op: StringOp,
        width: Width,
        addr_size: Width,
        /// Source segment (destination is always ES).
        seg: SegReg,
        rep: Option<Rep>,
    },
    LoadSegment {
        seg: SegReg,
        selector: u16,
    },
    PopSegment {
        seg: SegReg,
        op_size: Width,
    },
    Pushf {
        op_size: Width,
    },
    Popf {
        op_size: Width,
    },
    Pusha {
        op_size: Width,
    },
    Popa {
        op_size: Width,
    },
    MovFromCr {
        cr: u8,
        gpr: u8,
    },
    MovToCr {
        cr: u8,
        gpr: u8,
    },
    MovFromDr {
        dr: u8,
        gpr: u8,
    },
    MovToDr {
        dr: u8,
        gpr: u8,
    },
    System {
        op: SystemOp,
        operand: Option<EffectiveOperand>,
    },
}

impl ComplexOp {
    pub fn mnemonic(&self) -> Mnemonic {
        match self {
            ComplexOp::FarCall { .. } => Mnemonic::CallFar,
            ComplexOp::FarJmp { .. } => Mnemonic::JmpFar,
            ComplexOp::FarRet { .. } => Mnemonic::RetFar,
            ComplexOp::Int3 => Mnemonic::Int3,
            ComplexOp::Int { .. } => Mnemonic::Int,
            ComplexOp::Into => Mnemonic::Into,
            ComplexOp::Iret { .. } => Mnemonic::Iret,
            ComplexOp::In { .. } => Mnemonic::In,
            ComplexOp::Out { .. } => Mnemonic::Out,
            ComplexOp::String { op, .. } => op.mnemonic(),
            ComplexOp::LoadSegment { .. } => Mnemonic::MovSreg,
            ComplexOp::PopSegment { .. } => Mnemonic::PopSreg,
            ComplexOp::Pushf { .. } => Mnemonic::Pushf,
            ComplexOp::Popf { .. } => Mnemonic::Popf,
            ComplexOp::Pusha { .. } => Mnemonic::Pusha,
            ComplexOp::Popa { .. } => Mnemonic::Popa,
            ComplexOp::MovFromCr { .. } | ComplexOp::MovToCr { .. } => Mnemonic::MovCr,
            ComplexOp::MovFromDr { .. } | ComplexOp::MovToDr { .. } => Mnemonic::MovDr,
            ComplexOp::System { op, .. } => op.mnemonic(),
        }
    }
}

/// How the engine should finish the instruction after a complex handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexExit {
    /// Advance RIP past the instruction.
    Continue,
    /// The handler already loaded RIP.
    Branch,
}

/// Guest state lent to a complex handler for one call.
pub struct ComplexEnv<'a> {
    pub cpu: &'a mut CpuState,
    pub mem: &'a mut dyn GuestMemory,
    /// Address of the following instruction.
    pub next_rip: u64,
}

pub trait ComplexOps {
    fn execute(&mut self, env: ComplexEnv<'_>, op: ComplexOp) -> Result<ComplexExit, Stop>;
}

impl<T: ComplexOps + ?Sized> ComplexOps for &mut T {
    fn execute(&mut self, env: ComplexEnv<'_>, op: ComplexOp) -> Result<ComplexExit, Stop> {
        (**self).execute(env, op)
    }
}

/// Reports every request as not implemented.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoComplexOps;

impl ComplexOps for NoComplexOps {
    fn execute(&mut self, _env: ComplexEnv<'_>, op: ComplexOp) -> Result<ComplexExit, Stop> {
        Err(Stop::NotImplemented(op.mnemonic()))
    }
}
