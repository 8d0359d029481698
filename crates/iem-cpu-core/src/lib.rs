#![forbid(unsafe_code)]

//! Decode-and-dispatch engine for one x86 instruction at a time.
//!
//! [`Vcpu::decode_and_execute_one`] walks prefixes, resolves the opcode
//! through static maps, binds operands, and runs a width-specialized kernel.
//! Memory goes through a two-phase [`MemoryBroker`] so a fault leaves
//! registers, flags and RIP untouched. Far transfers, interrupts, I/O,
//! segment loads, repeated strings and system instructions are handed to a
//! [`ComplexOps`] implementation.

pub mod broker;
pub mod complex;
pub mod config;
pub mod exception;
pub mod interp;
pub mod kernels;
pub mod mem;
pub mod operand;
pub mod state;

use std::sync::Arc;

use iem_decoder::MAX_INST_LEN;

pub use broker::{BrokerStats, LockDomain, MemMapping, MemoryBroker, StripeGuards};
pub use complex::{
    ComplexEnv, ComplexExit, ComplexOp, ComplexOps, IoPort, NoComplexOps, StringOp, SystemOp,
};
pub use config::IemConfig;
pub use exception::{Exception, MemFault, MemFaultKind, StepOutcome, Stop};
pub use interp::decode_and_execute_one;
pub use interp::tables::{classify_group_member, classify_one_byte, classify_two_byte, OpClass};
pub use mem::{Access, FlatTestBus, GuestMemory, TranslateRecord};
pub use operand::EffectiveOperand;
pub use state::{gpr, CpuState, Segment};

pub use iem_decoder::{DecodeError, Rep, RexPolicy};
pub use iem_types::{Cond, CpuMode, Mnemonic, RFlags, SegReg, Width};

/// One virtual CPU: architectural state plus the memory and complex
/// instruction backends it executes against.
pub struct Vcpu<M: GuestMemory, C: ComplexOps = NoComplexOps> {
    pub state: CpuState,
    pub mem: M,
    pub complex: C,
    pub stats: BrokerStats,
    locks: Arc<LockDomain>,
    config: IemConfig,
}

impl<M: GuestMemory, C: ComplexOps> Vcpu<M, C> {
    pub fn new(state: CpuState, mem: M, complex: C) -> Self {
        let config = IemConfig::default();
        let locks = Arc::new(LockDomain::new(config.lock_stripes));
        Self::with_shared_locks(state, mem, complex, locks, config)
    }

    /// Builds a vCPU that shares LOCK exclusion with every other vCPU holding
    /// the same `locks`.
    pub fn with_shared_locks(
        state: CpuState,
        mem: M,
        complex: C,
        locks: Arc<LockDomain>,
        config: IemConfig,
    ) -> Self {
        Self {
            state,
            mem,
            complex,
            stats: BrokerStats::default(),
            locks,
            config,
        }
    }

    pub fn config(&self) -> &IemConfig {
        &self.config
    }

    pub fn locks(&self) -> &Arc<LockDomain> {
        &self.locks
    }

    /// Decodes and executes the instruction whose bytes start at `bytes[0]`,
    /// with RIP pointing at it.
    ///
    /// Only the bytes the instruction needs are consumed; anything past the
    /// 15-byte limit is ignored.
    pub fn decode_and_execute_one(&mut self, bytes: &[u8]) -> StepOutcome {
        let bytes = &bytes[..bytes.len().min(MAX_INST_LEN)];
        interp::decode_and_execute_one(
            &mut self.state,
            &mut self.mem,
            &mut self.complex,
            &self.locks,
            &self.config,
            &mut self.stats,
            bytes,
        )
    }

    /// Fetches up to 15 bytes at `CS.base + RIP` and executes them.
    ///
    /// A fetch that stops short of the instruction's end is a page fault on
    /// CS at the first byte that could not be fetched.
    pub fn step(&mut self) -> StepOutcome {
        let cs = self.state.segment(SegReg::Cs);
        let linear = self
            .state
            .mode
            .ip_width()
            .truncate(cs.base.wrapping_add(self.state.rip()));
        let mut buf = [0u8; MAX_INST_LEN];
        let fetched = self.mem.fetch_code(linear, &mut buf);
        if fetched == 0 {
            let fault = MemFault {
                kind: MemFaultKind::Page,
                segment: SegReg::Cs,
                linear,
            };
            tracing::trace!(linear = format_args!("{linear:#x}"), "code fetch failed");
            return StepOutcome::Fault(fault.into());
        }
        let outcome = self.decode_and_execute_one(&buf[..fetched]);
        match outcome {
            // The instruction runs into bytes that could not be fetched.
            StepOutcome::Fault(Exception::MalformedEncoding(DecodeError::UnexpectedEof))
                if fetched < MAX_INST_LEN =>
            {
                let missing = self
                    .state
                    .mode
                    .ip_width()
                    .truncate(linear.wrapping_add(fetched as u64));
                tracing::trace!(
                    linear = format_args!("{missing:#x}"),
                    "code fetch failed"
                );
                StepOutcome::Fault(
                    MemFault {
                        kind: MemFaultKind::Page,
                        segment: SegReg::Cs,
                        linear: missing,
                    }
                    .into(),
                )
            }
            outcome => outcome,
        }
    }
}
