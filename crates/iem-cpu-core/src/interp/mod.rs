//! Decode-and-dispatch for one instruction.
//!
//! Per instruction: accumulate prefixes in an explicit loop, look the opcode
//! up in [`tables`], follow group/escape entries, and run the handler. Every
//! handler binds its operands, maps memory through the broker, runs a kernel
//! on local copies (operand and RFLAGS), commits, and only then writes
//! registers and flags. RIP is updated last, by [`decode_and_execute_one`].

mod ops_alu;
mod ops_control;
mod ops_data;
mod ops_string;
mod ops_system;
pub mod tables;

use iem_decoder::{decode_rm, prefix, AddrForm, InsnContext, ModRm, PrefixScan, RmOperand};
use iem_types::{gpr, CpuMode, SegReg, Width};

use crate::broker::{BrokerStats, LockDomain, MemMapping, MemoryBroker};
use crate::complex::{ComplexEnv, ComplexExit, ComplexOp, ComplexOps};
use crate::config::IemConfig;
use crate::exception::{Exception, StepOutcome, Stop};
use crate::mem::{Access, GuestMemory};
use crate::operand::EffectiveOperand;
use crate::state::CpuState;

use tables::{OpEntry, ONE_BYTE_MAP, TWO_BYTE_MAP};

/// How RIP moves once a handler returns successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Next {
    /// Fall through to the next instruction.
    Continue,
    Jump(u64),
    /// A complex handler already loaded RIP.
    Branched,
}

pub(crate) type OpResult = Result<Next, Stop>;

pub(crate) type OpFn = fn(&mut Iem<'_, '_>) -> OpResult;

/// Handler context for one instruction.
pub(crate) struct Iem<'a, 'b> {
    pub(crate) cpu: &'a mut CpuState,
    pub(crate) broker: MemoryBroker<'a>,
    pub(crate) complex: &'a mut dyn ComplexOps,
    pub(crate) ctx: InsnContext<'b>,
    /// The opcode byte being executed (second byte for `0F xx`).
    pub(crate) opcode: u8,
}

/// Decodes and executes the instruction at the start of `bytes`.
///
/// On anything but `Retired`, RIP, registers and RFLAGS are exactly as they
/// were, apart from memory the broker already committed.
#[allow(clippy::too_many_arguments)]
pub fn decode_and_execute_one(
    cpu: &mut CpuState,
    mem: &mut dyn GuestMemory,
    complex: &mut dyn ComplexOps,
    locks: &LockDomain,
    config: &IemConfig,
    stats: &mut BrokerStats,
    bytes: &[u8],
) -> StepOutcome {
    let start_rip = cpu.rip();
    let mode = cpu.mode;

    let (result, len, opcode, next_rip) = {
        let mut iem = Iem {
            broker: MemoryBroker::new(mem, locks, mode, stats),
            complex,
            ctx: InsnContext::new(mode, bytes).with_rex_policy(config.rex_policy),
            opcode: 0,
            cpu: &mut *cpu,
        };
        let result = iem.run();
        (result, iem.ctx.len(), iem.opcode, iem.next_rip())
    };

    match result {
        Ok(next) => {
            match next {
                Next::Continue => cpu.set_rip(next_rip),
                Next::Jump(target) => cpu.set_rip(target),
                Next::Branched => {}
            }
            if config.trace_retired {
                tracing::trace!(
                    rip = format_args!("{start_rip:#x}"),
                    opcode = format_args!("{opcode:#04x}"),
                    len,
                    "retired"
                );
            }
            StepOutcome::Retired(len as u8)
        }
        Err(Stop::Fault(exception)) => {
            tracing::trace!(
                rip = format_args!("{start_rip:#x}"),
                vector = exception.vector(),
                %exception,
                "instruction faulted"
            );
            StepOutcome::Fault(exception)
        }
        Err(Stop::NotImplemented(mnemonic)) => {
            let seen = &bytes[..len.min(bytes.len())];
            tracing::debug!(
                rip = format_args!("{start_rip:#x}"),
                %mnemonic,
                bytes = ?seen,
                "instruction not implemented"
            );
            StepOutcome::NotImplemented(mnemonic)
        }
    }
}

impl<'a, 'b> Iem<'a, 'b> {
    fn run(&mut self) -> OpResult {
        let opcode = loop {
            let byte = self.ctx.next_u8()?;
            if let PrefixScan::Opcode(opcode) = prefix::accumulate(&mut self.ctx, byte) {
                break opcode;
            }
        };
        self.opcode = opcode;
        self.dispatch(ONE_BYTE_MAP[opcode as usize])
    }

    fn dispatch(&mut self, entry: OpEntry) -> OpResult {
        match entry {
            OpEntry::Op { handler, lock } => {
                if self.ctx.has_lock() && !lock {
                    return Err(Exception::InvalidLockUsage.into());
                }
                handler(self)
            }
            OpEntry::Group(table) => {
                let modrm = ModRm(self.ctx.peek_u8()?);
                self.dispatch(table[modrm.reg() as usize])
            }
            OpEntry::Escape => {
                let opcode = self.ctx.next_u8()?;
                self.opcode = opcode;
                self.dispatch(TWO_BYTE_MAP[opcode as usize])
            }
            OpEntry::Stub(mnemonic) => {
                if self.mode().is_64bit() && mnemonic.is_invalid_in_long_mode() {
                    return Err(Exception::InvalidOpcode.into());
                }
                Err(Stop::NotImplemented(mnemonic))
            }
            OpEntry::Prefix | OpEntry::Invalid => Err(Exception::InvalidOpcode.into()),
        }
    }

    pub(crate) fn mode(&self) -> CpuMode {
        self.ctx.mode
    }

    pub(crate) fn op_size(&self) -> Width {
        self.ctx.op_size
    }

    /// `Eb`/`Ev` selection by the low opcode bit.
    pub(crate) fn byte_or_op_size(&self) -> Width {
        if self.opcode & 1 == 0 {
            Width::W8
        } else {
            self.ctx.op_size
        }
    }

    pub(crate) fn no_64bit(&self) -> Result<(), Stop> {
        if self.mode().is_64bit() {
            return Err(Exception::InvalidOpcode.into());
        }
        Ok(())
    }

    pub(crate) fn modrm(&mut self) -> Result<ModRm, Stop> {
        Ok(ModRm(self.ctx.next_u8()?))
    }

    /// ModRM for an instruction that accepts LOCK only with a memory operand.
    pub(crate) fn modrm_lockable(&mut self) -> Result<ModRm, Stop> {
        let modrm = self.modrm()?;
        if modrm.is_reg() && self.ctx.has_lock() {
            return Err(Exception::InvalidLockUsage.into());
        }
        Ok(modrm)
    }

    pub(crate) fn decode_rm(&mut self, modrm: ModRm) -> Result<RmOperand, Stop> {
        Ok(decode_rm(&mut self.ctx, modrm)?)
    }

    /// ModRM r/m form that must address memory.
    pub(crate) fn decode_mem(&mut self, modrm: ModRm) -> Result<AddrForm, Stop> {
        match self.decode_rm(modrm)? {
            RmOperand::Mem(form) => Ok(form),
            RmOperand::Reg(_) => Err(Exception::InvalidOpcode.into()),
        }
    }

    /// `ModRM.reg` extended with `REX.R`.
    pub(crate) fn reg_index(&self, modrm: ModRm) -> u8 {
        modrm.reg() | self.ctx.rex_reg
    }

    /// Register encoded in the low three opcode bits, extended with `REX.B`.
    pub(crate) fn opcode_reg(&self) -> u8 {
        (self.opcode & 7) | self.ctx.rex_base
    }

    pub(crate) fn read_reg(&self, index: u8, width: Width) -> u64 {
        self.cpu.read_gpr(index, width, self.ctx.has_rex())
    }

    pub(crate) fn write_reg(&mut self, index: u8, width: Width, value: u64) {
        let rex = self.ctx.has_rex();
        self.cpu.write_gpr(index, width, rex, value);
    }

    pub(crate) fn next_rip(&self) -> u64 {
        let rip = self.cpu.rip().wrapping_add(self.ctx.len() as u64);
        self.mode().ip_width().truncate(rip)
    }

    /// Must only be called after every byte of the instruction is consumed.
    pub(crate) fn effective_address(&self, form: &AddrForm) -> u64 {
        let cpu = &*self.cpu;
        form.effective_address(|r| cpu.gpr(r), self.next_rip())
    }

    pub(crate) fn operand(&self, rm: &RmOperand, width: Width) -> EffectiveOperand {
        match rm {
            RmOperand::Reg(index) => EffectiveOperand::Reg {
                index: *index,
                width,
            },
            RmOperand::Mem(form) => EffectiveOperand::Mem {
                seg: form.seg,
                offset: self.effective_address(form),
                width,
            },
        }
    }

    pub(crate) fn map_with(
        &mut self,
        seg: SegReg,
        offset: u64,
        width: Width,
        access: Access,
        locked: bool,
    ) -> Result<MemMapping<'a>, Stop> {
        let cache = self.cpu.segment(seg);
        Ok(self
            .broker
            .map(seg, &cache, offset, width, access, locked)?)
    }

    pub(crate) fn map_at(
        &mut self,
        seg: SegReg,
        offset: u64,
        width: Width,
        access: Access,
    ) -> Result<MemMapping<'a>, Stop> {
        let locked = self.ctx.has_lock() && access.writes();
        self.map_with(seg, offset, width, access, locked)
    }

    pub(crate) fn map(
        &mut self,
        form: &AddrForm,
        width: Width,
        access: Access,
    ) -> Result<MemMapping<'a>, Stop> {
        let offset = self.effective_address(form);
        self.map_at(form.seg, offset, width, access)
    }

    pub(crate) fn commit(&mut self, mapping: MemMapping<'a>) -> Result<(), Stop> {
        Ok(self.broker.commit(mapping)?)
    }

    pub(crate) fn read_mem(&mut self, seg: SegReg, offset: u64, width: Width) -> Result<u64, Stop> {
        let mapping = self.map_at(seg, offset, width, Access::Read)?;
        let value = mapping.value();
        self.commit(mapping)?;
        Ok(value)
    }

    pub(crate) fn write_mem(
        &mut self,
        seg: SegReg,
        offset: u64,
        width: Width,
        value: u64,
    ) -> Result<(), Stop> {
        let mut mapping = self.map_at(seg, offset, width, Access::Write)?;
        mapping.set_value(value);
        self.commit(mapping)
    }

    pub(crate) fn read_rm(&mut self, rm: &RmOperand, width: Width) -> Result<u64, Stop> {
        match rm {
            RmOperand::Reg(index) => Ok(self.read_reg(*index, width)),
            RmOperand::Mem(form) => {
                let offset = self.effective_address(form);
                self.read_mem(form.seg, offset, width)
            }
        }
    }

    pub(crate) fn write_rm(&mut self, rm: &RmOperand, width: Width, value: u64) -> Result<(), Stop> {
        match rm {
            RmOperand::Reg(index) => {
                self.write_reg(*index, width, value);
                Ok(())
            }
            RmOperand::Mem(form) => {
                let offset = self.effective_address(form);
                self.write_mem(form.seg, offset, width, value)
            }
        }
    }

    /// Width of rSP for implicit stack accesses.
    pub(crate) fn stack_width(&self) -> Width {
        self.mode().ip_width()
    }

    pub(crate) fn stack_pointer(&self) -> u64 {
        self.stack_width().truncate(self.cpu.gpr(gpr::RSP))
    }

    pub(crate) fn set_stack_pointer(&mut self, rsp: u64) {
        let width = self.stack_width();
        self.cpu.write_gpr(gpr::RSP, width, true, rsp);
    }

    pub(crate) fn push(&mut self, width: Width, value: u64) -> Result<(), Stop> {
        let rsp = self
            .stack_width()
            .truncate(self.cpu.gpr(gpr::RSP).wrapping_sub(width.bytes() as u64));
        self.write_mem(SegReg::Ss, rsp, width, value)?;
        self.set_stack_pointer(rsp);
        Ok(())
    }

    /// Reads the top of stack without moving rSP; returns the value and the
    /// rSP a pop would leave behind.
    pub(crate) fn peek_stack(&mut self, width: Width) -> Result<(u64, u64), Stop> {
        let rsp = self.stack_pointer();
        let value = self.read_mem(SegReg::Ss, rsp, width)?;
        let next = self
            .stack_width()
            .truncate(rsp.wrapping_add(width.bytes() as u64));
        Ok((value, next))
    }

    pub(crate) fn pop(&mut self, width: Width) -> Result<u64, Stop> {
        let (value, rsp) = self.peek_stack(width)?;
        self.set_stack_pointer(rsp);
        Ok(value)
    }

    /// Near branch relative to the next instruction, truncated to the
    /// operand size.
    pub(crate) fn branch_rel(&self, disp: u64) -> OpResult {
        let target = self.next_rip().wrapping_add(disp);
        Ok(Next::Jump(self.ctx.op_size.truncate(target)))
    }

    /// Hands the instruction to the complex-instruction handler.
    pub(crate) fn defer(&mut self, op: ComplexOp) -> OpResult {
        let next_rip = self.next_rip();
        let env = ComplexEnv {
            cpu: &mut *self.cpu,
            mem: self.broker.memory(),
            next_rip,
        };
        match self.complex.execute(env, op)? {
            ComplexExit::Continue => Ok(Next::Continue),
            ComplexExit::Branch => Ok(Next::Branched),
        }
    }
}
