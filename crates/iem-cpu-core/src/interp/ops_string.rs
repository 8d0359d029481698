//! String instructions and port I/O.
//!
//! Single-iteration `movs`/`cmps`/`stos`/`lods`/`scas` run inline. Repeated
//! forms and everything touching ports go to the complex-instruction handler.

use iem_decoder::Rep;
use iem_types::{gpr, RFlags, SegReg, Width};

use super::{Iem, Next, OpResult};
use crate::complex::{ComplexOp, IoPort, StringOp};
use crate::kernels::CMP;

impl Iem<'_, '_> {
    fn string_width(&self) -> Width {
        self.byte_or_op_size()
    }

    /// Step applied to rSI/rDI after one element.
    fn string_delta(&self, width: Width) -> u64 {
        if self.cpu.rflags().contains(RFlags::DF) {
            (width.bytes() as u64).wrapping_neg()
        } else {
            width.bytes() as u64
        }
    }

    fn string_index(&self, reg: u8) -> u64 {
        self.ctx.addr_size.truncate(self.cpu.gpr(reg))
    }

    fn advance_index(&mut self, reg: u8, delta: u64) {
        let addr_size = self.ctx.addr_size;
        let value = addr_size.truncate(self.cpu.gpr(reg).wrapping_add(delta));
        self.cpu.write_gpr(reg, addr_size, true, value);
    }

    fn defer_string(&mut self, op: StringOp, width: Width, rep: Option<Rep>) -> OpResult {
        let addr_size = self.ctx.addr_size;
        let seg = self.ctx.segment_or(SegReg::Ds);
        self.defer(ComplexOp::String {
            op,
            width,
            addr_size,
            seg,
            rep,
        })
    }

    fn compare(&mut self, lhs: u64, rhs: u64, width: Width) {
        let mut flags = self.cpu.rflags();
        let mut dst = lhs;
        (CMP.kernel(width, false))(&mut dst, rhs, &mut flags);
        self.cpu.set_rflags(flags);
    }
}

/// `A4`/`A5`.
pub(super) fn op_movs(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.string_width();
    if let Some(rep) = iem.ctx.rep() {
        return iem.defer_string(StringOp::Movs, width, Some(rep));
    }
    let src_seg = iem.ctx.segment_or(SegReg::Ds);
    let si = iem.string_index(gpr::RSI);
    let di = iem.string_index(gpr::RDI);
    let value = iem.read_mem(src_seg, si, width)?;
    iem.write_mem(SegReg::Es, di, width, value)?;
    let delta = iem.string_delta(width);
    iem.advance_index(gpr::RSI, delta);
    iem.advance_index(gpr::RDI, delta);
    Ok(Next::Continue)
}

/// `A6`/`A7`.
pub(super) fn op_cmps(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.string_width();
    if let Some(rep) = iem.ctx.rep() {
        return iem.defer_string(StringOp::Cmps, width, Some(rep));
    }
    let src_seg = iem.ctx.segment_or(SegReg::Ds);
    let si = iem.string_index(gpr::RSI);
    let di = iem.string_index(gpr::RDI);
    let lhs = iem.read_mem(src_seg, si, width)?;
    let rhs = iem.read_mem(SegReg::Es, di, width)?;
    iem.compare(lhs, rhs, width);
    let delta = iem.string_delta(width);
    iem.advance_index(gpr::RSI, delta);
    iem.advance_index(gpr::RDI, delta);
    Ok(Next::Continue)
}

/// `AA`/`AB`.
pub(super) fn op_stos(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.string_width();
    if let Some(rep) = iem.ctx.rep() {
        return iem.defer_string(StringOp::Stos, width, Some(rep));
    }
    let di = iem.string_index(gpr::RDI);
    let value = iem.read_reg(gpr::RAX, width);
    iem.write_mem(SegReg::Es, di, width, value)?;
    let delta = iem.string_delta(width);
    iem.advance_index(gpr::RDI, delta);
    Ok(Next::Continue)
}

/// `AC`/`AD`.
pub(super) fn op_lods(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.string_width();
    if let Some(rep) = iem.ctx.rep() {
        return iem.defer_string(StringOp::Lods, width, Some(rep));
    }
    let src_seg = iem.ctx.segment_or(SegReg::Ds);
    let si = iem.string_index(gpr::RSI);
    let value = iem.read_mem(src_seg, si, width)?;
    iem.write_reg(gpr::RAX, width, value);
    let delta = iem.string_delta(width);
    iem.advance_index(gpr::RSI, delta);
    Ok(Next::Continue)
}

/// `AE`/`AF`.
pub(super) fn op_scas(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.string_width();
    if let Some(rep) = iem.ctx.rep() {
        return iem.defer_string(StringOp::Scas, width, Some(rep));
    }
    let di = iem.string_index(gpr::RDI);
    let rhs = iem.read_mem(SegReg::Es, di, width)?;
    let lhs = iem.read_reg(gpr::RAX, width);
    iem.compare(lhs, rhs, width);
    let delta = iem.string_delta(width);
    iem.advance_index(gpr::RDI, delta);
    Ok(Next::Continue)
}

/// `6C`/`6D`.
pub(super) fn op_ins(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = io_width(iem);
    let rep = iem.ctx.rep();
    iem.defer_string(StringOp::Ins, width, rep)
}

/// `6E`/`6F`.
pub(super) fn op_outs(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = io_width(iem);
    let rep = iem.ctx.rep();
    iem.defer_string(StringOp::Outs, width, rep)
}

/// Port I/O moves at most 32 bits.
fn io_width(iem: &Iem<'_, '_>) -> Width {
    match iem.byte_or_op_size() {
        Width::W64 => Width::W32,
        width => width,
    }
}

/// `E4`, `E5`, `EC`, `ED`.
pub(super) fn op_in(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = io_width(iem);
    let port = if iem.opcode & 8 == 0 {
        IoPort::Imm(iem.ctx.next_u8()?)
    } else {
        IoPort::Dx
    };
    iem.defer(ComplexOp::In { port, width })
}

/// `E6`, `E7`, `EE`, `EF`.
pub(super) fn op_out(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = io_width(iem);
    let port = if iem.opcode & 8 == 0 {
        IoPort::Imm(iem.ctx.next_u8()?)
    } else {
        IoPort::Dx
    };
    iem.defer(ComplexOp::Out { port, width })
}
