//! Data movement: `mov` forms, `lea`, `xchg`, extensions, conditional moves,
//! flag transfers and the stack.

use iem_decoder::RmOperand;
use iem_types::{gpr, Cond, Mnemonic, RFlags, SegReg, Width};

use super::{Iem, Next, OpResult};
use crate::complex::ComplexOp;
use crate::exception::{Exception, Stop};
use crate::mem::Access;

/// Flags `sahf` loads from AH.
const SAHF_MASK: u64 = 0xD5;

/// `88`/`89`.
pub(super) fn op_mov_e_g(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.byte_or_op_size();
    let modrm = iem.modrm()?;
    let rm = iem.decode_rm(modrm)?;
    let value = iem.read_reg(iem.reg_index(modrm), width);
    iem.write_rm(&rm, width, value)?;
    Ok(Next::Continue)
}

/// `8A`/`8B`.
pub(super) fn op_mov_g_e(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.byte_or_op_size();
    let modrm = iem.modrm()?;
    let rm = iem.decode_rm(modrm)?;
    let value = iem.read_rm(&rm, width)?;
    iem.write_reg(iem.reg_index(modrm), width, value);
    Ok(Next::Continue)
}

/// `8C`: `mov Ev,Sw`. Register destinations take the zero-extended selector.
pub(super) fn op_mov_ev_sw(iem: &mut Iem<'_, '_>) -> OpResult {
    let modrm = iem.modrm()?;
    let seg = SegReg::from_index(modrm.reg()).ok_or(Exception::InvalidOpcode)?;
    let rm = iem.decode_rm(modrm)?;
    let selector = iem.cpu.segment(seg).selector as u64;
    let width = match rm {
        RmOperand::Reg(_) => iem.op_size(),
        RmOperand::Mem(_) => Width::W16,
    };
    iem.write_rm(&rm, width, selector)?;
    Ok(Next::Continue)
}

/// `8D`.
pub(super) fn op_lea(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.op_size();
    let modrm = iem.modrm()?;
    let form = iem.decode_mem(modrm)?;
    let ea = iem.effective_address(&form);
    iem.write_reg(iem.reg_index(modrm), width, ea);
    Ok(Next::Continue)
}

/// `8E`: `mov Sw,Ew`. Loading CS this way is undefined.
pub(super) fn op_mov_sw_ew(iem: &mut Iem<'_, '_>) -> OpResult {
    let modrm = iem.modrm()?;
    let seg = match SegReg::from_index(modrm.reg()) {
        Some(SegReg::Cs) | None => return Err(Exception::InvalidOpcode.into()),
        Some(seg) => seg,
    };
    let rm = iem.decode_rm(modrm)?;
    let selector = iem.read_rm(&rm, Width::W16)? as u16;
    iem.defer(ComplexOp::LoadSegment { seg, selector })
}

/// Group 1A (`8F /0`): `pop Ev`. A memory destination is addressed with the
/// already-incremented rSP.
pub(super) fn op_pop_ev(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_default_64bit_op_size();
    let width = iem.op_size();
    let modrm = iem.modrm()?;
    let rm = iem.decode_rm(modrm)?;
    let (value, rsp) = iem.peek_stack(width)?;
    match rm {
        RmOperand::Reg(index) => {
            iem.set_stack_pointer(rsp);
            iem.write_reg(index, width, value);
        }
        RmOperand::Mem(form) => {
            let saved = iem.cpu.gpr(gpr::RSP);
            iem.set_stack_pointer(rsp);
            let offset = iem.effective_address(&form);
            iem.cpu.set_gpr(gpr::RSP, saved);
            iem.write_mem(form.seg, offset, width, value)?;
            iem.set_stack_pointer(rsp);
        }
    }
    Ok(Next::Continue)
}

/// `86`/`87`. A memory operand is always accessed locked.
pub(super) fn op_xchg_e_g(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.byte_or_op_size();
    let modrm = iem.modrm_lockable()?;
    let rm = iem.decode_rm(modrm)?;
    let reg = iem.reg_index(modrm);
    let reg_value = iem.read_reg(reg, width);
    match rm {
        RmOperand::Reg(index) => {
            let other = iem.read_reg(index, width);
            iem.write_reg(index, width, reg_value);
            iem.write_reg(reg, width, other);
        }
        RmOperand::Mem(form) => {
            let offset = iem.effective_address(&form);
            let mut mem = iem.map_with(form.seg, offset, width, Access::ReadWrite, true)?;
            let other = mem.value();
            mem.set_value(reg_value);
            iem.commit(mem)?;
            iem.write_reg(reg, width, other);
        }
    }
    Ok(Next::Continue)
}

fn xchg_with_rax(iem: &mut Iem<'_, '_>, index: u8) {
    let width = iem.op_size();
    let rax = iem.read_reg(gpr::RAX, width);
    let other = iem.read_reg(index, width);
    iem.write_reg(gpr::RAX, width, other);
    iem.write_reg(index, width, rax);
}

/// `90`: `nop`, `pause` with `F3`, or `xchg r8,rAX` with `REX.B`.
pub(super) fn op_nop(iem: &mut Iem<'_, '_>) -> OpResult {
    if iem.ctx.rex_base != 0 {
        let index = iem.opcode_reg();
        xchg_with_rax(iem, index);
    }
    Ok(Next::Continue)
}

/// `91..=97`.
pub(super) fn op_xchg_rax(iem: &mut Iem<'_, '_>) -> OpResult {
    let index = iem.opcode_reg();
    xchg_with_rax(iem, index);
    Ok(Next::Continue)
}

/// `98`: `cbw`/`cwde`/`cdqe`.
pub(super) fn op_cbw(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.op_size();
    let half = match width {
        Width::W16 => Width::W8,
        Width::W32 => Width::W16,
        _ => Width::W32,
    };
    let value = half.sign_extend(iem.read_reg(gpr::RAX, half));
    iem.write_reg(gpr::RAX, width, value);
    Ok(Next::Continue)
}

/// `99`: `cwd`/`cdq`/`cqo`.
pub(super) fn op_cwd(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.op_size();
    let negative = iem.read_reg(gpr::RAX, width) & width.sign_bit() != 0;
    let value = if negative { u64::MAX } else { 0 };
    iem.write_reg(gpr::RDX, width, value);
    Ok(Next::Continue)
}

/// `9E`.
pub(super) fn op_sahf(iem: &mut Iem<'_, '_>) -> OpResult {
    let ah = iem.cpu.read_gpr(gpr::RSP, Width::W8, false);
    let bits = (iem.cpu.rflags().bits() & !SAHF_MASK) | (ah & SAHF_MASK);
    iem.cpu.set_rflags(RFlags::from_bits_retain(bits));
    Ok(Next::Continue)
}

/// `9F`.
pub(super) fn op_lahf(iem: &mut Iem<'_, '_>) -> OpResult {
    let low = iem.cpu.rflags().bits() & 0xFF;
    iem.cpu.write_gpr(gpr::RSP, Width::W8, false, low);
    Ok(Next::Continue)
}

/// `A0..=A3`: accumulator to/from an absolute offset.
pub(super) fn op_mov_moffs(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.byte_or_op_size();
    let addr_size = iem.ctx.addr_size;
    let offset = iem.ctx.imm(addr_size)?;
    let seg = iem.ctx.segment_or(SegReg::Ds);
    if iem.opcode & 2 == 0 {
        let value = iem.read_mem(seg, offset, width)?;
        iem.write_reg(gpr::RAX, width, value);
    } else {
        let value = iem.read_reg(gpr::RAX, width);
        iem.write_mem(seg, offset, width, value)?;
    }
    Ok(Next::Continue)
}

/// `B0..=B7`.
pub(super) fn op_mov_r8_ib(iem: &mut Iem<'_, '_>) -> OpResult {
    let value = iem.ctx.next_u8()? as u64;
    iem.write_reg(iem.opcode_reg(), Width::W8, value);
    Ok(Next::Continue)
}

/// `B8..=BF`; the only form with a full 64-bit immediate.
pub(super) fn op_mov_r_imm(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.op_size();
    let value = iem.ctx.imm(width)?;
    iem.write_reg(iem.opcode_reg(), width, value);
    Ok(Next::Continue)
}

/// Group 11 (`C6 /0`, `C7 /0`).
pub(super) fn op_mov_e_imm(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.byte_or_op_size();
    let modrm = iem.modrm()?;
    let rm = iem.decode_rm(modrm)?;
    let value = match width {
        Width::W8 => iem.ctx.next_u8()? as u64,
        _ => iem.ctx.imm_z()?,
    };
    iem.write_rm(&rm, width, value)?;
    Ok(Next::Continue)
}

/// `0F B6/B7` (`movzx`) and `0F BE/BF` (`movsx`).
pub(super) fn op_movzx_movsx(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.op_size();
    let src_width = if iem.opcode & 1 == 0 {
        Width::W8
    } else {
        Width::W16
    };
    let modrm = iem.modrm()?;
    let rm = iem.decode_rm(modrm)?;
    let mut value = iem.read_rm(&rm, src_width)?;
    if iem.opcode & 8 != 0 {
        value = src_width.sign_extend(value);
    }
    iem.write_reg(iem.reg_index(modrm), width, value);
    Ok(Next::Continue)
}

/// `63`: `movsxd` in long mode, `arpl` elsewhere.
pub(super) fn op_arpl_movsxd(iem: &mut Iem<'_, '_>) -> OpResult {
    if !iem.mode().is_64bit() {
        return Err(Stop::NotImplemented(Mnemonic::Arpl));
    }
    let width = iem.op_size();
    let src_width = if width == Width::W16 {
        Width::W16
    } else {
        Width::W32
    };
    let modrm = iem.modrm()?;
    let rm = iem.decode_rm(modrm)?;
    let value = src_width.sign_extend(iem.read_rm(&rm, src_width)?);
    iem.write_reg(iem.reg_index(modrm), width, value);
    Ok(Next::Continue)
}

/// `D7`.
pub(super) fn op_xlat(iem: &mut Iem<'_, '_>) -> OpResult {
    let addr_size = iem.ctx.addr_size;
    let al = iem.read_reg(gpr::RAX, Width::W8);
    let offset = addr_size.truncate(iem.cpu.gpr(gpr::RBX).wrapping_add(al));
    let seg = iem.ctx.segment_or(SegReg::Ds);
    let value = iem.read_mem(seg, offset, Width::W8)?;
    iem.write_reg(gpr::RAX, Width::W8, value);
    Ok(Next::Continue)
}

/// `0F 40..=4F`. The source is read even when the condition is false, and a
/// 32-bit destination is zero-extended either way.
pub(super) fn op_cmovcc(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.op_size();
    let modrm = iem.modrm()?;
    let rm = iem.decode_rm(modrm)?;
    let src = iem.read_rm(&rm, width)?;
    let reg = iem.reg_index(modrm);
    let value = if Cond::from_low_nibble(iem.opcode).eval(iem.cpu.rflags()) {
        src
    } else {
        iem.read_reg(reg, width)
    };
    iem.write_reg(reg, width, value);
    Ok(Next::Continue)
}

/// `0F 90..=9F`.
pub(super) fn op_setcc(iem: &mut Iem<'_, '_>) -> OpResult {
    let modrm = iem.modrm()?;
    let rm = iem.decode_rm(modrm)?;
    let value = Cond::from_low_nibble(iem.opcode).eval(iem.cpu.rflags()) as u64;
    iem.write_rm(&rm, Width::W8, value)?;
    Ok(Next::Continue)
}

/// `0F C8..=CF`. The 16-bit form is undefined and clears the register.
pub(super) fn op_bswap(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.op_size();
    let index = iem.opcode_reg();
    let value = iem.read_reg(index, width);
    let swapped = match width {
        Width::W64 => value.swap_bytes(),
        Width::W32 => (value as u32).swap_bytes() as u64,
        _ => 0,
    };
    iem.write_reg(index, width, swapped);
    Ok(Next::Continue)
}

/// `50..=57`. `push rSP` stores the value from before the push.
pub(super) fn op_push_reg(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_default_64bit_op_size();
    let width = iem.op_size();
    let value = iem.read_reg(iem.opcode_reg(), width);
    iem.push(width, value)?;
    Ok(Next::Continue)
}

/// `58..=5F`.
pub(super) fn op_pop_reg(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_default_64bit_op_size();
    let width = iem.op_size();
    let value = iem.pop(width)?;
    iem.write_reg(iem.opcode_reg(), width, value);
    Ok(Next::Continue)
}

/// `68`/`6A`.
pub(super) fn op_push_imm(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_default_64bit_op_size();
    let width = iem.op_size();
    let value = if iem.opcode == 0x68 {
        iem.ctx.imm_z()?
    } else {
        width.truncate(iem.ctx.imm_sx8()?)
    };
    iem.push(width, value)?;
    Ok(Next::Continue)
}

fn sreg_for_opcode(opcode: u8) -> SegReg {
    match opcode {
        0x06 | 0x07 => SegReg::Es,
        0x0E => SegReg::Cs,
        0x16 | 0x17 => SegReg::Ss,
        0x1E | 0x1F => SegReg::Ds,
        0xA0 | 0xA1 => SegReg::Fs,
        _ => SegReg::Gs,
    }
}

/// `06`, `0E`, `16`, `1E`, `0F A0`, `0F A8`.
pub(super) fn op_push_sreg(iem: &mut Iem<'_, '_>) -> OpResult {
    if iem.opcode < 0x20 {
        iem.no_64bit()?;
    }
    iem.ctx.set_default_64bit_op_size();
    let width = iem.op_size();
    let selector = iem.cpu.segment(sreg_for_opcode(iem.opcode)).selector as u64;
    iem.push(width, selector)?;
    Ok(Next::Continue)
}

/// `07`, `17`, `1F`, `0F A1`, `0F A9`.
pub(super) fn op_pop_sreg(iem: &mut Iem<'_, '_>) -> OpResult {
    if iem.opcode < 0x20 {
        iem.no_64bit()?;
    }
    iem.ctx.set_default_64bit_op_size();
    let seg = sreg_for_opcode(iem.opcode);
    let op_size = iem.op_size();
    iem.defer(ComplexOp::PopSegment { seg, op_size })
}

/// `C9`: `leave`.
pub(super) fn op_leave(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_default_64bit_op_size();
    let width = iem.op_size();
    let frame = iem.stack_width().truncate(iem.cpu.gpr(gpr::RBP));
    let value = iem.read_mem(SegReg::Ss, frame, width)?;
    let rsp = iem
        .stack_width()
        .truncate(frame.wrapping_add(width.bytes() as u64));
    iem.set_stack_pointer(rsp);
    iem.write_reg(gpr::RBP, width, value);
    Ok(Next::Continue)
}
