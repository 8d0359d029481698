//! Near and far control transfers, loops and software interrupts.

use iem_types::{gpr, Cond, RFlags, Width};

use super::{Iem, Next, OpResult};
use crate::complex::ComplexOp;
use crate::exception::Stop;

impl Iem<'_, '_> {
    /// `Jz`: a 16- or 32-bit relative displacement, sign-extended.
    fn rel_z(&mut self) -> Result<u64, Stop> {
        match self.op_size() {
            Width::W16 => Ok(Width::W16.sign_extend(self.ctx.next_u16()? as u64)),
            _ => Ok(self.ctx.cursor().next_i32_sx()?),
        }
    }

    fn cond_branch(&self, cond: Cond, disp: u64) -> OpResult {
        if cond.eval(self.cpu.rflags()) {
            self.branch_rel(disp)
        } else {
            Ok(Next::Continue)
        }
    }

    /// Far pointer operand (`Mp`): offset first, then the 16-bit selector.
    fn far_pointer(&mut self) -> Result<(u16, u64), Stop> {
        let width = self.op_size();
        let modrm = self.modrm()?;
        let form = self.decode_mem(modrm)?;
        let offset = self.effective_address(&form);
        let target = self.read_mem(form.seg, offset, width)?;
        let selector_at = form
            .addr_size
            .truncate(offset.wrapping_add(width.bytes() as u64));
        let selector = self.read_mem(form.seg, selector_at, Width::W16)? as u16;
        Ok((selector, target))
    }

    /// `Ap`: immediate offset then selector.
    fn far_immediate(&mut self) -> Result<(u16, u64), Stop> {
        let width = self.op_size();
        let offset = self.ctx.imm(width)?;
        let selector = self.ctx.next_u16()?;
        Ok((selector, offset))
    }
}

/// `70..=7F`.
pub(super) fn op_jcc_rel8(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_branch_op_size();
    let disp = iem.ctx.imm_sx8()?;
    iem.cond_branch(Cond::from_low_nibble(iem.opcode), disp)
}

/// `0F 80..=8F`.
pub(super) fn op_jcc_relz(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_branch_op_size();
    let disp = iem.rel_z()?;
    iem.cond_branch(Cond::from_low_nibble(iem.opcode), disp)
}

/// `EB`.
pub(super) fn op_jmp_rel8(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_branch_op_size();
    let disp = iem.ctx.imm_sx8()?;
    iem.branch_rel(disp)
}

/// `E9`.
pub(super) fn op_jmp_relz(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_branch_op_size();
    let disp = iem.rel_z()?;
    iem.branch_rel(disp)
}

/// `E8`.
pub(super) fn op_call_relz(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_branch_op_size();
    let width = iem.op_size();
    let disp = iem.rel_z()?;
    let next = iem.branch_rel(disp)?;
    let ret = iem.next_rip();
    iem.push(width, ret)?;
    Ok(next)
}

/// `C2`/`C3`.
pub(super) fn op_ret_near(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_branch_op_size();
    let width = iem.op_size();
    let release = if iem.opcode == 0xC2 {
        iem.ctx.next_u16()? as u64
    } else {
        0
    };
    let (target, rsp) = iem.peek_stack(width)?;
    let rsp = iem.stack_width().truncate(rsp.wrapping_add(release));
    iem.set_stack_pointer(rsp);
    Ok(Next::Jump(width.truncate(target)))
}

/// `E0..=E3`: `loopne`, `loope`, `loop` and `jcxz`. The counter width is the
/// address size.
pub(super) fn op_loop(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_default_64bit_op_size();
    let disp = iem.ctx.imm_sx8()?;
    let counter = iem.ctx.addr_size;
    let rcx = iem.cpu.read_gpr(gpr::RCX, counter, true);
    let zf = iem.cpu.rflags().contains(RFlags::ZF);

    if iem.opcode == 0xE3 {
        return if rcx == 0 {
            iem.branch_rel(disp)
        } else {
            Ok(Next::Continue)
        };
    }

    let rcx = counter.truncate(rcx.wrapping_sub(1));
    iem.cpu.write_gpr(gpr::RCX, counter, true, rcx);
    let taken = rcx != 0
        && match iem.opcode {
            0xE0 => !zf,
            0xE1 => zf,
            _ => true,
        };
    if taken {
        iem.branch_rel(disp)
    } else {
        Ok(Next::Continue)
    }
}

/// Group 5 `/2`.
pub(super) fn op_call_ev(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_branch_op_size();
    let width = iem.op_size();
    let modrm = iem.modrm()?;
    let rm = iem.decode_rm(modrm)?;
    let target = iem.read_rm(&rm, width)?;
    let ret = iem.next_rip();
    iem.push(width, ret)?;
    Ok(Next::Jump(target))
}

/// Group 5 `/4`.
pub(super) fn op_jmp_ev(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_branch_op_size();
    let width = iem.op_size();
    let modrm = iem.modrm()?;
    let rm = iem.decode_rm(modrm)?;
    let target = iem.read_rm(&rm, width)?;
    Ok(Next::Jump(target))
}

/// Group 5 `/6`.
pub(super) fn op_push_ev(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_default_64bit_op_size();
    let width = iem.op_size();
    let modrm = iem.modrm()?;
    let rm = iem.decode_rm(modrm)?;
    let value = iem.read_rm(&rm, width)?;
    iem.push(width, value)?;
    Ok(Next::Continue)
}

/// Group 5 `/3`.
pub(super) fn op_call_mp(iem: &mut Iem<'_, '_>) -> OpResult {
    let (selector, offset) = iem.far_pointer()?;
    let op_size = iem.op_size();
    iem.defer(ComplexOp::FarCall {
        selector,
        offset,
        op_size,
    })
}

/// Group 5 `/5`.
pub(super) fn op_jmp_mp(iem: &mut Iem<'_, '_>) -> OpResult {
    let (selector, offset) = iem.far_pointer()?;
    let op_size = iem.op_size();
    iem.defer(ComplexOp::FarJmp {
        selector,
        offset,
        op_size,
    })
}

/// `9A`.
pub(super) fn op_call_ap(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.no_64bit()?;
    let (selector, offset) = iem.far_immediate()?;
    let op_size = iem.op_size();
    iem.defer(ComplexOp::FarCall {
        selector,
        offset,
        op_size,
    })
}

/// `EA`.
pub(super) fn op_jmp_ap(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.no_64bit()?;
    let (selector, offset) = iem.far_immediate()?;
    let op_size = iem.op_size();
    iem.defer(ComplexOp::FarJmp {
        selector,
        offset,
        op_size,
    })
}

/// `CA`/`CB`.
pub(super) fn op_ret_far(iem: &mut Iem<'_, '_>) -> OpResult {
    let pop = if iem.opcode == 0xCA {
        iem.ctx.next_u16()?
    } else {
        0
    };
    let op_size = iem.op_size();
    iem.defer(ComplexOp::FarRet { op_size, pop })
}

/// `CC`.
pub(super) fn op_int3(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.defer(ComplexOp::Int3)
}

/// `CD`.
pub(super) fn op_int(iem: &mut Iem<'_, '_>) -> OpResult {
    let vector = iem.ctx.next_u8()?;
    iem.defer(ComplexOp::Int { vector })
}

/// `CE`.
pub(super) fn op_into(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.no_64bit()?;
    iem.defer(ComplexOp::Into)
}

/// `CF`.
pub(super) fn op_iret(iem: &mut Iem<'_, '_>) -> OpResult {
    let op_size = iem.op_size();
    iem.defer(ComplexOp::Iret { op_size })
}
