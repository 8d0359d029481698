//! Integer arithmetic, logic, shift, multiply/divide and bit instructions.

use iem_decoder::{Rep, RmOperand};
use iem_types::{gpr, RFlags, Width};

use super::{Iem, Next, OpResult};
use crate::exception::{Exception, Stop};
use crate::kernels::{
    BinaryOpImpl, MulDivOpImpl, ShiftOpImpl, UnaryOpImpl, BINARY_OPS, BIT_OPS, BSF, BSR, CMPXCHG,
    DEC, DIV, IDIV, IMUL, IMUL2, INC, MUL, NEG, NOT, SHIFT_OPS, TEST, XADD,
};
use crate::mem::Access;

impl Iem<'_, '_> {
    /// `op r/m, src` with the destination named by `rm`.
    fn binary_to_rm(
        &mut self,
        op: &BinaryOpImpl,
        rm: RmOperand,
        width: Width,
        src: u64,
    ) -> OpResult {
        match rm {
            RmOperand::Reg(index) => {
                let mut dst = self.read_reg(index, width);
                let mut flags = self.cpu.rflags();
                (op.kernel(width, false))(&mut dst, src, &mut flags);
                if op.writes_dest {
                    self.write_reg(index, width, dst);
                }
                self.cpu.set_rflags(flags);
            }
            RmOperand::Mem(form) => {
                let access = if op.writes_dest {
                    Access::ReadWrite
                } else {
                    Access::Read
                };
                let locked = self.ctx.has_lock();
                let mut mem = self.map(&form, width, access)?;
                let mut dst = mem.value();
                let mut flags = self.cpu.rflags();
                (op.kernel(width, locked))(&mut dst, src, &mut flags);
                mem.set_value(dst);
                self.commit(mem)?;
                self.cpu.set_rflags(flags);
            }
        }
        Ok(Next::Continue)
    }

    /// `Eb,Gb` / `Ev,Gv`.
    fn binary_rm_reg(&mut self, op: &BinaryOpImpl, width: Width) -> OpResult {
        let modrm = self.modrm_lockable()?;
        let rm = self.decode_rm(modrm)?;
        let src = self.read_reg(self.reg_index(modrm), width);
        self.binary_to_rm(op, rm, width, src)
    }

    /// `Gb,Eb` / `Gv,Ev`.
    fn binary_reg_rm(&mut self, op: &BinaryOpImpl, width: Width) -> OpResult {
        let modrm = self.modrm()?;
        let rm = self.decode_rm(modrm)?;
        let src = self.read_rm(&rm, width)?;
        let reg = self.reg_index(modrm);
        let mut dst = self.read_reg(reg, width);
        let mut flags = self.cpu.rflags();
        (op.kernel(width, false))(&mut dst, src, &mut flags);
        if op.writes_dest {
            self.write_reg(reg, width, dst);
        }
        self.cpu.set_rflags(flags);
        Ok(Next::Continue)
    }

    /// `AL,Ib` / `rAX,Iz`.
    fn binary_acc_imm(&mut self, op: &BinaryOpImpl, width: Width) -> OpResult {
        let src = match width {
            Width::W8 => self.ctx.next_u8()? as u64,
            _ => self.ctx.imm_z()?,
        };
        self.binary_to_rm(op, RmOperand::Reg(gpr::RAX), width, src)
    }

    fn unary_rm(&mut self, op: &UnaryOpImpl, rm: RmOperand, width: Width) -> OpResult {
        match rm {
            RmOperand::Reg(index) => {
                let mut dst = self.read_reg(index, width);
                let mut flags = self.cpu.rflags();
                (op.kernel(width, false))(&mut dst, &mut flags);
                self.write_reg(index, width, dst);
                self.cpu.set_rflags(flags);
            }
            RmOperand::Mem(form) => {
                let locked = self.ctx.has_lock();
                let mut mem = self.map(&form, width, Access::ReadWrite)?;
                let mut dst = mem.value();
                let mut flags = self.cpu.rflags();
                (op.kernel(width, locked))(&mut dst, &mut flags);
                mem.set_value(dst);
                self.commit(mem)?;
                self.cpu.set_rflags(flags);
            }
        }
        Ok(Next::Continue)
    }

    fn unary_modrm(&mut self, op: &UnaryOpImpl, width: Width) -> OpResult {
        let modrm = self.modrm_lockable()?;
        let rm = self.decode_rm(modrm)?;
        self.unary_rm(op, rm, width)
    }

    fn shift_rm(&mut self, op: &ShiftOpImpl) -> OpResult {
        let width = self.byte_or_op_size();
        let modrm = self.modrm()?;
        let rm = self.decode_rm(modrm)?;
        let count = match self.opcode {
            0xC0 | 0xC1 => self.ctx.next_u8()?,
            0xD0 | 0xD1 => 1,
            _ => self.read_reg(gpr::RCX, Width::W8) as u8,
        };
        let kernel = op.ops[width.index()];
        match rm {
            RmOperand::Reg(index) => {
                let mut dst = self.read_reg(index, width);
                let mut flags = self.cpu.rflags();
                kernel(&mut dst, count, &mut flags);
                self.write_reg(index, width, dst);
                self.cpu.set_rflags(flags);
            }
            RmOperand::Mem(form) => {
                let mut mem = self.map(&form, width, Access::ReadWrite)?;
                let mut dst = mem.value();
                let mut flags = self.cpu.rflags();
                kernel(&mut dst, count, &mut flags);
                mem.set_value(dst);
                self.commit(mem)?;
                self.cpu.set_rflags(flags);
            }
        }
        Ok(Next::Continue)
    }

    fn muldiv_rm(&mut self, op: &MulDivOpImpl) -> OpResult {
        let width = self.byte_or_op_size();
        let modrm = self.modrm()?;
        let rm = self.decode_rm(modrm)?;
        let src = self.read_rm(&rm, width)?;
        let kernel = op.ops[width.index()];
        let mut flags = self.cpu.rflags();
        if width == Width::W8 {
            let mut ax = self.read_reg(gpr::RAX, Width::W16);
            let mut unused = 0;
            kernel(&mut ax, &mut unused, src, &mut flags)?;
            self.write_reg(gpr::RAX, Width::W16, ax);
        } else {
            let mut lo = self.read_reg(gpr::RAX, width);
            let mut hi = self.read_reg(gpr::RDX, width);
            kernel(&mut lo, &mut hi, src, &mut flags)?;
            self.write_reg(gpr::RAX, width, lo);
            self.write_reg(gpr::RDX, width, hi);
        }
        self.cpu.set_rflags(flags);
        Ok(Next::Continue)
    }
}

// 00..=3D: the eight binary operations in their six shapes, indexed by
// `opcode >> 3`.

pub(super) fn op_eb_gb<const OP: usize>(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.binary_rm_reg(BINARY_OPS[OP], Width::W8)
}

pub(super) fn op_ev_gv<const OP: usize>(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.op_size();
    iem.binary_rm_reg(BINARY_OPS[OP], width)
}

pub(super) fn op_gb_eb<const OP: usize>(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.binary_reg_rm(BINARY_OPS[OP], Width::W8)
}

pub(super) fn op_gv_ev<const OP: usize>(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.op_size();
    iem.binary_reg_rm(BINARY_OPS[OP], width)
}

pub(super) fn op_al_ib<const OP: usize>(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.binary_acc_imm(BINARY_OPS[OP], Width::W8)
}

pub(super) fn op_rax_iz<const OP: usize>(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.op_size();
    iem.binary_acc_imm(BINARY_OPS[OP], width)
}

/// Group 1 (`80`, `81`, `83`), sub-op by `ModRM.reg`.
pub(super) fn op_grp1<const OP: usize>(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = match iem.opcode {
        0x80 | 0x82 => Width::W8,
        _ => iem.op_size(),
    };
    let modrm = iem.modrm_lockable()?;
    let rm = iem.decode_rm(modrm)?;
    let imm = match iem.opcode {
        0x81 => iem.ctx.imm_z()?,
        0x83 => width.truncate(iem.ctx.imm_sx8()?),
        _ => iem.ctx.next_u8()? as u64,
    };
    iem.binary_to_rm(BINARY_OPS[OP], rm, width, imm)
}

/// `82`: alias of `80` outside long mode.
pub(super) fn op_grp1_82<const OP: usize>(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.no_64bit()?;
    op_grp1::<OP>(iem)
}

/// `84`/`85`.
pub(super) fn op_test_e_g(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.byte_or_op_size();
    iem.binary_rm_reg(&TEST, width)
}

/// `A8`/`A9`.
pub(super) fn op_test_acc_imm(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.byte_or_op_size();
    iem.binary_acc_imm(&TEST, width)
}

/// `40..=47` outside long mode.
pub(super) fn op_inc_reg(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.op_size();
    let index = iem.opcode & 7;
    iem.unary_rm(&INC, RmOperand::Reg(index), width)
}

/// `48..=4F` outside long mode.
pub(super) fn op_dec_reg(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.op_size();
    let index = iem.opcode & 7;
    iem.unary_rm(&DEC, RmOperand::Reg(index), width)
}

/// Group 2 (`C0`, `C1`, `D0..=D3`); `/6` never reaches here.
pub(super) fn op_grp2<const OP: usize>(iem: &mut Iem<'_, '_>) -> OpResult {
    match SHIFT_OPS[OP] {
        Some(op) => iem.shift_rm(op),
        None => Err(Exception::InvalidOpcode.into()),
    }
}

/// Group 3 `/0`: `test Eb,Ib` / `test Ev,Iz`.
pub(super) fn op_grp3_test(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.byte_or_op_size();
    let modrm = iem.modrm()?;
    let rm = iem.decode_rm(modrm)?;
    let imm = match width {
        Width::W8 => iem.ctx.next_u8()? as u64,
        _ => iem.ctx.imm_z()?,
    };
    iem.binary_to_rm(&TEST, rm, width, imm)
}

pub(super) fn op_grp3_not(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.byte_or_op_size();
    iem.unary_modrm(&NOT, width)
}

pub(super) fn op_grp3_neg(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.byte_or_op_size();
    iem.unary_modrm(&NEG, width)
}

/// Group 3 `/4..=/7`.
pub(super) fn op_grp3_muldiv<const OP: usize>(iem: &mut Iem<'_, '_>) -> OpResult {
    let op = match OP {
        4 => &MUL,
        5 => &IMUL,
        6 => &DIV,
        _ => &IDIV,
    };
    iem.muldiv_rm(op)
}

/// Group 4 `/0` and group 5 `/0`.
pub(super) fn op_inc_rm(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.byte_or_op_size();
    iem.unary_modrm(&INC, width)
}

/// Group 4 `/1` and group 5 `/1`.
pub(super) fn op_dec_rm(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.byte_or_op_size();
    iem.unary_modrm(&DEC, width)
}

/// `0F AF`: `imul Gv,Ev`.
pub(super) fn op_imul_gv_ev(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.op_size();
    iem.binary_reg_rm(&IMUL2, width)
}

/// `69`/`6B`: `imul Gv,Ev,Iz` / `imul Gv,Ev,Ib`.
pub(super) fn op_imul_gv_ev_imm(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.op_size();
    let modrm = iem.modrm()?;
    let rm = iem.decode_rm(modrm)?;
    let imm = if iem.opcode == 0x69 {
        iem.ctx.imm_z()?
    } else {
        iem.ctx.imm_sx8()?
    };
    let mut dst = iem.read_rm(&rm, width)?;
    let mut flags = iem.cpu.rflags();
    (IMUL2.kernel(width, false))(&mut dst, imm, &mut flags);
    iem.write_reg(iem.reg_index(modrm), width, dst);
    iem.cpu.set_rflags(flags);
    Ok(Next::Continue)
}

/// `0F A3/AB/B3/BB`: bit test with a register bit offset. A memory operand
/// is addressed relative to the signed bit offset.
pub(super) fn op_bt_ev_gv(iem: &mut Iem<'_, '_>) -> OpResult {
    let op = BIT_OPS[((iem.opcode >> 3) & 3) as usize];
    let width = iem.op_size();
    let modrm = iem.modrm_lockable()?;
    let rm = iem.decode_rm(modrm)?;
    let bit = iem.read_reg(iem.reg_index(modrm), width);
    let form = match rm {
        RmOperand::Reg(_) => return iem.binary_to_rm(op, rm, width, bit),
        RmOperand::Mem(form) => form,
    };

    let units = (width.sign_extend(bit) as i64) >> width.bits().trailing_zeros();
    let disp = units.wrapping_mul(width.bytes() as i64) as u64;
    let offset = form
        .addr_size
        .truncate(iem.effective_address(&form).wrapping_add(disp));
    let bit = bit & (width.bits() as u64 - 1);

    let access = if op.writes_dest {
        Access::ReadWrite
    } else {
        Access::Read
    };
    let locked = iem.ctx.has_lock();
    let mut mem = iem.map_at(form.seg, offset, width, access)?;
    let mut dst = mem.value();
    let mut flags = iem.cpu.rflags();
    (op.kernel(width, locked))(&mut dst, bit, &mut flags);
    mem.set_value(dst);
    iem.commit(mem)?;
    iem.cpu.set_rflags(flags);
    Ok(Next::Continue)
}

/// Group 8 (`0F BA`) `/4..=/7`: bit test with an immediate bit offset.
pub(super) fn op_grp8<const OP: usize>(iem: &mut Iem<'_, '_>) -> OpResult {
    let op = BIT_OPS[OP - 4];
    let width = iem.op_size();
    let modrm = iem.modrm_lockable()?;
    let rm = iem.decode_rm(modrm)?;
    let bit = iem.ctx.next_u8()? as u64;
    iem.binary_to_rm(op, rm, width, bit)
}

/// `0F BC`/`0F BD`. With `F3` these are `tzcnt`/`lzcnt`, which are not
/// modelled.
pub(super) fn op_bsf_bsr(iem: &mut Iem<'_, '_>) -> OpResult {
    let op = if iem.opcode == 0xBC { &BSF } else { &BSR };
    if iem.ctx.rep() == Some(Rep::Repz) {
        return Err(Stop::NotImplemented(op.mnemonic));
    }
    let width = iem.op_size();
    iem.binary_reg_rm(op, width)
}

/// `0F C0`/`0F C1`.
pub(super) fn op_xadd(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.byte_or_op_size();
    let modrm = iem.modrm_lockable()?;
    let rm = iem.decode_rm(modrm)?;
    let reg = iem.reg_index(modrm);
    let mut src = iem.read_reg(reg, width);
    let kernel = XADD[width.index()];
    let mut flags = iem.cpu.rflags();
    match rm {
        RmOperand::Reg(index) => {
            let mut dst = iem.read_reg(index, width);
            kernel(&mut dst, &mut src, &mut flags);
            iem.write_reg(reg, width, src);
            iem.write_reg(index, width, dst);
        }
        RmOperand::Mem(form) => {
            let mut mem = iem.map(&form, width, Access::ReadWrite)?;
            let mut dst = mem.value();
            kernel(&mut dst, &mut src, &mut flags);
            mem.set_value(dst);
            iem.commit(mem)?;
            iem.write_reg(reg, width, src);
        }
    }
    iem.cpu.set_rflags(flags);
    Ok(Next::Continue)
}

/// `0F B0`/`0F B1`.
pub(super) fn op_cmpxchg(iem: &mut Iem<'_, '_>) -> OpResult {
    let width = iem.byte_or_op_size();
    let modrm = iem.modrm_lockable()?;
    let rm = iem.decode_rm(modrm)?;
    let src = iem.read_reg(iem.reg_index(modrm), width);
    let mut acc = iem.read_reg(gpr::RAX, width);
    let kernel = CMPXCHG[width.index()];
    let mut flags = iem.cpu.rflags();
    match rm {
        RmOperand::Reg(index) => {
            let mut dst = iem.read_reg(index, width);
            kernel(&mut dst, &mut acc, src, &mut flags);
            if flags.contains(RFlags::ZF) {
                iem.write_reg(index, width, dst);
            } else {
                iem.write_reg(gpr::RAX, width, acc);
            }
        }
        RmOperand::Mem(form) => {
            let mut mem = iem.map(&form, width, Access::ReadWrite)?;
            let mut dst = mem.value();
            kernel(&mut dst, &mut acc, src, &mut flags);
            mem.set_value(dst);
            iem.commit(mem)?;
            if !flags.contains(RFlags::ZF) {
                iem.write_reg(gpr::RAX, width, acc);
            }
        }
    }
    iem.cpu.set_rflags(flags);
    Ok(Next::Continue)
}
