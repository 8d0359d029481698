//! Flag instructions, control/debug register moves, groups 6 and 7 and the
//! remaining system instructions. Most are forwarded to the complex handler
//! with their operand decoded.

use iem_decoder::RmOperand;
use iem_types::{Mnemonic, RFlags, Width};

use super::{Iem, Next, OpResult};
use crate::complex::{ComplexOp, SystemOp};
use crate::exception::{Exception, Stop};

fn update_flags(iem: &mut Iem<'_, '_>, f: impl FnOnce(&mut RFlags)) -> OpResult {
    let mut flags = iem.cpu.rflags();
    f(&mut flags);
    iem.cpu.set_rflags(flags);
    Ok(Next::Continue)
}

/// `F5`.
pub(super) fn op_cmc(iem: &mut Iem<'_, '_>) -> OpResult {
    update_flags(iem, |f| f.toggle(RFlags::CF))
}

/// `F8`.
pub(super) fn op_clc(iem: &mut Iem<'_, '_>) -> OpResult {
    update_flags(iem, |f| f.remove(RFlags::CF))
}

/// `F9`.
pub(super) fn op_stc(iem: &mut Iem<'_, '_>) -> OpResult {
    update_flags(iem, |f| f.insert(RFlags::CF))
}

/// `FC`.
pub(super) fn op_cld(iem: &mut Iem<'_, '_>) -> OpResult {
    update_flags(iem, |f| f.remove(RFlags::DF))
}

/// `FD`.
pub(super) fn op_std(iem: &mut Iem<'_, '_>) -> OpResult {
    update_flags(iem, |f| f.insert(RFlags::DF))
}

/// `F4`, `FA`, `FB`: privilege checks live with the complex handler.
pub(super) fn op_hlt_cli_sti(iem: &mut Iem<'_, '_>) -> OpResult {
    let op = match iem.opcode {
        0xF4 => SystemOp::Hlt,
        0xFA => SystemOp::Cli,
        _ => SystemOp::Sti,
    };
    iem.defer(ComplexOp::System { op, operand: None })
}

/// `9C`/`9D`.
pub(super) fn op_pushf_popf(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_default_64bit_op_size();
    let op_size = iem.op_size();
    if iem.opcode == 0x9C {
        iem.defer(ComplexOp::Pushf { op_size })
    } else {
        iem.defer(ComplexOp::Popf { op_size })
    }
}

/// `60`/`61`.
pub(super) fn op_pusha_popa(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.no_64bit()?;
    let op_size = iem.op_size();
    if iem.opcode == 0x60 {
        iem.defer(ComplexOp::Pusha { op_size })
    } else {
        iem.defer(ComplexOp::Popa { op_size })
    }
}

/// `0F 20..=23`. The r/m field always names a register, whatever `mod` says.
pub(super) fn op_mov_cr_dr(iem: &mut Iem<'_, '_>) -> OpResult {
    iem.ctx.set_fixed_64bit_op_size();
    let modrm = iem.modrm()?;
    let gpr = modrm.rm() | iem.ctx.rex_base;
    let index = modrm.reg() | iem.ctx.rex_reg;
    let op = match iem.opcode {
        0x20 | 0x22 => {
            if !matches!(index, 0 | 2 | 3 | 4 | 8) {
                return Err(Exception::InvalidOpcode.into());
            }
            if iem.opcode == 0x20 {
                ComplexOp::MovFromCr { cr: index, gpr }
            } else {
                ComplexOp::MovToCr { cr: index, gpr }
            }
        }
        _ => {
            if index > 7 {
                return Err(Exception::InvalidOpcode.into());
            }
            if iem.opcode == 0x21 {
                ComplexOp::MovFromDr { dr: index, gpr }
            } else {
                ComplexOp::MovToDr { dr: index, gpr }
            }
        }
    };
    iem.defer(op)
}

/// Group 6 (`0F 00`) `/0..=/5`.
pub(super) fn op_grp6<const OP: usize>(iem: &mut Iem<'_, '_>) -> OpResult {
    let op = match OP {
        0 => SystemOp::Sldt,
        1 => SystemOp::Str,
        2 => SystemOp::Lldt,
        3 => SystemOp::Ltr,
        4 => SystemOp::Verr,
        _ => SystemOp::Verw,
    };
    let modrm = iem.modrm()?;
    let rm = iem.decode_rm(modrm)?;
    // sldt/str with a register destination store at the operand size.
    let width = match (OP, matches!(rm, RmOperand::Reg(_))) {
        (0 | 1, true) => iem.op_size(),
        _ => Width::W16,
    };
    let operand = Some(iem.operand(&rm, width));
    iem.defer(ComplexOp::System { op, operand })
}

/// Register forms of group 7, selected by `/reg` and `rm`.
fn grp7_register_form(reg: u8, rm: u8, long_mode: bool) -> Option<SystemOp> {
    Some(match (reg, rm) {
        (0, 1) => SystemOp::Vmcall,
        (0, 2) => SystemOp::Vmlaunch,
        (0, 3) => SystemOp::Vmresume,
        (0, 4) => SystemOp::Vmxoff,
        (1, 0) => SystemOp::Monitor,
        (1, 1) => SystemOp::Mwait,
        (2, 0) => SystemOp::Xgetbv,
        (2, 1) => SystemOp::Xsetbv,
        (4, _) => SystemOp::Smsw,
        (6, _) => SystemOp::Lmsw,
        (7, 0) if long_mode => SystemOp::Swapgs,
        (7, 1) => SystemOp::Rdtscp,
        _ => return None,
    })
}

/// Group 7 (`0F 01`). Memory forms take a descriptor-table or word operand;
/// register forms encode separate instructions in `rm`.
pub(super) fn op_grp7<const OP: usize>(iem: &mut Iem<'_, '_>) -> OpResult {
    let modrm = iem.modrm()?;
    if modrm.is_reg() {
        let op = grp7_register_form(modrm.reg(), modrm.rm(), iem.mode().is_64bit())
            .ok_or(Exception::InvalidOpcode)?;
        let operand = match op {
            SystemOp::Smsw => {
                let width = iem.op_size();
                let rm = iem.decode_rm(modrm)?;
                Some(iem.operand(&rm, width))
            }
            SystemOp::Lmsw => {
                let rm = iem.decode_rm(modrm)?;
                Some(iem.operand(&rm, Width::W16))
            }
            _ => None,
        };
        return iem.defer(ComplexOp::System { op, operand });
    }

    let (op, width) = match OP {
        0 => (SystemOp::Sgdt, iem.op_size()),
        1 => (SystemOp::Sidt, iem.op_size()),
        2 => (SystemOp::Lgdt, iem.op_size()),
        3 => (SystemOp::Lidt, iem.op_size()),
        4 => (SystemOp::Smsw, Width::W16),
        6 => (SystemOp::Lmsw, Width::W16),
        7 => (SystemOp::Invlpg, Width::W8),
        _ => return Err(Exception::InvalidOpcode.into()),
    };
    let rm = iem.decode_rm(modrm)?;
    let operand = Some(iem.operand(&rm, width));
    iem.defer(ComplexOp::System { op, operand })
}

/// Operand-less two-byte system instructions.
pub(super) fn op_system(iem: &mut Iem<'_, '_>) -> OpResult {
    let op = match iem.opcode {
        0x05 => SystemOp::Syscall,
        0x06 => SystemOp::Clts,
        0x07 => SystemOp::Sysret,
        0x08 => SystemOp::Invd,
        0x09 => SystemOp::Wbinvd,
        0x30 => SystemOp::Wrmsr,
        0x31 => SystemOp::Rdtsc,
        0x32 => SystemOp::Rdmsr,
        0x33 => SystemOp::Rdpmc,
        0x34 => SystemOp::Sysenter,
        0x35 => SystemOp::Sysexit,
        0xA2 => SystemOp::Cpuid,
        0xAA => SystemOp::Rsm,
        _ => return Err(Exception::InvalidOpcode.into()),
    };
    iem.defer(ComplexOp::System { op, operand: None })
}

/// `0F 0B`.
pub(super) fn op_ud2(_iem: &mut Iem<'_, '_>) -> OpResult {
    Err(Exception::InvalidOpcode.into())
}

/// `0F 0D` and `0F 18..=1F`: prefetch and hint NOPs. The memory operand is
/// decoded but never accessed.
pub(super) fn op_nop_ev(iem: &mut Iem<'_, '_>) -> OpResult {
    let modrm = iem.modrm()?;
    iem.decode_rm(modrm)?;
    Ok(Next::Continue)
}

/// `C4`/`C5`: `les`/`lds` outside long mode with a memory operand, VEX
/// otherwise.
pub(super) fn op_les_lds_vex(iem: &mut Iem<'_, '_>) -> OpResult {
    let modrm_is_reg = iem.ctx.peek_u8().map(|b| b >> 6 == 3).unwrap_or(false);
    if iem.mode().is_64bit() || modrm_is_reg {
        return Err(Stop::NotImplemented(Mnemonic::Vex));
    }
    let mnemonic = if iem.opcode == 0xC4 {
        Mnemonic::Les
    } else {
        Mnemonic::Lds
    };
    Err(Stop::NotImplemented(mnemonic))
}
