//! ModRM/SIB decoding.
//!
//! [`decode_rm`] consumes the SIB and displacement bytes that follow a ModRM
//! byte and produces either a register index or an [`AddrForm`]. The form is
//! turned into an effective address later, once the whole instruction has been
//! consumed, because RIP-relative operands are relative to the *next*
//! instruction.

use iem_types::{gpr, CpuMode, SegReg, Width};

use crate::context::InsnContext;
use crate::cursor::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRm(pub u8);

impl ModRm {
    pub const MOD_INDIRECT: u8 = 0;
    pub const MOD_DISP8: u8 = 1;
    pub const MOD_DISP32: u8 = 2;
    pub const MOD_DIRECT: u8 = 3;

    pub const RM_SIB: u8 = 4;
    pub const RM_DISP32: u8 = 5;

    pub const fn md(self) -> u8 {
        self.0 >> 6
    }

    pub const fn reg(self) -> u8 {
        (self.0 >> 3) & 7
    }

    pub const fn rm(self) -> u8 {
        self.0 & 7
    }

    pub const fn is_reg(self) -> bool {
        self.md() == Self::MOD_DIRECT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sib(pub u8);

impl Sib {
    pub const fn scale(self) -> u8 {
        self.0 >> 6
    }

    pub const fn index(self) -> u8 {
        (self.0 >> 3) & 7
    }

    pub const fn base(self) -> u8 {
        self.0 & 7
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrBase {
    None,
    Gpr(u8),
    /// RIP-relative (64-bit mode `mod = 0, rm = 5`).
    Rip,
}

/// A decoded memory addressing form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrForm {
    pub base: AddrBase,
    pub index: Option<u8>,
    /// Index shift count (0..=3).
    pub scale: u8,
    pub disp: i64,
    /// Segment after applying any override prefix.
    pub seg: SegReg,
    pub addr_size: Width,
}

impl AddrForm {
    /// Segment-relative effective address.
    ///
    /// `gpr` reads a full 64-bit register; `next_ip` is the address of the
    /// following instruction.
    pub fn effective_address(&self, gpr: impl Fn(u8) -> u64, next_ip: u64) -> u64 {
        let mut ea = match self.base {
            AddrBase::None => 0,
            AddrBase::Gpr(r) => gpr(r),
            AddrBase::Rip => next_ip,
        };
        if let Some(index) = self.index {
            ea = ea.wrapping_add(gpr(index) << self.scale);
        }
        self.addr_size.truncate(ea.wrapping_add(self.disp as u64))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RmOperand {
    /// Register index (already extended with `REX.B`).
    Reg(u8),
    Mem(AddrForm),
}

/// Decodes the r/m operand of `modrm`, consuming any SIB and displacement
/// bytes from `ctx`.
pub fn decode_rm(ctx: &mut InsnContext<'_>, modrm: ModRm) -> Result<RmOperand, DecodeError> {
    if modrm.is_reg() {
        return Ok(RmOperand::Reg(modrm.rm() | ctx.rex_base));
    }

    let form = if ctx.addr_size == Width::W16 {
        decode_mem16(ctx, modrm)?
    } else {
        decode_mem32_64(ctx, modrm)?
    };
    Ok(RmOperand::Mem(form))
}

fn decode_mem16(ctx: &mut InsnContext<'_>, modrm: ModRm) -> Result<AddrForm, DecodeError> {
    use gpr::{RBP, RBX, RDI, RSI};

    let (base, index) = match modrm.rm() {
        0 => (AddrBase::Gpr(RBX), Some(RSI)),
        1 => (AddrBase::Gpr(RBX), Some(RDI)),
        2 => (AddrBase::Gpr(RBP), Some(RSI)),
        3 => (AddrBase::Gpr(RBP), Some(RDI)),
        4 => (AddrBase::Gpr(RSI), None),
        5 => (AddrBase::Gpr(RDI), None),
        6 if modrm.md() == ModRm::MOD_INDIRECT => (AddrBase::None, None),
        6 => (AddrBase::Gpr(RBP), None),
        _ => (AddrBase::Gpr(RBX), None),
    };

    let disp = match modrm.md() {
        ModRm::MOD_INDIRECT if base == AddrBase::None => ctx.next_u16()? as i16 as i64,
        ModRm::MOD_INDIRECT => 0,
        ModRm::MOD_DISP8 => ctx.next_u8()? as i8 as i64,
        _ => ctx.next_u16()? as i16 as i64,
    };

    let default_seg = if base == AddrBase::Gpr(RBP) {
        SegReg::Ss
    } else {
        SegReg::Ds
    };

    Ok(AddrForm {
        base,
        index,
        scale: 0,
        disp,
        seg: ctx.segment_or(default_seg),
        addr_size: Width::W16,
    })
}

fn decode_mem32_64(ctx: &mut InsnContext<'_>, modrm: ModRm) -> Result<AddrForm, DecodeError> {
    let md = modrm.md();
    let mut index = None;
    let mut scale = 0;
    let mut disp32 = false;

    let base = if modrm.rm() == ModRm::RM_SIB {
        let sib = Sib(ctx.next_u8()?);
        let idx = sib.index() | ctx.rex_index;
        if idx != gpr::RSP {
            index = Some(idx);
            scale = sib.scale();
        }
        if sib.base() == ModRm::RM_DISP32 && md == ModRm::MOD_INDIRECT {
            disp32 = true;
            AddrBase::None
        } else {
            AddrBase::Gpr(sib.base() | ctx.rex_base)
        }
    } else if modrm.rm() == ModRm::RM_DISP32 && md == ModRm::MOD_INDIRECT {
        disp32 = true;
        if ctx.mode == CpuMode::Bits64 {
            AddrBase::Rip
        } else {
            AddrBase::None
        }
    } else {
        AddrBase::Gpr(modrm.rm() | ctx.rex_base)
    };

    let disp = match md {
        ModRm::MOD_DISP8 => ctx.next_u8()? as i8 as i64,
        ModRm::MOD_DISP32 => ctx.next_u32()? as i32 as i64,
        _ if disp32 => ctx.next_u32()? as i32 as i64,
        _ => 0,
    };

    let default_seg = match base {
        AddrBase::Gpr(gpr::RSP) | AddrBase::Gpr(gpr::RBP) => SegReg::Ss,
        _ => SegReg::Ds,
    };

    Ok(AddrForm {
        base,
        index,
        scale,
        disp,
        seg: ctx.segment_or(default_seg),
        addr_size: ctx.addr_size,
    })
}
