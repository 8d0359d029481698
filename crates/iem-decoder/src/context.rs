use bitflags::bitflags;
use iem_types::{CpuMode, SegReg, Width};

use crate::cursor::{ByteCursor, DecodeError};

bitflags! {
    /// Prefix state accumulated ahead of the opcode byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Prefixes: u32 {
        const SEG_ES = 1 << 0;
        const SEG_CS = 1 << 1;
        const SEG_SS = 1 << 2;
        const SEG_DS = 1 << 3;
        const SEG_FS = 1 << 4;
        const SEG_GS = 1 << 5;
        const OP_SIZE = 1 << 6;
        const ADDR_SIZE = 1 << 7;
        const REPZ = 1 << 8;
        const REPNZ = 1 << 9;
        const LOCK = 1 << 10;
        const REX = 1 << 11;
        const REX_W = 1 << 12;
        const REX_R = 1 << 13;
        const REX_X = 1 << 14;
        const REX_B = 1 << 15;

        const SEGMENTS = Self::SEG_ES.bits()
            | Self::SEG_CS.bits()
            | Self::SEG_SS.bits()
            | Self::SEG_DS.bits()
            | Self::SEG_FS.bits()
            | Self::SEG_GS.bits();
        const REX_ALL = Self::REX.bits()
            | Self::REX_W.bits()
            | Self::REX_R.bits()
            | Self::REX_X.bits()
            | Self::REX_B.bits();
    }
}

impl Prefixes {
    pub const fn segment_flag(seg: SegReg) -> Prefixes {
        match seg {
            SegReg::Es => Prefixes::SEG_ES,
            SegReg::Cs => Prefixes::SEG_CS,
            SegReg::Ss => Prefixes::SEG_SS,
            SegReg::Ds => Prefixes::SEG_DS,
            SegReg::Fs => Prefixes::SEG_FS,
            SegReg::Gs => Prefixes::SEG_GS,
        }
    }
}

/// What happens to REX state when a legacy prefix follows a REX byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RexPolicy {
    /// The REX byte is dropped; only a REX immediately before the opcode counts.
    #[default]
    Architectural,
    /// REX bits survive later legacy prefixes and accumulate across REX bytes.
    Sticky,
}

/// Effective repeat prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rep {
    /// `F3`: REP / REPE / REPZ.
    Repz,
    /// `F2`: REPNE / REPNZ.
    Repnz,
}

/// Per-instruction decode state: prefixes, effective sizes, REX extension
/// fields and the cursor into the instruction bytes.
///
/// Created fresh for every instruction; only the prefix accumulator and the
/// opcode handlers mutate it.
#[derive(Debug, Clone)]
pub struct InsnContext<'a> {
    pub mode: CpuMode,
    pub prefixes: Prefixes,
    pub seg_override: Option<SegReg>,
    pub op_size: Width,
    pub addr_size: Width,
    /// `REX.R << 3`, OR-ed into `ModRM.reg`.
    pub rex_reg: u8,
    /// `REX.X << 3`, OR-ed into `SIB.index`.
    pub rex_index: u8,
    /// `REX.B << 3`, OR-ed into `ModRM.rm`, `SIB.base` or the opcode register.
    pub rex_base: u8,
    pub rex_policy: RexPolicy,
    cursor: ByteCursor<'a>,
}

impl<'a> InsnContext<'a> {
    pub fn new(mode: CpuMode, bytes: &'a [u8]) -> Self {
        Self {
            mode,
            prefixes: Prefixes::empty(),
            seg_override: None,
            op_size: mode.default_operand_size(),
            addr_size: mode.default_address_size(),
            rex_reg: 0,
            rex_index: 0,
            rex_base: 0,
            rex_policy: RexPolicy::default(),
            cursor: ByteCursor::new(bytes),
        }
    }

    pub fn with_rex_policy(mut self, policy: RexPolicy) -> Self {
        self.rex_policy = policy;
        self
    }

    /// Bytes consumed so far, i.e. the instruction length once decoding is done.
    pub fn len(&self) -> usize {
        self.cursor.position()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cursor(&mut self) -> &mut ByteCursor<'a> {
        &mut self.cursor
    }

    pub fn next_u8(&mut self) -> Result<u8, DecodeError> {
        self.cursor.next_u8()
    }

    pub fn peek_u8(&self) -> Result<u8, DecodeError> {
        self.cursor.peek_u8()
    }

    pub fn next_u16(&mut self) -> Result<u16, DecodeError> {
        self.cursor.next_u16()
    }

    pub fn next_u32(&mut self) -> Result<u32, DecodeError> {
        self.cursor.next_u32()
    }

    /// `Ib` sign-extended to 64 bits.
    pub fn imm_sx8(&mut self) -> Result<u64, DecodeError> {
        self.cursor.next_i8_sx()
    }

    /// `Iz`: 16 or 32 bits following the operand size, sign-extended for
    /// 64-bit operands.
    pub fn imm_z(&mut self) -> Result<u64, DecodeError> {
        match self.op_size {
            Width::W16 => Ok(self.cursor.next_u16()? as u64),
            Width::W32 => Ok(self.cursor.next_u32()? as u64),
            _ => self.cursor.next_i32_sx(),
        }
    }

    /// An immediate of exactly `width` (zero-extended).
    pub fn imm(&mut self, width: Width) -> Result<u64, DecodeError> {
        self.cursor.next_sized(width)
    }

    pub fn has(&self, flag: Prefixes) -> bool {
        self.prefixes.intersects(flag)
    }

    pub fn has_lock(&self) -> bool {
        self.prefixes.contains(Prefixes::LOCK)
    }

    pub fn has_rex(&self) -> bool {
        self.prefixes.contains(Prefixes::REX)
    }

    pub fn rep(&self) -> Option<Rep> {
        if self.prefixes.contains(Prefixes::REPZ) {
            Some(Rep::Repz)
        } else if self.prefixes.contains(Prefixes::REPNZ) {
            Some(Rep::Repnz)
        } else {
            None
        }
    }

    /// The override segment if one is active, else `default`.
    pub fn segment_or(&self, default: SegReg) -> SegReg {
        self.seg_override.unwrap_or(default)
    }

    /// Recomputes the operand size from the mode default, the `66` prefix and
    /// `REX.W`, in that order of precedence.
    pub fn recalc_op_size(&mut self) {
        self.op_size = match self.mode {
            CpuMode::Bits16 if self.has(Prefixes::OP_SIZE) => Width::W32,
            CpuMode::Bits16 => Width::W16,
            CpuMode::Bits32 if self.has(Prefixes::OP_SIZE) => Width::W16,
            CpuMode::Bits32 => Width::W32,
            CpuMode::Bits64 if self.has(Prefixes::REX_W) => Width::W64,
            CpuMode::Bits64 if self.has(Prefixes::OP_SIZE) => Width::W16,
            CpuMode::Bits64 => Width::W32,
        };
    }

    /// For instructions whose operand size defaults to 64 bits in long mode
    /// (stack operations, `loop`): `66` still selects 16 bits.
    pub fn set_default_64bit_op_size(&mut self) {
        if self.mode == CpuMode::Bits64 {
            self.op_size = if !self.has(Prefixes::REX_W) && self.has(Prefixes::OP_SIZE) {
                Width::W16
            } else {
                Width::W64
            };
        }
    }

    /// Near branches in long mode: the operand size is 64 bits and `66` is
    /// ignored, as on Intel parts.
    pub fn set_branch_op_size(&mut self) {
        if self.mode == CpuMode::Bits64 {
            self.op_size = Width::W64;
        } else {
            self.set_default_64bit_op_size();
        }
    }

    /// For instructions that always use 64-bit operands in long mode
    /// (`mov` to/from control registers).
    pub fn set_fixed_64bit_op_size(&mut self) {
        if self.mode == CpuMode::Bits64 {
            self.op_size = Width::W64;
        }
    }

    pub(crate) fn clear_rex(&mut self) {
        self.prefixes.remove(Prefixes::REX_ALL);
        self.rex_reg = 0;
        self.rex_index = 0;
        self.rex_base = 0;
        self.recalc_op_size();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operand_size_precedence_in_long_mode() {
        let mut ctx = InsnContext::new(CpuMode::Bits64, &[]);
        assert_eq!(ctx.op_size, Width::W32);
        ctx.prefixes |= Prefixes::OP_SIZE;
        ctx.recalc_op_size();
        assert_eq!(ctx.op_size, Width::W16);
        ctx.prefixes |= Prefixes::REX | Prefixes::REX_W;
        ctx.recalc_op_size();
        assert_eq!(ctx.op_size, Width::W64);
    }

    #[test]
    fn default_64bit_operand_size() {
        let mut ctx = InsnContext::new(CpuMode::Bits64, &[]);
        ctx.set_default_64bit_op_size();
        assert_eq!(ctx.op_size, Width::W64);

        let mut ctx = InsnContext::new(CpuMode::Bits64, &[]);
        ctx.prefixes |= Prefixes::OP_SIZE;
        ctx.set_default_64bit_op_size();
        assert_eq!(ctx.op_size, Width::W16);

        let mut ctx = InsnContext::new(CpuMode::Bits32, &[]);
        ctx.set_default_64bit_op_size();
        assert_eq!(ctx.op_size, Width::W32);
    }

    #[test]
    fn near_branches_ignore_operand_size_prefix_in_long_mode() {
        let mut ctx = InsnContext::new(CpuMode::Bits64, &[]);
        ctx.prefixes |= Prefixes::OP_SIZE;
        ctx.set_branch_op_size();
        assert_eq!(ctx.op_size, Width::W64);

        let mut ctx = InsnContext::new(CpuMode::Bits32, &[]);
        ctx.prefixes |= Prefixes::OP_SIZE;
        ctx.recalc_op_size();
        ctx.set_branch_op_size();
        assert_eq!(ctx.op_size, Width::W16);
    }

    #[test]
    fn iz_immediate_is_sign_extended_for_64bit_operands() {
        let mut ctx = InsnContext::new(CpuMode::Bits64, &[0x00, 0x00, 0x00, 0x80]);
        ctx.op_size = Width::W64;
        assert_eq!(ctx.imm_z(), Ok(0xFFFF_FFFF_8000_0000));
    }
}
