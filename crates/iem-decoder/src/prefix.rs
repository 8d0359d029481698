//! Legacy and REX prefix accumulation.
//!
//! The caller runs an explicit loop: fetch a byte, hand it to [`accumulate`],
//! and stop once it reports [`PrefixScan::Opcode`]. The 15-byte cursor limit
//! bounds the loop.

use iem_types::{CpuMode, SegReg, Width};

use crate::context::{InsnContext, Prefixes, RexPolicy};

/// A recognized legacy prefix byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyPrefix {
    Segment(SegReg),
    OperandSize,
    AddressSize,
    Lock,
    Repnz,
    Repz,
}

/// Classifies a legacy prefix byte. REX bytes are not legacy prefixes.
pub const fn legacy_prefix(byte: u8) -> Option<LegacyPrefix> {
    match byte {
        0x26 => Some(LegacyPrefix::Segment(SegReg::Es)),
        0x2E => Some(LegacyPrefix::Segment(SegReg::Cs)),
        0x36 => Some(LegacyPrefix::Segment(SegReg::Ss)),
        0x3E => Some(LegacyPrefix::Segment(SegReg::Ds)),
        0x64 => Some(LegacyPrefix::Segment(SegReg::Fs)),
        0x65 => Some(LegacyPrefix::Segment(SegReg::Gs)),
        0x66 => Some(LegacyPrefix::OperandSize),
        0x67 => Some(LegacyPrefix::AddressSize),
        0xF0 => Some(LegacyPrefix::Lock),
        0xF2 => Some(LegacyPrefix::Repnz),
        0xF3 => Some(LegacyPrefix::Repz),
        _ => None,
    }
}

/// `0x40..=0x4F` is REX only in 64-bit mode; elsewhere it is `inc`/`dec`.
pub const fn is_rex(byte: u8, mode: CpuMode) -> bool {
    matches!(mode, CpuMode::Bits64) && byte & 0xF0 == 0x40
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixScan {
    /// The byte was a prefix; fetch the next one.
    Continue,
    /// The byte is the opcode.
    Opcode(u8),
}

/// Folds `byte` into `ctx` if it is a prefix.
pub fn accumulate(ctx: &mut InsnContext<'_>, byte: u8) -> PrefixScan {
    if let Some(prefix) = legacy_prefix(byte) {
        if ctx.has_rex() && ctx.rex_policy == RexPolicy::Architectural {
            ctx.clear_rex();
        }
        apply_legacy(ctx, prefix);
        return PrefixScan::Continue;
    }

    if is_rex(byte, ctx.mode) {
        apply_rex(ctx, byte);
        return PrefixScan::Continue;
    }

    PrefixScan::Opcode(byte)
}

fn apply_legacy(ctx: &mut InsnContext<'_>, prefix: LegacyPrefix) {
    match prefix {
        LegacyPrefix::Segment(seg) => {
            ctx.prefixes.remove(Prefixes::SEGMENTS);
            ctx.prefixes.insert(Prefixes::segment_flag(seg));
            ctx.seg_override = Some(seg);
        }
        LegacyPrefix::OperandSize => {
            ctx.prefixes.insert(Prefixes::OP_SIZE);
            ctx.recalc_op_size();
        }
        LegacyPrefix::AddressSize => {
            ctx.prefixes.insert(Prefixes::ADDR_SIZE);
            ctx.addr_size = match ctx.mode {
                CpuMode::Bits16 => Width::W32,
                CpuMode::Bits32 => Width::W16,
                CpuMode::Bits64 => Width::W32,
            };
        }
        LegacyPrefix::Lock => ctx.prefixes.insert(Prefixes::LOCK),
        LegacyPrefix::Repnz => {
            ctx.prefixes.remove(Prefixes::REPZ);
            ctx.prefixes.insert(Prefixes::REPNZ);
        }
        LegacyPrefix::Repz => {
            ctx.prefixes.remove(Prefixes::REPNZ);
            ctx.prefixes.insert(Prefixes::REPZ);
        }
    }
}

fn apply_rex(ctx: &mut InsnContext<'_>, byte: u8) {
    let mut bits = Prefixes::REX;
    if byte & 0x8 != 0 {
        bits |= Prefixes::REX_W;
    }
    if byte & 0x4 != 0 {
        bits |= Prefixes::REX_R;
    }
    if byte & 0x2 != 0 {
        bits |= Prefixes::REX_X;
    }
    if byte & 0x1 != 0 {
        bits |= Prefixes::REX_B;
    }

    match ctx.rex_policy {
        RexPolicy::Architectural => {
            ctx.prefixes.remove(Prefixes::REX_ALL);
            ctx.prefixes.insert(bits);
            ctx.rex_reg = (byte & 0x4) << 1;
            ctx.rex_index = (byte & 0x2) << 2;
            ctx.rex_base = (byte & 0x1) << 3;
        }
        RexPolicy::Sticky => {
            ctx.prefixes.insert(bits);
            ctx.rex_reg |= (byte & 0x4) << 1;
            ctx.rex_index |= (byte & 0x2) << 2;
            ctx.rex_base |= (byte & 0x1) << 3;
        }
    }
    ctx.recalc_op_size();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Rep;

    fn scan<'a>(mode: CpuMode, bytes: &'a [u8]) -> (InsnContext<'a>, Option<u8>) {
        let mut ctx = InsnContext::new(mode, bytes);
        let mut opcode = None;
        while let Ok(b) = ctx.next_u8() {
            if let PrefixScan::Opcode(op) = accumulate(&mut ctx, b) {
                opcode = Some(op);
                break;
            }
        }
        (ctx, opcode)
    }

    #[test]
    fn later_repeat_prefix_wins() {
        let (ctx, op) = scan(CpuMode::Bits32, &[0xF2, 0xF3, 0xA4]);
        assert_eq!(op, Some(0xA4));
        assert_eq!(ctx.rep(), Some(Rep::Repz));

        let (ctx, _) = scan(CpuMode::Bits32, &[0xF3, 0xF2, 0xA4]);
        assert_eq!(ctx.rep(), Some(Rep::Repnz));
    }

    #[test]
    fn segment_overrides_replace() {
        let (ctx, _) = scan(CpuMode::Bits32, &[0x26, 0x3E, 0x8B, 0x00]);
        assert_eq!(ctx.seg_override, Some(SegReg::Ds));
        assert_eq!(ctx.prefixes & Prefixes::SEGMENTS, Prefixes::SEG_DS);
    }

    #[test]
    fn address_size_override_per_mode() {
        assert_eq!(scan(CpuMode::Bits16, &[0x67, 0x90]).0.addr_size, Width::W32);
        assert_eq!(scan(CpuMode::Bits32, &[0x67, 0x90]).0.addr_size, Width::W16);
        assert_eq!(scan(CpuMode::Bits64, &[0x67, 0x90]).0.addr_size, Width::W32);
    }

    #[test]
    fn rex_is_opcode_outside_long_mode() {
        for b in 0x40..=0x4Fu8 {
            let bytes = [b];
            let (ctx, op) = scan(CpuMode::Bits32, &bytes);
            assert_eq!(op, Some(b));
            assert!(!ctx.has_rex());
        }
    }

    #[test]
    fn rex_fields() {
        let (ctx, op) = scan(CpuMode::Bits64, &[0x4D, 0x8B, 0xC0]);
        assert_eq!(op, Some(0x8B));
        assert_eq!((ctx.rex_reg, ctx.rex_index, ctx.rex_base), (8, 0, 8));
        assert_eq!(ctx.op_size, Width::W64);
    }

    #[test]
    fn last_rex_wins() {
        let (ctx, _) = scan(CpuMode::Bits64, &[0x48, 0x41, 0x8B, 0xC0]);
        assert!(!ctx.has(Prefixes::REX_W));
        assert_eq!(ctx.rex_base, 8);
        assert_eq!(ctx.op_size, Width::W32);
    }

    #[test]
    fn rex_dropped_by_following_legacy_prefix() {
        let (ctx, op) = scan(CpuMode::Bits64, &[0x48, 0x66, 0x8B, 0xC0]);
        assert_eq!(op, Some(0x8B));
        assert!(!ctx.has_rex());
        assert_eq!(ctx.op_size, Width::W16);
    }

    #[test]
    fn sticky_policy_keeps_rex() {
        let mut ctx = InsnContext::new(CpuMode::Bits64, &[]).with_rex_policy(RexPolicy::Sticky);
        for b in [0x48, 0x66, 0x41] {
            assert_eq!(accumulate(&mut ctx, b), PrefixScan::Continue);
        }
        assert!(ctx.has(Prefixes::REX_W));
        assert_eq!(ctx.rex_base, 8);
        assert_eq!(ctx.op_size, Width::W64);
    }
}
