//! Shared vocabulary for the instruction decoder and the execution engine.
//!
//! Nothing in here touches guest state; these are plain value types:
//! - [`Width`]: operand/address widths (8/16/32/64-bit)
//! - [`CpuMode`]: the code-segment bitness instructions are decoded under
//! - [`SegReg`] and the [`gpr`] index constants
//! - [`RFlags`] and the sixteen [`Cond`] condition codes
//! - [`Mnemonic`]: a stable tag per instruction family

mod mnemonic;

pub use mnemonic::Mnemonic;

use bitflags::bitflags;

/// Operand or address width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
}

impl Width {
    pub const ALL: [Width; 4] = [Width::W8, Width::W16, Width::W32, Width::W64];

    pub const fn bytes(self) -> usize {
        match self {
            Width::W8 => 1,
            Width::W16 => 2,
            Width::W32 => 4,
            Width::W64 => 8,
        }
    }

    pub const fn bits(self) -> u32 {
        (self.bytes() * 8) as u32
    }

    /// Position of this width in width-indexed kernel tables.
    pub const fn index(self) -> usize {
        match self {
            Width::W8 => 0,
            Width::W16 => 1,
            Width::W32 => 2,
            Width::W64 => 3,
        }
    }

    pub const fn from_bytes(bytes: usize) -> Option<Width> {
        match bytes {
            1 => Some(Width::W8),
            2 => Some(Width::W16),
            4 => Some(Width::W32),
            8 => Some(Width::W64),
            _ => None,
        }
    }

    pub const fn mask(self) -> u64 {
        match self {
            Width::W64 => u64::MAX,
            _ => (1u64 << self.bits()) - 1,
        }
    }

    pub const fn sign_bit(self) -> u64 {
        1u64 << (self.bits() - 1)
    }

    pub const fn truncate(self, value: u64) -> u64 {
        value & self.mask()
    }

    /// Sign-extends the low `self.bits()` bits of `value` to 64 bits.
    pub const fn sign_extend(self, value: u64) -> u64 {
        let shift = 64 - self.bits();
        (((value << shift) as i64) >> shift) as u64
    }
}

/// Bitness of the code segment the instruction stream is decoded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuMode {
    /// Real mode or a 16-bit protected-mode code segment.
    Bits16,
    /// 32-bit protected mode or compatibility mode with `CS.D = 1`.
    Bits32,
    /// Long mode with `CS.L = 1`.
    Bits64,
}

impl CpuMode {
    pub const fn default_operand_size(self) -> Width {
        match self {
            CpuMode::Bits16 => Width::W16,
            CpuMode::Bits32 | CpuMode::Bits64 => Width::W32,
        }
    }

    pub const fn default_address_size(self) -> Width {
        match self {
            CpuMode::Bits16 => Width::W16,
            CpuMode::Bits32 => Width::W32,
            CpuMode::Bits64 => Width::W64,
        }
    }

    /// Width of the instruction pointer (and of the stack pointer used for
    /// implicit stack operations).
    pub const fn ip_width(self) -> Width {
        self.default_address_size()
    }

    pub const fn is_64bit(self) -> bool {
        matches!(self, CpuMode::Bits64)
    }
}

/// Segment registers in their architectural encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SegReg {
    Es = 0,
    Cs = 1,
    Ss = 2,
    Ds = 3,
    Fs = 4,
    Gs = 5,
}

impl SegReg {
    pub const ALL: [SegReg; 6] = [
        SegReg::Es,
        SegReg::Cs,
        SegReg::Ss,
        SegReg::Ds,
        SegReg::Fs,
        SegReg::Gs,
    ];

    /// Decodes the `Sreg` field of a ModRM byte. Values 6 and 7 are reserved.
    pub const fn from_index(index: u8) -> Option<SegReg> {
        match index {
            0 => Some(SegReg::Es),
            1 => Some(SegReg::Cs),
            2 => Some(SegReg::Ss),
            3 => Some(SegReg::Ds),
            4 => Some(SegReg::Fs),
            5 => Some(SegReg::Gs),
            _ => None,
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// General purpose register indices (ModRM/REX numbering).
pub mod gpr {
    pub const RAX: u8 = 0;
    pub const RCX: u8 = 1;
    pub const RDX: u8 = 2;
    pub const RBX: u8 = 3;
    pub const RSP: u8 = 4;
    pub const RBP: u8 = 5;
    pub const RSI: u8 = 6;
    pub const RDI: u8 = 7;
    pub const R8: u8 = 8;
    pub const R9: u8 = 9;
    pub const R10: u8 = 10;
    pub const R11: u8 = 11;
    pub const R12: u8 = 12;
    pub const R13: u8 = 13;
    pub const R14: u8 = 14;
    pub const R15: u8 = 15;
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RFlags: u64 {
        const CF = 1 << 0;
        const RESERVED1 = 1 << 1;
        const PF = 1 << 2;
        const AF = 1 << 4;
        const ZF = 1 << 6;
        const SF = 1 << 7;
        const TF = 1 << 8;
        const IF = 1 << 9;
        const DF = 1 << 10;
        const OF = 1 << 11;
        const IOPL = 0b11 << 12;
        const NT = 1 << 14;
        const RF = 1 << 16;
        const VM = 1 << 17;
        const AC = 1 << 18;
        const VIF = 1 << 19;
        const VIP = 1 << 20;
        const ID = 1 << 21;

        /// Arithmetic status flags written by ALU kernels.
        const STATUS = Self::CF.bits()
            | Self::PF.bits()
            | Self::AF.bits()
            | Self::ZF.bits()
            | Self::SF.bits()
            | Self::OF.bits();
    }
}

/// x86 condition codes, in `Jcc`/`SETcc`/`CMOVcc` low-nibble order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    O,
    No,
    B,
    Ae,
    E,
    Ne,
    Be,
    A,
    S,
    Ns,
    P,
    Np,
    L,
    Ge,
    Le,
    G,
}

impl Cond {
    pub const fn from_low_nibble(opcode: u8) -> Cond {
        match opcode & 0xF {
            0x0 => Cond::O,
            0x1 => Cond::No,
            0x2 => Cond::B,
            0x3 => Cond::Ae,
            0x4 => Cond::E,
            0x5 => Cond::Ne,
            0x6 => Cond::Be,
            0x7 => Cond::A,
            0x8 => Cond::S,
            0x9 => Cond::Ns,
            0xA => Cond::P,
            0xB => Cond::Np,
            0xC => Cond::L,
            0xD => Cond::Ge,
            0xE => Cond::Le,
            _ => Cond::G,
        }
    }

    pub fn eval(self, flags: RFlags) -> bool {
        let cf = flags.contains(RFlags::CF);
        let zf = flags.contains(RFlags::ZF);
        let sf = flags.contains(RFlags::SF);
        let of = flags.contains(RFlags::OF);
        let pf = flags.contains(RFlags::PF);
        match self {
            Cond::O => of,
            Cond::No => !of,
            Cond::B => cf,
            Cond::Ae => !cf,
            Cond::E => zf,
            Cond::Ne => !zf,
            Cond::Be => cf || zf,
            Cond::A => !cf && !zf,
            Cond::S => sf,
            Cond::Ns => !sf,
            Cond::P => pf,
            Cond::Np => !pf,
            Cond::L => sf != of,
            Cond::Ge => sf == of,
            Cond::Le => zf || sf != of,
            Cond::G => !zf && sf == of,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_sign_extension() {
        assert_eq!(Width::W8.sign_extend(0x80), 0xFFFF_FFFF_FFFF_FF80);
        assert_eq!(Width::W16.sign_extend(0x7FFF), 0x7FFF);
        assert_eq!(Width::W32.sign_extend(0xFFFF_FFFE), u64::MAX - 1);
        assert_eq!(Width::W64.sign_extend(5), 5);
    }

    #[test]
    fn width_index_matches_table_order() {
        for (i, w) in Width::ALL.iter().enumerate() {
            assert_eq!(w.index(), i);
            assert_eq!(Width::from_bytes(w.bytes()), Some(*w));
        }
    }

    #[test]
    fn signed_conditions() {
        let lt = RFlags::SF;
        assert!(Cond::L.eval(lt));
        assert!(!Cond::Ge.eval(lt));
        assert!(Cond::Le.eval(RFlags::ZF));
        assert!(Cond::G.eval(RFlags::SF | RFlags::OF));
        assert_eq!(Cond::from_low_nibble(0x74), Cond::E);
        assert_eq!(Cond::from_low_nibble(0x8F), Cond::G);
    }
}
