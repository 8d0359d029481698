use iem_types::{SegReg, Width};

/// A fully resolved instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveOperand {
    Reg {
        index: u8,
        width: Width,
    },
    /// `offset` is the segment-relative effective address; the broker adds
    /// the segment base and checks the limit.
    Mem {
        seg: SegReg,
        offset: u64,
        width: Width,
    },
    Imm {
        value: u64,
        width: Width,
    },
}

impl EffectiveOperand {
    pub fn width(&self) -> Width {
        match *self {
            EffectiveOperand::Reg { width, .. }
            | EffectiveOperand::Mem { width, .. }
            | EffectiveOperand::Imm { width, .. } => width,
        }
    }
}
