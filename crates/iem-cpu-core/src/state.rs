//! Architectural register state consumed by the engine.

use iem_types::{CpuMode, RFlags, SegReg, Width};

pub use iem_types::gpr;

/// Hidden part of a segment register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub selector: u16,
    pub base: u64,
    pub limit: u32,
}

impl Segment {
    pub const fn flat() -> Self {
        Self {
            selector: 0,
            base: 0,
            limit: u32::MAX,
        }
    }

    pub const fn real(selector: u16) -> Self {
        Self {
            selector,
            base: (selector as u64) << 4,
            limit: 0xFFFF,
        }
    }
}

/// General purpose registers, RIP, RFLAGS, segment caches and the code
/// bitness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuState {
    gpr: [u64; 16],
    rip: u64,
    rflags: RFlags,
    segments: [Segment; 6],
    pub mode: CpuMode,
}

impl CpuState {
    /// Flat segments (limit 4G; 64K in 16-bit mode) with all registers zeroed.
    pub fn new(mode: CpuMode) -> Self {
        let seg = match mode {
            CpuMode::Bits16 => Segment::real(0),
            CpuMode::Bits32 | CpuMode::Bits64 => Segment::flat(),
        };
        Self {
            gpr: [0; 16],
            rip: 0,
            rflags: RFlags::RESERVED1,
            segments: [seg; 6],
            mode,
        }
    }

    pub fn gpr(&self, index: u8) -> u64 {
        self.gpr[(index & 0xF) as usize]
    }

    pub fn set_gpr(&mut self, index: u8, value: u64) {
        self.gpr[(index & 0xF) as usize] = value;
    }

    /// Reads a register operand of `width`.
    ///
    /// Without a REX prefix, byte registers 4..=7 are AH/CH/DH/BH.
    pub fn read_gpr(&self, index: u8, width: Width, rex: bool) -> u64 {
        match width {
            Width::W8 if !rex && (4..8).contains(&index) => (self.gpr(index - 4) >> 8) & 0xFF,
            _ => width.truncate(self.gpr(index)),
        }
    }

    /// Writes a register operand of `width`.
    ///
    /// 8- and 16-bit writes preserve the untouched bits; 32-bit writes
    /// zero-extend into the full register.
    pub fn write_gpr(&mut self, index: u8, width: Width, rex: bool, value: u64) {
        match width {
            Width::W8 if !rex && (4..8).contains(&index) => {
                let reg = &mut self.gpr[(index - 4) as usize];
                *reg = (*reg & !0xFF00) | ((value & 0xFF) << 8);
            }
            Width::W8 | Width::W16 => {
                let mask = width.mask();
                let reg = &mut self.gpr[(index & 0xF) as usize];
                *reg = (*reg & !mask) | (value & mask);
            }
            Width::W32 => self.set_gpr(index, value & 0xFFFF_FFFF),
            Width::W64 => self.set_gpr(index, value),
        }
    }

    pub fn rip(&self) -> u64 {
        self.rip
    }

    pub fn set_rip(&mut self, rip: u64) {
        self.rip = rip;
    }

    pub fn rflags(&self) -> RFlags {
        self.rflags
    }

    /// Bit 1 of RFLAGS always reads as one.
    pub fn set_rflags(&mut self, flags: RFlags) {
        self.rflags = flags | RFlags::RESERVED1;
    }

    pub fn segment(&self, seg: SegReg) -> Segment {
        self.segments[seg.index()]
    }

    pub fn set_segment(&mut self, seg: SegReg, value: Segment) {
        self.segments[seg.index()] = value;
    }
}
