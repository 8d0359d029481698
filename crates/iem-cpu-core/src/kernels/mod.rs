//! Arithmetic and logic kernels.
//!
//! Kernels are plain functions over a destination, source operand(s) and a
//! local RFLAGS copy. Handlers never call them by name: every family is a
//! static descriptor holding `[fn; 4]` tables indexed by [`Width::index`],
//! and locked entry points where the instruction accepts `LOCK`.
//!
//! A locked entry point runs while the broker holds the destination's
//! exclusion stripe, so it performs the same update as the normal one.

mod alu;
mod muldiv;
mod shift;

use iem_types::{Mnemonic, RFlags, Width};

use crate::exception::Exception;

pub use alu::{add_with_flags, logic_with_flags, sub_with_flags};

pub type BinaryFn = fn(dst: &mut u64, src: u64, flags: &mut RFlags);
pub type UnaryFn = fn(dst: &mut u64, flags: &mut RFlags);
pub type ShiftFn = fn(dst: &mut u64, count: u8, flags: &mut RFlags);
pub type MulDivFn =
    fn(lo: &mut u64, hi: &mut u64, src: u64, flags: &mut RFlags) -> Result<(), Exception>;
pub type XaddFn = fn(dst: &mut u64, reg: &mut u64, flags: &mut RFlags);
pub type CmpxchgFn = fn(dst: &mut u64, acc: &mut u64, src: u64, flags: &mut RFlags);

/// Two-operand kernel family (`dst = dst OP src`).
pub struct BinaryOpImpl {
    pub mnemonic: Mnemonic,
    pub normal: [BinaryFn; 4],
    /// `None` when the instruction cannot take a LOCK prefix.
    pub locked: Option<[BinaryFn; 4]>,
    /// `false` for compare/test style kernels that only produce flags.
    pub writes_dest: bool,
}

impl BinaryOpImpl {
    pub fn kernel(&self, width: Width, locked: bool) -> BinaryFn {
        match (&self.locked, locked) {
            (Some(table), true) => table[width.index()],
            _ => self.normal[width.index()],
        }
    }
}

pub struct UnaryOpImpl {
    pub mnemonic: Mnemonic,
    pub normal: [UnaryFn; 4],
    pub locked: Option<[UnaryFn; 4]>,
}

impl UnaryOpImpl {
    pub fn kernel(&self, width: Width, locked: bool) -> UnaryFn {
        match (&self.locked, locked) {
            (Some(table), true) => table[width.index()],
            _ => self.normal[width.index()],
        }
    }
}

pub struct ShiftOpImpl {
    pub mnemonic: Mnemonic,
    pub ops: [ShiftFn; 4],
}

pub struct MulDivOpImpl {
    pub mnemonic: Mnemonic,
    pub ops: [MulDivFn; 4],
}

macro_rules! widths {
    ($m:ident :: $f:ident) => {
        [$m::$f::<1>, $m::$f::<2>, $m::$f::<4>, $m::$f::<8>]
    };
}

macro_rules! binary_op {
    ($name:ident, $mnemonic:ident, $m:ident :: $f:ident, locked) => {
        pub static $name: BinaryOpImpl = BinaryOpImpl {
            mnemonic: Mnemonic::$mnemonic,
            normal: widths!($m::$f),
            locked: Some(widths!($m::$f)),
            writes_dest: true,
        };
    };
    ($name:ident, $mnemonic:ident, $m:ident :: $f:ident, unlocked) => {
        pub static $name: BinaryOpImpl = BinaryOpImpl {
            mnemonic: Mnemonic::$mnemonic,
            normal: widths!($m::$f),
            locked: None,
            writes_dest: true,
        };
    };
    ($name:ident, $mnemonic:ident, $m:ident :: $f:ident, flags_only) => {
        pub static $name: BinaryOpImpl = BinaryOpImpl {
            mnemonic: Mnemonic::$mnemonic,
            normal: widths!($m::$f),
            locked: None,
            writes_dest: false,
        };
    };
}

binary_op!(ADD, Add, alu::add, locked);
binary_op!(OR, Or, alu::or, locked);
binary_op!(ADC, Adc, alu::adc, locked);
binary_op!(SBB, Sbb, alu::sbb, locked);
binary_op!(AND, And, alu::and, locked);
binary_op!(SUB, Sub, alu::sub, locked);
binary_op!(XOR, Xor, alu::xor, locked);
binary_op!(CMP, Cmp, alu::cmp, flags_only);
binary_op!(TEST, Test, alu::test, flags_only);
binary_op!(IMUL2, Imul, alu::imul2, unlocked);
binary_op!(BT, Bt, alu::bt, flags_only);
binary_op!(BTS, Bts, alu::bts, locked);
binary_op!(BTR, Btr, alu::btr, locked);
binary_op!(BTC, Btc, alu::btc, locked);
binary_op!(BSF, Bsf, alu::bsf, unlocked);
binary_op!(BSR, Bsr, alu::bsr, unlocked);

/// Group 1 and the `00..=3D` binary opcodes, indexed by `ModRM.reg` or
/// `opcode >> 3`.
pub static BINARY_OPS: [&BinaryOpImpl; 8] = [&ADD, &OR, &ADC, &SBB, &AND, &SUB, &XOR, &CMP];

/// Group 8 (`0F BA`) `/4..=/7`, and `0F A3/AB/B3/BB` by `(opcode >> 3) & 3`.
pub static BIT_OPS: [&BinaryOpImpl; 4] = [&BT, &BTS, &BTR, &BTC];

macro_rules! unary_op {
    ($name:ident, $mnemonic:ident, $m:ident :: $f:ident) => {
        pub static $name: UnaryOpImpl = UnaryOpImpl {
            mnemonic: Mnemonic::$mnemonic,
            normal: widths!($m::$f),
            locked: Some(widths!($m::$f)),
        };
    };
}

unary_op!(INC, Inc, alu::inc);
unary_op!(DEC, Dec, alu::dec);
unary_op!(NOT, Not, alu::not);
unary_op!(NEG, Neg, alu::neg);

macro_rules! shift_op {
    ($name:ident, $mnemonic:ident, $m:ident :: $f:ident) => {
        pub static $name: ShiftOpImpl = ShiftOpImpl {
            mnemonic: Mnemonic::$mnemonic,
            ops: widths!($m::$f),
        };
    };
}

shift_op!(ROL, Rol, shift::rol);
shift_op!(ROR, Ror, shift::ror);
shift_op!(RCL, Rcl, shift::rcl);
shift_op!(RCR, Rcr, shift::rcr);
shift_op!(SHL, Shl, shift::shl);
shift_op!(SHR, Shr, shift::shr);
shift_op!(SAR, Sar, shift::sar);

/// Group 2 by `ModRM.reg`; `/6` is undefined.
pub static SHIFT_OPS: [Option<&ShiftOpImpl>; 8] = [
    Some(&ROL),
    Some(&ROR),
    Some(&RCL),
    Some(&RCR),
    Some(&SHL),
    Some(&SHR),
    None,
    Some(&SAR),
];

macro_rules! muldiv_op {
    ($name:ident, $mnemonic:ident, $m:ident :: $f:ident) => {
        pub static $name: MulDivOpImpl = MulDivOpImpl {
            mnemonic: Mnemonic::$mnemonic,
            ops: widths!($m::$f),
        };
    };
}

muldiv_op!(MUL, Mul, muldiv::mul);
muldiv_op!(IMUL, Imul, muldiv::imul);
muldiv_op!(DIV, Div, muldiv::div);
muldiv_op!(IDIV, Idiv, muldiv::idiv);

pub static XADD: [XaddFn; 4] = widths!(alu::xadd);
pub static CMPXCHG: [CmpxchgFn; 4] = widths!(alu::cmpxchg);
