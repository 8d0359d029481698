//! Group 2 shift and rotate kernels.
//!
//! Counts are masked to 5 bits (6 for 64-bit operands). A masked count of
//! zero leaves both the operand and the flags untouched.

use iem_types::RFlags;

use super::alu::{mask_for_size, set_szp, sign_bit, sx};

fn masked_count<const N: usize>(count: u8) -> u32 {
    let mask = if N == 8 { 0x3F } else { 0x1F };
    (count & mask) as u32
}

fn msb<const N: usize>(value: u64) -> bool {
    value & sign_bit(N) != 0
}

pub(super) fn rol<const N: usize>(dst: &mut u64, count: u8, fl: &mut RFlags) {
    let count = masked_count::<N>(count);
    if count == 0 {
        return;
    }
    let bits = (N * 8) as u32;
    let v = *dst & mask_for_size(N);
    let r = count % bits;
    let result = if r == 0 {
        v
    } else {
        ((v << r) | (v >> (bits - r))) & mask_for_size(N)
    };
    let cf = result & 1 != 0;
    fl.set(RFlags::CF, cf);
    fl.set(RFlags::OF, msb::<N>(result) != cf);
    *dst = result;
}

pub(super) fn ror<const N: usize>(dst: &mut u64, count: u8, fl: &mut RFlags) {
    let count = masked_count::<N>(count);
    if count == 0 {
        return;
    }
    let bits = (N * 8) as u32;
    let v = *dst & mask_for_size(N);
    let r = count % bits;
    let result = if r == 0 {
        v
    } else {
        ((v >> r) | (v << (bits - r))) & mask_for_size(N)
    };
    let top = msb::<N>(result);
    let next = result & (sign_bit(N) >> 1) != 0;
    fl.set(RFlags::CF, top);
    fl.set(RFlags::OF, top != next);
    *dst = result;
}

pub(super) fn rcl<const N: usize>(dst: &mut u64, count: u8, fl: &mut RFlags) {
    let count = masked_count::<N>(count);
    if count == 0 {
        return;
    }
    let bits = (N * 8) as u32;
    let mask = mask_for_size(N);
    let mut v = *dst & mask;
    let mut cf = fl.contains(RFlags::CF);
    for _ in 0..count % (bits + 1) {
        let out = msb::<N>(v);
        v = ((v << 1) | cf as u64) & mask;
        cf = out;
    }
    fl.set(RFlags::CF, cf);
    fl.set(RFlags::OF, msb::<N>(v) != cf);
    *dst = v;
}

pub(super) fn rcr<const N: usize>(dst: &mut u64, count: u8, fl: &mut RFlags) {
    let count = masked_count::<N>(count);
    if count == 0 {
        return;
    }
    let bits = (N * 8) as u32;
    let mask = mask_for_size(N);
    let mut v = *dst & mask;
    let mut cf = fl.contains(RFlags::CF);
    for _ in 0..count % (bits + 1) {
        let out = v & 1 != 0;
        v = (v >> 1) | ((cf as u64) << (bits - 1));
        cf = out;
    }
    fl.set(RFlags::CF, cf);
    fl.set(
        RFlags::OF,
        msb::<N>(v) != (v & (sign_bit(N) >> 1) != 0),
    );
    *dst = v;
}

pub(super) fn shl<const N: usize>(dst: &mut u64, count: u8, fl: &mut RFlags) {
    let count = masked_count::<N>(count);
    if count == 0 {
        return;
    }
    let bits = (N * 8) as u32;
    let v = *dst & mask_for_size(N);
    let wide = (v as u128) << count;
    let result = wide as u64 & mask_for_size(N);
    let cf = (wide >> bits) & 1 != 0;
    fl.set(RFlags::CF, cf);
    fl.set(RFlags::OF, msb::<N>(result) != cf);
    set_szp(fl, result, N);
    *dst = result;
}

pub(super) fn shr<const N: usize>(dst: &mut u64, count: u8, fl: &mut RFlags) {
    let count = masked_count::<N>(count);
    if count == 0 {
        return;
    }
    let v = *dst & mask_for_size(N);
    let result = v >> count;
    fl.set(RFlags::CF, (v >> (count - 1)) & 1 != 0);
    fl.set(RFlags::OF, msb::<N>(v));
    set_szp(fl, result, N);
    *dst = result;
}

pub(super) fn sar<const N: usize>(dst: &mut u64, count: u8, fl: &mut RFlags) {
    let count = masked_count::<N>(count);
    if count == 0 {
        return;
    }
    let v = sx(*dst, N);
    let result = (v >> count) as u64 & mask_for_size(N);
    fl.set(RFlags::CF, (v >> (count - 1)) & 1 != 0);
    fl.remove(RFlags::OF);
    set_szp(fl, result, N);
    *dst = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shl_carry_out_and_overflow() {
        let mut fl = RFlags::empty();
        let mut v = 0x81;
        shl::<1>(&mut v, 1, &mut fl);
        assert_eq!(v, 0x02);
        assert!(fl.contains(RFlags::CF | RFlags::OF));
    }

    #[test]
    fn zero_count_keeps_flags() {
        let mut fl = RFlags::ZF | RFlags::CF;
        let mut v = 0x1234;
        shr::<2>(&mut v, 0x20, &mut fl);
        assert_eq!(v, 0x1234);
        assert_eq!(fl, RFlags::ZF | RFlags::CF);
    }

    #[test]
    fn sar_keeps_sign() {
        let mut fl = RFlags::empty();
        let mut v = 0x8000_0001;
        sar::<4>(&mut v, 1, &mut fl);
        assert_eq!(v, 0xC000_0000);
        assert!(fl.contains(RFlags::CF | RFlags::SF));
    }

    #[test]
    fn rotates() {
        let mut fl = RFlags::empty();
        let mut v = 0x80;
        rol::<1>(&mut v, 1, &mut fl);
        assert_eq!(v, 0x01);
        assert!(fl.contains(RFlags::CF));

        let mut v = 0x01;
        ror::<1>(&mut v, 1, &mut fl);
        assert_eq!(v, 0x80);
        assert!(fl.contains(RFlags::CF));

        let mut fl = RFlags::CF;
        let mut v = 0x00;
        rcl::<1>(&mut v, 1, &mut fl);
        assert_eq!(v, 0x01);
        assert!(!fl.contains(RFlags::CF));

        let mut fl = RFlags::CF;
        let mut v = 0x01;
        rcr::<1>(&mut v, 1, &mut fl);
        assert_eq!(v, 0x80);
        assert!(fl.contains(RFlags::CF));
    }

    #[test]
    fn sixty_four_bit_shift_uses_six_bit_count() {
        let mut fl = RFlags::empty();
        let mut v = 1u64;
        shl::<8>(&mut v, 63, &mut fl);
        assert_eq!(v, 1 << 63);
    }
}
