use iem_types::RFlags;

pub(crate) fn mask_for_size(size: usize) -> u64 {
    let bits = (size * 8) as u32;
    if bits == 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

pub(crate) fn sign_bit(size: usize) -> u64 {
    1u64 << ((size * 8) as u32 - 1)
}

/// Sign-extends the low `size` bytes of `value`.
pub(crate) fn sx(value: u64, size: usize) -> i64 {
    let shift = 64 - (size * 8) as u32;
    ((value << shift) as i64) >> shift
}

fn parity(byte: u8) -> bool {
    byte.count_ones() % 2 == 0
}

/// Sets ZF/SF/PF from `result`.
pub(crate) fn set_szp(rflags: &mut RFlags, result: u64, size: usize) {
    rflags.set(RFlags::ZF, result == 0);
    rflags.set(RFlags::SF, (result & sign_bit(size)) != 0);
    rflags.set(RFlags::PF, parity(result as u8));
}

pub fn sub_with_flags(
    rflags: &mut RFlags,
    dest: u64,
    src: u64,
    borrow_in: bool,
    size: usize,
) -> u64 {
    let mask = mask_for_size(size);
    let dest = dest & mask;
    let src = src & mask;
    let borrow = borrow_in as u64;
    let subtrahend = (src as u128) + (borrow as u128);
    let result = (dest as u128).wrapping_sub(subtrahend) as u64 & mask;

    let sb = sign_bit(size);
    rflags.set(RFlags::CF, (dest as u128) < subtrahend);
    rflags.set(RFlags::OF, ((dest ^ src) & (dest ^ result) & sb) != 0);
    rflags.set(RFlags::AF, ((dest ^ src ^ result) & 0x10) != 0);
    set_szp(rflags, result, size);

    result
}

pub fn add_with_flags(
    rflags: &mut RFlags,
    dest: u64,
    src: u64,
    carry_in: bool,
    size: usize,
) -> u64 {
    let mask = mask_for_size(size);
    let dest = dest & mask;
    let src = src & mask;
    let full = (dest as u128) + (src as u128) + (carry_in as u128);
    let result = (full as u64) & mask;

    let sb = sign_bit(size);
    rflags.set(RFlags::CF, full > mask as u128);
    rflags.set(RFlags::OF, ((dest ^ result) & (src ^ result) & sb) != 0);
    rflags.set(RFlags::AF, ((dest ^ src ^ result) & 0x10) != 0);
    set_szp(rflags, result, size);

    result
}

pub fn logic_with_flags(rflags: &mut RFlags, result: u64, size: usize) -> u64 {
    let result = result & mask_for_size(size);
    rflags.remove(RFlags::CF | RFlags::OF | RFlags::AF);
    set_szp(rflags, result, size);
    result
}

pub(super) fn add<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    *dst = add_with_flags(fl, *dst, src, false, N);
}

pub(super) fn or<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    *dst = logic_with_flags(fl, *dst | src, N);
}

pub(super) fn adc<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    let carry = fl.contains(RFlags::CF);
    *dst = add_with_flags(fl, *dst, src, carry, N);
}

pub(super) fn sbb<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    let borrow = fl.contains(RFlags::CF);
    *dst = sub_with_flags(fl, *dst, src, borrow, N);
}

pub(super) fn and<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    *dst = logic_with_flags(fl, *dst & src, N);
}

pub(super) fn sub<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    *dst = sub_with_flags(fl, *dst, src, false, N);
}

pub(super) fn xor<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    *dst = logic_with_flags(fl, *dst ^ src, N);
}

pub(super) fn cmp<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    sub_with_flags(fl, *dst, src, false, N);
}

pub(super) fn test<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    logic_with_flags(fl, *dst & src, N);
}

pub(super) fn inc<const N: usize>(dst: &mut u64, fl: &mut RFlags) {
    let cf = fl.contains(RFlags::CF);
    *dst = add_with_flags(fl, *dst, 1, false, N);
    fl.set(RFlags::CF, cf);
}

pub(super) fn dec<const N: usize>(dst: &mut u64, fl: &mut RFlags) {
    let cf = fl.contains(RFlags::CF);
    *dst = sub_with_flags(fl, *dst, 1, false, N);
    fl.set(RFlags::CF, cf);
}

pub(super) fn not<const N: usize>(dst: &mut u64, _fl: &mut RFlags) {
    *dst = !*dst & mask_for_size(N);
}

pub(super) fn neg<const N: usize>(dst: &mut u64, fl: &mut RFlags) {
    *dst = sub_with_flags(fl, 0, *dst, false, N);
}

/// Truncating signed multiply for `imul r, r/m[, imm]`.
pub(super) fn imul2<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    let product = sx(*dst, N) as i128 * sx(src, N) as i128;
    let result = product as u64 & mask_for_size(N);
    let overflow = sx(result, N) as i128 != product;
    fl.set(RFlags::CF, overflow);
    fl.set(RFlags::OF, overflow);
    set_szp(fl, result, N);
    *dst = result;
}

fn bit_index<const N: usize>(src: u64) -> u64 {
    src & (N as u64 * 8 - 1)
}

pub(super) fn bt<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    fl.set(RFlags::CF, (*dst >> bit_index::<N>(src)) & 1 != 0);
}

pub(super) fn bts<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    bt::<N>(dst, src, fl);
    *dst |= 1 << bit_index::<N>(src);
}

pub(super) fn btr<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    bt::<N>(dst, src, fl);
    *dst &= !(1 << bit_index::<N>(src));
}

pub(super) fn btc<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    bt::<N>(dst, src, fl);
    *dst ^= 1 << bit_index::<N>(src);
}

pub(super) fn bsf<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    let src = src & mask_for_size(N);
    fl.set(RFlags::ZF, src == 0);
    if src != 0 {
        *dst = src.trailing_zeros() as u64;
    }
}

pub(super) fn bsr<const N: usize>(dst: &mut u64, src: u64, fl: &mut RFlags) {
    let src = src & mask_for_size(N);
    fl.set(RFlags::ZF, src == 0);
    if src != 0 {
        *dst = 63 - src.leading_zeros() as u64;
    }
}

pub(super) fn xadd<const N: usize>(dst: &mut u64, reg: &mut u64, fl: &mut RFlags) {
    let old = *dst & mask_for_size(N);
    *dst = add_with_flags(fl, old, *reg, false, N);
    *reg = old;
}

pub(super) fn cmpxchg<const N: usize>(dst: &mut u64, acc: &mut u64, src: u64, fl: &mut RFlags) {
    sub_with_flags(fl, *acc, *dst, false, N);
    if fl.contains(RFlags::ZF) {
        *dst = src & mask_for_size(N);
    } else {
        *acc = *dst & mask_for_size(N);
    }
}
