//! Group 3 multiply/divide kernels.
//!
//! Operands follow the implicit-register convention: for byte forms `lo`
//! holds AX and `hi` is unused; otherwise `lo`/`hi` are rAX/rDX.

use iem_types::RFlags;

use super::alu::{mask_for_size, sx};
use crate::exception::Exception;

fn set_mul_overflow(fl: &mut RFlags, overflow: bool) {
    fl.set(RFlags::CF, overflow);
    fl.set(RFlags::OF, overflow);
}

pub(super) fn mul<const N: usize>(
    lo: &mut u64,
    hi: &mut u64,
    src: u64,
    fl: &mut RFlags,
) -> Result<(), Exception> {
    if N == 1 {
        let product = (*lo & 0xFF) * (src & 0xFF);
        *lo = product;
        set_mul_overflow(fl, product > 0xFF);
        return Ok(());
    }
    let mask = mask_for_size(N);
    let product = ((*lo & mask) as u128) * ((src & mask) as u128);
    *lo = product as u64 & mask;
    *hi = (product >> (N * 8)) as u64 & mask;
    set_mul_overflow(fl, *hi != 0);
    Ok(())
}

pub(super) fn imul<const N: usize>(
    lo: &mut u64,
    hi: &mut u64,
    src: u64,
    fl: &mut RFlags,
) -> Result<(), Exception> {
    if N == 1 {
        let product = sx(*lo, 1) * sx(src, 1);
        *lo = product as u64 & 0xFFFF;
        set_mul_overflow(fl, product != sx(product as u64, 1));
        return Ok(());
    }
    let mask = mask_for_size(N);
    let product = sx(*lo, N) as i128 * sx(src, N) as i128;
    *lo = product as u64 & mask;
    *hi = (product >> (N * 8)) as u64 & mask;
    set_mul_overflow(fl, product != sx(*lo, N) as i128);
    Ok(())
}

pub(super) fn div<const N: usize>(
    lo: &mut u64,
    hi: &mut u64,
    src: u64,
    _fl: &mut RFlags,
) -> Result<(), Exception> {
    let mask = mask_for_size(N);
    let divisor = (src & mask) as u128;
    if divisor == 0 {
        return Err(Exception::DivideError);
    }

    if N == 1 {
        let dividend = (*lo & 0xFFFF) as u128;
        let quotient = dividend / divisor;
        if quotient > 0xFF {
            return Err(Exception::DivideError);
        }
        let remainder = dividend % divisor;
        *lo = ((remainder as u64) << 8) | quotient as u64;
        return Ok(());
    }

    let dividend = (((*hi & mask) as u128) << (N * 8)) | (*lo & mask) as u128;
    let quotient = dividend / divisor;
    if quotient > mask as u128 {
        return Err(Exception::DivideError);
    }
    *lo = quotient as u64;
    *hi = (dividend % divisor) as u64;
    Ok(())
}

pub(super) fn idiv<const N: usize>(
    lo: &mut u64,
    hi: &mut u64,
    src: u64,
    _fl: &mut RFlags,
) -> Result<(), Exception> {
    let divisor = sx(src, N) as i128;
    if divisor == 0 {
        return Err(Exception::DivideError);
    }

    let dividend: i128 = match N {
        1 => sx(*lo & 0xFFFF, 2) as i128,
        8 => (((*hi as u128) << 64) | *lo as u128) as i128,
        _ => {
            let mask = mask_for_size(N);
            sx(((*hi & mask) << (N * 8)) | (*lo & mask), N * 2) as i128
        }
    };

    let (Some(quotient), Some(remainder)) =
        (dividend.checked_div(divisor), dividend.checked_rem(divisor))
    else {
        return Err(Exception::DivideError);
    };

    let half = 1i128 << (N * 8 - 1);
    if quotient < -half || quotient >= half {
        return Err(Exception::DivideError);
    }

    let mask = mask_for_size(N);
    if N == 1 {
        *lo = ((remainder as u64 & 0xFF) << 8) | (quotient as u64 & 0xFF);
    } else {
        *lo = quotient as u64 & mask;
        *hi = remainder as u64 & mask;
    }
    Ok(())
}
