//! Two-phase guest memory access: `map` validates and stages, `commit` writes
//! back.
//!
//! Handlers never touch guest memory directly. A mapping either fails with no
//! side effects, or yields a [`MemMapping`] that must be handed back to
//! [`MemoryBroker::commit`] or [`MemoryBroker::discard`]; both consume it.
//!
//! LOCK-prefixed accesses hold a stripe of the shared [`LockDomain`] from map
//! until commit/discard, so read-modify-write sequences of different vCPUs on
//! the same cache line cannot interleave. A locked access that crosses a line
//! holds the stripes of both lines.

use std::sync::{Mutex, MutexGuard};

use iem_types::{CpuMode, SegReg, Width};

use crate::exception::{Exception, MemFault, MemFaultKind};
use crate::mem::{Access, GuestMemory};
use crate::state::Segment;

const CACHE_LINE_SHIFT: u32 = 6;

/// Cross-vCPU exclusion for locked read-modify-write sequences.
#[derive(Debug)]
pub struct LockDomain {
    stripes: Box<[Mutex<()>]>,
}

impl LockDomain {
    /// `stripes` is rounded up to a power of two (at least one).
    pub fn new(stripes: usize) -> Self {
        let n = stripes.max(1).next_power_of_two();
        Self {
            stripes: (0..n).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn stripes(&self) -> usize {
        self.stripes.len()
    }

    fn stripe_of(&self, linear: u64) -> usize {
        (linear >> CACHE_LINE_SHIFT) as usize & (self.stripes.len() - 1)
    }

    fn acquire(&self, idx: usize) -> MutexGuard<'_, ()> {
        match self.stripes[idx].lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Acquires the stripe covering the cache line of `linear`.
    pub fn lock(&self, linear: u64) -> MutexGuard<'_, ()> {
        self.acquire(self.stripe_of(linear))
    }

    /// Acquires every stripe covering `len` bytes at `linear`. An access that
    /// straddles two cache lines takes both stripes, lower index first.
    pub fn lock_range(&self, linear: u64, len: usize) -> StripeGuards<'_> {
        let first = self.stripe_of(linear);
        let last = self.stripe_of(linear.wrapping_add(len.max(1) as u64 - 1));
        if first == last {
            return StripeGuards {
                _low: self.acquire(first),
                high: None,
            };
        }
        let low = self.acquire(first.min(last));
        let high = self.acquire(first.max(last));
        StripeGuards {
            _low: low,
            high: Some(high),
        }
    }
}

impl Default for LockDomain {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Stripe guards held by a locked mapping; the second is present only for
/// accesses crossing into a line on another stripe.
#[derive(Debug)]
pub struct StripeGuards<'l> {
    _low: MutexGuard<'l, ()>,
    high: Option<MutexGuard<'l, ()>>,
}

impl StripeGuards<'_> {
    pub fn count(&self) -> usize {
        1 + self.high.is_some() as usize
    }
}

/// Per-vCPU broker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub maps: u64,
    pub commits: u64,
    pub discards: u64,
}

/// A staged guest memory operand.
#[must_use = "a mapping must be committed or discarded"]
#[derive(Debug)]
pub struct MemMapping<'l> {
    segment: SegReg,
    linear: u64,
    paddr: u64,
    width: Width,
    access: Access,
    buf: [u8; 8],
    guards: Option<StripeGuards<'l>>,
}

impl MemMapping<'_> {
    pub fn value(&self) -> u64 {
        u64::from_le_bytes(self.buf) & self.width.mask()
    }

    pub fn set_value(&mut self, value: u64) {
        self.buf = (value & self.width.mask()).to_le_bytes();
    }

    pub fn width(&self) -> Width {
        self.width
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn segment(&self) -> SegReg {
        self.segment
    }

    pub fn linear(&self) -> u64 {
        self.linear
    }

    pub fn is_locked(&self) -> bool {
        self.guards.is_some()
    }

    /// Number of lock stripes held; zero for an unlocked mapping.
    pub fn stripes_held(&self) -> usize {
        self.guards.as_ref().map_or(0, StripeGuards::count)
    }
}

pub struct MemoryBroker<'a> {
    mem: &'a mut dyn GuestMemory,
    locks: &'a LockDomain,
    mode: CpuMode,
    stats: &'a mut BrokerStats,
}

impl<'a> MemoryBroker<'a> {
    pub fn new(
        mem: &'a mut dyn GuestMemory,
        locks: &'a LockDomain,
        mode: CpuMode,
        stats: &'a mut BrokerStats,
    ) -> Self {
        Self {
            mem,
            locks,
            mode,
            stats,
        }
    }

    /// The underlying guest memory, for complex-instruction handlers.
    pub fn memory(&mut self) -> &mut dyn GuestMemory {
        &mut *self.mem
    }

    pub fn stats(&self) -> BrokerStats {
        *self.stats
    }

    /// Applies segmentation to `offset` and returns the linear address.
    pub fn linearize(
        &self,
        seg: SegReg,
        cache: &Segment,
        offset: u64,
        width: Width,
    ) -> Result<u64, MemFault> {
        let fault = |kind, linear| MemFault {
            kind,
            segment: seg,
            linear,
        };

        if self.mode == CpuMode::Bits64 {
            let linear = match seg {
                SegReg::Fs | SegReg::Gs => cache.base.wrapping_add(offset),
                _ => offset,
            };
            let last = linear.wrapping_add(width.bytes() as u64 - 1);
            if !is_canonical(linear) || !is_canonical(last) {
                return Err(fault(MemFaultKind::NonCanonical, linear));
            }
            return Ok(linear);
        }

        let last = offset + width.bytes() as u64 - 1;
        if last > cache.limit as u64 {
            return Err(fault(MemFaultKind::SegmentLimit, offset));
        }
        Ok(cache.base.wrapping_add(offset) & 0xFFFF_FFFF)
    }

    /// Validates and stages an access. Nothing is written and no state is
    /// left behind when this fails.
    pub fn map(
        &mut self,
        seg: SegReg,
        cache: &Segment,
        offset: u64,
        width: Width,
        access: Access,
        locked: bool,
    ) -> Result<MemMapping<'a>, Exception> {
        let linear = self.linearize(seg, cache, offset, width)?;

        let locks: &'a LockDomain = self.locks;
        let len = width.bytes();
        let guards = locked.then(|| locks.lock_range(linear, len));

        let paddr = self.mem.translate(seg, linear, len, access)?;
        let mut buf = [0u8; 8];
        if access.reads() {
            self.mem.read_phys(paddr, &mut buf[..len])?;
        }

        self.stats.maps += 1;
        Ok(MemMapping {
            segment: seg,
            linear,
            paddr,
            width,
            access,
            buf,
            guards,
        })
    }

    /// Writes a mapping's staging buffer back. Read-only mappings just release.
    pub fn commit(&mut self, mapping: MemMapping<'a>) -> Result<(), Exception> {
        if mapping.access.writes() {
            self.mem
                .write_phys(mapping.paddr, &mapping.buf[..mapping.width.bytes()])?;
        }
        self.stats.commits += 1;
        Ok(())
    }

    pub fn discard(&mut self, mapping: MemMapping<'a>) {
        drop(mapping);
        self.stats.discards += 1;
    }
}

fn is_canonical(addr: u64) -> bool {
    ((addr as i64) << 16 >> 16) as u64 == addr
}
