//! Guest memory seam and a flat test implementation.

use core::ops::Range;

use iem_types::SegReg;

use crate::exception::{MemFault, MemFaultKind};

/// Access mode of a mapping (and of a translation request).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    /// Store-only; the staging buffer is not pre-read.
    Write,
    ReadWrite,
    Execute,
}

impl Access {
    pub const fn reads(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite | Access::Execute)
    }

    pub const fn writes(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// Guest address translation and physical access.
///
/// Segmentation has already been applied when `translate` is called; the
/// implementation owns paging and page-fault reporting.
pub trait GuestMemory {
    fn translate(
        &mut self,
        segment: SegReg,
        linear: u64,
        len: usize,
        access: Access,
    ) -> Result<u64, MemFault>;

    fn read_phys(&mut self, paddr: u64, dst: &mut [u8]) -> Result<(), MemFault>;

    fn write_phys(&mut self, paddr: u64, src: &[u8]) -> Result<(), MemFault>;

    /// Fetches up to `dst.len()` code bytes at `linear`, stopping at the first
    /// byte that cannot be translated. Returns the number of bytes fetched.
    fn fetch_code(&mut self, linear: u64, dst: &mut [u8]) -> usize {
        for (i, slot) in dst.iter_mut().enumerate() {
            let addr = linear.wrapping_add(i as u64);
            let Ok(paddr) = self.translate(SegReg::Cs, addr, 1, Access::Execute) else {
                return i;
            };
            let mut byte = [0u8];
            if self.read_phys(paddr, &mut byte).is_err() {
                return i;
            }
            *slot = byte[0];
        }
        dst.len()
    }
}

impl<T: GuestMemory + ?Sized> GuestMemory for &mut T {
    fn translate(
        &mut self,
        segment: SegReg,
        linear: u64,
        len: usize,
        access: Access,
    ) -> Result<u64, MemFault> {
        (**self).translate(segment, linear, len, access)
    }

    fn read_phys(&mut self, paddr: u64, dst: &mut [u8]) -> Result<(), MemFault> {
        (**self).read_phys(paddr, dst)
    }

    fn write_phys(&mut self, paddr: u64, src: &[u8]) -> Result<(), MemFault> {
        (**self).write_phys(paddr, src)
    }

    fn fetch_code(&mut self, linear: u64, dst: &mut [u8]) -> usize {
        (**self).fetch_code(linear, dst)
    }
}

/// One successful `translate` call, as recorded by [`FlatTestBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslateRecord {
    pub segment: SegReg,
    pub linear: u64,
    pub len: usize,
    pub access: Access,
}

/// Identity-mapped RAM window for tests.
///
/// Linear addresses outside `[base, base + size)` or inside an injected fault
/// range report a page fault.
#[derive(Debug, Clone)]
pub struct FlatTestBus {
    base: u64,
    mem: Vec<u8>,
    faults: Vec<Range<u64>>,
    log: Vec<TranslateRecord>,
}

impl FlatTestBus {
    pub fn new(size: usize) -> Self {
        Self::with_base(0, size)
    }

    pub fn with_base(base: u64, size: usize) -> Self {
        Self {
            base,
            mem: vec![0; size],
            faults: Vec::new(),
            log: Vec::new(),
        }
    }

    /// Copies `data` into the window at `addr`.
    ///
    /// # Panics
    ///
    /// Panics if any byte of the range falls outside the window.
    pub fn load(&mut self, addr: u64, data: &[u8]) {
        let start = (addr - self.base) as usize;
        self.mem[start..start + data.len()].copy_from_slice(data);
    }

    /// # Panics
    ///
    /// Panics if any byte of the range falls outside the window. The
    /// `read_*` helpers below share this contract.
    pub fn slice(&self, addr: u64, len: usize) -> &[u8] {
        let start = (addr - self.base) as usize;
        &self.mem[start..start + len]
    }

    pub fn read_u8(&self, addr: u64) -> u8 {
        self.slice(addr, 1)[0]
    }

    pub fn read_u16(&self, addr: u64) -> u16 {
        let b = self.slice(addr, 2);
        u16::from_le_bytes([b[0], b[1]])
    }

    pub fn read_u32(&self, addr: u64) -> u32 {
        let b = self.slice(addr, 4);
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    pub fn read_u64(&self, addr: u64) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.slice(addr, 8));
        u64::from_le_bytes(raw)
    }

    /// Makes every translation touching `range` fail with a page fault.
    pub fn inject_page_fault(&mut self, range: Range<u64>) {
        self.faults.push(range);
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    pub fn translations(&self) -> &[TranslateRecord] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    fn contains(&self, addr: u64, len: usize) -> bool {
        let Some(offset) = addr.checked_sub(self.base) else {
            return false;
        };
        offset
            .checked_add(len as u64)
            .is_some_and(|end| end <= self.mem.len() as u64)
    }

    fn is_injected(&self, addr: u64, len: usize) -> bool {
        let end = addr.saturating_add(len as u64);
        self.faults.iter().any(|r| addr < r.end && r.start < end)
    }

    fn page_fault(segment: SegReg, linear: u64) -> MemFault {
        MemFault {
            kind: MemFaultKind::Page,
            segment,
            linear,
        }
    }
}

impl GuestMemory for FlatTestBus {
    fn translate(
        &mut self,
        segment: SegReg,
        linear: u64,
        len: usize,
        access: Access,
    ) -> Result<u64, MemFault> {
        if self.is_injected(linear, len) || !self.contains(linear, len) {
            return Err(Self::page_fault(segment, linear));
        }
        self.log.push(TranslateRecord {
            segment,
            linear,
            len,
            access,
        });
        Ok(linear)
    }

    fn read_phys(&mut self, paddr: u64, dst: &mut [u8]) -> Result<(), MemFault> {
        if !self.contains(paddr, dst.len()) {
            return Err(Self::page_fault(SegReg::Ds, paddr));
        }
        let start = (paddr - self.base) as usize;
        dst.copy_from_slice(&self.mem[start..start + dst.len()]);
        Ok(())
    }

    fn write_phys(&mut self, paddr: u64, src: &[u8]) -> Result<(), MemFault> {
        if !self.contains(paddr, src.len()) {
            return Err(Self::page_fault(SegReg::Ds, paddr));
        }
        let start = (paddr - self.base) as usize;
        self.mem[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn fetch_code(&mut self, linear: u64, dst: &mut [u8]) -> usize {
        let mut n = 0;
        while n < dst.len() {
            let addr = linear.wrapping_add(n as u64);
            if self.is_injected(addr, 1) || !self.contains(addr, 1) {
                break;
            }
            n += 1;
        }
        if n > 0 {
            let start = (linear - self.base) as usize;
            dst[..n].copy_from_slice(&self.mem[start..start + n]);
        }
        n
    }
}
