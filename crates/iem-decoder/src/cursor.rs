use iem_types::Width;

/// Maximum x86 instruction length (architectural limit).
pub const MAX_INST_LEN: usize = 15;

/// Decoder error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The byte stream ended before the instruction could be fully decoded.
    #[error("unexpected end of instruction bytes")]
    UnexpectedEof,
    /// The instruction would exceed the architectural 15-byte length limit.
    #[error("instruction exceeds 15-byte length limit")]
    TooLong,
}

/// Forward-only reader over the bytes of one instruction.
///
/// Reads never look past [`MAX_INST_LEN`]; a read that would cross it fails
/// with [`DecodeError::TooLong`] even if more bytes are available.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos + len;
        if end > MAX_INST_LEN {
            return Err(DecodeError::TooLong);
        }
        let bytes = self
            .bytes
            .get(self.pos..end)
            .ok_or(DecodeError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    pub fn peek_u8(&self) -> Result<u8, DecodeError> {
        if self.pos >= MAX_INST_LEN {
            return Err(DecodeError::TooLong);
        }
        self.bytes
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof)
    }

    pub fn next_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn next_u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn next_u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn next_u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    /// Reads an unsigned little-endian value of exactly `width`.
    pub fn next_sized(&mut self, width: Width) -> Result<u64, DecodeError> {
        Ok(match width {
            Width::W8 => self.next_u8()? as u64,
            Width::W16 => self.next_u16()? as u64,
            Width::W32 => self.next_u32()? as u64,
            Width::W64 => self.next_u64()?,
        })
    }

    /// Reads a byte and sign-extends it to 64 bits.
    pub fn next_i8_sx(&mut self) -> Result<u64, DecodeError> {
        Ok(self.next_u8()? as i8 as i64 as u64)
    }

    /// Reads a dword and sign-extends it to 64 bits.
    pub fn next_i32_sx(&mut self) -> Result<u64, DecodeError> {
        Ok(self.next_u32()? as i32 as i64 as u64)
    }
}
