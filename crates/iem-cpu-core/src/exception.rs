use iem_decoder::DecodeError;
use iem_types::{Mnemonic, SegReg};

/// Why a memory access could not be mapped or committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemFaultKind {
    SegmentLimit,
    NonCanonical,
    Page,
    Alignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?} fault on {segment:?}:{linear:#x}")]
pub struct MemFault {
    pub kind: MemFaultKind,
    pub segment: SegReg,
    pub linear: u64,
}

/// Architectural faults raised while decoding or executing an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Exception {
    #[error("malformed encoding: {0}")]
    MalformedEncoding(#[from] DecodeError),
    #[error("invalid opcode")]
    InvalidOpcode,
    #[error("invalid use of the LOCK prefix")]
    InvalidLockUsage,
    #[error("memory fault: {0}")]
    MemoryFault(#[from] MemFault),
    #[error("divide error")]
    DivideError,
    /// Raised by a complex-instruction handler.
    #[error("exception vector {vector}")]
    Raised {
        vector: u8,
        error_code: Option<u32>,
    },
}

impl Exception {
    /// x86 exception vector number.
    pub const fn vector(&self) -> u8 {
        match self {
            Exception::DivideError => 0,
            Exception::MalformedEncoding(_)
            | Exception::InvalidOpcode
            | Exception::InvalidLockUsage => 6,
            Exception::MemoryFault(fault) => match fault.kind {
                MemFaultKind::Page => 14,
                MemFaultKind::Alignment => 17,
                MemFaultKind::SegmentLimit | MemFaultKind::NonCanonical => {
                    if matches!(fault.segment, SegReg::Ss) {
                        12
                    } else {
                        13
                    }
                }
            },
            Exception::Raised { vector, .. } => *vector,
        }
    }
}

/// Early exit from an opcode handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    Fault(Exception),
    /// Recognized encoding without an implementation.
    NotImplemented(Mnemonic),
}

impl From<Exception> for Stop {
    fn from(e: Exception) -> Self {
        Stop::Fault(e)
    }
}

impl From<DecodeError> for Stop {
    fn from(e: DecodeError) -> Self {
        Stop::Fault(e.into())
    }
}

impl From<MemFault> for Stop {
    fn from(e: MemFault) -> Self {
        Stop::Fault(e.into())
    }
}

/// Result of decoding and executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The instruction retired after consuming this many bytes.
    Retired(u8),
    Fault(Exception),
    NotImplemented(Mnemonic),
}
