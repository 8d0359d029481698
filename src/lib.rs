//! Single-instruction x86 decode-and-dispatch engine.
//!
//! This crate re-exports the workspace members under one path:
//! - [`types`]: widths, modes, registers, flags and mnemonics
//! - [`decoder`]: byte cursor, prefix accumulation and ModRM/SIB decoding
//! - everything from `iem-cpu-core` at the top level (`Vcpu`, `CpuState`,
//!   `GuestMemory`, the memory broker and the complex-instruction seam)
//!
//! ```
//! use iem::{gpr, CpuMode, CpuState, FlatTestBus, NoComplexOps, StepOutcome, Vcpu};
//!
//! let mut cpu = Vcpu::new(CpuState::new(CpuMode::Bits32), FlatTestBus::new(0x1000), NoComplexOps);
//! // add eax, 0x12345678
//! let outcome = cpu.decode_and_execute_one(&[0x05, 0x78, 0x56, 0x34, 0x12]);
//! assert_eq!(outcome, StepOutcome::Retired(5));
//! assert_eq!(cpu.state.gpr(gpr::RAX), 0x1234_5678);
//! ```

pub use iem_cpu_core::*;

pub mod decoder {
    pub use iem_decoder::*;
}

pub mod types {
    pub use iem_types::*;
}
