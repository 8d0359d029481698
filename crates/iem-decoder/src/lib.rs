//! x86 instruction-stream decoding primitives.
//!
//! This crate knows about bytes only:
//! - [`ByteCursor`]: bounded reader honoring the 15-byte instruction limit
//! - [`InsnContext`]: per-instruction prefix state and effective sizes
//! - [`prefix::accumulate`]: legacy/REX prefix folding
//! - [`decode_rm`]: ModRM/SIB/displacement decoding into an [`AddrForm`]
//!
//! Evaluating addresses against guest registers and executing anything is
//! left to the engine crate.

mod context;
mod cursor;
mod modrm;
pub mod prefix;

pub use context::{InsnContext, Prefixes, Rep, RexPolicy};
pub use cursor::{ByteCursor, DecodeError, MAX_INST_LEN};
pub use modrm::{decode_rm, AddrBase, AddrForm, ModRm, RmOperand, Sib};
pub use prefix::{LegacyPrefix, PrefixScan};
