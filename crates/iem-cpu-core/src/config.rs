use iem_decoder::RexPolicy;

/// Engine knobs. There is no file format; embedders build this in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IemConfig {
    /// Handling of a REX byte that is followed by another legacy prefix.
    pub rex_policy: RexPolicy,
    /// Emit a `trace` event for every retired instruction.
    pub trace_retired: bool,
    /// Stripe count for a [`LockDomain`](crate::LockDomain) created by
    /// [`Vcpu::new`](crate::Vcpu::new).
    pub lock_stripes: usize,
}

impl Default for IemConfig {
    fn default() -> Self {
        Self {
            rex_policy: RexPolicy::Architectural,
            trace_retired: false,
            lock_stripes: 64,
        }
    }
}
