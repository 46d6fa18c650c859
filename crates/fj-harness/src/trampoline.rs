//! Escape hatch for generated code that must leave through a foreign frame.
//!
//! Generated code calls [`recovery_handler`] with a pointer to a
//! [`RecoverySignal`]. The handler records the visit and returns
//! [`RECOVERED`], which the generated code forwards as its own result. No
//! stack unwinding or non-local jump is involved.

use std::sync::atomic::{AtomicU32, Ordering};

/// Value [`recovery_handler`] hands back to the generated code.
pub const RECOVERED: i32 = 1;

#[derive(Debug, Default)]
#[repr(C)]
pub struct RecoverySignal {
    hits: AtomicU32,
}

impl RecoverySignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn recovered(&self) -> bool {
        self.hits() > 0
    }

    pub fn as_ptr(&self) -> *const RecoverySignal {
        self
    }
}

pub extern "C" fn recovery_handler(signal: &RecoverySignal) -> i32 {
    signal.hits.fetch_add(1, Ordering::Relaxed);
    RECOVERED
}

/// Address of [`recovery_handler`] for passing into generated code.
pub fn recovery_handler_address() -> usize {
    recovery_handler as extern "C" fn(&RecoverySignal) -> i32 as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_marks_signal() {
        let signal = RecoverySignal::new();
        assert!(!signal.recovered());
        assert_eq!(recovery_handler(&signal), RECOVERED);
        assert_eq!(signal.hits(), 1);
    }
}
