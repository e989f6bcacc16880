//! Token metering and cooperative cancellation.
//!
//! [`OcrTokensMetering`] is the accounting record every backend produces and
//! every interruption carries, so a caller can report spend even when a run
//! stops early. [`AbortProbe`] is the cancellation check that backends poll
//! at their checkpoints (before and after each blocking call).

use crate::error::AbortError;
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Input/output tokens consumed by one or more OCR requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OcrTokensMetering {
    /// Prompt-side tokens (the page image plus instruction).
    pub input_tokens: u64,
    /// Generated tokens.
    pub output_tokens: u64,
}

impl OcrTokensMetering {
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Sum of input and output tokens, saturating.
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    pub fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

impl Add for OcrTokensMetering {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self.output_tokens.saturating_add(other.output_tokens),
        }
    }
}

impl AddAssign for OcrTokensMetering {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sum for OcrTokensMetering {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Why a run stopped cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptedKind {
    /// The token budget was exhausted.
    TokenLimitExceeded,
    /// The caller requested cancellation.
    Abort,
}

// ── Abort probes ─────────────────────────────────────────────────────────

/// A cancellation check polled by backends at their checkpoints.
///
/// Implemented for any `Fn() -> bool` closure, so callers can pass
/// `&|| stop.load(Ordering::Relaxed)` directly.
pub trait AbortProbe: Send + Sync {
    fn is_aborted(&self) -> bool;
}

impl<F> AbortProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_aborted(&self) -> bool {
        self()
    }
}

/// A probe that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverAbort;

impl AbortProbe for NeverAbort {
    fn is_aborted(&self) -> bool {
        false
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Backends notice at their next checkpoint.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl AbortProbe for AbortFlag {
    fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Turn a positive probe into the internal abort signal.
pub fn check_aborted(probe: &dyn AbortProbe) -> Result<(), AbortError> {
    if probe.is_aborted() {
        Err(AbortError::new())
    } else {
        Ok(())
    }
}

/// Checkpoint after a call that already spent tokens: the abort signal
/// carries `spent` so the usage is not lost.
pub fn check_aborted_after(probe: &dyn AbortProbe, spent: OcrTokensMetering) -> Result<(), AbortError> {
    if probe.is_aborted() {
        Err(AbortError::with_metering(spent))
    } else {
        Ok(())
    }
}
