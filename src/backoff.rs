//! Backoff strategies applied between retries.
//!
//! Attempt semantics: `delay(n)` is the pause after the `n`-th failed attempt (1-based), so the
//! first retry waits `delay(1)`. `delay(0)` is always zero. Every computation saturates at
//! [`MAX_BACKOFF`] instead of overflowing.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use flakeguard::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(100))
//!     .with_factor(3.0)
//!     .unwrap()
//!     .with_max(Duration::from_secs(2))
//!     .unwrap();
//! assert_eq!(backoff.delay(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay(2), Duration::from_millis(300));
//! assert_eq!(backoff.delay(3), Duration::from_millis(900));
//! assert_eq!(backoff.delay(4), Duration::from_secs(2)); // capped
//! ```

use std::time::Duration;
use thiserror::Error;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackoffError {
    #[error("with_max is only valid for linear or exponential backoff")]
    FixedDoesNotSupportMax,
    #[error("max must be greater than zero")]
    MaxMustBePositive,
    #[error("max ({max:?}) must be >= base ({base:?})")]
    MaxLessThanBase { base: Duration, max: Duration },
    #[error("exponential factor must be a finite number >= 1.0")]
    FactorBelowOne,
    #[error("with_factor is only valid for exponential backoff")]
    FactorRequiresExponential,
}

#[derive(Debug, Clone, PartialEq)]
enum BackoffKind {
    Fixed { delay: Duration },
    Linear { base: Duration, max: Option<Duration> },
    Exponential { base: Duration, factor: f64, max: Option<Duration> },
}

/// Delay schedule between attempts: fixed, linear, or exponential with an optional cap.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    kind: BackoffKind,
}

impl Backoff {
    /// The same delay before every retry.
    pub fn fixed(delay: Duration) -> Self {
        Self { kind: BackoffKind::Fixed { delay } }
    }

    /// `base * n` before retry `n`.
    pub fn linear(base: Duration) -> Self {
        Self { kind: BackoffKind::Linear { base, max: None } }
    }

    /// `base * 2^(n-1)` before retry `n`; change the factor with [`Backoff::with_factor`].
    pub fn exponential(base: Duration) -> Self {
        Self { kind: BackoffKind::Exponential { base, factor: 2.0, max: None } }
    }

    /// Replace the growth factor of an exponential backoff. The factor must be finite and >= 1.
    pub fn with_factor(mut self, factor: f64) -> Result<Self, BackoffError> {
        if !factor.is_finite() || factor < 1.0 {
            return Err(BackoffError::FactorBelowOne);
        }
        match &mut self.kind {
            BackoffKind::Exponential { factor: existing, .. } => {
                *existing = factor;
                Ok(self)
            }
            _ => Err(BackoffError::FactorRequiresExponential),
        }
    }

    /// Cap the delay of a linear or exponential backoff.
    /// Returns an error if called on `Fixed`, if `max` is zero, or if `max < base`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.kind {
            BackoffKind::Linear { base, max: existing }
            | BackoffKind::Exponential { base, max: existing, .. } => {
                if max < *base {
                    return Err(BackoffError::MaxLessThanBase { base: *base, max });
                }
                *existing = Some(max);
                Ok(self)
            }
            BackoffKind::Fixed { .. } => Err(BackoffError::FixedDoesNotSupportMax),
        }
    }

    /// Delay to apply after the given failed attempt (1-based; 0 yields no delay).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let raw = match &self.kind {
            BackoffKind::Fixed { delay } => *delay,
            BackoffKind::Linear { base, max } => {
                let n = attempt.min(u32::MAX as usize) as u32;
                cap(base.checked_mul(n).unwrap_or(MAX_BACKOFF), *max)
            }
            BackoffKind::Exponential { base, factor, max } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
                let nanos = base.as_nanos() as f64 * factor.powi(exponent);
                let grown = if nanos.is_finite() && nanos < MAX_BACKOFF.as_nanos() as f64 {
                    Duration::from_nanos(nanos as u64)
                } else {
                    MAX_BACKOFF
                };
                cap(grown, *max)
            }
        };
        raw.min(MAX_BACKOFF)
    }
}

fn cap(delay: Duration, max: Option<Duration>) -> Duration {
    max.map(|m| delay.min(m)).unwrap_or(delay)
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(100))
    }
}
