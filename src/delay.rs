//! One-shot settle-delay timer.
//!
//! The source arms a callback directly against the record (`callbackRequestDelayed`)
//! when `DLY > 0` after a move completes, then re-enters `process()` through a
//! second, synthetic scan when it fires. Without a heap or a scheduler to hand
//! a callback to, that becomes a small owned state machine instead: the
//! coordinator arms it with a deadline, and on each subsequent pass checks
//! whether the deadline has been reached, using whatever elapsed-time source
//! the containing framework provides.

/// A settle-delay timer, armed once per retry/completion cycle.
///
/// `Idle` and `Armed` mirror the presence/absence of `MIP_DELAY_REQ`; `Fired`
/// is the one-pass window during which the coordinator still needs to
/// process the expiry before returning to `Idle` (`MIP_DELAY_ACK`).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DelayTimer {
    Idle,
    /// Armed with the elapsed-time value (seconds, monotonic, caller-defined
    /// origin) at which it should fire.
    Armed { deadline: f64 },
    /// Deadline reached; awaiting this pass's `process()` to acknowledge it.
    Fired,
}

impl Default for DelayTimer {
    fn default() -> Self {
        DelayTimer::Idle
    }
}

impl DelayTimer {
    /// Arm the timer for `dly` seconds from `now`. A non-positive `dly`
    /// fires immediately rather than arming, since a zero settle delay
    /// means "proceed on the very next pass."
    pub fn arm(&mut self, now: f64, dly: f64) {
        *self = if dly <= 0.0 {
            DelayTimer::Fired
        } else {
            DelayTimer::Armed {
                deadline: now + dly,
            }
        };
    }

    /// Advance the timer against the current elapsed-time reading. Call once
    /// per pass before consulting [`DelayTimer::is_fired`].
    pub fn poll(&mut self, now: f64) {
        if let DelayTimer::Armed { deadline } = *self {
            if now >= deadline {
                *self = DelayTimer::Fired;
            }
        }
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        matches!(self, DelayTimer::Armed { .. })
    }

    #[inline]
    pub fn is_fired(&self) -> bool {
        matches!(self, DelayTimer::Fired)
    }

    /// Acknowledge a fired timer, returning it to `Idle`. No-op if not
    /// currently `Fired`.
    pub fn acknowledge(&mut self) {
        if self.is_fired() {
            *self = DelayTimer::Idle;
        }
    }
}
