//! Motion-in-progress bitfield and the small supervisor-facing enums that
//! shape how `process()` interprets a request.
//!
//! `Mip` is the idiomatic analog of the source's `#define MIP_xxx` mask
//! constants and `MARK`/`UNMARK` macros: a `bitflags` set is the natural
//! Rust shape for "one bit per independent in-flight reason," the same way
//! `guptaarnav-tmc2160-driver` uses `bitflags` for its register layouts.

use bitflags::bitflags;

bitflags! {
    /// Reasons `process()` currently considers the axis "busy."
    ///
    /// `Mip::empty()` (all bits clear) is the source's `MIP_DONE`: nothing
    /// outstanding, `DMOV` may go true.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Mip: u16 {
        /// Jogging in the positive (forward) direction.
        const JOG_F = 1 << 0;
        /// Jogging in the negative (reverse) direction.
        const JOG_R = 1 << 1;
        /// First leg of a jog-triggered backlash takeup.
        const JOG_BL1 = 1 << 2;
        /// Second leg of a jog-triggered backlash takeup.
        const JOG_BL2 = 1 << 3;
        /// Homing forward.
        const HOM_F = 1 << 4;
        /// Homing reverse.
        const HOM_R = 1 << 5;
        /// Ordinary commanded move in progress.
        const MOVE = 1 << 6;
        /// Backlash-correction leg of a commanded move.
        const MOVE_BL = 1 << 7;
        /// Retry move in progress (post-settle correction).
        const RETRY = 1 << 8;
        /// `LOAD_POS` in progress.
        const LOAD_POS = 1 << 9;
        /// Stop requested, awaiting driver confirmation.
        const STOP = 1 << 10;
        /// Settle-delay timer armed, awaiting expiry.
        const DELAY_REQ = 1 << 11;
        /// Settle-delay timer expired, awaiting this pass's processing.
        const DELAY_ACK = 1 << 12;
        /// A jog button is held down, pending dispatch.
        const JOG_REQ = 1 << 13;
        /// A jog-stop (button release) is pending dispatch.
        const JOG_STOP = 1 << 14;
        /// Motion was observed that this axis didn't itself command.
        const EXTERNAL = 1 << 15;
    }
}

impl Default for Mip {
    fn default() -> Self {
        Mip::empty()
    }
}

impl Mip {
    /// `true` iff no bit is set — the source's `MIP_DONE`.
    #[inline]
    pub fn is_done(self) -> bool {
        self.is_empty()
    }
}

/// Stop/Pause/Move/Go supervisor stance (`SPMG`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Spmg {
    Stop,
    Pause,
    Move,
    Go,
}

impl Default for Spmg {
    fn default() -> Self {
        Spmg::Go
    }
}

/// `SET` field: whether writes to `VAL`/`DVAL`/`RVAL` command motion (`Use`)
/// or merely redefine the current position (`Set`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Set {
    Use,
    Set,
}

impl Default for Set {
    fn default() -> Self {
        Set::Use
    }
}

/// `FOFF`: whether a `Set`-mode position redefinition is allowed to change
/// the user/dial `OFF` (`Variable`) or must instead hold `OFF` fixed and
/// redefine `DVAL` alone (`Frozen`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Foff {
    Variable,
    Frozen,
}

impl Default for Foff {
    fn default() -> Self {
        Foff::Variable
    }
}

/// Retry mode: how a missed target is re-approached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rmod {
    /// Retry the full distance again, same as the original move.
    Default,
    /// Retries grow the overshoot allowance by a fixed increment each time.
    Arithmetic,
    /// Retries grow the overshoot allowance geometrically.
    Geometric,
    /// Consider any position within the retry deadband "in position" and
    /// never retry once inside it, even on the first pass.
    InPosition,
}

impl Default for Rmod {
    fn default() -> Self {
        Rmod::Default
    }
}
