//! Soft travel limit gate.
//!
//! Limits are "defined" iff `DHLM != DLLM` (spec.md §4.4); both fields at the
//! same value, including both zero, means limit checking is disabled
//! entirely. All comparisons here operate in dial coordinates, since that's
//! the frame both `DHLM`/`DLLM` and the backlash intermediate point are
//! expressed in.

/// Outcome of a limit check against a proposed dial-coordinate move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LimitCheck {
    /// The move (and, if checked, its backlash intermediate point) stays
    /// within `[DLLM, DHLM]`.
    Ok,
    /// The move would end or pass outside the high limit.
    ViolatesHigh,
    /// The move would end or pass outside the low limit.
    ViolatesLow,
}

/// `true` iff `dhlm`/`dllm` describe an active limit pair.
#[inline]
pub fn limits_defined(dhlm: f64, dllm: f64) -> bool {
    dhlm != dllm
}

/// Check a proposed absolute dial target against the soft limits.
///
/// When limits are undefined, every target passes. `current` is the
/// present dial readback, needed only for the "recovery toward valid range"
/// exception: a target that is itself out of range is still allowed through
/// if it moves strictly back toward `[dllm, dhlm]` from a `current` that is
/// already outside it (spec.md §4.4).
pub fn check_target(target: f64, current: f64, dhlm: f64, dllm: f64) -> LimitCheck {
    if !limits_defined(dhlm, dllm) {
        return LimitCheck::Ok;
    }

    if target > dhlm {
        if current > dhlm && target < current {
            return LimitCheck::Ok;
        }
        return LimitCheck::ViolatesHigh;
    }
    if target < dllm {
        if current < dllm && target > current {
            return LimitCheck::Ok;
        }
        return LimitCheck::ViolatesLow;
    }
    LimitCheck::Ok
}

/// Check a proposed move including its backlash intermediate point, when the
/// move approaches from the non-preferred direction (`preferred_dir ==
/// false`). The intermediate point (final target overshot/undershot by the
/// backlash distance before the final corrective leg) must also land inside
/// the soft limits, or the whole move is rejected up front.
pub fn check_target_with_backlash(
    target: f64,
    intermediate: f64,
    current: f64,
    dhlm: f64,
    dllm: f64,
    preferred_dir: bool,
) -> LimitCheck {
    let direct = check_target(target, current, dhlm, dllm);
    if direct != LimitCheck::Ok {
        return direct;
    }
    if preferred_dir {
        return LimitCheck::Ok;
    }
    check_target(intermediate, current, dhlm, dllm)
}

/// Check a jog or home request against the soft limits and the direction
/// requested. Jogging/homing toward a limit you're already sitting on is a
/// violation; jogging/homing away from it is always permitted, matching
/// spec.md §4.4's "a jog/home that moves away from the violated limit is not
/// itself a violation."
///
/// `going_positive` is the requested raw direction of travel.
pub fn check_jog_or_home(current: f64, dhlm: f64, dllm: f64, going_positive: bool) -> LimitCheck {
    if !limits_defined(dhlm, dllm) {
        return LimitCheck::Ok;
    }
    if going_positive && current >= dhlm {
        return LimitCheck::ViolatesHigh;
    }
    if !going_positive && current <= dllm {
        return LimitCheck::ViolatesLow;
    }
    LimitCheck::Ok
}

/// Recompute `LVIO` (limit-violation latch) from the current dial readback.
///
/// This is a simple position check, independent of any in-flight move: the
/// readback itself is either inside, on, or outside the defined range.
/// Returns `false` whenever limits are undefined.
#[inline]
pub fn lvio(current: f64, dhlm: f64, dllm: f64) -> bool {
    limits_defined(dhlm, dllm) && (current > dhlm || current < dllm)
}

/// Detect the False→True edge of `LVIO` across a single pass.
///
/// On this edge the coordinator raises `stop` and, outside Set mode, clears
/// any pending jog/home request buttons (spec.md §4.4).
#[inline]
pub fn lvio_rising_edge(was: bool, now: bool) -> bool {
    !was && now
}
