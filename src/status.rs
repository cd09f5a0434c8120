//! Projects a raw [`crate::driver::DriverStatus`] read into the dial/user
//! readbacks and latched condition fields the coordinator exposes.
//!
//! This is the one place raw driver data crosses into axis coordinates; the
//! rest of the crate only ever sees dial/user values.

use crate::driver::{DriverEvent, DriverStatus};

/// Everything the status projector derives from a single driver read.
///
/// Fields mirror the record's RRBV/DRBV/RBV/MOVN/CDIR family plus the raw
/// switch/fault latches (spec.md §4, status projector).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Readback {
    pub rrbv: i32,
    pub drbv: f64,
    pub rbv: f64,
    pub moving: bool,
    /// Raw direction reported by the driver's own status read: `true` =
    /// positive. This is telemetry (`TDIR`), not the commanded direction the
    /// coordinator last issued (`CDIR`) — the two are tracked separately.
    pub tdir: bool,
    pub plus_ls: bool,
    pub minus_ls: bool,
    pub home_switch: bool,
    pub slip_stall: bool,
    pub comm_error: bool,
    pub fault: bool,
}

impl Readback {
    /// Derive dial/user readbacks from a raw driver read.
    ///
    /// `mres` and `use_encoder` select whether `rrbv` is taken from
    /// `raw_pos` or `raw_enc` and scaled by `mres` or `eres` respectively —
    /// this is `UEIP`/`URIP` (spec.md §3): when either is set the record
    /// trusts the feedback device's count over the commanded step count.
    pub fn project(
        status: &DriverStatus,
        use_encoder: bool,
        mres: f64,
        eres: f64,
        dir: crate::coord::Dir,
        off: f64,
    ) -> Self {
        let (rrbv, res) = if use_encoder && status.encoder_present {
            (status.raw_enc, eres)
        } else {
            (status.raw_pos, mres)
        };
        let drbv = crate::coord::raw_to_dial(rrbv, res);
        let rbv = crate::coord::dial_to_user(drbv, dir, off);

        Readback {
            rrbv,
            drbv,
            rbv,
            moving: status.moving,
            tdir: status.direction,
            plus_ls: status.plus_ls,
            minus_ls: status.minus_ls,
            home_switch: status.home_switch,
            slip_stall: status.slip_stall,
            comm_error: status.comm_error,
            fault: status.fault,
        }
    }
}

/// Outcome of folding a [`DriverEvent`] into the current dial soft limits.
///
/// A `NewLimits` event clips the reported range to whatever was already
/// configured, rather than blindly overwriting it — the controller may
/// report a raw travel range wider than the operator's configured soft
/// limits, and those configured limits always win (spec.md §4, status
/// projector: "before being treated as ordinary `CallbackData`").
pub struct ClippedLimits {
    pub dhlm: f64,
    pub dllm: f64,
}

/// Apply a [`DriverEvent::NewLimits`] report, clipping it to the
/// already-configured `dhlm`/`dllm`. Returns `None` for any other event
/// variant, since only `NewLimits` carries new limit data.
pub fn clip_new_limits(event: DriverEvent, dhlm: f64, dllm: f64) -> Option<ClippedLimits> {
    match event {
        DriverEvent::NewLimits { high, low } => Some(ClippedLimits {
            dhlm: high.min(dhlm.max(dllm)).max(dllm),
            dllm: low.max(dllm).min(dhlm),
        }),
        _ => None,
    }
}
