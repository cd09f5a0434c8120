//! Velocity/acceleration/resolution parameter family, and the validator that
//! keeps it mutually consistent after any single write.
//!
//! See spec.md §3 ("Parameter family") and §4.2 priority 3
//! (resolution/encoder-mode change handling).

use num_traits::float::Float;

use crate::coord::Dir;
use crate::mip::Rmod;

/// Error returned by [`Params`] writes that cannot be silently renormalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParamError {
    /// `MRES` (or `ERES`) would be zero; the original defends against
    /// divide-by-zero by forcing these to `1.0` instead of erroring, but a
    /// caller who explicitly asked for zero resolution gets this back so it
    /// can alarm rather than silently drift.
    ZeroResolution,
    /// A deadband write produced `SDBD <= 0` or `RDBD < SDBD`.
    InvalidDeadband,
}

/// The full set of fields that make up an axis's static configuration and
/// live targets/readbacks, in raw `f64`/`i32` form. Coordinate-system
/// derived fields (`VAL`, `DVAL`, `RVAL`, `HLM`, `LLM`, readbacks) live on
/// [`crate::coordinator::AxisCore`] instead, since they change every move;
/// `Params` holds what's normally written once at setup and occasionally
/// tuned afterward.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Params {
    /// Direction sign between user and dial coordinates.
    pub dir: Dir,
    /// User-coordinate offset.
    pub off: f64,
    /// Dial-coordinate high/low soft limits. Equal (including both zero)
    /// means "disabled".
    pub dhlm: f64,
    pub dllm: f64,

    /// Motor resolution: dial units per raw step. Signed.
    pub mres: f64,
    /// Encoder resolution: dial units per encoder count. Signed,
    /// independently of `mres`.
    pub eres: f64,
    /// Steps per revolution, used to derive `UREV`.
    pub srev: f64,

    /// Raw speeds, in steps/sec.
    pub s: f64,
    pub sbas: f64,
    pub smax: f64,
    pub sbak: f64,

    /// Acceleration time to `VELO`, seconds.
    pub accl: f64,
    /// Acceleration time to `BVEL`, seconds.
    pub bacc: f64,
    /// Jog acceleration, EGU/sec^2.
    pub jar: f64,
    /// Jog velocity, EGU/sec.
    pub jvel: f64,
    /// Home velocity, EGU/sec.
    pub hvel: f64,

    /// Single-move deadband. If `0.0`, treated as `|MRES|` (spec.md §3).
    pub sdbd: f64,
    /// Retry deadband.
    pub rdbd: f64,

    /// Signed dial backlash distance.
    pub bdst: f64,
    pub bvel: f64,
    pub bacc_backlash: f64,
    /// Backlash velocity-profile fraction, clamped to `[0.1, 1.5]`.
    pub frac: f64,

    /// Max retry attempts; 0 disables retry.
    pub rtry: u32,
    pub rmod: Rmod,

    /// Use encoder readback for in-position/retry decisions.
    pub ueip: bool,
    /// Use readback-link value for in-position/retry decisions.
    pub urip: bool,

    /// Delay (seconds) armed after motion-complete before retry evaluation.
    pub dly: f64,

    /// Alarm severity used when retries are exhausted (`MISV`).
    pub misv: crate::alarm::AlarmSeverity,

    /// Stop-on-problem: raise `stop` on `SlipStall`/`Problem` faults.
    pub stop_on_problem: bool,

    /// "Home on limit": the driver allows homing while already on the
    /// directed limit switch.
    pub home_on_limit: bool,

    /// Closed-loop input: pull `VAL` from an external link each pass.
    pub closed_loop_input: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            dir: Dir::Pos,
            off: 0.0,
            dhlm: 0.0,
            dllm: 0.0,
            mres: 1.0,
            eres: 1.0,
            srev: 200.0,
            s: 1.0,
            sbas: 0.0,
            smax: 0.0,
            sbak: 1.0,
            accl: 0.2,
            bacc: 0.2,
            jar: 1.0,
            jvel: 1.0,
            hvel: 1.0,
            sdbd: 0.0,
            rdbd: 0.0,
            bdst: 0.0,
            bvel: 1.0,
            bacc_backlash: 0.2,
            frac: 1.0,
            rtry: 3,
            rmod: Rmod::Default,
            ueip: false,
            urip: false,
            dly: 0.0,
            misv: crate::alarm::AlarmSeverity::Major,
            stop_on_problem: true,
            home_on_limit: false,
            closed_loop_input: false,
        }
    }
}

impl Params {
    /// `UREV = MRES * SREV`, EGU per revolution.
    #[inline]
    pub fn urev(&self) -> f64 {
        self.mres * self.srev
    }

    /// `VELO = |UREV| * S`
    #[inline]
    pub fn velo(&self) -> f64 {
        self.urev().abs() * self.s
    }

    /// `VBAS = |UREV| * SBAS`
    #[inline]
    pub fn vbas(&self) -> f64 {
        self.urev().abs() * self.sbas
    }

    /// `VMAX = |UREV| * SMAX`
    #[inline]
    pub fn vmax(&self) -> f64 {
        self.urev().abs() * self.smax
    }

    /// `BVEL = |UREV| * SBAK`
    #[inline]
    pub fn bvel_derived(&self) -> f64 {
        self.urev().abs() * self.sbak
    }

    /// The effective single-move deadband: `SDBD` if set, else `|MRES|`.
    #[inline]
    pub fn effective_sdbd(&self) -> f64 {
        if self.sdbd > 0.0 {
            self.sdbd
        } else {
            self.mres.abs()
        }
    }

    /// Clamp `FRAC` into `[0.1, 1.5]`, as `special()` does on write
    /// (spec.md §6, "clamp FRAC to [0.1, 1.5]").
    pub fn set_frac(&mut self, frac: f64) {
        self.frac = frac.max(0.1).min(1.5);
    }

    /// Defend against divide-by-zero resolution, mirroring
    /// `newMRES_ERES_UEIP`'s "if |mres| is very near zero, set it to one."
    /// Returns `true` if either field was clamped.
    pub fn sanitize_resolution(&mut self) -> bool {
        let mut changed = false;
        if self.mres.abs() < 1.0e-9 {
            self.mres = 1.0;
            changed = true;
        }
        if self.eres == 0.0 {
            self.eres = self.mres;
            changed = true;
        }
        changed
    }

    /// Enforce `0 < SDBD <= RDBD` (spec.md §8 invariant 5), growing `RDBD`
    /// up to match rather than rejecting the write — this is
    /// `enforceMinRetryDeadband()` in the original.
    pub fn enforce_min_retry_deadband(&mut self) {
        let sdbd = self.effective_sdbd();
        if self.rdbd < sdbd {
            self.rdbd = sdbd;
        }
    }

    /// Clamp the velocity family so `0 <= VBAS <= {VELO, BVEL, JVEL, HVEL} <=
    /// VMAX` whenever `VMAX > 0` (spec.md §3/§8 invariant 4). Returns the
    /// (possibly unchanged) `s` scale factor needed to keep `VELO` in range;
    /// callers adjust `self.s` from the result since `VELO` is derived, not
    /// stored directly.
    pub fn clamp_velocity_family(&mut self) {
        let vmax = self.vmax();
        if vmax <= 0.0 {
            return;
        }
        let urev_abs = self.urev().abs();
        if urev_abs <= 0.0 {
            return;
        }

        let vbas = self.vbas().min(vmax);
        self.sbas = vbas / urev_abs;

        let velo = self.velo().max(self.vbas()).min(vmax);
        self.s = velo / urev_abs;

        let bvel = self.bvel_derived().max(self.vbas()).min(vmax);
        self.sbak = bvel / urev_abs;

        self.jvel = self.jvel.max(self.vbas()).min(vmax);
        self.hvel = self.hvel.max(self.vbas()).min(vmax);
    }
}

/// Calculate the encoder/step ratio pushed to the driver via `SetEncRatio`.
///
/// Mirrors the original's loop exactly: start from `m = 10_000_000` and
/// divide by 10 while `m > 1` and either `|m / eres| > 1e6` or
/// `|m / mres| > 1e6`; the ratio is then `(round(|m/eres|), round(|m/mres|))`.
pub fn encoder_ratio(mres: f64, eres: f64) -> (u32, u32) {
    let mut m: i64 = 10_000_000;
    while m > 1 && ((m as f64 / eres).abs() > 1.0e6 || (m as f64 / mres).abs() > 1.0e6) {
        m /= 10;
    }
    let num = (m as f64 / eres).abs().round() as u32;
    let den = (m as f64 / mres).abs().round() as u32;
    (num, den)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_ratio_unity_when_resolutions_match() {
        let (num, den) = encoder_ratio(1.0, 1.0);
        assert_eq!(num, den);
    }

    #[test]
    fn encoder_ratio_stays_within_1e6_each_side() {
        let (num, den) = encoder_ratio(0.0000001, 1.0);
        assert!(num <= 1_000_000);
        assert!(den <= 1_000_000);
    }

    #[test]
    fn sanitize_resolution_defends_against_zero() {
        let mut p = Params {
            mres: 1e-12,
            eres: 0.0,
            ..Params::default()
        };
        assert!(p.sanitize_resolution());
        assert_eq!(p.mres, 1.0);
        assert_eq!(p.eres, 1.0);
    }

    #[test]
    fn deadband_invariant_grows_rdbd_not_shrinks_sdbd() {
        let mut p = Params {
            sdbd: 0.5,
            rdbd: 0.1,
            ..Params::default()
        };
        p.enforce_min_retry_deadband();
        assert!(p.rdbd >= p.sdbd);
        assert_eq!(p.sdbd, 0.5);
    }

    #[test]
    fn effective_sdbd_falls_back_to_mres() {
        let p = Params {
            sdbd: 0.0,
            mres: -0.25,
            ..Params::default()
        };
        assert_eq!(p.effective_sdbd(), 0.25);
    }

    #[test]
    fn velocity_family_respects_vmax_ceiling() {
        let mut p = Params {
            mres: 1.0,
            srev: 200.0,
            s: 100.0,  // velo would be 200*100 = 20000
            sbas: 1.0, // vbas = 200
            sbak: 50.0,
            smax: 10.0, // vmax = 2000
            jvel: 5000.0,
            hvel: 5000.0,
            ..Params::default()
        };
        p.clamp_velocity_family();
        let vmax = p.vmax();
        assert!(p.velo() <= vmax + 1e-6);
        assert!(p.vbas() <= p.velo() + 1e-6);
        assert!(p.bvel_derived() <= vmax + 1e-6);
        assert!(p.jvel <= vmax + 1e-6);
        assert!(p.hvel <= vmax + 1e-6);
    }

    #[test]
    fn frac_write_is_clamped() {
        let mut p = Params::default();
        p.set_frac(5.0);
        assert_eq!(p.frac, 1.5);
        p.set_frac(0.0);
        assert_eq!(p.frac, 0.1);
    }
}
