//! User / dial / raw-step coordinate transforms.
//!
//! Three coordinate systems coexist for every axis: **user** (engineering
//! units, what an operator types), **dial** (raw units with the sign of the
//! hardware), and **raw steps** (the integer the driver actually counts).
//! All three must stay mutually consistent after any single write — see
//! spec.md §3 and §8 invariant 2/3.

use num_traits::float::Float;

/// Direction sign applied between user and dial coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dir {
    Pos,
    Neg,
}

impl Dir {
    /// `+1.0` for `Pos`, `-1.0` for `Neg`.
    #[inline]
    pub const fn sign(self) -> f64 {
        match self {
            Dir::Pos => 1.0,
            Dir::Neg => -1.0,
        }
    }
}

impl Default for Dir {
    fn default() -> Self {
        Dir::Pos
    }
}

/// `VAL = DVAL * dir + OFF`
#[inline]
pub fn dial_to_user(dval: f64, dir: Dir, off: f64) -> f64 {
    dval * dir.sign() + off
}

/// `DVAL = (VAL - OFF) / dir`
#[inline]
pub fn user_to_dial(val: f64, dir: Dir, off: f64) -> f64 {
    (val - off) / dir.sign()
}

/// `RVAL = round(DVAL / MRES)`
///
/// `mres` is used signed, per spec.md §3 ("All coordinate maths uses `MRES`
/// as signed").
#[inline]
pub fn dial_to_raw(dval: f64, mres: f64) -> i32 {
    (dval / mres).round() as i32
}

/// `DVAL = RVAL * MRES`
#[inline]
pub fn raw_to_dial(rval: i32, mres: f64) -> f64 {
    rval as f64 * mres
}

/// Dial-coordinate high/low limits mapped to user coordinates.
///
/// ```text
/// HLM = (dir>0) ?  DHLM+OFF : -DLLM+OFF
/// LLM = (dir>0) ?  DLLM+OFF : -DHLM+OFF
/// ```
#[inline]
pub fn dial_limits_to_user(dhlm: f64, dllm: f64, dir: Dir, off: f64) -> (f64, f64) {
    match dir {
        Dir::Pos => (dhlm + off, dllm + off),
        Dir::Neg => (-dllm + off, -dhlm + off),
    }
}

/// Commanded raw direction of travel for a dial-coordinate move: the sign of
/// `diff` XOR the sign of `MRES` (spec.md §4.5).
///
/// Returns `true` for the "forward"/raw-high direction, `false` otherwise.
#[inline]
pub fn raw_direction(diff: f64, mres: f64) -> bool {
    (diff >= 0.0) != (mres < 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_user_dial_is_identity() {
        for dir in [Dir::Pos, Dir::Neg] {
            let off = 3.25;
            let val = 17.5;
            let dval = user_to_dial(val, dir, off);
            let back = dial_to_user(dval, dir, off);
            assert!((back - val).abs() < 1e-9, "{:?}: {} != {}", dir, back, val);
        }
    }

    #[test]
    fn raw_round_trips_on_exact_multiples() {
        let mres = 0.01;
        let dval = 1.23;
        let rval = dial_to_raw(dval, mres);
        assert_eq!(rval, 123);
        let back = raw_to_dial(rval, mres);
        assert!((back - dval).abs() < 1e-9);
    }

    #[test]
    fn neg_dir_inverts_limit_mapping() {
        let (hlm, llm) = dial_limits_to_user(10.0, -5.0, Dir::Pos, 0.0);
        assert_eq!((hlm, llm), (10.0, -5.0));

        let (hlm, llm) = dial_limits_to_user(10.0, -5.0, Dir::Neg, 0.0);
        assert_eq!((hlm, llm), (5.0, -10.0));
    }

    #[test]
    fn negative_mres_inverts_raw_direction() {
        assert_eq!(raw_direction(5.0, 1.0), true);
        assert_eq!(raw_direction(5.0, -1.0), false);
        assert_eq!(raw_direction(-5.0, 1.0), false);
        assert_eq!(raw_direction(-5.0, -1.0), true);
    }
}
