//! End-to-end scenario tests against a fake in-memory driver, covering the
//! six walkthroughs in spec.md §8.

use axis_core::{AxisCore, Dir, Driver, DriverError, DriverEvent, DriverStatus, LogLevel, Mip, Params};
use axis_core::coordinator::Stimulus;

#[derive(Default)]
struct FakeDriver {
    status: DriverStatus,
    move_abs_calls: Vec<i32>,
    move_rel_calls: Vec<i32>,
    jogs: u32,
    home_fwd_calls: u32,
    home_rev_calls: u32,
    stops: u32,
}

impl FakeDriver {
    fn idle_at(raw_pos: i32) -> Self {
        FakeDriver {
            status: DriverStatus {
                raw_pos,
                raw_enc: raw_pos,
                moving: false,
                direction: true,
                plus_ls: false,
                minus_ls: false,
                home_switch: false,
                slip_stall: false,
                comm_error: false,
                fault: false,
                gain_support: false,
                encoder_present: false,
                position_maintenance: false,
            },
            ..Default::default()
        }
    }
}

impl Driver for FakeDriver {
    fn start(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
    fn stop(&mut self) -> Result<(), DriverError> {
        self.stops += 1;
        self.status.moving = false;
        Ok(())
    }
    fn load_pos(&mut self, raw_pos: i32) -> Result<(), DriverError> {
        self.status.raw_pos = raw_pos;
        Ok(())
    }
    fn get_info(&mut self) -> Result<(DriverStatus, DriverEvent), DriverError> {
        Ok((self.status, DriverEvent::NothingDone))
    }
    fn set_high_limit(&mut self, _raw_pos: i32) -> Result<(), DriverError> {
        Ok(())
    }
    fn set_low_limit(&mut self, _raw_pos: i32) -> Result<(), DriverError> {
        Ok(())
    }
    fn set_velocity(&mut self, _v: f64) -> Result<(), DriverError> {
        Ok(())
    }
    fn set_vel_base(&mut self, _v: f64) -> Result<(), DriverError> {
        Ok(())
    }
    fn set_accel(&mut self, _a: f64) -> Result<(), DriverError> {
        Ok(())
    }
    fn move_abs(&mut self, raw_target: i32) -> Result<(), DriverError> {
        self.move_abs_calls.push(raw_target);
        self.status.raw_pos = raw_target;
        self.status.moving = false;
        Ok(())
    }
    fn move_rel(&mut self, raw_delta: i32) -> Result<(), DriverError> {
        self.move_rel_calls.push(raw_delta);
        self.status.raw_pos += raw_delta;
        self.status.moving = false;
        Ok(())
    }
    fn jog(&mut self, positive: bool) -> Result<(), DriverError> {
        self.jogs += 1;
        self.status.direction = positive;
        self.status.moving = true;
        Ok(())
    }
    fn update_jog(&mut self, _v: f64) -> Result<(), DriverError> {
        Ok(())
    }
    fn home_fwd(&mut self) -> Result<(), DriverError> {
        self.home_fwd_calls += 1;
        self.status.moving = true;
        Ok(())
    }
    fn home_rev(&mut self) -> Result<(), DriverError> {
        self.home_rev_calls += 1;
        self.status.moving = true;
        Ok(())
    }
    fn go(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
    fn set_enc_ratio(&mut self, _num: u32, _den: u32) -> Result<(), DriverError> {
        Ok(())
    }
    fn enable_torque(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
    fn disable_torque(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
    fn set_p_gain(&mut self, _g: f64) -> Result<(), DriverError> {
        Ok(())
    }
    fn set_i_gain(&mut self, _g: f64) -> Result<(), DriverError> {
        Ok(())
    }
    fn set_d_gain(&mut self, _g: f64) -> Result<(), DriverError> {
        Ok(())
    }
    fn end(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

fn axis_with(params: Params) -> AxisCore {
    AxisCore::new(params, LogLevel::Off)
}

/// Scenario 1: simple absolute move, MRES=1, DIR=Pos, OFF=0, VAL=10, DRBV=0,
/// BDST=0, RTRY=0 -> one MoveAbs(10); on completion DMOV=True, RBV=10.
#[test]
fn simple_absolute_move_completes_with_rbv_at_target() {
    let params = Params {
        mres: 1.0,
        eres: 1.0,
        dir: Dir::Pos,
        off: 0.0,
        rtry: 0,
        bdst: 0.0,
        ..Params::default()
    };
    let mut axis = axis_with(params);
    let mut drv = FakeDriver::idle_at(0);

    axis.val = 10.0;
    axis.dval = 10.0;
    axis.process(Stimulus::FieldWrite, &mut drv);
    assert_eq!(drv.move_abs_calls, vec![10]);
    assert!(axis.mip.contains(Mip::MOVE));

    axis.process(Stimulus::DriverCallback(DriverEvent::NothingDone), &mut drv);
    assert!(axis.mip.is_done());
    assert!(axis.dmov);
    assert!((axis.rbv - 10.0).abs() < 1e-9);
}

/// Scenario 2: backlash move against the preferred direction, MRES=1,
/// BDST=-2, VAL=10, DRBV=0 -> first leg MoveAbs(12) (DVAL-BDST), with a
/// second leg pending (`PP` set) to land on the true target at BVEL/BACC.
#[test]
fn backlash_against_preferred_direction_issues_overshoot_leg_first() {
    let params = Params {
        mres: 1.0,
        eres: 1.0,
        dir: Dir::Pos,
        off: 0.0,
        rtry: 0,
        bdst: -2.0,
        ..Params::default()
    };
    let mut axis = axis_with(params);
    let mut drv = FakeDriver::idle_at(0);

    axis.val = 10.0;
    axis.dval = 10.0;
    axis.process(Stimulus::FieldWrite, &mut drv);

    assert_eq!(drv.move_abs_calls, vec![12]);
    assert!(axis.pp, "second backlash leg must still be pending");
    assert!(axis.mip.contains(Mip::MOVE));
}

/// Scenario 3: retry with arithmetic mode. RTRY=3, RMOD=Arithmetic,
/// RDBD=0.1, DVAL=5, DRBV=4.8 (after the first leg), UEIP=Yes, RCNT=1 (this
/// is the second leg) -> MoveRel(0.2 * (3-1+1)/3) = MoveRel(0.2).
#[test]
fn arithmetic_retry_scales_the_relative_move_by_remaining_attempts() {
    use axis_core::{Rmod, Set};

    let params = Params {
        mres: 0.01,
        eres: 0.01,
        dir: Dir::Pos,
        off: 0.0,
        rtry: 3,
        rmod: Rmod::Arithmetic,
        rdbd: 0.1,
        sdbd: 0.01,
        bdst: 0.0,
        ueip: true,
        ..Params::default()
    };
    let mut axis = axis_with(params);
    let mut drv = FakeDriver::idle_at(500);

    axis.dval = 5.0;
    axis.drbv = 4.8;
    axis.rcnt = 1;
    axis.mip = Mip::RETRY;
    axis.set = Set::Use;

    axis.process(Stimulus::ScanOnce, &mut drv);

    assert_eq!(drv.move_rel_calls, vec![20]);
}

/// Scenario 4: limit violation cancels a move. DHLM=5, DLLM=-5, write VAL=10
/// -> LVIO=1, stop raised, VAL/DVAL reverted, MIP=Done, DMOV=True.
#[test]
fn limit_violation_cancels_move_and_reverts_target() {
    let params = Params {
        mres: 1.0,
        eres: 1.0,
        dir: Dir::Pos,
        off: 0.0,
        dhlm: 5.0,
        dllm: -5.0,
        ..Params::default()
    };
    let mut axis = axis_with(params);
    let mut drv = FakeDriver::idle_at(0);

    axis.val = 10.0;
    axis.process(Stimulus::FieldWrite, &mut drv);

    assert!(drv.move_abs_calls.is_empty());
    assert!(axis.lvio);
    assert!(axis.mip.is_done());
    assert!(axis.dmov);
    assert_eq!(axis.val, 0.0);
    assert_eq!(axis.dval, 0.0);
}

/// Scenario 5: jog then release. JOGF=1 with DMOV=True -> Jog(+JVEL);
/// JOGF->0 while moving -> Stop, MIP becomes JogStop.
#[test]
fn jog_then_release_stops_the_motor() {
    let params = Params {
        mres: 1.0,
        eres: 1.0,
        dir: Dir::Pos,
        off: 0.0,
        jvel: 2.0,
        ..Params::default()
    };
    let mut axis = axis_with(params);
    let mut drv = FakeDriver::idle_at(0);

    axis.jogf = true;
    axis.process(Stimulus::FieldWrite, &mut drv);
    assert_eq!(drv.jogs, 1);
    assert!(axis.mip.contains(Mip::JOG_F));
    assert!(!axis.dmov);

    axis.jogf = false;
    axis.process(Stimulus::FieldWrite, &mut drv);
    assert_eq!(drv.stops, 1);
    assert_eq!(axis.mip, Mip::JOG_STOP);
    assert!(axis.pp);
}

/// Scenario 6: home forward with MRES<0 emits HomeRev because the raw
/// direction of "home forward" (dial-positive) is inverted; CDIR=0 (false).
#[test]
fn home_forward_with_negative_mres_emits_home_rev() {
    let params = Params {
        mres: -0.5,
        eres: -0.5,
        dir: Dir::Pos,
        off: 0.0,
        hvel: 1.0,
        ..Params::default()
    };
    let mut axis = axis_with(params);
    let mut drv = FakeDriver::idle_at(0);

    axis.homf = true;
    axis.process(Stimulus::FieldWrite, &mut drv);

    assert_eq!(drv.home_rev_calls, 1);
    assert_eq!(drv.home_fwd_calls, 0);
    assert!(!axis.cdir);
    assert!(axis.mip.contains(Mip::HOM_F));
}
