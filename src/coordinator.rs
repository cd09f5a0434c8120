//! The `AxisCore` record: `process()` and the MIP machine.
//!
//! Given the current [`crate::mip::Mip`] state and the latest stimulus, this
//! decides what driver command sequence to issue and how to update `MIP`.
//! Every other module in this crate exists to be used from here.

use num_traits::float::Float;

use crate::alarm::{AlarmSeverity, AlarmStatus};
use crate::changes::{ChangeTracker, Changed};
use crate::coord;
use crate::coord::Dir;
use crate::delay::DelayTimer;
use crate::driver::{Driver, DriverEvent, DriverStatus};
use crate::limits::{self, LimitCheck};
use crate::log::LogLevel;
use crate::mip::{Foff, Mip, Rmod, Set, Spmg};
use crate::params::Params;
use crate::status::Readback;
use crate::{axis_debug, axis_info, axis_trace, axis_warn};

/// What triggered this `process()` invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stimulus {
    /// A supervisor field write landed (after the containing framework's
    /// `special()` pre/post hooks ran).
    FieldWrite,
    /// The driver delivered an asynchronous status event.
    DriverCallback(DriverEvent),
    /// The settle-delay timer expired.
    DelayFired,
    /// An internal rescan with no new external input.
    ScanOnce,
}

/// Shadow of the last committed values, used for change detection and
/// rollback (spec.md §3, "last-values shadow").
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct LastValues {
    val: f64,
    dval: f64,
    rval: i32,
    rlv: f64,
    dmov: bool,
    alst: AlarmStatus,
    mlst: AlarmSeverity,
    mres: f64,
    eres: f64,
    ueip: bool,
}

/// The axis record's full mutable state and the single entry point that
/// advances it.
pub struct AxisCore {
    pub log_level: LogLevel,
    pub params: Params,

    pub pact: bool,

    // Motion state
    pub mip: Mip,
    pub dmov: bool,
    pub movn: bool,
    pub cdir: bool,
    /// Raw direction of the last driver-reported status read, independent of
    /// `cdir`: telemetry, not the coordinator's own command.
    pub tdir: bool,
    pub pp: bool,
    pub rcnt: u32,
    pub spmg: Spmg,
    pub set: Set,
    pub foff: Foff,
    pub lvio: bool,

    // Supervisor-facing request buttons/fields
    pub jogf: bool,
    pub jogr: bool,
    pub homf: bool,
    pub homr: bool,
    pub twf: bool,
    pub twr: bool,
    pub rlv: f64,
    pub stop_req: bool,
    pub stup: bool,

    // Coordinates
    pub val: f64,
    pub dval: f64,
    pub rval: i32,
    pub rbv: f64,
    pub drbv: f64,
    pub rrbv: i32,
    pub hlm: f64,
    pub llm: f64,

    // Alarms
    pub alarm_status: AlarmStatus,
    pub alarm_severity: AlarmSeverity,
    pub miss: bool,
    pub udf: bool,

    pub changes: ChangeTracker,
    pub delay: DelayTimer,

    last: LastValues,
    now: f64,
}

impl AxisCore {
    pub fn new(mut params: Params, log_level: LogLevel) -> Self {
        let (hlm, llm) = coord::dial_limits_to_user(params.dhlm, params.dllm, params.dir, params.off);
        params.sanitize_resolution();
        params.enforce_min_retry_deadband();
        let last = LastValues {
            mres: params.mres,
            eres: params.eres,
            ueip: params.ueip,
            ..LastValues::default()
        };
        AxisCore {
            log_level,
            params,
            pact: false,
            mip: Mip::empty(),
            dmov: true,
            movn: false,
            cdir: false,
            tdir: false,
            pp: false,
            rcnt: 0,
            spmg: Spmg::Go,
            set: Set::Use,
            foff: Foff::Variable,
            lvio: false,
            jogf: false,
            jogr: false,
            homf: false,
            homr: false,
            twf: false,
            twr: false,
            rlv: 0.0,
            stop_req: false,
            stup: false,
            val: 0.0,
            dval: 0.0,
            rval: 0,
            rbv: 0.0,
            drbv: 0.0,
            rrbv: 0,
            hlm,
            llm,
            alarm_status: AlarmStatus::Undefined,
            alarm_severity: AlarmSeverity::Invalid,
            miss: false,
            udf: true,
            changes: ChangeTracker::new(),
            delay: DelayTimer::new(),
            last,
            now: 0.0,
        }
    }

    /// Advance the record's notion of elapsed time. The containing
    /// framework calls this (or folds it into `process`) with a monotonic
    /// clock reading; the delay timer is the only consumer.
    pub fn tick(&mut self, now: f64) {
        self.now = now;
        self.delay.poll(now);
    }

    /// The single serialized entry point (spec.md §4.1).
    pub fn process<D: Driver>(&mut self, stimulus: Stimulus, driver: &mut D) {
        if self.pact {
            return;
        }
        self.pact = true;
        self.run(stimulus, driver);
        self.pact = false;
    }

    fn run<D: Driver>(&mut self, stimulus: Stimulus, driver: &mut D) {
        axis_trace!(self.log_level, "process: stimulus={:?}", stimulus);

        // 1/2: fold in driver status on a callback or delay-ack.
        let is_callback = matches!(stimulus, Stimulus::DriverCallback(_));
        if let Stimulus::DriverCallback(event) = stimulus {
            self.handle_driver_event(event, driver);
        }
        if matches!(stimulus, Stimulus::DelayFired) {
            self.delay.acknowledge();
            self.mip.remove(Mip::DELAY_REQ);
            self.mip.insert(Mip::DELAY_ACK);
        }

        // mark a real MRES/ERES/UEIP change so try_resolution_change has
        // something other than a tautology to branch on.
        if self.params.mres != self.last.mres || self.params.ueip != self.last.ueip {
            self.changes.mark(Changed::MRES);
        }
        if self.params.eres != self.last.eres {
            self.changes.mark(Changed::ERES);
        }
        self.last.mres = self.params.mres;
        self.last.eres = self.params.eres;
        self.last.ueip = self.params.ueip;

        // 3: recompute LVIO.
        let was_lvio = self.lvio;
        self.lvio = limits::lvio(self.dval, self.params.dhlm, self.params.dllm);
        if limits::lvio_rising_edge(was_lvio, self.lvio) {
            self.changes.mark(Changed::LVIO);
            self.stop_req = true;
            if !matches!(self.set, Set::Set) {
                self.jogf = false;
                self.jogr = false;
                self.homf = false;
                self.homr = false;
            }
            axis_warn!(self.log_level, "soft limit violation latched");
        }

        // 4: invoke do_work when warranted.
        let should_run = self.stop_req
            || matches!(self.spmg, Spmg::Pause | Spmg::Stop)
            || !is_callback
            || self.dmov
            || self.mip.contains(Mip::RETRY);
        if should_run {
            self.do_work(driver);
        }

        // 5/6: alarm severity, change tracker flush, forward-scan.
        self.recompute_alarm();
        let dmov_rising = !self.last.dmov && self.dmov;
        let _flushed = self.changes.flush();
        if dmov_rising {
            axis_info!(self.log_level, "motion complete, forward scan");
        }
        self.last.dmov = self.dmov;
        self.last.alst = self.alarm_status;
        self.last.mlst = self.alarm_severity;
    }

    fn handle_driver_event<D: Driver>(&mut self, event: DriverEvent, driver: &mut D) {
        if let Some(clipped) = crate::status::clip_new_limits(event, self.params.dhlm, self.params.dllm) {
            self.params.dhlm = clipped.dhlm;
            self.params.dllm = clipped.dllm;
            self.changes.mark(Changed::DHLM);
            self.changes.mark(Changed::DLLM);
        }
        match driver.get_info() {
            Ok((status, _)) => self.fold_status(&status),
            Err(err) => {
                self.alarm_status = AlarmStatus::Comm;
                axis_warn!(self.log_level, "get_info failed: {:?}", err);
            }
        }
        self.complete_and_postprocess(driver);
    }

    fn fold_status(&mut self, status: &DriverStatus) {
        let rb = Readback::project(
            status,
            self.params.ueip,
            self.params.mres,
            self.params.eres,
            self.params.dir,
            self.params.off,
        );
        self.rrbv = rb.rrbv;
        self.drbv = rb.drbv;
        self.rbv = rb.rbv;
        self.movn = rb.moving;
        self.tdir = rb.tdir;
        self.changes.mark(Changed::RBV);
        self.changes.mark(Changed::DRBV);
        self.changes.mark(Changed::RRBV);
        self.changes.mark(Changed::TDIR);

        if status.comm_error {
            self.alarm_status = AlarmStatus::Comm;
        } else if status.slip_stall || status.fault {
            self.alarm_status = AlarmStatus::State;
            if self.params.stop_on_problem {
                self.stop_req = true;
            }
        }

        if self.movn {
            self.dmov = false;
            if self.mip.is_done() {
                self.mip.insert(Mip::EXTERNAL);
                self.pp = true;
            }
        }
    }

    /// Completion handling for a driver callback (spec.md §4.6), run
    /// whenever `MOVN` transitions to `false` outside a bare STUP cycle.
    fn complete_and_postprocess<D: Driver>(&mut self, driver: &mut D) {
        if self.movn || self.stup {
            return;
        }

        if !self.last.dmov && (self.mip == Mip::JOG_F || self.mip == Mip::JOG_R) {
            self.finish_in_position();
            self.jogf = false;
            self.jogr = false;
            self.pp = true;
            return;
        }

        if self.limit_hit_in_direction_of_travel() {
            let _ = driver.get_info();
            self.mip = Mip::empty();
            self.pp = true;
            self.dmov = true;
            return;
        }

        if self.pp {
            if self.val != self.last.val && !self.stop_req {
                self.try_move_decision(driver, false);
                return;
            }
            self.post_process(driver);
        }

        if self.params.dly > 0.0 && !self.delay.is_armed() && !self.delay.is_fired() {
            self.mip.insert(Mip::DELAY_REQ);
            self.delay.arm(self.now, self.params.dly);
            self.dmov = false;
            return;
        }
        if self.mip.contains(Mip::DELAY_ACK) || self.params.dly <= 0.0 {
            self.mip.remove(Mip::DELAY_ACK);
            self.maybe_retry(driver);
        }
    }

    fn limit_hit_in_direction_of_travel(&self) -> bool {
        (self.cdir && self.rbv >= self.hlm && limits::limits_defined(self.params.dhlm, self.params.dllm))
            || (!self.cdir && self.rbv <= self.llm && limits::limits_defined(self.params.dhlm, self.params.dllm))
    }

    /// Post-processing run once driver-reported motion has fully settled
    /// (spec.md §4.6).
    fn post_process<D: Driver>(&mut self, driver: &mut D) {
        let in_move_or_backlash = self.mip.intersects(Mip::MOVE | Mip::MOVE_BL);
        if !in_move_or_backlash && !self.params.closed_loop_input {
            self.val = self.rbv;
            self.dval = self.drbv;
            self.rval = coord::dial_to_raw(self.dval, self.params.mres);
            self.changes.mark(Changed::VAL);
            self.changes.mark(Changed::DVAL);
            self.changes.mark(Changed::RVAL);
        }

        if self.mip.contains(Mip::LOAD_POS) {
            self.mip = Mip::empty();
            self.finish_in_position();
            return;
        }

        if self.mip.intersects(Mip::HOM_F | Mip::HOM_R) {
            if self.mip.contains(Mip::STOP) {
                // resume home after a layered stop
                self.mip.remove(Mip::STOP);
            } else {
                self.homf = false;
                self.homr = false;
                self.mip.remove(Mip::HOM_F | Mip::HOM_R);
                self.finish_in_position();
            }
            return;
        }

        if self.mip.intersects(Mip::JOG_STOP | Mip::MOVE) {
            if self.params.bdst.abs() >= self.params.effective_sdbd() {
                self.mip.remove(Mip::JOG_STOP | Mip::MOVE);
                self.mip.insert(Mip::MOVE_BL);
                self.issue_backlash_leg(driver);
            } else {
                self.mip.remove(Mip::JOG_STOP | Mip::MOVE);
                self.finish_in_position();
            }
            return;
        }

        if self.mip.contains(Mip::JOG_BL1) {
            self.mip.remove(Mip::JOG_BL1);
            self.mip.insert(Mip::JOG_BL2);
            self.issue_backlash_leg(driver);
        }
    }

    fn issue_backlash_leg<D: Driver>(&mut self, driver: &mut D) {
        let raw_target = coord::dial_to_raw(self.dval, self.params.mres);
        let _ = driver.start();
        let _ = driver.set_velocity(self.params.bvel_derived().abs() / self.params.mres.abs());
        let _ = driver.set_vel_base(self.params.vbas() / self.params.mres.abs());
        if self.params.bacc_backlash > 0.0 {
            let _ = driver.set_accel(self.params.bacc_backlash);
        }
        let _ = driver.move_abs(raw_target);
        let _ = driver.go();
        let _ = driver.end();
        self.cdir = coord::raw_direction(self.dval - self.drbv, self.params.mres);
        self.dmov = false;
        self.pp = true;
    }

    /// Retry evaluation (spec.md §4.7).
    fn maybe_retry<D: Driver>(&mut self, driver: &mut D) {
        let diff = self.dval - self.drbv;
        let ucdir = if (self.params.dir == Dir::Pos) == (self.params.mres >= 0.0) {
            self.cdir
        } else {
            !self.cdir
        };
        // limit-switch pinning is reported through the status projector as
        // part of `rbv`/`hlm`/`llm`; approximate here with the same
        // direction-of-travel check used for completion.
        let limit_pinned = self.limit_hit_in_direction_of_travel() && ucdir == self.cdir;

        if diff.abs() >= self.params.rdbd && !limit_pinned {
            if self.params.rtry == 0 {
                self.finish_in_position();
                return;
            }
            self.rcnt += 1;
            if self.rcnt > self.params.rtry {
                self.miss = true;
                self.alarm_status = AlarmStatus::Miss;
                self.finish_in_position();
                return;
            }
            self.mip.insert(Mip::RETRY);
            self.dmov = false;
            if self.params.rmod == Rmod::InPosition {
                self.mip.insert(Mip::DELAY_REQ);
                self.delay.arm(self.now, self.params.dly);
                return;
            }
            self.try_move_decision(driver, true);
            return;
        }

        self.miss = false;
        if self.alarm_status == AlarmStatus::Miss {
            self.alarm_status = AlarmStatus::NoAlarm;
        }
        if self.spmg == Spmg::Move {
            self.spmg = Spmg::Pause;
            self.changes.mark(Changed::SPMG);
        }
        self.finish_in_position();
    }

    /// Commit `MIP=Done`, `DMOV=True`, and reset `RCNT` exactly once
    /// (spec.md §4.7 supplement): this is the single place retry count is
    /// cleared, so a later unrelated move doesn't inherit a stale count.
    fn finish_in_position(&mut self) {
        self.mip = Mip::empty();
        self.dmov = true;
        self.rcnt = 0;
        self.changes.mark(Changed::MIP);
        self.changes.mark(Changed::DMOV);
        self.changes.mark(Changed::RCNT);
    }

    // ---- MIP machine (do_work), spec.md §4.2 ----------------------------

    fn do_work<D: Driver>(&mut self, driver: &mut D) {
        if self.try_stup(driver) {
            return;
        }
        if self.try_spmg_or_stop(driver) {
            return;
        }
        if self.try_resolution_change(driver) {
            return;
        }
        if self.try_closed_loop_input() {
            // falls through intentionally, per spec.md §4.2 item 4
        }
        if self.try_home_request(driver) {
            return;
        }
        if self.try_jog_request(driver) {
            return;
        }
        if self.try_stop_jog(driver) {
            return;
        }
        self.apply_tweak();
        self.apply_relative_move();
        self.apply_raw_write();
        self.apply_val_change();
        self.try_move_decision(driver, self.mip.contains(Mip::RETRY));
    }

    fn try_stup<D: Driver>(&mut self, driver: &mut D) -> bool {
        if !self.stup {
            return false;
        }
        let _ = driver.get_info();
        self.stup = false;
        true
    }

    fn try_spmg_or_stop<D: Driver>(&mut self, driver: &mut D) -> bool {
        let stop_like = self.stop_req || self.spmg == Spmg::Stop;
        if stop_like {
            if self.mip.is_done() || self.mip == Mip::STOP || self.mip.contains(Mip::RETRY) {
                let _ = driver.start();
                let _ = driver.stop();
                let _ = driver.end();
                self.stop_req = false;
                return true;
            }
            if self.movn {
                self.pp = true;
                self.jogf = false;
                self.jogr = false;
                self.homf = false;
                self.homr = false;
                let pending_delay = self.mip.contains(Mip::DELAY_REQ);
                self.mip = Mip::STOP;
                if pending_delay {
                    self.mip.insert(Mip::DELAY_REQ);
                }
                let _ = driver.start();
                let _ = driver.stop();
                let _ = driver.end();
                self.stop_req = false;
                return true;
            }
            self.val = self.rbv;
            self.dval = self.drbv;
            self.rval = coord::dial_to_raw(self.dval, self.params.mres);
            self.changes.mark(Changed::VAL);
            self.changes.mark(Changed::DVAL);
            self.changes.mark(Changed::RVAL);
            self.stop_req = false;
            return true;
        }

        if self.spmg == Spmg::Pause && self.movn {
            self.pp = true;
            let pending_delay = self.mip.contains(Mip::DELAY_REQ);
            self.mip = Mip::STOP;
            if pending_delay {
                self.mip.insert(Mip::DELAY_REQ);
            }
            let _ = driver.start();
            let _ = driver.stop();
            let _ = driver.end();
            return true;
        }

        if self.spmg == Spmg::Go {
            let limits_active = limits::limits_defined(self.params.dhlm, self.params.dllm);
            let limit_blocks = limits_active
                && ((self.jogf && self.rbv > self.hlm - self.params.jvel)
                    || (self.jogr && self.rbv < self.llm + self.params.jvel));
            if (self.jogf || self.jogr) && !limit_blocks {
                self.mip.insert(Mip::JOG_REQ);
            }
            if self.mip == Mip::STOP {
                self.mip = Mip::empty();
            }
        }
        false
    }

    fn try_resolution_change<D: Driver>(&mut self, driver: &mut D) -> bool {
        if !self.changes.is_marked(Changed::MRES) && !self.changes.is_marked(Changed::ERES) {
            return false;
        }
        self.params.sanitize_resolution();
        let (num, den) = crate::params::encoder_ratio(self.params.mres, self.params.eres);
        let _ = driver.start();
        let _ = driver.set_enc_ratio(num, den);
        let _ = driver.end();
        self.params.enforce_min_retry_deadband();
        if self.set == Set::Set {
            let raw = coord::dial_to_raw(self.dval, self.params.mres);
            let _ = driver.start();
            let _ = driver.load_pos(raw);
            let _ = driver.end();
            self.mip.insert(Mip::LOAD_POS);
            return true;
        }
        false
    }

    fn try_closed_loop_input(&mut self) -> bool {
        self.params.closed_loop_input
    }

    fn try_home_request<D: Driver>(&mut self, driver: &mut D) -> bool {
        if !(self.homf || self.homr) || self.mip.intersects(Mip::HOM_F | Mip::HOM_R) {
            return false;
        }
        let going_positive = self.homf;
        let limits_active = limits::limits_defined(self.params.dhlm, self.params.dllm);
        let on_directed_limit = limits_active
            && ((going_positive && self.rbv >= self.hlm) || (!going_positive && self.rbv <= self.llm));
        if on_directed_limit && !self.params.home_on_limit {
            return false;
        }

        self.pp = true;
        self.mip = if going_positive { Mip::HOM_F } else { Mip::HOM_R };
        if self.movn {
            let _ = driver.start();
            let _ = driver.stop();
            let _ = driver.end();
            self.mip.insert(Mip::STOP);
            return true;
        }

        let hvel_raw = self.params.hvel / self.params.mres.abs();
        let vbas_raw = self.params.vbas() / self.params.mres.abs();
        let accel = if self.params.accl > 0.0 {
            (self.params.hvel - self.params.vbas()) / self.params.accl
        } else {
            0.0
        };
        // HOMF/HOMR name the dial/user direction of approach; MRES<0 inverts
        // which raw-hardware direction that corresponds to (spec.md §8
        // scenario 6: HOMF with MRES<0 emits HomeRev, not HomeFwd).
        let raw_positive = going_positive != (self.params.mres < 0.0);
        self.cdir = raw_positive;

        let _ = driver.start();
        let _ = driver.set_velocity(hvel_raw);
        let _ = driver.set_vel_base(vbas_raw);
        if accel > 0.0 {
            let _ = driver.set_accel(accel);
        }
        if raw_positive {
            let _ = driver.home_fwd();
        } else {
            let _ = driver.home_rev();
        }
        let _ = driver.go();
        let _ = driver.end();
        self.dmov = false;
        true
    }

    fn try_jog_request<D: Driver>(&mut self, driver: &mut D) -> bool {
        if self.spmg == Spmg::Pause || !self.mip.contains(Mip::JOG_REQ) {
            return false;
        }
        if self.mip.intersects(Mip::JOG_F | Mip::JOG_R) {
            return false;
        }
        let going_positive = self.jogf;
        // JVEL-margin check against the user-coordinate travel limits: a jog
        // that would run off the end of travel before the motor can stop is
        // blocked up front, in user coordinates (HLM/LLM), not dial.
        let limits_active = limits::limits_defined(self.params.dhlm, self.params.dllm);
        let blocked = limits_active
            && ((going_positive && self.val > self.hlm - self.params.jvel)
                || (!going_positive && self.val < self.llm + self.params.jvel));
        self.mip.remove(Mip::JOG_REQ);
        if blocked {
            self.lvio = true;
            self.changes.mark(Changed::LVIO);
            return true;
        }

        if self.movn {
            self.pp = true;
            let _ = driver.start();
            let _ = driver.stop();
            let _ = driver.end();
            self.mip.insert(Mip::STOP);
            return true;
        }

        self.mip.insert(if going_positive { Mip::JOG_F } else { Mip::JOG_R });
        let raw_vel = self.params.jvel * self.params.dir.sign() / self.params.mres;
        self.cdir = raw_vel >= 0.0;
        let _ = driver.start();
        let _ = driver.set_vel_base(self.params.vbas() / self.params.mres.abs());
        if self.params.jar > 0.0 {
            let _ = driver.set_accel(self.params.jar);
        }
        let _ = driver.jog(self.cdir);
        let _ = driver.end();
        self.dmov = false;
        true
    }

    fn try_stop_jog<D: Driver>(&mut self, driver: &mut D) -> bool {
        let jogging = self.mip.intersects(Mip::JOG_F | Mip::JOG_R);
        let released = jogging && !self.jogf && !self.jogr;
        if !released {
            return false;
        }
        self.pp = true;
        self.mip.remove(Mip::JOG_F | Mip::JOG_R);
        self.mip.insert(Mip::JOG_STOP);
        let _ = driver.start();
        let _ = driver.stop();
        let _ = driver.end();
        true
    }

    fn apply_tweak(&mut self) {
        if self.twf {
            self.val += self.params.s; // TWV stand-in: a dedicated field would
            self.twf = false;          // normally hold this; see DESIGN.md.
            self.changes.mark(Changed::VAL);
        }
        if self.twr {
            self.val -= self.params.s;
            self.twr = false;
            self.changes.mark(Changed::VAL);
        }
    }

    fn apply_relative_move(&mut self) {
        if self.rlv != 0.0 {
            self.val += self.rlv;
            self.rlv = 0.0;
            self.changes.mark(Changed::VAL);
        }
    }

    fn apply_raw_write(&mut self) {
        if self.changes.is_marked(Changed::RVAL) {
            self.dval = coord::raw_to_dial(self.rval, self.params.mres);
            self.changes.mark(Changed::DVAL);
        }
    }

    fn apply_val_change(&mut self) {
        if self.val == self.last.val {
            return;
        }
        if self.set == Set::Set && self.foff == Foff::Variable {
            self.params.off = self.val - self.dval * self.params.dir.sign();
            self.changes.mark(Changed::VAL);
            let (hlm, llm) = coord::dial_limits_to_user(
                self.params.dhlm,
                self.params.dllm,
                self.params.dir,
                self.params.off,
            );
            self.hlm = hlm;
            self.llm = llm;
            self.last.val = self.val;
            return;
        }
        self.dval = coord::user_to_dial(self.val, self.params.dir, self.params.off);
        self.changes.mark(Changed::DVAL);
        self.last.val = self.val;
    }

    /// Move decision (spec.md §4.3), `is_retry` selects the retry scaling
    /// branch and `MoveRel` eligibility.
    fn try_move_decision<D: Driver>(&mut self, driver: &mut D, is_retry: bool) {
        self.val = coord::dial_to_user(self.dval, self.params.dir, self.params.off);
        self.rval = coord::dial_to_raw(self.dval, self.params.mres);
        self.changes.mark(Changed::VAL);
        self.changes.mark(Changed::RVAL);

        let diff = self.dval - self.drbv;
        let absdiff = diff.abs();

        let threshold = if is_retry {
            self.params.rdbd
        } else {
            self.params.effective_sdbd()
        };
        if absdiff < threshold {
            self.finish_in_position();
            self.dval = self.last.dval;
            self.val = self.last.val;
            return;
        }

        if !is_retry {
            self.rcnt = 0;
        }

        let factor = match self.params.rmod {
            Rmod::Default => 1.0,
            Rmod::Arithmetic => {
                (self.params.rtry as f64 - self.rcnt as f64 + 1.0) / self.params.rtry.max(1) as f64
            }
            Rmod::Geometric => 1.0 / 2f64.powi(self.rcnt.max(1) as i32 - 1),
            Rmod::InPosition => return,
        };

        let preferred_dir = self.params.bdst == 0.0 || diff.signum() == self.params.bdst.signum();

        let intermediate = self.dval - self.params.bdst;
        let check = if self.params.bdst != 0.0 {
            limits::check_target_with_backlash(
                self.dval,
                intermediate,
                self.drbv,
                self.params.dhlm,
                self.params.dllm,
                preferred_dir,
            )
        } else {
            limits::check_target(self.dval, self.drbv, self.params.dhlm, self.params.dllm)
        };
        if check != LimitCheck::Ok {
            self.stop_req = true;
            self.val = self.last.val;
            self.dval = self.last.dval;
            if !self.lvio {
                self.lvio = true;
                self.changes.mark(Changed::LVIO);
            }
            self.finish_in_position();
            return;
        }

        if self.mip.is_done() || self.mip.contains(Mip::RETRY) {
            self.do_retry_or_done(driver, diff, factor, preferred_dir);
        }

        self.last.val = self.val;
        self.last.dval = self.dval;
        self.last.rval = self.rval;
    }

    fn do_retry_or_done<D: Driver>(&mut self, driver: &mut D, diff: f64, factor: f64, preferred_dir: bool) {
        let sdbd = self.params.effective_sdbd();
        let relpos = (diff * factor).abs().max(sdbd) * diff.signum();

        let use_rel = self.params.rtry > 0
            && self.params.rmod != Rmod::InPosition
            && (self.params.ueip || self.params.urip);

        let single_leg_unscaled = self.params.bdst.abs() < sdbd
            || (preferred_dir && self.params.bvel_derived() == self.params.velo() && self.params.bacc_backlash == self.params.accl);
        let already_in_backlash_range = preferred_dir && !single_leg_unscaled;

        self.cdir = coord::raw_direction(diff, self.params.mres);

        let _ = driver.start();
        if single_leg_unscaled {
            let _ = driver.set_velocity(self.params.velo() / self.params.mres.abs());
            let _ = driver.set_vel_base(self.params.vbas() / self.params.mres.abs());
            if self.params.accl > 0.0 {
                let _ = driver.set_accel((self.params.velo() - self.params.vbas()) / self.params.accl);
            }
            self.issue_positional_move(driver, use_rel, relpos, self.dval);
        } else if already_in_backlash_range {
            let _ = driver.set_velocity(self.params.bvel_derived() / self.params.mres.abs());
            let _ = driver.set_vel_base(self.params.vbas() / self.params.mres.abs());
            if self.params.bacc_backlash > 0.0 {
                let _ = driver.set_accel((self.params.bvel_derived() - self.params.vbas()) / self.params.bacc_backlash);
            }
            self.issue_positional_move(driver, use_rel, relpos, self.dval);
        } else {
            let _ = driver.set_velocity(self.params.velo() / self.params.mres.abs());
            let _ = driver.set_vel_base(self.params.vbas() / self.params.mres.abs());
            if self.params.accl > 0.0 {
                let _ = driver.set_accel((self.params.velo() - self.params.vbas()) / self.params.accl);
            }
            let intermediate = self.dval - self.params.bdst;
            self.issue_positional_move(driver, use_rel, relpos, intermediate);
            self.pp = true;
        }
        let _ = driver.go();
        let _ = driver.end();

        self.mip.insert(Mip::MOVE);
        self.dmov = false;
    }

    fn issue_positional_move<D: Driver>(&mut self, driver: &mut D, use_rel: bool, relpos: f64, dial_target: f64) {
        if use_rel {
            let raw_delta = coord::dial_to_raw(relpos, self.params.mres);
            let _ = driver.move_rel(raw_delta);
        } else {
            let raw_target = coord::dial_to_raw(dial_target, self.params.mres);
            let _ = driver.move_abs(raw_target);
        }
    }

    fn recompute_alarm(&mut self) {
        self.alarm_severity = if self.udf {
            AlarmSeverity::Invalid
        } else if self.lvio {
            AlarmSeverity::Major
        } else if self.miss {
            self.params.misv
        } else {
            self.alarm_status.default_severity()
        };
        self.changes.mark(Changed::SEVR);
        self.changes.mark(Changed::STAT);
    }
}
