//! Narrow command interface to the low-level motor driver.
//!
//! The wire protocol to an actual controller (serial, CAN, whatever) is out
//! of scope here, the same way `Clue88-OmniTiles::drivers` sits "above the
//! raw `hw/` layer and below the application logic": this trait is the
//! application-facing shape every concrete driver must present, independent
//! of how it gets there.

/// Raw hardware status snapshot, read back once per [`crate::coordinator::AxisCore::process`]
/// pass.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverStatus {
    /// Raw motor step position.
    pub raw_pos: i32,
    /// Raw encoder count, meaningful only if `encoder_present`.
    pub raw_enc: i32,
    /// Motor currently in motion.
    pub moving: bool,
    /// Current/last raw direction of travel: `true` = positive raw steps.
    pub direction: bool,
    pub plus_ls: bool,
    pub minus_ls: bool,
    pub home_switch: bool,
    /// Motor slipped or stalled (closed-loop drivers only).
    pub slip_stall: bool,
    /// Transient communication fault with the controller.
    pub comm_error: bool,
    /// Latched hard fault (overcurrent, driver fault line, etc).
    pub fault: bool,
    /// Driver supports closed-loop gain tuning (`set_p_gain`/etc).
    pub gain_support: bool,
    pub encoder_present: bool,
    /// Driver supports holding position against load at rest.
    pub position_maintenance: bool,
}

/// Asynchronous notification a driver may deliver outside of a polled
/// `get_info` call, e.g. via an interrupt-driven callback.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverEvent {
    /// Nothing new since the last pass; proceed with polled status only.
    NothingDone,
    /// The driver completed unprompted motion (e.g. a hardware-triggered
    /// stop) and is reporting fresh status data to fold in immediately.
    CallbackData,
    /// The controller has new high/low travel limits to report; these
    /// should be clipped against `DHLM`/`DLLM` before being treated as
    /// ordinary `CallbackData` (spec.md §4, status projector).
    NewLimits { high: f64, low: f64 },
}

/// Failure reported by a driver command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    /// The controller did not respond in time.
    Timeout,
    /// The controller is present but rejected the command (bad argument,
    /// wrong mode, etc).
    Rejected,
    /// Transport-level failure (bus error, framing, parity).
    CommFault,
    /// Operation not supported by this driver (e.g. gain tuning on an
    /// open-loop stepper).
    Unsupported,
}

/// Commands the coordinator issues to a concrete motor driver.
///
/// Every method may fail with a [`DriverError`]; the coordinator treats any
/// such failure as a transient comm alarm (spec.md §7) rather than aborting
/// `process()`.
pub trait Driver {
    fn start(&mut self) -> Result<(), DriverError>;
    fn stop(&mut self) -> Result<(), DriverError>;

    /// Force the driver's notion of raw position to `raw_pos`, without
    /// commanding motion (`LOAD_POS`).
    fn load_pos(&mut self, raw_pos: i32) -> Result<(), DriverError>;

    /// Poll for current status and any asynchronous event.
    fn get_info(&mut self) -> Result<(DriverStatus, DriverEvent), DriverError>;

    fn set_high_limit(&mut self, raw_pos: i32) -> Result<(), DriverError>;
    fn set_low_limit(&mut self, raw_pos: i32) -> Result<(), DriverError>;

    /// Velocity, in raw steps/sec.
    fn set_velocity(&mut self, steps_per_sec: f64) -> Result<(), DriverError>;
    /// Base (start/stop) velocity, in raw steps/sec.
    fn set_vel_base(&mut self, steps_per_sec: f64) -> Result<(), DriverError>;
    /// Acceleration time to full velocity, in seconds.
    fn set_accel(&mut self, seconds: f64) -> Result<(), DriverError>;

    fn move_abs(&mut self, raw_target: i32) -> Result<(), DriverError>;
    fn move_rel(&mut self, raw_delta: i32) -> Result<(), DriverError>;

    /// Begin jogging in the given raw direction (`true` = positive).
    fn jog(&mut self, positive: bool) -> Result<(), DriverError>;
    /// Update the velocity of an in-progress jog without stopping it.
    fn update_jog(&mut self, steps_per_sec: f64) -> Result<(), DriverError>;

    fn home_fwd(&mut self) -> Result<(), DriverError>;
    fn home_rev(&mut self) -> Result<(), DriverError>;

    /// Release a Pause, resuming a Go.
    fn go(&mut self) -> Result<(), DriverError>;

    /// Program the encoder/step ratio as `(num, den)` from
    /// [`crate::params::encoder_ratio`].
    fn set_enc_ratio(&mut self, num: u32, den: u32) -> Result<(), DriverError>;

    fn enable_torque(&mut self) -> Result<(), DriverError>;
    fn disable_torque(&mut self) -> Result<(), DriverError>;

    fn set_p_gain(&mut self, gain: f64) -> Result<(), DriverError>;
    fn set_i_gain(&mut self, gain: f64) -> Result<(), DriverError>;
    fn set_d_gain(&mut self, gain: f64) -> Result<(), DriverError>;

    /// Called once when the axis is being torn down; drivers that hold onto
    /// a handle (socket, DMA channel) release it here.
    fn end(&mut self) -> Result<(), DriverError>;
}
