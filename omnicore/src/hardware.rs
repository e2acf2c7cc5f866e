use uom::si::f32::Angle;

use crate::drive::WheelPowers;
use crate::estimate::EncoderDeltas;

/// The hardware layer the navigation core drives.
///
/// Implementations must zero the tracking-wheel encoders before the
/// first `read_encoder_deltas` and keep them monotonic for the whole
/// run.
pub trait Hardware {
    /// Called at the top of every control cycle, before any reads.
    fn on_cycle_start(&mut self) {}

    /// Tick deltas accumulated since the previous call.
    fn read_encoder_deltas(&mut self) -> EncoderDeltas;

    fn set_wheel_powers(&mut self, powers: &WheelPowers);

    /// External heading reference, when one is fitted. Unused by the
    /// primary estimator; available for drift correction.
    fn imu_heading(&mut self) -> Option<Angle> {
        None
    }

    /// Called after actuator writes, for timing instrumentation.
    fn on_cycle_end(&mut self) {}
}

/// A discrete mechanism that subroutines command and poll.
///
/// Commands return immediately; `is_settled` reports whether the last
/// command has physically completed. Subroutines poll this instead of
/// blocking the control cycle.
pub trait Mechanism {
    fn set_layer(&mut self, layer: u8);

    fn retract_latch(&mut self);

    fn is_settled(&self) -> bool;
}
