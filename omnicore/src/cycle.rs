use serde::Serialize;
use typed_builder::TypedBuilder;

use crate::drive::{ChassisCommand, DriveMapper, WheelPowers};
use crate::estimate::Localizer;
use crate::hardware::Hardware;
use crate::path::{PurePursuit, Subroutine};
use crate::pose::Pose;

/// One-way telemetry record emitted once per cycle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub pose: Pose,
    pub waypoint_index: usize,
    pub command: ChassisCommand,
    pub finished: bool,
}

/// Owns one autonomous run: localizer, tracker and output mapper wired
/// into the fixed per-cycle order {read sensors, estimate pose, track,
/// map, write actuators}. The pose is always re-estimated before the
/// tracker consults it.
#[derive(Debug, TypedBuilder)]
pub struct Navigator<S, const N: usize> {
    localizer: Localizer,
    tracker: PurePursuit<S, N>,
    mapper: DriveMapper,
}

impl<S, const N: usize> Navigator<S, N> {
    pub fn cycle<H, C>(&mut self, hardware: &mut H, ctx: &mut C) -> Snapshot
    where
        H: Hardware,
        S: Subroutine<C>,
    {
        hardware.on_cycle_start();
        let deltas = hardware.read_encoder_deltas();
        let pose = self.localizer.update(&deltas);
        let command = self.tracker.update(&pose, ctx);
        hardware.set_wheel_powers(&self.mapper.map(&command));
        hardware.on_cycle_end();

        Snapshot {
            pose,
            waypoint_index: self.tracker.waypoint_index(),
            command,
            finished: self.tracker.finished(),
        }
    }

    /// Global stop: zeroes the drive immediately and abandons the path
    /// and any active subroutine.
    pub fn abort<H>(&mut self, hardware: &mut H)
    where
        H: Hardware,
    {
        self.tracker.abort();
        hardware.set_wheel_powers(&WheelPowers::STOP);
    }

    pub fn pose(&self) -> &Pose {
        self.localizer.pose()
    }

    pub fn finished(&self) -> bool {
        self.tracker.finished()
    }
}
