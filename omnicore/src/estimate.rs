use core::marker::PhantomData;

#[allow(unused_imports)]
use micromath::F32Ext;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uom::si::{
    angle::radian,
    f32::{Angle, Length},
};

use crate::pose::{normalize_angle, Pose};

/// Signed tick counts read from the three tracking wheels since the
/// previous cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderDeltas {
    pub left: i32,
    pub right: i32,
    pub lateral: i32,
}

/// Accumulated raw tick counts, kept for drift diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickTotals {
    pub left: i64,
    pub right: i64,
    pub lateral: i64,
}

/// Dead-reckoning pose estimator over two parallel tracking wheels and
/// one perpendicular wheel, independent of the drive wheels.
///
/// `update` must be called exactly once per control cycle. Encoders must
/// be zeroed before the first call and stay monotonic for the whole run;
/// a mid-run counter reset is an upstream contract violation that this
/// estimator neither detects nor recovers from.
#[derive(Debug, TypedBuilder)]
pub struct Localizer {
    ticks_per_rev: f32,
    wheel_circumference: Length,
    /// Separation between the two parallel tracking wheels.
    track_width: Length,
    /// Forward offset of the perpendicular wheel from the turning center.
    lateral_offset: Length,
    #[builder(default = Angle { value: 1e-4, dimension: PhantomData, units: PhantomData })]
    approx_th: Angle,
    pose: Pose,
    #[builder(default, setter(skip))]
    totals: TickTotals,
}

impl Localizer {
    pub fn update(
        &mut self,
        &EncoderDeltas {
            left,
            right,
            lateral,
        }: &EncoderDeltas,
    ) -> Pose {
        self.totals.left += left as i64;
        self.totals.right += right as i64;
        self.totals.lateral += lateral as i64;

        let tick = self.wheel_circumference / self.ticks_per_rev;
        let ldist = tick * left as f32;
        let rdist = tick * right as f32;
        let sdist = tick * lateral as f32;

        let dtheta = ((rdist - ldist) / self.track_width).value;
        let forward = (ldist + rdist) / 2.0;
        // The perpendicular wheel reads its own arc during rotation.
        let strafe = sdist - self.lateral_offset * dtheta;

        let (s, c) = if dtheta.abs() < self.approx_th.value {
            // straight approximation
            (1.0 - dtheta * dtheta / 6.0, dtheta / 2.0)
        } else {
            // arc approximation
            (dtheta.sin() / dtheta, (1.0 - dtheta.cos()) / dtheta)
        };
        let dx = forward * s - strafe * c;
        let dy = forward * c + strafe * s;

        let sin_th = self.pose.theta.value.sin();
        let cos_th = self.pose.theta.value.cos();
        self.pose = Pose {
            x: self.pose.x + dx * cos_th - dy * sin_th,
            y: self.pose.y + dx * sin_th + dy * cos_th,
            theta: normalize_angle(self.pose.theta + Angle::new::<radian>(dtheta)),
        };
        self.pose
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Overwrites the estimated heading with an external reference
    /// (e.g. an IMU read), leaving the position untouched.
    pub fn correct_heading(&mut self, heading: Angle) {
        self.pose.theta = normalize_angle(heading);
    }

    pub fn tick_totals(&self) -> &TickTotals {
        &self.totals
    }
}
