#[allow(unused_imports)]
use micromath::F32Ext;
use serde::{Deserialize, Serialize};
use uom::si::{
    angle::radian,
    f32::{Angle, Length},
    length::meter,
};

/// Field-frame position and heading of the robot.
///
/// Headings are kept normalized to (-pi, pi]; every operation that adds
/// to the heading renormalizes before returning.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Pose {
    pub x: Length,
    pub y: Length,
    pub theta: Angle,
}

impl Pose {
    pub fn new(x: Length, y: Length, theta: Angle) -> Self {
        Self {
            x,
            y,
            theta: normalize_angle(theta),
        }
    }

    /// Applies a field-frame offset.
    pub fn translated(&self, dx: Length, dy: Length) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            theta: self.theta,
        }
    }

    pub fn rotated_by(&self, dtheta: Angle) -> Self {
        Self {
            x: self.x,
            y: self.y,
            theta: normalize_angle(self.theta + dtheta),
        }
    }

    /// Reflects the pose across the field centerline for the opposite
    /// alliance side: y is negated and the heading mirrored.
    pub fn mirrored(&self) -> Self {
        Self {
            x: self.x,
            y: -self.y,
            theta: normalize_angle(-self.theta),
        }
    }

    pub fn distance_to(&self, other: &Pose) -> Length {
        let dx = (other.x - self.x).get::<meter>();
        let dy = (other.y - self.y).get::<meter>();
        Length::new::<meter>((dx * dx + dy * dy).sqrt())
    }
}

/// Normalizes an angle to (-pi, pi].
///
/// Total for any finite input, including values many multiples of a
/// full turn away.
pub fn normalize_angle(angle: Angle) -> Angle {
    use core::f32::consts::{PI, TAU};

    let raw_angle = angle.value.rem_euclid(TAU);

    Angle::new::<radian>(if raw_angle > PI {
        raw_angle - TAU
    } else {
        raw_angle
    })
}
