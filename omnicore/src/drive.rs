#[allow(unused_imports)]
use micromath::F32Ext;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Desired chassis velocity in the robot frame, in normalized power
/// units: x forward, y left, omega counterclockwise, each in [-1, 1].
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ChassisCommand {
    pub vx: f32,
    pub vy: f32,
    pub omega: f32,
}

impl ChassisCommand {
    pub const ZERO: Self = Self {
        vx: 0.0,
        vy: 0.0,
        omega: 0.0,
    };

    pub fn magnitude(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }
}

/// Normalized powers for the four drive wheels.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct WheelPowers {
    pub front_left: f32,
    pub front_right: f32,
    pub back_left: f32,
    pub back_right: f32,
}

impl WheelPowers {
    pub const STOP: Self = Self {
        front_left: 0.0,
        front_right: 0.0,
        back_left: 0.0,
        back_right: 0.0,
    };
}

/// Mecanum inverse kinematics.
///
/// When the raw mix exceeds the unit range, all four powers are scaled
/// down together so the commanded direction survives saturation.
pub fn chassis_to_wheel_powers(command: &ChassisCommand) -> WheelPowers {
    let &ChassisCommand { vx, vy, omega } = command;
    let raw = WheelPowers {
        front_left: vx - vy - omega,
        front_right: vx + vy + omega,
        back_left: vx + vy - omega,
        back_right: vx - vy + omega,
    };

    let max = raw
        .front_left
        .abs()
        .max(raw.front_right.abs())
        .max(raw.back_left.abs())
        .max(raw.back_right.abs())
        .max(1.0);
    WheelPowers {
        front_left: raw.front_left / max,
        front_right: raw.front_right / max,
        back_left: raw.back_left / max,
        back_right: raw.back_right / max,
    }
}

/// Mecanum forward kinematics, the inverse of [`chassis_to_wheel_powers`].
pub fn wheel_to_chassis_velocity(powers: &WheelPowers) -> ChassisCommand {
    let &WheelPowers {
        front_left: fl,
        front_right: fr,
        back_left: bl,
        back_right: br,
    } = powers;
    ChassisCommand {
        vx: (fl + fr + bl + br) / 4.0,
        vy: (-fl + fr + bl - br) / 4.0,
        omega: (-fl + fr - bl + br) / 4.0,
    }
}

/// Final output stage: clamps each wheel power into the actuator's legal
/// symmetric range and zeroes commands below the deadband so the motors
/// do not hum around zero.
#[derive(Debug, TypedBuilder)]
pub struct DriveMapper {
    #[builder(default = 1.0)]
    max_power: f32,
    #[builder(default = 0.05)]
    deadband: f32,
}

impl DriveMapper {
    pub fn map(&self, command: &ChassisCommand) -> WheelPowers {
        let raw = chassis_to_wheel_powers(command);
        WheelPowers {
            front_left: self.shape(raw.front_left),
            front_right: self.shape(raw.front_right),
            back_left: self.shape(raw.back_left),
            back_right: self.shape(raw.back_right),
        }
    }

    fn shape(&self, power: f32) -> f32 {
        let clamped = power.clamp(-self.max_power, self.max_power);
        if clamped.abs() < self.deadband {
            0.0
        } else {
            clamped
        }
    }
}
