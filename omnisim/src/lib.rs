#![no_std]

#[allow(unused_imports)]
use micromath::F32Ext;
use omnicore::{
    drive::{wheel_to_chassis_velocity, WheelPowers},
    estimate::EncoderDeltas,
    hardware::{Hardware, Mechanism},
    pose::{normalize_angle, Pose},
};
use typed_builder::TypedBuilder;
use uom::si::{
    angle::radian,
    f32::{Angle, AngularVelocity, Length, Time, Velocity},
    length::meter,
};

/// Kinematic mecanum chassis model.
///
/// Wheel powers applied in one cycle move an ideal chassis for one
/// period; the tracking-wheel encoders are synthesized from the
/// resulting ground-truth displacement, with fractional ticks carried
/// over so quantization does not accumulate into drift.
#[derive(TypedBuilder)]
pub struct Simulator {
    period: Time,
    /// Chassis speed at full forward power.
    top_speed: Velocity,
    /// Turn rate at full rotational power.
    #[builder(default = AngularVelocity { value: 4.0, dimension: core::marker::PhantomData, units: core::marker::PhantomData })]
    top_turn_rate: AngularVelocity,
    ticks_per_rev: f32,
    wheel_circumference: Length,
    track_width: Length,
    lateral_offset: Length,
    pose: Pose,
    #[builder(default, setter(skip))]
    powers: WheelPowers,
    #[builder(default = [0.0; 3], setter(skip))]
    tick_carry: [f32; 3],
}

impl Simulator {
    /// Ground-truth pose, for assertions.
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    fn step(&mut self) -> EncoderDeltas {
        let command = wheel_to_chassis_velocity(&self.powers);

        let forward = self.top_speed * command.vx * self.period;
        let strafe = self.top_speed * command.vy * self.period;
        let dtheta =
            (self.top_turn_rate * command.omega * self.period).value;

        let (s, c) = if dtheta.abs() < 1e-4 {
            (1.0 - dtheta * dtheta / 6.0, dtheta / 2.0)
        } else {
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

        // Tracking-wheel distances implied by the body-frame motion.
        let left = forward - self.track_width / 2.0 * dtheta;
        let right = forward + self.track_width / 2.0 * dtheta;
        let lateral = strafe + self.lateral_offset * dtheta;

        let scale = self.ticks_per_rev / self.wheel_circumference.get::<meter>();
        let mut quantize = |distance: Length, carry: &mut f32| {
            let ticks = distance.get::<meter>() * scale + *carry;
            let whole = ticks as i32;
            *carry = ticks - whole as f32;
            whole
        };
        let [mut cl, mut cr, mut cs] = self.tick_carry;
        let deltas = EncoderDeltas {
            left: quantize(left, &mut cl),
            right: quantize(right, &mut cr),
            lateral: quantize(lateral, &mut cs),
        };
        self.tick_carry = [cl, cr, cs];
        deltas
    }
}

impl Hardware for Simulator {
    fn read_encoder_deltas(&mut self) -> EncoderDeltas {
        // Integrates the powers written last cycle, so the deltas read
        // at the top of a cycle describe the motion since then.
        self.step()
    }

    fn set_wheel_powers(&mut self, powers: &WheelPowers) {
        self.powers = *powers;
    }

    fn imu_heading(&mut self) -> Option<Angle> {
        Some(self.pose.theta)
    }
}

/// Staged lift stub: every command takes a fixed number of cycles to
/// settle.
#[derive(TypedBuilder)]
pub struct SimLift {
    #[builder(default = 25)]
    settle_cycles: u32,
    #[builder(default = 0, setter(skip))]
    remaining: u32,
    #[builder(default = 0, setter(skip))]
    layer: u8,
    #[builder(default = false, setter(skip))]
    latch_retracted: bool,
}

impl SimLift {
    /// Advances the mechanism model by one cycle.
    pub fn step(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    pub fn layer(&self) -> u8 {
        self.layer
    }

    pub fn latch_retracted(&self) -> bool {
        self.latch_retracted
    }
}

impl Mechanism for SimLift {
    fn set_layer(&mut self, layer: u8) {
        self.layer = layer;
        self.remaining = self.settle_cycles;
    }

    fn retract_latch(&mut self) {
        self.latch_retracted = true;
        self.remaining = self.settle_cycles;
    }

    fn is_settled(&self) -> bool {
        self.remaining == 0
    }
}
