use core::marker::PhantomData;

use heapless::Vec;
#[allow(unused_imports)]
use micromath::F32Ext;
use typed_builder::TypedBuilder;
use uom::si::{
    angle::radian,
    f32::{Angle, Length},
    length::meter,
};

use crate::drive::ChassisCommand;
use crate::pose::{normalize_angle, Pose};

/// A resumable unit of work attached to a waypoint.
///
/// Polled at most once per control cycle; returns `true` exactly once,
/// on the cycle its work completes, and is discarded afterward. `C` is
/// the robot context the task acts on (typically a mechanism handle).
pub trait Subroutine<C> {
    fn run_cycle(&mut self, ctx: &mut C) -> bool;
}

/// Placeholder task type for paths that carry no subroutines.
#[derive(Debug)]
pub enum NoSubroutine {}

impl<C> Subroutine<C> for NoSubroutine {
    fn run_cycle(&mut self, _ctx: &mut C) -> bool {
        match *self {}
    }
}

/// Caps an inner subroutine to a fixed cycle budget, for tasks that
/// poll a mechanism which may never settle.
#[derive(Debug)]
pub struct Timed<S> {
    inner: S,
    remaining: u32,
}

impl<S> Timed<S> {
    pub fn new(inner: S, cycles: u32) -> Self {
        Self {
            inner,
            remaining: cycles,
        }
    }
}

impl<C, S> Subroutine<C> for Timed<S>
where
    S: Subroutine<C>,
{
    fn run_cycle(&mut self, ctx: &mut C) -> bool {
        if self.remaining == 0 {
            return true;
        }
        self.remaining -= 1;
        self.inner.run_cycle(ctx) || self.remaining == 0
    }
}

/// One node of a pure-pursuit path.
///
/// Immutable once the path is built, apart from the one-time alliance
/// mirror applied before the run starts.
#[derive(Debug, TypedBuilder)]
pub struct Waypoint<S> {
    pub target: Pose,
    #[builder(default = Length { value: 0.05, dimension: PhantomData, units: PhantomData })]
    pub arrival_radius: Length,
    /// Traversal speed toward this waypoint, in (0, 1].
    pub speed: f32,
    /// Explicit heading to hold; overrides facing along the direction
    /// of travel.
    #[builder(default, setter(strip_option))]
    pub heading: Option<Angle>,
    #[builder(default, setter(strip_option))]
    pub subroutine: Option<S>,
    /// Blocking waypoints hold the path until their subroutine
    /// completes; non-blocking ones let it run while travel continues.
    #[builder(default = false)]
    pub blocking: bool,
}

impl<S> Waypoint<S> {
    fn mirror(&mut self) {
        self.target = self.target.mirrored();
        self.heading = self.heading.map(|h| normalize_angle(-h));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Following,
    Finished,
}

/// Pure-pursuit waypoint tracker.
///
/// Owns the ordered waypoint sequence and walks it one control cycle at
/// a time: `update` takes the freshly estimated pose and returns the
/// chassis velocity to command. Paths are authored for the canonical
/// (blue) field side; `mirrored` produces the other side's path.
#[derive(Debug, TypedBuilder)]
pub struct PurePursuit<S, const N: usize> {
    waypoints: Vec<Waypoint<S>, N>,
    /// Distance at which the speed ramp-down toward a target begins.
    #[builder(default = Length { value: 0.3, dimension: PhantomData, units: PhantomData })]
    decel_threshold: Length,
    #[builder(default = 2.0)]
    turn_gain: f32,
    /// Lower bound on the commanded speed while unfinished, so the ramp
    /// cannot stall short of the arrival radius.
    #[builder(default = 0.0)]
    min_speed: f32,
    #[builder(default = 0, setter(skip))]
    index: usize,
    #[builder(default = State::Following, setter(skip))]
    state: State,
    #[builder(default, setter(skip))]
    active: Option<S>,
    #[builder(default, setter(skip))]
    blocked_on: Option<S>,
    #[builder(default = (0.0, 0.0), setter(skip))]
    last_direction: (f32, f32),
    #[builder(default = false, setter(skip))]
    mirror_applied: bool,
}

impl<S, const N: usize> PurePursuit<S, N> {
    /// Reflects every waypoint for the opposite alliance side.
    ///
    /// Idempotent: applying it to an already mirrored path is a no-op.
    /// Must be called before the first `update`.
    pub fn mirrored(mut self) -> Self {
        if !self.mirror_applied {
            for waypoint in &mut self.waypoints {
                waypoint.mirror();
            }
            self.mirror_applied = true;
        }
        self
    }

    pub fn finished(&self) -> bool {
        self.state == State::Finished || self.waypoints.is_empty()
    }

    pub fn waypoint_index(&self) -> usize {
        self.index
    }

    /// External cancellation: drops any active subroutine without
    /// polling it again and pins the tracker at `Finished`.
    pub fn abort(&mut self) {
        self.active = None;
        self.blocked_on = None;
        self.state = State::Finished;
    }

    /// Advances the tracker by one control cycle.
    ///
    /// Detects arrival at the current target, dispatches and polls
    /// subroutines (each at most once per cycle), advances the waypoint
    /// index, and computes the velocity command toward the active
    /// target. Must be called with the pose estimated this same cycle.
    pub fn update<C>(&mut self, pose: &Pose, ctx: &mut C) -> ChassisCommand
    where
        S: Subroutine<C>,
    {
        if self.finished() {
            return ChassisCommand::ZERO;
        }

        // Arrival and advancement; may pass several coincident
        // waypoints in one cycle.
        while self.state == State::Following {
            let waypoint = &mut self.waypoints[self.index];
            if pose.distance_to(&waypoint.target) > waypoint.arrival_radius {
                break;
            }
            if let Some(subroutine) = waypoint.subroutine.take() {
                if waypoint.blocking {
                    self.blocked_on = Some(subroutine);
                } else {
                    // A lingering interrupt from an earlier waypoint is
                    // dropped in favor of the new one.
                    self.active = Some(subroutine);
                }
            }
            if self.blocked_on.is_some() {
                break;
            }
            self.advance();
        }

        if let Some(subroutine) = self.blocked_on.as_mut() {
            if subroutine.run_cycle(ctx) {
                self.blocked_on = None;
                self.advance();
            }
        }
        if let Some(subroutine) = self.active.as_mut() {
            if subroutine.run_cycle(ctx) {
                self.active = None;
            }
        }

        if self.state == State::Finished {
            return ChassisCommand::ZERO;
        }
        self.command_toward(pose)
    }

    fn advance(&mut self) {
        if self.index + 1 < self.waypoints.len() {
            self.index += 1;
        } else {
            self.state = State::Finished;
        }
    }

    fn command_toward(&mut self, pose: &Pose) -> ChassisCommand {
        let waypoint = &self.waypoints[self.index];
        let dx = (waypoint.target.x - pose.x).get::<meter>();
        let dy = (waypoint.target.y - pose.y).get::<meter>();
        let distance = (dx * dx + dy * dy).sqrt();

        let direction = if distance > f32::EPSILON {
            let direction = (dx / distance, dy / distance);
            self.last_direction = direction;
            direction
        } else {
            // Coincident with the target: fall back to the previous
            // cycle's direction (zero at the start of the path).
            self.last_direction
        };

        let threshold = self.decel_threshold.get::<meter>();
        let ramp = if distance < threshold {
            distance / threshold
        } else {
            1.0
        };
        let speed = (waypoint.speed * ramp).max(self.min_speed);

        let desired_heading = waypoint.heading.unwrap_or_else(|| {
            if direction == (0.0, 0.0) {
                pose.theta
            } else {
                Angle::new::<radian>(direction.1.atan2(direction.0))
            }
        });
        let heading_error = normalize_angle(desired_heading - pose.theta).value;

        // Field-frame travel direction expressed in the robot frame.
        let sin_th = pose.theta.value.sin();
        let cos_th = pose.theta.value.cos();
        ChassisCommand {
            vx: (direction.0 * cos_th + direction.1 * sin_th) * speed,
            vy: (-direction.0 * sin_th + direction.1 * cos_th) * speed,
            omega: (self.turn_gain * heading_error).clamp(-1.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use uom::si::angle::degree;

    use super::*;

    /// Completes after a fixed number of polls, counting every poll in
    /// the shared context.
    #[derive(Debug)]
    struct CountDown {
        cycles_left: u32,
    }

    impl Subroutine<u32> for CountDown {
        fn run_cycle(&mut self, polls: &mut u32) -> bool {
            *polls += 1;
            self.cycles_left -= 1;
            self.cycles_left == 0
        }
    }

    fn pose(x: f32, y: f32) -> Pose {
        Pose::new(
            Length::new::<meter>(x),
            Length::new::<meter>(y),
            Angle::default(),
        )
    }

    fn waypoint(x: f32, y: f32, speed: f32) -> Waypoint<CountDown> {
        Waypoint::builder()
            .target(pose(x, y))
            .arrival_radius(Length::new::<meter>(0.1))
            .speed(speed)
            .build()
    }

    fn tracker<const N: usize>(
        waypoints: Vec<Waypoint<CountDown>, N>,
    ) -> PurePursuit<CountDown, N> {
        PurePursuit::builder().waypoints(waypoints).build()
    }

    #[test]
    fn empty_path_is_immediately_finished() {
        let mut tracker = tracker::<4>(Vec::new());
        assert!(tracker.finished());
        let command = tracker.update(&pose(0.0, 0.0), &mut 0);
        assert_eq!(command, ChassisCommand::ZERO);
    }

    #[test]
    fn single_waypoint_inside_radius_finishes_in_one_update() {
        let mut waypoints = Vec::<_, 1>::new();
        waypoints
            .push(
                Waypoint::builder()
                    .target(pose(1.0, 0.0))
                    .arrival_radius(Length::new::<meter>(2.0))
                    .speed(0.5)
                    .build(),
            )
            .unwrap();
        let mut tracker = tracker(waypoints);

        assert!(!tracker.finished());
        tracker.update(&pose(0.0, 0.0), &mut 0);
        assert!(tracker.finished());
    }

    #[test]
    fn coincident_waypoints_are_passed_without_nan() {
        let mut waypoints = Vec::<_, 3>::new();
        for _ in 0..3 {
            waypoints.push(waypoint(1.0, 1.0, 0.5)).unwrap();
        }
        let mut tracker = tracker(waypoints);

        let command = tracker.update(&pose(1.0, 1.0), &mut 0);
        assert!(tracker.finished());
        assert!(command.vx.is_finite() && command.vy.is_finite());
        assert_eq!(command, ChassisCommand::ZERO);
    }

    #[test]
    fn commands_point_toward_target() {
        let mut waypoints = Vec::<_, 1>::new();
        waypoints.push(waypoint(2.0, 0.0, 0.8)).unwrap();
        let mut tracker = tracker(waypoints);

        let command = tracker.update(&pose(0.0, 0.0), &mut 0);
        assert_relative_eq!(command.vx, 0.8, epsilon = 1e-6);
        assert_relative_eq!(command.vy, 0.0, epsilon = 1e-6);
        assert_relative_eq!(command.omega, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn deceleration_ramp_is_monotonic() {
        let mut waypoints = Vec::<_, 1>::new();
        waypoints.push(waypoint(1.0, 0.0, 1.0)).unwrap();
        let mut tracker = tracker(waypoints);

        let mut last = f32::INFINITY;
        for distance in [0.5, 0.29, 0.25, 0.2, 0.15, 0.11] {
            let command = tracker.update(&pose(1.0 - distance, 0.0), &mut 0);
            let magnitude = command.magnitude();
            assert!(magnitude <= last + 1e-6);
            last = magnitude;
        }
        assert!(!tracker.finished());
    }

    #[test]
    fn explicit_heading_overrides_tangent_facing() {
        let mut waypoints = Vec::<_, 1>::new();
        waypoints
            .push(
                Waypoint::builder()
                    .target(pose(1.0, 0.0))
                    .speed(0.5)
                    .heading(Angle::new::<degree>(45.0))
                    .build(),
            )
            .unwrap();
        let mut tracker = tracker(waypoints);

        // Travel direction is +x (zero heading error when facing the
        // tangent), so any turn command comes from the override.
        let command = tracker.update(&pose(0.0, 0.0), &mut 0);
        assert!(command.omega > 0.0);
    }

    #[test]
    fn blocking_subroutine_holds_then_advances() {
        let mut waypoints = Vec::<_, 2>::new();
        waypoints
            .push(
                Waypoint::builder()
                    .target(pose(1.0, 0.0))
                    .arrival_radius(Length::new::<meter>(0.1))
                    .speed(0.5)
                    .subroutine(CountDown { cycles_left: 2 })
                    .blocking(true)
                    .build(),
            )
            .unwrap();
        waypoints.push(waypoint(2.0, 0.0, 0.5)).unwrap();
        let mut tracker = tracker(waypoints);
        let mut polls = 0;

        // Arrived, but the blocking task needs two cycles.
        tracker.update(&pose(0.95, 0.0), &mut polls);
        assert_eq!(polls, 1);
        assert_eq!(tracker.waypoint_index(), 0);

        // Task completes; the tracker advances in the same cycle.
        tracker.update(&pose(0.95, 0.0), &mut polls);
        assert_eq!(polls, 2);
        assert_eq!(tracker.waypoint_index(), 1);

        // Task is discarded, never polled again.
        tracker.update(&pose(0.95, 0.0), &mut polls);
        assert_eq!(polls, 2);
    }

    #[test]
    fn arrival_interrupt_overlaps_continued_travel() {
        let mut waypoints = Vec::<_, 2>::new();
        waypoints
            .push(
                Waypoint::builder()
                    .target(pose(1.0, 0.0))
                    .arrival_radius(Length::new::<meter>(0.1))
                    .speed(0.5)
                    .subroutine(CountDown { cycles_left: 3 })
                    .build(),
            )
            .unwrap();
        waypoints.push(waypoint(2.0, 0.0, 0.5)).unwrap();
        let mut tracker = tracker(waypoints);
        let mut polls = 0;

        // Three consecutive cycles poll the task while the command
        // keeps pointing at the next waypoint.
        for cycle in 1..=3 {
            let command = tracker.update(&pose(0.95 + 0.01 * cycle as f32, 0.0), &mut polls);
            assert_eq!(polls, cycle);
            assert_eq!(tracker.waypoint_index(), 1);
            assert!(command.vx > 0.0);
        }

        // Completed: no further polls.
        tracker.update(&pose(1.1, 0.0), &mut polls);
        assert_eq!(polls, 3);
    }

    #[test]
    fn abort_discards_active_subroutine() {
        let mut waypoints = Vec::<_, 2>::new();
        waypoints
            .push(
                Waypoint::builder()
                    .target(pose(1.0, 0.0))
                    .arrival_radius(Length::new::<meter>(0.1))
                    .speed(0.5)
                    .subroutine(CountDown { cycles_left: 100 })
                    .build(),
            )
            .unwrap();
        waypoints.push(waypoint(2.0, 0.0, 0.5)).unwrap();
        let mut tracker = tracker(waypoints);
        let mut polls = 0;

        tracker.update(&pose(0.95, 0.0), &mut polls);
        assert_eq!(polls, 1);

        tracker.abort();
        assert!(tracker.finished());
        let command = tracker.update(&pose(0.95, 0.0), &mut polls);
        assert_eq!(command, ChassisCommand::ZERO);
        assert_eq!(polls, 1);
    }

    #[test]
    fn finished_never_regresses() {
        let mut waypoints = Vec::<_, 1>::new();
        waypoints
            .push(
                Waypoint::builder()
                    .target(pose(0.0, 0.0))
                    .speed(0.5)
                    .build(),
            )
            .unwrap();
        let mut tracker = tracker(waypoints);

        tracker.update(&pose(0.0, 0.0), &mut 0);
        assert!(tracker.finished());
        // Far from the (already passed) target again: still finished.
        tracker.update(&pose(5.0, 5.0), &mut 0);
        assert!(tracker.finished());
    }

    #[test]
    fn mirror_reflects_waypoints_once() {
        let mut waypoints = Vec::<_, 1>::new();
        waypoints
            .push(
                Waypoint::builder()
                    .target(Pose::new(
                        Length::new::<meter>(1.0),
                        Length::new::<meter>(2.0),
                        Angle::new::<degree>(30.0),
                    ))
                    .speed(0.5)
                    .heading(Angle::new::<degree>(90.0))
                    .build(),
            )
            .unwrap();
        let tracker = tracker(waypoints).mirrored().mirrored();

        let waypoint = &tracker.waypoints[0];
        assert_relative_eq!(waypoint.target.y.get::<meter>(), -2.0);
        assert_relative_eq!(
            waypoint.target.theta.get::<degree>(),
            -30.0,
            epsilon = 0.001
        );
        assert_relative_eq!(
            waypoint.heading.unwrap().get::<degree>(),
            -90.0,
            epsilon = 0.001
        );
    }

    #[test]
    fn timed_wrapper_caps_a_stuck_task() {
        let mut task = Timed::new(CountDown { cycles_left: 100 }, 3);
        let mut polls = 0;
        assert!(!task.run_cycle(&mut polls));
        assert!(!task.run_cycle(&mut polls));
        assert!(task.run_cycle(&mut polls));
        assert_eq!(polls, 3);
    }
}
