//! Ground truth oracle for simulation.
//!
//! The Oracle is the simulated device's physical side:
//! - A gyro whose acceleration and rotation follow slow sinusoids plus noise
//! - Servos that slew toward commanded targets and relax once the command's
//!   sticky period expires
//!
//! All noise comes from a seeded ChaCha8 RNG, so a seed fully determines
//! every reading.

use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use servoscope_core::{MoveCommand, PositionSample, Sample};
use std::f64::consts::TAU;

/// Standard gravity in m/s²
const GRAVITY: f64 = 9.81;

/// True state of one servo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServoTruth {
    /// Normalized position in [0, 1]
    pub position: f64,

    /// Position the servo is slewing toward
    pub target: f64,

    /// Time at which the servo relaxes back to rest
    pub sticky_until: f64,
}

/// The Oracle - maintains ground truth and generates device readings.
pub struct SignalOracle {
    /// RNG for sensor noise and fault injection
    physics_rng: ChaCha8Rng,

    /// Current simulation time (seconds)
    current_time: f64,

    /// Acceleration noise standard deviation (m/s²)
    accel_noise_std: f64,

    /// Rotation noise standard deviation (rad/s)
    rotation_noise_std: f64,

    servos: Vec<ServoTruth>,

    /// Position units per second
    slew_rate: f64,

    rest_position: f64,
}

impl SignalOracle {
    /// Creates an oracle with `servo_count` servos at rest.
    pub fn new(physics_seed: u64, servo_count: u32) -> Self {
        let rest_position = 0.5;
        let servo = ServoTruth {
            position: rest_position,
            target: rest_position,
            sticky_until: 0.0,
        };

        Self {
            physics_rng: ChaCha8Rng::seed_from_u64(physics_seed),
            current_time: 0.0,
            accel_noise_std: 0.05,
            rotation_noise_std: 0.01,
            servos: vec![servo; servo_count as usize],
            slew_rate: 0.8,
            rest_position,
        }
    }

    /// Sets sensor noise standard deviations.
    pub fn set_noise(&mut self, accel_std: f64, rotation_std: f64) {
        self.accel_noise_std = accel_std.max(0.0);
        self.rotation_noise_std = rotation_std.max(0.0);
    }

    /// Advances physics by dt seconds.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;
        let max_move = self.slew_rate * dt;

        for servo in &mut self.servos {
            if self.current_time >= servo.sticky_until {
                servo.target = self.rest_position;
            }
            let delta = (servo.target - servo.position).clamp(-max_move, max_move);
            servo.position = (servo.position + delta).clamp(0.0, 1.0);
        }
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.current_time
    }

    fn noise(&mut self, std_dev: f64) -> Vector3<f64> {
        let mut draw = || -> f64 { self.physics_rng.sample::<f64, _>(StandardNormal) * std_dev };
        Vector3::new(draw(), draw(), draw())
    }

    /// A gyro measure covering the `duration` seconds ending now.
    pub fn measure(&mut self, duration: f64) -> Sample {
        let t = self.current_time;

        let acceleration = Vector3::new(
            2.0 * (TAU * 0.2 * t).sin(),
            (TAU * 0.1 * t).cos(),
            GRAVITY,
        ) + self.noise(self.accel_noise_std);

        let rotation = Vector3::new(
            0.5 * (TAU * 0.25 * t).sin(),
            0.3 * (TAU * 0.05 * t).cos(),
            0.1,
        ) + self.noise(self.rotation_noise_std);

        Sample::new(t, duration, acceleration, rotation)
    }

    /// Applies a move command; returns false for an unknown servo.
    pub fn apply_move(&mut self, command: &MoveCommand) -> bool {
        let now = self.current_time;
        let Some(servo) = command
            .n
            .checked_sub(1)
            .and_then(|i| self.servos.get_mut(i as usize))
        else {
            return false;
        };

        servo.target = command.position.clamp(0.0, 1.0);
        servo.sticky_until = now + f64::from(command.sticky);
        true
    }

    /// Position report for every servo, channel ids starting at 1.
    pub fn servo_reports(&self) -> Vec<PositionSample> {
        self.servos
            .iter()
            .zip(1u32..)
            .map(|(servo, n)| PositionSample::new(n, servo.position, self.current_time))
            .collect()
    }

    pub fn servo(&self, n: u32) -> Option<&ServoTruth> {
        self.servos.get(n.checked_sub(1)? as usize)
    }

    /// Draws a fault with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        p > 0.0 && self.physics_rng.gen_bool(p.min(1.0))
    }
}
