// Actuator interface for the two drive wheels
//
// The control loop only ever hands out a bounded `DriveCommand` per wheel.
// Implementations turn it into whatever the hardware needs.

use std::fmt::Display;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use super::bridge::{BridgeError, MotorBridge};
use super::encoder::TickCounter;
use crate::config::DRIVE_LIMIT;

/// Which wheel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Rotation direction, as sent to the H-bridge
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Stop = 0,
    Forward = 1,
    Reverse = 2,
}

/// Unsigned duty (0..=DRIVE_LIMIT) plus direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveCommand {
    pub duty: u8,
    pub direction: Direction,
}

impl DriveCommand {
    pub const STOP: DriveCommand = DriveCommand {
        duty: 0,
        direction: Direction::Stop,
    };

    /// Build from a signed controller output
    ///
    /// The output is already clamped by the controller; it is clamped again
    /// here so an out-of-range value can never reach the hardware.
    pub fn from_output(output: i32) -> Self {
        let bounded = output.clamp(-DRIVE_LIMIT, DRIVE_LIMIT);
        let direction = match bounded.signum() {
            1 => Direction::Forward,
            -1 => Direction::Reverse,
            _ => Direction::Stop,
        };
        Self {
            duty: bounded.unsigned_abs() as u8,
            direction,
        }
    }

    /// Signed value back, for logs and simulation
    pub fn signed(&self) -> i32 {
        match self.direction {
            Direction::Forward => self.duty as i32,
            Direction::Reverse => -(self.duty as i32),
            Direction::Stop => 0,
        }
    }
}

/// Something that can drive the wheels
pub trait Actuator {
    type Error: Display;

    fn drive(&mut self, side: Side, command: DriveCommand) -> Result<(), Self::Error>;
}

/// Hardware actuator backed by the serial motor bridge
pub struct MotorDriver {
    bridge: MotorBridge,
}

impl MotorDriver {
    /// Open the bridge on the specified serial port
    pub fn new(port: &str) -> Result<Self, BridgeError> {
        info!("Opening motor bridge on {}", port);
        let bridge = MotorBridge::open(port)?;
        Ok(Self { bridge })
    }

    /// Start feeding encoder edges from the bridge into the counters
    pub fn start_encoders(
        &self,
        left: Arc<TickCounter>,
        right: Arc<TickCounter>,
    ) -> Result<JoinHandle<()>, BridgeError> {
        self.bridge.spawn_edge_reader(left, right)
    }

    /// Stop both motors immediately
    pub fn stop(&mut self) -> Result<(), BridgeError> {
        info!("Stopping all motors");
        self.bridge.stop_all()
    }
}

impl Actuator for MotorDriver {
    type Error = BridgeError;

    fn drive(&mut self, side: Side, command: DriveCommand) -> Result<(), BridgeError> {
        self.bridge.drive(side, command)
    }
}

impl Drop for MotorDriver {
    fn drop(&mut self) {
        // Try to stop motors when driver is dropped (safety measure)
        if let Err(e) = self.stop() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}
