// Simulated wheel plant for running without hardware
//
// Each wheel is a first-order motor model: speed relaxes towards
// duty * free-running speed. A background thread integrates the model at
// 1 kHz and emits quadrature edges into the tick counters, standing in for
// the encoder interrupts.

use std::convert::Infallible;
use std::f32::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use super::driver::{Actuator, DriveCommand, Side};
use super::encoder::TickCounter;
use crate::config::DRIVE_LIMIT;

/// Wheel speed at full duty, rad/s
const FREE_SPEED: f32 = 40.0;

/// Motor time constant, seconds
const TIME_CONSTANT: f32 = 0.05;

const STEP: Duration = Duration::from_millis(1);

/// Model state of one wheel
#[derive(Debug, Default, Clone, Copy)]
struct WheelModel {
    speed: f32,
    // Fractional edges not yet emitted
    pending_edges: f32,
}

impl WheelModel {
    /// Advance the model by `dt` seconds, return whole edges to emit (signed)
    fn advance(&mut self, duty: i32, dt: f32, counts_per_revolution: u32) -> i32 {
        let steady = duty as f32 / DRIVE_LIMIT as f32 * FREE_SPEED;
        self.speed += (steady - self.speed) * (dt / TIME_CONSTANT).min(1.0);

        self.pending_edges += self.speed / TAU * counts_per_revolution as f32 * dt;
        let whole = self.pending_edges.trunc();
        self.pending_edges -= whole;
        whole as i32
    }
}

/// Simulated two-wheel base
pub struct SimulatedBase {
    duty: Arc<[AtomicI32; 2]>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SimulatedBase {
    /// Start the plant thread feeding the given counters
    pub fn start(
        left: Arc<TickCounter>,
        right: Arc<TickCounter>,
        counts_per_revolution: u32,
    ) -> std::io::Result<Self> {
        let duty = Arc::new([AtomicI32::new(0), AtomicI32::new(0)]);
        let running = Arc::new(AtomicBool::new(true));

        let worker = {
            let duty = Arc::clone(&duty);
            let running = Arc::clone(&running);
            thread::Builder::new().name("sim-plant".into()).spawn(move || {
                let counters = [left, right];
                let mut models = [WheelModel::default(); 2];
                let dt = STEP.as_secs_f32();

                while running.load(Ordering::Relaxed) {
                    for (i, model) in models.iter_mut().enumerate() {
                        let command = duty[i].load(Ordering::Relaxed);
                        let edges = model.advance(command, dt, counts_per_revolution);
                        for _ in 0..edges.unsigned_abs() {
                            counters[i].record_edge(edges > 0);
                        }
                    }
                    thread::sleep(STEP);
                }
                debug!("Simulated plant stopped");
            })?
        };

        info!("Simulated base started ({} CPR)", counts_per_revolution);
        Ok(Self {
            duty,
            running,
            worker: Some(worker),
        })
    }

    fn index(side: Side) -> usize {
        match side {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

impl Actuator for SimulatedBase {
    type Error = Infallible;

    fn drive(&mut self, side: Side, command: DriveCommand) -> Result<(), Infallible> {
        self.duty[Self::index(side)].store(command.signed(), Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for SimulatedBase {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
