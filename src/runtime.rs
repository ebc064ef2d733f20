// 100 Hz loop: link step every tick, wheel control every 100 ms
// Note: the link state machine, the command watchdog and the tick source health
// together decide whether the wheels may be driven. Whenever any says no, the
// robot is stopped.

use std::sync::Arc;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

// local imports
use crate::clock::{Clock, Millis, MonotonicClock};
use crate::config::{ControlConfig, LOOP_PERIOD, WheelGeometry};
use crate::control::{CommandWatchdog, PidController, VelocityEstimator};
use crate::link::{LinkState, LinkStateMachine, Transport};
use crate::messages::{RuntimeHealth, VelocityCommand, WheelSpeeds};
use crate::motor::{Actuator, DriveCommand, Side, TickCounter, body_to_wheel};

/// Control state of one wheel
struct Wheel {
    side: Side,
    counter: Arc<TickCounter>,
    pid: PidController,
    target: f32,
    measured: f32,
}

impl Wheel {
    fn new(side: Side, counter: Arc<TickCounter>, config: &ControlConfig) -> Self {
        Self {
            side,
            counter,
            pid: PidController::new(config.gains),
            target: 0.0,
            measured: 0.0,
        }
    }
}

/// The orchestrator: owns every piece of control state
pub struct ControlLoop<T: Transport, A: Actuator, C: Clock> {
    link: LinkStateMachine<T, C>,
    watchdog: CommandWatchdog,
    actuator: A,
    clock: C,
    estimator: VelocityEstimator,
    geometry: WheelGeometry,
    wheels: [Wheel; 2], // [left, right]
    last_control: Millis,
    control_period_ms: u32,
    reported_fault: bool,
}

impl<T: Transport, A: Actuator, C: Clock + Clone> ControlLoop<T, A, C> {
    pub fn new(
        transport: T,
        actuator: A,
        clock: C,
        counters: [Arc<TickCounter>; 2],
        config: &ControlConfig,
    ) -> Self {
        let now = clock.now();
        let [left, right] = counters;
        Self {
            link: LinkStateMachine::new(transport, clock.clone(), config),
            watchdog: CommandWatchdog::new(config.cmd_timeout_ms, now),
            actuator,
            clock,
            estimator: VelocityEstimator::new(config.counts_per_revolution),
            geometry: config.geometry,
            wheels: [
                Wheel::new(Side::Left, left, config),
                Wheel::new(Side::Right, right, config),
            ],
            last_control: now,
            control_period_ms: config.control_period_ms,
            reported_fault: false,
        }
    }
}

impl<T: Transport, A: Actuator, C: Clock> ControlLoop<T, A, C> {
    /// One pass of the main loop
    pub async fn iterate(&mut self) {
        // 1. Link step (bounded poll or reconnection logic)
        if let Some(cmd) = self.link.step(&mut self.watchdog).await {
            self.on_command(&cmd);
        }

        let now = self.clock.now();
        let connected = self.link.is_connected();
        let faulted = self.tick_source_faulted();

        // 2. Wheel control at the control cadence, only with authority
        if !connected || faulted {
            // Nothing to integrate over while the link or the encoders are down
            self.last_control = now;
        } else if now.since(self.last_control) >= self.control_period_ms {
            self.control_cycle(now).await;
        }

        // 3. Safety gate, every pass
        if self.watchdog.check(now) || !connected || faulted {
            self.safe_stop();
        }
    }

    /// Stop the wheels and release the link session
    pub async fn shutdown(&mut self) {
        self.safe_stop();
        self.link.shutdown().await;
    }

    /// Stop the wheels and drop all control state
    pub fn safe_stop(&mut self) {
        for wheel in &mut self.wheels {
            wheel.target = 0.0;
            wheel.pid.reset();
            Self::drive(&mut self.actuator, wheel.side, DriveCommand::STOP);
            // Stale counts would show up as a velocity spike on the next cycle
            wheel.counter.clear();
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    /// Current wheel targets [left, right], rad/s
    pub fn targets(&self) -> [f32; 2] {
        [self.wheels[0].target, self.wheels[1].target]
    }

    /// Last measured wheel velocities [left, right], rad/s
    pub fn measured(&self) -> [f32; 2] {
        [self.wheels[0].measured, self.wheels[1].measured]
    }

    /// A dead tick source would read as a standstill and wind the PID up
    fn tick_source_faulted(&mut self) -> bool {
        let faulted = self.wheels.iter().any(|w| w.counter.is_faulted());
        if faulted && !self.reported_fault {
            error!("Encoder tick source lost, holding wheels stopped");
            self.reported_fault = true;
        }
        faulted
    }

    fn on_command(&mut self, cmd: &VelocityCommand) {
        let targets = body_to_wheel(cmd, &self.geometry);
        debug!(
            "Command {:?} -> targets left={:.2}, right={:.2} rad/s",
            cmd, targets.left, targets.right
        );
        self.wheels[0].target = targets.left;
        self.wheels[1].target = targets.right;
    }

    async fn control_cycle(&mut self, now: Millis) {
        let dt = now.seconds_since(self.last_control);
        self.last_control = now;

        for wheel in &mut self.wheels {
            let ticks = wheel.counter.take();
            wheel.measured = self.estimator.estimate(ticks, dt);
            let output = wheel.pid.compute(wheel.target, wheel.measured, dt);
            Self::drive(&mut self.actuator, wheel.side, DriveCommand::from_output(output));
        }

        let [left, right] = &self.wheels;
        debug!(
            "Left: {:.2} (target {:.2}) rad/s, Right: {:.2} (target {:.2}) rad/s",
            left.measured, left.target, right.measured, right.target
        );

        let speeds = WheelSpeeds {
            left: left.measured,
            right: right.measured,
        };
        let health = if self.watchdog.is_stale(now) {
            RuntimeHealth::CmdStale
        } else {
            RuntimeHealth::Ok
        };
        self.link.publish_telemetry(speeds, health).await;
    }

    fn drive(actuator: &mut A, side: Side, command: DriveCommand) {
        if let Err(e) = actuator.drive(side, command) {
            warn!("Failed to drive {:?} wheel: {}", side, e);
        }
    }
}

/// Run the control loop until Ctrl-C
pub async fn run<T: Transport, A: Actuator>(
    transport: T,
    actuator: A,
    counters: [Arc<TickCounter>; 2],
) {
    let config = ControlConfig::default();
    let clock = MonotonicClock::new();
    let mut control = ControlLoop::new(transport, actuator, clock, counters, &config);

    let mut tick = interval(LOOP_PERIOD);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Runtime started: {}ms control period, {}ms watchdog timeout, {}ms link timeout",
        config.control_period_ms, config.cmd_timeout_ms, config.link_health_timeout_ms
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = tick.tick() => control.iterate().await,
            _ = &mut ctrl_c => {
                info!("Shutting down");
                break;
            }
        }
    }

    control.shutdown().await;
}
