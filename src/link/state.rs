// Link health state machine
//
//   Disconnected --connect ok--> Connected --timeout / poll error--> ConnectionLost
//        ^                                                                |
//        +------------------------- teardown ------------------------------+
//
// The graph itself is the pure `transition` function; `LinkStateMachine`
// owns the session and the timestamps and decides which event happened.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::{LinkSession, Transport};
use crate::clock::{Clock, Millis};
use crate::config::ControlConfig;
use crate::control::CommandWatchdog;
use crate::messages::{RuntimeHealth, VelocityCommand, WheelSpeeds};

/// Connection lifecycle of the command/telemetry channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
    ConnectionLost,
}

/// Something that happened to the link during one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    ConnectSucceeded,
    ConnectFailed,
    HealthTimeout,
    PollSucceeded,
    PollFailed,
    TeardownComplete,
}

/// Next state for `event` in `state`. Events that do not apply to a state
/// leave it unchanged.
pub fn transition(state: LinkState, event: LinkEvent) -> LinkState {
    use LinkEvent::*;
    use LinkState::*;

    match (state, event) {
        (Disconnected, ConnectSucceeded) => Connected,
        (Disconnected, ConnectFailed) => Disconnected,
        (Connected, PollSucceeded) => Connected,
        (Connected, HealthTimeout | PollFailed) => ConnectionLost,
        (ConnectionLost, TeardownComplete) => Disconnected,
        (state, _) => state,
    }
}

/// Drives a `Transport` through the link lifecycle
pub struct LinkStateMachine<T: Transport, C: Clock> {
    transport: T,
    clock: C,
    state: LinkState,
    session: Option<T::Session>,
    // None until the first attempt, so the first attempt is immediate
    last_attempt: Option<Millis>,
    last_healthy: Millis,
    health_timeout_ms: u32,
    reconnect_delay_ms: u32,
    poll_wait: Duration,
}

impl<T: Transport, C: Clock> LinkStateMachine<T, C> {
    pub fn new(transport: T, clock: C, config: &ControlConfig) -> Self {
        let now = clock.now();
        Self {
            transport,
            clock,
            state: LinkState::Disconnected,
            session: None,
            last_attempt: None,
            last_healthy: now,
            health_timeout_ms: config.link_health_timeout_ms,
            reconnect_delay_ms: config.reconnect_delay_ms,
            poll_wait: config.poll_wait,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Advance the machine by one step
    ///
    /// Returns the latest velocity command received during this step, if any.
    pub async fn step(&mut self, watchdog: &mut CommandWatchdog) -> Option<VelocityCommand> {
        match self.state {
            LinkState::Disconnected => {
                self.try_connect(watchdog).await;
                None
            }
            LinkState::Connected => self.service(watchdog).await,
            LinkState::ConnectionLost => {
                self.teardown().await;
                None
            }
        }
    }

    /// Best-effort telemetry; does nothing unless connected
    pub async fn publish_telemetry(&mut self, speeds: WheelSpeeds, health: RuntimeHealth) {
        if self.state != LinkState::Connected {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Err(e) = session.publish_wheel_speeds(speeds).await {
            debug!("Dropped wheel speed telemetry: {}", e);
        }
        if let Err(e) = session.publish_health(health).await {
            debug!("Dropped health telemetry: {}", e);
        }
    }

    /// Release the session for good, used when the process exits
    pub async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Closing link session");
            if let Err(e) = session.close().await {
                warn!("{}", e);
            }
        }
        self.state = LinkState::Disconnected;
    }

    fn apply(&mut self, event: LinkEvent) {
        let next = transition(self.state, event);
        if next != self.state {
            info!("Link {:?} -> {:?} on {:?}", self.state, next, event);
        }
        self.state = next;
    }

    async fn try_connect(&mut self, watchdog: &mut CommandWatchdog) {
        if let Some(last) = self.last_attempt {
            if self.clock.now().since(last) <= self.reconnect_delay_ms {
                return;
            }
        }

        info!("Attempting to connect...");
        let result = self.transport.connect().await;
        // Connecting may take a while, stamp with the time it finished
        let now = self.clock.now();
        self.last_attempt = Some(now);

        match result {
            Ok(session) => {
                self.session = Some(session);
                self.last_healthy = now;
                watchdog.reset(now);
                self.apply(LinkEvent::ConnectSucceeded);
            }
            Err(e) => {
                warn!("Link initialisation failed: {}", e);
                self.apply(LinkEvent::ConnectFailed);
            }
        }
    }

    async fn service(&mut self, watchdog: &mut CommandWatchdog) -> Option<VelocityCommand> {
        let silent_for = self.clock.now().since(self.last_healthy);
        if silent_for > self.health_timeout_ms {
            warn!("Link communication timeout ({}ms silent)", silent_for);
            self.apply(LinkEvent::HealthTimeout);
            return None;
        }

        let Some(session) = self.session.as_mut() else {
            warn!("Connected without a session");
            self.apply(LinkEvent::PollFailed);
            return None;
        };

        match session.poll(self.poll_wait).await {
            Ok(command) => {
                let now = self.clock.now();
                self.last_healthy = now;
                if command.is_some() {
                    watchdog.notify_command_received(now);
                }
                self.apply(LinkEvent::PollSucceeded);
                command
            }
            Err(e) => {
                warn!("Link communication error: {}", e);
                self.apply(LinkEvent::PollFailed);
                None
            }
        }
    }

    async fn teardown(&mut self) {
        info!("Releasing link resources");
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("{}", e);
            }
        }
        self.last_attempt = Some(self.clock.now());
        self.apply(LinkEvent::TeardownComplete);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::link::mock::MockTransport;

    fn config() -> ControlConfig {
        ControlConfig::default()
    }

    fn machine(
        transport: &MockTransport,
        clock: &ManualClock,
    ) -> LinkStateMachine<MockTransport, ManualClock> {
        LinkStateMachine::new(transport.clone(), clock.clone(), &config())
    }

    #[test]
    fn test_transition_graph() {
        use LinkEvent::*;
        use LinkState::*;

        assert_eq!(transition(Disconnected, ConnectSucceeded), Connected);
        assert_eq!(transition(Disconnected, ConnectFailed), Disconnected);
        assert_eq!(transition(Connected, PollSucceeded), Connected);
        assert_eq!(transition(Connected, PollFailed), ConnectionLost);
        assert_eq!(transition(Connected, HealthTimeout), ConnectionLost);
        assert_eq!(transition(ConnectionLost, TeardownComplete), Disconnected);

        // Events that do not belong to a state are ignored
        assert_eq!(transition(Disconnected, HealthTimeout), Disconnected);
        assert_eq!(transition(ConnectionLost, ConnectSucceeded), ConnectionLost);
        assert_eq!(transition(Connected, TeardownComplete), Connected);
    }

    #[tokio::test]
    async fn test_first_attempt_is_immediate() {
        let transport = MockTransport::default();
        let clock = ManualClock::starting_at(0);
        let mut link = machine(&transport, &clock);
        let mut watchdog = CommandWatchdog::new(500, clock.now());

        link.step(&mut watchdog).await;
        assert_eq!(link.state(), LinkState::Connected);
        assert_eq!(transport.script().connects, 1);
    }

    #[tokio::test]
    async fn test_failed_attempt_waits_for_delay() {
        let transport = MockTransport::default();
        transport.script().connect_results.extend([false, true]);
        let clock = ManualClock::starting_at(0);
        let mut link = machine(&transport, &clock);
        let mut watchdog = CommandWatchdog::new(500, clock.now());

        link.step(&mut watchdog).await;
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(transport.script().connects, 1);

        // Stepping repeatedly inside the delay does not retry
        for _ in 0..100 {
            clock.advance(10);
            link.step(&mut watchdog).await;
        }
        assert_eq!(clock.now(), Millis(1000));
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(transport.script().connects, 1);

        clock.advance(1);
        link.step(&mut watchdog).await;
        assert_eq!(transport.script().connects, 2);
        assert_eq!(link.state(), LinkState::Connected);
    }

    #[tokio::test]
    async fn test_health_survives_clock_wrap() {
        let transport = MockTransport::default();
        let clock = ManualClock::starting_at(u32::MAX - 500);
        let mut link = machine(&transport, &clock);
        let mut watchdog = CommandWatchdog::new(500, clock.now());

        link.step(&mut watchdog).await;
        assert!(link.is_connected());

        for i in 1..=20 {
            clock.advance(100);
            link.step(&mut watchdog).await;
            assert!(link.is_connected(), "lost link {}ms after start", i * 100);
            assert_eq!(transport.script().polls_served, i);
        }
        assert_eq!(clock.now(), Millis(1499));
        assert_eq!(transport.script().connects, 1);
        assert_eq!(transport.script().closes, 0);
    }

    #[tokio::test]
    async fn test_reconnect_delay_across_clock_wrap() {
        let transport = MockTransport::default();
        transport.script().connect_results.extend([false, true]);
        let clock = ManualClock::starting_at(u32::MAX - 500);
        let mut link = machine(&transport, &clock);
        let mut watchdog = CommandWatchdog::new(500, clock.now());

        link.step(&mut watchdog).await;
        assert_eq!(transport.script().connects, 1);

        for _ in 0..100 {
            clock.advance(10);
            link.step(&mut watchdog).await;
        }
        assert_eq!(clock.now(), Millis(499));
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(transport.script().connects, 1);

        clock.advance(1);
        link.step(&mut watchdog).await;
        assert_eq!(transport.script().connects, 2);
        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refreshes_watchdog() {
        let transport = MockTransport::default();
        let clock = ManualClock::starting_at(0);
        let mut link = machine(&transport, &clock);
        let mut watchdog = CommandWatchdog::new(500, clock.now());

        clock.advance(5000);
        assert!(watchdog.is_stale(clock.now()));
        link.step(&mut watchdog).await;
        assert!(!watchdog.is_stale(clock.now()));
    }

    #[tokio::test]
    async fn test_health_timeout_then_teardown_once() {
        let transport = MockTransport::default();
        let clock = ManualClock::starting_at(0);
        let mut link = machine(&transport, &clock);
        let mut watchdog = CommandWatchdog::new(500, clock.now());

        link.step(&mut watchdog).await;
        assert!(link.is_connected());

        // Healthy polls keep it connected
        for _ in 0..10 {
            clock.advance(500);
            link.step(&mut watchdog).await;
            assert!(link.is_connected());
        }

        // Loop stalls past the health timeout
        clock.advance(1001);
        let polls_before = transport.script().polls_served;
        link.step(&mut watchdog).await;
        assert_eq!(link.state(), LinkState::ConnectionLost);
        assert_eq!(
            transport.script().polls_served,
            polls_before,
            "timeout is checked before polling"
        );

        link.step(&mut watchdog).await;
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(transport.script().closes, 1);

        // Reconnection waits for the standard delay after teardown
        for _ in 0..5 {
            link.step(&mut watchdog).await;
        }
        assert_eq!(transport.script().closes, 1);
        assert_eq!(transport.script().connects, 1);
        clock.advance(1001);
        link.step(&mut watchdog).await;
        assert!(link.is_connected());
        assert_eq!(transport.script().connects, 2);
    }

    #[tokio::test]
    async fn test_poll_error_loses_link_immediately() {
        let transport = MockTransport::default();
        transport.script().polls.push_back(Err(()));
        let clock = ManualClock::starting_at(0);
        let mut link = machine(&transport, &clock);
        let mut watchdog = CommandWatchdog::new(500, clock.now());

        link.step(&mut watchdog).await;
        link.step(&mut watchdog).await;
        assert_eq!(link.state(), LinkState::ConnectionLost);
        link.step(&mut watchdog).await;
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(transport.script().closes, 1);
    }

    #[tokio::test]
    async fn test_command_refreshes_watchdog_and_is_returned() {
        let transport = MockTransport::default();
        let command = VelocityCommand::new(0.3, -0.1);
        transport.script().polls.push_back(Ok(Some(command)));
        let clock = ManualClock::starting_at(0);
        let mut link = machine(&transport, &clock);
        let mut watchdog = CommandWatchdog::new(500, clock.now());

        link.step(&mut watchdog).await;
        clock.advance(400);
        assert_eq!(link.step(&mut watchdog).await, Some(command));
        assert_eq!(watchdog.last_command(), Millis(400));

        clock.advance(10);
        assert_eq!(link.step(&mut watchdog).await, None);
        assert_eq!(watchdog.last_command(), Millis(400));
    }

    #[tokio::test]
    async fn test_telemetry_only_while_connected() {
        let transport = MockTransport::default();
        transport.script().connect_results.push_back(false);
        let clock = ManualClock::starting_at(0);
        let mut link = machine(&transport, &clock);
        let mut watchdog = CommandWatchdog::new(500, clock.now());

        link.step(&mut watchdog).await;
        link.publish_telemetry(WheelSpeeds::default(), RuntimeHealth::Ok).await;
        assert!(transport.script().wheel_speeds.is_empty());

        clock.advance(1001);
        link.step(&mut watchdog).await;
        link.publish_telemetry(WheelSpeeds { left: 1.0, right: 2.0 }, RuntimeHealth::Ok).await;
        assert_eq!(transport.script().wheel_speeds, vec![WheelSpeeds { left: 1.0, right: 2.0 }]);
        assert_eq!(transport.script().health, vec![RuntimeHealth::Ok]);
    }

    #[tokio::test]
    async fn test_publish_failure_is_ignored() {
        let transport = MockTransport::default();
        transport.script().fail_publish = true;
        let clock = ManualClock::starting_at(0);
        let mut link = machine(&transport, &clock);
        let mut watchdog = CommandWatchdog::new(500, clock.now());

        link.step(&mut watchdog).await;
        link.publish_telemetry(WheelSpeeds::default(), RuntimeHealth::CmdStale).await;
        assert!(link.is_connected());
    }
}
