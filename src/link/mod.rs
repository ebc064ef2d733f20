// Command/telemetry link
//
// Provides:
// - Transport / LinkSession traits the control core talks through
// - Link health state machine (connect, poll, timeout, teardown)
// - Zenoh implementation of the transport

pub mod state;
pub mod zenoh_transport;

use std::time::Duration;

use crate::messages::{RuntimeHealth, VelocityCommand, WheelSpeeds};

pub use state::{LinkEvent, LinkState, LinkStateMachine, transition};
pub use zenoh_transport::{ZenohSession, ZenohTransport};

/// Error types for the command/telemetry link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Failed to open link: {0}")]
    Connect(String),

    #[error("Link poll failed: {0}")]
    Poll(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Failed to release link resources: {0}")]
    Close(String),
}

/// Opens sessions on the external channel
#[allow(async_fn_in_trait)]
pub trait Transport {
    type Session: LinkSession;

    /// Full channel initialisation: session, command subscription and
    /// telemetry publishers. Either everything is set up or nothing is.
    async fn connect(&mut self) -> Result<Self::Session, LinkError>;
}

/// An open session on the external channel
#[allow(async_fn_in_trait)]
pub trait LinkSession {
    /// Wait at most `wait` for commands. `Ok(None)` means the channel is
    /// healthy but nothing arrived; when several commands are pending the
    /// latest one is returned.
    async fn poll(&mut self, wait: Duration) -> Result<Option<VelocityCommand>, LinkError>;

    async fn publish_wheel_speeds(&mut self, speeds: WheelSpeeds) -> Result<(), LinkError>;

    async fn publish_health(&mut self, health: RuntimeHealth) -> Result<(), LinkError>;

    /// Release subscription, publishers and the session itself
    async fn close(self) -> Result<(), LinkError>;
}
