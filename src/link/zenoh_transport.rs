// Zenoh implementation of the command/telemetry link

use std::time::Duration;

use tracing::{debug, info, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::{Publisher, Subscriber};
use zenoh::sample::Sample;
use zenoh::{Config, Session};

use super::{LinkError, LinkSession, Transport};
use crate::config::{TOPIC_CMD_VEL, TOPIC_HEALTH, TOPIC_LEFT_WHEEL_SPEED, TOPIC_RIGHT_WHEEL_SPEED};
use crate::messages::{RuntimeHealth, VelocityCommand, WheelSpeeds};

/// Opens zenoh sessions, either peer-to-peer or as a client of a router
pub struct ZenohTransport {
    config: Config,
}

impl ZenohTransport {
    /// Peer mode with default discovery
    pub fn peer() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Client mode, connecting only to `endpoint` (e.g. `tcp/192.168.1.10:7447`)
    ///
    /// In client mode opening a session fails while the router is
    /// unreachable, which is what drives the reconnection cycle.
    pub fn client(endpoint: &str) -> Result<Self, LinkError> {
        let mut config = Config::default();
        config
            .insert_json5("mode", r#""client""#)
            .map_err(connect_error)?;
        config
            .insert_json5("connect/endpoints", &format!(r#"["{}"]"#, endpoint))
            .map_err(connect_error)?;
        Ok(Self { config })
    }
}

impl Transport for ZenohTransport {
    type Session = ZenohSession;

    async fn connect(&mut self) -> Result<ZenohSession, LinkError> {
        info!("Opening Zenoh session...");
        let session = zenoh::open(self.config.clone())
            .await
            .map_err(connect_error)?;

        match ZenohSession::declare(session.clone()).await {
            Ok(declared) => {
                info!("Subscribed to: {}", TOPIC_CMD_VEL);
                info!(
                    "Publishing to: {}, {}, {}",
                    TOPIC_LEFT_WHEEL_SPEED, TOPIC_RIGHT_WHEEL_SPEED, TOPIC_HEALTH
                );
                Ok(declared)
            }
            Err(e) => {
                // Do not leak a half-initialised session
                if let Err(close_err) = session.close().await {
                    debug!("Closing partial session failed: {}", close_err);
                }
                Err(e)
            }
        }
    }
}

/// An open zenoh session with the command subscriber and telemetry publishers
pub struct ZenohSession {
    session: Session,
    cmd_vel: Subscriber<FifoChannelHandler<Sample>>,
    left_speed: Publisher<'static>,
    right_speed: Publisher<'static>,
    health: Publisher<'static>,
}

impl ZenohSession {
    async fn declare(session: Session) -> Result<Self, LinkError> {
        let cmd_vel = session.declare_subscriber(TOPIC_CMD_VEL).await.map_err(connect_error)?;
        let left_speed = session
            .declare_publisher(TOPIC_LEFT_WHEEL_SPEED)
            .await
            .map_err(connect_error)?;
        let right_speed = session
            .declare_publisher(TOPIC_RIGHT_WHEEL_SPEED)
            .await
            .map_err(connect_error)?;
        let health = session.declare_publisher(TOPIC_HEALTH).await.map_err(connect_error)?;

        Ok(Self {
            session,
            cmd_vel,
            left_speed,
            right_speed,
            health,
        })
    }

    async fn put_json<T: serde::Serialize>(
        publisher: &Publisher<'static>,
        value: &T,
    ) -> Result<(), LinkError> {
        let json = serde_json::to_string(value).map_err(publish_error)?;
        publisher.put(json).await.map_err(publish_error)
    }
}

fn connect_error(e: impl std::fmt::Display) -> LinkError {
    LinkError::Connect(e.to_string())
}

fn publish_error(e: impl std::fmt::Display) -> LinkError {
    LinkError::Publish(e.to_string())
}

/// Decode a command payload; malformed payloads are logged and dropped
fn parse_command(sample: &Sample) -> Option<VelocityCommand> {
    let payload = sample.payload().to_bytes();
    match serde_json::from_slice::<VelocityCommand>(&payload) {
        Ok(cmd) => {
            debug!("Received command: {:?}", &cmd);
            Some(cmd)
        }
        Err(e) => {
            warn!("Failed to parse command: {}", e);
            None
        }
    }
}

impl LinkSession for ZenohSession {
    async fn poll(&mut self, wait: Duration) -> Result<Option<VelocityCommand>, LinkError> {
        let mut latest = match tokio::time::timeout(wait, self.cmd_vel.recv_async()).await {
            Err(_elapsed) => None,
            Ok(Ok(sample)) => parse_command(&sample),
            Ok(Err(e)) => return Err(LinkError::Poll(e.to_string())),
        };

        if self.session.is_closed() {
            return Err(LinkError::Poll("session closed".into()));
        }

        // Drain whatever else is pending (non-blocking), keep latest
        while let Ok(Some(sample)) = self.cmd_vel.try_recv() {
            if let Some(cmd) = parse_command(&sample) {
                latest = Some(cmd);
            }
        }

        Ok(latest)
    }

    async fn publish_wheel_speeds(&mut self, speeds: WheelSpeeds) -> Result<(), LinkError> {
        Self::put_json(&self.left_speed, &speeds.left).await?;
        Self::put_json(&self.right_speed, &speeds.right).await
    }

    async fn publish_health(&mut self, health: RuntimeHealth) -> Result<(), LinkError> {
        Self::put_json(&self.health, &health).await
    }

    async fn close(self) -> Result<(), LinkError> {
        let results = [
            self.cmd_vel.undeclare().await,
            self.left_speed.undeclare().await,
            self.right_speed.undeclare().await,
            self.health.undeclare().await,
            self.session.close().await,
        ];

        match results.into_iter().find_map(Result::err) {
            Some(e) => Err(LinkError::Close(e.to_string())),
            None => Ok(()),
        }
    }
}
