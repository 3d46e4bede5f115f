//! Dispatch client for the physical dispensing robot.
//!
//! A dispense command is best-effort: one bounded-latency attempt per line,
//! no retry, no queue. Success or failure never affects the already-committed
//! clinical record; the caller observes the outcome and logs it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Hard latency budget for one robot call.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Instruction for the robot: deliver the tagged medication to a bed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispenseCommand {
    pub ward: String,
    pub bed: String,
    pub tag: String,
}

/// Dispatch failure. Never escalated past the fulfillment workflow.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The robot did not answer within [`DISPATCH_TIMEOUT`].
    #[error("dispatch timed out after {DISPATCH_TIMEOUT:?}")]
    Timeout,

    /// The robot answered with a non-success status.
    #[error("robot rejected command with status {0}")]
    Rejected(u16),

    /// Connection or protocol failure reaching the robot.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Seam between the fulfillment workflow and the physical actuator.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Send one dispense command. At most one attempt, bounded latency.
    async fn dispatch(&self, command: &DispenseCommand) -> Result<(), DispatchError>;
}

/// HTTP client for the dispensing robot endpoint.
///
/// The endpoint address/port is configured outside this core (`ROBOT_URL`).
pub struct RobotClient {
    endpoint: String,
    client: reqwest::Client,
}

impl RobotClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(DISPATCH_TIMEOUT)
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Dispatcher for RobotClient {
    async fn dispatch(&self, command: &DispenseCommand) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(command)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout
                } else {
                    DispatchError::Transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected(status.as_u16()));
        }

        tracing::debug!(endpoint = %self.endpoint, ward = %command.ward, bed = %command.bed, "robot accepted dispense command");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_serializes_with_plain_field_names() {
        let cmd = DispenseCommand {
            ward: "3".into(),
            bed: "12".into(),
            tag: "rfid-0042".into(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ward": "3", "bed": "12", "tag": "rfid-0042"})
        );
    }

    #[test]
    fn client_keeps_configured_endpoint() {
        let client = RobotClient::new("http://10.0.0.48/commands").unwrap();
        assert_eq!(client.endpoint(), "http://10.0.0.48/commands");
    }
}
