use std::collections::VecDeque;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use crate::models::messages::ClientEvent;

/// The raw wire the Connection Manager writes to. Narrow on purpose: the
/// production implementation is the WebSocket actor, tests use a fake.
pub trait Transport {
    fn open(&mut self) -> Result<(), TransportError>;
    fn send(&mut self, payload: &str) -> Result<(), TransportError>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,
    #[error("transport failure: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
}

/// Notifications the manager queues for the event dispatcher. `Reconnected`
/// is queued on every successful connect after the first, so the session
/// layer treats the next state-bearing event as a full resync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionNotice {
    StatusChanged(ConnectionStatus),
    Reconnected,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("not connected")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Bounded exponential backoff for reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

/// Owns the single transport to the session authority.
///
/// Everything session-specific rides through `send_event`; the manager never
/// interprets payloads. It owns the reconnect *policy* (how long to wait,
/// when to give up); the actual dialing lives with whoever drives the
/// transport.
pub struct ConnectionManager {
    transport: Box<dyn Transport>,
    status: ConnectionStatus,
    ever_connected: bool,
    attempts: u32,
    policy: ReconnectPolicy,
    notices: VecDeque<ConnectionNotice>,
}

impl ConnectionManager {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        ConnectionManager {
            transport,
            status: ConnectionStatus::Disconnected,
            ever_connected: false,
            attempts: 0,
            policy: ReconnectPolicy::default(),
            notices: VecDeque::new(),
        }
    }

    pub fn with_policy(transport: Box<dyn Transport>, policy: ReconnectPolicy) -> Self {
        let mut manager = ConnectionManager::new(transport);
        manager.policy = policy;
        manager
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Establish the transport. Idempotent: calling while connected is a
    /// no-op.
    pub fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.is_connected() {
            return Ok(());
        }
        self.transport.open()?;
        self.status = ConnectionStatus::Connected;
        self.attempts = 0;
        self.notices
            .push_back(ConnectionNotice::StatusChanged(ConnectionStatus::Connected));
        if self.ever_connected {
            info!("transport reconnected, expecting a full resync");
            self.notices.push_back(ConnectionNotice::Reconnected);
        } else {
            info!("transport connected");
        }
        self.ever_connected = true;
        Ok(())
    }

    /// The transport dropped underneath us.
    pub fn on_transport_lost(&mut self) {
        if self.status == ConnectionStatus::Disconnected {
            return;
        }
        warn!("transport lost");
        self.transport.close();
        self.status = ConnectionStatus::Disconnected;
        self.notices
            .push_back(ConnectionNotice::StatusChanged(ConnectionStatus::Disconnected));
    }

    /// Delay before the next reconnect attempt, or `None` once the attempt
    /// budget is spent. A successful `connect` resets the budget.
    pub fn next_retry_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let exponent = self.attempts.min(16);
        self.attempts += 1;
        let delay = self.policy.base_delay.saturating_mul(1u32 << exponent);
        Some(delay.min(self.policy.max_delay))
    }

    /// Serialize and send one outbound event. Refused while disconnected so
    /// no action is silently lost; a failed write marks the transport lost.
    pub fn send_event(&mut self, event: &ClientEvent) -> Result<(), ConnectionError> {
        if !self.is_connected() {
            return Err(ConnectionError::NotConnected);
        }
        let payload = serde_json::to_string(event)?;
        debug!("sending: {}", payload);
        if let Err(e) = self.transport.send(&payload) {
            self.on_transport_lost();
            return Err(e.into());
        }
        Ok(())
    }

    pub fn pop_notice(&mut self) -> Option<ConnectionNotice> {
        self.notices.pop_front()
    }
}
