//! Keepalive pings and request timeouts.

use logsync_log::LogStore;
use tokio::time::Instant;

use super::driver::Driver;
use crate::error::{ErrorKind, Result, SyncError};
use crate::messages::Message;

impl<S: LogStore + 'static> Driver<S> {
    /// Expect an answer within the configured timeout.
    pub(super) fn start_timeout(&mut self) {
        if let Some(timeout) = self.config.timeout {
            self.timeouts.push_back(Instant::now() + timeout);
        }
    }

    /// The oldest outstanding request was answered.
    pub(super) fn end_timeout(&mut self) {
        self.timeouts.pop_front();
    }

    /// Push the next ping back by a full interval.
    pub(super) fn delay_ping(&mut self) {
        self.ping_at = self.config.ping.map(|interval| Instant::now() + interval);
    }

    pub(super) fn on_ping_due(&mut self) -> Result<()> {
        self.ping_at = None;
        if !self.status.connected || !self.status.authenticated {
            return Ok(());
        }
        self.start_timeout();
        self.send(Message::Ping(self.last_added_cache))
    }

    /// The oldest outstanding request expired.
    pub(super) fn on_timeout(&mut self) -> Result<()> {
        let ms = self
            .config
            .timeout
            .map_or(0, |timeout| timeout.as_millis() as u64);
        self.timeouts.clear();
        self.ping_at = None;
        self.connection.disconnect(Some("timeout"));
        self.raise(SyncError::Protocol(ErrorKind::Timeout { ms }))
    }

    pub(super) fn on_ping_message(&mut self) -> Result<()> {
        self.send(Message::Pong(self.last_added_cache))
    }

    pub(super) fn on_pong_message(&mut self) {
        self.end_timeout();
    }
}
