//! Handshake: `connect`/`connected`, protocol checks, authentication and
//! clock fixing.

use logsync_core::NodeId;
use logsync_log::LogStore;

use super::driver::Driver;
use crate::config::{AuthRequest, PeerInfo, DEFAULT_SUBPROTOCOL};
use crate::error::{ErrorKind, HookError, Result, SyncError};
use crate::messages::{ConnectOptions, Message};

impl<S: LogStore + 'static> Driver<S> {
    fn local_options(&self) -> ConnectOptions {
        ConnectOptions {
            token: self.config.token.clone(),
            subprotocol: self.config.subprotocol.clone(),
        }
    }

    /// Client opening: `headers` first if any, then `connect`.
    pub(super) fn send_connect(&mut self) -> Result<()> {
        let message = Message::Connect {
            protocol: self.config.protocol,
            node_id: self.log.node_id().clone(),
            synced: self.last_received,
            options: self.local_options(),
        };
        if self.fix_time() {
            self.connect_sent_at = Some(self.log.now());
        }
        if !self.local_headers.is_empty() {
            self.send(Message::Headers(self.local_headers.clone()))?;
        }
        tracing::debug!(protocol = self.config.protocol, "sending connect");
        self.start_timeout();
        self.send(message)
    }

    pub(super) async fn on_connect_message(
        &mut self,
        protocol: u32,
        node_id: NodeId,
        synced: u64,
        options: ConnectOptions,
    ) -> Result<()> {
        let start = self.log.now();
        self.role_on_connect_message();
        tracing::debug!(peer = %node_id, protocol, "received connect");

        self.status.remote_node_id = Some(node_id.clone());
        self.status.remote_protocol = Some(protocol);
        if !self.check_protocol(protocol)? {
            return Ok(());
        }
        self.status.remote_subprotocol = Some(
            options
                .subprotocol
                .unwrap_or_else(|| DEFAULT_SUBPROTOCOL.to_string()),
        );
        if !self.check_peer(&node_id, protocol)? {
            return Ok(());
        }
        if !self.authenticate(node_id, options.token).await? {
            return Ok(());
        }

        self.status.base_time = self.log.now();
        self.send(Message::Connected {
            protocol: self.config.protocol,
            node_id: self.log.node_id().clone(),
            time: (start, self.status.base_time),
            options: self.local_options(),
        })?;
        self.sync_since(synced).await
    }

    pub(super) async fn on_connected_message(
        &mut self,
        protocol: u32,
        node_id: NodeId,
        time: (i64, i64),
        options: ConnectOptions,
    ) -> Result<()> {
        self.end_timeout();
        tracing::debug!(peer = %node_id, protocol, "received connected");

        self.status.remote_node_id = Some(node_id.clone());
        self.status.remote_protocol = Some(protocol);
        if !self.check_protocol(protocol)? {
            return Ok(());
        }

        let (auth_start, auth_end) = time;
        if self.fix_time() {
            if let Some(sent) = self.connect_sent_at {
                let Some(fix) = clock_fix(self.log.now(), sent, auth_start, auth_end) else {
                    let raw = Message::Connected {
                        protocol,
                        node_id,
                        time,
                        options,
                    };
                    self.send_error(ErrorKind::WrongFormat(raw.to_json()))?;
                    self.connection.disconnect(Some("error"));
                    return Ok(());
                };
                self.status.time_fix = fix;
                tracing::debug!(time_fix = fix, "clock fixed");
            }
        }
        self.status.base_time = auth_end;

        self.status.remote_subprotocol = Some(
            options
                .subprotocol
                .unwrap_or_else(|| DEFAULT_SUBPROTOCOL.to_string()),
        );
        if !self.check_peer(&node_id, protocol)? {
            return Ok(());
        }
        if !self.authenticate(node_id, options.token).await? {
            return Ok(());
        }
        self.sync_since(self.last_sent).await
    }

    /// Reject peers older than `min_protocol`.
    fn check_protocol(&mut self, used: u32) -> Result<bool> {
        if used >= self.config.min_protocol {
            return Ok(true);
        }
        self.send_error(ErrorKind::WrongProtocol {
            supported: self.config.min_protocol,
            used,
        })?;
        self.stop();
        Ok(false)
    }

    /// Run the application connect check.
    fn check_peer(&mut self, node_id: &NodeId, protocol: u32) -> Result<bool> {
        let Some(check) = self.hooks.connect_check.clone() else {
            return Ok(true);
        };
        let peer = PeerInfo {
            node_id: node_id.clone(),
            protocol,
            subprotocol: self
                .status
                .remote_subprotocol
                .clone()
                .unwrap_or_else(|| DEFAULT_SUBPROTOCOL.to_string()),
            headers: self.status.remote_headers.clone(),
        };
        match check(&peer) {
            Ok(()) => Ok(true),
            Err(kind) => {
                self.send_error(kind)?;
                self.stop();
                Ok(false)
            }
        }
    }

    async fn authenticate(&mut self, node_id: NodeId, token: Option<String>) -> Result<bool> {
        let Some(auth) = self.hooks.auth.clone() else {
            self.set_authenticated();
            return Ok(true);
        };
        let request = AuthRequest {
            node_id,
            token,
            headers: self.status.remote_headers.clone(),
        };
        match auth.authenticate(request).await {
            Ok(true) => {
                self.set_authenticated();
                Ok(true)
            }
            Ok(false) => {
                self.send_error(ErrorKind::WrongCredentials)?;
                self.stop();
                Ok(false)
            }
            Err(HookError::Protocol(kind)) => {
                self.send_error(kind)?;
                self.stop();
                Ok(false)
            }
            Err(HookError::Other(err)) => {
                self.raise(SyncError::Hook(err))?;
                Ok(false)
            }
        }
    }

    fn set_authenticated(&mut self) {
        tracing::debug!(peer = ?self.status.remote_node_id, "authenticated");
        self.status.authenticated = true;
        self.publish();
    }
}

/// `floor(sent - auth_start + round_trip / 2)` where the round trip excludes
/// the time the server spent authenticating. `None` when the peer's times
/// do not fit.
fn clock_fix(now: i64, sent: i64, auth_start: i64, auth_end: i64) -> Option<i64> {
    let auth = auth_end.checked_sub(auth_start)?;
    let round_trip = now.checked_sub(sent)?.checked_sub(auth)?;
    sent.checked_sub(auth_start)?.checked_add(round_trip.div_euclid(2))
}

#[cfg(test)]
mod tests {
    use super::clock_fix;

    #[test]
    fn test_clock_fix_halves_round_trip() {
        // Sent at 100, server authenticated 5000..5010, answer seen at 130.
        assert_eq!(clock_fix(130, 100, 5000, 5010), Some(-4890));
    }

    #[test]
    fn test_clock_fix_floors_odd_round_trips() {
        assert_eq!(clock_fix(103, 100, 50, 50), Some(51));
        assert_eq!(clock_fix(100, 101, 50, 50), Some(50));
    }

    #[test]
    fn test_clock_fix_rejects_overflow() {
        assert_eq!(clock_fix(0, 0, i64::MIN, i64::MAX), None);
        assert_eq!(clock_fix(i64::MAX, i64::MIN, 0, 0), None);
    }
}
