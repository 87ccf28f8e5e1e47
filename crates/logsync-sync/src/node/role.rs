//! Client and server variants of the driver.
//!
//! Both run the same driver; the role decides the initial state, who
//! speaks first, and what happens when the connection closes.

use logsync_log::LogStore;

use super::driver::Driver;
use super::NodeState;
use crate::error::Result;

/// Which side of the handshake a node plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Dials the peer and sends `connect`.
    Client,
    /// Waits for `connect` on an accepted connection and stops when it
    /// closes.
    Server,
}

impl Role {
    pub fn initial_state(self) -> NodeState {
        match self {
            Role::Client => NodeState::Disconnected,
            Role::Server => NodeState::Connecting,
        }
    }
}

impl<S: LogStore + 'static> Driver<S> {
    /// Clock fixing is a client feature, on unless disabled.
    pub(super) fn fix_time(&self) -> bool {
        self.role == Role::Client && self.config.fix_time != Some(false)
    }

    /// The connection opened.
    pub(super) fn on_connect(&mut self) -> Result<()> {
        self.status.connected = true;
        self.delay_ping();
        self.set_state(NodeState::Connecting);
        match self.role {
            Role::Client => self.send_connect(),
            Role::Server => {
                // Wait for the client's `connect`.
                self.start_timeout();
                Ok(())
            }
        }
    }

    /// The connection closed.
    pub(super) fn role_on_disconnect(&mut self) {
        if self.role == Role::Server {
            self.stop();
        }
    }

    /// Server bookkeeping when `connect` arrives.
    pub(super) fn role_on_connect_message(&mut self) {
        if self.role == Role::Server {
            self.end_timeout();
        }
    }
}
