//! `debug` and `headers` messages.

use logsync_log::LogStore;
use serde_json::{Map, Value};

use super::driver::Driver;
use super::events::DebugMessage;
use crate::error::Result;
use crate::messages::Message;

impl<S: LogStore + 'static> Driver<S> {
    pub(super) fn on_debug_message(&mut self, kind: String, text: String) {
        tracing::debug!(kind = %kind, text = %text, "peer debug message");
        self.events.debug.emit(&DebugMessage { kind, text });
    }

    pub(super) fn on_headers_message(&mut self, headers: Map<String, Value>) {
        self.status.remote_headers = headers;
        self.publish();
        self.events.headers.emit(&self.status.remote_headers);
    }

    pub(super) fn set_local_headers(&mut self, headers: Map<String, Value>) -> Result<()> {
        self.local_headers = headers;
        if self.status.connected {
            self.send(Message::Headers(self.local_headers.clone()))?;
        }
        Ok(())
    }
}
