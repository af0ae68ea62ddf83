//! Message channel to the embedding host. Envelopes are `{type, data?}` JSON
//! objects; delivery is fire-and-forget in both directions.

use crate::domain::error::{PtahError, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

pub mod types {
    // outbound
    pub const WEBVIEW_READY: &str = "webview:ready";
    pub const CHAT_SEND_MESSAGE: &str = "chat:sendMessage";
    pub const CHAT_NEW_SESSION: &str = "chat:newSession";
    pub const CONTEXT_GET_FILES: &str = "context:getFiles";
    pub const CONTEXT_INCLUDE_FILE: &str = "context:includeFile";
    pub const CONTEXT_EXCLUDE_FILE: &str = "context:excludeFile";
    pub const COMMANDS_EXECUTE_TEMPLATE: &str = "commands:executeTemplate";
    pub const STATE_SAVE: &str = "state:save";
    pub const THEME_GET: &str = "theme:get";

    // inbound
    pub const INITIAL_DATA: &str = "initialData";
    pub const CONTEXT_FILES_LOADED: &str = "context:filesLoaded";
    pub const CONTEXT_ERROR: &str = "context:error";
    pub const THEME_CHANGED: &str = "theme:changed";
    pub const STATE_RESTORE: &str = "state:restore";
    pub const CHAT_MESSAGE_ADDED: &str = "chat:messageAdded";
    pub const CHAT_ERROR: &str = "chat:error";
    pub const COMMANDS_TEMPLATES_LOADED: &str = "commands:templatesLoaded";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl HostMessage {
    pub fn new(kind: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

/// Parse one line of the JSON-lines channel.
pub fn decode_line(line: &str) -> Result<HostMessage> {
    let value: Value = serde_json::from_str(line.trim())?;
    if !value.is_object() {
        return Err(PtahError::MalformedPayload(
            "host message must be a JSON object".to_string(),
        ));
    }
    if !value.get("type").is_some_and(Value::is_string) {
        return Err(PtahError::MalformedPayload(
            "host message is missing a string `type`".to_string(),
        ));
    }
    Ok(serde_json::from_value(value)?)
}

pub trait HostTransport {
    fn post(&self, message: &HostMessage) -> Result<()>;
}

/// Writes each outbound envelope as a single JSON line.
pub struct JsonLinesTransport<W: Write> {
    writer: RefCell<W>,
}

impl<W: Write> JsonLinesTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: RefCell::new(writer),
        }
    }
}

impl<W: Write> HostTransport for JsonLinesTransport<W> {
    fn post(&self, message: &HostMessage) -> Result<()> {
        let line = serde_json::to_string(message)?;
        let mut writer = self.writer.borrow_mut();
        writeln!(writer, "{}", line).map_err(|e| PtahError::Transport(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| PtahError::Transport(e.to_string()))?;
        Ok(())
    }
}

/// Stand-in used when no host is attached. Records what would have been sent.
#[derive(Default, Clone)]
pub struct MockTransport {
    sent: Rc<RefCell<Vec<HostMessage>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<HostMessage> {
        self.sent.borrow().clone()
    }

    pub fn sent_of_type(&self, kind: &str) -> Vec<HostMessage> {
        self.sent
            .borrow()
            .iter()
            .filter(|m| m.is(kind))
            .cloned()
            .collect()
    }
}

impl HostTransport for MockTransport {
    fn post(&self, message: &HostMessage) -> Result<()> {
        debug!("Mock host received {}", message.kind);
        self.sent.borrow_mut().push(message.clone());
        Ok(())
    }
}

pub struct HostBridge {
    transport: Box<dyn HostTransport>,
    listeners: RefCell<Vec<Sender<HostMessage>>>,
}

impl HostBridge {
    pub fn new(transport: Box<dyn HostTransport>) -> Self {
        Self {
            transport,
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub fn mock() -> (Rc<Self>, MockTransport) {
        let transport = MockTransport::new();
        let bridge = Rc::new(Self::new(Box::new(transport.clone())));
        (bridge, transport)
    }

    /// Send a message to the host. Failures are logged, never raised:
    /// outbound delivery is fire-and-forget.
    pub fn post(&self, kind: &str, data: Option<Value>) {
        let message = HostMessage::new(kind, data);
        if let Err(e) = self.transport.post(&message) {
            warn!("Failed to post {} to host: {}", kind, e);
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        self.listeners.borrow_mut().push(tx);
        Subscription {
            receiver: rx,
            types: None,
        }
    }

    /// Broadcast an inbound message to every live subscription.
    pub fn dispatch(&self, message: HostMessage) {
        debug!("Dispatching host message {}", message.kind);
        self.listeners
            .borrow_mut()
            .retain(|listener| listener.send(message.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

/// Receiving end of a broadcast. Dropping it unsubscribes.
pub struct Subscription {
    receiver: Receiver<HostMessage>,
    types: Option<Vec<String>>,
}

impl Subscription {
    pub fn with_types(mut self, types: &[&str]) -> Self {
        self.types = Some(types.iter().map(|t| t.to_string()).collect());
        self
    }

    fn accepts(&self, message: &HostMessage) -> bool {
        match &self.types {
            Some(types) => types.iter().any(|t| message.is(t)),
            None => true,
        }
    }

    /// Next pending message that passes this subscription's type filter.
    pub fn try_next(&self) -> Option<HostMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) if self.accepts(&message) => return Some(message),
                Ok(_) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    pub fn drain(&self) -> Vec<HostMessage> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_line() {
        let message = decode_line(r#"{"type":"context:filesLoaded","data":{"files":[]}}"#).unwrap();
        assert_eq!(message.kind, types::CONTEXT_FILES_LOADED);
        assert_eq!(message.data, Some(json!({"files": []})));

        let bare = decode_line(r#"{"type":"webview:ready"}"#).unwrap();
        assert!(bare.data.is_none());
    }

    #[test]
    fn test_decode_line_rejects_malformed() {
        assert!(decode_line("not json").is_err());
        assert!(matches!(
            decode_line("[1,2]"),
            Err(PtahError::MalformedPayload(_))
        ));
        assert!(matches!(
            decode_line(r#"{"data":1}"#),
            Err(PtahError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_json_lines_transport_writes_one_line_per_message() {
        let transport = JsonLinesTransport::new(Vec::new());
        transport
            .post(&HostMessage::new(types::WEBVIEW_READY, None))
            .unwrap();
        transport
            .post(&HostMessage::new(types::STATE_SAVE, Some(json!({"a": 1}))))
            .unwrap();

        let written = String::from_utf8(transport.writer.into_inner()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"type":"webview:ready"}"#);
        assert_eq!(lines[1], r#"{"type":"state:save","data":{"a":1}}"#);
    }

    #[test]
    fn test_broadcast_reaches_every_subscriber() {
        let (bridge, _) = HostBridge::mock();
        let all = bridge.subscribe();
        let theme_only = bridge.subscribe().with_types(&[types::THEME_CHANGED]);

        bridge.dispatch(HostMessage::new(types::CONTEXT_ERROR, None));
        bridge.dispatch(HostMessage::new(types::THEME_CHANGED, None));

        assert_eq!(all.drain().len(), 2);
        let themed = theme_only.drain();
        assert_eq!(themed.len(), 1);
        assert!(themed[0].is(types::THEME_CHANGED));
    }

    #[test]
    fn test_dropped_subscription_is_removed() {
        let (bridge, _) = HostBridge::mock();
        let keep = bridge.subscribe();
        {
            let _gone = bridge.subscribe();
        }
        assert_eq!(bridge.subscriber_count(), 2);

        bridge.dispatch(HostMessage::new(types::INITIAL_DATA, None));

        assert_eq!(bridge.subscriber_count(), 1);
        assert_eq!(keep.drain().len(), 1);
    }

    #[test]
    fn test_post_goes_through_transport() {
        let (bridge, transport) = HostBridge::mock();
        bridge.post(types::CONTEXT_GET_FILES, None);
        assert_eq!(transport.sent_of_type(types::CONTEXT_GET_FILES).len(), 1);
    }
}
