//! Frames exchanged over the real-time socket.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": { ... }}`.

use serde::{Deserialize, Serialize};

use crate::model::Message;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRoom {
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub project_id: String,
    pub receiver_id: String,
    pub text: String,
    /// Milliseconds since the Unix epoch; part of the hashed envelope.
    pub timestamp: i64,
    pub metadata_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRead {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    JoinProject(ProjectRoom),
    LeaveProject(ProjectRoom),
    SendMessage(OutgoingMessage),
    MarkMessageRead(MarkRead),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ready {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: String,
    pub project_id: String,
    pub read_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl SocketError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
            correlation_id: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn correlated(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// The most specific description available.
    pub fn reason(&self) -> &str {
        self.details.as_deref().unwrap_or(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// First frame after a successful, authenticated upgrade.
    Ready(Ready),
    /// Acknowledges `joinProject`; frames for the room follow.
    Joined(ProjectRoom),
    NewMessage(Message),
    MessageRead(ReadReceipt),
    Error(SocketError),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn client_frames_use_event_envelope() {
        let frame = ClientEvent::JoinProject(ProjectRoom {
            project_id: "p1".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({ "event": "joinProject", "data": { "projectId": "p1" } })
        );

        let parsed: ClientEvent = serde_json::from_value(json!({
            "event": "markMessageRead",
            "data": { "messageId": "m1" }
        }))
        .unwrap();
        assert_eq!(
            parsed,
            ClientEvent::MarkMessageRead(MarkRead {
                message_id: "m1".to_string()
            })
        );
    }

    #[test]
    fn send_message_without_correlation_id_parses() {
        let parsed: ClientEvent = serde_json::from_value(json!({
            "event": "sendMessage",
            "data": {
                "projectId": "p1",
                "receiverId": "u2",
                "text": "hi",
                "timestamp": 1,
                "metadataHash": "abc"
            }
        }))
        .unwrap();
        match parsed {
            ClientEvent::SendMessage(msg) => {
                assert_eq!(msg.correlation_id, None);
                assert_eq!(msg.receiver_id, "u2");
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn error_reason_prefers_details() {
        let err = SocketError::new("Failed to send message").with_details("Recipient not found");
        assert_eq!(err.reason(), "Recipient not found");
        let json = serde_json::to_value(ServerEvent::Error(err)).unwrap();
        assert_eq!(json["event"], "error");
        assert!(json["data"].get("correlationId").is_none());
    }
}
