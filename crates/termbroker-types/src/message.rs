//! Frame types exchanged over `/terminal/ws/{session_id}`.

use serde::{Deserialize, Serialize};

/// Messages a client sends to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Input { data: String },
    Resize { rows: u16, cols: u16 },
    Ping,
    Close,
}

/// Messages the broker sends to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Output {
        data: String,
    },
    Reconnect {
        data: String,
        message: String,
    },
    ReconnectFailed {
        message: String,
    },
    Error {
        message: String,
    },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_tags_round_trip() {
        let msg = ClientMessage::Resize { rows: 40, cols: 120 };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"resize","rows":40,"cols":120}"#);
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        matches!(back, ClientMessage::Resize { rows: 40, cols: 120 });
    }

    #[test]
    fn server_message_output_shape() {
        let msg = ServerMessage::Output { data: "hi\n".into() };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "output");
        assert_eq!(json["data"], "hi\n");
    }

    #[test]
    fn unknown_client_field_is_rejected_not_panicking() {
        let res: Result<ClientMessage, _> = serde_json::from_str(r#"{"type":"bogus"}"#);
        assert!(res.is_err());
    }
}
