//! Wire messages exchanged with the voice agent. Every message is a JSON
//! object tagged by its `type` field.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key/value context sent with the init handshake.
pub type ContextData = BTreeMap<String, String>;

#[derive(Serialize)]
struct MetaData<'a> {
    context_data: BTreeMap<&'a str, &'a str>,
}

// Init Message，连接建立后发送一次
#[derive(Serialize)]
struct InitMessage<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    meta_data: MetaData<'a>,
}

#[derive(Serialize)]
struct AudioMessage<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    data: &'a str,
}

/// Serialises the init packet. Entries with an empty value are left out.
pub fn init_packet(context: &ContextData) -> serde_json::Result<String> {
    let context_data = context
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    serde_json::to_string(&InitMessage {
        msg_type: "init",
        meta_data: MetaData { context_data },
    })
}

/// Serialises one capture frame that is already base64 encoded.
pub fn audio_packet(data: &str) -> serde_json::Result<String> {
    serde_json::to_string(&AudioMessage {
        msg_type: "audio",
        data,
    })
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    msg_type: String,
    data: Option<Value>,
}

/// Inbound message from the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Ack,
    Audio { data: String },
    /// The whole mark object, echoed back verbatim after playback reaches it.
    Mark(Value),
    Clear,
    Other(String),
}

impl ServerMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let envelope = Envelope::deserialize(&value)?;

        Ok(match envelope.msg_type.as_str() {
            "ack" => ServerMessage::Ack,
            "audio" => ServerMessage::Audio {
                data: envelope
                    .data
                    .as_ref()
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .ok_or_else(|| serde_json::Error::missing_field("data"))?,
            },
            "mark" => ServerMessage::Mark(value),
            "clear" => ServerMessage::Clear,
            _ => ServerMessage::Other(envelope.msg_type),
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            ServerMessage::Ack => "ack",
            ServerMessage::Audio { .. } => "audio",
            ServerMessage::Mark(_) => "mark",
            ServerMessage::Clear => "clear",
            ServerMessage::Other(kind) => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn init_packet_drops_empty_values() {
        let mut context = ContextData::new();
        context.insert("name".to_string(), "Ada".to_string());
        context.insert("phone".to_string(), String::new());

        let packet: Value = serde_json::from_str(&init_packet(&context).unwrap()).unwrap();
        assert_eq!(
            packet,
            json!({"type": "init", "meta_data": {"context_data": {"name": "Ada"}}})
        );
    }

    #[test]
    fn init_packet_with_no_context() {
        let packet: Value =
            serde_json::from_str(&init_packet(&ContextData::new()).unwrap()).unwrap();
        assert_eq!(packet["meta_data"]["context_data"], json!({}));
    }

    #[test]
    fn audio_packet_shape() {
        let packet: Value = serde_json::from_str(&audio_packet("AAA=").unwrap()).unwrap();
        assert_eq!(packet, json!({"type": "audio", "data": "AAA="}));
    }

    #[test]
    fn parse_inbound_kinds() {
        assert_eq!(ServerMessage::parse(r#"{"type":"ack"}"#).unwrap(), ServerMessage::Ack);
        assert_eq!(
            ServerMessage::parse(r#"{"type":"clear"}"#).unwrap(),
            ServerMessage::Clear
        );
        assert_eq!(
            ServerMessage::parse(r#"{"type":"audio","data":"UklGRg=="}"#).unwrap(),
            ServerMessage::Audio {
                data: "UklGRg==".to_string()
            }
        );
        assert_eq!(
            ServerMessage::parse(r#"{"type":"pong"}"#).unwrap(),
            ServerMessage::Other("pong".to_string())
        );
    }

    #[test]
    fn mark_keeps_whole_payload() {
        let text = r#"{"type":"mark","name":"turn-3","data":{"seq":7}}"#;
        let ServerMessage::Mark(payload) = ServerMessage::parse(text).unwrap() else {
            panic!("expected mark");
        };
        assert_eq!(payload, json!({"type":"mark","name":"turn-3","data":{"seq":7}}));
    }

    #[test]
    fn malformed_messages_are_errors() {
        assert!(ServerMessage::parse("not json").is_err());
        assert!(ServerMessage::parse(r#"{"data":"x"}"#).is_err());
        assert!(ServerMessage::parse(r#"{"type":"audio"}"#).is_err());
    }
}
