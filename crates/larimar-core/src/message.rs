//! Wire frames.
//!
//! Each direction is a closed sum type, exhaustively matched: adding a new
//! frame kind is a compile-time-checked change. Frames travel as JSON
//! arrays whose first element names the frame.
//!
//! Decode errors are values, not panics: the connection logs and drops the
//! single bad frame and keeps the socket alive.

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::event::Event;
use crate::filter::Filter;

/// Outbound commands a client sends to a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Open or replace the subscription's filter set.
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },
    /// Close a subscription.
    Close { subscription_id: String },
    /// Publish an event.
    Event { event: Event },
}

impl ClientMessage {
    /// Serialize to the wire form.
    pub fn to_json(&self) -> String {
        match self {
            Self::Req {
                subscription_id,
                filters,
            } => {
                let mut arr = vec![json!("REQ"), json!(subscription_id)];
                arr.extend(filters.iter().map(|f| json!(f)));
                Value::Array(arr).to_string()
            }
            Self::Close { subscription_id } => json!(["CLOSE", subscription_id]).to_string(),
            Self::Event { event } => json!(["EVENT", event]).to_string(),
        }
    }
}

/// Inbound frames a relay sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// A stored or live event matching a subscription.
    Event {
        subscription_id: String,
        event: Event,
    },
    /// End of stored events: all historical matches have been sent.
    Eose { subscription_id: String },
    /// Result of a published event.
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    /// The relay closed a subscription.
    Closed {
        subscription_id: String,
        message: String,
    },
    /// Human-readable relay notice.
    Notice { message: String },
}

impl RelayMessage {
    /// Decode a wire frame.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let arr = value
            .as_array()
            .ok_or_else(|| Error::MalformedFrame("frame is not an array".to_string()))?;
        let tag = arr
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedFrame("missing frame tag".to_string()))?;

        let str_at = |i: usize| -> Result<String> {
            arr.get(i)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::MalformedFrame(format!("{tag}: missing field {i}")))
        };

        match tag {
            "EVENT" => {
                let subscription_id = str_at(1)?;
                let event_value = arr
                    .get(2)
                    .ok_or_else(|| Error::MalformedFrame("EVENT: missing payload".to_string()))?;
                let event: Event = serde_json::from_value(event_value.clone())?;
                Ok(Self::Event {
                    subscription_id,
                    event,
                })
            }
            "EOSE" => Ok(Self::Eose {
                subscription_id: str_at(1)?,
            }),
            "OK" => Ok(Self::Ok {
                event_id: str_at(1)?,
                accepted: arr.get(2).and_then(Value::as_bool).ok_or_else(|| {
                    Error::MalformedFrame("OK: missing accepted flag".to_string())
                })?,
                message: str_at(3).unwrap_or_default(),
            }),
            "CLOSED" => Ok(Self::Closed {
                subscription_id: str_at(1)?,
                message: str_at(2).unwrap_or_default(),
            }),
            "NOTICE" => Ok(Self::Notice {
                message: str_at(1)?,
            }),
            other => Err(Error::MalformedFrame(format!("unknown frame '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_event() -> Event {
        let mut event = Event {
            id: String::new(),
            pubkey: hex::encode([1u8; 32]),
            created_at: 1_700_000_000,
            kind: 1,
            tags: vec![],
            content: "hi".to_string(),
            sig: hex::encode([0u8; 64]),
        };
        event.id = event.compute_id();
        event
    }

    #[test]
    fn test_req_wire_shape() {
        let msg = ClientMessage::Req {
            subscription_id: "ab12".to_string(),
            filters: vec![Filter::new().kinds([1]).since(100)],
        };
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value[0], "REQ");
        assert_eq!(value[1], "ab12");
        assert_eq!(value[2]["kinds"][0], 1);
        assert_eq!(value[2]["since"], 100);
    }

    #[test]
    fn test_close_wire_shape() {
        let msg = ClientMessage::Close {
            subscription_id: "ab12".to_string(),
        };
        assert_eq!(msg.to_json(), r#"["CLOSE","ab12"]"#);
    }

    #[test]
    fn test_parse_event_frame() {
        let event = test_event();
        let frame = json!(["EVENT", "sub1", event]).to_string();
        match RelayMessage::from_json(&frame).unwrap() {
            RelayMessage::Event {
                subscription_id,
                event: parsed,
            } => {
                assert_eq!(subscription_id, "sub1");
                assert_eq!(parsed, event);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_parse_eose_ok_closed_notice() {
        assert_eq!(
            RelayMessage::from_json(r#"["EOSE","sub1"]"#).unwrap(),
            RelayMessage::Eose {
                subscription_id: "sub1".to_string()
            }
        );
        assert_eq!(
            RelayMessage::from_json(r#"["OK","abcd",true,"stored"]"#).unwrap(),
            RelayMessage::Ok {
                event_id: "abcd".to_string(),
                accepted: true,
                message: "stored".to_string()
            }
        );
        assert_eq!(
            RelayMessage::from_json(r#"["CLOSED","sub1","auth-required: nope"]"#).unwrap(),
            RelayMessage::Closed {
                subscription_id: "sub1".to_string(),
                message: "auth-required: nope".to_string()
            }
        );
        assert_eq!(
            RelayMessage::from_json(r#"["NOTICE","slow down"]"#).unwrap(),
            RelayMessage::Notice {
                message: "slow down".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(RelayMessage::from_json("not json").is_err());
        assert!(RelayMessage::from_json("{}").is_err());
        assert!(RelayMessage::from_json(r#"["AUTH","challenge"]"#).is_err());
        assert!(RelayMessage::from_json(r#"["EVENT","sub1"]"#).is_err());
        assert!(RelayMessage::from_json(r#"["OK","abcd"]"#).is_err());
        assert!(RelayMessage::from_json(r#"[42]"#).is_err());
    }
}
