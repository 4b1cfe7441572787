//! Inbound channel events.
//!
//! Everything the session delivers to the tracker, as one tagged JSON object
//! per event. Delta payloads stay as raw JSON until the target buffer parses
//! them, so an unknown delta type only costs that one delta.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::SerializedEditorState;
use crate::types::{ChatUser, CursorId, EditorId, TextRange, Timestamp, Version};

/// An event received from the session channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ChannelEvent {
    /// A buffer was shared, with its full state.
    EditorOpened {
        state: SerializedEditorState,
        #[serde(default = "default_true")]
        must_perform_change: bool,
    },

    /// A delta for one buffer. Must carry the buffer `id`.
    Delta(Value),

    /// A remote cursor moved, selected or went away.
    Cursor(CursorEvent),

    /// A user disconnected; all their cursors go.
    UserLeft { user: ChatUser },

    /// Switch every buffer to a version. `-1` means live.
    Version {
        version: Version,
        #[serde(default)]
        timestamp: Option<Timestamp>,
    },
}

fn default_true() -> bool {
    true
}

impl ChannelEvent {
    /// Parse one event from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A cursor update for one buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorEvent {
    /// Target buffer.
    pub id: EditorId,
    pub cursor_id: CursorId,
    pub user: ChatUser,
    #[serde(flatten)]
    pub change: CursorChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CursorChange {
    Position { position: usize },
    Selection { range: TextRange },
    Destroy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta_event() {
        let event = ChannelEvent::from_json(
            r#"{"event":"delta","id":3,"type":"title","timestamp":5,"oldTitle":"a","newTitle":"b"}"#,
        )
        .unwrap();
        let ChannelEvent::Delta(payload) = event else {
            panic!("expected delta");
        };
        assert_eq!(payload["id"], 3);
        assert_eq!(payload["type"], "title");
        assert!(payload.get("event").is_none());
    }

    #[test]
    fn test_parse_cursor_event() {
        let event = ChannelEvent::from_json(
            r#"{"event":"cursor","id":1,"cursorId":"c1","user":{"id":"bob","name":"Bob"},"type":"selection","range":[2,4]}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ChannelEvent::Cursor(CursorEvent {
                id: EditorId(1),
                cursor_id: "c1".into(),
                user: ChatUser::new("bob", "Bob"),
                change: CursorChange::Selection {
                    range: TextRange::new(2, 4),
                },
            })
        );
    }

    #[test]
    fn test_parse_editor_opened_defaults() {
        let event =
            ChannelEvent::from_json(r#"{"event":"editor-opened","state":{"id":9}}"#).unwrap();
        let ChannelEvent::EditorOpened {
            state,
            must_perform_change,
        } = event
        else {
            panic!("expected editor-opened");
        };
        assert_eq!(state.id, EditorId(9));
        assert!(state.is_open);
        assert!(must_perform_change);
    }

    #[test]
    fn test_parse_version_event() {
        let event = ChannelEvent::from_json(r#"{"event":"version","version":-1}"#).unwrap();
        assert_eq!(
            event,
            ChannelEvent::Version {
                version: Version::Current,
                timestamp: None,
            }
        );

        let event =
            ChannelEvent::from_json(r#"{"event":"version","version":4,"timestamp":99}"#).unwrap();
        assert_eq!(
            event,
            ChannelEvent::Version {
                version: Version::At(4),
                timestamp: Some(99),
            }
        );
    }

    #[test]
    fn test_user_left_round_trip() {
        let event = ChannelEvent::UserLeft {
            user: ChatUser::new("eve", "Eve"),
        };
        let text = event.to_json().unwrap();
        assert!(text.contains(r#""event":"user-left""#));
        assert_eq!(ChannelEvent::from_json(&text).unwrap(), event);
    }
}
