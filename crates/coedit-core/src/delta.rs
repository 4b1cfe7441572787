//! Invertible, timestamped changes to one buffer.
//!
//! Every delta kind carries both directions: `apply` performs the change and
//! `revert` undoes it. Both act on the buffer host and on the buffer's
//! metadata (title, grammar, open and modified flags).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::error::DeltaError;
use crate::text::{AnchorId, BufferHost};
use crate::types::{TextRange, Timestamp};

/// Delta `type` tags understood by this engine.
pub const DELTA_TYPES: [&str; 6] = ["open", "edit", "title", "grammar", "modified", "destroy"];

/// Buffer metadata touched by deltas.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferMeta {
    pub title: SmolStr,
    pub grammar: SmolStr,
    pub is_open: bool,
    pub is_modified: bool,
}

/// One range replacement as it travels over the channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedChange {
    pub old_range: TextRange,
    pub new_range: TextRange,
    pub old_text: String,
    pub new_text: String,
}

/// Kind-specific payload of a serialized delta.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SerializedDeltaKind {
    #[serde(rename_all = "camelCase")]
    Open {
        #[serde(default)]
        grammar_name: SmolStr,
        #[serde(default)]
        title: SmolStr,
        #[serde(default)]
        contents: String,
    },
    Edit {
        changes: Vec<SerializedChange>,
    },
    #[serde(rename_all = "camelCase")]
    Title {
        #[serde(default)]
        old_title: SmolStr,
        new_title: SmolStr,
    },
    #[serde(rename_all = "camelCase")]
    Grammar {
        #[serde(default)]
        old_grammar_name: SmolStr,
        new_grammar_name: SmolStr,
    },
    #[serde(rename_all = "camelCase")]
    Modified {
        #[serde(default)]
        old_modified: bool,
        modified: bool,
    },
    Destroy,
}

/// A delta as it travels over the channel.
///
/// `{"type": "...", "timestamp": ..., ...kind-specific fields}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedDelta {
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub kind: SerializedDeltaKind,
}

impl SerializedDelta {
    /// Parse a delta from an already-deserialized event object.
    ///
    /// Extra fields (such as the editor `id`) are ignored.
    pub fn from_value(value: &Value) -> Result<Self, DeltaError> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DeltaError::MissingType)?;
        if !DELTA_TYPES.contains(&tag) {
            return Err(DeltaError::UnknownType(SmolStr::new(tag)));
        }
        serde_json::from_value(value.clone()).map_err(DeltaError::Malformed)
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            SerializedDeltaKind::Open { .. } => "open",
            SerializedDeltaKind::Edit { .. } => "edit",
            SerializedDeltaKind::Title { .. } => "title",
            SerializedDeltaKind::Grammar { .. } => "grammar",
            SerializedDeltaKind::Modified { .. } => "modified",
            SerializedDeltaKind::Destroy => "destroy",
        }
    }
}

/// A range replacement plus the anchors that keep it valid across reordering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub old_range: TextRange,
    pub new_range: TextRange,
    pub old_text: String,
    pub new_text: String,
    /// Tracks where `old_text` is (valid while the change is not applied).
    old_anchor: Option<AnchorId>,
    /// Tracks where `new_text` is (valid while the change is applied).
    new_anchor: Option<AnchorId>,
    /// What the last apply actually replaced. Reverting restores this, so a
    /// revert is an exact inverse even if the buffer didn't hold `old_text`.
    removed: Option<String>,
}

impl Change {
    fn from_serialized(change: SerializedChange) -> Self {
        Self {
            old_range: change.old_range,
            new_range: change.new_range,
            old_text: change.old_text,
            new_text: change.new_text,
            old_anchor: None,
            new_anchor: None,
            removed: None,
        }
    }

    fn serialize(&self) -> SerializedChange {
        SerializedChange {
            old_range: self.old_range,
            new_range: self.new_range,
            old_text: self.old_text.clone(),
            new_text: self.new_text.clone(),
        }
    }

    /// Capture anchors for both ranges against the buffer as it is now.
    pub fn capture_anchors<H: BufferHost>(&mut self, host: &mut H) {
        self.old_anchor = Some(host.anchor(self.old_range));
        self.new_anchor = Some(host.anchor(self.new_range));
    }

    pub fn old_anchor(&self) -> Option<AnchorId> {
        self.old_anchor
    }

    pub fn new_anchor(&self) -> Option<AnchorId> {
        self.new_anchor
    }

    /// Where this change currently acts: the old text's range when it is
    /// unapplied.
    pub fn effective_old_range<H: BufferHost>(&self, host: &H) -> TextRange {
        self.old_anchor
            .and_then(|a| host.anchor_range(a))
            .unwrap_or(self.old_range)
    }

    /// The new text's range when the change is applied.
    pub fn effective_new_range<H: BufferHost>(&self, host: &H) -> TextRange {
        self.new_anchor
            .and_then(|a| host.anchor_range(a))
            .unwrap_or(self.new_range)
    }

    /// Acts on the literal `old_range`, not the anchor, so the buffer always
    /// equals every logged delta applied once in timestamp order. Replay runs
    /// on exactly the deltas logged before this one, the buffer that range
    /// was taken against.
    fn apply<H: BufferHost>(&mut self, host: &mut H) {
        let range = self.old_range.clamp(host.len_chars());
        self.removed = Some(host.slice(range));
        host.replace_text(range, &self.new_text);
        let placed = TextRange::new(range.start, range.start + self.new_text.chars().count());
        self.new_anchor = Some(reanchor(host, self.new_anchor, placed));
    }

    /// Undo at wherever the new text has been carried by later deltas.
    fn revert<H: BufferHost>(&mut self, host: &mut H) {
        let range = self.effective_new_range(host);
        let restored = self.removed.take().unwrap_or_else(|| self.old_text.clone());
        host.replace_text(range, &restored);
        let placed = TextRange::new(range.start, range.start + restored.chars().count());
        self.old_anchor = Some(reanchor(host, self.old_anchor, placed));
    }
}

/// Replace `previous` with a fresh anchor on `range`.
fn reanchor<H: BufferHost>(host: &mut H, previous: Option<AnchorId>, range: TextRange) -> AnchorId {
    if let Some(previous) = previous {
        host.release_anchor(previous);
    }
    host.anchor(range)
}

/// Kind-specific part of a delta.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeltaKind {
    Open {
        grammar: SmolStr,
        title: SmolStr,
        contents: String,
    },
    Edit {
        changes: Vec<Change>,
    },
    Title {
        old: SmolStr,
        new: SmolStr,
    },
    Grammar {
        old: SmolStr,
        new: SmolStr,
    },
    Modified {
        old: bool,
        new: bool,
    },
    Destroy,
}

/// One invertible, timestamped change to a buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delta {
    timestamp: Timestamp,
    kind: DeltaKind,
}

impl Delta {
    pub fn new(timestamp: Timestamp, kind: DeltaKind) -> Self {
        Self { timestamp, kind }
    }

    pub fn from_serialized(delta: SerializedDelta) -> Self {
        let kind = match delta.kind {
            SerializedDeltaKind::Open {
                grammar_name,
                title,
                contents,
            } => DeltaKind::Open {
                grammar: grammar_name,
                title,
                contents,
            },
            SerializedDeltaKind::Edit { changes } => DeltaKind::Edit {
                changes: changes.into_iter().map(Change::from_serialized).collect(),
            },
            SerializedDeltaKind::Title {
                old_title,
                new_title,
            } => DeltaKind::Title {
                old: old_title,
                new: new_title,
            },
            SerializedDeltaKind::Grammar {
                old_grammar_name,
                new_grammar_name,
            } => DeltaKind::Grammar {
                old: old_grammar_name,
                new: new_grammar_name,
            },
            SerializedDeltaKind::Modified {
                old_modified,
                modified,
            } => DeltaKind::Modified {
                old: old_modified,
                new: modified,
            },
            SerializedDeltaKind::Destroy => DeltaKind::Destroy,
        };
        Self::new(delta.timestamp, kind)
    }

    pub fn serialize(&self) -> SerializedDelta {
        let kind = match &self.kind {
            DeltaKind::Open {
                grammar,
                title,
                contents,
            } => SerializedDeltaKind::Open {
                grammar_name: grammar.clone(),
                title: title.clone(),
                contents: contents.clone(),
            },
            DeltaKind::Edit { changes } => SerializedDeltaKind::Edit {
                changes: changes.iter().map(Change::serialize).collect(),
            },
            DeltaKind::Title { old, new } => SerializedDeltaKind::Title {
                old_title: old.clone(),
                new_title: new.clone(),
            },
            DeltaKind::Grammar { old, new } => SerializedDeltaKind::Grammar {
                old_grammar_name: old.clone(),
                new_grammar_name: new.clone(),
            },
            DeltaKind::Modified { old, new } => SerializedDeltaKind::Modified {
                old_modified: *old,
                modified: *new,
            },
            DeltaKind::Destroy => SerializedDeltaKind::Destroy,
        };
        SerializedDelta {
            timestamp: self.timestamp,
            kind,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn kind(&self) -> &DeltaKind {
        &self.kind
    }

    pub fn changes(&self) -> &[Change] {
        match &self.kind {
            DeltaKind::Edit { changes } => changes,
            _ => &[],
        }
    }

    /// Mint anchors for every change against the buffer as it is now.
    pub fn capture_anchors<H: BufferHost>(&mut self, host: &mut H) {
        if let DeltaKind::Edit { changes } = &mut self.kind {
            for change in changes {
                change.capture_anchors(host);
            }
        }
    }

    /// Perform the delta.
    pub fn apply<H: BufferHost>(&mut self, host: &mut H, meta: &mut BufferMeta) {
        match &mut self.kind {
            DeltaKind::Open {
                grammar,
                title,
                contents,
            } => {
                meta.is_open = true;
                meta.title = title.clone();
                meta.grammar = grammar.clone();
                host.set_grammar(grammar);
                host.set_text(contents);
            }
            DeltaKind::Edit { changes } => {
                for change in changes.iter_mut() {
                    change.apply(host);
                }
            }
            DeltaKind::Title { new, .. } => meta.title = new.clone(),
            DeltaKind::Grammar { new, .. } => {
                meta.grammar = new.clone();
                host.set_grammar(new);
            }
            DeltaKind::Modified { new, .. } => meta.is_modified = *new,
            DeltaKind::Destroy => meta.is_open = false,
        }
    }

    /// Undo the delta.
    pub fn revert<H: BufferHost>(&mut self, host: &mut H, meta: &mut BufferMeta) {
        match &mut self.kind {
            DeltaKind::Open { .. } => {
                meta.title = SmolStr::default();
                meta.is_open = false;
                host.set_text("");
            }
            DeltaKind::Edit { changes } => {
                for change in changes.iter_mut().rev() {
                    change.revert(host);
                }
            }
            DeltaKind::Title { old, .. } => meta.title = old.clone(),
            DeltaKind::Grammar { old, .. } => {
                meta.grammar = old.clone();
                host.set_grammar(old);
            }
            DeltaKind::Modified { old, .. } => meta.is_modified = *old,
            DeltaKind::Destroy => meta.is_open = true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RopeBuffer;
    use serde_json::json;

    fn edit(ts: Timestamp, old: [usize; 2], new: [usize; 2], old_text: &str, new_text: &str) -> Delta {
        Delta::from_serialized(SerializedDelta {
            timestamp: ts,
            kind: SerializedDeltaKind::Edit {
                changes: vec![SerializedChange {
                    old_range: old.into(),
                    new_range: new.into(),
                    old_text: old_text.into(),
                    new_text: new_text.into(),
                }],
            },
        })
    }

    #[test]
    fn test_parse_open() {
        let value = json!({
            "id": 1,
            "type": "open",
            "timestamp": 100,
            "grammarName": "Python",
            "title": "main.py",
            "contents": "print(1)"
        });
        let delta = SerializedDelta::from_value(&value).unwrap();
        assert_eq!(delta.timestamp, 100);
        assert_eq!(delta.type_name(), "open");
        assert_eq!(
            delta.kind,
            SerializedDeltaKind::Open {
                grammar_name: "Python".into(),
                title: "main.py".into(),
                contents: "print(1)".into(),
            }
        );
    }

    #[test]
    fn test_parse_edit() {
        let value = json!({
            "type": "edit",
            "timestamp": 200,
            "changes": [{
                "oldRange": [0, 5],
                "newRange": [0, 2],
                "oldText": "hello",
                "newText": "hi"
            }]
        });
        let delta = Delta::from_serialized(SerializedDelta::from_value(&value).unwrap());
        assert_eq!(delta.changes().len(), 1);
        assert_eq!(delta.changes()[0].old_range, TextRange::new(0, 5));
        assert_eq!(delta.changes()[0].new_text, "hi");
    }

    #[test]
    fn test_parse_destroy() {
        let value = json!({ "type": "destroy", "timestamp": 9 });
        let delta = SerializedDelta::from_value(&value).unwrap();
        assert_eq!(delta.kind, SerializedDeltaKind::Destroy);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let value = json!({ "type": "teleport", "timestamp": 1 });
        assert!(matches!(
            SerializedDelta::from_value(&value),
            Err(DeltaError::UnknownType(t)) if t == "teleport"
        ));
    }

    #[test]
    fn test_missing_type_rejected() {
        let value = json!({ "timestamp": 1 });
        assert!(matches!(
            SerializedDelta::from_value(&value),
            Err(DeltaError::MissingType)
        ));
    }

    #[test]
    fn test_malformed_payload_rejected() {
        let value = json!({ "type": "title", "timestamp": "soon" });
        assert!(matches!(
            SerializedDelta::from_value(&value),
            Err(DeltaError::Malformed(_))
        ));
    }

    #[test]
    fn test_change_apply_revert_round_trip() {
        let mut host = RopeBuffer::from_str("hello");
        let mut meta = BufferMeta::default();
        let mut delta = edit(200, [0, 5], [0, 2], "hello", "hi");
        delta.capture_anchors(&mut host);

        delta.apply(&mut host, &mut meta);
        assert_eq!(host.text(), "hi");
        assert_eq!(
            delta.changes()[0].effective_new_range(&host),
            TextRange::new(0, 2)
        );

        delta.revert(&mut host, &mut meta);
        assert_eq!(host.text(), "hello");
        assert_eq!(
            delta.changes()[0].effective_old_range(&host),
            TextRange::new(0, 5)
        );
    }

    #[test]
    fn test_revert_restores_what_apply_replaced() {
        // The buffer doesn't hold the declared old text.
        let mut host = RopeBuffer::from_str("xyz");
        let mut meta = BufferMeta::default();
        let mut delta = edit(5, [0, 5], [0, 2], "hello", "hi");
        delta.capture_anchors(&mut host);

        delta.apply(&mut host, &mut meta);
        assert_eq!(host.text(), "hi");
        delta.revert(&mut host, &mut meta);
        assert_eq!(host.text(), "xyz");
    }

    #[test]
    fn test_apply_uses_literal_range_not_anchor() {
        let mut host = RopeBuffer::from_str("abc");
        let mut meta = BufferMeta::default();
        let mut delta = edit(5, [1, 2], [1, 2], "b", "B");
        delta.capture_anchors(&mut host);

        // A later splice carries the anchor to [3, 4].
        host.replace_text(TextRange::collapsed(0), ">>");
        delta.apply(&mut host, &mut meta);
        assert_eq!(host.text(), ">Babc");

        delta.revert(&mut host, &mut meta);
        assert_eq!(host.text(), ">>abc");
    }

    #[test]
    fn test_multi_change_edit_reverts_in_reverse() {
        let mut host = RopeBuffer::from_str("abc");
        let mut meta = BufferMeta::default();
        let mut delta = Delta::from_serialized(SerializedDelta {
            timestamp: 1,
            kind: SerializedDeltaKind::Edit {
                changes: vec![
                    SerializedChange {
                        old_range: [0, 1].into(),
                        new_range: [0, 3].into(),
                        old_text: "a".into(),
                        new_text: "AAA".into(),
                    },
                    SerializedChange {
                        old_range: [5, 5].into(),
                        new_range: [5, 6].into(),
                        old_text: "".into(),
                        new_text: "!".into(),
                    },
                ],
            },
        });
        delta.capture_anchors(&mut host);
        delta.apply(&mut host, &mut meta);
        assert_eq!(host.text(), "AAAbc!");

        delta.revert(&mut host, &mut meta);
        assert_eq!(host.text(), "abc");
    }

    #[test]
    fn test_metadata_deltas() {
        let mut host = RopeBuffer::new();
        let mut meta = BufferMeta::default();

        let mut title = Delta::new(
            1,
            DeltaKind::Title {
                old: "a.txt".into(),
                new: "b.txt".into(),
            },
        );
        title.apply(&mut host, &mut meta);
        assert_eq!(meta.title, "b.txt");
        title.revert(&mut host, &mut meta);
        assert_eq!(meta.title, "a.txt");

        let mut grammar = Delta::new(
            2,
            DeltaKind::Grammar {
                old: "Plain Text".into(),
                new: "Rust".into(),
            },
        );
        grammar.apply(&mut host, &mut meta);
        assert_eq!(host.grammar(), Some("Rust"));
        grammar.revert(&mut host, &mut meta);
        assert_eq!(meta.grammar, "Plain Text");

        let mut modified = Delta::new(3, DeltaKind::Modified { old: false, new: true });
        modified.apply(&mut host, &mut meta);
        assert!(meta.is_modified);
        modified.revert(&mut host, &mut meta);
        assert!(!meta.is_modified);

        meta.is_open = true;
        let mut destroy = Delta::new(4, DeltaKind::Destroy);
        destroy.apply(&mut host, &mut meta);
        assert!(!meta.is_open);
        destroy.revert(&mut host, &mut meta);
        assert!(meta.is_open);
    }

    #[test]
    fn test_open_revert_blanks_buffer() {
        let mut host = RopeBuffer::new();
        let mut meta = BufferMeta::default();
        let mut open = Delta::new(
            1,
            DeltaKind::Open {
                grammar: "Plain Text".into(),
                title: "a.txt".into(),
                contents: "hello".into(),
            },
        );
        open.apply(&mut host, &mut meta);
        assert_eq!(host.text(), "hello");
        assert!(meta.is_open);
        assert_eq!(meta.title, "a.txt");

        open.revert(&mut host, &mut meta);
        assert_eq!(host.text(), "");
        assert!(!meta.is_open);
        assert_eq!(meta.title, "");
    }

    #[test]
    fn test_serialize_round_trip_keeps_wire_names() {
        let value = json!({
            "type": "modified",
            "timestamp": 7,
            "oldModified": false,
            "modified": true
        });
        let delta = Delta::from_serialized(SerializedDelta::from_value(&value).unwrap());
        let back = serde_json::to_value(delta.serialize()).unwrap();
        assert_eq!(back, value);
    }
}
