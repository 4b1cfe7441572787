//! Per-buffer delta log and reconciliation.
//!
//! `EditorState` keeps one buffer's deltas sorted by timestamp. A delta that
//! arrives late is folded in by undoing everything newer, inserting it, and
//! replaying forward, so the buffer always equals "every logged delta applied
//! once in timestamp order" no matter what order the network delivered them
//! in.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;

use crate::cursors::{RemoteCursor, RemoteCursorMarker};
use crate::delta::{BufferMeta, Delta, SerializedDelta};
use crate::text::BufferHost;
use crate::types::{ChatUser, CursorId, EditorId, Role, TextRange, Timestamp, Version, VersionContext};

/// Wire form of a whole buffer: metadata, current contents and history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedEditorState {
    pub id: EditorId,
    #[serde(default)]
    pub title: SmolStr,
    #[serde(default, alias = "grammarName")]
    pub grammar: SmolStr,
    #[serde(default)]
    pub modified: bool,
    #[serde(default = "default_open")]
    pub is_open: bool,
    #[serde(default)]
    pub contents: String,
    #[serde(default)]
    pub deltas: Vec<SerializedDelta>,
    #[serde(default)]
    pub cursors: Vec<RemoteCursor>,
}

fn default_open() -> bool {
    true
}

impl SerializedEditorState {
    /// A fresh, empty buffer description.
    pub fn new(id: EditorId) -> Self {
        Self {
            id,
            title: SmolStr::default(),
            grammar: SmolStr::default(),
            modified: false,
            is_open: true,
            contents: String::new(),
            deltas: Vec::new(),
            cursors: Vec::new(),
        }
    }
}

/// One shared buffer: its delta log, metadata and remote cursors.
pub struct EditorState<H> {
    id: EditorId,
    host: H,
    meta: BufferMeta,
    deltas: Vec<Delta>,
    remote_cursors: RemoteCursorMarker,
    version: Version,
    /// Deltas received while showing a historical version, folded in on return.
    pending: Vec<(Delta, bool)>,
}

impl<H: BufferHost> EditorState<H> {
    /// An empty buffer with no history.
    pub fn new(id: EditorId, host: H) -> Self {
        Self {
            id,
            host,
            meta: BufferMeta {
                is_open: true,
                ..BufferMeta::default()
            },
            deltas: Vec::new(),
            remote_cursors: RemoteCursorMarker::new(),
            version: Version::Current,
            pending: Vec::new(),
        }
    }

    /// Build a buffer from its wire form.
    ///
    /// With history, the deltas are replayed in order; without it and with
    /// `must_perform_change`, the host is loaded from `contents` directly.
    pub fn from_serialized(state: SerializedEditorState, host: H, must_perform_change: bool) -> Self {
        let mut editor = Self::new(state.id, host);
        editor.meta = BufferMeta {
            title: state.title,
            grammar: state.grammar,
            is_open: state.is_open,
            is_modified: state.modified,
        };

        if must_perform_change && state.deltas.is_empty() {
            if !editor.meta.grammar.is_empty() {
                editor.host.set_grammar(&editor.meta.grammar);
            }
            editor.host.set_text(&state.contents);
        }

        for delta in state.deltas {
            editor.add_serialized_delta(delta, must_perform_change);
        }

        for cursor in state.cursors {
            if let Some(position) = cursor.position {
                editor.update_remote_cursor(cursor.id.clone(), cursor.user.clone(), position);
            }
            if let Some(range) = cursor.selection {
                editor.update_remote_selection(cursor.id, cursor.user, range);
            }
        }

        editor
    }

    /// Fold an already-deserialized event object into the log.
    ///
    /// Payloads with an unknown or missing `type`, or with fields that don't
    /// match their type, are logged and dropped. Returns whether the delta was
    /// accepted.
    pub fn add_delta(&mut self, payload: &Value, must_perform_change: bool) -> bool {
        match SerializedDelta::from_value(payload) {
            Ok(delta) => self.add_serialized_delta(delta, must_perform_change),
            Err(error) => {
                tracing::warn!(editor = %self.id, %error, "dropping delta");
                #[cfg(feature = "metrics")]
                metrics::counter!("coedit_deltas_dropped_total").increment(1);
                false
            }
        }
    }

    /// Fold a typed delta into the log.
    pub fn add_serialized_delta(&mut self, delta: SerializedDelta, must_perform_change: bool) -> bool {
        self.insert_delta(Delta::from_serialized(delta), must_perform_change);
        true
    }

    fn insert_delta(&mut self, mut delta: Delta, must_perform_change: bool) {
        if !self.version.is_current() {
            tracing::debug!(
                editor = %self.id,
                timestamp = delta.timestamp(),
                "holding delta until live editing resumes"
            );
            self.pending.push((delta, must_perform_change));
            return;
        }

        // Anchor against the buffer as it is before anything is undone.
        delta.capture_anchors(&mut self.host);
        self.reconcile(delta, must_perform_change);

        #[cfg(feature = "metrics")]
        metrics::counter!("coedit_deltas_applied_total").increment(1);
    }

    /// Undo everything newer than `delta`, insert it, replay forward.
    fn reconcile(&mut self, delta: Delta, must_perform_change: bool) {
        let timestamp = delta.timestamp();

        let mut slot = self.deltas.len();
        while slot > 0 && self.deltas[slot - 1].timestamp() > timestamp {
            slot -= 1;
            self.deltas[slot].revert(&mut self.host, &mut self.meta);
        }
        let undone = self.deltas.len() - slot;

        self.deltas.insert(slot, delta);

        let redo_from = if must_perform_change { slot } else { slot + 1 };
        for delta in &mut self.deltas[redo_from..] {
            delta.apply(&mut self.host, &mut self.meta);
        }

        tracing::trace!(
            editor = %self.id,
            timestamp,
            slot,
            undone,
            "reconciled delta"
        );
    }

    /// Switch between live editing and a read-only historical view.
    ///
    /// Read-only policy while time travelling: editors are locked, observers
    /// are not. Returning to `Current` restores the live role lock.
    pub fn set_version(&mut self, version: Version, context: VersionContext) {
        match version {
            Version::Current => {
                self.host.resume_binding();
                self.remote_cursors.show_cursors(&mut self.host);
                self.version = Version::Current;
                self.apply_role(context.role);

                for (delta, must_perform_change) in std::mem::take(&mut self.pending) {
                    self.insert_delta(delta, must_perform_change);
                }
            }
            Version::At(_) => {
                self.host.suspend_binding();
                self.host.set_read_only(context.role != Role::Observer);
                self.remote_cursors.hide_cursors(&mut self.host);
                self.version = version;
            }
        }
    }

    /// Display historical contents. Only meaningful while not `Current`.
    pub fn show_snapshot(&mut self, contents: &str) {
        if self.version.is_current() {
            tracing::warn!(editor = %self.id, "ignoring snapshot while live");
            return;
        }
        self.host.set_text(contents);
    }

    /// Lock local editing for observers while live.
    pub fn apply_role(&mut self, role: Role) {
        if self.version.is_current() {
            self.host.set_read_only(role == Role::Observer);
        }
    }

    pub fn update_remote_cursor(&mut self, id: CursorId, user: ChatUser, position: usize) {
        self.remote_cursors
            .update_cursor(&mut self.host, id, user, position);
    }

    pub fn update_remote_selection(&mut self, id: CursorId, user: ChatUser, range: TextRange) {
        self.remote_cursors
            .update_selection(&mut self.host, id, user, range);
    }

    pub fn remove_remote_cursor(&mut self, id: &str, user: &ChatUser) -> Option<RemoteCursor> {
        self.remote_cursors.remove_cursor(&mut self.host, id, user)
    }

    pub fn remove_user_cursors(&mut self, user: &ChatUser) -> usize {
        self.remote_cursors.remove_user_cursors(&mut self.host, user)
    }

    pub fn serialize(&self) -> SerializedEditorState {
        SerializedEditorState {
            id: self.id,
            title: self.meta.title.clone(),
            grammar: self.meta.grammar.clone(),
            modified: self.meta.is_modified,
            is_open: self.meta.is_open,
            contents: self.host.live_text(),
            deltas: self.deltas.iter().map(Delta::serialize).collect(),
            cursors: self.remote_cursors.serialize(),
        }
    }

    pub fn id(&self) -> EditorId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.meta.title
    }

    pub fn grammar(&self) -> &str {
        &self.meta.grammar
    }

    pub fn is_open(&self) -> bool {
        self.meta.is_open
    }

    pub fn is_modified(&self) -> bool {
        self.meta.is_modified
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn remote_cursors(&self) -> &RemoteCursorMarker {
        &self.remote_cursors
    }

    pub fn deltas(&self) -> &[Delta] {
        &self.deltas
    }

    /// Timestamps of the log, oldest first.
    pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.deltas.iter().map(Delta::timestamp)
    }

    /// Number of deltas held back during time travel.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Current buffer contents as displayed.
    pub fn text(&self) -> String {
        self.host.text()
    }
}
