//! Registry of every shared buffer, and the global version pointer.
//!
//! The tracker routes inbound events to the right `EditorState` and moves all
//! of them between live editing and historical versions together. Observers
//! subscribe to `TrackerEvent`s over unbounded channels; a version switch is
//! only announced once every buffer has migrated.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use web_time::{SystemTime, UNIX_EPOCH};

use crate::error::VersionError;
use crate::events::{ChannelEvent, CursorChange, CursorEvent};
use crate::fuzzy::{FuzzyConfig, FuzzySet, parse_file_reference};
use crate::palette::Palette;
use crate::state::{EditorState, SerializedEditorState};
use crate::text::BufferHost;
use crate::types::{ChatUser, EditorId, Role, Timestamp, Version, VersionContext};
use crate::version::{VersionCache, VersionSnapshot, VersionSource};

/// Notifications emitted by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// Every buffer now shows `version`.
    VersionChanged {
        version: Version,
        timestamp: Option<Timestamp>,
    },
    /// A buffer was registered for the first time.
    EditorOpened(EditorId),
}

/// Creates a buffer host for each newly opened buffer.
pub trait HostProvider {
    type Host: BufferHost;

    fn create_host(&mut self, state: &SerializedEditorState) -> Self::Host;
}

impl<H, F> HostProvider for F
where
    H: BufferHost,
    F: FnMut(&SerializedEditorState) -> H,
{
    type Host = H;

    fn create_host(&mut self, state: &SerializedEditorState) -> H {
        self(state)
    }
}

pub struct EditorStateTracker<P: HostProvider, S> {
    provider: P,
    source: S,
    /// Registration order.
    editors: Vec<EditorState<P::Host>>,
    index: HashMap<EditorId, usize>,
    current_version: Version,
    current_timestamp: Option<Timestamp>,
    cache: VersionCache,
    fuzzy: FuzzyConfig,
    role: Role,
    palette: Palette,
    subscribers: Vec<mpsc::UnboundedSender<TrackerEvent>>,
}

impl<P: HostProvider, S: VersionSource> EditorStateTracker<P, S> {
    pub fn new(provider: P, source: S) -> Self {
        Self {
            provider,
            source,
            editors: Vec::new(),
            index: HashMap::new(),
            current_version: Version::Current,
            current_timestamp: None,
            cache: VersionCache::new(),
            fuzzy: FuzzyConfig::default(),
            role: Role::default(),
            palette: Palette::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn with_fuzzy_config(mut self, fuzzy: FuzzyConfig) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    /// Set the local role. Applied to buffers as they are opened.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Register a buffer, or return the existing one for that id.
    pub fn on_editor_opened(
        &mut self,
        state: SerializedEditorState,
        must_perform_change: bool,
    ) -> &mut EditorState<P::Host> {
        let id = state.id;
        if let Some(&slot) = self.index.get(&id) {
            return &mut self.editors[slot];
        }

        let host = self.provider.create_host(&state);
        let mut editor = EditorState::from_serialized(state, host, must_perform_change);
        editor.apply_role(self.role);

        // Keep the invariant that every buffer shows the tracker's version.
        if let Version::At(number) = self.current_version {
            editor.set_version(self.current_version, VersionContext::new(self.role));
            let contents = self
                .cache
                .get(number)
                .and_then(|snapshot| snapshot.get(&id).map(|s| s.contents.clone()))
                .unwrap_or_default();
            editor.show_snapshot(&contents);
        }

        tracing::debug!(editor = %id, title = editor.title(), "registered editor");
        #[cfg(feature = "metrics")]
        metrics::gauge!("coedit_editors").set((self.editors.len() + 1) as f64);

        let slot = self.editors.len();
        self.editors.push(editor);
        self.index.insert(id, slot);
        self.emit(TrackerEvent::EditorOpened(id));
        &mut self.editors[slot]
    }

    pub fn get_editor_state(&self, id: EditorId) -> Option<&EditorState<P::Host>> {
        self.index.get(&id).map(|&slot| &self.editors[slot])
    }

    pub fn get_editor_state_mut(&mut self, id: EditorId) -> Option<&mut EditorState<P::Host>> {
        self.index.get(&id).map(|&slot| &mut self.editors[slot])
    }

    /// Every buffer, in registration order.
    pub fn get_all_editors(&self) -> &[EditorState<P::Host>] {
        &self.editors
    }

    /// Buffers that have not been destroyed.
    pub fn get_active_editors(&self) -> impl Iterator<Item = &EditorState<P::Host>> {
        self.editors.iter().filter(|editor| editor.is_open())
    }

    /// Route a delta payload to its buffer by the payload's `id`.
    ///
    /// Returns false if the id is missing or unknown, or the delta was dropped.
    pub fn handle_event(&mut self, payload: &Value, must_perform_change: bool) -> bool {
        let Some(id) = payload.get("id").and_then(Value::as_u64).map(EditorId) else {
            tracing::debug!("ignoring delta without editor id");
            return false;
        };
        match self.get_editor_state_mut(id) {
            Some(editor) => editor.add_delta(payload, must_perform_change),
            None => {
                tracing::debug!(editor = %id, "ignoring delta for unknown editor");
                false
            }
        }
    }

    /// Apply a remote cursor change. Users without a colour get one from the
    /// session palette.
    pub fn handle_cursor_event(&mut self, event: CursorEvent) -> bool {
        let CursorEvent {
            id,
            cursor_id,
            mut user,
            change,
        } = event;
        self.palette.colorize(&mut user);

        let Some(&slot) = self.index.get(&id) else {
            tracing::debug!(editor = %id, "ignoring cursor for unknown editor");
            return false;
        };
        let editor = &mut self.editors[slot];
        match change {
            CursorChange::Position { position } => {
                editor.update_remote_cursor(cursor_id, user, position)
            }
            CursorChange::Selection { range } => {
                editor.update_remote_selection(cursor_id, user, range)
            }
            CursorChange::Destroy => {
                editor.remove_remote_cursor(&cursor_id, &user);
            }
        }
        true
    }

    /// Drop every cursor `user` owns, across all buffers.
    pub fn remove_user_cursors(&mut self, user: &ChatUser) -> usize {
        let removed: usize = self
            .editors
            .iter_mut()
            .map(|editor| editor.remove_user_cursors(user))
            .sum();
        tracing::debug!(user = %user.id, removed, "removed user cursors");
        removed
    }

    /// Move every buffer to `version`.
    ///
    /// Historical snapshots are fetched once per version and cached. If the
    /// fetch fails nothing changes and the error is returned.
    pub async fn set_version(
        &mut self,
        version: Version,
        timestamp: Option<Timestamp>,
        context: VersionContext,
    ) -> Result<(), VersionError> {
        match version {
            Version::Current => {
                self.current_version = Version::Current;
                self.current_timestamp = Some(timestamp.unwrap_or_else(now_millis));
                for editor in &mut self.editors {
                    editor.set_version(Version::Current, context);
                }
            }
            Version::At(number) => {
                let snapshot = self.snapshot(number).await?;
                self.current_version = version;
                self.current_timestamp = timestamp;
                for editor in &mut self.editors {
                    editor.set_version(version, context);
                    let contents = snapshot
                        .get(&editor.id())
                        .map(|s| s.contents.as_str())
                        .unwrap_or_default();
                    editor.show_snapshot(contents);
                }
            }
        }

        tracing::info!(%version, editors = self.editors.len(), "version changed");
        #[cfg(feature = "metrics")]
        metrics::counter!("coedit_version_switches_total").increment(1);

        self.emit(TrackerEvent::VersionChanged {
            version,
            timestamp: self.current_timestamp,
        });
        Ok(())
    }

    async fn snapshot(&mut self, version: u64) -> Result<Arc<VersionSnapshot>, VersionError> {
        if let Some(snapshot) = self.cache.get(version) {
            tracing::trace!(version, "version cache hit");
            return Ok(snapshot);
        }
        let snapshot = self.source.editor_version(version).await?;
        Ok(self.cache.insert(version, snapshot))
    }

    /// The first buffer, in registration order, whose title best matches
    /// `query`.
    pub fn fuzzy_match(&self, query: &str) -> Option<&EditorState<P::Host>> {
        let set = FuzzySet::from_values(
            self.fuzzy.clone(),
            self.editors
                .iter()
                .map(|editor| editor.title())
                .filter(|title| !title.is_empty()),
        );
        let (score, best) = set.best(query)?;
        tracing::trace!(query, best = %best, score, "fuzzy match");
        self.editors.iter().find(|editor| editor.title() == best)
    }

    /// Resolve a reference like `main.py:L10-L12` to a buffer and line range.
    pub fn resolve_file_reference(
        &self,
        reference: &str,
    ) -> Option<(&EditorState<P::Host>, Option<(usize, usize)>)> {
        let reference = parse_file_reference(reference);
        self.fuzzy_match(&reference.file)
            .map(|editor| (editor, reference.lines))
    }

    pub fn serialize_editor_states(&self) -> Vec<SerializedEditorState> {
        self.editors.iter().map(EditorState::serialize).collect()
    }

    /// Receive tracker notifications. Dropped receivers are pruned on the
    /// next emit.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TrackerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Handle one channel event.
    pub async fn dispatch(&mut self, event: ChannelEvent) -> Result<(), VersionError> {
        match event {
            ChannelEvent::EditorOpened {
                state,
                must_perform_change,
            } => {
                self.on_editor_opened(state, must_perform_change);
            }
            ChannelEvent::Delta(payload) => {
                self.handle_event(&payload, true);
            }
            ChannelEvent::Cursor(cursor) => {
                self.handle_cursor_event(cursor);
            }
            ChannelEvent::UserLeft { user } => {
                self.remove_user_cursors(&user);
            }
            ChannelEvent::Version { version, timestamp } => {
                self.set_version(version, timestamp, VersionContext::new(self.role))
                    .await?;
            }
        }
        Ok(())
    }

    pub fn current_version(&self) -> Version {
        self.current_version
    }

    pub fn current_timestamp(&self) -> Option<Timestamp> {
        self.current_timestamp
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn cache(&self) -> &VersionCache {
        &self.cache
    }

    pub fn len(&self) -> usize {
        self.editors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.editors.is_empty()
    }

    fn emit(&mut self, event: TrackerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as Timestamp)
        .unwrap_or_default()
}
