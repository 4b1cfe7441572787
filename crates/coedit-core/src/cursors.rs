//! Remote cursor tracking for one buffer.
//!
//! Tracks the last known cursor position and selection of every remote peer
//! cursor, and tells the buffer host when a marker needs to be drawn, moved or
//! removed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::text::BufferHost;
use crate::types::{ChatUser, CursorId, TextRange};

/// A remote peer's cursor state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCursor {
    pub id: CursorId,
    pub user: ChatUser,
    /// Character offset of the caret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    /// Selection range, if the peer has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<TextRange>,
    /// When this cursor was last updated.
    #[serde(skip, default = "Instant::now")]
    pub updated_at: Instant,
}

impl RemoteCursor {
    fn new(id: CursorId, user: ChatUser) -> Self {
        Self {
            id,
            user,
            position: None,
            selection: None,
            updated_at: Instant::now(),
        }
    }
}

/// Per-buffer map of peer cursor id to last known cursor.
#[derive(Debug, Clone)]
pub struct RemoteCursorMarker {
    cursors: BTreeMap<CursorId, RemoteCursor>,
    visible: bool,
}

impl Default for RemoteCursorMarker {
    fn default() -> Self {
        Self {
            cursors: BTreeMap::new(),
            visible: true,
        }
    }
}

impl RemoteCursorMarker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move (or create) a peer's caret.
    pub fn update_cursor<H: BufferHost>(
        &mut self,
        host: &mut H,
        id: CursorId,
        user: ChatUser,
        position: usize,
    ) {
        if user.is_me {
            return;
        }
        match self.cursors.get_mut(&id) {
            Some(cursor) => {
                cursor.position = Some(position);
                cursor.updated_at = Instant::now();
                host.update_remote_cursor_position(cursor);
            }
            None => {
                let mut cursor = RemoteCursor::new(id.clone(), user);
                cursor.position = Some(position);
                host.add_remote_cursor(&cursor);
                self.cursors.insert(id, cursor);
            }
        }
    }

    /// Move (or create) a peer's selection.
    pub fn update_selection<H: BufferHost>(
        &mut self,
        host: &mut H,
        id: CursorId,
        user: ChatUser,
        range: TextRange,
    ) {
        if user.is_me {
            return;
        }
        match self.cursors.get_mut(&id) {
            Some(cursor) => {
                cursor.selection = Some(range);
                cursor.updated_at = Instant::now();
                host.update_remote_cursor_selection(cursor);
            }
            None => {
                let mut cursor = RemoteCursor::new(id.clone(), user);
                cursor.selection = Some(range);
                host.add_remote_cursor(&cursor);
                self.cursors.insert(id, cursor);
            }
        }
    }

    /// Drop one cursor. No-op if it isn't tracked.
    pub fn remove_cursor<H: BufferHost>(
        &mut self,
        host: &mut H,
        id: &str,
        _user: &ChatUser,
    ) -> Option<RemoteCursor> {
        let cursor = self.cursors.remove(id)?;
        host.remove_remote_cursor(&cursor);
        Some(cursor)
    }

    /// Drop every cursor owned by `user` (they disconnected).
    pub fn remove_user_cursors<H: BufferHost>(&mut self, host: &mut H, user: &ChatUser) -> usize {
        let owned: Vec<CursorId> = self
            .cursors
            .values()
            .filter(|c| c.user.id == user.id)
            .map(|c| c.id.clone())
            .collect();
        for id in &owned {
            self.remove_cursor(host, id, user);
        }
        owned.len()
    }

    pub fn hide_cursors<H: BufferHost>(&mut self, host: &mut H) {
        self.visible = false;
        host.hide_remote_cursors();
    }

    pub fn show_cursors<H: BufferHost>(&mut self, host: &mut H) {
        self.visible = true;
        host.show_remote_cursors();
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn get(&self, id: &str) -> Option<&RemoteCursor> {
        self.cursors.get(id)
    }

    pub fn cursors(&self) -> impl Iterator<Item = &RemoteCursor> {
        self.cursors.values()
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Cursors in a wire-friendly form.
    pub fn serialize(&self) -> Vec<RemoteCursor> {
        self.cursors.values().cloned().collect()
    }
}
