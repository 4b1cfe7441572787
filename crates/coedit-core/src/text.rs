//! Buffer collaborator abstraction.
//!
//! The `BufferHost` trait is everything the reconciliation engine needs from
//! the component that owns the actual characters: range replacement, anchors
//! that survive other edits, read-only and binding control, and remote cursor
//! rendering. `RopeBuffer` is a ropey-backed implementation used by the CLI
//! and the tests.

use std::collections::{BTreeMap, HashMap};

use ropey::Rope;
use smol_str::SmolStr;

use crate::cursors::RemoteCursor;
use crate::types::{CursorId, TextRange};

/// A stable handle for a buffer range.
///
/// The host re-resolves the handle after other edits have shifted offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId(pub u64);

/// The buffer collaborator consumed by `EditorState`.
///
/// All offsets are in chars. Implementations clip out-of-range input to the
/// buffer rather than failing.
pub trait BufferHost {
    /// Set the syntax grammar used to display the buffer.
    fn set_grammar(&mut self, grammar: &str);

    /// Replace the chars in `range` with `text`.
    fn replace_text(&mut self, range: TextRange, text: &str);

    /// Replace the entire buffer contents.
    fn set_text(&mut self, text: &str);

    /// The currently displayed contents.
    fn text(&self) -> String;

    /// The live document, even while a historical view is displayed.
    fn live_text(&self) -> String {
        self.text()
    }

    /// Total length in chars.
    fn len_chars(&self) -> usize;

    /// The chars in `range`, clipped to the buffer.
    fn slice(&self, range: TextRange) -> String {
        let range = range.clamp(self.len_chars());
        self.text().chars().skip(range.start).take(range.len()).collect()
    }

    /// Mint an anchor for `range` as it is right now.
    fn anchor(&mut self, range: TextRange) -> AnchorId;

    /// Resolve an anchor to its current range. None if it was released.
    fn anchor_range(&self, anchor: AnchorId) -> Option<TextRange>;

    /// Forget an anchor. The default keeps it alive forever.
    fn release_anchor(&mut self, _anchor: AnchorId) {}

    /// Lock or unlock local editing.
    fn set_read_only(&mut self, read_only: bool);

    /// Detach the live document from the view (entering time travel).
    fn suspend_binding(&mut self);

    /// Reattach the live document to the view (leaving time travel).
    fn resume_binding(&mut self);

    fn add_remote_cursor(&mut self, cursor: &RemoteCursor);

    fn update_remote_cursor_position(&mut self, cursor: &RemoteCursor);

    fn update_remote_cursor_selection(&mut self, cursor: &RemoteCursor);

    fn remove_remote_cursor(&mut self, cursor: &RemoteCursor);

    fn hide_remote_cursors(&mut self);

    fn show_remote_cursors(&mut self);
}

/// Rope contents plus the anchors that live on them.
#[derive(Clone, Debug, Default)]
struct LiveText {
    rope: Rope,
    anchors: HashMap<AnchorId, TextRange>,
}

impl LiveText {
    fn splice(&mut self, range: TextRange, text: &str) {
        let range = range.clamp(self.rope.len_chars());
        self.rope.remove(range.to_range());
        self.rope.insert(range.start, text);

        let inserted = text.chars().count();
        for anchor in self.anchors.values_mut() {
            *anchor = shift_range(*anchor, range, inserted);
        }
    }
}

/// Move an anchored range across a splice that replaced `replaced` with
/// `inserted` chars.
///
/// A pure insertion pushes points at the insertion offset to the right, except
/// the end of a range that stops exactly there. A replacement keeps ranges
/// that end at its start, and ranges overlapping it grow or shrink to cover
/// the new text.
fn shift_range(anchor: TextRange, replaced: TextRange, inserted: usize) -> TextRange {
    let TextRange { start: a, end: b } = replaced;
    let shift = |p: usize| p - b + a + inserted;

    if a == b {
        let start = if anchor.start < a {
            anchor.start
        } else {
            anchor.start + inserted
        };
        let end = if anchor.end < a || (anchor.end == a && anchor.start < a) {
            anchor.end
        } else {
            anchor.end + inserted
        };
        return TextRange::new(start, end.max(start));
    }

    let start = if anchor.start <= a {
        anchor.start
    } else if anchor.start >= b {
        shift(anchor.start)
    } else {
        a
    };
    let end = if anchor.end <= a {
        anchor.end
    } else if anchor.end >= b {
        shift(anchor.end)
    } else {
        a + inserted
    };
    TextRange::new(start, end.max(start))
}

/// Ropey-backed buffer host.
///
/// Tracks anchors across every splice and keeps the remote cursor rendering
/// state so callers can inspect what would be drawn.
#[derive(Clone, Debug)]
pub struct RopeBuffer {
    live: LiveText,
    /// Live contents stashed while the binding is suspended.
    suspended: Option<LiveText>,
    next_anchor: u64,
    grammar: Option<SmolStr>,
    read_only: bool,
    cursors_visible: bool,
    remote_cursors: BTreeMap<CursorId, RemoteCursor>,
}

impl Default for RopeBuffer {
    fn default() -> Self {
        Self {
            live: LiveText::default(),
            suspended: None,
            next_anchor: 0,
            grammar: None,
            read_only: false,
            cursors_visible: true,
            remote_cursors: BTreeMap::new(),
        }
    }
}

impl RopeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_str(s: &str) -> Self {
        Self {
            live: LiveText {
                rope: Rope::from_str(s),
                anchors: HashMap::new(),
            },
            ..Self::default()
        }
    }

    pub fn grammar(&self) -> Option<&str> {
        self.grammar.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// True while the live document is detached from the view.
    pub fn is_suspended(&self) -> bool {
        self.suspended.is_some()
    }

    pub fn cursors_visible(&self) -> bool {
        self.cursors_visible
    }

    /// Remote cursors as they would be rendered right now.
    pub fn visible_remote_cursors(&self) -> impl Iterator<Item = &RemoteCursor> {
        self.remote_cursors
            .values()
            .filter(|_| self.cursors_visible)
    }

    pub fn remote_cursor(&self, id: &str) -> Option<&RemoteCursor> {
        self.remote_cursors.get(id)
    }

    /// Number of live anchors.
    pub fn anchor_count(&self) -> usize {
        self.live.anchors.len()
    }
}

impl BufferHost for RopeBuffer {
    fn set_grammar(&mut self, grammar: &str) {
        self.grammar = Some(SmolStr::new(grammar));
    }

    fn replace_text(&mut self, range: TextRange, text: &str) {
        self.live.splice(range, text);
    }

    fn set_text(&mut self, text: &str) {
        let whole = TextRange::new(0, self.live.rope.len_chars());
        self.live.splice(whole, text);
    }

    fn text(&self) -> String {
        self.live.rope.to_string()
    }

    fn live_text(&self) -> String {
        self.suspended
            .as_ref()
            .unwrap_or(&self.live)
            .rope
            .to_string()
    }

    fn len_chars(&self) -> usize {
        self.live.rope.len_chars()
    }

    fn slice(&self, range: TextRange) -> String {
        let range = range.clamp(self.live.rope.len_chars());
        self.live.rope.slice(range.to_range()).to_string()
    }

    fn anchor(&mut self, range: TextRange) -> AnchorId {
        let id = AnchorId(self.next_anchor);
        self.next_anchor += 1;
        let range = range.clamp(self.live.rope.len_chars());
        self.live.anchors.insert(id, range);
        id
    }

    fn anchor_range(&self, anchor: AnchorId) -> Option<TextRange> {
        self.live.anchors.get(&anchor).copied()
    }

    fn release_anchor(&mut self, anchor: AnchorId) {
        self.live.anchors.remove(&anchor);
    }

    fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn suspend_binding(&mut self) {
        if self.suspended.is_none() {
            self.suspended = Some(self.live.clone());
        }
    }

    fn resume_binding(&mut self) {
        if let Some(live) = self.suspended.take() {
            self.live = live;
        }
    }

    fn add_remote_cursor(&mut self, cursor: &RemoteCursor) {
        self.remote_cursors.insert(cursor.id.clone(), cursor.clone());
    }

    fn update_remote_cursor_position(&mut self, cursor: &RemoteCursor) {
        self.remote_cursors.insert(cursor.id.clone(), cursor.clone());
    }

    fn update_remote_cursor_selection(&mut self, cursor: &RemoteCursor) {
        self.remote_cursors.insert(cursor.id.clone(), cursor.clone());
    }

    fn remove_remote_cursor(&mut self, cursor: &RemoteCursor) {
        self.remote_cursors.remove(&cursor.id);
    }

    fn hide_remote_cursors(&mut self) {
        self.cursors_visible = false;
    }

    fn show_remote_cursors(&mut self) {
        self.cursors_visible = true;
    }
}

impl From<&str> for RopeBuffer {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_and_text() {
        let mut buf = RopeBuffer::from_str("hello world");
        buf.replace_text(TextRange::new(6, 11), "rust");
        assert_eq!(buf.text(), "hello rust");
        assert_eq!(buf.len_chars(), 10);
    }

    #[test]
    fn test_slice_is_char_indexed() {
        let buf = RopeBuffer::from_str("héllo");
        assert_eq!(buf.slice(TextRange::new(1, 3)), "él");
        assert_eq!(buf.slice(TextRange::new(3, 99)), "lo");
    }

    #[test]
    fn test_replace_clips_out_of_range() {
        let mut buf = RopeBuffer::from_str("abc");
        buf.replace_text(TextRange::new(2, 50), "Z");
        assert_eq!(buf.text(), "abZ");
    }

    #[test]
    fn test_anchor_clipped_on_mint() {
        let mut buf = RopeBuffer::from_str("hi");
        let anchor = buf.anchor(TextRange::new(1, 9));
        assert_eq!(buf.anchor_range(anchor), Some(TextRange::new(1, 2)));
    }

    #[test]
    fn test_anchor_shifts_after_earlier_insert() {
        let mut buf = RopeBuffer::from_str("hello world");
        let world = buf.anchor(TextRange::new(6, 11));
        buf.replace_text(TextRange::collapsed(0), ">> ");
        assert_eq!(buf.anchor_range(world), Some(TextRange::new(9, 14)));
        assert_eq!(buf.text()[9..14].to_string(), "world");
    }

    #[test]
    fn test_anchor_unaffected_by_later_insert() {
        let mut buf = RopeBuffer::from_str("hello world");
        let hello = buf.anchor(TextRange::new(0, 5));
        buf.replace_text(TextRange::collapsed(5), ",");
        assert_eq!(buf.anchor_range(hello), Some(TextRange::new(0, 5)));
    }

    #[test]
    fn test_point_anchor_moves_right_on_insert() {
        let mut buf = RopeBuffer::from_str("");
        let point = buf.anchor(TextRange::collapsed(0));
        buf.replace_text(TextRange::collapsed(0), "a");
        assert_eq!(buf.anchor_range(point), Some(TextRange::collapsed(1)));
    }

    #[test]
    fn test_covering_anchor_tracks_replacement() {
        let mut buf = RopeBuffer::from_str("hello");
        let all = buf.anchor(TextRange::new(0, 5));
        buf.replace_text(TextRange::new(0, 5), "hi");
        assert_eq!(buf.anchor_range(all), Some(TextRange::new(0, 2)));
    }

    #[test]
    fn test_anchor_round_trip_through_inverse_splice() {
        let mut buf = RopeBuffer::from_str("one two three");
        let three = buf.anchor(TextRange::new(8, 13));
        buf.replace_text(TextRange::new(4, 7), "2222");
        assert_eq!(buf.anchor_range(three), Some(TextRange::new(9, 14)));
        buf.replace_text(TextRange::new(4, 8), "two");
        assert_eq!(buf.anchor_range(three), Some(TextRange::new(8, 13)));
        assert_eq!(buf.text(), "one two three");
    }

    #[test]
    fn test_interior_anchor_collapses_on_delete() {
        let mut buf = RopeBuffer::from_str("abcdef");
        let inner = buf.anchor(TextRange::new(2, 4));
        buf.replace_text(TextRange::new(1, 5), "");
        assert_eq!(buf.anchor_range(inner), Some(TextRange::collapsed(1)));
    }

    #[test]
    fn test_release_anchor() {
        let mut buf = RopeBuffer::from_str("abc");
        let anchor = buf.anchor(TextRange::new(0, 1));
        assert_eq!(buf.anchor_count(), 1);
        buf.release_anchor(anchor);
        assert_eq!(buf.anchor_range(anchor), None);
        assert_eq!(buf.anchor_count(), 0);
    }

    #[test]
    fn test_suspend_preserves_live_text_and_anchors() {
        let mut buf = RopeBuffer::from_str("live text");
        let anchor = buf.anchor(TextRange::new(5, 9));

        buf.suspend_binding();
        buf.set_text("old");
        assert_eq!(buf.text(), "old");
        assert_eq!(buf.live_text(), "live text");
        assert!(buf.is_suspended());

        // Suspending twice keeps the first stash.
        buf.suspend_binding();
        buf.set_text("older");

        buf.resume_binding();
        assert_eq!(buf.text(), "live text");
        assert_eq!(buf.anchor_range(anchor), Some(TextRange::new(5, 9)));
        assert!(!buf.is_suspended());
    }

    #[test]
    fn test_unicode_offsets() {
        // "hello 🌍!" - the emoji is one char
        let mut buf = RopeBuffer::from_str("hello 🌍!");
        assert_eq!(buf.len_chars(), 8);
        buf.replace_text(TextRange::new(6, 7), "world");
        assert_eq!(buf.text(), "hello world!");
    }
}
