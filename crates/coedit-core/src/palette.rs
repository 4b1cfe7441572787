//! Stable colour assignment for remote users.

use std::collections::HashMap;

use smol_str::SmolStr;

use crate::types::ChatUser;

/// Cursor colours (RGBA), handed out round-robin.
const CURSOR_COLORS: [u32; 10] = [
    0xE06C75FF, // Rose
    0x61AFEFFF, // Blue
    0x98C379FF, // Green
    0xE5C07BFF, // Gold
    0xC678DDFF, // Violet
    0x56B6C2FF, // Aqua
    0xD19A66FF, // Amber
    0xBE5046FF, // Brick
    0x7FB7BEFF, // Slate
    0xF4A6C8FF, // Pink
];

/// Remembers which colour each user id was given.
#[derive(Debug, Default, Clone)]
pub struct Palette {
    assigned: HashMap<SmolStr, u32>,
    next_color_index: usize,
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Colour for `user_id`, assigning the next free one on first sight.
    pub fn color_for(&mut self, user_id: &str) -> u32 {
        if let Some(color) = self.assigned.get(user_id) {
            return *color;
        }
        let color = CURSOR_COLORS[self.next_color_index % CURSOR_COLORS.len()];
        self.next_color_index += 1;
        self.assigned.insert(user_id.into(), color);
        color
    }

    /// Fill in `user.color` if the sender didn't pick one.
    pub fn colorize(&mut self, user: &mut ChatUser) {
        if user.color.is_none() {
            user.color = Some(self.color_for(&user.id));
        }
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}
