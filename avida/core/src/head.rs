//! Heads: movable cursors into a memory space.

use crate::inst::Instruction;
use crate::memory::InstMemory;
use serde::{Deserialize, Serialize};

pub const NUM_HEADS: usize = 4;

/// Memory space holding the organism's own genome.
pub const MAIN_SPACE: u8 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadId {
    Ip = 0,
    Read = 1,
    Write = 2,
    Flow = 3,
}

impl HeadId {
    pub const ALL: [HeadId; NUM_HEADS] = [HeadId::Ip, HeadId::Read, HeadId::Write, HeadId::Flow];

    /// Head selected by a nop modifier; wraps past the last head.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % NUM_HEADS]
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// `(space, position)` cursor. Positions are signed so that jumps may leave
/// the tape; the next [`Head::adjust`] folds them back in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Head {
    space: u8,
    pos: i32,
}

impl Head {
    pub fn new(space: u8, pos: i32) -> Self {
        Self { space, pos }
    }

    pub fn space(&self) -> u8 {
        self.space
    }

    pub fn position(&self) -> i32 {
        self.pos
    }

    /// Position as an index; panics if the head has not been adjusted into
    /// `[0, len)`.
    #[track_caller]
    pub fn index(&self, len: usize) -> usize {
        assert!(
            self.pos >= 0 && (self.pos as usize) < len,
            "head position {} out of range (len {len})",
            self.pos
        );
        self.pos as usize
    }

    /// In range: unchanged. Empty memory or negative: 0. Less than one lap
    /// past the end: one subtraction. Otherwise a modulo.
    pub fn wrap(pos: i32, len: usize) -> i32 {
        let len_i = len as i64;
        let p = pos as i64;
        if p >= 0 && p < len_i {
            return pos;
        }
        if len == 0 || p < 0 {
            return 0;
        }
        if p < 2 * len_i {
            (p - len_i) as i32
        } else {
            (p % len_i) as i32
        }
    }

    pub fn adjust(&mut self, len: usize) {
        self.pos = Self::wrap(self.pos, len);
    }

    pub fn set(&mut self, pos: i32, len: usize) {
        self.pos = pos;
        self.adjust(len);
    }

    /// Copy another head's space and position verbatim.
    pub fn set_to(&mut self, other: &Head) {
        *self = *other;
    }

    pub fn abs_set(&mut self, pos: i32) {
        self.pos = pos;
    }

    pub fn jump(&mut self, offset: i32, len: usize) {
        self.pos = self.pos.wrapping_add(offset);
        self.adjust(len);
    }

    pub fn abs_jump(&mut self, offset: i32) {
        self.pos = self.pos.wrapping_add(offset);
    }

    pub fn advance(&mut self, len: usize) {
        self.jump(1, len);
    }

    pub fn in_memory(&self, len: usize) -> bool {
        self.pos >= 0 && (self.pos as usize) < len
    }

    /// The instruction after this head, or `None` on the last cell. Label
    /// reading relies on this never wrapping to the start.
    pub fn next_inst(&self, memory: &InstMemory) -> Option<Instruction> {
        let len = memory.len();
        if len == 0 {
            return None;
        }
        let next = Self::wrap(self.pos, len) as usize + 1;
        (next < len).then(|| memory.get(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_subtracts_once_for_near_overflow() {
        assert_eq!(Head::wrap(3, 10), 3);
        assert_eq!(Head::wrap(10, 10), 0);
        assert_eq!(Head::wrap(19, 10), 9);
        assert_eq!(Head::wrap(25, 10), 5);
        assert_eq!(Head::wrap(-3, 10), 0);
        assert_eq!(Head::wrap(7, 0), 0);
    }

    #[test]
    fn absolute_moves_skip_adjustment() {
        let mut head = Head::new(MAIN_SPACE, 2);
        head.abs_jump(20);
        assert_eq!(head.position(), 22);
        head.adjust(10);
        assert_eq!(head.position(), 2);
        head.abs_set(-5);
        assert!(!head.in_memory(10));
    }

    #[test]
    fn head_ids_wrap_on_large_modifiers() {
        assert_eq!(HeadId::from_index(2), HeadId::Write);
        assert_eq!(HeadId::from_index(5), HeadId::Read);
    }
}
