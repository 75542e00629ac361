//! Template matching: locating a label somewhere in memory.

use super::HardwareCore;
use crate::head::{Head, MAIN_SPACE};
use crate::inst_lib::SearchFrom;
use crate::label::Label;
use crate::memory::InstFlag;

/// What marks the beginning of a searchable sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SeqStart {
    /// A `label` instruction followed by the nops.
    LabelInst,
    /// Any nop.
    Nop,
}

impl HardwareCore {
    /// Search for the pending label. `direction < 0` searches backward from
    /// just before the label's own nops, `> 0` forward from the IP, and `0`
    /// forward from the start of memory. The returned head sits on the last
    /// nop of the match.
    pub(crate) fn find_label(&self, direction: i32) -> Option<Head> {
        let label = self.thread().next_label;
        if label.is_empty() {
            return None;
        }
        let ip = self.thread().ip().position() as i64;
        let found = if direction < 0 {
            self.find_label_backward(&label, ip - label.len() as i64)
        } else if direction > 0 {
            self.find_label_forward(&label, ip)
        } else {
            self.find_label_forward(&label, 0)
        }?;
        let mut head = *self.thread().ip();
        head.set(found as i32 - 1, self.memory.len());
        Some(head)
    }

    fn is_nop_at(&self, pos: i64) -> bool {
        self.inst_set.is_nop(self.memory.get(pos as usize))
    }

    fn window_matches(&self, label: &Label, offset: i64) -> bool {
        label.as_slice().iter().enumerate().all(|(i, &want)| {
            self.inst_set.nop_mod(self.memory.get(offset as usize + i)) == Some(want)
        })
    }

    /// Position just past the first nop run after `search_start` that
    /// contains `label`.
    fn find_label_forward(&self, label: &Label, search_start: i64) -> Option<i64> {
        let size = self.memory.len() as i64;
        let label_size = label.len() as i64;
        let mut pos = search_start + label_size;
        while pos < size {
            if pos >= 0 && self.is_nop_at(pos) {
                let mut start_pos = pos;
                let mut end_pos = pos + 1;
                while start_pos > search_start && self.is_nop_at(start_pos - 1) {
                    start_pos -= 1;
                }
                while end_pos < size && self.is_nop_at(end_pos) {
                    end_pos += 1;
                }
                let max_offset = end_pos - start_pos - label_size + 1;
                for offset in start_pos..start_pos + max_offset {
                    if self.window_matches(label, offset) {
                        return Some(offset + label_size);
                    }
                }
                pos = end_pos;
            }
            pos += label_size;
        }
        None
    }

    /// End of the nearest nop run before `search_start` that contains
    /// `label`.
    fn find_label_backward(&self, label: &Label, search_start: i64) -> Option<i64> {
        let label_size = label.len() as i64;
        let mut pos = search_start - label_size;
        while pos >= 0 {
            if self.is_nop_at(pos) {
                let mut start_pos = pos;
                let mut end_pos = pos + 1;
                while start_pos > 0 && self.is_nop_at(start_pos - 1) {
                    start_pos -= 1;
                }
                while end_pos < search_start && self.is_nop_at(end_pos) {
                    end_pos += 1;
                }
                let max_offset = end_pos - start_pos - label_size + 1;
                if (start_pos..start_pos + max_offset).any(|offset| self.window_matches(label, offset)) {
                    return Some(end_pos);
                }
                pos = start_pos - 1;
            }
            pos -= label_size;
        }
        None
    }

    /// Experimental search for the pending label as an exact sequence.
    /// Start searches run linearly from position 0. Forward and backward
    /// searches walk circularly away from the IP and never cross it. When
    /// `mark_executed` is set the matched sequence is flagged as executed
    /// (at most `max_label_exe_size` nops, plus the `label` instruction).
    pub(crate) fn find_sequence(&mut self, from: SearchFrom, start: SeqStart, mark_executed: bool) -> Option<Head> {
        let label = self.thread().next_label;
        if label.is_empty() {
            return None;
        }
        let (first, last) = self.locate_sequence(&label, from, start)?;
        if mark_executed {
            let len = self.memory.len();
            let limit = match start {
                SeqStart::LabelInst => self.config.max_label_exe_size + 1,
                SeqStart::Nop => self.config.max_label_exe_size,
            };
            let span = (last + len - first) % len + 1;
            for i in 0..span.min(limit) {
                self.memory.set_flag((first + i) % len, InstFlag::Executed);
            }
        }
        Some(Head::new(MAIN_SPACE, last as i32))
    }

    /// `(first cell of the sequence, last matched nop)`.
    fn locate_sequence(&self, label: &Label, from: SearchFrom, start: SeqStart) -> Option<(usize, usize)> {
        let len = self.memory.len();
        let ip = Head::wrap(self.thread().ip().position(), len) as usize;
        let circular = from != SearchFrom::Start;
        let count = if circular { len.saturating_sub(1) } else { len };
        for k in 0..count {
            let candidate = match from {
                SearchFrom::Start => k,
                SearchFrom::Forward => (ip + 1 + k) % len,
                SearchFrom::Backward => (ip + len - 1 - k) % len,
            };
            let inst = self.memory.get(candidate);
            let nops_from = match start {
                SeqStart::LabelInst if self.inst_set.is_label(inst) => candidate + 1,
                SeqStart::Nop if self.inst_set.is_nop(inst) => candidate,
                _ => continue,
            };
            let mut pos = nops_from;
            let mut matched = 0;
            for &want in label.as_slice() {
                if !circular && pos >= len {
                    break;
                }
                let cell = pos % len;
                if circular && cell == ip {
                    break;
                }
                if self.inst_set.nop_mod(self.memory.get(cell)) != Some(want) {
                    break;
                }
                matched += 1;
                pos += 1;
            }
            if matched == label.len() {
                return Some((candidate, (pos - 1) % len));
            }
        }
        None
    }
}
