use crate::head::{Head, HeadId, MAIN_SPACE, NUM_HEADS};
use crate::label::Label;
use crate::register::{DataValue, RegisterFile};
use crate::stack::CpuStack;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitCondition {
    Equal,
    Less,
    Greater,
}

impl WaitCondition {
    pub fn is_met(self, observed: i32, target: i32) -> bool {
        match self {
            WaitCondition::Equal => observed == target,
            WaitCondition::Less => observed < target,
            WaitCondition::Greater => observed > target,
        }
    }
}

/// What a parked thread is waiting for: register `reg` of some other thread
/// to compare against `value`. On wake the observed value lands in `dst`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitState {
    pub condition: WaitCondition,
    pub reg: usize,
    pub value: i32,
    pub dst: usize,
}

#[derive(Clone, Debug)]
pub struct CpuThread {
    pub id: usize,
    pub regs: RegisterFile,
    pub heads: [Head; NUM_HEADS],
    pub stack: CpuStack<DataValue>,
    /// 0 selects the thread's own stack, 1 the organism's global stack.
    pub cur_stack: usize,
    pub cur_head: HeadId,
    pub next_label: Label,
    pub read_label: Label,
    pub read_seq: Label,
    pub reading_label: bool,
    pub reading_seq: bool,
    pub active: bool,
    pub wait: Option<WaitState>,
    pub pending_cost: u32,
}

impl CpuThread {
    pub fn new(id: usize, num_registers: usize, stack_size: usize) -> Self {
        Self {
            id,
            regs: RegisterFile::new(num_registers),
            heads: [Head::new(MAIN_SPACE, 0); NUM_HEADS],
            stack: CpuStack::new(stack_size),
            cur_stack: 0,
            cur_head: HeadId::Ip,
            next_label: Label::new(),
            read_label: Label::new(),
            read_seq: Label::new(),
            reading_label: false,
            reading_seq: false,
            active: true,
            wait: None,
            pending_cost: 0,
        }
    }

    pub fn reset(&mut self, id: usize) {
        self.id = id;
        self.regs.clear();
        self.heads = [Head::new(MAIN_SPACE, 0); NUM_HEADS];
        self.stack.clear();
        self.cur_stack = 0;
        self.cur_head = HeadId::Ip;
        self.next_label.clear();
        self.read_label.clear();
        self.read_seq.clear();
        self.reading_label = false;
        self.reading_seq = false;
        self.active = true;
        self.wait = None;
        self.pending_cost = 0;
    }

    pub fn head(&self, id: HeadId) -> &Head {
        &self.heads[id.index()]
    }

    pub fn head_mut(&mut self, id: HeadId) -> &mut Head {
        &mut self.heads[id.index()]
    }

    pub fn ip(&self) -> &Head {
        self.head(HeadId::Ip)
    }
}

/// Bitset of thread ids in use. New threads take the lowest free id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ThreadIdChart(u64);

impl ThreadIdChart {
    pub const MAX_IDS: usize = 64;

    pub fn reset(&mut self) {
        self.0 = 1;
    }

    pub fn claim(&mut self) -> Option<usize> {
        let id = (!self.0).trailing_zeros() as usize;
        if id >= Self::MAX_IDS {
            return None;
        }
        self.0 |= 1 << id;
        Some(id)
    }

    pub fn release(&mut self, id: usize) {
        if id < Self::MAX_IDS {
            self.0 &= !(1u64 << id);
        }
    }

    pub fn in_use(&self, id: usize) -> bool {
        id < Self::MAX_IDS && self.0 & (1 << id) != 0
    }

    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_chart_reuses_lowest_free_id() {
        let mut chart = ThreadIdChart::default();
        chart.reset();
        assert_eq!(chart.claim(), Some(1));
        assert_eq!(chart.claim(), Some(2));
        chart.release(1);
        assert_eq!(chart.claim(), Some(1));
        assert_eq!(chart.count(), 3);
    }

    #[test]
    fn reset_thread_clears_wait_and_labels() {
        let mut thread = CpuThread::new(3, 4, 10);
        thread.active = false;
        thread.wait = Some(WaitState {
            condition: WaitCondition::Equal,
            reg: 1,
            value: 5,
            dst: 1,
        });
        thread.read_label.add_nop(2);
        thread.reset(0);
        assert!(thread.active);
        assert!(thread.wait.is_none());
        assert!(thread.read_label.is_empty());
        assert_eq!(thread.id, 0);
    }

    #[test]
    fn wait_conditions_compare_observed_against_target() {
        assert!(WaitCondition::Less.is_met(2, 5));
        assert!(!WaitCondition::Greater.is_met(2, 5));
        assert!(WaitCondition::Equal.is_met(5, 5));
    }
}
