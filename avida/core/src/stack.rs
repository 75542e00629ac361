use crate::register::DataValue;

pub const DEFAULT_STACK_SIZE: usize = 10;

/// Fixed-capacity ring stack. Pushing onto a full stack overwrites the
/// oldest entry; popping an empty slot yields `T::default()`.
#[derive(Clone, Debug)]
pub struct CpuStack<T = DataValue> {
    slots: Vec<T>,
    sp: usize,
}

impl<T: Clone + Default> CpuStack<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![T::default(); capacity.max(1)],
            sp: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn push(&mut self, value: T) {
        let cap = self.slots.len();
        self.sp = (self.sp + cap - 1) % cap;
        self.slots[self.sp] = value;
    }

    /// Read the top and clear its slot so stale values never resurface.
    pub fn pop(&mut self) -> T {
        let value = std::mem::take(&mut self.slots[self.sp]);
        self.sp = (self.sp + 1) % self.slots.len();
        value
    }

    pub fn peek(&self) -> &T {
        &self.slots[self.sp]
    }

    pub fn peek_at(&self, depth: usize) -> &T {
        &self.slots[(self.sp + depth) % self.slots.len()]
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = T::default();
        }
        self.sp = 0;
    }

    /// Entries from the top down.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.slots.len()).map(move |depth| self.peek_at(depth))
    }
}

impl<T: Clone + Default> Default for CpuStack<T> {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut stack: CpuStack<i32> = CpuStack::new(4);
        stack.push(1);
        stack.push(2);
        assert_eq!(*stack.peek(), 2);
        assert_eq!(stack.pop(), 2);
        assert_eq!(stack.pop(), 1);
        assert_eq!(stack.pop(), 0);
    }

    #[test]
    fn pop_clears_the_vacated_slot() {
        let mut stack: CpuStack<i32> = CpuStack::new(2);
        stack.push(5);
        stack.pop();
        // wrap all the way round: the old slot must not hold 5 any more
        stack.pop();
        assert_eq!(stack.pop(), 0);
        assert!(stack.iter().all(|v| *v == 0));
    }

    #[test]
    fn full_stack_overwrites_oldest() {
        let mut stack: CpuStack<i32> = CpuStack::new(3);
        for v in 1..=4 {
            stack.push(v);
        }
        assert_eq!(stack.iter().copied().collect::<Vec<_>>(), vec![4, 3, 2]);
    }
}
