//! The organism's view of the outside world.
//!
//! The core never owns an RNG or an environment. Everything stochastic or
//! environmental goes through [`OrganismContext`], so a fixed random stream
//! and a fixed sequence of ticks reproduce a run exactly.

use crate::inst::Genome;
use crate::mutation::MutationEvent;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const INPUT_TAGS: [i32; 3] = [0x0f, 0x33, 0x55];

pub trait OrganismContext {
    /// Uniform in `[0, 1)`.
    fn random_f64(&mut self) -> f64;

    /// Uniform in `[0, upper)`; `upper` is never 0.
    fn random_index(&mut self, upper: usize) -> usize;

    fn random_i32(&mut self) -> i32;

    fn chance(&mut self, prob: f64) -> bool {
        prob > 0.0 && (prob >= 1.0 || self.random_f64() < prob)
    }

    fn next_input(&mut self) -> i32 {
        0
    }

    fn do_input(&mut self, _value: i32) {}

    fn do_output(&mut self, _value: i32) {}

    /// Resource sensing; environments without resources report 0.
    fn sense(&mut self, _resource: i32) -> i32 {
        0
    }

    fn on_divide(&mut self, _offspring: Genome) {}

    fn on_death(&mut self) {}

    fn on_fault(&mut self, _message: &str) {}

    fn on_mutation(&mut self, _event: &MutationEvent) {}
}

/// Self-contained context: seeded RNG, a rotating input buffer, and
/// recorded outputs, offspring and death.
pub struct SimpleContext {
    rng: StdRng,
    inputs: Vec<i32>,
    input_pos: usize,
    pub received: Vec<i32>,
    pub outputs: Vec<i32>,
    pub offspring: Vec<Genome>,
    pub faults: Vec<String>,
    pub mutations: Vec<MutationEvent>,
    pub died: bool,
}

impl SimpleContext {
    /// Inputs are three random 24-bit values tagged in their top byte.
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let inputs = INPUT_TAGS
            .iter()
            .map(|tag| (tag << 24) | rng.gen_range(0..1 << 24))
            .collect();
        Self::with_rng(rng, inputs)
    }

    pub fn with_inputs(seed: u64, inputs: Vec<i32>) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), inputs)
    }

    fn with_rng(rng: StdRng, inputs: Vec<i32>) -> Self {
        Self {
            rng,
            inputs,
            input_pos: 0,
            received: Vec::new(),
            outputs: Vec::new(),
            offspring: Vec::new(),
            faults: Vec::new(),
            mutations: Vec::new(),
            died: false,
        }
    }

    pub fn inputs(&self) -> &[i32] {
        &self.inputs
    }

    pub fn take_offspring(&mut self) -> Vec<Genome> {
        std::mem::take(&mut self.offspring)
    }
}

impl OrganismContext for SimpleContext {
    fn random_f64(&mut self) -> f64 {
        self.rng.gen()
    }

    fn random_index(&mut self, upper: usize) -> usize {
        self.rng.gen_range(0..upper.max(1))
    }

    fn random_i32(&mut self) -> i32 {
        self.rng.gen()
    }

    fn next_input(&mut self) -> i32 {
        if self.inputs.is_empty() {
            return 0;
        }
        let value = self.inputs[self.input_pos];
        self.input_pos = (self.input_pos + 1) % self.inputs.len();
        value
    }

    fn do_input(&mut self, value: i32) {
        self.received.push(value);
    }

    fn do_output(&mut self, value: i32) {
        self.outputs.push(value);
    }

    fn on_divide(&mut self, offspring: Genome) {
        self.offspring.push(offspring);
    }

    fn on_death(&mut self) {
        self.died = true;
    }

    fn on_fault(&mut self, message: &str) {
        self.faults.push(message.to_string());
    }

    fn on_mutation(&mut self, event: &MutationEvent) {
        self.mutations.push(*event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_gives_same_stream() {
        let mut a = SimpleContext::new(42);
        let mut b = SimpleContext::new(42);
        assert_eq!(a.inputs(), b.inputs());
        for _ in 0..16 {
            assert_eq!(a.random_index(100), b.random_index(100));
        }
    }

    #[test]
    fn inputs_rotate_and_carry_tags() {
        let mut ctx = SimpleContext::new(7);
        let first: Vec<i32> = (0..3).map(|_| ctx.next_input()).collect();
        assert_eq!(first[0] >> 24, 0x0f);
        assert_eq!(first[1] >> 24, 0x33);
        assert_eq!(first[2] >> 24, 0x55);
        assert_eq!(ctx.next_input(), first[0]);
    }

    #[test]
    fn take_offspring_drains_the_births() {
        let mut ctx = SimpleContext::new(1);
        ctx.on_divide(Genome::from_ops(&[1, 2]));
        assert_eq!(ctx.take_offspring(), vec![Genome::from_ops(&[1, 2])]);
        assert!(ctx.offspring.is_empty());
    }

    #[test]
    fn chance_edges_do_not_draw() {
        let mut ctx = SimpleContext::with_inputs(1, vec![]);
        assert!(!ctx.chance(0.0));
        assert!(ctx.chance(1.0));
        assert_eq!(ctx.next_input(), 0);
    }
}
