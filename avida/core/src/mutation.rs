//! Mutation operators.
//!
//! Each operator is a function of the memory, the instruction set (for
//! replacement opcodes) and the context's random stream. Identical random
//! streams give identical mutations.

use crate::context::OrganismContext;
use crate::inst::Instruction;
use crate::inst_lib::InstSet;
use crate::memory::{InstFlag, InstMemory};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationEvent {
    Point { pos: usize, from: u8, to: u8 },
    Insert { pos: usize, inst: u8 },
    Delete { pos: usize, inst: u8 },
    /// `[from, to)` duplicated in place when `duplicate`, removed otherwise.
    Slip { from: usize, to: usize, duplicate: bool },
    Translocation { from: usize, to: usize, dest: usize },
}

/// Replace the instruction at `pos` with a random one and flag it.
pub fn point_mutate_at<C>(
    memory: &mut InstMemory,
    pos: usize,
    flag: InstFlag,
    inst_set: &InstSet,
    ctx: &mut C,
) -> MutationEvent
where
    C: OrganismContext + ?Sized,
{
    let from = memory.get(pos).op();
    let to = inst_set.random_inst(ctx);
    memory.set(pos, to);
    memory.set_flag(pos, InstFlag::Mutated);
    memory.set_flag(pos, flag);
    MutationEvent::Point {
        pos,
        from,
        to: to.op(),
    }
}

/// Roll `rate` independently at every site.
pub fn point_mutate_sites<C>(
    memory: &mut InstMemory,
    rate: f64,
    flag: InstFlag,
    inst_set: &InstSet,
    ctx: &mut C,
) -> Vec<MutationEvent>
where
    C: OrganismContext + ?Sized,
{
    let mut events = Vec::new();
    if rate <= 0.0 {
        return events;
    }
    for pos in 0..memory.len() {
        if ctx.chance(rate) {
            events.push(point_mutate_at(memory, pos, flag, inst_set, ctx));
        }
    }
    events
}

/// Mutate one uniformly chosen site.
pub fn point_mutate_random<C>(
    memory: &mut InstMemory,
    inst_set: &InstSet,
    ctx: &mut C,
) -> Option<MutationEvent>
where
    C: OrganismContext + ?Sized,
{
    if memory.is_empty() {
        return None;
    }
    let pos = ctx.random_index(memory.len());
    Some(point_mutate_at(memory, pos, InstFlag::Mutated, inst_set, ctx))
}

pub fn insert_random<C>(
    memory: &mut InstMemory,
    inst_set: &InstSet,
    ctx: &mut C,
) -> MutationEvent
where
    C: OrganismContext + ?Sized,
{
    let pos = ctx.random_index(memory.len() + 1);
    insert_at(memory, pos, inst_set, ctx)
}

pub fn insert_at<C>(
    memory: &mut InstMemory,
    pos: usize,
    inst_set: &InstSet,
    ctx: &mut C,
) -> MutationEvent
where
    C: OrganismContext + ?Sized,
{
    let inst = inst_set.random_inst(ctx);
    memory.insert(pos, inst);
    memory.set_flag(pos, InstFlag::Mutated);
    MutationEvent::Insert {
        pos,
        inst: inst.op(),
    }
}

/// Delete one random site; a single-instruction memory is left alone.
pub fn delete_random<C>(memory: &mut InstMemory, ctx: &mut C) -> Option<MutationEvent>
where
    C: OrganismContext + ?Sized,
{
    if memory.len() <= 1 {
        return None;
    }
    let pos = ctx.random_index(memory.len());
    delete_at(memory, pos)
}

pub fn delete_at(memory: &mut InstMemory, pos: usize) -> Option<MutationEvent> {
    if memory.len() <= 1 || pos >= memory.len() {
        return None;
    }
    let inst = memory.remove(pos);
    Some(MutationEvent::Delete {
        pos,
        inst: inst.op(),
    })
}

/// One draw picks between a point change to any opcode, a deletion, or an
/// insertion of any opcode, all equally likely per outcome.
pub fn uniform_at<C>(
    memory: &mut InstMemory,
    pos: usize,
    inst_set: &InstSet,
    ctx: &mut C,
) -> Option<MutationEvent>
where
    C: OrganismContext + ?Sized,
{
    let size = inst_set.size();
    let draw = ctx.random_index(size * 2 + 1);
    if draw < size {
        let from = memory.get(pos).op();
        memory.set(pos, Instruction::new(draw as u8));
        memory.set_flag(pos, InstFlag::Mutated);
        Some(MutationEvent::Point {
            pos,
            from,
            to: draw as u8,
        })
    } else if draw == size {
        delete_at(memory, pos)
    } else {
        let inst = Instruction::new((draw - size - 1) as u8);
        memory.insert(pos + 1, inst);
        memory.set_flag(pos + 1, InstFlag::Mutated);
        Some(MutationEvent::Insert {
            pos: pos + 1,
            inst: inst.op(),
        })
    }
}

/// Slip: pick two cut points. When the second precedes the first, the
/// block between them is duplicated; otherwise it is deleted.
pub fn slip<C>(memory: &mut InstMemory, ctx: &mut C) -> Option<MutationEvent>
where
    C: OrganismContext + ?Sized,
{
    let len = memory.len();
    if len == 0 {
        return None;
    }
    let from = ctx.random_index(len + 1);
    slip_from(memory, from, ctx)
}

pub fn slip_from<C>(memory: &mut InstMemory, from: usize, ctx: &mut C) -> Option<MutationEvent>
where
    C: OrganismContext + ?Sized,
{
    let len = memory.len();
    let to = ctx.random_index(len + 1);
    if from == to || from > len {
        return None;
    }
    if to < from {
        let block: Vec<_> = memory.as_slice()[to..from].to_vec();
        memory.insert_slice(from, &block);
        for pos in from..from + block.len() {
            memory.set_flag(pos, InstFlag::Mutated);
        }
        Some(MutationEvent::Slip {
            from: to,
            to: from,
            duplicate: true,
        })
    } else {
        if to - from >= len {
            return None;
        }
        memory.remove_range(from, to - from);
        Some(MutationEvent::Slip {
            from,
            to,
            duplicate: false,
        })
    }
}

/// Cut a random block and reinsert it elsewhere.
pub fn translocate<C>(memory: &mut InstMemory, ctx: &mut C) -> Option<MutationEvent>
where
    C: OrganismContext + ?Sized,
{
    let len = memory.len();
    if len < 2 {
        return None;
    }
    let a = ctx.random_index(len + 1);
    let b = ctx.random_index(len + 1);
    let (from, to) = (a.min(b), a.max(b));
    if from == to || to - from == len {
        return None;
    }
    let block: Vec<_> = memory.as_slice()[from..to].to_vec();
    memory.remove_range(from, to - from);
    let dest = ctx.random_index(memory.len() + 1);
    memory.insert_slice(dest, &block);
    for pos in dest..dest + block.len() {
        memory.set_flag(pos, InstFlag::Mutated);
    }
    Some(MutationEvent::Translocation { from, to, dest })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimpleContext;
    use crate::inst::Genome;

    fn setup() -> (InstMemory, InstSet) {
        let set = InstSet::classic_heads().expect("classic set");
        let memory = InstMemory::new(&Genome::parse("abcdefghij").expect("genome"));
        (memory, set)
    }

    #[test]
    fn zero_rate_draws_nothing() {
        let (mut memory, set) = setup();
        let before = memory.to_genome();
        let mut ctx = SimpleContext::new(9);
        let events = point_mutate_sites(&mut memory, 0.0, InstFlag::PointMut, &set, &mut ctx);
        assert!(events.is_empty());
        assert_eq!(memory.to_genome(), before);
    }

    #[test]
    fn full_rate_flags_every_site() {
        let (mut memory, set) = setup();
        let mut ctx = SimpleContext::new(9);
        let events = point_mutate_sites(&mut memory, 1.0, InstFlag::PointMut, &set, &mut ctx);
        assert_eq!(events.len(), 10);
        assert_eq!(memory.count_flag(0..10, InstFlag::PointMut), 10);
    }

    #[test]
    fn same_stream_same_mutations() {
        let run = |seed| {
            let (mut memory, set) = setup();
            let mut ctx = SimpleContext::new(seed);
            let mut events = Vec::new();
            events.push(insert_random(&mut memory, &set, &mut ctx));
            events.extend(slip(&mut memory, &mut ctx));
            events.extend(translocate(&mut memory, &mut ctx));
            (events, memory.to_genome())
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn delete_keeps_at_least_one_instruction() {
        let set = InstSet::classic_heads().expect("classic set");
        let mut memory = InstMemory::new(&Genome::parse("a").expect("genome"));
        let mut ctx = SimpleContext::new(1);
        assert!(delete_random(&mut memory, &mut ctx).is_none());
        assert_eq!(memory.len(), 1);
        let _ = insert_random(&mut memory, &set, &mut ctx);
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn translocation_preserves_contents() {
        let (mut memory, _) = setup();
        let mut ctx = SimpleContext::new(5);
        let mut before: Vec<u8> = memory.iter().map(|i| i.op()).collect();
        translocate(&mut memory, &mut ctx);
        let mut after: Vec<u8> = memory.iter().map(|i| i.op()).collect();
        before.sort_unstable();
        after.sort_unstable();
        assert_eq!(before, after);
    }
}
