//! Division: viability checks and offspring extraction.

use crate::config::{HardwareConfig, MutationRates};
use crate::context::OrganismContext;
use crate::inst_lib::InstSet;
use crate::memory::{InstFlag, InstMemory};
use crate::mutation::{self, MutationEvent};
use std::fmt;

/// Bounds an offspring and its parent must satisfy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DivideLimits {
    pub min_len: usize,
    pub max_len: usize,
    pub size_range: f64,
    pub min_exe_lines: f64,
    pub min_copied_lines: f64,
}

impl DivideLimits {
    pub fn from_config(config: &HardwareConfig) -> Self {
        Self {
            min_len: config.min_genome_len,
            max_len: config.max_genome_len,
            size_range: config.offspring_size_range,
            min_exe_lines: config.min_exe_lines,
            min_copied_lines: config.min_copied_lines,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DivideReject {
    BadDividePoint { div_point: i64, len: usize },
    ChildLength { len: i64, min: usize, max: usize },
    ParentLength { len: usize, min: usize, max: usize },
    TooFewExecuted { executed: usize, required: usize },
    TooFewCopied { copied: usize, required: usize },
}

impl fmt::Display for DivideReject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DivideReject::BadDividePoint { div_point, len } => {
                write!(f, "divide point {div_point} outside memory of {len}")
            }
            DivideReject::ChildLength { len, min, max } => {
                write!(f, "offspring length {len} outside [{min}, {max}]")
            }
            DivideReject::ParentLength { len, min, max } => {
                write!(f, "parent length {len} outside [{min}, {max}]")
            }
            DivideReject::TooFewExecuted { executed, required } => {
                write!(f, "{executed} lines executed, {required} required")
            }
            DivideReject::TooFewCopied { copied, required } => {
                write!(f, "{copied} lines copied, {required} required")
            }
        }
    }
}

/// Check whether splitting `memory` at `div_point` into a child of
/// `child_size` is allowed. `birth_len` is the parent's length at birth and
/// anchors the allowed offspring size window.
pub fn check_viable(
    limits: &DivideLimits,
    memory: &InstMemory,
    birth_len: usize,
    div_point: i64,
    child_size: i64,
) -> Result<(), DivideReject> {
    let len = memory.len();
    if div_point < 0 || div_point as usize > len {
        return Err(DivideReject::BadDividePoint { div_point, len });
    }
    let parent_size = div_point as usize;
    if div_point + child_size.max(0) > len as i64 {
        return Err(DivideReject::BadDividePoint { div_point, len });
    }

    let child_max = limits
        .max_len
        .min((birth_len as f64 * limits.size_range) as usize);
    let child_min = limits
        .min_len
        .max((birth_len as f64 / limits.size_range) as usize);
    if child_size < child_min as i64 || child_size > child_max as i64 {
        return Err(DivideReject::ChildLength {
            len: child_size,
            min: child_min,
            max: child_max,
        });
    }
    if parent_size < limits.min_len || parent_size > limits.max_len {
        return Err(DivideReject::ParentLength {
            len: parent_size,
            min: limits.min_len,
            max: limits.max_len,
        });
    }

    let executed = memory.count_flag(0..parent_size, InstFlag::Executed);
    let required = (parent_size as f64 * limits.min_exe_lines) as usize;
    if executed < required {
        return Err(DivideReject::TooFewExecuted { executed, required });
    }

    let child_end = parent_size + child_size as usize;
    let copied = memory.count_flag(parent_size..child_end, InstFlag::Copied);
    let required = ((child_size as f64 * limits.min_copied_lines) as usize).max(1);
    if copied < required {
        return Err(DivideReject::TooFewCopied { copied, required });
    }
    Ok(())
}

/// Cut the offspring out of `memory` and truncate the parent to
/// `div_point`, dropping any extra lines past the offspring.
pub fn extract_offspring(memory: &mut InstMemory, div_point: usize, child_size: usize) -> InstMemory {
    let child = memory.slice_copy(div_point, child_size);
    memory.resize(div_point);
    child
}

/// Divide-time mutations on a freshly extracted offspring.
pub fn mutate_offspring<C>(
    child: &mut InstMemory,
    rates: &MutationRates,
    inst_set: &InstSet,
    ctx: &mut C,
) -> Vec<MutationEvent>
where
    C: OrganismContext + ?Sized,
{
    let mut events = Vec::new();
    if rates.is_zero() {
        return events;
    }
    if ctx.chance(rates.divide_mut) {
        events.extend(mutation::point_mutate_random(child, inst_set, ctx));
    }
    if ctx.chance(rates.divide_ins) {
        events.push(mutation::insert_random(child, inst_set, ctx));
    }
    if ctx.chance(rates.divide_del) {
        events.extend(mutation::delete_random(child, ctx));
    }
    if ctx.chance(rates.divide_uniform) && !child.is_empty() {
        let pos = ctx.random_index(child.len());
        events.extend(mutation::uniform_at(child, pos, inst_set, ctx));
    }
    if ctx.chance(rates.divide_slip) {
        events.extend(mutation::slip(child, ctx));
    }
    if ctx.chance(rates.divide_translocation) {
        events.extend(mutation::translocate(child, ctx));
    }
    events.extend(mutation::point_mutate_sites(
        child,
        rates.div_mut,
        InstFlag::Mutated,
        inst_set,
        ctx,
    ));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimpleContext;
    use crate::inst::Genome;

    fn limits() -> DivideLimits {
        DivideLimits {
            min_len: 1,
            max_len: 1000,
            size_range: 2.0,
            min_exe_lines: 0.5,
            min_copied_lines: 0.5,
        }
    }

    fn grown(parent: usize, child: usize, copied: usize) -> InstMemory {
        let mut memory = InstMemory::new(&Genome::from_ops(&vec![0; parent]));
        for pos in 0..parent {
            memory.set_flag(pos, InstFlag::Executed);
        }
        memory.resize(parent + child);
        for pos in parent..parent + copied {
            memory.set_flag(pos, InstFlag::Copied);
        }
        memory
    }

    #[test]
    fn viable_split_passes() {
        let memory = grown(10, 10, 10);
        assert_eq!(check_viable(&limits(), &memory, 10, 10, 10), Ok(()));
    }

    #[test]
    fn nothing_copied_is_rejected_even_for_tiny_children() {
        let memory = grown(2, 1, 0);
        assert_eq!(
            check_viable(&limits(), &memory, 2, 2, 1),
            Err(DivideReject::TooFewCopied {
                copied: 0,
                required: 1
            })
        );
    }

    #[test]
    fn child_outside_size_range_is_rejected() {
        let memory = grown(10, 30, 30);
        let err = check_viable(&limits(), &memory, 10, 10, 30).expect_err("too large");
        assert!(matches!(err, DivideReject::ChildLength { max: 20, .. }), "{err}");
    }

    #[test]
    fn unexecuted_parent_is_rejected() {
        let mut memory = grown(10, 10, 10);
        for pos in 0..10 {
            memory.clear_flag(pos, InstFlag::Executed);
        }
        let err = check_viable(&limits(), &memory, 10, 10, 10).expect_err("not executed");
        assert_eq!(
            err,
            DivideReject::TooFewExecuted {
                executed: 0,
                required: 5
            }
        );
    }

    #[test]
    fn extraction_truncates_parent_and_drops_extra_lines() {
        let mut memory = InstMemory::new(&Genome::parse("abcdefgh").expect("genome"));
        let child = extract_offspring(&mut memory, 3, 4);
        assert_eq!(child.to_genome().to_string(), "defg");
        assert_eq!(memory.to_genome().to_string(), "abc");
    }

    #[test]
    fn zero_rates_leave_offspring_untouched() {
        let set = InstSet::classic_heads().expect("classic set");
        let mut child = InstMemory::new(&Genome::parse("wzcagc").expect("genome"));
        let mut ctx = SimpleContext::new(4);
        let events = mutate_offspring(&mut child, &MutationRates::none(), &set, &mut ctx);
        assert!(events.is_empty());
        assert_eq!(child.to_genome().to_string(), "wzcagc");
    }
}
