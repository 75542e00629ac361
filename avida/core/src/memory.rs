use crate::inst::{Genome, Instruction};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstFlag {
    Copied,
    Mutated,
    Executed,
    PointMut,
    CopyMut,
}

impl InstFlag {
    pub const ALL: [InstFlag; 5] = [
        InstFlag::Copied,
        InstFlag::Mutated,
        InstFlag::Executed,
        InstFlag::PointMut,
        InstFlag::CopyMut,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Per-cell flag bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct InstFlags(u8);

impl InstFlags {
    pub fn contains(self, flag: InstFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    pub fn insert(&mut self, flag: InstFlag) {
        self.0 |= flag.bit();
    }

    pub fn remove(&mut self, flag: InstFlag) {
        self.0 &= !flag.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Circular instruction tape of an organism.
///
/// Instructions and flags are stored in parallel vectors that never differ
/// in length. The backing vectors keep their high-water contents when the
/// active length shrinks, so a later "necrotic" allocation can reclaim the
/// old instructions. Every positional accessor panics on an out-of-range
/// position: callers are expected to route positions through head
/// arithmetic first.
#[derive(Clone, Debug, Default)]
pub struct InstMemory {
    insts: Vec<Instruction>,
    flags: Vec<InstFlags>,
    active: usize,
}

impl InstMemory {
    pub fn new(genome: &Genome) -> Self {
        Self::from_insts(genome.as_slice())
    }

    pub fn from_insts(insts: &[Instruction]) -> Self {
        Self {
            insts: insts.to_vec(),
            flags: vec![InstFlags::default(); insts.len()],
            active: insts.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Size of the backing storage, including cells past the active length.
    pub fn capacity(&self) -> usize {
        self.insts.len()
    }

    #[inline]
    #[track_caller]
    fn check_pos(&self, pos: usize) {
        assert!(
            pos < self.active,
            "memory position {pos} out of range (len {})",
            self.active
        );
    }

    #[inline]
    #[track_caller]
    fn check_insert_pos(&self, pos: usize) {
        assert!(
            pos <= self.active,
            "memory insert position {pos} out of range (len {})",
            self.active
        );
    }

    #[track_caller]
    pub fn get(&self, pos: usize) -> Instruction {
        self.check_pos(pos);
        self.insts[pos]
    }

    /// Overwrite one cell. Flags are left alone.
    #[track_caller]
    pub fn set(&mut self, pos: usize, inst: Instruction) {
        self.check_pos(pos);
        self.insts[pos] = inst;
    }

    #[track_caller]
    pub fn flags(&self, pos: usize) -> InstFlags {
        self.check_pos(pos);
        self.flags[pos]
    }

    #[track_caller]
    pub fn has_flag(&self, pos: usize, flag: InstFlag) -> bool {
        self.flags(pos).contains(flag)
    }

    #[track_caller]
    pub fn set_flag(&mut self, pos: usize, flag: InstFlag) {
        self.check_pos(pos);
        self.flags[pos].insert(flag);
    }

    #[track_caller]
    pub fn clear_flag(&mut self, pos: usize, flag: InstFlag) {
        self.check_pos(pos);
        self.flags[pos].remove(flag);
    }

    #[track_caller]
    pub fn clear_flags(&mut self, pos: usize) {
        self.check_pos(pos);
        self.flags[pos] = InstFlags::default();
    }

    pub fn clear_all_flags(&mut self) {
        for flags in &mut self.flags[..self.active] {
            *flags = InstFlags::default();
        }
    }

    /// Number of active cells carrying `flag` within `range`.
    pub fn count_flag(&self, range: std::ops::Range<usize>, flag: InstFlag) -> usize {
        let end = range.end.min(self.active);
        let start = range.start.min(end);
        self.flags[start..end]
            .iter()
            .filter(|flags| flags.contains(flag))
            .count()
    }

    fn compact(&mut self) {
        self.insts.truncate(self.active);
        self.flags.truncate(self.active);
    }

    #[track_caller]
    pub fn insert(&mut self, pos: usize, inst: Instruction) {
        self.insert_slice(pos, &[inst]);
    }

    #[track_caller]
    pub fn insert_slice(&mut self, pos: usize, insts: &[Instruction]) {
        self.check_insert_pos(pos);
        self.compact();
        self.insts.splice(pos..pos, insts.iter().copied());
        self.flags
            .splice(pos..pos, std::iter::repeat(InstFlags::default()).take(insts.len()));
        self.active += insts.len();
    }

    #[track_caller]
    pub fn remove(&mut self, pos: usize) -> Instruction {
        let inst = self.get(pos);
        self.remove_range(pos, 1);
        inst
    }

    #[track_caller]
    pub fn remove_range(&mut self, pos: usize, count: usize) {
        assert!(
            pos + count <= self.active,
            "memory remove {pos}+{count} out of range (len {})",
            self.active
        );
        self.compact();
        self.insts.drain(pos..pos + count);
        self.flags.drain(pos..pos + count);
        self.active -= count;
    }

    /// Replace `count` cells at `pos` with `insts`; the lengths may differ.
    #[track_caller]
    pub fn replace(&mut self, pos: usize, count: usize, insts: &[Instruction]) {
        assert!(
            pos + count <= self.active,
            "memory replace {pos}+{count} out of range (len {})",
            self.active
        );
        self.compact();
        self.insts.splice(pos..pos + count, insts.iter().copied());
        self.flags.splice(
            pos..pos + count,
            std::iter::repeat(InstFlags::default()).take(insts.len()),
        );
        self.active = self.active - count + insts.len();
    }

    /// Change the active length; new cells hold the default instruction.
    pub fn resize(&mut self, new_len: usize) {
        self.resize_with(new_len, |_| Instruction::default());
    }

    /// Change the active length, reviving any instructions still present in
    /// the backing storage past the old active length.
    pub fn resize_keep_old(&mut self, new_len: usize) {
        let old = self.active;
        let kept = self.insts.len();
        if new_len > old {
            for pos in old..new_len.min(kept) {
                self.flags[pos] = InstFlags::default();
            }
            self.insts.resize(self.insts.len().max(new_len), Instruction::default());
            self.flags.resize(self.flags.len().max(new_len), InstFlags::default());
        }
        self.active = new_len;
    }

    /// Change the active length, filling every new cell from `fill`.
    pub fn resize_with<F>(&mut self, new_len: usize, mut fill: F) -> &mut Self
    where
        F: FnMut(usize) -> Instruction,
    {
        let old = self.active;
        if new_len > self.insts.len() {
            self.insts.resize(new_len, Instruction::default());
            self.flags.resize(new_len, InstFlags::default());
        }
        for pos in old..new_len {
            self.insts[pos] = fill(pos);
            self.flags[pos] = InstFlags::default();
        }
        self.active = new_len;
        self
    }

    pub fn as_slice(&self) -> &[Instruction] {
        &self.insts[..self.active]
    }

    pub fn iter(&self) -> impl Iterator<Item = Instruction> + '_ {
        self.as_slice().iter().copied()
    }

    pub fn to_genome(&self) -> Genome {
        Genome::new(self.as_slice().to_vec())
    }

    /// Copy of `[pos, pos + count)` as a fresh memory with cleared flags.
    #[track_caller]
    pub fn slice_copy(&self, pos: usize, count: usize) -> InstMemory {
        assert!(
            pos + count <= self.active,
            "memory slice {pos}+{count} out of range (len {})",
            self.active
        );
        Self::from_insts(&self.insts[pos..pos + count])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem(ops: &[u8]) -> InstMemory {
        InstMemory::new(&Genome::from_ops(ops))
    }

    fn ops(memory: &InstMemory) -> Vec<u8> {
        memory.iter().map(Instruction::op).collect()
    }

    #[test]
    fn insert_and_remove_keep_flags_aligned() {
        let mut m = mem(&[1, 2, 3]);
        m.set_flag(1, InstFlag::Copied);
        m.insert(1, Instruction::new(9));
        assert_eq!(ops(&m), vec![1, 9, 2, 3]);
        assert!(!m.has_flag(1, InstFlag::Copied));
        assert!(m.has_flag(2, InstFlag::Copied));

        assert_eq!(m.remove(1).op(), 9);
        assert!(m.has_flag(1, InstFlag::Copied));
        m.insert(2, Instruction::new(7));
        assert_eq!(ops(&m), vec![1, 2, 7, 3]);
    }

    #[test]
    fn replace_changes_length() {
        let mut m = mem(&[1, 2, 3, 4]);
        m.replace(1, 2, &[Instruction::new(8)]);
        assert_eq!(ops(&m), vec![1, 8, 4]);
        m.replace(3, 0, &[Instruction::new(5), Instruction::new(6)]);
        assert_eq!(ops(&m), vec![1, 8, 4, 5, 6]);
    }

    #[test]
    fn resize_keep_old_revives_truncated_cells() {
        let mut m = mem(&[1, 2, 3, 4]);
        m.set_flag(3, InstFlag::Executed);
        m.resize(2);
        assert_eq!(m.len(), 2);
        assert_eq!(m.capacity(), 4);
        m.resize_keep_old(5);
        assert_eq!(ops(&m), vec![1, 2, 3, 4, 0]);
        assert!(m.flags(3).is_empty());

        m.resize(2);
        m.resize(4);
        assert_eq!(ops(&m), vec![1, 2, 0, 0]);
    }

    #[test]
    fn count_flag_is_bounded_by_active_length() {
        let mut m = mem(&[0; 6]);
        for pos in 0..6 {
            m.set_flag(pos, InstFlag::Copied);
        }
        m.resize(4);
        assert_eq!(m.count_flag(0..10, InstFlag::Copied), 4);
        assert_eq!(m.count_flag(2..4, InstFlag::Copied), 2);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_access_panics() {
        let m = mem(&[1, 2]);
        let _ = m.get(2);
    }
}
