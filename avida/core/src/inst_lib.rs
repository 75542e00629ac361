//! Instruction library: opcode -> (handler kind, nop modifier, cost).
//!
//! An [`InstSet`] is built once when an instruction set is chosen and then
//! shared read-only (behind an `Arc`) by every core that runs it.

use crate::config::CpuVariant;
use crate::context::OrganismContext;
use crate::inst::Instruction;
use crate::thread::WaitCondition;
use crate::{CoreError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchFrom {
    Start,
    Forward,
    Backward,
}

/// Handler selector. Shared names behave per [`CpuVariant`] where the two
/// hardware generations disagree on operand decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstKind {
    Nop,
    // conditionals
    IfZero,
    IfNotZero,
    IfGreaterZero,
    IfLessZero,
    IfEqu,
    IfNEqu,
    IfGreater,
    IfLess,
    IfBit1,
    IfLabel,
    IfCopiedLabel { complement: bool },
    IfCopiedSeq { complement: bool },
    // flow
    JumpF,
    JumpB,
    Call,
    Return,
    Goto,
    GotoIfNEqu,
    GotoIfLess,
    Label,
    MoveHead,
    MoveHeadIfNEqu,
    MoveHeadIfLess,
    JumpHead,
    GetHead,
    SetFlow,
    HeadSearch,
    SearchLabel { complement: bool, from: SearchFrom },
    SearchSeq { complement: bool, from: SearchFrom },
    // stacks and registers
    Pop,
    Push,
    PopAll,
    PushAll,
    SwapStack,
    SwapStackTop,
    Swap,
    CopyReg,
    // arithmetic
    ShiftR,
    ShiftL,
    Inc,
    Dec,
    Zero,
    One,
    Neg,
    Not,
    Rand,
    Mult100,
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    Nand,
    Nor,
    And,
    Or,
    Xor,
    Order,
    // label values
    SetNum,
    ValGrey,
    ValDir,
    ValAddPoly,
    ValFib,
    ValPolyCoef,
    // replication
    Allocate,
    Divide,
    CAlloc,
    CDivide,
    HeadAlloc,
    HeadDivide,
    HeadCopy,
    HeadRead,
    HeadWrite,
    Copy,
    ReadInst,
    WriteInst,
    Compare,
    IfNCpy,
    Repro,
    Die,
    // environment
    TaskIO,
    TaskInput,
    TaskOutput,
    Sense,
    // threads
    ForkThread,
    KillThread,
    ThreadCreate,
    ExitThread,
    ThreadId,
    Wait(WaitCondition),
}

impl InstKind {
    /// Instructions that touch the environment, memory or the offspring.
    /// Speculative execution stops in front of them.
    pub fn stalls(self) -> bool {
        matches!(
            self,
            InstKind::TaskIO
                | InstKind::TaskInput
                | InstKind::TaskOutput
                | InstKind::Sense
                | InstKind::Allocate
                | InstKind::CAlloc
                | InstKind::HeadAlloc
                | InstKind::Divide
                | InstKind::CDivide
                | InstKind::HeadDivide
                | InstKind::HeadCopy
                | InstKind::HeadWrite
                | InstKind::Copy
                | InstKind::WriteInst
                | InstKind::Repro
                | InstKind::Die
                | InstKind::Wait(_)
        )
    }
}

macro_rules! nops {
    ($($name:literal),*) => { [$(($name, InstKind::Nop)),*] };
}

const NOP_NAMES: [(&str, InstKind); 16] = nops!(
    "nop-A", "nop-B", "nop-C", "nop-D", "nop-E", "nop-F", "nop-G", "nop-H", "nop-I", "nop-J",
    "nop-K", "nop-L", "nop-M", "nop-N", "nop-O", "nop-P"
);

const NAMED_KINDS: &[(&str, InstKind)] = &[
    ("if-0", InstKind::IfZero),
    ("if-equ-0", InstKind::IfZero),
    ("if-not-0", InstKind::IfNotZero),
    ("if-gtr-0", InstKind::IfGreaterZero),
    ("if-less-0", InstKind::IfLessZero),
    ("if-equ", InstKind::IfEqu),
    ("if-n-equ", InstKind::IfNEqu),
    ("if-grt", InstKind::IfGreater),
    ("if-less", InstKind::IfLess),
    ("if-bit-1", InstKind::IfBit1),
    ("if-label", InstKind::IfLabel),
    ("if-copied-lbl-comp", InstKind::IfCopiedLabel { complement: true }),
    ("if-copied-lbl-direct", InstKind::IfCopiedLabel { complement: false }),
    ("if-copied-seq-comp", InstKind::IfCopiedSeq { complement: true }),
    ("if-copied-seq-direct", InstKind::IfCopiedSeq { complement: false }),
    ("jump-f", InstKind::JumpF),
    ("jump-b", InstKind::JumpB),
    ("call", InstKind::Call),
    ("return", InstKind::Return),
    ("goto", InstKind::Goto),
    ("goto-if-n-equ", InstKind::GotoIfNEqu),
    ("goto-if-less", InstKind::GotoIfLess),
    ("label", InstKind::Label),
    ("mov-head", InstKind::MoveHead),
    ("mov-head-if-n-equ", InstKind::MoveHeadIfNEqu),
    ("mov-head-if-less", InstKind::MoveHeadIfLess),
    ("jmp-head", InstKind::JumpHead),
    ("get-head", InstKind::GetHead),
    ("set-flow", InstKind::SetFlow),
    ("h-search", InstKind::HeadSearch),
    ("search-lbl-comp-s", InstKind::SearchLabel { complement: true, from: SearchFrom::Start }),
    ("search-lbl-comp-f", InstKind::SearchLabel { complement: true, from: SearchFrom::Forward }),
    ("search-lbl-comp-b", InstKind::SearchLabel { complement: true, from: SearchFrom::Backward }),
    ("search-lbl-direct-s", InstKind::SearchLabel { complement: false, from: SearchFrom::Start }),
    ("search-lbl-direct-f", InstKind::SearchLabel { complement: false, from: SearchFrom::Forward }),
    ("search-lbl-direct-b", InstKind::SearchLabel { complement: false, from: SearchFrom::Backward }),
    ("search-seq-comp-s", InstKind::SearchSeq { complement: true, from: SearchFrom::Start }),
    ("search-seq-comp-f", InstKind::SearchSeq { complement: true, from: SearchFrom::Forward }),
    ("search-seq-comp-b", InstKind::SearchSeq { complement: true, from: SearchFrom::Backward }),
    ("search-seq-direct-s", InstKind::SearchSeq { complement: false, from: SearchFrom::Start }),
    ("search-seq-direct-f", InstKind::SearchSeq { complement: false, from: SearchFrom::Forward }),
    ("search-seq-direct-b", InstKind::SearchSeq { complement: false, from: SearchFrom::Backward }),
    ("pop", InstKind::Pop),
    ("push", InstKind::Push),
    ("pop-all", InstKind::PopAll),
    ("push-all", InstKind::PushAll),
    ("swap-stk", InstKind::SwapStack),
    ("swap-stk-top", InstKind::SwapStackTop),
    ("swap", InstKind::Swap),
    ("copy-reg", InstKind::CopyReg),
    ("shift-r", InstKind::ShiftR),
    ("shift-l", InstKind::ShiftL),
    ("inc", InstKind::Inc),
    ("dec", InstKind::Dec),
    ("zero", InstKind::Zero),
    ("one", InstKind::One),
    ("neg", InstKind::Neg),
    ("not", InstKind::Not),
    ("rand", InstKind::Rand),
    ("mult100", InstKind::Mult100),
    ("add", InstKind::Add),
    ("sub", InstKind::Sub),
    ("mult", InstKind::Mult),
    ("div", InstKind::Div),
    ("mod", InstKind::Mod),
    ("nand", InstKind::Nand),
    ("nor", InstKind::Nor),
    ("and", InstKind::And),
    ("or", InstKind::Or),
    ("xor", InstKind::Xor),
    ("order", InstKind::Order),
    ("set-num", InstKind::SetNum),
    ("val-grey", InstKind::ValGrey),
    ("val-dir", InstKind::ValDir),
    ("val-add-p", InstKind::ValAddPoly),
    ("val-fib", InstKind::ValFib),
    ("val-poly-c", InstKind::ValPolyCoef),
    ("allocate", InstKind::Allocate),
    ("divide", InstKind::Divide),
    ("c-alloc", InstKind::CAlloc),
    ("c-divide", InstKind::CDivide),
    ("h-alloc", InstKind::HeadAlloc),
    ("h-divide", InstKind::HeadDivide),
    ("h-copy", InstKind::HeadCopy),
    ("h-read", InstKind::HeadRead),
    ("h-write", InstKind::HeadWrite),
    ("copy", InstKind::Copy),
    ("read-inst", InstKind::ReadInst),
    ("write-inst", InstKind::WriteInst),
    ("compare", InstKind::Compare),
    ("if-n-cpy", InstKind::IfNCpy),
    ("repro", InstKind::Repro),
    ("die", InstKind::Die),
    ("IO", InstKind::TaskIO),
    ("input", InstKind::TaskInput),
    ("output", InstKind::TaskOutput),
    ("sense", InstKind::Sense),
    ("fork-th", InstKind::ForkThread),
    ("fork-thread", InstKind::ForkThread),
    ("kill-th", InstKind::KillThread),
    ("kill-thread", InstKind::KillThread),
    ("thread-create", InstKind::ThreadCreate),
    ("exit-thread", InstKind::ExitThread),
    ("id-th", InstKind::ThreadId),
    ("id-thread", InstKind::ThreadId),
    ("wait-cond-equ", InstKind::Wait(WaitCondition::Equal)),
    ("wait-cond-less", InstKind::Wait(WaitCondition::Less)),
    ("wait-cond-gtr", InstKind::Wait(WaitCondition::Greater)),
];

static CATALOG: Lazy<HashMap<&'static str, InstKind>> = Lazy::new(|| {
    NOP_NAMES
        .iter()
        .chain(NAMED_KINDS.iter())
        .map(|&(name, kind)| (name, kind))
        .collect()
});

pub const CLASSIC_HEADS: [&str; 26] = [
    "nop-A", "nop-B", "nop-C", "if-n-equ", "if-less", "if-label", "mov-head", "jmp-head",
    "get-head", "set-flow", "shift-r", "shift-l", "inc", "dec", "push", "pop", "swap-stk", "swap",
    "add", "sub", "nand", "h-copy", "h-alloc", "h-divide", "IO", "h-search",
];

pub const EXPERIMENTAL: &[&str] = &[
    "nop-A", "nop-B", "nop-C", "nop-D", "nop-E", "nop-F", "nop-G", "nop-H",
    "thread-create", "exit-thread", "id-thread",
    "if-n-equ", "if-less", "if-not-0", "if-equ-0", "if-gtr-0", "if-less-0",
    "pop", "push", "pop-all", "push-all", "swap-stk", "swap-stk-top", "swap",
    "shift-r", "shift-l", "inc", "dec", "zero", "one", "rand", "mult100",
    "add", "sub", "nand", "mult", "div", "mod",
    "IO", "input", "output", "label",
    "search-lbl-comp-s", "search-lbl-comp-f", "search-lbl-comp-b",
    "search-lbl-direct-s", "search-lbl-direct-f", "search-lbl-direct-b",
    "search-seq-comp-s", "search-seq-comp-f", "search-seq-comp-b",
    "search-seq-direct-s", "search-seq-direct-f", "search-seq-direct-b",
    "mov-head", "mov-head-if-n-equ", "mov-head-if-less",
    "goto", "goto-if-n-equ", "goto-if-less", "jmp-head", "get-head", "set-flow",
    "h-alloc", "h-divide", "h-copy", "h-read", "h-write",
    "if-copied-lbl-comp", "if-copied-lbl-direct", "if-copied-seq-comp", "if-copied-seq-direct",
    "repro", "die", "wait-cond-equ", "wait-cond-less", "wait-cond-gtr",
];

/// The stock 100-line self-replicator for [`CLASSIC_HEADS`]: allocate,
/// search for the end label, copy until the label has been copied, divide.
pub const DEFAULT_ANCESTOR: &str = "wzcagcccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccczvfcaxgab";

fn default_cost() -> u32 {
    1
}

/// One instruction as listed in an instruction-set description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstSpec {
    pub name: String,
    #[serde(default = "default_cost")]
    pub cost: u32,
    #[serde(default)]
    pub prob_fail: f64,
}

impl InstSpec {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cost: default_cost(),
            prob_fail: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstEntry {
    pub name: String,
    pub kind: InstKind,
    pub nop_mod: Option<u8>,
    pub cost: u32,
    pub prob_fail: f64,
}

impl InstEntry {
    pub fn is_nop(&self) -> bool {
        self.nop_mod.is_some()
    }

    pub fn is_label(&self) -> bool {
        self.kind == InstKind::Label
    }

    pub fn stalls(&self) -> bool {
        self.kind.stalls()
    }
}

#[derive(Clone, Debug)]
pub struct InstSet {
    variant: CpuVariant,
    entries: Vec<InstEntry>,
    by_name: HashMap<String, u8>,
    num_nops: usize,
}

impl InstSet {
    pub fn from_specs(variant: CpuVariant, specs: &[InstSpec]) -> Result<Self> {
        if specs.is_empty() || specs.len() >= Instruction::ERROR.op() as usize {
            return Err(CoreError::InvalidConfig(format!(
                "instruction set needs 1..{} entries, got {}",
                Instruction::ERROR.op(),
                specs.len()
            )));
        }
        let mut entries = Vec::with_capacity(specs.len());
        let mut by_name = HashMap::new();
        for (op, spec) in specs.iter().enumerate() {
            let kind = *CATALOG
                .get(spec.name.as_str())
                .ok_or_else(|| CoreError::UnknownInstruction(spec.name.clone()))?;
            let nop_mod = match kind {
                InstKind::Nop => spec.name.strip_prefix("nop-").and_then(|suffix| {
                    suffix.bytes().next().map(|letter| letter - b'A')
                }),
                _ => None,
            };
            by_name.entry(spec.name.clone()).or_insert(op as u8);
            entries.push(InstEntry {
                name: spec.name.clone(),
                kind,
                nop_mod,
                cost: spec.cost,
                prob_fail: spec.prob_fail,
            });
        }
        let num_nops = entries.iter().filter(|entry| entry.is_nop()).count();
        Ok(Self {
            variant,
            entries,
            by_name,
            num_nops,
        })
    }

    pub fn from_names(variant: CpuVariant, names: &[&str]) -> Result<Self> {
        let specs: Vec<InstSpec> = names.iter().map(|name| InstSpec::named(name)).collect();
        Self::from_specs(variant, &specs)
    }

    /// The 26-instruction heads set, symbols `a` through `z`.
    pub fn classic_heads() -> Result<Self> {
        Self::from_names(CpuVariant::Classic, &CLASSIC_HEADS)
    }

    pub fn experimental() -> Result<Self> {
        Self::from_names(CpuVariant::Experimental, EXPERIMENTAL)
    }

    pub fn for_variant(variant: CpuVariant) -> Result<Self> {
        match variant {
            CpuVariant::Classic => Self::classic_heads(),
            CpuVariant::Experimental => Self::experimental(),
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn variant(&self) -> CpuVariant {
        self.variant
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn num_nops(&self) -> usize {
        self.num_nops
    }

    pub fn entries(&self) -> &[InstEntry] {
        &self.entries
    }

    pub fn entry(&self, inst: Instruction) -> Option<&InstEntry> {
        self.entries.get(inst.op() as usize)
    }

    pub fn kind(&self, inst: Instruction) -> Option<InstKind> {
        self.entry(inst).map(|entry| entry.kind)
    }

    pub fn is_nop(&self, inst: Instruction) -> bool {
        self.nop_mod(inst).is_some()
    }

    pub fn nop_mod(&self, inst: Instruction) -> Option<u8> {
        self.entry(inst).and_then(|entry| entry.nop_mod)
    }

    pub fn is_label(&self, inst: Instruction) -> bool {
        self.entry(inst).is_some_and(InstEntry::is_label)
    }

    pub fn should_stall(&self, inst: Instruction) -> bool {
        self.entry(inst).is_some_and(InstEntry::stalls)
    }

    pub fn name(&self, inst: Instruction) -> &str {
        self.entry(inst).map_or("(unknown)", |entry| entry.name.as_str())
    }

    pub fn inst_by_name(&self, name: &str) -> Option<Instruction> {
        self.by_name.get(name).copied().map(Instruction::new)
    }

    /// Opcodes for a list of names, failing on the first unknown one.
    pub fn assemble(&self, names: &[&str]) -> Result<Vec<Instruction>> {
        names
            .iter()
            .map(|name| {
                self.inst_by_name(name)
                    .ok_or_else(|| CoreError::UnknownInstruction(name.to_string()))
            })
            .collect()
    }

    pub fn random_inst<C: OrganismContext + ?Sized>(&self, ctx: &mut C) -> Instruction {
        Instruction::new(ctx.random_index(self.entries.len()) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimpleContext;

    #[test]
    fn classic_heads_maps_letters_to_entries() {
        let set = InstSet::classic_heads().expect("classic set");
        assert_eq!(set.size(), 26);
        assert_eq!(set.num_nops(), 3);
        assert_eq!(set.nop_mod(Instruction::new(2)), Some(2));
        assert_eq!(set.name(Instruction::new(21)), "h-copy");
        assert_eq!(set.inst_by_name("h-search"), Some(Instruction::new(25)));
        assert!(set.should_stall(Instruction::new(23)));
        assert!(!set.should_stall(Instruction::new(25)));
    }

    #[test]
    fn experimental_set_has_label_and_waits() {
        let set = InstSet::experimental().expect("experimental set");
        assert_eq!(set.num_nops(), 8);
        let label = set.inst_by_name("label").expect("label inst");
        assert!(set.is_label(label));
        let wait = set.inst_by_name("wait-cond-equ").expect("wait inst");
        assert_eq!(set.kind(wait), Some(InstKind::Wait(WaitCondition::Equal)));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = InstSet::from_names(CpuVariant::Classic, &["nop-A", "teleport"])
            .expect_err("unknown instruction");
        assert!(matches!(err, CoreError::UnknownInstruction(name) if name == "teleport"));
    }

    #[test]
    fn random_inst_stays_inside_the_set() {
        let set = InstSet::classic_heads().expect("classic set");
        let mut ctx = SimpleContext::new(3);
        for _ in 0..200 {
            assert!(set.entry(set.random_inst(&mut ctx)).is_some());
        }
    }

    #[test]
    fn out_of_range_opcode_has_no_entry() {
        let set = InstSet::classic_heads().expect("classic set");
        assert!(set.entry(Instruction::new(40)).is_none());
        assert!(!set.is_nop(Instruction::ERROR));
    }
}
