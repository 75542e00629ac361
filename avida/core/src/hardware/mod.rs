//! The per-organism virtual CPU.
//!
//! [`HardwareCore::single_process`] is one tick: pick the next active thread,
//! fetch the instruction under its IP, pay the cost, run the handler and move
//! the IP on. Everything the organism does to the outside world goes through
//! the [`OrganismContext`] passed into each tick.

mod ops;
mod search;

use crate::config::{AllocMethod, CpuVariant, DivideMethod, HardwareConfig};
use crate::context::OrganismContext;
use crate::divide::{self, DivideLimits};
use crate::head::{Head, HeadId, NUM_HEADS};
use crate::inst::{Genome, Instruction};
use crate::inst_lib::{InstKind, InstSet};
use crate::memory::{InstFlag, InstMemory};
use crate::mutation::{self, MutationEvent};
use crate::register::DataValue;
use crate::stack::CpuStack;
use crate::thread::{CpuThread, ThreadIdChart};
use crate::trace::{NullTrace, TraceRecord, TraceSink};
use crate::{CoreError, Result};
use once_cell::sync::Lazy;
use std::env;
use std::sync::Arc;

pub(crate) static CPU_DEBUG: Lazy<bool> = Lazy::new(|| env::var("AVIDA_CPU_DEBUG").is_ok());

macro_rules! cpu_debug {
    ($($arg:tt)*) => {
        if *$crate::hardware::CPU_DEBUG {
            eprintln!("[avida-cpu] {}", format_args!($($arg)*));
        }
    };
}
pub(crate) use cpu_debug;

pub struct HardwareCore {
    config: HardwareConfig,
    limits: DivideLimits,
    inst_set: Arc<InstSet>,
    memory: InstMemory,
    threads: Vec<CpuThread>,
    thread_ids: ThreadIdChart,
    cur_thread: usize,
    global_stack: CpuStack,
    num_registers: usize,
    cycle_count: u64,
    executed: u64,
    birth_len: usize,
    advance_ip: bool,
    mal_active: bool,
    waiting_threads: usize,
    spec_die: bool,
    alive: bool,
    last_output: u64,
    divides: u64,
}

impl HardwareCore {
    pub fn new(inst_set: Arc<InstSet>, config: HardwareConfig, genome: &Genome) -> Result<Self> {
        config.validate()?;
        let config = config.normalized();
        if config.variant != inst_set.variant() {
            return Err(CoreError::InvalidConfig(format!(
                "{:?} hardware cannot run a {:?} instruction set",
                config.variant,
                inst_set.variant()
            )));
        }
        if genome.is_empty() {
            return Err(CoreError::InvalidGenome("empty genome".to_string()));
        }
        if let Some((pos, inst)) = genome
            .iter()
            .enumerate()
            .find(|(_, inst)| inst_set.entry(*inst).is_none())
        {
            return Err(CoreError::InvalidGenome(format!(
                "opcode {} at {pos} is not in the instruction set",
                inst.op()
            )));
        }

        let num_registers = config.registers();
        let mut core = Self {
            limits: DivideLimits::from_config(&config),
            inst_set,
            memory: InstMemory::new(genome),
            threads: vec![CpuThread::new(0, num_registers, config.stack_size)],
            thread_ids: ThreadIdChart::default(),
            cur_thread: 0,
            global_stack: CpuStack::new(config.stack_size),
            num_registers,
            cycle_count: 0,
            executed: 0,
            birth_len: genome.len(),
            advance_ip: true,
            mal_active: false,
            waiting_threads: 0,
            spec_die: false,
            alive: true,
            last_output: 0,
            divides: 0,
            config,
        };
        core.reset();
        Ok(core)
    }

    /// Build the stock instruction set for the configured variant.
    pub fn from_config(config: HardwareConfig, genome: &Genome) -> Result<Self> {
        let inst_set = InstSet::for_variant(config.variant)?.shared();
        Self::new(inst_set, config, genome)
    }

    /// Back to a freshly born state over the current memory.
    pub fn reset(&mut self) {
        self.global_stack.clear();
        self.threads.truncate(1);
        self.threads[0].reset(0);
        self.thread_ids.reset();
        self.cur_thread = 0;
        self.mal_active = false;
        self.waiting_threads = 0;
        self.spec_die = false;
        self.advance_ip = true;
        self.cycle_count = 0;
        self.executed = 0;
        self.birth_len = self.memory.len();
    }

    pub fn single_process<C>(&mut self, ctx: &mut C) -> bool
    where
        C: OrganismContext + ?Sized,
    {
        self.single_process_traced(ctx, &mut NullTrace, false)
    }

    /// One tick. Returns false when the organism is dead, flagged to die, or
    /// when a speculative tick stopped in front of a stalling instruction.
    pub fn single_process_traced<C, T>(&mut self, ctx: &mut C, trace: &mut T, speculative: bool) -> bool
    where
        C: OrganismContext + ?Sized,
        T: TraceSink + ?Sized,
    {
        if !self.alive {
            return false;
        }
        if self.spec_die && !speculative {
            self.die(ctx);
            return false;
        }
        if self.memory.is_empty() {
            self.die(ctx);
            return false;
        }

        let last_thread = self.cur_thread;
        self.cycle_count += 1;
        if !self.select_next_thread() {
            cpu_debug!("no active thread left at cycle {}", self.cycle_count);
            self.die(ctx);
            return false;
        }

        self.advance_ip = true;
        let len = self.memory.len();
        let ip_pos = {
            let ip = self.threads[self.cur_thread].head_mut(HeadId::Ip);
            ip.adjust(len);
            ip.position() as usize
        };
        let inst = self.memory.get(ip_pos);
        let (kind, cost, prob_fail) = match self.inst_set.entry(inst) {
            Some(entry) => (Some(entry.kind), entry.cost, entry.prob_fail),
            None => (None, 1, 0.0),
        };

        if speculative && (self.spec_die || kind.is_some_and(InstKind::stalls)) {
            self.cur_thread = last_thread;
            self.cycle_count -= 1;
            return false;
        }

        if trace.enabled() {
            trace.pre_execute(&self.trace_record(inst, None));
        }

        if cost > 1 {
            let thread = &mut self.threads[self.cur_thread];
            if thread.pending_cost == 0 {
                thread.pending_cost = cost;
            }
            thread.pending_cost -= 1;
            if thread.pending_cost > 0 {
                return self.alive && !self.spec_die;
            }
        }

        self.memory.set_flag(ip_pos, InstFlag::Executed);
        self.executed += 1;
        let success = match kind {
            Some(_) if ctx.chance(prob_fail) => false,
            Some(kind) => self.execute(kind, ctx),
            None => {
                self.fault(ctx, &format!("unknown opcode {} at {ip_pos}", inst.op()));
                false
            }
        };

        if self.advance_ip && self.alive && !self.memory.is_empty() {
            let len = self.memory.len();
            self.threads[self.cur_thread].head_mut(HeadId::Ip).advance(len);
        }

        if trace.enabled() && !self.memory.is_empty() {
            trace.post_execute(&self.trace_record(inst, Some(success)));
        }

        if self.config.max_executed > 0 && self.executed >= self.config.max_executed {
            if speculative {
                self.spec_die = true;
            } else {
                self.die(ctx);
            }
        }
        self.alive && !self.spec_die
    }

    /// Run up to `ticks` ticks, stopping early on death. Returns the number
    /// of ticks that ran.
    pub fn run<C>(&mut self, ctx: &mut C, ticks: u64) -> u64
    where
        C: OrganismContext + ?Sized,
    {
        let mut ran = 0;
        while ran < ticks && self.alive {
            self.single_process(ctx);
            ran += 1;
        }
        ran
    }

    pub fn die<C>(&mut self, ctx: &mut C)
    where
        C: OrganismContext + ?Sized,
    {
        if self.alive {
            cpu_debug!("organism died at cycle {}", self.cycle_count);
            self.alive = false;
            ctx.on_death();
        }
    }

    fn select_next_thread(&mut self) -> bool {
        let count = self.threads.len();
        for step in 1..=count {
            let idx = (self.cur_thread + step) % count;
            if self.threads[idx].active {
                self.cur_thread = idx;
                return true;
            }
        }
        false
    }

    fn trace_record(&self, inst: Instruction, success: Option<bool>) -> TraceRecord {
        let thread = self.thread();
        let mut heads = [0; NUM_HEADS];
        for (slot, head) in heads.iter_mut().zip(thread.heads.iter()) {
            *slot = head.position();
        }
        TraceRecord {
            cycle: self.cycle_count,
            thread: thread.id,
            ip: thread.ip().position(),
            opcode: inst.op(),
            name: self.inst_set.name(inst).to_string(),
            regs: thread.regs.values(),
            heads,
            stack_top: self.current_stack().peek().value,
            memory_len: self.memory.len(),
            success,
        }
    }

    pub(crate) fn fault<C>(&self, ctx: &mut C, message: &str)
    where
        C: OrganismContext + ?Sized,
    {
        cpu_debug!("fault at cycle {}: {message}", self.cycle_count);
        ctx.on_fault(message);
    }

    // ---- threads ----

    pub(crate) fn thread(&self) -> &CpuThread {
        &self.threads[self.cur_thread]
    }

    pub(crate) fn cur(&mut self) -> &mut CpuThread {
        &mut self.threads[self.cur_thread]
    }

    fn is_experimental(&self) -> bool {
        self.config.variant == CpuVariant::Experimental
    }

    /// Clone the current thread under the lowest free id.
    pub fn fork_thread(&mut self) -> bool {
        if self.threads.len() >= self.config.max_threads {
            return false;
        }
        let Some(id) = self.thread_ids.claim() else {
            return false;
        };
        let mut child = self.thread().clone();
        child.id = id;
        child.pending_cost = 0;
        self.threads.push(child);
        cpu_debug!("thread {id} forked from {}", self.thread().id);
        true
    }

    /// Remove the current thread. Round-robin order of the survivors is
    /// kept, and the next tick runs the thread that followed the killed one.
    pub fn kill_thread(&mut self) -> bool {
        if self.threads.len() <= 1 {
            return false;
        }
        let kill = self.cur_thread;
        let removed = self.threads.remove(kill);
        self.thread_ids.release(removed.id);
        if !removed.active {
            self.waiting_threads = self.waiting_threads.saturating_sub(1);
        }
        self.cur_thread = if kill == 0 { self.threads.len() - 1 } else { kill - 1 };
        cpu_debug!("thread {} killed", removed.id);
        true
    }

    /// New thread with cleared state whose IP starts at `start`.
    pub(crate) fn create_thread(&mut self, start: Head) -> bool {
        if self.threads.len() >= self.config.max_threads {
            return false;
        }
        let Some(id) = self.thread_ids.claim() else {
            return false;
        };
        let mut thread = CpuThread::new(id, self.num_registers, self.config.stack_size);
        *thread.head_mut(HeadId::Ip) = start;
        self.threads.push(thread);
        true
    }

    /// Like [`HardwareCore::kill_thread`] but refuses to leave only parked
    /// threads behind.
    pub(crate) fn exit_thread(&mut self) -> bool {
        if self.threads.len() <= 1 || self.waiting_threads + 1 >= self.threads.len() {
            return false;
        }
        self.kill_thread()
    }

    // ---- registers and stacks ----

    pub(crate) fn reg(&self, reg: usize) -> DataValue {
        *self.thread().regs.get(reg)
    }

    pub(crate) fn reg_value(&self, reg: usize) -> i32 {
        self.thread().regs.value(reg)
    }

    /// Every register write goes through here so parked threads see it.
    pub(crate) fn write_register(&mut self, reg: usize, value: DataValue) {
        self.threads[self.cur_thread].regs.set(reg, value);
        if self.waiting_threads > 0 {
            self.check_waiting_threads(self.cur_thread, reg);
        }
    }

    pub(crate) fn set_fresh(&mut self, reg: usize, value: i32, from_env: bool) {
        let value = DataValue::fresh(value, self.cycle_count, from_env);
        self.write_register(reg, value);
    }

    pub(crate) fn set_derived(&mut self, reg: usize, value: i32, src: &DataValue) {
        let value = DataValue::derived(value, self.cycle_count, src);
        self.write_register(reg, value);
    }

    pub(crate) fn set_combined(&mut self, reg: usize, value: i32, a: &DataValue, b: &DataValue) {
        let value = DataValue::combined(value, self.cycle_count, a, b);
        self.write_register(reg, value);
    }

    /// Wake every parked thread whose condition is met by `source`'s
    /// register `reg`. A woken thread's destination write may in turn wake
    /// others.
    fn check_waiting_threads(&mut self, source: usize, reg: usize) {
        let observed = *self.threads[source].regs.get(reg);
        for idx in 0..self.threads.len() {
            if self.waiting_threads == 0 {
                break;
            }
            if idx == source || self.threads[idx].active {
                continue;
            }
            let Some(wait) = self.threads[idx].wait else {
                continue;
            };
            if wait.reg != reg || !wait.condition.is_met(observed.value, wait.value) {
                continue;
            }
            let cycle = self.cycle_count;
            let woken = &mut self.threads[idx];
            woken.active = true;
            woken.wait = None;
            woken
                .regs
                .set(wait.dst, DataValue::derived(observed.value, cycle, &observed));
            cpu_debug!("thread {} woke on reg {reg} = {}", woken.id, observed.value);
            self.waiting_threads -= 1;
            self.check_waiting_threads(idx, wait.dst);
        }
    }

    pub(crate) fn current_stack(&self) -> &CpuStack {
        if self.thread().cur_stack == 0 {
            &self.thread().stack
        } else {
            &self.global_stack
        }
    }

    pub(crate) fn current_stack_mut(&mut self) -> &mut CpuStack {
        if self.thread().cur_stack == 0 {
            &mut self.threads[self.cur_thread].stack
        } else {
            &mut self.global_stack
        }
    }

    // ---- operand decoding ----

    /// Step the IP onto a following nop, if there is one, and return its
    /// modifier.
    fn consume_nop_modifier(&mut self) -> Option<u8> {
        let next = self.thread().ip().next_inst(&self.memory)?;
        let nop = self.inst_set.nop_mod(next)?;
        let len = self.memory.len();
        let ip = self.threads[self.cur_thread].head_mut(HeadId::Ip);
        ip.advance(len);
        let pos = ip.position() as usize;
        self.memory.set_flag(pos, InstFlag::Executed);
        Some(nop)
    }

    /// Defaults are folded into the register file, so a small experimental
    /// file still has a valid DX.
    pub(crate) fn find_modified_register(&mut self, default: usize) -> usize {
        match self.consume_nop_modifier() {
            Some(nop) => nop as usize % self.num_registers,
            None => default % self.num_registers,
        }
    }

    /// A nop names the register; otherwise the one after `base`.
    pub(crate) fn find_modified_next_register(&mut self, base: usize) -> usize {
        let default = self.next_register(base);
        self.find_modified_register(default)
    }

    pub(crate) fn find_modified_head(&mut self, default: HeadId) -> HeadId {
        match self.consume_nop_modifier() {
            Some(nop) => HeadId::from_index(nop as usize),
            None => default,
        }
    }

    pub(crate) fn next_register(&self, reg: usize) -> usize {
        (reg + 1) % self.num_registers
    }

    /// Second operand of a two-register instruction. Experimental hardware
    /// lets a nop name it.
    pub(crate) fn second_operand(&mut self, first: usize) -> usize {
        if self.is_experimental() {
            self.find_modified_next_register(first)
        } else {
            self.next_register(first)
        }
    }

    /// Collect the nops following the IP into the thread's pending label,
    /// leaving the IP on the last one. Only the first `max_label_exe_size`
    /// nops count as executed.
    pub(crate) fn read_label(&mut self) {
        let len = self.memory.len();
        let mut label = crate::label::Label::new();
        let mut ip = *self.thread().ip();
        while !label.is_full() {
            let Some(next) = ip.next_inst(&self.memory) else {
                break;
            };
            let Some(nop) = self.inst_set.nop_mod(next) else {
                break;
            };
            ip.advance(len);
            label.add_nop(nop);
            if label.len() <= self.config.max_label_exe_size {
                self.memory.set_flag(ip.position() as usize, InstFlag::Executed);
            }
        }
        let thread = self.cur();
        *thread.head_mut(HeadId::Ip) = ip;
        thread.next_label = label;
    }

    /// Track the most recently copied label (and nop run) for the
    /// `if-copied-*` and `if-label` family.
    pub(crate) fn record_read(&mut self, inst: Instruction) {
        let nop = self.inst_set.nop_mod(inst);
        let is_label = self.inst_set.is_label(inst);
        let experimental = self.is_experimental();
        let thread = self.cur();
        if !experimental {
            match nop {
                Some(nop) => {
                    thread.read_label.add_nop(nop);
                }
                None => thread.read_label.clear(),
            }
            return;
        }
        match (is_label, nop) {
            (true, _) => {
                thread.read_label.clear();
                thread.reading_label = true;
            }
            (false, Some(nop)) if thread.reading_label => {
                thread.read_label.add_nop(nop);
            }
            _ => {
                thread.read_label.clear();
                thread.reading_label = false;
            }
        }
        match nop {
            Some(nop) => {
                thread.read_seq.add_nop(nop);
                thread.reading_seq = true;
            }
            None => {
                thread.read_seq.clear();
                thread.reading_seq = false;
            }
        }
    }

    // ---- heads ----

    pub(crate) fn head_copy(&self, id: HeadId) -> Head {
        *self.thread().head(id)
    }

    pub(crate) fn head_mut(&mut self, id: HeadId) -> &mut Head {
        self.threads[self.cur_thread].head_mut(id)
    }

    /// Fold every thread's heads back into the current memory.
    pub(crate) fn adjust_heads(&mut self) {
        let len = self.memory.len();
        for thread in &mut self.threads {
            for head in &mut thread.heads {
                head.adjust(len);
            }
        }
    }

    // ---- allocation and division ----

    /// Grow memory by `alloc_size` lines for an offspring to be copied into.
    pub fn allocate<C>(&mut self, ctx: &mut C, alloc_size: i32) -> bool
    where
        C: OrganismContext + ?Sized,
    {
        if self.config.require_allocate && self.mal_active {
            self.fault(ctx, "allocate already active");
            return false;
        }
        if alloc_size < 1 {
            self.fault(ctx, &format!("allocate of {alloc_size} lines"));
            return false;
        }
        let old_size = self.memory.len();
        let new_size = old_size + alloc_size as usize;
        if new_size > self.config.max_genome_len || new_size < self.config.min_genome_len {
            self.fault(ctx, &format!("allocated memory of {new_size} outside genome bounds"));
            return false;
        }
        let range = self.config.offspring_size_range;
        if alloc_size as usize > (old_size as f64 * range) as usize {
            self.fault(ctx, &format!("allocate of {alloc_size} too large for {old_size}"));
            return false;
        }
        if old_size > (alloc_size as f64 * range) as usize {
            self.fault(ctx, &format!("allocate of {alloc_size} too small for {old_size}"));
            return false;
        }

        match self.config.alloc_method {
            AllocMethod::Default => self.memory.resize(new_size),
            AllocMethod::Necro => self.memory.resize_keep_old(new_size),
            AllocMethod::Random => {
                let inst_set = Arc::clone(&self.inst_set);
                self.memory.resize_with(new_size, |_| inst_set.random_inst(ctx));
            }
        }
        self.mal_active = true;
        true
    }

    /// Split `[div_point, len - extra_lines)` off as an offspring.
    pub fn divide<C>(&mut self, ctx: &mut C, div_point: i32, extra_lines: i32) -> bool
    where
        C: OrganismContext + ?Sized,
    {
        if extra_lines < 0 {
            self.fault(ctx, &format!("divide with {extra_lines} extra lines"));
            return false;
        }
        let child_size = self.memory.len() as i64 - div_point as i64 - extra_lines as i64;
        if let Err(reason) = divide::check_viable(
            &self.limits,
            &self.memory,
            self.birth_len,
            div_point as i64,
            child_size,
        ) {
            self.fault(ctx, &format!("divide rejected: {reason}"));
            return false;
        }

        let mut child = divide::extract_offspring(&mut self.memory, div_point as usize, child_size as usize);
        let events = divide::mutate_offspring(&mut child, &self.config.mutation, &self.inst_set, ctx);
        for event in &events {
            ctx.on_mutation(event);
        }
        self.mal_active = false;
        self.divides += 1;
        cpu_debug!(
            "divide at {div_point}: parent {} offspring {} ({} mutations)",
            self.memory.len(),
            child.len(),
            events.len()
        );
        ctx.on_divide(child.to_genome());
        self.finish_divide();
        true
    }

    fn finish_divide(&mut self) {
        match self.config.divide_method {
            DivideMethod::Split => {
                self.memory.clear_all_flags();
                self.reset();
                // The parent restarts on line 0.
                self.advance_ip = false;
            }
            DivideMethod::Keep => self.adjust_heads(),
        }
    }

    /// Offspring is a copy of the whole memory, with per-line copy
    /// mutations and the usual divide-time mutations.
    pub(crate) fn repro<C>(&mut self, ctx: &mut C) -> bool
    where
        C: OrganismContext + ?Sized,
    {
        let len = self.memory.len();
        if len < self.config.min_genome_len || len > self.config.max_genome_len {
            self.fault(ctx, &format!("repro of {len} lines outside genome bounds"));
            return false;
        }
        let mut child = InstMemory::from_insts(self.memory.as_slice());
        let mut events = mutation::point_mutate_sites(
            &mut child,
            self.config.mutation.copy_mut,
            InstFlag::CopyMut,
            &self.inst_set,
            ctx,
        );
        events.extend(divide::mutate_offspring(
            &mut child,
            &self.config.mutation,
            &self.inst_set,
            ctx,
        ));
        for event in &events {
            ctx.on_mutation(event);
        }
        self.divides += 1;
        ctx.on_divide(child.to_genome());
        self.finish_divide();
        true
    }

    /// Roll the per-site point mutation rate over the whole memory. Called
    /// by the scheduler between ticks.
    pub fn apply_point_mutations<C>(&mut self, ctx: &mut C) -> usize
    where
        C: OrganismContext + ?Sized,
    {
        let events = mutation::point_mutate_sites(
            &mut self.memory,
            self.config.mutation.point_mut,
            InstFlag::PointMut,
            &self.inst_set,
            ctx,
        );
        for event in &events {
            ctx.on_mutation(event);
        }
        events.len()
    }

    pub(crate) fn report_mutation<C>(&self, ctx: &mut C, event: Option<MutationEvent>)
    where
        C: OrganismContext + ?Sized,
    {
        if let Some(event) = event {
            ctx.on_mutation(&event);
        }
    }

    // ---- inspection ----

    pub fn memory(&self) -> &InstMemory {
        &self.memory
    }

    pub fn genome(&self) -> Genome {
        self.memory.to_genome()
    }

    pub fn config(&self) -> &HardwareConfig {
        &self.config
    }

    pub fn inst_set(&self) -> &Arc<InstSet> {
        &self.inst_set
    }

    pub fn threads(&self) -> &[CpuThread] {
        &self.threads
    }

    /// Direct access for schedulers and tests. Register writes made here
    /// do not wake waiting threads.
    pub fn thread_mut(&mut self, index: usize) -> Option<&mut CpuThread> {
        self.threads.get_mut(index)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn cur_thread(&self) -> usize {
        self.cur_thread
    }

    pub fn register(&self, reg: usize) -> i32 {
        self.reg_value(reg)
    }

    pub fn set_register(&mut self, reg: usize, value: i32) {
        self.set_fresh(reg % self.num_registers, value, false);
    }

    pub fn num_registers(&self) -> usize {
        self.num_registers
    }

    pub fn head(&self, id: HeadId) -> Head {
        self.head_copy(id)
    }

    pub fn set_head(&mut self, id: HeadId, pos: i32) {
        let len = self.memory.len();
        self.head_mut(id).set(pos, len);
    }

    pub fn global_stack(&self) -> &CpuStack {
        &self.global_stack
    }

    pub fn stack(&self) -> &CpuStack {
        self.current_stack()
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn executed_count(&self) -> u64 {
        self.executed
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn spec_die(&self) -> bool {
        self.spec_die
    }

    pub fn waiting_threads(&self) -> usize {
        self.waiting_threads
    }

    pub fn divide_count(&self) -> u64 {
        self.divides
    }

    pub fn alloc_active(&self) -> bool {
        self.mal_active
    }

    pub fn birth_len(&self) -> usize {
        self.birth_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimpleContext;
    use crate::inst_lib::InstSpec;
    use crate::label::Label;
    use crate::register::{REG_AX, REG_BX, REG_CX};
    use crate::trace::JsonTrace;

    fn permissive(variant: CpuVariant) -> HardwareConfig {
        HardwareConfig {
            variant,
            min_genome_len: 1,
            ..HardwareConfig::default()
        }
    }

    fn core_with(config: HardwareConfig, names: &[&str]) -> HardwareCore {
        let inst_set = InstSet::for_variant(config.variant).expect("inst set").shared();
        let genome = Genome::new(inst_set.assemble(names).expect("assemble"));
        HardwareCore::new(inst_set, config, &genome).expect("core")
    }

    fn classic(names: &[&str]) -> HardwareCore {
        core_with(permissive(CpuVariant::Classic), names)
    }

    fn experimental(names: &[&str]) -> HardwareCore {
        core_with(permissive(CpuVariant::Experimental), names)
    }

    #[test]
    fn classic_label_search_forward_lands_on_last_nop() {
        let mut core = classic(&["jmp-head", "nop-A", "nop-B", "inc", "inc", "nop-B", "nop-C", "inc"]);
        core.cur().next_label = Label::from_nops(&[1, 2]);
        let found = core.find_label(1).expect("label after ip");
        assert_eq!(found.position(), 6);
    }

    #[test]
    fn classic_label_search_backward_reports_run_end() {
        let mut core = classic(&["inc", "nop-A", "nop-B", "inc", "inc", "nop-B", "nop-C", "inc"]);
        core.set_head(HeadId::Ip, 7);
        core.cur().next_label = Label::from_nops(&[0, 1]);
        let found = core.find_label(-1).expect("label before ip");
        assert_eq!(found.position(), 2);
        assert!(core.find_label(1).is_none());
    }

    #[test]
    fn search_label_forward_sets_flow_past_match_and_marks_label() {
        let mut core = experimental(&[
            "search-lbl-direct-f",
            "nop-A",
            "nop-B",
            "inc",
            "label",
            "nop-A",
            "nop-B",
            "inc",
        ]);
        let mut ctx = SimpleContext::new(1);
        assert!(core.single_process(&mut ctx));
        assert_eq!(core.head(HeadId::Flow).position(), 7);
        assert_eq!(core.head(HeadId::Ip).position(), 3);
        assert!(core.memory().has_flag(4, InstFlag::Executed));
        assert!(core.memory().has_flag(5, InstFlag::Executed));
        assert!(!core.memory().has_flag(6, InstFlag::Executed));
    }

    #[test]
    fn search_label_backward_and_from_start() {
        let mut core = experimental(&[
            "label",
            "nop-A",
            "nop-B",
            "inc",
            "search-lbl-direct-b",
            "nop-A",
            "nop-B",
            "inc",
        ]);
        let mut ctx = SimpleContext::new(1);
        core.set_head(HeadId::Ip, 4);
        core.single_process(&mut ctx);
        assert_eq!(core.head(HeadId::Flow).position(), 3);

        let mut core = experimental(&[
            "inc",
            "label",
            "nop-A",
            "nop-B",
            "search-lbl-direct-s",
            "nop-A",
            "nop-B",
            "inc",
        ]);
        core.set_head(HeadId::Ip, 4);
        core.single_process(&mut ctx);
        assert_eq!(core.head(HeadId::Flow).position(), 4);
    }

    #[test]
    fn search_sequence_matches_bare_nops() {
        let mut core = experimental(&[
            "search-seq-direct-f",
            "nop-A",
            "nop-B",
            "inc",
            "nop-C",
            "nop-A",
            "nop-B",
            "inc",
        ]);
        let mut ctx = SimpleContext::new(1);
        core.single_process(&mut ctx);
        assert_eq!(core.head(HeadId::Flow).position(), 7);
        assert!(core.memory().has_flag(5, InstFlag::Executed));
        assert!(!core.memory().has_flag(6, InstFlag::Executed));
    }

    #[test]
    fn missing_label_leaves_flow_after_ip() {
        let mut core = experimental(&["search-lbl-direct-f", "nop-C", "inc", "inc"]);
        let mut ctx = SimpleContext::new(1);
        core.single_process(&mut ctx);
        assert_eq!(core.head(HeadId::Flow).position(), 2);
    }

    #[test]
    fn costly_instruction_takes_several_ticks() {
        let specs: Vec<InstSpec> = ["nop-A", "nop-B", "nop-C"]
            .iter()
            .map(|name| InstSpec::named(name))
            .chain(std::iter::once(InstSpec {
                name: "inc".to_string(),
                cost: 3,
                prob_fail: 0.0,
            }))
            .collect();
        let inst_set = InstSet::from_specs(CpuVariant::Classic, &specs)
            .expect("inst set")
            .shared();
        let genome = Genome::from_ops(&[3, 3]);
        let mut core =
            HardwareCore::new(inst_set, permissive(CpuVariant::Classic), &genome).expect("core");
        let mut ctx = SimpleContext::new(1);
        core.run(&mut ctx, 2);
        assert_eq!(core.register(REG_BX), 0);
        assert_eq!(core.head(HeadId::Ip).position(), 0);
        core.run(&mut ctx, 1);
        assert_eq!(core.register(REG_BX), 1);
        assert_eq!(core.head(HeadId::Ip).position(), 1);
    }

    #[test]
    fn speculative_tick_stops_before_allocation() {
        let mut core = classic(&["inc", "h-alloc"]);
        let mut ctx = SimpleContext::new(1);
        assert!(core.single_process_traced(&mut ctx, &mut NullTrace, true));
        assert!(!core.single_process_traced(&mut ctx, &mut NullTrace, true));
        assert_eq!(core.cycle_count(), 1);
        assert_eq!(core.head(HeadId::Ip).position(), 1);
        assert_eq!(core.memory().len(), 2);

        assert!(core.single_process(&mut ctx));
        assert_eq!(core.memory().len(), 6);
        assert_eq!(core.register(REG_AX), 2);
        assert!(core.alloc_active());
    }

    #[test]
    fn copy_then_compare_sees_matching_lines() {
        let mut core = with_names(
            permissive(CpuVariant::Classic),
            &["nop-A", "nop-B", "nop-C", "copy", "compare", "inc"],
            &["copy", "compare", "inc", "inc"],
        );
        let mut ctx = SimpleContext::new(1);
        core.set_register(REG_AX, 2);
        core.set_register(REG_CX, 9);
        core.single_process(&mut ctx);
        assert_eq!(core.memory().get(2), core.memory().get(0));
        assert!(core.memory().has_flag(2, InstFlag::Copied));
        core.single_process(&mut ctx);
        assert_eq!(core.register(REG_CX), 0);
    }

    #[test]
    fn speculative_tick_stops_before_io_and_copy() {
        for stalling in ["IO", "h-copy"] {
            let mut core = classic(&[stalling, "inc", "inc", "inc"]);
            core.set_head(HeadId::Write, 2);
            let before = core.genome();
            let mut ctx = SimpleContext::with_inputs(1, vec![4]);
            assert!(!core.single_process_traced(&mut ctx, &mut NullTrace, true));
            assert_eq!(core.cycle_count(), 0);
            assert_eq!(core.head(HeadId::Ip).position(), 0);
            assert_eq!(core.genome(), before);
            assert!(ctx.outputs.is_empty() && ctx.received.is_empty());

            assert!(core.single_process(&mut ctx));
            assert_eq!(core.head(HeadId::Ip).position(), 1, "{stalling}");
        }
    }

    #[test]
    fn split_divide_restarts_the_parent_on_line_zero() {
        let mut core = classic(&["h-copy", "h-divide"]);
        let mut ctx = SimpleContext::new(1);
        assert!(core.allocate(&mut ctx, 1));
        core.set_head(HeadId::Read, 1);
        core.set_head(HeadId::Write, 2);
        core.run(&mut ctx, 2);
        assert_eq!(ctx.offspring.len(), 1, "{:?}", ctx.faults);
        assert_eq!(core.head(HeadId::Ip).position(), 0);
        assert_eq!(core.cycle_count(), 0);
    }

    #[test]
    fn wait_defaults_fit_a_small_register_file() {
        let config = HardwareConfig {
            num_registers: Some(3),
            ..permissive(CpuVariant::Experimental)
        };
        let mut core = core_with(config, &["wait-cond-equ", "inc"]);
        assert!(core.fork_thread());
        let mut ctx = SimpleContext::new(1);
        core.run(&mut ctx, 4);
        assert!(core.is_alive());
        // DX folds onto AX: thread 1 sees thread 0's AX of 0 against BX of 0.
        assert_eq!(core.waiting_threads(), 0);
    }

    #[test]
    fn expired_input_cannot_be_output_twice() {
        let run = |io_expire| {
            let config = HardwareConfig {
                io_expire,
                ..permissive(CpuVariant::Experimental)
            };
            let mut core = core_with(config, &["input", "output", "output"]);
            let mut ctx = SimpleContext::with_inputs(1, vec![7]);
            core.run(&mut ctx, 3);
            ctx
        };
        let ctx = run(true);
        assert_eq!(ctx.outputs, vec![7]);
        assert_eq!(ctx.faults, vec!["output of expired value".to_string()]);

        let ctx = run(false);
        assert_eq!(ctx.outputs, vec![7, 7]);
        assert!(ctx.faults.is_empty());
    }

    #[test]
    fn read_head_slip_moves_the_head_instead_of_memory() {
        for seed in 0..8 {
            let mut config = permissive(CpuVariant::Classic);
            config.mutation.copy_slip = 1.0;
            config.slip_read_head = true;
            let mut core = core_with(config, &["h-copy", "nop-A", "nop-B", "nop-C", "inc", "inc"]);
            core.set_head(HeadId::Read, 1);
            core.set_head(HeadId::Write, 4);
            let mut ctx = SimpleContext::new(seed);
            core.single_process(&mut ctx);
            assert_eq!(core.memory().len(), 6);
            assert!(ctx.mutations.is_empty(), "{:?}", ctx.mutations);
            assert_eq!(core.memory().get(4), core.memory().get(1));
        }
    }

    #[test]
    fn push_all_then_pop_all_restores_registers() {
        let mut core = experimental(&["push-all", "pop-all", "inc"]);
        let mut ctx = SimpleContext::new(1);
        for reg in 0..core.num_registers() {
            core.set_register(reg, reg as i32 + 1);
        }
        core.single_process(&mut ctx);
        for reg in 0..core.num_registers() {
            core.set_register(reg, 0);
        }
        core.single_process(&mut ctx);
        let regs: Vec<i32> = (0..core.num_registers()).map(|reg| core.register(reg)).collect();
        assert_eq!(regs, (1..=8).collect::<Vec<i32>>());
    }

    fn with_names(config: HardwareConfig, set: &[&str], names: &[&str]) -> HardwareCore {
        let inst_set = InstSet::from_names(config.variant, set).expect("inst set").shared();
        let genome = Genome::new(inst_set.assemble(names).expect("assemble"));
        HardwareCore::new(inst_set, config, &genome).expect("core")
    }

    #[test]
    fn divide_by_zero_faults_and_keeps_destination() {
        let mut core = with_names(
            permissive(CpuVariant::Classic),
            &["nop-A", "nop-B", "nop-C", "div"],
            &["div"],
        );
        let mut ctx = SimpleContext::new(1);
        core.set_register(REG_BX, 7);
        core.set_register(REG_CX, 0);
        core.single_process(&mut ctx);
        assert_eq!(core.register(REG_BX), 7);
        assert_eq!(ctx.faults.len(), 1);
    }

    #[test]
    fn kill_keeps_round_robin_order() {
        let mut core = classic(&["inc", "inc", "inc"]);
        assert!(core.fork_thread());
        assert!(core.fork_thread());
        let ids: Vec<usize> = core.threads().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);

        assert!(core.kill_thread());
        let ids: Vec<usize> = core.threads().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
        let mut ctx = SimpleContext::new(1);
        core.single_process(&mut ctx);
        assert_eq!(core.threads()[core.cur_thread()].id, 1);

        assert!(core.fork_thread());
        assert_eq!(core.threads().last().map(|t| t.id), Some(0));
    }

    #[test]
    fn last_thread_cannot_be_killed_or_parked() {
        let mut core = experimental(&["wait-cond-equ", "inc"]);
        assert!(!core.kill_thread());
        let mut ctx = SimpleContext::new(1);
        core.single_process(&mut ctx);
        assert!(core.threads()[0].active);
        assert_eq!(core.waiting_threads(), 0);
    }

    #[test]
    fn max_executed_kills_the_organism() {
        let config = HardwareConfig {
            max_executed: 3,
            ..permissive(CpuVariant::Classic)
        };
        let mut core = core_with(config, &["inc", "inc", "inc"]);
        let mut ctx = SimpleContext::new(1);
        assert_eq!(core.run(&mut ctx, 10), 3);
        assert!(!core.is_alive());
        assert!(ctx.died);
        assert!(!core.single_process(&mut ctx));
    }

    #[test]
    fn io_outputs_then_reads_input() {
        let mut core = classic(&["IO"]);
        let mut ctx = SimpleContext::with_inputs(1, vec![5, 9]);
        core.single_process(&mut ctx);
        assert_eq!(ctx.outputs, vec![0]);
        assert_eq!(ctx.received, vec![5]);
        assert_eq!(core.register(REG_BX), 5);
        assert!(core.threads()[0].regs.get(REG_BX).from_env);
    }

    #[test]
    fn full_copy_mutation_rate_flags_the_copy() {
        let mut config = permissive(CpuVariant::Classic);
        config.mutation.copy_mut = 1.0;
        let mut core = core_with(config, &["h-copy", "nop-A", "nop-A", "nop-A"]);
        core.set_head(HeadId::Read, 1);
        core.set_head(HeadId::Write, 2);
        let mut ctx = SimpleContext::new(3);
        core.single_process(&mut ctx);
        assert_eq!(ctx.mutations.len(), 1);
        let flags = core.memory().flags(2);
        assert!(flags.contains(InstFlag::Copied));
        assert!(flags.contains(InstFlag::CopyMut));
        assert_eq!(core.head(HeadId::Write).position(), 3);
    }

    #[test]
    fn trace_sees_every_executed_instruction() {
        let mut core = classic(&["inc", "inc"]);
        let mut ctx = SimpleContext::new(1);
        let mut trace = JsonTrace::new(Vec::new());
        core.single_process_traced(&mut ctx, &mut trace, false);
        core.single_process_traced(&mut ctx, &mut trace, false);
        assert_eq!(trace.records(), 2);
        let text = String::from_utf8(trace.finish().expect("finish")).expect("utf8");
        assert!(text.lines().all(|line| line.contains("\"name\":\"inc\"")));
    }

    #[test]
    fn construction_rejects_bad_input() {
        let inst_set = InstSet::classic_heads().expect("inst set").shared();
        let err = HardwareCore::new(
            inst_set.clone(),
            HardwareConfig::classic(),
            &Genome::new(Vec::new()),
        )
        .err()
        .expect("empty genome");
        assert!(matches!(err, CoreError::InvalidGenome(_)));

        let err = HardwareCore::new(inst_set.clone(), HardwareConfig::experimental(), &Genome::from_ops(&[0]))
            .err()
            .expect("variant mismatch");
        assert!(matches!(err, CoreError::InvalidConfig(_)));

        let err = HardwareCore::new(inst_set, HardwareConfig::classic(), &Genome::from_ops(&[40]))
            .err()
            .expect("opcode outside set");
        assert!(matches!(err, CoreError::InvalidGenome(_)));
    }
}
