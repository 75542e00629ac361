//! Instruction handlers.
//!
//! Every handler returns whether it succeeded. A failed instruction still
//! costs its cycle and still moves the IP on.

use super::search::SeqStart;
use super::{cpu_debug, HardwareCore};
use crate::context::OrganismContext;
use crate::head::{Head, HeadId};
use crate::inst::Instruction;
use crate::inst_lib::{InstKind, SearchFrom};
use crate::label::Label;
use crate::memory::InstFlag;
use crate::mutation::{self, MutationEvent};
use crate::register::{DataValue, REG_AX, REG_BX, REG_CX, REG_DX};
use crate::thread::{WaitCondition, WaitState};

impl HardwareCore {
    pub(super) fn execute<C>(&mut self, kind: InstKind, ctx: &mut C) -> bool
    where
        C: OrganismContext + ?Sized,
    {
        match kind {
            InstKind::Nop => true,

            InstKind::IfZero => self.if_unary(|v| v == 0),
            InstKind::IfNotZero => self.if_unary(|v| v != 0),
            InstKind::IfGreaterZero => self.if_unary(|v| v > 0),
            InstKind::IfLessZero => self.if_unary(|v| v < 0),
            InstKind::IfBit1 => self.if_unary(|v| v & 1 == 1),
            InstKind::IfEqu => self.if_binary(|a, b| a == b),
            InstKind::IfNEqu => self.if_binary(|a, b| a != b),
            InstKind::IfGreater => self.if_binary(|a, b| a > b),
            InstKind::IfLess => self.if_binary(|a, b| a < b),
            InstKind::IfLabel | InstKind::IfCopiedLabel { complement: true } => {
                self.read_label();
                self.complement_label();
                let thread = self.thread();
                if thread.next_label != thread.read_label {
                    self.skip_next();
                }
                true
            }
            InstKind::IfCopiedLabel { complement: false } => {
                self.read_label();
                let thread = self.thread();
                if thread.next_label != thread.read_label {
                    self.skip_next();
                }
                true
            }
            InstKind::IfCopiedSeq { complement } => {
                self.read_label();
                if complement {
                    self.complement_label();
                }
                let thread = self.thread();
                if thread.next_label != thread.read_seq {
                    self.skip_next();
                }
                true
            }

            InstKind::JumpF => self.jump_to_label(ctx, 1),
            InstKind::JumpB => self.jump_to_label(ctx, -1),
            InstKind::Call => {
                let location = self.head_copy(HeadId::Ip).position();
                let value = DataValue::fresh(location, self.cycle_count, false);
                self.current_stack_mut().push(value);
                self.jump_to_label(ctx, 1)
            }
            InstKind::Return => {
                let target = self.current_stack_mut().pop();
                self.set_head(HeadId::Ip, target.value);
                true
            }
            InstKind::Goto => {
                self.read_label();
                self.goto_label();
                true
            }
            InstKind::GotoIfNEqu => self.goto_if(|a, b| a != b),
            InstKind::GotoIfLess => self.goto_if(|a, b| a < b),
            InstKind::Label => {
                self.read_label();
                true
            }
            InstKind::MoveHead => {
                let head = self.find_modified_head(HeadId::Ip);
                let target = if self.is_experimental() {
                    self.find_modified_head(HeadId::Flow)
                } else {
                    HeadId::Flow
                };
                self.move_head(head, target);
                true
            }
            InstKind::MoveHeadIfNEqu => self.move_head_if(|a, b| a != b),
            InstKind::MoveHeadIfLess => self.move_head_if(|a, b| a < b),
            InstKind::JumpHead => {
                let head = self.find_modified_head(HeadId::Ip);
                let experimental = self.is_experimental();
                let reg = if experimental {
                    self.find_modified_register(REG_CX)
                } else {
                    REG_CX
                };
                let offset = self.reg_value(reg);
                let len = self.memory.len();
                self.head_mut(head).jump(offset, len);
                if experimental && head == HeadId::Ip {
                    self.advance_ip = false;
                }
                true
            }
            InstKind::GetHead => {
                let head = self.find_modified_head(HeadId::Ip);
                let reg = if self.is_experimental() {
                    self.find_modified_register(REG_CX)
                } else {
                    REG_CX
                };
                let pos = self.head_copy(head).position();
                self.set_fresh(reg, pos, false);
                true
            }
            InstKind::SetFlow => {
                let reg = self.find_modified_register(REG_CX);
                let value = self.reg_value(reg);
                self.set_head(HeadId::Flow, value);
                true
            }
            InstKind::HeadSearch => {
                self.read_label();
                self.complement_label();
                let ip = self.head_copy(HeadId::Ip);
                let found = self.find_label(0).unwrap_or(ip);
                let label_len = self.thread().next_label.len() as i32;
                self.set_fresh(REG_BX, found.position() - ip.position(), false);
                self.set_fresh(REG_CX, label_len, false);
                self.place_flow_after(found);
                true
            }
            InstKind::SearchLabel { complement, from } => {
                self.search_sequence(complement, from, SeqStart::LabelInst);
                true
            }
            InstKind::SearchSeq { complement, from } => {
                self.search_sequence(complement, from, SeqStart::Nop);
                true
            }

            InstKind::Pop => {
                let reg = self.find_modified_register(REG_BX);
                let value = self.current_stack_mut().pop();
                self.set_derived(reg, value.value, &value);
                true
            }
            InstKind::Push => {
                let reg = self.find_modified_register(REG_BX);
                let value = self.reg(reg);
                self.current_stack_mut().push(value);
                true
            }
            InstKind::PushAll => {
                let start = self.find_modified_register(REG_BX);
                for i in 0..self.num_registers {
                    let value = self.reg((start + i) % self.num_registers);
                    self.current_stack_mut().push(value);
                }
                true
            }
            InstKind::PopAll => {
                let start = self.find_modified_register(REG_BX);
                for i in (0..self.num_registers).rev() {
                    let value = self.current_stack_mut().pop();
                    self.set_derived((start + i) % self.num_registers, value.value, &value);
                }
                true
            }
            InstKind::SwapStack => {
                let thread = self.cur();
                thread.cur_stack ^= 1;
                true
            }
            InstKind::SwapStackTop => {
                let local = self.cur().stack.pop();
                let global = self.global_stack.pop();
                self.cur().stack.push(global);
                self.global_stack.push(local);
                true
            }
            InstKind::Swap => {
                let op1 = self.find_modified_register(REG_BX);
                let op2 = self.second_operand(op1);
                let (a, b) = (self.reg(op1), self.reg(op2));
                self.write_register(op1, b);
                self.write_register(op2, a);
                true
            }
            InstKind::CopyReg => {
                let src = self.find_modified_register(REG_BX);
                let dst = self.second_operand(src);
                let value = self.reg(src);
                self.set_derived(dst, value.value, &value);
                true
            }

            InstKind::ShiftR => self.unary(|v| v >> 1),
            InstKind::ShiftL => self.unary(|v| v.wrapping_shl(1)),
            InstKind::Inc => self.unary(|v| v.wrapping_add(1)),
            InstKind::Dec => self.unary(|v| v.wrapping_sub(1)),
            InstKind::Neg => self.unary(i32::wrapping_neg),
            InstKind::Not => self.unary(|v| !v),
            InstKind::Mult100 => self.unary(|v| v.wrapping_mul(100)),
            InstKind::Zero => self.constant(0),
            InstKind::One => self.constant(1),
            InstKind::Rand => {
                let reg = self.find_modified_register(REG_BX);
                let sign = if ctx.random_index(2) == 0 { -1 } else { 1 };
                let magnitude = ctx.random_index(i32::MAX as usize) as i32;
                self.set_fresh(reg, magnitude * sign, false);
                true
            }
            InstKind::Add => self.binary(ctx, |a, b| Some(a.wrapping_add(b))),
            InstKind::Sub => self.binary(ctx, |a, b| Some(a.wrapping_sub(b))),
            InstKind::Mult => self.binary(ctx, |a, b| Some(a.wrapping_mul(b))),
            InstKind::Div => self.binary(ctx, i32::checked_div),
            InstKind::Mod => self.binary(ctx, i32::checked_rem),
            InstKind::Nand => self.binary(ctx, |a, b| Some(!(a & b))),
            InstKind::Nor => self.binary(ctx, |a, b| Some(!(a | b))),
            InstKind::And => self.binary(ctx, |a, b| Some(a & b)),
            InstKind::Or => self.binary(ctx, |a, b| Some(a | b)),
            InstKind::Xor => self.binary(ctx, |a, b| Some(a ^ b)),
            InstKind::Order => {
                let op1 = self.find_modified_register(REG_BX);
                let op2 = self.second_operand(op1);
                let (a, b) = (self.reg(op1), self.reg(op2));
                if a.value > b.value {
                    self.write_register(op1, b);
                    self.write_register(op2, a);
                }
                true
            }

            InstKind::SetNum => self.label_value(|label, nops| label.as_int(nops)),
            InstKind::ValGrey => self.label_value(|label, nops| label.as_int_grey_code(nops)),
            InstKind::ValDir => self.label_value(|label, nops| label.as_int_direct(nops)),
            InstKind::ValAddPoly => self.label_value(|label, _| label.as_int_additive_polynomial()),
            InstKind::ValFib => self.label_value(|label, _| label.as_int_fib()),
            InstKind::ValPolyCoef => {
                self.label_value(|label, _| label.as_int_polynomial_coefficient())
            }

            InstKind::Allocate => {
                let size = self.memory.len() as i32;
                let request = self.reg_value(REG_BX);
                if !self.allocate(ctx, request) {
                    return false;
                }
                self.set_fresh(REG_AX, size, false);
                true
            }
            InstKind::Divide => {
                let div_point = self.reg_value(REG_AX);
                self.divide(ctx, div_point, 0)
            }
            InstKind::CAlloc => {
                let size = self.memory.len() as i32;
                self.allocate(ctx, size)
            }
            InstKind::CDivide => {
                let half = (self.memory.len() / 2) as i32;
                self.divide(ctx, half, 0)
            }
            InstKind::HeadAlloc => self.head_alloc(ctx),
            InstKind::HeadDivide => self.head_divide(ctx),
            InstKind::HeadCopy => self.head_copy_inst(ctx),
            InstKind::HeadRead => self.head_read(ctx),
            InstKind::HeadWrite => self.head_write(ctx),
            InstKind::Copy => {
                let from = self.addressed(self.reg_value(REG_BX));
                let to = self.addressed(self.reg_value(REG_AX).wrapping_add(self.reg_value(REG_BX)));
                let original = self.memory.get(from);
                if ctx.chance(self.config.mutation.copy_mut) {
                    self.copy_mutate(ctx, to, original);
                } else {
                    self.memory.set(to, original);
                    self.memory.clear_flag(to, InstFlag::Mutated);
                    self.memory.clear_flag(to, InstFlag::CopyMut);
                }
                self.memory.set_flag(to, InstFlag::Copied);
                true
            }
            InstKind::ReadInst => {
                let dst = self.find_modified_register(REG_CX);
                let from = self.addressed(self.reg_value(REG_BX));
                let op = self.memory.get(from).op();
                self.set_fresh(dst, op as i32, false);
                true
            }
            InstKind::WriteInst => {
                let src = self.find_modified_register(REG_CX);
                let to = self.addressed(self.reg_value(REG_AX).wrapping_add(self.reg_value(REG_BX)));
                let op = self.reg_value(src).rem_euclid(self.inst_set.size() as i32);
                self.memory.set(to, Instruction::new(op as u8));
                self.memory.set_flag(to, InstFlag::Copied);
                true
            }
            InstKind::Compare => {
                let dst = self.find_modified_register(REG_CX);
                let from = self.addressed(self.reg_value(REG_BX));
                let to = self.addressed(self.reg_value(REG_AX).wrapping_add(self.reg_value(REG_BX)));
                let diff = self.memory.get(from).op() as i32 - self.memory.get(to).op() as i32;
                self.set_fresh(dst, diff, false);
                true
            }
            InstKind::IfNCpy => {
                let from = self.addressed(self.reg_value(REG_BX));
                let to = self.addressed(self.reg_value(REG_AX).wrapping_add(self.reg_value(REG_BX)));
                if self.memory.get(from) == self.memory.get(to) {
                    self.skip_next();
                }
                true
            }
            InstKind::Repro => self.repro(ctx),
            InstKind::Die => {
                self.die(ctx);
                true
            }

            InstKind::TaskIO => {
                let reg = self.find_modified_register(REG_BX);
                if !self.output(ctx, reg) {
                    return false;
                }
                self.input(ctx, reg);
                true
            }
            InstKind::TaskInput => {
                let reg = self.find_modified_register(REG_BX);
                self.input(ctx, reg);
                true
            }
            InstKind::TaskOutput => {
                let reg = self.find_modified_register(REG_BX);
                self.output(ctx, reg)
            }
            InstKind::Sense => {
                let reg = self.find_modified_register(REG_BX);
                let sensed = ctx.sense(self.reg_value(reg));
                self.set_fresh(reg, sensed, true);
                true
            }

            InstKind::ForkThread => {
                let len = self.memory.len();
                self.head_mut(HeadId::Ip).advance(len);
                if !self.fork_thread() {
                    self.fault(ctx, "thread fork failed");
                }
                true
            }
            InstKind::KillThread => {
                if self.kill_thread() {
                    self.advance_ip = false;
                } else {
                    self.fault(ctx, "cannot kill the last thread");
                }
                true
            }
            InstKind::ThreadCreate => {
                let head = self.find_modified_head(HeadId::Flow);
                let start = self.head_copy(head);
                if !self.create_thread(start) {
                    self.fault(ctx, "thread creation failed");
                    return false;
                }
                true
            }
            InstKind::ExitThread => {
                if !self.exit_thread() {
                    self.fault(ctx, "thread exit refused");
                    return false;
                }
                self.advance_ip = false;
                true
            }
            InstKind::ThreadId => {
                let reg = self.find_modified_register(REG_BX);
                let id = self.thread().id as i32;
                self.set_fresh(reg, id, false);
                true
            }
            InstKind::Wait(condition) => self.wait(condition),
        }
    }

    // ---- small helpers ----

    fn skip_next(&mut self) {
        let len = self.memory.len();
        self.head_mut(HeadId::Ip).advance(len);
    }

    fn complement_label(&mut self) {
        let nops = self.inst_set.num_nops();
        self.cur().next_label.rotate(1, nops);
    }

    fn addressed(&self, pos: i32) -> usize {
        Head::wrap(pos, self.memory.len()) as usize
    }

    fn if_unary(&mut self, holds: impl FnOnce(i32) -> bool) -> bool {
        let reg = self.find_modified_register(REG_BX);
        if !holds(self.reg_value(reg)) {
            self.skip_next();
        }
        true
    }

    fn if_binary(&mut self, holds: impl FnOnce(i32, i32) -> bool) -> bool {
        let op1 = self.find_modified_register(REG_BX);
        let op2 = self.second_operand(op1);
        if !holds(self.reg_value(op1), self.reg_value(op2)) {
            self.skip_next();
        }
        true
    }

    fn unary(&mut self, op: impl FnOnce(i32) -> i32) -> bool {
        let reg = self.find_modified_register(REG_BX);
        let src = self.reg(reg);
        self.set_derived(reg, op(src.value), &src);
        true
    }

    fn constant(&mut self, value: i32) -> bool {
        let reg = self.find_modified_register(REG_BX);
        self.set_fresh(reg, value, false);
        true
    }

    /// `(dst, op1, op2)`. Classic hardware always computes from BX and CX.
    fn binary_operands(&mut self) -> (usize, usize, usize) {
        let dst = self.find_modified_register(REG_BX);
        if self.is_experimental() {
            let op1 = self.find_modified_register(dst);
            let op2 = self.find_modified_next_register(op1);
            (dst, op1, op2)
        } else {
            (dst, REG_BX, REG_CX)
        }
    }

    fn binary<C>(&mut self, ctx: &mut C, op: impl FnOnce(i32, i32) -> Option<i32>) -> bool
    where
        C: OrganismContext + ?Sized,
    {
        let (dst, op1, op2) = self.binary_operands();
        let (a, b) = (self.reg(op1), self.reg(op2));
        match op(a.value, b.value) {
            Some(value) => {
                self.set_combined(dst, value, &a, &b);
                true
            }
            None => {
                self.fault(ctx, &format!("arithmetic fault on {} and {}", a.value, b.value));
                false
            }
        }
    }

    fn label_value(&mut self, encode: impl FnOnce(&Label, usize) -> i32) -> bool {
        self.read_label();
        let value = encode(&self.thread().next_label, self.inst_set.num_nops());
        self.set_fresh(REG_BX, value, false);
        true
    }

    // ---- flow ----

    /// Classic jump: an empty label jumps the active head by BX, otherwise
    /// the active head moves to the complement label.
    fn jump_to_label<C>(&mut self, ctx: &mut C, direction: i32) -> bool
    where
        C: OrganismContext + ?Sized,
    {
        self.read_label();
        self.complement_label();
        let active = self.thread().cur_head;
        if self.thread().next_label.is_empty() {
            let offset = self.reg_value(REG_BX);
            let len = self.memory.len();
            self.head_mut(active).jump(offset, len);
            return true;
        }
        match self.find_label(direction) {
            Some(found) => {
                *self.head_mut(active) = found;
                true
            }
            None => {
                self.fault(ctx, "jump label not found");
                false
            }
        }
    }

    fn goto_label(&mut self) {
        if let Some(found) = self.find_sequence(SearchFrom::Forward, SeqStart::LabelInst, true) {
            *self.head_mut(HeadId::Ip) = found;
        }
    }

    fn goto_if(&mut self, holds: impl FnOnce(i32, i32) -> bool) -> bool {
        let op1 = self.find_modified_register(REG_BX);
        let op2 = self.find_modified_next_register(op1);
        self.read_label();
        if holds(self.reg_value(op1), self.reg_value(op2)) {
            self.goto_label();
        }
        true
    }

    fn move_head(&mut self, head: HeadId, target: HeadId) {
        let target = self.head_copy(target);
        self.head_mut(head).set_to(&target);
        if head == HeadId::Ip {
            self.advance_ip = false;
        }
    }

    fn move_head_if(&mut self, holds: impl FnOnce(i32, i32) -> bool) -> bool {
        let op1 = self.find_modified_register(REG_BX);
        let op2 = self.find_modified_next_register(op1);
        let head = self.find_modified_head(HeadId::Ip);
        let target = self.find_modified_head(HeadId::Flow);
        if holds(self.reg_value(op1), self.reg_value(op2)) {
            self.move_head(head, target);
        }
        true
    }

    fn place_flow_after(&mut self, found: Head) {
        let len = self.memory.len();
        let flow = self.head_mut(HeadId::Flow);
        flow.set_to(&found);
        flow.advance(len);
    }

    fn search_sequence(&mut self, complement: bool, from: SearchFrom, start: SeqStart) {
        self.read_label();
        if complement {
            self.complement_label();
        }
        let ip = self.head_copy(HeadId::Ip);
        let found = self.find_sequence(from, start, true).unwrap_or(ip);
        self.place_flow_after(found);
    }

    // ---- replication ----

    fn head_alloc<C>(&mut self, ctx: &mut C) -> bool
    where
        C: OrganismContext + ?Sized,
    {
        let dst = if self.is_experimental() {
            self.find_modified_register(REG_AX)
        } else {
            REG_AX
        };
        let size = self.memory.len() as i64;
        let wanted = (self.config.offspring_size_range * size as f64) as i64;
        let room = self.config.max_genome_len as i64 - size;
        let alloc = wanted.min(room).clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        if !self.allocate(ctx, alloc) {
            return false;
        }
        self.set_fresh(dst, size as i32, false);
        true
    }

    /// Offspring spans the read head up to the write head; a write head
    /// that wrapped to 0 means "up to the end of memory".
    fn head_divide<C>(&mut self, ctx: &mut C) -> bool
    where
        C: OrganismContext + ?Sized,
    {
        self.adjust_heads();
        let len = self.memory.len() as i32;
        let div_point = self.head_copy(HeadId::Read).position();
        let mut child_end = self.head_copy(HeadId::Write).position();
        if child_end == 0 {
            child_end = len;
        }
        let divided = self.divide(ctx, div_point, len - child_end);
        if self.alive && !self.memory.is_empty() {
            self.adjust_heads();
        }
        divided
    }

    /// Overwrite `pos` with a random instruction and flag it as a copy
    /// mutation.
    fn copy_mutate<C>(&mut self, ctx: &mut C, pos: usize, original: Instruction)
    where
        C: OrganismContext + ?Sized,
    {
        let replacement = self.inst_set.random_inst(ctx);
        self.memory.set(pos, replacement);
        self.memory.set_flag(pos, InstFlag::Mutated);
        self.memory.set_flag(pos, InstFlag::CopyMut);
        ctx.on_mutation(&MutationEvent::Point {
            pos,
            from: original.op(),
            to: replacement.op(),
        });
    }

    /// Insertion, deletion, uniform and slip mutations at the write site.
    fn copy_site_mutations<C>(&mut self, ctx: &mut C, write_pos: usize)
    where
        C: OrganismContext + ?Sized,
    {
        if ctx.chance(self.config.mutation.copy_ins) {
            let event = mutation::insert_at(&mut self.memory, write_pos, &self.inst_set, ctx);
            self.report_mutation(ctx, Some(event));
        }
        if ctx.chance(self.config.mutation.copy_del) {
            let event = mutation::delete_at(&mut self.memory, write_pos);
            self.report_mutation(ctx, event);
        }
        if ctx.chance(self.config.mutation.copy_uniform) && write_pos < self.memory.len() {
            let event = mutation::uniform_at(&mut self.memory, write_pos, &self.inst_set, ctx);
            self.report_mutation(ctx, event);
        }
        if ctx.chance(self.config.mutation.copy_slip) {
            if self.config.slip_read_head {
                let len = self.memory.len();
                let pos = ctx.random_index(len) as i32;
                self.head_mut(HeadId::Read).set(pos, len);
            } else {
                let event = mutation::slip_from(&mut self.memory, write_pos, ctx);
                self.report_mutation(ctx, event);
            }
        }
    }

    fn head_copy_inst<C>(&mut self, ctx: &mut C) -> bool
    where
        C: OrganismContext + ?Sized,
    {
        let len = self.memory.len();
        self.head_mut(HeadId::Read).adjust(len);
        self.head_mut(HeadId::Write).adjust(len);
        let read_pos = self.head_copy(HeadId::Read).index(len);
        let write_pos = self.head_copy(HeadId::Write).index(len);

        let inst = self.memory.get(read_pos);
        self.record_read(inst);
        if ctx.chance(self.config.mutation.copy_mut) {
            self.copy_mutate(ctx, write_pos, inst);
        } else {
            self.memory.set(write_pos, inst);
        }
        self.memory.set_flag(write_pos, InstFlag::Copied);
        self.copy_site_mutations(ctx, write_pos);

        let len = self.memory.len();
        self.head_mut(HeadId::Read).advance(len);
        self.head_mut(HeadId::Write).advance(len);
        true
    }

    fn head_read<C>(&mut self, ctx: &mut C) -> bool
    where
        C: OrganismContext + ?Sized,
    {
        let head = self.find_modified_head(HeadId::Read);
        let dst = if self.is_experimental() {
            self.find_modified_register(REG_AX)
        } else {
            REG_BX
        };
        let len = self.memory.len();
        self.head_mut(head).adjust(len);
        let pos = self.head_copy(head).index(len);
        let inst = if ctx.chance(self.config.mutation.copy_mut) {
            self.inst_set.random_inst(ctx)
        } else {
            self.memory.get(pos)
        };
        self.set_fresh(dst, inst.op() as i32, false);
        self.record_read(inst);
        self.head_mut(head).advance(len);
        true
    }

    fn head_write<C>(&mut self, ctx: &mut C) -> bool
    where
        C: OrganismContext + ?Sized,
    {
        let head = self.find_modified_head(HeadId::Write);
        let src = if self.is_experimental() {
            self.find_modified_register(REG_AX)
        } else {
            REG_BX
        };
        let len = self.memory.len();
        self.head_mut(head).adjust(len);
        let pos = self.head_copy(head).index(len);
        let value = self.reg_value(src);
        let op = if value < 0 || value as usize >= self.inst_set.size() {
            0
        } else {
            value as u8
        };
        self.memory.set(pos, Instruction::new(op));
        self.memory.set_flag(pos, InstFlag::Copied);
        self.copy_site_mutations(ctx, pos);
        let len = self.memory.len();
        self.head_mut(head).advance(len);
        true
    }

    // ---- environment ----

    fn input<C>(&mut self, ctx: &mut C, reg: usize)
    where
        C: OrganismContext + ?Sized,
    {
        let value = ctx.next_input();
        self.set_fresh(reg, value, true);
        ctx.do_input(value);
    }

    /// With `io_expire`, environment-derived values older than the last
    /// output may not be output again.
    fn output<C>(&mut self, ctx: &mut C, reg: usize) -> bool
    where
        C: OrganismContext + ?Sized,
    {
        let value = self.reg(reg);
        if self.is_experimental()
            && self.config.io_expire
            && value.env_component
            && value.oldest_component < self.last_output
        {
            self.fault(ctx, "output of expired value");
            return false;
        }
        ctx.do_output(value.value);
        self.last_output = self.cycle_count;
        true
    }

    // ---- threads ----

    /// Park the current thread until another thread's register satisfies
    /// the condition. Resolves immediately when one already does.
    fn wait(&mut self, condition: WaitCondition) -> bool {
        let value_reg = self.find_modified_register(REG_BX);
        let check_reg = self.find_modified_register(REG_DX);
        let dst = self.find_modified_register(value_reg);
        let target = self.reg_value(value_reg);

        let observed = self
            .threads
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != self.cur_thread)
            .map(|(_, thread)| *thread.regs.get(check_reg))
            .find(|value| condition.is_met(value.value, target));
        if let Some(value) = observed {
            self.set_derived(dst, value.value, &value);
            return true;
        }

        if self.waiting_threads + 1 >= self.threads.len() {
            return false;
        }
        let thread = self.cur();
        thread.active = false;
        thread.wait = Some(WaitState {
            condition,
            reg: check_reg,
            value: target,
            dst,
        });
        self.waiting_threads += 1;
        cpu_debug!(
            "thread {} waits for reg {check_reg} {:?} {target}",
            self.thread().id,
            condition
        );
        true
    }
}
