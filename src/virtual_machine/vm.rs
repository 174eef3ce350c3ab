//! Register-window interpreter.
//!
//! Each call frame addresses a window of the register stack starting at the
//! frame pointer. A call is set up in three steps:
//!
//! 1. `frm n` writes a frame capture `{return ip, caller fp}` at `sp` and
//!    points `ap` just past it
//! 2. `arg r` copies arguments to `ap`, one per instruction
//! 3. `cas f` jumps to `f` with the new window spanning exactly the arguments
//!
//! `ret v n` copies `n` registers from `%v` over the capture, restores the
//! caller and leaves the copied registers at the top of the caller's window.
//! Execution ends only at `sys exit`.

mod stack;

use crate::debug;
use crate::virtual_machine::bytecode::{Bytecode, Cursor, Location, Word};
use crate::virtual_machine::errors::VmError;
use crate::virtual_machine::isa::{Instruction, RegisterIndex, SyscallInstruction};
use crate::virtual_machine::system::System;
use stack::{CAPTURE_REGISTERS, RegisterStack};
use std::ops::ControlFlow;

/// Runs `bytecode` to completion and returns the exit code passed to `sys exit`.
pub fn run(bytecode: &Bytecode, system: &mut dyn System) -> Result<i64, VmError> {
    Vm::new(bytecode).run(system)
}

/// Bytecode interpreter bound to one program.
pub struct Vm<'a> {
    code: &'a Bytecode,
    /// Instruction pointer (byteword offset of the next instruction).
    ip: Location,
    registers: RegisterStack,
    /// Capture slot written by the last `frm`, consumed by `cas`.
    pending_frame: Option<usize>,
    /// Number of active calls.
    depth: usize,
    steps: u64,
    step_limit: Option<u64>,
}

impl<'a> Vm<'a> {
    pub fn new(code: &'a Bytecode) -> Self {
        Self {
            code,
            ip: 0,
            registers: RegisterStack::new(),
            pending_frame: None,
            depth: 0,
            steps: 0,
            step_limit: None,
        }
    }

    /// Stops the run with [`VmError::StepLimitExceeded`] after `limit` instructions.
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = Some(limit);
        self
    }

    /// Number of instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn ip(&self) -> Location {
        self.ip
    }

    /// Executes until `sys exit` or an error.
    pub fn run(&mut self, system: &mut dyn System) -> Result<i64, VmError> {
        debug!("vm: running {} bytewords", self.code.len());
        loop {
            if let Some(limit) = self.step_limit
                && self.steps >= limit
            {
                return Err(VmError::StepLimitExceeded { limit });
            }

            let code = self.code;
            let offset = self.ip;
            if offset == code.len() {
                return Err(VmError::RanOffEnd { ip: offset });
            }
            if offset > code.len() {
                return Err(VmError::InvalidIp {
                    ip: offset as u64,
                    len: code.len(),
                });
            }

            let mut cursor = Cursor::at(&code.instructions, offset);
            let instruction = Instruction::decode(&mut cursor)?;
            self.ip = cursor.position();
            self.steps += 1;

            if let ControlFlow::Break(exit_code) = self.exec(offset, instruction, system)? {
                debug!("vm: exit code {exit_code} after {} steps", self.steps);
                return Ok(exit_code);
            }
        }
    }

    /// Executes one decoded instruction that started at `offset`.
    fn exec(
        &mut self,
        offset: Location,
        instruction: Instruction,
        system: &mut dyn System,
    ) -> Result<ControlFlow<i64>, VmError> {
        match instruction {
            Instruction::Nop {} => {}
            Instruction::Sys(call) => return self.op_sys(call, system),
            // Calls
            Instruction::Frm { argsz } => self.op_frm(argsz),
            Instruction::Arg { src } => self.op_arg(src)?,
            Instruction::Cas { func } => self.op_cas(offset, func)?,
            Instruction::Res { count } => self.op_res(count),
            Instruction::Ret { val, len } => self.op_ret(offset, val, len)?,
            // Registers and memory
            Instruction::Sca { dst, imm } => self.registers.set(dst, imm)?,
            Instruction::Loc { dst, target } => self.op_loc(dst, target)?,
            Instruction::Loa { dst, src } => self.op_loa(dst, src)?,
            Instruction::Sto { dst, src } => self.op_sto(dst, src)?,
            Instruction::Mov { dst, src } => self.op_mov(dst, src)?,
            // Control flow
            Instruction::Jmp { target } => self.ip = target,
            Instruction::Jnz { target, test } => self.op_jnz(target, test)?,
            // Comparison and arithmetic
            Instruction::Equ { dst, op1, op2 } => {
                self.op_binary(dst, op1, op2, |a, b| (a == b) as u64)?
            }
            Instruction::Neu { dst, op1, op2 } => {
                self.op_binary(dst, op1, op2, |a, b| (a != b) as u64)?
            }
            Instruction::Geu { dst, op1, op2 } => {
                self.op_binary(dst, op1, op2, |a, b| (a >= b) as u64)?
            }
            Instruction::Gtu { dst, op1, op2 } => {
                self.op_binary(dst, op1, op2, |a, b| (a > b) as u64)?
            }
            Instruction::Adu { dst, op1, op2 } => {
                self.op_binary(dst, op1, op2, u64::wrapping_add)?
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn op_sys(
        &mut self,
        call: SyscallInstruction,
        system: &mut dyn System,
    ) -> Result<ControlFlow<i64>, VmError> {
        match call {
            SyscallInstruction::Nop {} => system.nop(),
            SyscallInstruction::Exit { code } => {
                let exit_code = self.registers.get(code)?.as_int();
                system.exit(exit_code);
                return Ok(ControlFlow::Break(exit_code));
            }
            SyscallInstruction::Hi {} => system.hi(),
            SyscallInstruction::Bye {} => system.bye(),
            SyscallInstruction::Dbg { reg } => {
                let value = self.registers.get(reg)?;
                system.dbg(reg as usize, value);
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn op_frm(&mut self, argsz: u16) {
        let stack = &mut self.registers;
        stack.reserve(CAPTURE_REGISTERS + argsz as usize);
        let (capture, caller_fp) = (stack.sp, stack.fp);
        stack.put(capture, Word::from_uint(self.ip as u64));
        stack.put(capture + 1, Word::from_uint(caller_fp as u64));
        stack.ap = capture + CAPTURE_REGISTERS;
        self.pending_frame = Some(capture);
    }

    fn op_arg(&mut self, src: RegisterIndex) -> Result<(), VmError> {
        let value = self.registers.get(src)?;
        let stack = &mut self.registers;
        let slot = stack.ap;
        stack.put(slot, value);
        stack.ap = slot + 1;
        Ok(())
    }

    fn op_cas(&mut self, offset: Location, func: Location) -> Result<(), VmError> {
        let capture = self
            .pending_frame
            .take()
            .ok_or(VmError::CallWithoutFrame { ip: offset })?;
        let stack = &mut self.registers;
        stack.put(capture, Word::from_uint(self.ip as u64));
        stack.fp = capture + CAPTURE_REGISTERS;
        stack.sp = stack.ap.max(stack.fp);
        stack.ap = stack.sp;
        self.depth += 1;
        self.ip = func;
        Ok(())
    }

    fn op_res(&mut self, count: u16) {
        self.registers.extend_window(count as usize);
    }

    fn op_ret(&mut self, offset: Location, val: RegisterIndex, len: u16) -> Result<(), VmError> {
        if self.depth == 0 {
            return Err(VmError::ReturnWithoutCall { ip: offset });
        }
        let stack = &mut self.registers;
        let (start, len) = (val as usize, len as usize);
        let window = stack.window();
        if start + len > window {
            return Err(VmError::ReturnOutOfWindow {
                start,
                end: start + len,
                window,
            });
        }

        let capture = stack.fp - CAPTURE_REGISTERS;
        let return_ip = stack.slot(capture).as_uint();
        let caller_fp = stack.slot(capture + 1).as_uint();
        let caller_fp = usize::try_from(caller_fp)
            .ok()
            .filter(|&fp| fp <= capture)
            .ok_or(VmError::InvalidAddress {
                address: caller_fp,
                size: capture,
            })?;
        let return_ip = usize::try_from(return_ip).map_err(|_| VmError::InvalidIp {
            ip: return_ip,
            len: self.code.len(),
        })?;

        stack.copy_down(start, len, capture);
        stack.fp = caller_fp;
        stack.sp = capture + len;
        stack.ap = stack.sp;
        // a frame prepared by the callee but never called dies with it
        self.pending_frame = None;
        self.depth -= 1;
        self.ip = return_ip;
        Ok(())
    }

    fn op_loc(&mut self, dst: RegisterIndex, target: Location) -> Result<(), VmError> {
        self.registers.set(dst, Word::from_uint(target as u64))
    }

    fn op_loa(&mut self, dst: RegisterIndex, src: RegisterIndex) -> Result<(), VmError> {
        let pointer = self.registers.get(src)?;
        let value = self.registers.load(pointer)?;
        self.registers.set(dst, value)
    }

    fn op_sto(&mut self, dst: RegisterIndex, src: RegisterIndex) -> Result<(), VmError> {
        let pointer = self.registers.get(dst)?;
        let value = self.registers.get(src)?;
        self.registers.store(pointer, value)
    }

    fn op_mov(&mut self, dst: RegisterIndex, src: RegisterIndex) -> Result<(), VmError> {
        let value = self.registers.get(src)?;
        self.registers.set(dst, value)
    }

    fn op_jnz(&mut self, target: Location, test: RegisterIndex) -> Result<(), VmError> {
        if !self.registers.get(test)?.is_zero() {
            self.ip = target;
        }
        Ok(())
    }

    /// Unsigned two-operand instruction writing `f(op1, op2)` to `dst`.
    fn op_binary(
        &mut self,
        dst: RegisterIndex,
        op1: RegisterIndex,
        op2: RegisterIndex,
        f: impl FnOnce(u64, u64) -> u64,
    ) -> Result<(), VmError> {
        let a = self.registers.get(op1)?.as_uint();
        let b = self.registers.get(op2)?.as_uint();
        self.registers.set(dst, Word::from_uint(f(a, b)))
    }
}
