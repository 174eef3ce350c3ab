//! Host side of the `sys` instruction.

use crate::virtual_machine::bytecode::Word;
use std::io::{self, Write};

/// Capability answering syscalls on behalf of the interpreter.
///
/// One method per syscall tag. `exit` is informational: the interpreter stops
/// after calling it regardless of what the host does.
pub trait System {
    fn nop(&mut self);
    fn exit(&mut self, code: i64);
    fn hi(&mut self);
    fn bye(&mut self);
    /// `index` is the frame-relative register index, `value` its content.
    fn dbg(&mut self, index: usize, value: Word);
}

/// Writes one line per syscall to `out`.
pub struct ConsoleSystem<W: Write> {
    out: W,
}

impl ConsoleSystem<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> ConsoleSystem<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> System for ConsoleSystem<W> {
    fn nop(&mut self) {}

    fn exit(&mut self, code: i64) {
        let _ = writeln!(
            self.out,
            "[sys exit] program finished with exit code {code} ({code:#x})"
        );
    }

    fn hi(&mut self) {
        let _ = writeln!(self.out, "[sys hi]   Cough says hi!");
    }

    fn bye(&mut self) {
        let _ = writeln!(self.out, "[sys bye]  Cough says bye!");
    }

    fn dbg(&mut self, index: usize, value: Word) {
        let _ = writeln!(
            self.out,
            "[sys dbg]  {index}: {} ({:#x})",
            value.as_uint(),
            value.as_uint()
        );
    }
}

/// One observed syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallRecord {
    Nop,
    Exit { code: i64 },
    Hi,
    Bye,
    Dbg { index: usize, value: Word },
}

/// Test double keeping every call in order.
#[derive(Debug, Default)]
pub struct RecordingSystem {
    pub calls: Vec<SyscallRecord>,
}

impl RecordingSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl System for RecordingSystem {
    fn nop(&mut self) {
        self.calls.push(SyscallRecord::Nop);
    }

    fn exit(&mut self, code: i64) {
        self.calls.push(SyscallRecord::Exit { code });
    }

    fn hi(&mut self) {
        self.calls.push(SyscallRecord::Hi);
    }

    fn bye(&mut self) {
        self.calls.push(SyscallRecord::Bye);
    }

    fn dbg(&mut self, index: usize, value: Word) {
        self.calls.push(SyscallRecord::Dbg { index, value });
    }
}
