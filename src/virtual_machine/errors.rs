//! Build-time and run-time error types.
//!
//! [`AsmError`] and [`EmitError`] are user errors raised while producing
//! bytecode; they abort the current assembly unit but never the host.
//! [`VmError`] is fatal for the interpreter run that raised it.

use crate::virtual_machine::bytecode::Byteword;
use crate::virtual_machine::emitter::SymbolIndex;
use thiserror::Error;

/// Half-open byte range `[start, end)` into assembly source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-width span at `at`.
    pub const fn point(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Errors raised by the [`Emitter`](super::emitter::Emitter).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmitError {
    /// The symbol already has a location; it was not moved.
    #[error("symbol {symbol} is already defined at {location}")]
    DuplicateSymbol { symbol: SymbolIndex, location: usize },
    /// A reference to a symbol that never received a location.
    #[error("symbol {symbol} is referenced but never defined")]
    UndefinedSymbol { symbol: SymbolIndex },
    /// A symbol index that was never allocated by this emitter.
    #[error("symbol {symbol} was not allocated by this emitter")]
    UnknownSymbol { symbol: SymbolIndex },
}

/// Assembly diagnostics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("invalid instruction `{mnemonic}`")]
    InvalidInstruction { mnemonic: String, span: Span },
    #[error("invalid syscall `{mnemonic}`")]
    InvalidSyscall { mnemonic: String, span: Span },
    #[error("invalid argument")]
    InvalidArgument { span: Span },
    #[error("missing argument")]
    MissingArgument { span: Span },
    #[error("invalid symbol")]
    InvalidSymbol { span: Span },
    #[error("duplicate symbol `{name}`")]
    DuplicateSymbol { name: String, span: Span },
    #[error("undefined symbol `{name}`")]
    UndefinedSymbol { name: String, span: Span },
    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },
}

impl AsmError {
    /// Source location of the diagnostic, if it has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            AsmError::InvalidInstruction { span, .. }
            | AsmError::InvalidSyscall { span, .. }
            | AsmError::InvalidArgument { span }
            | AsmError::MissingArgument { span }
            | AsmError::InvalidSymbol { span }
            | AsmError::DuplicateSymbol { span, .. }
            | AsmError::UndefinedSymbol { span, .. } => Some(*span),
            AsmError::Io { .. } => None,
        }
    }

    /// Stable numeric code printed with rendered diagnostics.
    pub const fn code(&self) -> u8 {
        match self {
            AsmError::InvalidInstruction { .. } => 1,
            AsmError::InvalidSyscall { .. } => 2,
            AsmError::InvalidArgument { .. } | AsmError::MissingArgument { .. } => 3,
            AsmError::InvalidSymbol { .. } => 4,
            AsmError::DuplicateSymbol { .. } => 5,
            AsmError::UndefinedSymbol { .. } => 6,
            AsmError::Io { .. } => 7,
        }
    }
}

/// Errors that stop an interpreter run (or a decode of finished bytecode).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    /// Unknown opcode tag in the instruction stream.
    #[error("invalid opcode {opcode:#06x} at {offset}")]
    InvalidOpcode { opcode: Byteword, offset: usize },
    /// Unknown syscall tag following a `sys` opcode.
    #[error("invalid syscall {syscall:#06x} at {offset}")]
    InvalidSyscall { syscall: Byteword, offset: usize },
    /// The stream ended in the middle of an instruction.
    #[error("unexpected end of bytecode at {ip}: need {requested} bytewords, {available} available")]
    UnexpectedEndOfBytecode {
        ip: usize,
        requested: usize,
        available: usize,
    },
    /// Execution reached the end of the stream without `sys exit`.
    #[error("ran off the end of the instruction stream at {ip}")]
    RanOffEnd { ip: usize },
    /// The instruction pointer left the instruction stream.
    #[error("invalid instruction pointer {ip} (stream length {len})")]
    InvalidIp { ip: u64, len: usize },
    /// A `loc` operand points into the middle of an instruction.
    #[error("jump target {target} is not an instruction boundary")]
    InvalidJumpTarget { target: usize },
    /// Register index outside the current frame's window.
    #[error("register %{index} is outside the current window of {window} registers")]
    RegisterOutOfWindow { index: u16, window: usize },
    /// `loa`/`sto` through an address outside the live register stack.
    #[error("invalid address {address} (live stack size {size})")]
    InvalidAddress { address: u64, size: usize },
    /// `cas` without a pending frame from `frm`.
    #[error("call at {ip} without a prepared frame")]
    CallWithoutFrame { ip: usize },
    /// `ret` in the outermost frame.
    #[error("return at {ip} without a matching call")]
    ReturnWithoutCall { ip: usize },
    /// `ret` copying more registers than the window holds.
    #[error("return value %{start}..%{end} exceeds the window of {window} registers")]
    ReturnOutOfWindow {
        start: usize,
        end: usize,
        window: usize,
    },
    /// The configured instruction budget ran out.
    #[error("step limit of {limit} instructions exceeded")]
    StepLimitExceeded { limit: u64 },
}
