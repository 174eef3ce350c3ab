//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) and
//! [`for_each_syscall!`](crate::for_each_syscall) macros hold the canonical
//! opcode and syscall tables and invoke a callback macro for code generation,
//! so that the decoder, encoder, assembler and renderer never restate the
//! operand layout of an instruction.
//!
//! This module generates:
//! - the [`Opcode`] and [`Syscall`] tag enums with `TryFrom<Byteword>`
//! - the [`Instruction`] and [`SyscallInstruction`] sum types, one variant per
//!   tag carrying exactly its operands
//! - encoding, decoding and mnemonic rendering for both
//!
//! # Bytecode Format
//!
//! The stream is a sequence of 16-bit bytewords:
//! - Opcode / syscall tag: 1 byteword
//! - `imb` (16-bit immediate): 1 byteword
//! - `reg` / `preg` (register index): 1 byteword
//! - `imw` (64-bit immediate) and `loc` (absolute byteword offset): 4 bytewords,
//!   little-endian, aligned to a 4-byteword boundary with zero padding

use crate::virtual_machine::bytecode::{Byteword, Bytecode, Cursor, Location};
use crate::virtual_machine::errors::VmError;
use std::fmt;

/// Register index relative to the current frame pointer.
pub type RegisterIndex = u16;

/// Tag of the `sys` opcode; its operands are a syscall tag and that syscall's operands.
pub const SYS_OPCODE: Byteword = 0x01;

/// Operand kinds named in the instruction tables.
///
/// Each kind is a marker type; [`OperandType`](operand::OperandType) maps it to
/// the field type it decodes to, with `loc` operands resolving to the
/// instruction's location type `L`.
pub mod operand {
    use super::RegisterIndex;
    use crate::virtual_machine::bytecode::{Byteword, Word};

    pub trait OperandType<L> {
        type Ty;
    }

    /// 16-bit immediate.
    pub struct Imb;
    /// 64-bit immediate.
    pub struct Imw;
    /// Register written by the instruction.
    pub struct Preg;
    /// Register read by the instruction.
    pub struct Reg;
    /// Absolute instruction location.
    pub struct Loc;

    impl<L> OperandType<L> for Imb {
        type Ty = Byteword;
    }
    impl<L> OperandType<L> for Imw {
        type Ty = Word;
    }
    impl<L> OperandType<L> for Preg {
        type Ty = RegisterIndex;
    }
    impl<L> OperandType<L> for Reg {
        type Ty = RegisterIndex;
    }
    impl<L> OperandType<L> for Loc {
        type Ty = L;
    }
}

/// Invokes a callback macro with the opcode table (`sys` excluded, see [`SYS_OPCODE`]).
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            /// `nop` ; no operation
            Nop = 0x00, "nop" => [],
            /// `frm argsz` ; reserve a frame capture plus `argsz` argument registers at `sp`
            Frm = 0x02, "frm" => [argsz: Imb],
            /// `arg src` ; copy `src` into the next argument slot
            Arg = 0x03, "arg" => [src: Reg],
            /// `cas func` ; call `func` with the prepared frame
            Cas = 0x04, "cas" => [func: Loc],
            /// `res count` ; extend the current window by `count` zeroed registers
            Res = 0x05, "res" => [count: Imb],
            /// `ret val len` ; return registers `val..val+len` to the caller
            Ret = 0x06, "ret" => [val: Preg, len: Imb],
            /// `sca dst imm` ; dst = imm
            Sca = 0x07, "sca" => [dst: Preg, imm: Imw],
            /// `loc dst target` ; dst = target location
            Loc = 0x08, "loc" => [dst: Preg, target: Loc],
            /// `loa dst src` ; dst = *src
            Loa = 0x09, "loa" => [dst: Preg, src: Reg],
            /// `sto dst src` ; *dst = src
            Sto = 0x0A, "sto" => [dst: Reg, src: Reg],
            /// `mov dst src` ; dst = src
            Mov = 0x0B, "mov" => [dst: Preg, src: Reg],
            /// `jmp target` ; ip = target
            Jmp = 0x0C, "jmp" => [target: Loc],
            /// `jnz target test` ; if test != 0 then ip = target
            Jnz = 0x0D, "jnz" => [target: Loc, test: Reg],
            /// `equ dst op1 op2` ; dst = (op1 == op2)
            Equ = 0x0E, "equ" => [dst: Preg, op1: Reg, op2: Reg],
            /// `neu dst op1 op2` ; dst = (op1 != op2)
            Neu = 0x0F, "neu" => [dst: Preg, op1: Reg, op2: Reg],
            /// `geu dst op1 op2` ; dst = (op1 >= op2), unsigned
            Geu = 0x10, "geu" => [dst: Preg, op1: Reg, op2: Reg],
            /// `gtu dst op1 op2` ; dst = (op1 > op2), unsigned
            Gtu = 0x11, "gtu" => [dst: Preg, op1: Reg, op2: Reg],
            /// `adu dst op1 op2` ; dst = op1 + op2, wrapping
            Adu = 0x12, "adu" => [dst: Preg, op1: Reg, op2: Reg],
        }
    };
}

/// Invokes a callback macro with the syscall table.
#[macro_export]
macro_rules! for_each_syscall {
    ($callback:ident) => {
        $callback! {
            /// `sys nop` ; no operation on the host
            Nop = 0x00, "nop" => [],
            /// `sys exit code` ; stop the program with exit code `code`
            Exit = 0x01, "exit" => [code: Reg],
            /// `sys hi` ; greet
            Hi = 0x02, "hi" => [],
            /// `sys bye` ; say goodbye
            Bye = 0x03, "bye" => [],
            /// `sys dbg reg` ; report the index and value of `reg`
            Dbg = 0x04, "dbg" => [reg: Preg],
        }
    };
}

macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        /// Opcode tags.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u16)]
        pub enum Opcode {
            /// `sys code ...` ; dispatch a syscall to the host
            Sys = SYS_OPCODE,
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<Byteword> for Opcode {
            type Error = VmError;

            fn try_from(value: Byteword) -> Result<Self, Self::Error> {
                match value {
                    SYS_OPCODE => Ok(Opcode::Sys),
                    $( $opcode => Ok(Opcode::$name), )*
                    _ => Err(VmError::InvalidOpcode {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Opcode {
            /// Every opcode, `sys` first.
            pub const ALL: &'static [Opcode] = &[Opcode::Sys, $( Opcode::$name ),*];

            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    Opcode::Sys => "sys",
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Looks up an opcode by mnemonic (case-sensitive).
            pub fn from_mnemonic(name: &str) -> Option<Opcode> {
                match name {
                    "sys" => Some(Opcode::Sys),
                    $( $mnemonic => Some(Opcode::$name), )*
                    _ => None,
                }
            }
        }

        /// A decoded instruction.
        ///
        /// `L` is the type of `loc` operands: [`SymbolIndex`](super::emitter::SymbolIndex)
        /// before relocation, [`Location`] once resolved.
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Instruction<L = Location> {
            /// `sys` with its syscall and operands.
            Sys(SyscallInstruction),
            $(
                $(#[$doc])*
                $name { $( $field: <operand::$kind as operand::OperandType<L>>::Ty ),* },
            )*
        }

        impl<L> Instruction<L> {
            pub const fn opcode(&self) -> Opcode {
                match self {
                    Instruction::Sys(_) => Opcode::Sys,
                    $( Instruction::$name { .. } => Opcode::$name, )*
                }
            }
        }

        impl<L: Copy> Instruction<L> {
            /// The `loc` operand, if the instruction has one.
            pub fn location(&self) -> Option<L> {
                match self {
                    Instruction::Sys(_) => None,
                    $(
                        Instruction::$name { $( $field ),* } => {
                            None $( .or(define_instructions!(@loc $kind, $field)) )*
                        }
                    )*
                }
            }

            /// Encodes the instruction; `write_loc` writes each `loc` operand.
            pub fn encode_with(&self, out: &mut Bytecode, mut write_loc: impl FnMut(&mut Bytecode, L)) {
                out.write_imb(self.opcode() as Byteword);
                match self {
                    Instruction::Sys(call) => call.encode(out),
                    $(
                        Instruction::$name { $( $field ),* } => {
                            $( define_instructions!(@write out, write_loc, $kind, $field); )*
                        }
                    )*
                }
            }
        }

        impl Instruction<Location> {
            /// Decodes one instruction at the cursor.
            pub fn decode(cursor: &mut Cursor<'_>) -> Result<Self, VmError> {
                let offset = cursor.position();
                let tag = cursor.read_imb()?;
                let opcode = Opcode::try_from(tag)
                    .map_err(|_| VmError::InvalidOpcode { opcode: tag, offset })?;
                match opcode {
                    Opcode::Sys => Ok(Instruction::Sys(SyscallInstruction::decode(cursor)?)),
                    $(
                        Opcode::$name => {
                            $( let $field = define_instructions!(@read cursor, $kind); )*
                            Ok(Instruction::$name { $( $field ),* })
                        }
                    )*
                }
            }
        }

        impl fmt::Display for Instruction<Location> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    Instruction::Sys(call) => write!(f, "sys {call}"),
                    $(
                        Instruction::$name { $( $field ),* } => {
                            f.write_str($mnemonic)?;
                            $( define_instructions!(@fmt f, $kind, $field); )*
                            Ok(())
                        }
                    )*
                }
            }
        }
    };

    // ---------- loc lookup ----------
    (@loc Loc, $v:ident) => { Some(*$v) };
    (@loc $kind:ident, $v:ident) => {{
        let _ = $v;
        None
    }};

    // ---------- encoding ----------
    (@write $out:ident, $loc:ident, Imb, $v:ident) => { $out.write_imb(*$v); };
    (@write $out:ident, $loc:ident, Imw, $v:ident) => { $out.write_imw(*$v); };
    (@write $out:ident, $loc:ident, Preg, $v:ident) => { $out.write_reg(*$v); };
    (@write $out:ident, $loc:ident, Reg, $v:ident) => { $out.write_reg(*$v); };
    (@write $out:ident, $loc:ident, Loc, $v:ident) => { $loc($out, *$v); };

    // ---------- decoding ----------
    (@read $c:ident, Imb)  => { $c.read_imb()? };
    (@read $c:ident, Imw)  => { $c.read_imw()? };
    (@read $c:ident, Preg) => { $c.read_reg()? };
    (@read $c:ident, Reg)  => { $c.read_reg()? };
    (@read $c:ident, Loc)  => { $c.read_loc()? };

    // ---------- rendering ----------
    (@fmt $f:ident, Imb, $v:ident)  => { write!($f, " {}", $v)?; };
    (@fmt $f:ident, Imw, $v:ident)  => { write!($f, " {}", $v.as_int())?; };
    (@fmt $f:ident, Preg, $v:ident) => { write!($f, " %{}", $v)?; };
    (@fmt $f:ident, Reg, $v:ident)  => { write!($f, " %{}", $v)?; };
    (@fmt $f:ident, Loc, $v:ident)  => { write!($f, " :s{}", $v)?; };
}

macro_rules! define_syscalls {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $code:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        /// Syscall tags.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u16)]
        pub enum Syscall {
            $(
                $(#[$doc])*
                $name = $code,
            )*
        }

        impl TryFrom<Byteword> for Syscall {
            type Error = VmError;

            fn try_from(value: Byteword) -> Result<Self, Self::Error> {
                match value {
                    $( $code => Ok(Syscall::$name), )*
                    _ => Err(VmError::InvalidSyscall {
                        syscall: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Syscall {
            pub const ALL: &'static [Syscall] = &[$( Syscall::$name ),*];

            /// Returns the assembly mnemonic (the word after `sys`).
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Syscall::$name => $mnemonic, )*
                }
            }

            /// Looks up a syscall by mnemonic (case-sensitive).
            pub fn from_mnemonic(name: &str) -> Option<Syscall> {
                match name {
                    $( $mnemonic => Some(Syscall::$name), )*
                    _ => None,
                }
            }
        }

        /// A decoded syscall with its operands.
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum SyscallInstruction {
            $(
                $(#[$doc])*
                $name { $( $field: define_syscalls!(@ty $kind) ),* },
            )*
        }

        impl SyscallInstruction {
            pub const fn syscall(&self) -> Syscall {
                match self {
                    $( SyscallInstruction::$name { .. } => Syscall::$name, )*
                }
            }

            /// Writes the syscall tag and operands (the `sys` tag is written by the caller).
            pub fn encode(&self, out: &mut Bytecode) {
                out.write_imb(self.syscall() as Byteword);
                match self {
                    $(
                        SyscallInstruction::$name { $( $field ),* } => {
                            $( define_syscalls!(@write out, $kind, $field); )*
                        }
                    )*
                }
            }

            /// Decodes the syscall following a `sys` tag.
            pub fn decode(cursor: &mut Cursor<'_>) -> Result<Self, VmError> {
                let offset = cursor.position();
                let tag = cursor.read_imb()?;
                let syscall = Syscall::try_from(tag)
                    .map_err(|_| VmError::InvalidSyscall { syscall: tag, offset })?;
                match syscall {
                    $(
                        Syscall::$name => {
                            $( let $field = define_syscalls!(@read cursor, $kind); )*
                            Ok(SyscallInstruction::$name { $( $field ),* })
                        }
                    )*
                }
            }
        }

        impl fmt::Display for SyscallInstruction {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(
                        SyscallInstruction::$name { $( $field ),* } => {
                            f.write_str($mnemonic)?;
                            $( write!(f, " %{}", $field)?; )*
                            Ok(())
                        }
                    )*
                }
            }
        }
    };

    // Syscall operands are registers only.
    (@ty Preg) => { RegisterIndex };
    (@ty Reg)  => { RegisterIndex };

    (@write $out:ident, Preg, $v:ident) => { $out.write_reg(*$v); };
    (@write $out:ident, Reg, $v:ident)  => { $out.write_reg(*$v); };

    (@read $c:ident, Preg) => { $c.read_reg()? };
    (@read $c:ident, Reg)  => { $c.read_reg()? };
}

for_each_instruction!(define_instructions);
for_each_syscall!(define_syscalls);
