//! Register-window bytecode toolchain.
//!
//! Programs are written as mnemonic assembly, assembled through a relocating
//! emitter into a flat byteword stream, and executed by an interpreter that
//! hands syscalls to a host-supplied [`system::System`].
//!
//! # Architecture
//!
//! - **Bytewords**: the instruction stream is a sequence of 16-bit units;
//!   64-bit words are stored across four bytewords at aligned offsets
//! - **Registers**: 64-bit words on a growable stack, addressed relative to
//!   the current frame pointer
//! - **Calls**: `frm`/`arg`/`cas` set up a callee window, `ret` copies the
//!   return value back over the frame capture
//! - **Termination**: only `sys exit` ends a run; running off the end of the
//!   stream is an error
//!
//! # Modules
//!
//! - [`isa`]: Instruction and syscall tables, encoding and decoding
//! - [`bytecode`]: Byteword stream, word codec and read cursor
//! - [`emitter`]: Symbol table and relocation
//! - [`assembler`]: Assembly parsing and diagnostics
//! - [`disassembler`]: Bytecode rendering with synthesized labels
//! - [`system`]: Syscall host trait and the bundled hosts
//! - [`vm`]: The interpreter
//! - [`errors`]: Assembly, emit and run-time error types

pub mod assembler;
pub mod bytecode;
pub mod disassembler;
pub mod emitter;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod system;
pub mod vm;
