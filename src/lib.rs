//! Cough bytecode toolchain.
//!
//! Provides the instruction set, a relocating assembler, a disassembler and a
//! register-window interpreter.

pub mod utils;
pub mod virtual_machine;
