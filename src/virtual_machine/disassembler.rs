//! Bytecode to assembly text.
//!
//! Label names are not stored in bytecode, so every jump or call target is
//! printed as a synthesized `:s<offset>` label. The output assembles back to
//! the same instruction stream.

use crate::virtual_machine::bytecode::{Bytecode, Location};
use crate::virtual_machine::errors::VmError;
use crate::virtual_machine::isa::Instruction;
use std::fmt::Write;

const INDENT: &str = "    ";

/// Collects instruction boundaries and `loc` targets in one decode pass.
fn scan(code: &Bytecode) -> Result<(Vec<Location>, Vec<Location>), VmError> {
    let mut boundaries = Vec::new();
    let mut targets = Vec::new();
    let mut cursor = code.cursor();
    while !cursor.is_at_end() {
        boundaries.push(cursor.position());
        if let Some(target) = Instruction::decode(&mut cursor)?.location() {
            targets.push(target);
        }
    }
    targets.sort_unstable();
    targets.dedup();
    Ok((boundaries, targets))
}

/// Renders `code` as assembly text, one statement per line.
pub fn disassemble(code: &Bytecode) -> Result<String, VmError> {
    let (boundaries, targets) = scan(code)?;
    if let Some(&target) = targets
        .iter()
        .find(|&&t| t != code.len() && boundaries.binary_search(&t).is_err())
    {
        return Err(VmError::InvalidJumpTarget { target });
    }

    let mut out = String::new();
    let mut cursor = code.cursor();
    let mut pending = targets.iter().peekable();
    loop {
        let position = cursor.position();
        if pending.next_if_eq(&&position).is_some() {
            let _ = writeln!(out, ":s{position}");
        }
        if cursor.is_at_end() {
            break;
        }
        let instruction = Instruction::decode(&mut cursor)?;
        let _ = writeln!(out, "{INDENT}{instruction}");
    }
    Ok(out)
}
