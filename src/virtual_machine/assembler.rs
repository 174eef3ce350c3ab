//! Assembly language parser.
//!
//! Converts mnemonic assembly text into [`Bytecode`] through an [`Emitter`].
//! Uses [`for_each_instruction!`](crate::for_each_instruction) and
//! [`for_each_syscall!`](crate::for_each_syscall) to generate the operand
//! parsers, so operand order and kinds always follow the ISA table.
//!
//! # Syntax
//!
//! ```text
//! :name                 label definition
//! mnemonic arg arg ...  instruction
//! sys mnemonic arg ...  syscall
//! ```
//!
//! - One statement per line; operands are separated by spaces or tabs
//! - Mnemonics are lowercase, at most eight letters
//! - Immediates are decimal integers, optionally signed (`42`, `-1`, `+7`)
//! - Registers are `%` followed by an index (`%0`, `%12`)
//! - Label references are `:` followed by a name (`:loop`)
//! - There is no comment syntax

use crate::error;
use crate::for_each_instruction;
use crate::for_each_syscall;
use crate::virtual_machine::bytecode::{Byteword, Bytecode, Word};
use crate::virtual_machine::emitter::{Emitter, SymbolIndex};
use crate::virtual_machine::errors::{AsmError, EmitError, Span};
use crate::virtual_machine::isa::{
    Instruction, Opcode, RegisterIndex, Syscall, SyscallInstruction,
};
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const LABEL_PREFIX: char = ':';
const REGISTER_PREFIX: char = '%';
const MAX_MNEMONIC_LEN: usize = 8;

/// Spaces, tabs and carriage returns; a newline ends the statement.
fn is_inline_space(byte: u8) -> bool {
    byte != b'\n' && byte.is_ascii_whitespace()
}

fn is_mnemonic(token: &str) -> bool {
    (1..=MAX_MNEMONIC_LEN).contains(&token.len()) && token.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Alphanumerics and `_`, not starting with a digit.
fn is_symbol_name(name: &str) -> bool {
    match name.as_bytes().first() {
        Some(first) if !first.is_ascii_digit() => name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_'),
        _ => false,
    }
}

/// Parses `[+-]?[0-9]+` into an `i64`, rejecting overflow.
fn parse_integer(token: &str) -> Option<i64> {
    let digits = token.strip_prefix(['+', '-']).unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

fn parse_byteword(token: &str) -> Option<Byteword> {
    parse_integer(token).and_then(|value| Byteword::try_from(value).ok())
}

/// Single-unit assembler state.
pub struct Assembler<'a> {
    text: &'a str,
    pos: usize,
    symbols: HashMap<&'a str, SymbolIndex>,
    /// Name and first occurrence of each symbol, by index.
    symbol_names: Vec<(&'a str, Span)>,
    emitter: Emitter,
}

impl<'a> Assembler<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            symbols: HashMap::new(),
            symbol_names: Vec::new(),
            emitter: Emitter::new(),
        }
    }

    /// Assembles the whole text, stopping at the first diagnostic.
    pub fn assemble(mut self) -> Result<Bytecode, AsmError> {
        loop {
            self.skip_inline_space();
            match self.peek() {
                None => break,
                Some(b'\n') => self.pos += 1,
                Some(b':') => {
                    self.label()?;
                    self.end_of_statement()?;
                }
                Some(_) => {
                    self.instruction()?;
                    self.end_of_statement()?;
                }
            }
        }
        self.finish()
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn skip_inline_space(&mut self) {
        while matches!(self.peek(), Some(b) if is_inline_space(b)) {
            self.pos += 1;
        }
    }

    /// Consumes the run of non-whitespace at the cursor.
    fn token(&mut self) -> (&'a str, Span) {
        let text = self.text;
        let start = self.pos;
        while matches!(self.peek(), Some(b) if !b.is_ascii_whitespace()) {
            self.pos += 1;
        }
        (&text[start..self.pos], Span::new(start, self.pos))
    }

    /// Next operand token on the current line.
    fn operand(&mut self) -> Result<(&'a str, Span), AsmError> {
        self.skip_inline_space();
        match self.peek() {
            None | Some(b'\n') => Err(AsmError::MissingArgument {
                span: Span::point(self.pos),
            }),
            Some(_) => Ok(self.token()),
        }
    }

    fn end_of_statement(&mut self) -> Result<(), AsmError> {
        self.skip_inline_space();
        match self.peek() {
            None | Some(b'\n') => Ok(()),
            Some(_) => Err(AsmError::InvalidArgument {
                span: self.token().1,
            }),
        }
    }

    /// Looks up `name`, allocating a symbol on first occurrence.
    fn symbol(&mut self, name: &'a str, span: Span) -> SymbolIndex {
        if let Some(&symbol) = self.symbols.get(name) {
            return symbol;
        }
        let symbol = self.emitter.new_symbol();
        self.symbols.insert(name, symbol);
        self.symbol_names.push((name, span));
        symbol
    }

    /// Strips the `:` prefix and validates the name.
    fn symbol_token(token: &'a str, span: Span) -> Result<&'a str, AsmError> {
        let name = token
            .strip_prefix(LABEL_PREFIX)
            .ok_or(AsmError::InvalidArgument { span })?;
        if !is_symbol_name(name) {
            return Err(AsmError::InvalidSymbol { span });
        }
        Ok(name)
    }

    fn label(&mut self) -> Result<(), AsmError> {
        let (token, span) = self.token();
        let name = Self::symbol_token(token, span)?;
        let symbol = self.symbol(name, span);
        self.emitter
            .define_symbol(symbol)
            .map_err(|_| AsmError::DuplicateSymbol {
                name: name.to_string(),
                span,
            })
    }

    fn instruction(&mut self) -> Result<(), AsmError> {
        let (mnemonic, span) = self.token();
        let opcode = Some(mnemonic)
            .filter(|m| is_mnemonic(m))
            .and_then(Opcode::from_mnemonic)
            .ok_or_else(|| AsmError::InvalidInstruction {
                mnemonic: mnemonic.to_string(),
                span,
            })?;
        let instruction = self.parse_operands(opcode)?;
        self.emitter
            .emit(instruction)
            .map_err(|_| AsmError::InvalidSymbol { span })
    }

    fn parse_syscall(&mut self) -> Result<SyscallInstruction, AsmError> {
        let (mnemonic, span) = self.operand()?;
        let syscall = Some(mnemonic)
            .filter(|m| is_mnemonic(m))
            .and_then(Syscall::from_mnemonic)
            .ok_or_else(|| AsmError::InvalidSyscall {
                mnemonic: mnemonic.to_string(),
                span,
            })?;
        self.parse_syscall_operands(syscall)
    }

    fn parse_imb(&mut self) -> Result<Byteword, AsmError> {
        let (token, span) = self.operand()?;
        parse_byteword(token).ok_or(AsmError::InvalidArgument { span })
    }

    fn parse_imw(&mut self) -> Result<Word, AsmError> {
        let (token, span) = self.operand()?;
        parse_integer(token)
            .map(Word::from_int)
            .ok_or(AsmError::InvalidArgument { span })
    }

    fn parse_reg(&mut self) -> Result<RegisterIndex, AsmError> {
        let (token, span) = self.operand()?;
        token
            .strip_prefix(REGISTER_PREFIX)
            .and_then(parse_byteword)
            .ok_or(AsmError::InvalidArgument { span })
    }

    fn parse_loc(&mut self) -> Result<SymbolIndex, AsmError> {
        let (token, span) = self.operand()?;
        let name = Self::symbol_token(token, span)?;
        Ok(self.symbol(name, span))
    }

    fn finish(self) -> Result<Bytecode, AsmError> {
        let names = self.symbol_names;
        let end = Span::point(self.text.len());
        self.emitter.finish().map_err(|err| match err {
            EmitError::UndefinedSymbol { symbol } => match names.get(symbol.0) {
                Some(&(name, span)) => AsmError::UndefinedSymbol {
                    name: name.to_string(),
                    span,
                },
                None => AsmError::InvalidSymbol { span: end },
            },
            EmitError::DuplicateSymbol { .. } | EmitError::UnknownSymbol { .. } => {
                AsmError::InvalidSymbol { span: end }
            }
        })
    }
}

macro_rules! define_parse_instruction {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        impl<'a> Assembler<'a> {
            /// Parses the operands of `opcode` in table order.
            fn parse_operands(
                &mut self,
                opcode: Opcode,
            ) -> Result<Instruction<SymbolIndex>, AsmError> {
                match opcode {
                    Opcode::Sys => Ok(Instruction::Sys(self.parse_syscall()?)),
                    $(
                        Opcode::$name => {
                            $( let $field = define_parse_instruction!(@operand self, $kind); )*
                            Ok(Instruction::$name { $( $field ),* })
                        }
                    )*
                }
            }
        }
    };

    (@operand $asm:ident, Imb)  => { $asm.parse_imb()? };
    (@operand $asm:ident, Imw)  => { $asm.parse_imw()? };
    (@operand $asm:ident, Preg) => { $asm.parse_reg()? };
    (@operand $asm:ident, Reg)  => { $asm.parse_reg()? };
    (@operand $asm:ident, Loc)  => { $asm.parse_loc()? };
}

macro_rules! define_parse_syscall {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $code:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        impl<'a> Assembler<'a> {
            fn parse_syscall_operands(
                &mut self,
                syscall: Syscall,
            ) -> Result<SyscallInstruction, AsmError> {
                match syscall {
                    $(
                        Syscall::$name => {
                            $( let $field = define_parse_instruction!(@operand self, $kind); )*
                            Ok(SyscallInstruction::$name { $( $field ),* })
                        }
                    )*
                }
            }
        }
    };
}

for_each_instruction!(define_parse_instruction);
for_each_syscall!(define_parse_syscall);

/// Assembles source text into bytecode.
pub fn assemble(text: &str) -> Result<Bytecode, AsmError> {
    Assembler::new(text).assemble()
}

/// Reads and assembles a file, logging a rendered diagnostic on failure.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Bytecode, AsmError> {
    let path_ref = path.as_ref();
    let file = path_ref.display().to_string();
    let source = fs::read_to_string(path_ref).map_err(|e| AsmError::Io {
        path: file.clone(),
        reason: e.to_string(),
    })?;
    let result = assemble(&source);
    if let Err(err) = &result {
        error!("{}", render_diagnostic(&file, &source, err));
    }
    result
}

/// 1-based line and column (in characters) of a byte offset.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let prefix = source.get(..offset.min(source.len())).unwrap_or(source);
    let line_start = prefix.rfind('\n').map_or(0, |i| i + 1);
    let line = prefix.matches('\n').count() + 1;
    let col = prefix[line_start..].chars().count() + 1;
    (line, col)
}

/// Formats a compiler-style diagnostic for an assembly failure.
pub fn render_diagnostic(file: &str, source: &str, err: &AsmError) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error[E{:04}]: {err}", err.code());
    let Some(span) = err.span() else {
        return diag;
    };

    let (line, col) = line_col(source, span.start);
    let _ = writeln!(diag, " --> {file}:{line}:{col}");

    if let Some(raw_line) = source.lines().nth(line - 1) {
        let line_text = raw_line.trim_end_matches('\r');
        let gutter = line.to_string().len();
        let room = line_text.chars().count().saturating_sub(col - 1);
        let carets = "^".repeat(span.len().min(room).max(1));
        let _ = writeln!(diag, "{:gutter$} |", "");
        let _ = writeln!(diag, "{line} | {line_text}");
        let _ = writeln!(diag, "{:gutter$} | {}{carets}", "", " ".repeat(col - 1));
    }

    diag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::bytecode::Location;

    fn encode(program: &[Instruction<Location>]) -> Bytecode {
        let mut code = Bytecode::new();
        for instr in program {
            code.push(instr);
        }
        code
    }

    #[test]
    fn assemble_empty_source() {
        assert!(assemble("").unwrap().is_empty());
        assert!(assemble("  \n\t\n\n").unwrap().is_empty());
    }

    #[test]
    fn assemble_single_instruction() {
        let code = assemble("sca %0 -1").unwrap();
        assert_eq!(
            code,
            encode(&[Instruction::Sca {
                dst: 0,
                imm: Word::from_int(-1)
            }])
        );
    }

    #[test]
    fn assemble_every_operand_kind() {
        let source = "\
res 3
sca %2 +7
:top
  mov %1 %2
\tadu %0 %1 %2
jnz :top %0
sys dbg %0
sys exit %1
";
        let code = assemble(source).unwrap();
        assert_eq!(
            code,
            encode(&[
                Instruction::Res { count: 3 },
                Instruction::Sca {
                    dst: 2,
                    imm: Word::from_int(7)
                },
                Instruction::Mov { dst: 1, src: 2 },
                Instruction::Adu {
                    dst: 0,
                    op1: 1,
                    op2: 2
                },
                Instruction::Jnz { target: 8, test: 0 },
                Instruction::Sys(SyscallInstruction::Dbg { reg: 0 }),
                Instruction::Sys(SyscallInstruction::Exit { code: 1 }),
            ])
        );
    }

    #[test]
    fn crlf_line_endings() {
        assert_eq!(
            assemble("nop\r\nsys hi\r\n").unwrap(),
            encode(&[
                Instruction::Nop {},
                Instruction::Sys(SyscallInstruction::Hi {})
            ])
        );
    }

    #[test]
    fn forward_reference_relocates_to_definition() {
        let code = assemble("jmp :end\nnop\nnop\n:end\nsys bye").unwrap();
        // jmp occupies 8 bytewords, then two nops
        assert_eq!(
            Instruction::decode(&mut code.cursor()).unwrap(),
            Instruction::Jmp { target: 10 }
        );
    }

    #[test]
    fn label_at_end_of_stream() {
        let code = assemble("jmp :end\n:end\n").unwrap();
        assert_eq!(code.len(), 8);
        assert_eq!(
            Instruction::decode(&mut code.cursor()).unwrap(),
            Instruction::Jmp { target: 8 }
        );
    }

    #[test]
    fn duplicate_label_error() {
        let err = assemble(":dup\nnop\n:dup\n").unwrap_err();
        assert_eq!(
            err,
            AsmError::DuplicateSymbol {
                name: "dup".to_string(),
                span: Span::new(9, 13)
            }
        );
    }

    #[test]
    fn undefined_label_reports_first_reference() {
        let err = assemble("nop\ncas :missing\njmp :missing\n").unwrap_err();
        assert_eq!(
            err,
            AsmError::UndefinedSymbol {
                name: "missing".to_string(),
                span: Span::new(8, 16)
            }
        );
    }

    #[test]
    fn invalid_instruction() {
        assert_eq!(
            assemble("nop\nfoo %0").unwrap_err(),
            AsmError::InvalidInstruction {
                mnemonic: "foo".to_string(),
                span: Span::new(4, 7)
            }
        );
        assert!(matches!(
            assemble("NOP").unwrap_err(),
            AsmError::InvalidInstruction { .. }
        ));
        assert!(matches!(
            assemble("nopnopnop").unwrap_err(),
            AsmError::InvalidInstruction { .. }
        ));
        assert!(matches!(
            assemble("%0").unwrap_err(),
            AsmError::InvalidInstruction { .. }
        ));
    }

    #[test]
    fn invalid_syscall() {
        assert_eq!(
            assemble("sys launch").unwrap_err(),
            AsmError::InvalidSyscall {
                mnemonic: "launch".to_string(),
                span: Span::new(4, 10)
            }
        );
    }

    #[test]
    fn missing_argument_at_end_of_line() {
        assert_eq!(
            assemble("mov %0\n%1").unwrap_err(),
            AsmError::MissingArgument {
                span: Span::point(6)
            }
        );
        assert_eq!(
            assemble("sys").unwrap_err(),
            AsmError::MissingArgument {
                span: Span::point(3)
            }
        );
    }

    #[test]
    fn one_statement_per_line() {
        assert_eq!(
            assemble("nop nop").unwrap_err(),
            AsmError::InvalidArgument {
                span: Span::new(4, 7)
            }
        );
        assert_eq!(
            assemble(":a sys hi").unwrap_err(),
            AsmError::InvalidArgument {
                span: Span::new(3, 6)
            }
        );
        assert!(matches!(
            assemble("sys hi %0").unwrap_err(),
            AsmError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn operand_ranges() {
        assert!(assemble("res 65535").is_ok());
        assert!(matches!(
            assemble("res 65536").unwrap_err(),
            AsmError::InvalidArgument { .. }
        ));
        assert!(matches!(
            assemble("res -1").unwrap_err(),
            AsmError::InvalidArgument { .. }
        ));
        assert!(matches!(
            assemble("mov %-1 %0").unwrap_err(),
            AsmError::InvalidArgument { .. }
        ));
        assert!(matches!(
            assemble("mov 1 %0").unwrap_err(),
            AsmError::InvalidArgument { .. }
        ));
        assert!(assemble("sca %0 -9223372036854775808").is_ok());
        assert!(matches!(
            assemble("sca %0 9223372036854775808").unwrap_err(),
            AsmError::InvalidArgument { .. }
        ));
        assert!(matches!(
            assemble("sca %0 1_000").unwrap_err(),
            AsmError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn invalid_symbols() {
        assert_eq!(
            assemble(":1abc").unwrap_err(),
            AsmError::InvalidSymbol {
                span: Span::new(0, 5)
            }
        );
        assert!(matches!(
            assemble("jmp :").unwrap_err(),
            AsmError::InvalidSymbol { .. }
        ));
        assert!(matches!(
            assemble("jmp :a-b").unwrap_err(),
            AsmError::InvalidSymbol { .. }
        ));
        assert!(matches!(
            assemble("jmp top").unwrap_err(),
            AsmError::InvalidArgument { .. }
        ));
        assert!(assemble(":_a1\njmp :_a1").is_ok());
    }

    #[test]
    fn parse_integer_forms() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer("+42"), Some(42));
        assert_eq!(parse_integer("-42"), Some(-42));
        assert_eq!(parse_integer("-"), None);
        assert_eq!(parse_integer("4x"), None);
        assert_eq!(parse_integer(""), None);
    }

    #[test]
    fn line_col_counts_characters() {
        let source = "nop\nmov %0\n";
        assert_eq!(line_col(source, 0), (1, 1));
        assert_eq!(line_col(source, 4), (2, 1));
        assert_eq!(line_col(source, 10), (2, 7));
        assert_eq!(line_col(source, 999), (3, 1));
    }

    #[test]
    fn render_missing_argument() {
        let source = "nop\nmov %0\n";
        let err = assemble(source).unwrap_err();
        assert_eq!(
            render_diagnostic("prog.asm", source, &err),
            "error[E0003]: missing argument\n \
             --> prog.asm:2:7\n  \
             |\n\
             2 | mov %0\n  \
             |       ^\n"
        );
    }

    #[test]
    fn render_underlines_span() {
        let source = "sys dbg %0\nfrob %1\n";
        let err = assemble(source).unwrap_err();
        let diag = render_diagnostic("x.asm", source, &err);
        assert!(diag.starts_with("error[E0001]: invalid instruction `frob`\n"));
        assert!(diag.contains(" --> x.asm:2:1\n"));
        assert!(diag.ends_with("2 | frob %1\n  | ^^^^\n"));
    }

    #[test]
    fn render_without_span() {
        let err = AsmError::Io {
            path: "gone.asm".to_string(),
            reason: "not found".to_string(),
        };
        assert_eq!(
            render_diagnostic("gone.asm", "", &err),
            "error[E0007]: failed to read gone.asm: not found\n"
        );
    }

    #[test]
    fn assemble_file_reads_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"sys hi\nsys exit %0\n").unwrap();
        let code = assemble_file(file.path()).unwrap();
        assert_eq!(code, assemble("sys hi\nsys exit %0").unwrap());
    }

    #[test]
    fn assemble_file_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.asm");
        fs::write(&path, "jmp :nowhere\n").unwrap();
        assert!(matches!(
            assemble_file(&path).unwrap_err(),
            AsmError::UndefinedSymbol { .. }
        ));

        let missing = dir.path().join("missing.asm");
        assert!(matches!(
            assemble_file(&missing).unwrap_err(),
            AsmError::Io { .. }
        ));
    }
}
