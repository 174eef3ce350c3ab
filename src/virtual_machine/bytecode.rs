//! Byteword stream primitives.
//!
//! Bytecode is a flat sequence of 16-bit [`Byteword`]s. Wide values
//! ([`Word`]s, including `loc` operands) occupy four bytewords in
//! little-endian order and always start at a byteword index that is a
//! multiple of [`WORD_BYTEWORDS`]. Writers pad with zero bytewords up to that
//! boundary; readers skip the padding.

use crate::virtual_machine::errors::VmError;
use crate::virtual_machine::isa::{Instruction, RegisterIndex};
use std::fmt;

/// Smallest addressable unit of bytecode.
pub type Byteword = u16;

/// Absolute byteword offset into the instruction stream.
pub type Location = usize;

/// Number of bytewords in one [`Word`].
pub const WORD_BYTEWORDS: usize = 4;

/// Rounds `pos` up to the next word boundary.
pub const fn align_to_word(pos: usize) -> usize {
    pos.next_multiple_of(WORD_BYTEWORDS)
}

/// 64-bit register and immediate value.
///
/// The same bits read as unsigned, two's-complement signed or IEEE-754
/// double depending on the consumer.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Word(u64);

impl Word {
    pub const ZERO: Word = Word(0);

    pub const fn from_uint(value: u64) -> Self {
        Word(value)
    }

    pub const fn from_int(value: i64) -> Self {
        Word(value as u64)
    }

    pub const fn from_float(value: f64) -> Self {
        Word(value.to_bits())
    }

    pub const fn from_bool(value: bool) -> Self {
        Word(value as u64)
    }

    pub const fn as_uint(self) -> u64 {
        self.0
    }

    pub const fn as_int(self) -> i64 {
        self.0 as i64
    }

    pub const fn as_float(self) -> f64 {
        f64::from_bits(self.0)
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Little-endian byteword split.
    pub const fn to_bytewords(self) -> [Byteword; WORD_BYTEWORDS] {
        [
            self.0 as Byteword,
            (self.0 >> 16) as Byteword,
            (self.0 >> 32) as Byteword,
            (self.0 >> 48) as Byteword,
        ]
    }

    pub const fn from_bytewords(parts: [Byteword; WORD_BYTEWORDS]) -> Self {
        Word(
            parts[0] as u64
                | (parts[1] as u64) << 16
                | (parts[2] as u64) << 32
                | (parts[3] as u64) << 48,
        )
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word({:#x})", self.0)
    }
}

impl From<u64> for Word {
    fn from(value: u64) -> Self {
        Word::from_uint(value)
    }
}

impl From<i64> for Word {
    fn from(value: i64) -> Self {
        Word::from_int(value)
    }
}

/// Assembled program: the instruction stream plus a read-only data section.
///
/// Nothing emits into `rodata` yet; it is carried so that loaders keep the
/// two sections apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bytecode {
    pub instructions: Vec<Byteword>,
    pub rodata: Vec<Byteword>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of the instruction stream in bytewords.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn write_imb(&mut self, value: Byteword) {
        self.instructions.push(value);
    }

    pub fn write_reg(&mut self, index: RegisterIndex) {
        self.instructions.push(index);
    }

    /// Pads to the next word boundary, writes `value` and returns where it starts.
    pub fn write_imw(&mut self, value: Word) -> Location {
        let at = align_to_word(self.instructions.len());
        self.instructions.resize(at, 0);
        self.instructions.extend_from_slice(&value.to_bytewords());
        at
    }

    pub fn write_loc(&mut self, location: Location) -> Location {
        self.write_imw(Word::from_uint(location as u64))
    }

    /// Overwrites the word starting at `at`, which a previous write returned.
    pub(crate) fn patch_word(&mut self, at: Location, value: Word) {
        self.instructions[at..at + WORD_BYTEWORDS].copy_from_slice(&value.to_bytewords());
    }

    /// Appends a fully resolved instruction.
    pub fn push(&mut self, instruction: &Instruction<Location>) {
        instruction.encode_with(self, |out, location| {
            out.write_loc(location);
        });
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(&self.instructions)
    }
}

/// Read position over a byteword stream.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    code: &'a [Byteword],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(code: &'a [Byteword]) -> Self {
        Self { code, pos: 0 }
    }

    pub fn at(code: &'a [Byteword], pos: usize) -> Self {
        Self { code, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.code.len()
    }

    fn take(&mut self, start: usize, count: usize) -> Result<&'a [Byteword], VmError> {
        let code = self.code;
        let slice = start
            .checked_add(count)
            .and_then(|end| code.get(start..end))
            .ok_or(VmError::UnexpectedEndOfBytecode {
                ip: self.pos,
                requested: count,
                available: code.len().saturating_sub(start),
            })?;
        self.pos = start + count;
        Ok(slice)
    }

    pub fn read_imb(&mut self) -> Result<Byteword, VmError> {
        Ok(self.take(self.pos, 1)?[0])
    }

    pub fn read_reg(&mut self) -> Result<RegisterIndex, VmError> {
        self.read_imb()
    }

    /// Skips padding to the next word boundary and reads a word.
    pub fn read_imw(&mut self) -> Result<Word, VmError> {
        let parts = self.take(align_to_word(self.pos), WORD_BYTEWORDS)?;
        Ok(Word::from_bytewords([parts[0], parts[1], parts[2], parts[3]]))
    }

    pub fn read_loc(&mut self) -> Result<Location, VmError> {
        let word = self.read_imw()?;
        Location::try_from(word.as_uint()).map_err(|_| VmError::InvalidIp {
            ip: word.as_uint(),
            len: self.code.len(),
        })
    }
}
