//! Bytecode emitter with a relocating symbol table.
//!
//! Instructions are appended with their `loc` operands still expressed as
//! [`SymbolIndex`]es. Each such operand is written as the raw symbol index
//! and its position is recorded; [`Emitter::finish`] reads every recorded
//! operand back, looks the index up and patches in the resolved location.

use crate::virtual_machine::bytecode::{Bytecode, Cursor, Location, Word};
use crate::virtual_machine::errors::EmitError;
use crate::virtual_machine::isa::Instruction;
use std::fmt;

/// Dense identifier of a label, allocated by [`Emitter::new_symbol`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolIndex(pub usize);

impl fmt::Display for SymbolIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct Emitter {
    bytecode: Bytecode,
    /// Location of each symbol, `None` until defined.
    symbol_locations: Vec<Option<Location>>,
    /// Positions of `loc` operands still holding a symbol index.
    reference_locations: Vec<Location>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current write position in the instruction stream.
    pub fn position(&self) -> Location {
        self.bytecode.len()
    }

    /// Allocates a symbol with no location yet.
    pub fn new_symbol(&mut self) -> SymbolIndex {
        self.symbol_locations.push(None);
        SymbolIndex(self.symbol_locations.len() - 1)
    }

    /// Binds `symbol` to the current write position.
    ///
    /// A symbol that already has a location keeps it and the call fails.
    pub fn define_symbol(&mut self, symbol: SymbolIndex) -> Result<(), EmitError> {
        let position = self.position();
        let slot = self
            .symbol_locations
            .get_mut(symbol.0)
            .ok_or(EmitError::UnknownSymbol { symbol })?;
        if let Some(location) = *slot {
            return Err(EmitError::DuplicateSymbol { symbol, location });
        }
        *slot = Some(position);
        Ok(())
    }

    pub fn symbol_location(&self, symbol: SymbolIndex) -> Option<Location> {
        self.symbol_locations.get(symbol.0).copied().flatten()
    }

    /// Appends an instruction, deferring its `loc` operand to [`finish`](Self::finish).
    pub fn emit(&mut self, instruction: Instruction<SymbolIndex>) -> Result<(), EmitError> {
        if let Some(symbol) = instruction.location()
            && symbol.0 >= self.symbol_locations.len()
        {
            return Err(EmitError::UnknownSymbol { symbol });
        }
        let references = &mut self.reference_locations;
        instruction.encode_with(&mut self.bytecode, |out, symbol| {
            let at = out.write_imw(Word::from_uint(symbol.0 as u64));
            references.push(at);
        });
        Ok(())
    }

    /// Patches every recorded reference and returns the finished bytecode.
    pub fn finish(mut self) -> Result<Bytecode, EmitError> {
        for &at in &self.reference_locations {
            let index = Cursor::at(&self.bytecode.instructions, at)
                .read_imw()
                .map(|word| word.as_uint() as usize)
                .unwrap_or(usize::MAX);
            let symbol = SymbolIndex(index);
            let location = match self.symbol_locations.get(index) {
                Some(Some(location)) => *location,
                Some(None) => return Err(EmitError::UndefinedSymbol { symbol }),
                None => return Err(EmitError::UnknownSymbol { symbol }),
            };
            self.bytecode
                .patch_word(at, Word::from_uint(location as u64));
        }
        Ok(self.bytecode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::isa::SyscallInstruction;

    fn exit0() -> Instruction<SymbolIndex> {
        Instruction::Sys(SyscallInstruction::Exit { code: 0 })
    }

    #[test]
    fn backward_reference_resolves() {
        let mut emitter = Emitter::new();
        let top = emitter.new_symbol();
        emitter.define_symbol(top).unwrap();
        emitter.emit(Instruction::Nop {}).unwrap();
        emitter.emit(Instruction::Jmp { target: top }).unwrap();
        let code = emitter.finish().unwrap();

        let mut cursor = code.cursor();
        assert_eq!(Instruction::decode(&mut cursor).unwrap(), Instruction::Nop {});
        assert_eq!(
            Instruction::decode(&mut cursor).unwrap(),
            Instruction::Jmp { target: 0 }
        );
    }

    #[test]
    fn forward_reference_is_patched() {
        let mut emitter = Emitter::new();
        let skip = emitter.new_symbol();
        let other = emitter.new_symbol();
        emitter.define_symbol(other).unwrap();
        emitter.emit(Instruction::Jmp { target: skip }).unwrap();
        emitter.emit(Instruction::Nop {}).unwrap();
        let here = emitter.position();
        emitter.define_symbol(skip).unwrap();
        emitter.emit(exit0()).unwrap();
        let code = emitter.finish().unwrap();

        // jmp: tag, 3 padding, 4-byteword location
        assert_eq!(here, 9);
        let mut cursor = code.cursor();
        assert_eq!(
            Instruction::decode(&mut cursor).unwrap(),
            Instruction::Jmp { target: here }
        );
    }

    #[test]
    fn duplicate_definition_keeps_first_location() {
        let mut emitter = Emitter::new();
        let label = emitter.new_symbol();
        emitter.define_symbol(label).unwrap();
        emitter.emit(Instruction::Nop {}).unwrap();
        assert_eq!(
            emitter.define_symbol(label),
            Err(EmitError::DuplicateSymbol {
                symbol: label,
                location: 0
            })
        );
        assert_eq!(emitter.symbol_location(label), Some(0));
    }

    #[test]
    fn undefined_reference_fails_finish() {
        let mut emitter = Emitter::new();
        let nowhere = emitter.new_symbol();
        emitter.emit(Instruction::Cas { func: nowhere }).unwrap();
        assert_eq!(
            emitter.finish(),
            Err(EmitError::UndefinedSymbol { symbol: nowhere })
        );
    }

    #[test]
    fn unreferenced_undefined_symbol_is_fine() {
        let mut emitter = Emitter::new();
        emitter.new_symbol();
        emitter.emit(exit0()).unwrap();
        assert!(emitter.finish().is_ok());
    }

    #[test]
    fn symbol_at_end_of_stream() {
        let mut emitter = Emitter::new();
        let end = emitter.new_symbol();
        emitter.emit(Instruction::Jmp { target: end }).unwrap();
        emitter.define_symbol(end).unwrap();
        let code = emitter.finish().unwrap();
        assert_eq!(
            Instruction::decode(&mut code.cursor()).unwrap(),
            Instruction::Jmp { target: code.len() }
        );
    }

    #[test]
    fn foreign_symbols_are_rejected() {
        let mut emitter = Emitter::new();
        let stranger = SymbolIndex(3);
        assert_eq!(
            emitter.define_symbol(stranger),
            Err(EmitError::UnknownSymbol { symbol: stranger })
        );
        assert_eq!(
            emitter.emit(Instruction::Jmp { target: stranger }),
            Err(EmitError::UnknownSymbol { symbol: stranger })
        );
    }
}
