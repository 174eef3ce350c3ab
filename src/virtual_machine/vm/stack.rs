use crate::virtual_machine::bytecode::Word;
use crate::virtual_machine::errors::VmError;
use crate::virtual_machine::isa::RegisterIndex;

/// Registers occupied by a frame capture: return ip, then caller fp.
pub(super) const CAPTURE_REGISTERS: usize = 2;

const INITIAL_CAPACITY: usize = 8;

/// Growable register stack.
///
/// `fp`, `sp` and `ap` are slot indices, so they stay valid when `data`
/// reallocates. The current window is `[fp, sp)`; slots from `sp` up are
/// scratch for frame setup and may hold stale values.
pub(super) struct RegisterStack {
    data: Vec<Word>,
    pub(super) fp: usize,
    pub(super) sp: usize,
    pub(super) ap: usize,
}

impl RegisterStack {
    pub(super) fn new() -> Self {
        Self {
            data: vec![Word::ZERO; INITIAL_CAPACITY],
            fp: 0,
            sp: 0,
            ap: 0,
        }
    }

    /// Makes room for `len` slots from the bottom of the stack.
    fn ensure(&mut self, len: usize) {
        let capacity = self.data.len();
        if capacity >= len {
            return;
        }
        let grown = capacity + capacity / 2;
        self.data.resize(grown.max(len), Word::ZERO);
    }

    /// Makes room for `additional` slots past `sp`.
    pub(super) fn reserve(&mut self, additional: usize) {
        self.ensure(self.sp + additional);
    }

    /// Number of registers in the current window.
    pub(super) fn window(&self) -> usize {
        self.sp.saturating_sub(self.fp)
    }

    fn slot_of(&self, reg: RegisterIndex) -> Result<usize, VmError> {
        let slot = self.fp + reg as usize;
        if slot < self.sp {
            Ok(slot)
        } else {
            Err(VmError::RegisterOutOfWindow {
                index: reg,
                window: self.window(),
            })
        }
    }

    pub(super) fn get(&self, reg: RegisterIndex) -> Result<Word, VmError> {
        Ok(self.data[self.slot_of(reg)?])
    }

    pub(super) fn set(&mut self, reg: RegisterIndex, value: Word) -> Result<(), VmError> {
        let slot = self.slot_of(reg)?;
        self.data[slot] = value;
        Ok(())
    }

    /// Slot index addressed by a pointer word; only live slots (below `sp`) are valid.
    fn address(&self, pointer: Word) -> Result<usize, VmError> {
        usize::try_from(pointer.as_uint())
            .ok()
            .filter(|&slot| slot < self.sp)
            .ok_or(VmError::InvalidAddress {
                address: pointer.as_uint(),
                size: self.sp,
            })
    }

    pub(super) fn load(&self, pointer: Word) -> Result<Word, VmError> {
        Ok(self.data[self.address(pointer)?])
    }

    pub(super) fn store(&mut self, pointer: Word, value: Word) -> Result<(), VmError> {
        let slot = self.address(pointer)?;
        self.data[slot] = value;
        Ok(())
    }

    /// Raw slot read; `slot` must be below `sp`.
    pub(super) fn slot(&self, slot: usize) -> Word {
        self.data[slot]
    }

    /// Writes `value` at `slot`, growing the stack if needed.
    pub(super) fn put(&mut self, slot: usize, value: Word) {
        self.ensure(slot + 1);
        self.data[slot] = value;
    }

    /// Extends the window by `count` zeroed registers.
    pub(super) fn extend_window(&mut self, count: usize) {
        self.reserve(count);
        let end = self.sp + count;
        self.data[self.sp..end].fill(Word::ZERO);
        self.sp = end;
    }

    /// Copies `len` window registers starting at `reg` down to slot `to`.
    pub(super) fn copy_down(&mut self, reg: usize, len: usize, to: usize) {
        let from = self.fp + reg;
        self.data.copy_within(from..from + len, to);
    }
}
