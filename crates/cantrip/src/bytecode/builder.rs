//! Builder for emitting opcodes during compilation.

use super::{code::Program, op::Opcode};
use crate::{tokenize::SourcePosition, value::Value};

/// Accumulates opcodes, constants, and source positions into a [`Program`].
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    ops: Vec<Opcode>,
    constants: Vec<Value>,
    positions: Vec<SourcePosition>,
    /// Last position recorded via `SetSource`, to suppress duplicates.
    current_position: Option<SourcePosition>,
}

impl ProgramBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, op: Opcode) {
        self.ops.push(op);
    }

    /// Adds a constant to the pool, returning its slot.
    ///
    /// # Panics
    /// Panics when the pool exceeds `u16` slots; real programs stay far
    /// below that.
    pub fn add_constant(&mut self, value: Value) -> u16 {
        let index = u16::try_from(self.constants.len()).expect("constant pool exceeds u16 slots");
        self.constants.push(value);
        index
    }

    /// Emits a `PushConstant` for `value`.
    pub fn emit_push_constant(&mut self, value: Value) {
        let k = self.add_constant(value);
        self.emit(Opcode::PushConstant(k));
    }

    /// Emits a `PushLiteral` for the given text.
    pub fn emit_push_literal(&mut self, text: &str) {
        let k = self.add_constant(Value::string(text));
        self.emit(Opcode::PushLiteral(k));
    }

    /// Records `position` as current, emitting `SetSource` only on change.
    pub fn set_position(&mut self, position: SourcePosition) {
        if self.current_position == Some(position) {
            return;
        }
        self.current_position = Some(position);
        let index = u16::try_from(self.positions.len()).expect("position table exceeds u16 slots");
        self.positions.push(position);
        self.emit(Opcode::SetSource(index));
    }

    #[must_use]
    pub fn build(self) -> Program {
        Program {
            ops: self.ops,
            constants: self.constants,
            positions: self.positions,
        }
    }
}
