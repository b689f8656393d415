use tracing::trace;

use crate::bytecode::label::{Label, LabelTable, to_address};
use crate::bytecode::{Opcode, Program};
use crate::invariant::{Violation, fatal};
use crate::runtime::native::NativeId;

/// Append-only code buffer that tracks the compile-time stack depth.
///
/// The depth is the number of slots the code emitted so far leaves above the
/// current frame base. Every instruction adjusts it through
/// [`Opcode::stack_effect`]; call sites release their arguments through
/// [`Emitter::call`].
#[derive(Debug, Default)]
pub struct Emitter {
    code: Vec<u8>,
    depth: u32,
    labels: LabelTable,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Current write offset.
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub fn make_label(&mut self) -> Label {
        self.labels.make()
    }

    pub fn place_label(&mut self, label: Label) {
        let address = self.labels.place(label, &mut self.code);
        trace!(%label, address, depth = self.depth, "label placed");
    }

    /// Abort unless the depth model currently reads `expected`.
    pub fn expect_depth(&self, context: &'static str, expected: u32) {
        if self.depth != expected {
            fatal(Violation::DepthMismatch {
                context,
                expected,
                found: self.depth,
            });
        }
    }

    // =========================================================================
    // Instructions
    // =========================================================================

    pub fn push_func(&mut self, entry: Label) {
        self.op(Opcode::PushFunc);
        self.labels.reference(entry, &mut self.code);
    }

    pub fn push_native(&mut self, native: NativeId) {
        self.op(Opcode::PushNative);
        self.u32(native.index());
    }

    pub fn int(&mut self, n: i64) {
        self.op(Opcode::PushInt);
        self.code.extend_from_slice(&n.to_le_bytes());
    }

    pub fn peek(&mut self, offset: u32) {
        self.op(Opcode::Peek);
        self.u32(offset);
    }

    pub fn store(&mut self, offset: u32) {
        self.op(Opcode::Store);
        self.u32(offset);
    }

    pub fn pop(&mut self) {
        self.op(Opcode::Pop);
    }

    /// Arithmetic or comparison instruction.
    pub fn binary(&mut self, op: Opcode) {
        debug_assert_eq!(op.stack_effect(), (2, 1), "{op} is not a binary operator");
        self.op(op);
    }

    /// Call the value on top; `nargs` argument slots below it are released
    /// by the callee when it returns.
    pub fn call(&mut self, nargs: u32) {
        self.op(Opcode::Call);
        self.release(nargs, "call arguments");
    }

    /// Return the value on top from a function taking `nargs` arguments.
    ///
    /// The encoded depth is taken after the result is popped: the slots
    /// between the frame base and the result.
    pub fn ret(&mut self, nargs: u32) {
        self.op(Opcode::Ret);
        self.u32(self.depth);
        self.u32(nargs);
    }

    pub fn jump(&mut self, target: Label) {
        self.op(Opcode::Jump);
        self.labels.reference(target, &mut self.code);
    }

    /// Pop the condition and branch to `target` if it is zero.
    pub fn jump_false(&mut self, target: Label) {
        self.op(Opcode::JumpFalse);
        self.labels.reference(target, &mut self.code);
    }

    pub fn halt(&mut self) {
        self.op(Opcode::Halt);
    }

    /// Seal the buffer. Every referenced label must have been placed.
    pub fn finish(self) -> Program {
        self.labels.check_resolved();
        to_address(self.code.len());
        Program::new(self.code)
    }

    fn op(&mut self, op: Opcode) {
        let (pops, pushes) = op.stack_effect();
        self.release(pops, op.mnemonic());
        self.depth += pushes;
        self.code.push(op as u8);
    }

    fn release(&mut self, slots: u32, context: &'static str) {
        self.depth = self
            .depth
            .checked_sub(slots)
            .unwrap_or_else(|| fatal(Violation::DepthUnderflow(context)));
    }

    fn u32(&mut self, n: u32) {
        self.code.extend_from_slice(&n.to_le_bytes());
    }
}
