//! Code generation and the bytecode format.

pub mod compile;
pub mod disasm;
pub mod emit;
pub mod ir;
pub mod label;
pub mod op;
pub mod scope;

pub use compile::Compiler;
pub use disasm::disassemble;
pub use ir::Program;
pub use op::Opcode;
