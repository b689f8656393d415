use crate::lang::node::BinaryOp;

// =============================================================================
// OPCODE - one-byte instruction tags
// =============================================================================

/// Instruction tag. Each opcode is followed in the code buffer by the
/// fixed-width operands listed in [`Opcode::operands`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // pushes
    /// Push a function entry address. Operand: u32 address.
    PushFunc = 0x01,
    /// Push a native function reference. Operand: u32 table index.
    PushNative = 0x02,
    /// Push an integer constant. Operand: i64.
    PushInt = 0x03,
    /// Copy the slot `n` below the top onto the top. Operand: u32 `n`.
    Peek = 0x04,

    // stack ops
    /// Overwrite the slot `n` below the top with the top, leaving the top
    /// in place. Operand: u32 `n`.
    Store = 0x05,
    Pop = 0x06,

    // arithmetic
    Add = 0x10,
    Sub = 0x11,
    Mul = 0x12,
    Div = 0x13,
    Mod = 0x14,

    // comparison, each pushes 0 or 1
    Greater = 0x20,
    Less = 0x21,
    GreaterEq = 0x22,
    LessEq = 0x23,
    Eq = 0x24,

    // ==========================================================================
    // Control flow
    // ==========================================================================
    /// Pop the callee and invoke it.
    Call = 0x30,
    /// Operands: u32 frame depth, u32 argument count.
    Ret = 0x31,
    /// Unconditional jump. Operand: u32 absolute address.
    Jump = 0x32,
    /// Pop an integer, jump if it is zero. Operand: u32 absolute address.
    JumpFalse = 0x33,
    Halt = 0x3f,
}

/// Kind of a fixed-width operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// u32 absolute code address.
    Addr,
    /// u32 index into the native table.
    Native,
    /// i64 constant.
    Int,
    /// u32 slot offset or count.
    Count,
}

impl Operand {
    pub const fn width(self) -> usize {
        match self {
            Operand::Addr | Operand::Native | Operand::Count => 4,
            Operand::Int => 8,
        }
    }
}

impl Opcode {
    pub const ALL: [Opcode; 21] = [
        Opcode::PushFunc,
        Opcode::PushNative,
        Opcode::PushInt,
        Opcode::Peek,
        Opcode::Store,
        Opcode::Pop,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Greater,
        Opcode::Less,
        Opcode::GreaterEq,
        Opcode::LessEq,
        Opcode::Eq,
        Opcode::Call,
        Opcode::Ret,
        Opcode::Jump,
        Opcode::JumpFalse,
        Opcode::Halt,
    ];

    pub fn from_byte(byte: u8) -> Option<Opcode> {
        use Opcode::*;
        Some(match byte {
            0x01 => PushFunc,
            0x02 => PushNative,
            0x03 => PushInt,
            0x04 => Peek,
            0x05 => Store,
            0x06 => Pop,
            0x10 => Add,
            0x11 => Sub,
            0x12 => Mul,
            0x13 => Div,
            0x14 => Mod,
            0x20 => Greater,
            0x21 => Less,
            0x22 => GreaterEq,
            0x23 => LessEq,
            0x24 => Eq,
            0x30 => Call,
            0x31 => Ret,
            0x32 => Jump,
            0x33 => JumpFalse,
            0x3f => Halt,
            _ => return None,
        })
    }

    /// Operands that follow the opcode byte, in encoding order.
    pub fn operands(self) -> &'static [Operand] {
        use Opcode::*;
        match self {
            PushFunc | Jump | JumpFalse => &[Operand::Addr],
            PushNative => &[Operand::Native],
            PushInt => &[Operand::Int],
            Peek | Store => &[Operand::Count],
            Ret => &[Operand::Count, Operand::Count],
            Pop | Add | Sub | Mul | Div | Mod | Greater | Less | GreaterEq | LessEq | Eq
            | Call | Halt => &[],
        }
    }

    /// Encoded size of the whole instruction in bytes.
    pub fn size(self) -> usize {
        1 + self.operands().iter().map(|o| o.width()).sum::<usize>()
    }

    /// Returns `(pops, pushes)` as seen by the caller's frame.
    ///
    /// `Call` is counted as consuming the callee and producing the result;
    /// the argument slots it releases depend on the call site and are
    /// accounted for by the code generator. `Ret` leaves the frame, so only
    /// the returned value is counted.
    pub fn stack_effect(self) -> (u32, u32) {
        use Opcode::*;
        match self {
            PushFunc | PushNative | PushInt | Peek => (0, 1),
            Store => (1, 1),
            Pop => (1, 0),
            Add | Sub | Mul | Div | Mod => (2, 1),
            Greater | Less | GreaterEq | LessEq | Eq => (2, 1),
            Call => (1, 1),
            Ret => (1, 0),
            Jump => (0, 0),
            JumpFalse => (1, 0),
            Halt => (0, 0),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            PushFunc => "PUSH_FUNC",
            PushNative => "PUSH_NATIVE",
            PushInt => "PUSH_INT",
            Peek => "PEEK",
            Store => "STORE",
            Pop => "POP",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Mod => "MOD",
            Greater => "GREATER",
            Less => "LESS",
            GreaterEq => "GREATER_EQ",
            LessEq => "LESS_EQ",
            Eq => "EQ",
            Call => "CALL",
            Ret => "RET",
            Jump => "JUMP",
            JumpFalse => "JUMP_FALSE",
            Halt => "HALT",
        }
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jump | Opcode::JumpFalse)
    }
}

impl From<BinaryOp> for Opcode {
    fn from(op: BinaryOp) -> Self {
        match op {
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Mul => Opcode::Mul,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Mod => Opcode::Mod,
            BinaryOp::Greater => Opcode::Greater,
            BinaryOp::Less => Opcode::Less,
            BinaryOp::GreaterEq => Opcode::GreaterEq,
            BinaryOp::LessEq => Opcode::LessEq,
            BinaryOp::Eq => Opcode::Eq,
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
