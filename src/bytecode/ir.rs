use crate::bytecode::Opcode;
use crate::bytecode::op::Operand;
use crate::invariant::{Violation, fatal};

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the opcode byte.
    pub at: usize,
    pub op: Opcode,
    /// Operand values in encoding order, widened to i64.
    pub operands: Vec<i64>,
}

/// A compiled bytecode program.
///
/// Convention: execution starts at offset 0 with the top-level statements,
/// which end in `HALT`; function bodies follow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    code: Vec<u8>,
}

impl Program {
    pub fn new(code: Vec<u8>) -> Self {
        Self { code }
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Decode the opcode at `pc` and advance past it.
    pub fn read_opcode(&self, pc: &mut usize) -> Opcode {
        let at = *pc;
        let [byte] = self.read_bytes::<1>(pc);
        Opcode::from_byte(byte).unwrap_or_else(|| fatal(Violation::UnknownOpcode { byte, pc: at }))
    }

    pub fn read_u32(&self, pc: &mut usize) -> u32 {
        u32::from_le_bytes(self.read_bytes(pc))
    }

    pub fn read_i64(&self, pc: &mut usize) -> i64 {
        i64::from_le_bytes(self.read_bytes(pc))
    }

    /// Decode the whole buffer front to back.
    pub fn instructions(&self) -> Vec<Instruction> {
        let mut pc = 0;
        let mut out = Vec::new();
        while pc < self.code.len() {
            let at = pc;
            let op = self.read_opcode(&mut pc);
            let operands = op
                .operands()
                .iter()
                .map(|operand| match operand {
                    Operand::Int => self.read_i64(&mut pc),
                    Operand::Addr | Operand::Native | Operand::Count => {
                        i64::from(self.read_u32(&mut pc))
                    }
                })
                .collect();
            out.push(Instruction { at, op, operands });
        }
        out
    }

    fn read_bytes<const N: usize>(&self, pc: &mut usize) -> [u8; N] {
        let bytes = self
            .code
            .get(*pc..*pc + N)
            .and_then(|slice| <[u8; N]>::try_from(slice).ok())
            .unwrap_or_else(|| fatal(Violation::Truncated { pc: *pc, needed: N }));
        *pc += N;
        bytes
    }
}
