use std::collections::BTreeSet;

use crate::bytecode::ir::Instruction;
use crate::bytecode::{Opcode, Program};
use crate::runtime::native::NativeId;

/// Render a program as text, one instruction per line.
///
/// Jump and call targets are marked so loop heads and function entries stand
/// out.
pub fn disassemble(program: &Program) -> String {
    let instructions = program.instructions();
    let targets = collect_targets(&instructions);

    let mut output = String::new();
    output.push_str("=== BYTECODE PROGRAM ===\n");
    output.push_str(&format!(
        " {} bytes, {} instructions\n\n",
        program.len(),
        instructions.len()
    ));

    for instruction in &instructions {
        let marked = targets.contains(&instruction.at);
        if marked {
            output.push_str("      ┌──────────────────────────────────\n");
        }

        output.push_str(&format!("{:04} ", instruction.at));
        output.push_str(if marked { "► " } else { "  " });
        output.push_str(&format_instruction(instruction));
        output.push('\n');
    }

    output
}

fn collect_targets(instructions: &[Instruction]) -> BTreeSet<usize> {
    instructions
        .iter()
        .filter(|i| i.op.is_jump() || i.op == Opcode::PushFunc)
        .map(|i| i.operands[0] as usize)
        .collect()
}

fn format_instruction(instruction: &Instruction) -> String {
    let Instruction { at, op, operands } = instruction;
    let name = op.mnemonic();

    match op {
        Opcode::PushFunc => format!("{:<12}@{:04}", name, operands[0]),
        Opcode::PushNative => {
            let native = NativeId::from_index(operands[0] as u32);
            format!("{:<12}{}", name, native.name())
        }
        Opcode::PushInt => format!("{:<12}{}", name, operands[0]),
        Opcode::Peek | Opcode::Store => format!("{:<12}{}", name, operands[0]),
        Opcode::Jump | Opcode::JumpFalse => {
            let target = operands[0] as usize;
            let direction = if target <= *at { "↑" } else { "↓" };
            format!("{:<12}{} (→ {:04})", name, direction, target)
        }
        Opcode::Ret => format!(
            "{:<12}{} {}     ; drop {} slots, {} args",
            name, operands[0], operands[1], operands[0], operands[1]
        ),
        _ => name.to_string(),
    }
}
