use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::bytecode::{Opcode, Program};
use crate::invariant::{Violation, fatal};
use crate::lang::value::Value;
use crate::runtime::native::NativeId;
use crate::runtime::runtime_error::{Fault, RuntimeError};

#[derive(Debug, Clone, Default)]
pub struct VmConfig {
    /// Fault once more than this many instructions have executed.
    pub max_steps: Option<usize>,
    /// Fault once the operand stack grows beyond this many slots.
    pub max_stack_size: Option<usize>,
    /// Also print `print_int` output to stdout.
    pub echo_output: bool,
}

enum Flow {
    Continue,
    Halt,
}

/// Stack machine executing a [`Program`].
///
/// Arguments, return addresses and locals share the single operand stack and
/// are addressed relative to its top; there are no frame records.
#[derive(Debug)]
pub struct Vm {
    stack: Vec<Value>,
    pc: usize,
    /// Offset of the instruction being executed.
    at: usize,
    config: VmConfig,
    steps: usize,
    input: VecDeque<i64>,
    output: Vec<i64>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            stack: Vec::new(),
            pc: 0,
            at: 0,
            config,
            steps: 0,
            input: VecDeque::new(),
            output: Vec::new(),
        }
    }

    /// Queue integers for `read_int`.
    pub fn with_input(mut self, input: impl IntoIterator<Item = i64>) -> Self {
        self.input.extend(input);
        self
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Integers written by `print_int` during the last run.
    pub fn output(&self) -> &[i64] {
        &self.output
    }

    pub fn reset_execution_state(&mut self) {
        self.stack.clear();
        self.output.clear();
        self.pc = 0;
        self.at = 0;
        self.steps = 0;
    }

    /// Execute `program` from offset 0 until `HALT` or a fault.
    pub fn run(&mut self, program: &Program) -> Result<(), RuntimeError> {
        self.reset_execution_state();

        loop {
            let at = self.pc;
            let result = self.check_limits().and_then(|()| self.step(program));
            match result {
                Ok(Flow::Continue) => {}
                Ok(Flow::Halt) => {
                    debug!(pc = at, steps = self.steps, depth = self.stack.len(), "halt");
                    return Ok(());
                }
                Err(fault) => {
                    warn!(pc = at, %fault, "execution aborted");
                    return Err(RuntimeError::new(fault, at));
                }
            }
        }
    }

    // Execution

    fn check_limits(&mut self) -> Result<(), Fault> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(Fault::StepLimit(max));
            }
        }

        if let Some(max) = self.config.max_stack_size {
            if self.stack.len() > max {
                return Err(Fault::StackLimit(max));
            }
        }

        Ok(())
    }

    fn step(&mut self, program: &Program) -> Result<Flow, Fault> {
        let at = self.pc;
        self.at = at;
        let op = program.read_opcode(&mut self.pc);
        trace!(pc = at, %op, depth = self.stack.len());

        match op {
            // pushes
            Opcode::PushFunc => {
                let addr = program.read_u32(&mut self.pc);
                self.push(Value::Addr(addr));
            }
            Opcode::PushNative => {
                let index = program.read_u32(&mut self.pc);
                self.push(Value::Native(NativeId::from_index(index)));
            }
            Opcode::PushInt => {
                let n = program.read_i64(&mut self.pc);
                self.push(Value::Int(n));
            }
            Opcode::Peek => {
                let offset = program.read_u32(&mut self.pc) as usize;
                let value = self.stack[self.slot_below_top(offset)];
                self.push(value);
            }

            // stack ops
            Opcode::Store => {
                let offset = program.read_u32(&mut self.pc) as usize;
                let slot = self.slot_below_top(offset);
                let top = self.slot_below_top(0);
                self.stack[slot] = self.stack[top];
            }
            Opcode::Pop => {
                self.pop();
            }

            // arithmetic
            Opcode::Add => {
                self.int_binary(|a, b| a.checked_add(b).ok_or(Fault::Overflow("add")))?;
            }
            Opcode::Sub => {
                self.int_binary(|a, b| a.checked_sub(b).ok_or(Fault::Overflow("sub")))?;
            }
            Opcode::Mul => {
                self.int_binary(|a, b| a.checked_mul(b).ok_or(Fault::Overflow("mul")))?;
            }
            Opcode::Div => {
                self.int_binary(|a, b| match b {
                    0 => Err(Fault::DivisionByZero),
                    _ => a.checked_div(b).ok_or(Fault::Overflow("div")),
                })?;
            }
            Opcode::Mod => {
                self.int_binary(|a, b| match b {
                    0 => Err(Fault::DivisionByZero),
                    _ => a.checked_rem(b).ok_or(Fault::Overflow("mod")),
                })?;
            }

            // comparison, `a` is the left operand
            Opcode::Greater => self.int_binary(|a, b| Ok((a > b) as i64))?,
            Opcode::Less => self.int_binary(|a, b| Ok((a < b) as i64))?,
            Opcode::GreaterEq => self.int_binary(|a, b| Ok((a >= b) as i64))?,
            Opcode::LessEq => self.int_binary(|a, b| Ok((a <= b) as i64))?,
            Opcode::Eq => self.int_binary(|a, b| Ok((a == b) as i64))?,

            // control flow
            Opcode::Call => match self.pop() {
                Value::Native(id) => {
                    debug!(pc = at, native = id.name(), "call native");
                    (id.get().func)(self)?;
                }
                Value::Addr(addr) => {
                    let ret = crate::bytecode::label::to_address(self.pc);
                    self.push(Value::Addr(ret));
                    self.pc = addr as usize;
                }
                other => return Err(Fault::NotCallable(other.type_name())),
            },
            Opcode::Ret => {
                let depth = program.read_u32(&mut self.pc) as usize;
                let nargs = program.read_u32(&mut self.pc) as usize;
                let result = self.pop();
                self.discard(depth);
                self.pc = match self.pop() {
                    Value::Addr(addr) => addr as usize,
                    other => fatal(Violation::CorruptFrame {
                        pc: at,
                        found: other.to_string(),
                    }),
                };
                self.discard(nargs);
                self.push(result);
            }
            Opcode::Jump => {
                self.pc = program.read_u32(&mut self.pc) as usize;
            }
            Opcode::JumpFalse => {
                let target = program.read_u32(&mut self.pc) as usize;
                if self.pop_int()? == 0 {
                    self.pc = target;
                }
            }
            Opcode::Halt => return Ok(Flow::Halt),
        }

        Ok(Flow::Continue)
    }

    // Stack operations

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pop the top value. Popping past the stack base is fatal.
    pub fn pop(&mut self) -> Value {
        match self.stack.pop() {
            Some(value) => value,
            None => self.underflow(1),
        }
    }

    pub fn pop_int(&mut self) -> Result<i64, Fault> {
        match self.pop() {
            Value::Int(n) => Ok(n),
            other => Err(Fault::TypeMismatch {
                expected: "integer",
                got: other.type_name(),
            }),
        }
    }

    pub(crate) fn read_input(&mut self) -> Option<i64> {
        self.input.pop_front()
    }

    pub(crate) fn write_output(&mut self, n: i64) {
        if self.config.echo_output {
            println!("{}", n);
        }
        self.output.push(n);
    }

    /// Pop `b`, then `a`, and push `f(a, b)`.
    fn int_binary(&mut self, f: impl FnOnce(i64, i64) -> Result<i64, Fault>) -> Result<(), Fault> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.push(Value::Int(f(a, b)?));
        Ok(())
    }

    fn slot_below_top(&self, offset: usize) -> usize {
        match self.stack.len().checked_sub(offset + 1) {
            Some(slot) => slot,
            None => self.underflow(offset + 1),
        }
    }

    fn discard(&mut self, n: usize) {
        match self.stack.len().checked_sub(n) {
            Some(len) => self.stack.truncate(len),
            None => self.underflow(n),
        }
    }

    fn underflow(&self, needed: usize) -> ! {
        fatal(Violation::StackUnderflow {
            pc: self.at,
            needed,
            len: self.stack.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::label::LabelTable;
    use crate::runtime::native;

    // ============================================================
    // Test Helpers
    // ============================================================

    /// Hand-assembled code buffer.
    #[derive(Default)]
    struct Asm {
        code: Vec<u8>,
        labels: LabelTable,
    }

    impl Asm {
        fn op(mut self, op: Opcode) -> Self {
            self.code.push(op as u8);
            self
        }

        fn int(self, n: i64) -> Self {
            let mut asm = self.op(Opcode::PushInt);
            asm.code.extend_from_slice(&n.to_le_bytes());
            asm
        }

        fn with_u32(self, op: Opcode, n: u32) -> Self {
            let mut asm = self.op(op);
            asm.code.extend_from_slice(&n.to_le_bytes());
            asm
        }

        fn ret(self, depth: u32, nargs: u32) -> Self {
            let mut asm = self.with_u32(Opcode::Ret, depth);
            asm.code.extend_from_slice(&nargs.to_le_bytes());
            asm
        }

        fn build(self) -> Program {
            Program::new(self.code)
        }
    }

    fn asm() -> Asm {
        Asm::default()
    }

    /// Run the program and return the resulting stack.
    fn run_program(program: &Program) -> Result<Vec<Value>, RuntimeError> {
        let mut vm = Vm::new();
        vm.run(program)?;
        Ok(vm.stack().to_vec())
    }

    /// Assert the program halts with `expected` on the stack.
    fn assert_stack(program: Asm, expected: Vec<Value>) {
        let stack = run_program(&program.build()).expect("execution should succeed");
        assert_eq!(stack, expected, "stack mismatch");
    }

    /// Assert the program faults with `fault`.
    fn assert_fault(program: Asm, fault: Fault) {
        match run_program(&program.build()) {
            Ok(stack) => panic!("expected fault '{}', got stack: {:?}", fault, stack),
            Err(e) => assert_eq!(e.fault, fault),
        }
    }

    fn binary(a: i64, b: i64, op: Opcode) -> Asm {
        asm().int(a).int(b).op(op).op(Opcode::Halt)
    }

    // ============================================================
    // Pushes and stack ops
    // ============================================================

    #[test]
    fn test_push_int() {
        assert_stack(asm().int(42).op(Opcode::Halt), vec![Value::Int(42)]);
    }

    #[test]
    fn test_push_func_and_native() {
        let print = native::lookup("print_int").unwrap();
        let program = asm()
            .with_u32(Opcode::PushFunc, 77)
            .with_u32(Opcode::PushNative, print.index())
            .op(Opcode::Halt);

        assert_stack(program, vec![Value::Addr(77), Value::Native(print)]);
    }

    #[test]
    fn test_peek_copies_from_depth() {
        let program = asm()
            .int(1)
            .int(2)
            .int(3)
            .with_u32(Opcode::Peek, 2)
            .op(Opcode::Halt);

        assert_stack(
            program,
            vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(1)],
        );
    }

    #[test]
    fn test_store_overwrites_and_keeps_top() {
        let program = asm()
            .int(1)
            .int(2)
            .int(9)
            .with_u32(Opcode::Store, 2)
            .op(Opcode::Halt);

        assert_stack(program, vec![Value::Int(9), Value::Int(2), Value::Int(9)]);
    }

    #[test]
    fn test_pop() {
        assert_stack(
            asm().int(1).int(2).op(Opcode::Pop).op(Opcode::Halt),
            vec![Value::Int(1)],
        );
    }

    #[test]
    #[should_panic(expected = "operand stack underflow")]
    fn test_pop_empty_stack_is_fatal() {
        let _ = run_program(&asm().op(Opcode::Pop).op(Opcode::Halt).build());
    }

    #[test]
    #[should_panic(expected = "operand stack underflow at 0010: need 1 slots, have 0")]
    fn test_underflow_reports_instruction_start() {
        // 0: PUSH_INT 1 | 9: POP | 10: POP
        let _ = run_program(&asm().int(1).op(Opcode::Pop).op(Opcode::Pop).build());
    }

    #[test]
    #[should_panic(expected = "operand stack underflow at 0009: need 2 slots")]
    fn test_peek_below_base_is_fatal() {
        let _ = run_program(&asm().int(1).with_u32(Opcode::Peek, 1).build());
    }

    // ============================================================
    // Arithmetic
    // ============================================================

    #[test]
    fn test_add() {
        assert_stack(binary(2, 3, Opcode::Add), vec![Value::Int(5)]);
    }

    #[test]
    fn test_sub_keeps_operand_order() {
        assert_stack(binary(2, 5, Opcode::Sub), vec![Value::Int(-3)]);
    }

    #[test]
    fn test_mul() {
        assert_stack(binary(-4, 6, Opcode::Mul), vec![Value::Int(-24)]);
    }

    #[test]
    fn test_div_truncates_toward_zero() {
        assert_stack(binary(-7, 2, Opcode::Div), vec![Value::Int(-3)]);
    }

    #[test]
    fn test_mod_takes_dividend_sign() {
        assert_stack(binary(-7, 3, Opcode::Mod), vec![Value::Int(-1)]);
    }

    #[test]
    fn test_add_overflow() {
        assert_fault(binary(i64::MAX, 1, Opcode::Add), Fault::Overflow("add"));
        assert_fault(binary(i64::MIN, -1, Opcode::Add), Fault::Overflow("add"));
    }

    #[test]
    fn test_sub_overflow() {
        assert_fault(binary(i64::MIN, 1, Opcode::Sub), Fault::Overflow("sub"));
        assert_fault(binary(0, i64::MIN, Opcode::Sub), Fault::Overflow("sub"));
    }

    #[test]
    fn test_mul_overflow() {
        assert_fault(binary(i64::MAX, 2, Opcode::Mul), Fault::Overflow("mul"));
    }

    #[test]
    fn test_div_by_zero() {
        assert_fault(binary(1, 0, Opcode::Div), Fault::DivisionByZero);
    }

    #[test]
    fn test_mod_by_zero() {
        assert_fault(binary(1, 0, Opcode::Mod), Fault::DivisionByZero);
    }

    #[test]
    fn test_div_min_by_minus_one() {
        assert_fault(binary(i64::MIN, -1, Opcode::Div), Fault::Overflow("div"));
        assert_fault(binary(i64::MIN, -1, Opcode::Mod), Fault::Overflow("mod"));
    }

    #[test]
    fn test_add_type_error() {
        let program = asm()
            .with_u32(Opcode::PushFunc, 0)
            .int(1)
            .op(Opcode::Add)
            .op(Opcode::Halt);

        assert_fault(
            program,
            Fault::TypeMismatch {
                expected: "integer",
                got: "code address",
            },
        );
    }

    // ============================================================
    // Comparison
    // ============================================================

    #[test]
    fn test_comparisons_use_left_operand_first() {
        assert_stack(binary(5, 3, Opcode::Greater), vec![Value::Int(1)]);
        assert_stack(binary(3, 5, Opcode::Greater), vec![Value::Int(0)]);
        assert_stack(binary(3, 5, Opcode::Less), vec![Value::Int(1)]);
        assert_stack(binary(5, 5, Opcode::GreaterEq), vec![Value::Int(1)]);
        assert_stack(binary(6, 5, Opcode::LessEq), vec![Value::Int(0)]);
        assert_stack(binary(5, 5, Opcode::Eq), vec![Value::Int(1)]);
        assert_stack(binary(4, 5, Opcode::Eq), vec![Value::Int(0)]);
    }

    // ============================================================
    // Jumps
    // ============================================================

    #[test]
    fn test_jump_skips_code() {
        // 0: JUMP 14 | 5: PUSH_INT 1 | 14: PUSH_INT 2 | 23: HALT
        let program = asm()
            .with_u32(Opcode::Jump, 14)
            .int(1)
            .int(2)
            .op(Opcode::Halt);

        assert_stack(program, vec![Value::Int(2)]);
    }

    #[test]
    fn test_jump_false_branches_on_zero_only() {
        // 0: PUSH_INT c | 9: JUMP_FALSE 24 | 14: PUSH_INT 1 | 23: HALT | 24: PUSH_INT 2 | 33: HALT
        let branch = |cond| {
            asm()
                .int(cond)
                .with_u32(Opcode::JumpFalse, 24)
                .int(1)
                .op(Opcode::Halt)
                .int(2)
                .op(Opcode::Halt)
        };

        assert_stack(branch(0), vec![Value::Int(2)]);
        assert_stack(branch(7), vec![Value::Int(1)]);
        assert_stack(branch(-1), vec![Value::Int(1)]);
    }

    // ============================================================
    // Calls
    // ============================================================

    #[test]
    fn test_call_and_return_restore_caller_stack() {
        // caller:  PUSH_INT 100 | PUSH_INT 3 | PUSH_INT 2 | PUSH_FUNC f | CALL | HALT
        // f(a, b): PEEK 1 | PEEK 3 | SUB | RET 0 2
        let mut caller = asm().int(100).int(3).int(2);
        let f = caller.labels.make();
        caller = caller.op(Opcode::PushFunc);
        caller.labels.reference(f, &mut caller.code);
        let mut program = caller.op(Opcode::Call).op(Opcode::Halt);
        program.labels.place(f, &mut program.code);
        let program = program
            .with_u32(Opcode::Peek, 1)
            .with_u32(Opcode::Peek, 3)
            .op(Opcode::Sub)
            .ret(0, 2);

        assert_stack(program, vec![Value::Int(100), Value::Int(-1)]);
    }

    #[test]
    fn test_return_discards_frame_locals() {
        // 0: PUSH_FUNC 7 | 5: CALL | 6: HALT
        // f(): PUSH_INT 5 | PUSH_INT 6 | PEEK 0 | RET 2 0
        let program = asm()
            .with_u32(Opcode::PushFunc, 7)
            .op(Opcode::Call)
            .op(Opcode::Halt)
            .int(5)
            .int(6)
            .with_u32(Opcode::Peek, 0)
            .ret(2, 0);

        assert_stack(program, vec![Value::Int(6)]);
    }

    #[test]
    fn test_call_native() {
        let print = native::lookup("print_int").unwrap();
        let program = asm()
            .int(9)
            .with_u32(Opcode::PushNative, print.index())
            .op(Opcode::Call)
            .op(Opcode::Halt)
            .build();

        let mut vm = Vm::new();
        vm.run(&program).unwrap();

        assert_eq!(vm.output(), &[9]);
        assert_eq!(vm.stack(), &[Value::Int(0)]);
    }

    #[test]
    fn test_call_integer_is_not_callable() {
        assert_fault(
            asm().int(3).op(Opcode::Call).op(Opcode::Halt),
            Fault::NotCallable("integer"),
        );
    }

    #[test]
    #[should_panic(expected = "corrupt call frame")]
    fn test_return_without_return_address_is_fatal() {
        let _ = run_program(&asm().int(1).int(2).ret(0, 0).build());
    }

    // ============================================================
    // Limits and state
    // ============================================================

    #[test]
    fn test_step_limit() {
        // 0: JUMP 0
        let program = asm().with_u32(Opcode::Jump, 0).build();
        let mut vm = Vm::with_config(VmConfig {
            max_steps: Some(100),
            ..VmConfig::default()
        });

        let err = vm.run(&program).unwrap_err();

        assert_eq!(err.fault, Fault::StepLimit(100));
        assert_eq!(err.pc, 0);
    }

    #[test]
    fn test_stack_limit() {
        // 0: PUSH_INT 1 | 9: JUMP 0
        let program = asm().int(1).with_u32(Opcode::Jump, 0).build();
        let mut vm = Vm::with_config(VmConfig {
            max_stack_size: Some(8),
            ..VmConfig::default()
        });

        assert_eq!(vm.run(&program).unwrap_err().fault, Fault::StackLimit(8));
    }

    #[test]
    fn test_fault_reports_instruction_address() {
        // 0: PUSH_INT 1 | 9: PUSH_INT 0 | 18: DIV
        let err = run_program(&binary(1, 0, Opcode::Div).build()).unwrap_err();

        assert_eq!(err.pc, 18);
    }

    #[test]
    fn test_run_resets_previous_state() {
        let program = asm().int(1).op(Opcode::Halt).build();
        let mut vm = Vm::new();

        vm.run(&program).unwrap();
        vm.run(&program).unwrap();

        assert_eq!(vm.stack(), &[Value::Int(1)]);
    }
}
