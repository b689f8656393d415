/// Why an executing program was aborted.
///
/// Faults are properties of the executed program, not of the compiler, and
/// are returned to whoever invoked the machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("division by zero")]
    DivisionByZero,

    /// Signed overflow in the named operation.
    #[error("integer overflow in {0}")]
    Overflow(&'static str),

    #[error("cannot call {0}")]
    NotCallable(&'static str),

    #[error("type error: expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },

    #[error("read_int: input exhausted")]
    InputExhausted,

    #[error("execution step limit exceeded ({0})")]
    StepLimit(usize),

    #[error("stack size limit exceeded ({0})")]
    StackLimit(usize),
}

/// A fault together with the address of the instruction that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub fault: Fault,
    pub pc: usize,
}

impl RuntimeError {
    pub fn new(fault: Fault, pc: usize) -> Self {
        RuntimeError { fault, pc }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error at {:04}: {}", self.pc, self.fault)
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.fault)
    }
}
