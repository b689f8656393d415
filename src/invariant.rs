//! Internal-invariant violations.
//!
//! A violation means the compiler was handed a tree (or the machine a
//! program) that breaks a contract checked upstream. Nothing can recover from
//! that, so violations never travel through `Result`: [`fatal`] logs the
//! violation and panics. Faults of the executed program are a separate
//! channel, see [`crate::runtime::runtime_error`].

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    /// A name reference that no scope layer binds.
    #[error("name not bound: '{0}'")]
    Unbound(String),

    /// A prototype naming a primitive that is not in the native table.
    #[error("missing native function '{primitive}' for prototype '{name}'")]
    MissingPrimitive { name: String, primitive: String },

    /// A prototype whose argument list disagrees with its native's arity.
    #[error(
        "prototype '{name}' declares {declared} arguments but native '{primitive}' takes {arity}"
    )]
    ArityMismatch {
        name: String,
        primitive: String,
        declared: usize,
        arity: u32,
    },

    #[error("function '{0}' declared twice")]
    DuplicateFunction(String),

    #[error("cannot declare local '{0}' outside a block")]
    LocalOutsideBlock(String),

    #[error("cannot assign to '{0}': not an argument or local")]
    NotAssignable(String),

    #[error("return outside of a function body")]
    ReturnOutsideFunction,

    /// The compile-time depth model fell out of step with the code.
    #[error("stack depth mismatch in {context}: expected {expected}, found {found}")]
    DepthMismatch {
        context: &'static str,
        expected: u32,
        found: u32,
    },

    #[error("no elements on stack: {0}")]
    DepthUnderflow(&'static str),

    #[error("label L{0} placed twice")]
    LabelPlacedTwice(u32),

    #[error("label L{0} referenced but never placed")]
    LabelNeverPlaced(u32),

    #[error("bytecode too large: address {0} does not fit in u32")]
    AddressOverflow(usize),

    #[error("unknown opcode {byte:#04x} at {pc:04}")]
    UnknownOpcode { byte: u8, pc: usize },

    #[error("truncated instruction at {pc:04}: need {needed} bytes")]
    Truncated { pc: usize, needed: usize },

    /// The machine popped or addressed below the base of its operand stack.
    #[error("operand stack underflow at {pc:04}: need {needed} slots, have {len}")]
    StackUnderflow { pc: usize, needed: usize, len: usize },

    #[error("corrupt call frame at {pc:04}: expected return address, found {found}")]
    CorruptFrame { pc: usize, found: String },

    #[error("native function index {0} out of range")]
    UnknownNative(u32),
}

/// Abort on a broken internal invariant.
#[track_caller]
pub fn fatal(violation: Violation) -> ! {
    tracing::error!(%violation, "internal invariant violated");
    panic!("internal invariant violated: {violation}");
}
