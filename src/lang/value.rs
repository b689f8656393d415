use crate::runtime::native::NativeId;

/// Runtime value in the IMP machine.
///
/// Values are the only data that can exist on the operand stack. Return
/// addresses share the stack with arguments and locals, so code addresses
/// are values too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// Reference into the native function table.
    Native(NativeId),

    /// Bytecode address: a function entry or a return address.
    Addr(u32),

    /// 64-bit signed integer.
    Int(i64),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Native(_) => "native function",
            Value::Addr(_) => "code address",
            Value::Int(_) => "integer",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Native(id) => write!(f, "<native {}>", id.name()),
            Value::Addr(addr) => write!(f, "@{:04}", addr),
            Value::Int(n) => write!(f, "{}", n),
        }
    }
}
