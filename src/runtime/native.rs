//! Native functions that prototypes bind to.
//!
//! A native pops exactly `arity` arguments, first argument on top, and pushes
//! exactly one result.

use crate::invariant::{Violation, fatal};
use crate::lang::value::Value;
use crate::runtime::runtime_error::Fault;
use crate::runtime::vm::Vm;

pub type NativeFn = fn(&mut Vm) -> Result<(), Fault>;

pub struct Native {
    pub name: &'static str,
    pub arity: u32,
    pub func: NativeFn,
}

static NATIVES: [Native; 2] = [
    Native {
        name: "print_int",
        arity: 1,
        func: print_int,
    },
    Native {
        name: "read_int",
        arity: 0,
        func: read_int,
    },
];

/// Index into the native table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeId(u32);

impl NativeId {
    /// Rebuild an id decoded from bytecode.
    pub fn from_index(index: u32) -> Self {
        if index as usize >= NATIVES.len() {
            fatal(Violation::UnknownNative(index));
        }
        NativeId(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    pub fn get(self) -> &'static Native {
        &NATIVES[self.0 as usize]
    }

    pub fn name(self) -> &'static str {
        self.get().name
    }
}

/// Find the native registered as `primitive`.
pub fn lookup(primitive: &str) -> Option<NativeId> {
    NATIVES
        .iter()
        .position(|native| native.name == primitive)
        .map(|index| NativeId(index as u32))
}

/// `print_int(x: int): int`
fn print_int(vm: &mut Vm) -> Result<(), Fault> {
    let n = vm.pop_int()?;
    vm.write_output(n);
    vm.push(Value::Int(0));
    Ok(())
}

/// `read_int(): int`
fn read_int(vm: &mut Vm) -> Result<(), Fault> {
    let n = vm.read_input().ok_or(Fault::InputExhausted)?;
    vm.push(Value::Int(n));
    Ok(())
}
