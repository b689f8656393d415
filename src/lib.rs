//! Backend for IMP, a small imperative language with integer values,
//! first-class functions and native primitives.
//!
//! A parsed [`Module`] is lowered by the [`Compiler`] into a flat bytecode
//! [`Program`], which the stack machine [`Vm`] executes.
//!
//! ```
//! use imp::lang::node::{BinaryOp, Expr, Stmt};
//! use imp::lang::program::{FuncDecl, Item, Module, ProtoDecl};
//!
//! let module = Module::new(vec![
//!     Item::Proto(ProtoDecl::new("print", &["x"], "print_int")),
//!     Item::Func(FuncDecl::new(
//!         "add",
//!         &["a", "b"],
//!         vec![Stmt::ret(Expr::binary(BinaryOp::Add, Expr::name("a"), Expr::name("b")))],
//!     )),
//!     Item::Stmt(Stmt::expr(Expr::call_named(
//!         "print",
//!         vec![Expr::call_named("add", vec![Expr::int(2), Expr::int(3)])],
//!     ))),
//! ]);
//!
//! let vm = imp::run(&module).unwrap();
//! assert_eq!(vm.output(), &[5]);
//! ```

pub mod bytecode;
pub mod invariant;
pub mod lang;
pub mod runtime;

pub use bytecode::{Compiler, Program, disassemble};
pub use lang::program::Module;
pub use runtime::runtime_error::{Fault, RuntimeError};
pub use runtime::vm::{Vm, VmConfig};

/// Compile `module` and run it on a fresh machine.
pub fn run(module: &Module) -> Result<Vm, RuntimeError> {
    run_with(module, Vm::new())
}

/// Compile `module` and run it on `vm`, e.g. one built with
/// [`Vm::with_config`] or [`Vm::with_input`].
pub fn run_with(module: &Module, mut vm: Vm) -> Result<Vm, RuntimeError> {
    let program = Compiler::new().compile_module(module);
    vm.run(&program)?;
    Ok(vm)
}
