#![allow(dead_code)]

use imp::lang::node::{Expr, Stmt};
use imp::lang::program::{Item, ProtoDecl};
use tracing_subscriber::EnvFilter;

/// Route library logs to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn print_proto() -> Item {
    Item::Proto(ProtoDecl::new("print", &["x"], "print_int"))
}

pub fn read_proto() -> Item {
    Item::Proto(ProtoDecl::new("read", &[], "read_int"))
}

/// `print(expr)` as a statement.
pub fn print_stmt(expr: Expr) -> Stmt {
    Stmt::expr(Expr::call_named("print", vec![expr]))
}

/// `print(expr)` as a top-level item.
pub fn print(expr: Expr) -> Item {
    Item::Stmt(print_stmt(expr))
}
