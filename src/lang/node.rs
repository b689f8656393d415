use serde::{Deserialize, Serialize};

/// Binary operators of the language.
///
/// Every operator consumes two integers and produces one.
/// Comparisons produce `1` for true and `0` for false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // ───────────────────────────── Arithmetic ───────────────────────────
    /// `a + b`, faults on overflow.
    Add,
    /// `a - b`, faults on overflow.
    Sub,
    /// `a * b`, faults on overflow.
    Mul,
    /// `a / b`, faults on a zero divisor.
    Div,
    /// `a % b`, faults on a zero divisor.
    Mod,

    // ───────────────────────────── Comparison ───────────────────────────
    /// `a > b`
    Greater,
    /// `a < b`
    Less,
    /// `a >= b`
    GreaterEq,
    /// `a <= b`
    LessEq,
    /// `a == b`
    Eq,
}

/// Expression node.
///
/// Every expression leaves exactly one value on the operand stack.
///
/// Stack effect: `( -- x )`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a function, prototype, argument or local.
    Ref(String),

    /// `lhs op rhs`. The left operand is evaluated first.
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// `callee(args...)`.
    Call { callee: Box<Expr>, args: Vec<Expr> },

    /// Integer literal.
    Int(i64),

    /// `name = value`. Overwrites an argument or local and yields the
    /// stored value.
    Assign { name: String, value: Box<Expr> },
}

impl Expr {
    pub fn int(n: i64) -> Self {
        Expr::Int(n)
    }

    pub fn name(name: impl Into<String>) -> Self {
        Expr::Ref(name.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    /// Shorthand for calling a name: `name(args...)`.
    pub fn call_named(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::call(Expr::name(name), args)
    }

    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Expr::Assign {
            name: name.into(),
            value: Box::new(value),
        }
    }
}

/// A `{ ... }` block. Locals declared inside are dropped on exit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

/// Statement node.
///
/// Statements are stack-neutral, except `let`, which leaves its value on the
/// stack as the local's storage until the enclosing block exits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// Nested block.
    Block(Block),

    /// `while (cond) body`
    While { cond: Expr, body: Box<Stmt> },

    /// `if (cond) then else otherwise`
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },

    /// Expression evaluated for its side effects; the value is dropped.
    Expr(Expr),

    /// `return expr`
    Return(Expr),

    /// `let name: ty = init`
    Let {
        name: String,
        ty: String,
        init: Option<Expr>,
    },
}

impl Stmt {
    pub fn block(stmts: Vec<Stmt>) -> Self {
        Stmt::Block(Block::new(stmts))
    }

    pub fn while_(cond: Expr, body: Stmt) -> Self {
        Stmt::While {
            cond,
            body: Box::new(body),
        }
    }

    pub fn if_(cond: Expr, then: Stmt, otherwise: Option<Stmt>) -> Self {
        Stmt::If {
            cond,
            then: Box::new(then),
            otherwise: otherwise.map(Box::new),
        }
    }

    pub fn expr(expr: Expr) -> Self {
        Stmt::Expr(expr)
    }

    pub fn ret(expr: Expr) -> Self {
        Stmt::Return(expr)
    }

    /// `let name: int = init`
    pub fn let_(name: impl Into<String>, init: Option<Expr>) -> Self {
        Stmt::Let {
            name: name.into(),
            ty: "int".to_string(),
            init,
        }
    }
}
