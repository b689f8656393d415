use serde::{Deserialize, Serialize};

use super::node::{Block, Stmt};

/// `(argument-name, type-name)` pairs, in declaration order.
pub type Args = Vec<(String, String)>;

/// `func name(args): ret { body }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub name: String,
    pub args: Args,
    pub ret: String,
    pub body: Block,
}

/// `func name(args): ret = "primitive"`
///
/// Binds `name` to the native function registered as `primitive`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtoDecl {
    pub name: String,
    pub args: Args,
    pub ret: String,
    pub primitive: String,
}

/// Top-level item of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Proto(ProtoDecl),
    Func(FuncDecl),
    Stmt(Stmt),
}

/// Parsed IMP module, items in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub items: Vec<Item>,
}

impl Module {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    /// Decode a module handed over by an out-of-process parser.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }

    /// Encode the module for handing it across a process boundary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FuncDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Func(func) => Some(func),
            _ => None,
        })
    }

    pub fn prototypes(&self) -> impl Iterator<Item = &ProtoDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Proto(proto) => Some(proto),
            _ => None,
        })
    }

    pub fn statements(&self) -> impl Iterator<Item = &Stmt> {
        self.items.iter().filter_map(|item| match item {
            Item::Stmt(stmt) => Some(stmt),
            _ => None,
        })
    }
}

impl FuncDecl {
    /// Function taking only `int` arguments and returning `int`.
    pub fn new(name: impl Into<String>, args: &[&str], body: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            args: int_args(args),
            ret: "int".to_string(),
            body: Block::new(body),
        }
    }
}

impl ProtoDecl {
    pub fn new(name: impl Into<String>, args: &[&str], primitive: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: int_args(args),
            ret: "int".to_string(),
            primitive: primitive.into(),
        }
    }
}

fn int_args(names: &[&str]) -> Args {
    names
        .iter()
        .map(|name| (name.to_string(), "int".to_string()))
        .collect()
}
