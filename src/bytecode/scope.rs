use std::collections::HashMap;

use crate::bytecode::label::Label;
use crate::invariant::{Violation, fatal};
use crate::runtime::native::NativeId;

/// Where a name lives at runtime and how to address it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Declared function; the label is its entry point.
    Function(Label),
    /// Prototype bound to a native function.
    Native(NativeId),
    /// Argument `index` of the enclosing function, 0 being the first.
    Argument(u32),
    /// Block local, backed by the slot pushed when the compile-time depth
    /// reached this value.
    Local(u32),
}

/// Module-level names.
#[derive(Debug, Default)]
pub struct Globals {
    pub functions: HashMap<String, Label>,
    pub natives: HashMap<String, NativeId>,
}

/// One layer of the scope chain.
///
/// Each layer owns its own names and borrows its parent, so a chain never
/// outlives the layers below it.
#[derive(Debug)]
pub enum Scope<'p> {
    Global(&'p Globals),
    Function {
        args: HashMap<String, u32>,
        parent: &'p Scope<'p>,
    },
    Block {
        /// Declarations in order; later entries shadow earlier ones.
        locals: Vec<(String, u32)>,
        parent: &'p Scope<'p>,
    },
}

impl<'p> Scope<'p> {
    pub fn global(globals: &'p Globals) -> Self {
        Scope::Global(globals)
    }

    pub fn function<'a>(parent: &'p Scope<'p>, args: impl IntoIterator<Item = &'a str>) -> Self {
        let args = args
            .into_iter()
            .enumerate()
            .map(|(index, name)| (name.to_string(), index as u32))
            .collect();
        Scope::Function { args, parent }
    }

    pub fn block(parent: &'p Scope<'p>) -> Self {
        Scope::Block {
            locals: Vec::new(),
            parent,
        }
    }

    /// Resolve `name`, innermost layer first.
    pub fn lookup(&self, name: &str) -> Binding {
        match self {
            Scope::Global(globals) => {
                if let Some(label) = globals.functions.get(name) {
                    return Binding::Function(*label);
                }
                if let Some(id) = globals.natives.get(name) {
                    return Binding::Native(*id);
                }
                fatal(Violation::Unbound(name.to_string()))
            }
            Scope::Function { args, parent } => match args.get(name) {
                Some(index) => Binding::Argument(*index),
                None => parent.lookup(name),
            },
            Scope::Block { locals, parent } => {
                match locals.iter().rev().find(|(local, _)| local == name) {
                    Some((_, depth)) => Binding::Local(*depth),
                    None => parent.lookup(name),
                }
            }
        }
    }

    /// Declare `name` in this block, backed by the slot at `depth`.
    pub fn add_local(&mut self, name: &str, depth: u32) {
        match self {
            Scope::Block { locals, .. } => locals.push((name.to_string(), depth)),
            _ => fatal(Violation::LocalOutsideBlock(name.to_string())),
        }
    }

    /// Slots declared directly in this layer.
    pub fn number_of_locals(&self) -> u32 {
        match self {
            Scope::Block { locals, .. } => locals.len() as u32,
            _ => 0,
        }
    }
}
