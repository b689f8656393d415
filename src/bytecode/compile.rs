use tracing::{debug, trace};

use crate::bytecode::Program;
use crate::bytecode::disasm::disassemble;
use crate::bytecode::emit::Emitter;
use crate::bytecode::label::Label;
use crate::bytecode::scope::{Binding, Globals, Scope};
use crate::invariant::{Violation, fatal};
use crate::lang::node::{Block, Expr, Stmt};
use crate::lang::program::{FuncDecl, Module};
use crate::runtime::native;

/// Lowers a [`Module`] into a single bytecode [`Program`].
///
/// Layout: the top-level statements come first and end in `HALT`, followed
/// by every function body in declaration order.
pub struct Compiler {
    emit: Emitter,

    /// Argument count of the function being lowered, `None` at top level.
    nargs: Option<u32>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            emit: Emitter::new(),
            nargs: None,
        }
    }

    pub fn compile_module(mut self, module: &Module) -> Program {
        // Pass 1: bind every global name so bodies may refer forward.
        let (globals, functions) = self.declare(module);
        let global = Scope::global(&globals);

        // Pass 2: top-level code, then function bodies.
        self.lower_block(module.statements(), &global, "top level");
        self.emit.halt();

        for (func, entry) in functions {
            self.lower_function(func, entry, &global);
        }

        let program = self.emit.finish();
        trace!(
            bytes = program.len(),
            disassembly = %disassemble(&program),
            "compiled module"
        );
        program
    }

    fn declare<'m>(&mut self, module: &'m Module) -> (Globals, Vec<(&'m FuncDecl, Label)>) {
        let mut globals = Globals::default();
        let mut functions = Vec::new();

        for proto in module.prototypes() {
            let id = native::lookup(&proto.primitive).unwrap_or_else(|| {
                fatal(Violation::MissingPrimitive {
                    name: proto.name.clone(),
                    primitive: proto.primitive.clone(),
                })
            });
            // Call sites release as many slots as the prototype declares.
            let arity = id.get().arity;
            if arity as usize != proto.args.len() {
                fatal(Violation::ArityMismatch {
                    name: proto.name.clone(),
                    primitive: proto.primitive.clone(),
                    declared: proto.args.len(),
                    arity,
                });
            }
            globals.natives.insert(proto.name.clone(), id);
        }

        for func in module.functions() {
            if globals.functions.contains_key(&func.name) {
                fatal(Violation::DuplicateFunction(func.name.clone()));
            }
            let entry = self.emit.make_label();
            globals.functions.insert(func.name.clone(), entry);
            functions.push((func, entry));
        }

        (globals, functions)
    }

    fn lower_function(&mut self, func: &FuncDecl, entry: Label, global: &Scope<'_>) {
        let nargs = func.args.len() as u32;
        debug!(
            function = %func.name,
            nargs,
            entry = self.emit.offset(),
            "lowering function"
        );

        self.emit.expect_depth("function entry", 0);
        self.emit.place_label(entry);

        let scope = Scope::function(global, func.args.iter().map(|(name, _)| name.as_str()));
        self.nargs = Some(nargs);
        self.lower_block(&func.body.stmts, &scope, "function body");

        // Falling off the end returns 0.
        self.emit.int(0);
        self.emit.ret(nargs);
        self.nargs = None;

        self.emit.expect_depth("function exit", 0);
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Lower `stmts` in a fresh block scope and drop its locals on exit.
    fn lower_block<'a>(
        &mut self,
        stmts: impl IntoIterator<Item = &'a Stmt>,
        parent: &Scope<'_>,
        context: &'static str,
    ) {
        let before = self.emit.depth();
        let mut scope = Scope::block(parent);

        for stmt in stmts {
            self.lower_stmt(stmt, &mut scope);
        }

        for _ in 0..scope.number_of_locals() {
            self.emit.pop();
        }
        self.emit.expect_depth(context, before);
    }

    /// Loop and branch bodies always get their own block, so a bare `let`
    /// there cannot leak a slot into the enclosing block.
    fn lower_body(&mut self, body: &Stmt, scope: &Scope<'_>) {
        match body {
            Stmt::Block(Block { stmts }) => self.lower_block(stmts, scope, "block"),
            other => self.lower_block([other], scope, "block"),
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt, scope: &mut Scope<'_>) {
        match stmt {
            Stmt::Block(Block { stmts }) => self.lower_block(stmts, scope, "block"),

            Stmt::While { cond, body } => {
                let entry = self.emit.make_label();
                let exit = self.emit.make_label();

                self.emit.place_label(entry);
                self.lower_expr(cond, scope);
                self.emit.jump_false(exit);
                self.lower_body(body, scope);
                self.emit.jump(entry);
                self.emit.place_label(exit);
            }

            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let else_label = self.emit.make_label();
                let exit = self.emit.make_label();

                self.lower_expr(cond, scope);
                self.emit.jump_false(else_label);
                self.lower_body(then, scope);
                self.emit.jump(exit);
                self.emit.place_label(else_label);
                if let Some(otherwise) = otherwise {
                    self.lower_body(otherwise, scope);
                }
                self.emit.place_label(exit);
            }

            Stmt::Expr(expr) => {
                self.lower_expr(expr, scope);
                self.emit.pop();
            }

            Stmt::Return(expr) => {
                let nargs = self
                    .nargs
                    .unwrap_or_else(|| fatal(Violation::ReturnOutsideFunction));
                self.lower_expr(expr, scope);
                self.emit.ret(nargs);
            }

            Stmt::Let { name, init, .. } => {
                match init {
                    Some(init) => self.lower_expr(init, scope),
                    None => self.emit.int(0),
                }
                // The value just pushed is the local's slot.
                scope.add_local(name, self.emit.depth());
            }
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn lower_expr(&mut self, expr: &Expr, scope: &Scope<'_>) {
        match expr {
            Expr::Ref(name) => match scope.lookup(name) {
                Binding::Function(entry) => self.emit.push_func(entry),
                Binding::Native(id) => self.emit.push_native(id),
                binding @ (Binding::Argument(_) | Binding::Local(_)) => {
                    let offset = self.slot_offset(name, binding);
                    self.emit.peek(offset);
                }
            },

            Expr::Binary { op, lhs, rhs } => {
                self.lower_expr(lhs, scope);
                self.lower_expr(rhs, scope);
                self.emit.binary((*op).into());
            }

            Expr::Call { callee, args } => {
                // Last argument deepest, first argument just below the callee.
                for arg in args.iter().rev() {
                    self.lower_expr(arg, scope);
                }
                self.lower_expr(callee, scope);
                self.emit.call(args.len() as u32);
            }

            Expr::Int(n) => self.emit.int(*n),

            Expr::Assign { name, value } => {
                self.lower_expr(value, scope);
                let offset = self.slot_offset(name, scope.lookup(name));
                self.emit.store(offset);
            }
        }
    }

    /// Distance from the stack top to the slot backing `binding`, at the
    /// current depth.
    fn slot_offset(&self, name: &str, binding: Binding) -> u32 {
        let depth = self.emit.depth();
        match binding {
            Binding::Argument(index) => depth + index + 1,
            Binding::Local(declared) => depth
                .checked_sub(declared)
                .unwrap_or_else(|| fatal(Violation::DepthUnderflow("local reference"))),
            Binding::Function(_) | Binding::Native(_) => {
                fatal(Violation::NotAssignable(name.to_string()))
            }
        }
    }
}
