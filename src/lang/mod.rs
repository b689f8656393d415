//! # IMP Abstract Syntax Tree
//!
//! This module defines the tree the backend consumes. The tree is produced by
//! an external parser and handed over either directly or as postcard bytes
//! (see [`program::Module::from_bytes`]). The backend only reads it.
//!
//! ## Documentation conventions
//!
//! - Stack effects are written as `( before -- after )`.
//! - Source snippets use IMP surface syntax, e.g. `let x: int = 1`.

pub mod node;
pub mod program;
pub mod value;
