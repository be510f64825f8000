//! ModelScript Compiler
//!
//! Turns a parsed, syntactically-valid schema tree into a fully resolved,
//! validated, immutable compiled module.
//!
//! ## Architecture
//!
//! - **Structural pass**: walk the parse tree, validate every statement
//!   body against its substatement table, expand groupings and typedef
//!   chains under circular-reference guards, compile extension instances
//!   through their registered plugins, and defer forward-dependent
//!   constructs.
//! - **Resolution pass**: drain the deferred sets against the completed
//!   structure, reporting every outstanding reference of one attempt.
//!
//! ## Modules
//!
//! - [`compile`]: the module compilation driver
//! - [`context`]: per-compilation mutable state ([`CompileCtx`])
//! - [`path`]: diagnostic path tracking
//! - [`guard`]: circular-reference guards
//! - [`unres`]: deferred-resolution sets
//! - [`substmt`]: the generic substatement compiler
//! - [`builtin`]: built-in substatement tables

pub mod builtin;
pub mod compile;
pub mod context;
pub mod guard;
pub mod path;
pub mod substmt;
pub mod unres;

pub use builtin::builtin_table;
pub use compile::{compile_module, compile_module_with_options};
pub use context::{CompileCtx, CompileOptions, compile_extension_instance};
pub use guard::RefGuard;
pub use path::{MAX_PATH_LEN, PathTracker};
pub use substmt::compile_substatements;
pub use unres::{Deferred, DeferredSet, ResolutionPhase};

// Re-export the error type from core for convenience.
pub use modelscript_core::CompileError;
