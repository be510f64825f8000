//! ModelScript core types.
//!
//! Shared data model and contracts used by the registry and the compiler:
//!
//! - [`span`]: source locations for diagnostics
//! - [`stmt`]: statement kinds and the canonical statement order
//! - [`parsed`]: the parse tree handed over by the parser
//! - [`substmt`]: substatement cardinality tables and compiled storage
//! - [`compiled`]: the immutable compiled schema model
//! - [`plugin`]: the extension plugin contract
//! - [`data`]: the minimal data-instance tree seen by validate behaviors
//! - [`error`]: the unified error hierarchy
//! - [`input`]: parser input handles (memory, file, filepath, reader)

pub mod compiled;
pub mod data;
pub mod error;
pub mod input;
pub mod parsed;
pub mod plugin;
pub mod span;
pub mod stmt;
pub mod substmt;

pub use compiled::{
    BuiltinType, CompiledExtInstance, CompiledModule, CompiledNode, CompiledType,
    CompiledTypedef, ExtState, ExtensionDef, GroupingDef, NodeKind, Status,
};
pub use data::DataNode;
pub use error::{
    CompileError, DeferredKind, ModelScriptError, RefKind, RegistrationError, ValidationError,
};
pub use input::{Input, InputKind};
pub use parsed::{ParsedExtInstance, ParsedStmt};
pub use plugin::{EXTENSION_API_VERSION, ExtCompileCtx, ExtensionPlugin, PluginDescriptor};
pub use span::Span;
pub use stmt::StmtKind;
pub use substmt::{Cardinality, CompiledStmt, CompiledSubstmts, SubstmtDescriptor, SubstmtTable};
