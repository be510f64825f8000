//! ModelScript - semantic compilation core of a schema-modeling-language
//! toolkit.
//!
//! Compiles parsed schema modules into fully resolved, validated, immutable
//! compiled schemas, with vendor-defined extensions handled through
//! registered plugins.
//!
//! ```
//! use modelscript::prelude::*;
//!
//! let ctx = Context::new();
//! let parsed = ParsedStmt::with_arg(StmtKind::Module, "demo")
//!     .child(ParsedStmt::with_arg(StmtKind::Namespace, "urn:demo"))
//!     .child(ParsedStmt::with_arg(StmtKind::Prefix, "d"))
//!     .child(
//!         ParsedStmt::with_arg(StmtKind::Leaf, "hostname")
//!             .child(ParsedStmt::with_arg(StmtKind::Type, "string")),
//!     );
//!
//! let module = compile_module(&ctx, &parsed).unwrap();
//! assert!(module.node("/hostname").is_some());
//! ```

pub use modelscript_compiler as compiler;
pub use modelscript_core as core;
pub use modelscript_registry as registry;

pub mod prelude {
    pub use modelscript_compiler::{
        CompileCtx, CompileOptions, PathTracker, compile_module, compile_module_with_options,
    };
    pub use modelscript_core::compiled::{
        BuiltinType, CompiledExtInstance, CompiledModule, CompiledNode, ExtState, NodeKind,
    };
    pub use modelscript_core::data::DataNode;
    pub use modelscript_core::error::{
        CompileError, ModelScriptError, RegistrationError, ValidationError,
    };
    pub use modelscript_core::input::{Input, InputKind};
    pub use modelscript_core::parsed::{ParsedExtInstance, ParsedStmt};
    pub use modelscript_core::plugin::{
        EXTENSION_API_VERSION, ExtCompileCtx, ExtensionPlugin, PluginDescriptor,
    };
    pub use modelscript_core::span::Span;
    pub use modelscript_core::stmt::StmtKind;
    pub use modelscript_core::substmt::{
        Cardinality, CompiledSubstmts, SubstmtDescriptor, SubstmtTable,
    };
    pub use modelscript_registry::{Context, ExtensionRegistry};
}

pub use prelude::*;
