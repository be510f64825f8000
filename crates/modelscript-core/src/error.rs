//! Unified error types for ModelScript.
//!
//! One error enum per phase of schema processing:
//!
//! ```text
//! ModelScriptError (top-level wrapper)
//! ├── CompileError      - Schema compilation errors
//! ├── RegistrationError - Extension plugin registration errors
//! ├── ValidationError   - Per-data-instance extension validation failures
//! └── io::Error         - Input layer errors
//! ```
//!
//! Structural compile errors carry the rendered schema path at the point of
//! failure, so callers can report an exact location without holding any
//! compiler state.

use thiserror::Error;

use crate::stmt::StmtKind;

/// Which kind of reference a circular-reference guard protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// Grouping expansion via `uses`.
    Grouping,
    /// Typedef base-type chain.
    Typedef,
}

impl std::fmt::Display for RefKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RefKind::Grouping => "grouping",
            RefKind::Typedef => "typedef",
        })
    }
}

/// Which kind of obligation a deferred-resolution entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeferredKind {
    /// A leafref target path.
    LeafrefTarget,
    /// A `must` expression.
    Must,
    /// A `when` expression.
    When,
    /// A default value not checkable until its type is resolved.
    Default,
}

impl std::fmt::Display for DeferredKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DeferredKind::LeafrefTarget => "leafref target",
            DeferredKind::Must => "must expression",
            DeferredKind::When => "when expression",
            DeferredKind::Default => "default value",
        })
    }
}

/// Errors aborting the compilation of a module.
///
/// Except for [`CompileError::Unresolved`], the first structural error wins:
/// compilation unwinds and no partially-compiled schema is published.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A grouping or typedef directly or indirectly contains itself.
    #[error("circular {kind} reference \"{name}\" ({path})")]
    CircularReference {
        kind: RefKind,
        name: String,
        path: String,
    },

    /// A mandatory substatement is missing.
    #[error("missing mandatory substatement \"{stmt}\" ({path})")]
    MissingSubstatement { stmt: StmtKind, path: String },

    /// A substatement limited to a single occurrence appears repeatedly.
    #[error("substatement \"{stmt}\" must not appear more than once ({path})")]
    TooManyInstances { stmt: StmtKind, path: String },

    /// A substatement not declared as legal by the statement's table.
    #[error("unsupported substatement \"{stmt}\" ({path})")]
    UnsupportedStatement { stmt: StmtKind, path: String },

    /// A statement argument is missing or malformed.
    #[error("invalid argument for \"{stmt}\": {reason} ({path})")]
    InvalidArgument {
        stmt: StmtKind,
        reason: String,
        path: String,
    },

    /// Two definitions of the same kind share a name in one scope.
    #[error("duplicate definition of {kind} \"{name}\" ({path})")]
    DuplicateDefinition {
        kind: StmtKind,
        name: String,
        path: String,
    },

    /// An extension use does not match any registered plugin.
    #[error("unknown extension \"{module}:{name}\" ({path})")]
    UnknownExtension {
        module: String,
        name: String,
        path: String,
    },

    /// An extension plugin rejected its parsed instance data.
    #[error("extension \"{ext}\" rejected its data: {reason} ({path})")]
    InvalidExtensionData {
        ext: String,
        reason: String,
        path: String,
    },

    /// A deferred obligation could not be resolved during the drain pass.
    #[error("unresolved {kind} \"{expr}\" ({path})")]
    UnresolvedTarget {
        kind: DeferredKind,
        expr: String,
        path: String,
    },

    /// Aggregate of all drain-pass failures of one compilation attempt.
    #[error("{} unresolved reference(s) after module compilation", .0.len())]
    Unresolved(Vec<CompileError>),

    /// Two descriptors in one substatement table claim the same kind.
    #[error("duplicate substatement descriptor for \"{stmt}\"")]
    DuplicateDescriptor { stmt: StmtKind },

    /// A substatement table is not listed in canonical statement order.
    #[error("substatement descriptor \"{stmt}\" breaks canonical statement order")]
    TableOrder { stmt: StmtKind },

    /// A module imports a module that has not been compiled yet.
    #[error("module \"{module}\" imports \"{import}\" which is not compiled")]
    MissingDependency { module: String, import: String },

    /// Inter-module imports form a cycle.
    #[error("module \"{module}\" participates in an import cycle")]
    CyclicImport { module: String },
}

/// Errors rejecting an extension plugin registration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// The plugin was built against an incompatible extensions API.
    #[error("plugin \"{plugin}\" implements extensions API version {found}, expected {expected}")]
    VersionMismatch {
        plugin: String,
        expected: u32,
        found: u32,
    },

    /// The exact (module, revision, name) triple is already registered.
    #[error("extension \"{module}:{name}\" is already registered for this revision")]
    DuplicateRegistration { module: String, name: String },
}

/// A per-data-instance validation failure reported by an extension plugin.
///
/// Local to the offending data instance; never invalidates the compiled
/// schema or sibling instances.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("extension \"{ext}\" rejected data node \"{node}\": {reason}")]
pub struct ValidationError {
    /// `module:name` of the rejecting extension.
    pub ext: String,
    /// Name of the offending data node.
    pub node: String,
    /// Plugin-provided reason.
    pub reason: String,
}

impl ValidationError {
    /// Create a validation error.
    pub fn new(
        ext: impl Into<String>,
        node: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            ext: ext.into(),
            node: node.into(),
            reason: reason.into(),
        }
    }
}

/// Top-level error wrapper for unified handling.
#[derive(Debug, Error)]
pub enum ModelScriptError {
    /// Schema compilation failed.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Extension plugin registration failed.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Extension data validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A schema node lookup failed.
    #[error("unknown schema node \"{path}\" in module \"{module}\"")]
    UnknownSchemaNode { module: String, path: String },

    /// The input layer failed.
    #[error("input error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_displays_path() {
        let err = CompileError::MissingSubstatement {
            stmt: StmtKind::Type,
            path: "/mod/hostname".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "missing mandatory substatement \"type\" (/mod/hostname)"
        );
    }

    #[test]
    fn unresolved_counts_entries() {
        let inner = CompileError::UnresolvedTarget {
            kind: DeferredKind::LeafrefTarget,
            expr: "/mod/missing".to_string(),
            path: "/mod/ref".to_string(),
        };
        let err = CompileError::Unresolved(vec![inner.clone(), inner]);
        assert_eq!(
            err.to_string(),
            "2 unresolved reference(s) after module compilation"
        );
    }

    #[test]
    fn wrapper_converts_phase_errors() {
        let err: ModelScriptError = RegistrationError::VersionMismatch {
            plugin: "acme".to_string(),
            expected: 1,
            found: 2,
        }
        .into();
        assert!(matches!(err, ModelScriptError::Registration(_)));
    }
}
