//! Parse-tree types handed over by the parser.
//!
//! The compiler consumes these and never mutates them; they capture exactly
//! what was written in the source, plus the location needed for diagnostics.

use crate::span::Span;
use crate::stmt::StmtKind;

/// A parsed statement: a kind tag, an optional argument, and its children
/// in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStmt {
    /// Statement kind.
    pub kind: StmtKind,
    /// The statement argument as written, if any.
    pub arg: Option<String>,
    /// Source location of the keyword.
    pub span: Span,
    /// Child statements in source order.
    pub children: Vec<ParsedStmt>,
    /// Extension-instance uses attached to this statement, in source order.
    pub extensions: Vec<ParsedExtInstance>,
}

impl ParsedStmt {
    /// Create a statement with no argument and no children.
    pub fn new(kind: StmtKind) -> Self {
        Self {
            kind,
            arg: None,
            span: Span::default(),
            children: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// Create a statement with an argument.
    pub fn with_arg(kind: StmtKind, arg: impl Into<String>) -> Self {
        let mut stmt = Self::new(kind);
        stmt.arg = Some(arg.into());
        stmt
    }

    /// Set the source span.
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Append a child statement.
    pub fn child(mut self, child: ParsedStmt) -> Self {
        self.children.push(child);
        self
    }

    /// Append an extension-instance use.
    pub fn extension(mut self, ext: ParsedExtInstance) -> Self {
        self.extensions.push(ext);
        self
    }

    /// Children of the given kind, in source order.
    pub fn children_of(&self, kind: StmtKind) -> impl Iterator<Item = &ParsedStmt> {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    /// Argument of the first child of the given kind.
    pub fn child_arg(&self, kind: StmtKind) -> Option<&str> {
        self.children_of(kind).next().and_then(|c| c.arg.as_deref())
    }
}

/// A parsed use of an extension.
///
/// `module` names the module the extension is defined in; the parser is
/// responsible for resolving the written prefix to that module name.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExtInstance {
    /// Name of the module defining the extension.
    pub module: String,
    /// Extension name.
    pub name: String,
    /// The instance argument as written, if any.
    pub arg: Option<String>,
    /// Source location of the instance.
    pub span: Span,
    /// Child statements of the instance, in source order.
    pub children: Vec<ParsedStmt>,
}

impl ParsedExtInstance {
    /// Create an extension instance.
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            arg: None,
            span: Span::default(),
            children: Vec::new(),
        }
    }

    /// Set the instance argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.arg = Some(arg.into());
        self
    }

    /// Set the source span.
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Append a child statement.
    pub fn child(mut self, child: ParsedStmt) -> Self {
        self.children.push(child);
        self
    }
}
