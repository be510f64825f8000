//! CompileCtx - per-compilation mutable state.
//!
//! One `CompileCtx` exists per module compilation, exclusively owned by the
//! compiling thread and discarded once the immutable compiled module has
//! been produced. It aggregates the circular-reference guards, the deferred
//! resolution sets, the diagnostic path, and the definition-module tracking
//! needed while groupings from other modules are being instantiated.

use bitflags::bitflags;
use rustc_hash::FxHashSet;

use modelscript_core::compiled::CompiledExtInstance;
use modelscript_core::error::{CompileError, RefKind};
use modelscript_core::parsed::{ParsedExtInstance, ParsedStmt};
use modelscript_core::plugin::ExtCompileCtx;
use modelscript_core::stmt::StmtKind;
use modelscript_core::substmt::{CompiledSubstmts, SubstmtTable};
use modelscript_registry::Context;

use crate::guard::RefGuard;
use crate::path::PathTracker;
use crate::substmt::compile_substatements;
use crate::unres::DeferredSet;

bitflags! {
    /// Flags altering compilation strictness.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CompileOptions: u32 {
        /// Compiling a grouping in isolation rather than a fully
        /// instantiated module: target resolution that only makes sense at
        /// the point of use is skipped.
        const GROUPING = 0x01;
        /// Do not record default values for deferred checking.
        const NO_DEFAULTS = 0x02;
    }
}

/// A definition visible in some scope: a typedef or grouping, kept in
/// parsed form together with the module it was defined in.
#[derive(Debug, Clone)]
pub(crate) struct ScopedDef<'p> {
    pub module: String,
    pub name: &'p str,
    pub stmt: &'p ParsedStmt,
}

/// One lexical scope of typedef and grouping definitions.
#[derive(Debug, Default)]
pub(crate) struct Scope<'p> {
    pub typedefs: Vec<ScopedDef<'p>>,
    pub groupings: Vec<ScopedDef<'p>>,
}

/// The mutable state of one module compilation.
pub struct CompileCtx<'p> {
    /// The library-wide context; outlives this compile context.
    pub(crate) ctx: &'p Context,
    /// Name of the module under compilation.
    pub(crate) module: String,
    /// Revision of the module under compilation.
    pub(crate) revision: Option<String>,
    /// Module whose namespace the currently compiled definitions belong
    /// to. Reassigned while a foreign grouping's body is compiled.
    pub(crate) mod_def: String,
    /// Prefix → module mapping from the module's imports.
    pub(crate) imports: Vec<(String, String)>,
    /// Own prefix of the module under compilation.
    pub(crate) prefix: Option<String>,
    /// Grouping expansion guard.
    pub(crate) groupings: RefGuard,
    /// Typedef base-type chain guard.
    pub(crate) tpdf_chain: RefGuard,
    /// Unresolved targets and expressions (leafref, must, when).
    pub(crate) unres: DeferredSet,
    /// Incomplete default values.
    pub(crate) dflts: DeferredSet,
    /// Diagnostic path.
    pub(crate) path: PathTracker,
    /// Strictness flags.
    pub(crate) options: CompileOptions,
    /// Lexical scopes of typedefs and groupings, innermost last.
    pub(crate) scopes: Vec<Scope<'p>>,
    /// Node name chain from the module root, for relative references.
    pub(crate) node_chain: Vec<String>,
    /// Qualified names of groupings instantiated at least once.
    pub(crate) used_groupings: FxHashSet<String>,
    /// Extension instances compiled so far, in compilation order.
    pub(crate) extensions: Vec<CompiledExtInstance>,
}

impl<'p> CompileCtx<'p> {
    /// Create a context for compiling `module`.
    pub fn new(ctx: &'p Context, module: impl Into<String>, options: CompileOptions) -> Self {
        let module = module.into();
        Self {
            ctx,
            mod_def: module.clone(),
            module,
            revision: None,
            imports: Vec::new(),
            prefix: None,
            groupings: RefGuard::new(RefKind::Grouping),
            tpdf_chain: RefGuard::new(RefKind::Typedef),
            unres: DeferredSet::new(),
            dflts: DeferredSet::new(),
            path: PathTracker::new(),
            options,
            scopes: Vec::new(),
            node_chain: Vec::new(),
            used_groupings: FxHashSet::default(),
            extensions: Vec::new(),
        }
    }

    /// The library-wide context.
    pub fn context(&self) -> &'p Context {
        self.ctx
    }

    /// Compile options in effect.
    pub fn options(&self) -> CompileOptions {
        self.options
    }

    /// Run `f` with the definition module switched to `module`, restoring
    /// the previous value afterwards, error path included.
    pub(crate) fn with_definition_module<T>(
        &mut self,
        module: &str,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        let prev = std::mem::replace(&mut self.mod_def, module.to_string());
        let result = f(self);
        self.mod_def = prev;
        result
    }

    /// Run `f` under the grouping guard for `id`.
    ///
    /// The guard is left again whether `f` succeeds or fails, so an error
    /// deeper in the recursion never leaves an entry behind.
    pub(crate) fn with_grouping_guard<T>(
        &mut self,
        id: &str,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        self.groupings.enter(id, &self.path)?;
        let result = f(self);
        self.groupings.leave(id);
        result
    }

    /// Run `f` under the typedef-chain guard for `id`.
    pub(crate) fn with_typedef_guard<T>(
        &mut self,
        id: &str,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        self.tpdf_chain.enter(id, &self.path)?;
        let result = f(self);
        self.tpdf_chain.leave(id);
        result
    }

    /// Open a new lexical scope.
    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Close the innermost lexical scope.
    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Register a typedef in the innermost scope.
    pub(crate) fn register_typedef(&mut self, def: ScopedDef<'p>) -> Result<(), CompileError> {
        let scope = self.scopes.last_mut().expect("no open scope");
        if scope.typedefs.iter().any(|d| d.name == def.name) {
            return Err(CompileError::DuplicateDefinition {
                kind: StmtKind::Typedef,
                name: def.name.to_string(),
                path: self.path.render(),
            });
        }
        scope.typedefs.push(def);
        Ok(())
    }

    /// Register a grouping in the innermost scope.
    pub(crate) fn register_grouping(&mut self, def: ScopedDef<'p>) -> Result<(), CompileError> {
        let scope = self.scopes.last_mut().expect("no open scope");
        if scope.groupings.iter().any(|d| d.name == def.name) {
            return Err(CompileError::DuplicateDefinition {
                kind: StmtKind::Grouping,
                name: def.name.to_string(),
                path: self.path.render(),
            });
        }
        scope.groupings.push(def);
        Ok(())
    }

    /// Find a typedef by name, innermost scope first.
    pub(crate) fn find_typedef(&self, name: &str) -> Option<ScopedDef<'p>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.typedefs.iter().find(|d| d.name == name).cloned())
    }

    /// Find a grouping by name, innermost scope first.
    pub(crate) fn find_grouping(&self, name: &str) -> Option<ScopedDef<'p>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.groupings.iter().find(|d| d.name == name).cloned())
    }

    /// Map a written prefix to the module it imports, if any.
    pub(crate) fn import_by_prefix(&self, prefix: &str) -> Option<&str> {
        self.imports
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, m)| m.as_str())
    }

    /// Split a written name into its optional prefix and local part.
    pub(crate) fn split_prefix<'a>(name: &'a str) -> (Option<&'a str>, &'a str) {
        match name.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, name),
        }
    }
}

impl ExtCompileCtx for CompileCtx<'_> {
    fn compile_substatements(
        &mut self,
        table: &SubstmtTable,
        children: &[ParsedStmt],
    ) -> Result<CompiledSubstmts, CompileError> {
        compile_substatements(self, table, children)
    }

    fn path(&self) -> String {
        self.path.render()
    }

    fn module(&self) -> &str {
        &self.module
    }

    fn definition_module(&self) -> &str {
        &self.mod_def
    }
}

/// Compile the children of one extension instance against the plugin's
/// declared table. Free-standing counterpart of
/// [`ExtCompileCtx::compile_substatements`] for driver code that holds a
/// concrete context.
pub fn compile_extension_instance(
    cctx: &mut CompileCtx<'_>,
    table: &SubstmtTable,
    parsed: &ParsedExtInstance,
) -> Result<CompiledSubstmts, CompileError> {
    compile_substatements(cctx, table, &parsed.children)
}
