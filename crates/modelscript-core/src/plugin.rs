//! Extension plugin contract.
//!
//! A plugin implements the three behaviors of one vendor-defined extension:
//! compile (once per instance, at schema compile time), validate (once per
//! applicable data instance, read-only), and free (once, at teardown).
//!
//! Plugins see the compiler only through [`ExtCompileCtx`], which exposes
//! the two helpers extension compilation needs: the generic substatement
//! compiler and the diagnostic path.

use std::sync::Arc;

use crate::compiled::CompiledExtInstance;
use crate::data::DataNode;
use crate::error::{CompileError, ValidationError};
use crate::parsed::{ParsedExtInstance, ParsedStmt};
use crate::substmt::{CompiledSubstmts, SubstmtTable};

/// Version of the extensions API this library implements.
///
/// A plugin descriptor carrying any other version is rejected at
/// registration, before any functional use.
pub const EXTENSION_API_VERSION: u32 = 1;

/// The slice of the compile context exposed to extension plugins.
pub trait ExtCompileCtx {
    /// Compile the children of an extension instance against a table.
    fn compile_substatements(
        &mut self,
        table: &SubstmtTable,
        children: &[ParsedStmt],
    ) -> Result<CompiledSubstmts, CompileError>;

    /// Rendered diagnostic path at the current compilation position.
    fn path(&self) -> String;

    /// Name of the module under compilation.
    fn module(&self) -> &str;

    /// Name of the module the currently compiled definitions belong to.
    ///
    /// Differs from [`module`](Self::module) while a grouping defined in
    /// another module is being instantiated.
    fn definition_module(&self) -> &str;
}

/// Behaviors of one extension, implemented per plugin.
///
/// Validate behaviors may be invoked concurrently for different data
/// instances against the same compiled, immutable extension instance; the
/// `Send + Sync` bound plus the shared references make reentrancy a
/// compile-time obligation rather than a convention.
pub trait ExtensionPlugin: Send + Sync {
    /// Compile the parsed extension instance into `compiled`.
    ///
    /// `compiled` is pre-allocated with the instance identity filled in;
    /// the plugin adds extension-specific data (and, typically, the result
    /// of [`ExtCompileCtx::compile_substatements`] over its declared
    /// substatement table). A failure aborts compilation of the entire
    /// enclosing module.
    fn compile(
        &self,
        cctx: &mut dyn ExtCompileCtx,
        parsed: &ParsedExtInstance,
        compiled: &mut CompiledExtInstance,
    ) -> Result<(), CompileError>;

    /// Decide whether a data instance is valid for this extension.
    ///
    /// Read-only; must not mutate the compiled extension data. The default
    /// accepts everything.
    fn validate(
        &self,
        _ext: &CompiledExtInstance,
        _node: &DataNode,
    ) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Release extension-specific data created by `compile`.
    ///
    /// Best-effort and non-failing; invoked exactly once per instance at
    /// module teardown. The default does nothing (dropping the boxed data
    /// is handled by the instance itself).
    fn free(&self, _ext: &mut CompiledExtInstance) {}
}

/// A plugin plus the metadata the registry checks before using it.
pub struct PluginDescriptor {
    id: &'static str,
    api_version: u32,
    plugin: Arc<dyn ExtensionPlugin>,
}

impl PluginDescriptor {
    /// Create a descriptor.
    pub fn new(id: &'static str, api_version: u32, plugin: Arc<dyn ExtensionPlugin>) -> Self {
        Self {
            id,
            api_version,
            plugin,
        }
    }

    /// Stable plugin identifier, mainly for diagnostics.
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// The extensions API version the plugin was built against.
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// The plugin behaviors.
    pub fn plugin(&self) -> &Arc<dyn ExtensionPlugin> {
        &self.plugin
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("id", &self.id)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}
