//! Library-wide context.
//!
//! A [`Context`] owns everything that outlives a single module compilation:
//! the extension plugin registry, the store of compiled modules, and the
//! inter-module dependency graph. There is no process-global state; the
//! registry is constructed with the context and dropped with it, and
//! dropping the context tears down every stored module (which frees its
//! extension instances in reverse compilation order).
//!
//! # Dependency order
//!
//! Compiling a module requires its imports to be in the store already, so
//! module compilation follows a partial order. The graph still tracks
//! pending imports (edges to modules not yet inserted) so that manually
//! staged module sets surface import cycles as a hard error instead of a
//! deadlock.

use std::sync::Arc;

use log::debug;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use rustc_hash::FxHashMap;

use modelscript_core::compiled::CompiledModule;
use modelscript_core::data::DataNode;
use modelscript_core::error::{CompileError, ModelScriptError, RegistrationError, ValidationError};
use modelscript_core::plugin::PluginDescriptor;

use crate::registry::ExtensionRegistry;

/// The library-wide context.
#[derive(Default)]
pub struct Context {
    extensions: ExtensionRegistry,
    modules: FxHashMap<String, Arc<CompiledModule>>,
    graph: StableDiGraph<String, ()>,
    graph_ids: FxHashMap<String, NodeIndex>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension plugin for `(module, revision, name)`.
    pub fn register_extension(
        &mut self,
        module: &str,
        revision: Option<&str>,
        name: &str,
        descriptor: Arc<PluginDescriptor>,
    ) -> Result<(), RegistrationError> {
        self.extensions.register(module, revision, name, descriptor)
    }

    /// The extension plugin registry.
    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// Insert a compiled module into the store.
    ///
    /// Records dependency edges for the module's imports; an edge that
    /// closes a cycle is rejected with [`CompileError::CyclicImport`] and
    /// the module is not inserted.
    pub fn insert_module(
        &mut self,
        module: CompiledModule,
    ) -> Result<Arc<CompiledModule>, CompileError> {
        let name = module.name.clone();
        let node = self.graph_node(&name);
        let mut added = Vec::new();
        for import in &module.imports {
            let dep = self.graph_node(import);
            added.push(self.graph.add_edge(node, dep, ()));
        }

        if is_cyclic_directed(&self.graph) {
            for edge in added {
                self.graph.remove_edge(edge);
            }
            return Err(CompileError::CyclicImport { module: name });
        }

        debug!("storing compiled module {name}");
        let module = Arc::new(module);
        self.modules.insert(name, Arc::clone(&module));
        Ok(module)
    }

    /// A compiled module by name.
    pub fn module(&self, name: &str) -> Option<&Arc<CompiledModule>> {
        self.modules.get(name)
    }

    /// Remove a module from the store.
    ///
    /// Teardown (freeing its extension instances) happens when the last
    /// reference to the module is dropped.
    pub fn remove_module(&mut self, name: &str) -> Option<Arc<CompiledModule>> {
        if let Some(&node) = self.graph_ids.get(name) {
            self.graph.remove_node(node);
            self.graph_ids.remove(name);
        }
        self.modules.remove(name)
    }

    /// Names of stored modules in dependency order, dependencies first.
    pub fn compile_order(&self) -> Result<Vec<String>, CompileError> {
        let order = toposort(&self.graph, None).map_err(|cycle| CompileError::CyclicImport {
            module: self.graph[cycle.node_id()].clone(),
        })?;
        Ok(order
            .into_iter()
            .rev()
            .map(|n| self.graph[n].clone())
            .filter(|name| self.modules.contains_key(name))
            .collect())
    }

    /// Validate a data instance against the extensions scoped to a node.
    pub fn validate(
        &self,
        module: &str,
        node_path: &str,
        data: &DataNode,
    ) -> Result<Vec<ValidationError>, ModelScriptError> {
        let module = self
            .modules
            .get(module)
            .ok_or_else(|| ModelScriptError::UnknownSchemaNode {
                module: module.to_string(),
                path: node_path.to_string(),
            })?;
        let node = module
            .node(node_path)
            .ok_or_else(|| ModelScriptError::UnknownSchemaNode {
                module: module.name.clone(),
                path: node_path.to_string(),
            })?;
        Ok(module.validate_node(node, data))
    }

    fn graph_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&node) = self.graph_ids.get(name) {
            return node;
        }
        let node = self.graph.add_node(name.to_string());
        self.graph_ids.insert(name.to_string(), node);
        node
    }
}
