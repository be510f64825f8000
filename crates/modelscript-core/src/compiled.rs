//! The compiled schema data model.
//!
//! Everything here is immutable once `compile_module` returns: a
//! [`CompiledModule`] is safe for unsynchronized concurrent reads and is the
//! only artifact retained after the compile context is discarded (plus the
//! parsed grouping bodies, which are kept so other modules can instantiate
//! them later).

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use log::warn;

use crate::data::DataNode;
use crate::error::ValidationError;
use crate::parsed::ParsedStmt;
use crate::plugin::PluginDescriptor;
use crate::substmt::CompiledSubstmts;

/// Built-in types of the modeling language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Decimal64,
    String,
    Boolean,
    Empty,
    Leafref,
}

impl BuiltinType {
    /// Map a type-statement argument onto a built-in type.
    pub fn from_keyword(name: &str) -> Option<Self> {
        Some(match name {
            "int32" => BuiltinType::Int32,
            "int64" => BuiltinType::Int64,
            "uint32" => BuiltinType::Uint32,
            "uint64" => BuiltinType::Uint64,
            "decimal64" => BuiltinType::Decimal64,
            "string" => BuiltinType::String,
            "boolean" => BuiltinType::Boolean,
            "empty" => BuiltinType::Empty,
            "leafref" => BuiltinType::Leafref,
            _ => return None,
        })
    }

    /// Whether a canonical value is parseable as this type.
    pub fn accepts(self, value: &str) -> bool {
        match self {
            BuiltinType::Int32 => value.parse::<i32>().is_ok(),
            BuiltinType::Int64 => value.parse::<i64>().is_ok(),
            BuiltinType::Uint32 => value.parse::<u32>().is_ok(),
            BuiltinType::Uint64 => value.parse::<u64>().is_ok(),
            BuiltinType::Decimal64 => value.parse::<f64>().is_ok(),
            BuiltinType::Boolean => value == "true" || value == "false",
            BuiltinType::Empty => value.is_empty(),
            BuiltinType::String | BuiltinType::Leafref => true,
        }
    }
}

/// A resolved type: the name as written plus the built-in type its typedef
/// chain bottoms out in.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledType {
    /// Type name as written in the source.
    pub name: String,
    /// The built-in type at the end of the chain.
    pub base: BuiltinType,
    /// Target path, for leafrefs.
    pub path: Option<String>,
}

/// A compiled typedef.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTypedef {
    pub name: String,
    /// Module the typedef is defined in.
    pub module: String,
    pub base: CompiledType,
    pub units: Option<String>,
    pub default: Option<String>,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub status: Status,
}

/// Definition lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Current,
    Deprecated,
    Obsolete,
}

impl Status {
    /// Parse a status-statement argument.
    pub fn from_arg(arg: &str) -> Option<Self> {
        Some(match arg {
            "current" => Status::Current,
            "deprecated" => Status::Deprecated,
            "obsolete" => Status::Obsolete,
            _ => return None,
        })
    }
}

/// Kind of a compiled data node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Container,
    Leaf,
    LeafList,
    List,
}

/// A compiled schema data node.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledNode {
    pub kind: NodeKind,
    pub name: String,
    /// Module whose namespace the definition belongs to. Differs from the
    /// owning module for nodes instantiated from a foreign grouping.
    pub module: String,
    pub config: bool,
    pub mandatory: bool,
    pub min_elements: Option<u32>,
    pub max_elements: Option<u32>,
    /// Resolved type, for leaf and leaf-list nodes.
    pub node_type: Option<CompiledType>,
    pub units: Option<String>,
    pub default: Option<String>,
    pub musts: Vec<String>,
    pub when: Option<String>,
    /// Key leaf names, for lists.
    pub keys: Vec<String>,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub status: Status,
    pub children: Vec<CompiledNode>,
    /// Indices into [`CompiledModule::extensions`] of the instances scoped
    /// to this node.
    pub ext_ids: Vec<usize>,
}

impl CompiledNode {
    /// Direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&CompiledNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// A compiled extension definition (the `extension` statement itself, not
/// an instance of its use).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionDef {
    pub name: String,
    /// Name of the argument the extension takes, if any.
    pub argument: Option<String>,
    pub description: Option<String>,
}

/// A grouping retained in parsed form for later instantiation.
///
/// Groupings compile in place of use, so a module exporting one must keep
/// its body available to importing modules.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupingDef {
    pub name: String,
    /// The grouping statement as parsed.
    pub body: ParsedStmt,
}

/// Lifecycle state of a compiled extension instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtState {
    /// Created from a parsed use; plugin not yet invoked.
    Declared,
    /// The plugin's compile behavior is running.
    Compiling,
    /// Compiled; validate may run any number of times.
    Compiled,
    /// Freed at teardown; never accessed again.
    Freed,
}

/// A compiled extension instance.
///
/// Compiled exactly once, validated zero or more times (read-only), freed
/// exactly once at module teardown.
pub struct CompiledExtInstance {
    module: String,
    name: String,
    argument: Option<String>,
    descriptor: Arc<PluginDescriptor>,
    state: ExtState,
    validations: AtomicU32,
    substmts: Option<CompiledSubstmts>,
    data: Option<Box<dyn Any + Send + Sync>>,
}

impl CompiledExtInstance {
    /// Create a declared instance with its identity filled in.
    pub fn new(
        module: impl Into<String>,
        name: impl Into<String>,
        argument: Option<String>,
        descriptor: Arc<PluginDescriptor>,
    ) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            argument,
            descriptor,
            state: ExtState::Declared,
            validations: AtomicU32::new(0),
            substmts: None,
            data: None,
        }
    }

    /// Defining module of the extension.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Extension name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `module:name`, as used in diagnostics.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.module, self.name)
    }

    /// The instance argument.
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// The descriptor of the implementing plugin.
    pub fn descriptor(&self) -> &Arc<PluginDescriptor> {
        &self.descriptor
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExtState {
        self.state
    }

    /// How many validate invocations this instance has seen.
    pub fn validations(&self) -> u32 {
        self.validations.load(Ordering::Relaxed)
    }

    /// Store plugin-private compiled data. Plugin API, during compile.
    pub fn set_data<T: Any + Send + Sync>(&mut self, data: T) {
        self.data = Some(Box::new(data));
    }

    /// Read plugin-private compiled data.
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.as_deref().and_then(|d| d.downcast_ref())
    }

    /// Take the plugin-private data out. Plugin API, during free.
    pub fn take_data(&mut self) -> Option<Box<dyn Any + Send + Sync>> {
        self.data.take()
    }

    /// Store the compiled substatements. Plugin API, during compile.
    pub fn set_substmts(&mut self, substmts: CompiledSubstmts) {
        self.substmts = Some(substmts);
    }

    /// Compiled substatements, if the plugin stored any.
    pub fn substmts(&self) -> Option<&CompiledSubstmts> {
        self.substmts.as_ref()
    }

    /// Transition `Declared → Compiling`. Compiler-internal.
    pub fn begin_compile(&mut self) {
        debug_assert_eq!(self.state, ExtState::Declared);
        self.state = ExtState::Compiling;
    }

    /// Transition `Compiling → Compiled`. Compiler-internal.
    pub fn finish_compile(&mut self) {
        debug_assert_eq!(self.state, ExtState::Compiling);
        self.state = ExtState::Compiled;
    }

    /// Record one validate invocation.
    pub fn record_validation(&self) {
        self.validations.fetch_add(1, Ordering::Relaxed);
    }

    /// Run the plugin's free behavior, exactly once.
    fn release(&mut self) {
        match self.state {
            ExtState::Freed => return,
            ExtState::Compiled => {}
            other => {
                warn!(
                    "freeing extension instance {} in state {other:?}",
                    self.qualified_name()
                );
            }
        }
        let descriptor = Arc::clone(&self.descriptor);
        descriptor.plugin().free(self);
        self.data = None;
        self.state = ExtState::Freed;
    }
}

impl std::fmt::Debug for CompiledExtInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledExtInstance")
            .field("module", &self.module)
            .field("name", &self.name)
            .field("argument", &self.argument)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// A fully compiled, immutable module.
#[derive(Debug)]
pub struct CompiledModule {
    pub name: String,
    pub revision: Option<String>,
    pub namespace: String,
    pub prefix: String,
    /// Imported module names.
    pub imports: Vec<String>,
    pub typedefs: Vec<CompiledTypedef>,
    pub groupings: Vec<GroupingDef>,
    pub extension_defs: Vec<ExtensionDef>,
    pub description: Option<String>,
    pub reference: Option<String>,
    /// Top-level data nodes.
    pub nodes: Vec<CompiledNode>,
    /// All extension instances of the module, in compilation order.
    pub extensions: Vec<CompiledExtInstance>,
    /// Indices of the instances scoped to the module statement itself.
    pub module_ext_ids: Vec<usize>,
}

impl CompiledModule {
    /// Look up a node by its schema path, e.g. `/interfaces/interface/name`.
    pub fn node(&self, path: &str) -> Option<&CompiledNode> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut node = self.nodes.iter().find(|n| n.name == strip_prefix(first))?;
        for segment in segments {
            node = node.child(strip_prefix(segment))?;
        }
        Some(node)
    }

    /// A module-level typedef by name.
    pub fn typedef(&self, name: &str) -> Option<&CompiledTypedef> {
        self.typedefs.iter().find(|t| t.name == name)
    }

    /// A retained grouping by name.
    pub fn grouping(&self, name: &str) -> Option<&GroupingDef> {
        self.groupings.iter().find(|g| g.name == name)
    }

    /// Extension instances scoped to a node.
    pub fn node_extensions<'a>(
        &'a self,
        node: &'a CompiledNode,
    ) -> impl Iterator<Item = &'a CompiledExtInstance> {
        node.ext_ids.iter().map(|&i| &self.extensions[i])
    }

    /// Invoke every extension validate behavior scoped to `node` against a
    /// data instance, aggregating the failures.
    ///
    /// Failures are local to the data instance; the compiled schema and
    /// sibling instances are unaffected.
    pub fn validate_node(&self, node: &CompiledNode, data: &DataNode) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for ext in self.node_extensions(node) {
            ext.record_validation();
            if let Err(err) = ext.descriptor().plugin().validate(ext, data) {
                errors.push(err);
            }
        }
        errors
    }
}

impl Drop for CompiledModule {
    fn drop(&mut self) {
        // Reverse compilation order: a later-compiled instance referencing
        // an earlier one's data is freed first.
        for ext in self.extensions.iter_mut().rev() {
            ext.release();
        }
    }
}

fn strip_prefix(segment: &str) -> &str {
    segment.rsplit(':').next().unwrap_or(segment)
}
