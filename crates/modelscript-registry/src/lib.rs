//! ModelScript registry crate.
//!
//! The library-wide context and the extension plugin registry: everything
//! that outlives a single module compilation. Per-compilation state lives
//! in `modelscript-compiler`; the shared data model and the plugin contract
//! live in `modelscript-core` and are re-exported here for plugin authors.

pub mod context;
pub mod registry;

pub use context::Context;
pub use registry::ExtensionRegistry;

// Re-export the plugin contract from core for convenience.
pub use modelscript_core::plugin::{
    EXTENSION_API_VERSION, ExtCompileCtx, ExtensionPlugin, PluginDescriptor,
};
