//! ExtensionRegistry - plugin lookup by defining module, revision, and name.
//!
//! Each entry maps a `(module, revision, name)` triple to a plugin
//! descriptor. The revision may be absent, meaning the plugin applies to
//! any revision of the module; an exact-revision entry always wins over the
//! revision-absent fallback. Multiple triples may share one descriptor (one
//! plugin, many revisions).

use std::sync::Arc;

use rustc_hash::FxHashMap;

use modelscript_core::error::RegistrationError;
use modelscript_core::plugin::{EXTENSION_API_VERSION, PluginDescriptor};

struct RegistryEntry {
    revision: Option<String>,
    descriptor: Arc<PluginDescriptor>,
}

/// Registry of extension plugins.
#[derive(Default)]
pub struct ExtensionRegistry {
    entries: FxHashMap<(String, String), Vec<RegistryEntry>>,
    count: usize,
}

impl ExtensionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin for `(module, revision, name)`.
    ///
    /// The descriptor's API version is checked unconditionally, before any
    /// functional use: a plugin built against an incompatible contract is
    /// rejected with [`RegistrationError::VersionMismatch`] even if its
    /// behaviors would otherwise work.
    pub fn register(
        &mut self,
        module: &str,
        revision: Option<&str>,
        name: &str,
        descriptor: Arc<PluginDescriptor>,
    ) -> Result<(), RegistrationError> {
        if descriptor.api_version() != EXTENSION_API_VERSION {
            return Err(RegistrationError::VersionMismatch {
                plugin: descriptor.id().to_string(),
                expected: EXTENSION_API_VERSION,
                found: descriptor.api_version(),
            });
        }

        let key = (module.to_string(), name.to_string());
        let entries = self.entries.entry(key).or_default();
        if entries
            .iter()
            .any(|e| e.revision.as_deref() == revision)
        {
            return Err(RegistrationError::DuplicateRegistration {
                module: module.to_string(),
                name: name.to_string(),
            });
        }

        entries.push(RegistryEntry {
            revision: revision.map(str::to_string),
            descriptor,
        });
        self.count += 1;
        Ok(())
    }

    /// Find the plugin for an extension use.
    ///
    /// Exact revision match is preferred; an entry registered without a
    /// revision matches any. `None` means the use must be rejected as an
    /// unknown extension.
    pub fn find(
        &self,
        module: &str,
        revision: Option<&str>,
        name: &str,
    ) -> Option<&Arc<PluginDescriptor>> {
        let entries = self
            .entries
            .get(&(module.to_string(), name.to_string()))?;

        if let Some(rev) = revision {
            if let Some(entry) = entries
                .iter()
                .find(|e| e.revision.as_deref() == Some(rev))
            {
                return Some(&entry.descriptor);
            }
        }
        entries
            .iter()
            .find(|e| e.revision.is_none())
            .map(|e| &e.descriptor)
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
