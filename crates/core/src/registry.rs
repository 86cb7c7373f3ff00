//! The process-wide extension registry.
//!
//! Built once at startup and passed explicitly wherever it is needed;
//! there are no global registration tables in the hot path.

use crate::{BlockExtension, OperationMode, Policy, ScriptError};
use hashbrown::HashMap;
use std::sync::Arc;

/// Registered block extensions plus the process policy and operation
/// mode.
#[derive(Default)]
pub struct Registry {
    extensions: HashMap<&'static str, Arc<dyn BlockExtension>>,
    policy: Arc<Policy>,
    mode: OperationMode,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .field("mode", &self.mode)
            .finish()
    }
}

impl Registry {
    /// An empty registry with the default policy, in production mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a block extension under its element name.
    pub fn register(&mut self, extension: Arc<dyn BlockExtension>) -> Result<(), ScriptError> {
        let name = extension.name();
        if self.extensions.contains_key(name) {
            return Err(ScriptError::DuplicateExtension(name.to_owned()));
        }
        self.extensions.insert(name, extension);
        Ok(())
    }

    /// Look up an extension by element local name.
    pub fn extension(&self, name: &str) -> Option<&Arc<dyn BlockExtension>> {
        self.extensions.get(name)
    }

    /// The process policy.
    pub fn policy(&self) -> &Arc<Policy> {
        &self.policy
    }

    /// Replace the process policy.
    pub fn set_policy(&mut self, policy: Policy) {
        self.policy = Arc::new(policy);
    }

    /// The operation mode.
    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    /// Switch the operation mode.
    pub fn set_mode(&mut self, mode: OperationMode) {
        self.mode = mode;
    }
}
