//! The compiled-stylesheet cache and the pipeline hookup.

use crate::{TransformContext, XsltEngine, XsltFunctionRegistry};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use xscript_core::{Context, InvokeError, Transformer};
use xscript_xml::Document;

struct CachedStylesheet {
    compiled: Arc<dyn crate::CompiledTransform>,
    modified: Option<SystemTime>,
}

/// Compiles stylesheets on demand, caches them by path and recompiles
/// when the file's mtime changes. Implements the pipeline's
/// [`Transformer`] seam.
pub struct StylesheetCache {
    engine: Arc<dyn XsltEngine>,
    functions: Arc<XsltFunctionRegistry>,
    cache: Mutex<HashMap<PathBuf, Arc<CachedStylesheet>>>,
}

impl std::fmt::Debug for StylesheetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StylesheetCache")
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}

impl StylesheetCache {
    /// A cache over `engine` with the builtin function set.
    pub fn new(engine: Arc<dyn XsltEngine>) -> Self {
        Self::with_functions(engine, Arc::new(XsltFunctionRegistry::with_builtins()))
    }

    /// A cache over `engine` with a custom function registry.
    pub fn with_functions(
        engine: Arc<dyn XsltEngine>,
        functions: Arc<XsltFunctionRegistry>,
    ) -> Self {
        Self {
            engine,
            functions,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The extension-function registry transforms run against.
    pub fn functions(&self) -> &Arc<XsltFunctionRegistry> {
        &self.functions
    }

    fn get(&self, name: &str) -> Result<Arc<CachedStylesheet>, crate::XsltError> {
        let path = PathBuf::from(name);
        let modified = file_mtime(&path);
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.get(&path) {
                if entry.modified == modified {
                    return Ok(entry.clone());
                }
            }
        }
        let compiled = self.engine.compile(&path)?;
        let entry = Arc::new(CachedStylesheet { compiled, modified });
        self.cache.lock().insert(path, entry.clone());
        Ok(entry)
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl Transformer for StylesheetCache {
    fn apply(
        &self,
        stylesheet: &str,
        ctx: &Arc<Context>,
        doc: Document,
    ) -> Result<Document, InvokeError> {
        let entry = self
            .get(stylesheet)
            .map_err(|e| InvokeError::new(e.to_string()).with("stylesheet", stylesheet))?;
        let tc = TransformContext::new(ctx.clone(), self.functions.clone());
        if !tc.enter() {
            return Err(InvokeError::new("transform depth exceeded")
                .with("stylesheet", stylesheet));
        }
        let result = entry
            .compiled
            .apply(&doc, &tc)
            .map_err(|e| InvokeError::new(e.to_string()).with("stylesheet", stylesheet));
        tc.leave();
        result
    }
}
