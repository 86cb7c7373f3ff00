//! The pluggable XSLT processor interface.
//!
//! The engine itself is an external collaborator; deployments bind a
//! real processor here. The crate ships two built-ins: [`NullEngine`]
//! (identity, for setups that compose without transforming) and
//! [`FnEngine`] (closure-backed, used throughout the test suites).

use crate::{TransformContext, XsltError};
use std::path::Path;
use std::sync::Arc;
use xscript_xml::Document;

/// A compiled stylesheet ready for application.
pub trait CompiledTransform: Send + Sync {
    /// Apply to `doc` within a transform context.
    fn apply(&self, doc: &Document, tc: &TransformContext) -> Result<Document, XsltError>;
}

/// Compiles stylesheets by path.
pub trait XsltEngine: Send + Sync {
    /// Compile the stylesheet at `path`.
    fn compile(&self, path: &Path) -> Result<Arc<dyn CompiledTransform>, XsltError>;
}

/// The identity engine: every stylesheet "compiles" to a transform
/// that returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEngine;

struct Identity;

impl CompiledTransform for Identity {
    fn apply(&self, doc: &Document, _tc: &TransformContext) -> Result<Document, XsltError> {
        Ok(doc.clone())
    }
}

impl XsltEngine for NullEngine {
    fn compile(&self, _path: &Path) -> Result<Arc<dyn CompiledTransform>, XsltError> {
        Ok(Arc::new(Identity))
    }
}

type TransformFn =
    dyn Fn(&Document, &TransformContext) -> Result<Document, XsltError> + Send + Sync;

/// A closure-backed engine: every stylesheet path compiles to the same
/// transform function. Test suites use it to stand in for a real
/// processor while still exercising the whole stylesheet stage.
#[derive(Clone)]
pub struct FnEngine {
    transform: Arc<TransformFn>,
}

impl std::fmt::Debug for FnEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnEngine").finish()
    }
}

impl FnEngine {
    /// An engine applying `transform` for every stylesheet.
    pub fn new<F>(transform: F) -> Self
    where
        F: Fn(&Document, &TransformContext) -> Result<Document, XsltError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            transform: Arc::new(transform),
        }
    }
}

struct FnTransform {
    transform: Arc<TransformFn>,
}

impl CompiledTransform for FnTransform {
    fn apply(&self, doc: &Document, tc: &TransformContext) -> Result<Document, XsltError> {
        (self.transform)(doc, tc)
    }
}

impl XsltEngine for FnEngine {
    fn compile(&self, _path: &Path) -> Result<Arc<dyn CompiledTransform>, XsltError> {
        Ok(Arc::new(FnTransform {
            transform: self.transform.clone(),
        }))
    }
}
