//! Per-transform state.

use crate::{XsltFunctionRegistry, XsltValue};
use hashbrown::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use xscript_core::Context;

/// Upper bound on nested stylesheet application.
pub const MAX_TRANSFORM_DEPTH: usize = 10;

/// Ad-hoc string arguments a server or CLI exposes to stylesheets via
/// `get-local-arg`; installed into the context's parameter bag under
/// [`LocalArgs::PARAM_NAME`].
#[derive(Debug, Clone, Default)]
pub struct LocalArgs(pub HashMap<String, String>);

impl LocalArgs {
    /// The context-parameter name local args are registered under.
    pub const PARAM_NAME: &'static str = "xslt-local-args";
}

/// Binds one running transform to its request context and the
/// extension-function registry.
pub struct TransformContext {
    ctx: Arc<Context>,
    functions: Arc<XsltFunctionRegistry>,
    depth: AtomicUsize,
}

impl std::fmt::Debug for TransformContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformContext")
            .field("depth", &self.depth.load(Ordering::Relaxed))
            .finish()
    }
}

impl TransformContext {
    /// A transform context over `ctx` with the given functions.
    pub fn new(ctx: Arc<Context>, functions: Arc<XsltFunctionRegistry>) -> Self {
        Self {
            ctx,
            functions,
            depth: AtomicUsize::new(0),
        }
    }

    /// The bound request context.
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Remaining nesting budget for recursive application.
    pub fn remained_depth(&self) -> usize {
        MAX_TRANSFORM_DEPTH.saturating_sub(self.depth.load(Ordering::Relaxed))
    }

    /// Enter one nesting level; false when the budget is exhausted.
    pub fn enter(&self) -> bool {
        self.depth.fetch_add(1, Ordering::Relaxed) < MAX_TRANSFORM_DEPTH
    }

    /// Leave one nesting level.
    pub fn leave(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
    }

    /// Call an extension function by name.
    ///
    /// Failures never abort the transform: the error is logged against
    /// the current script and an empty result is returned, matching
    /// the XPath error model.
    pub fn call(&self, name: &str, args: &[XsltValue]) -> XsltValue {
        match self.functions.call(self, name, args) {
            Ok(value) => value,
            Err(error) => {
                log::error!(
                    "xslt extension {} failed in {}: {}",
                    name,
                    self.ctx.script().name(),
                    error
                );
                XsltValue::Empty
            }
        }
    }

    /// A local arg exposed by the server/CLI, if any.
    pub fn local_arg(&self, name: &str) -> Option<String> {
        let args = self.ctx.param::<LocalArgs>(LocalArgs::PARAM_NAME)?;
        args.0.get(name).cloned()
    }
}
