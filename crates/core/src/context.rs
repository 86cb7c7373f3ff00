//! Per-request execution contexts.

use crate::{CleanupManager, InvokeContext, InvokeError, RequestData, Script, State};
use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use xscript_http::{Request, Response};
use xscript_xml::Node;

/// Default per-request budget.
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct Results {
    slots: Vec<Option<InvokeContext>>,
    filled: usize,
}

/// The execution context of one request.
///
/// Owns the shared [`State`], the request/response handles, one result
/// slot per script block, the cancellation latch and the arena of XML
/// nodes produced by stylesheet extension functions. A context never
/// outlives its [`Script`]; `stopped` transitions monotonically from
/// false to true.
pub struct Context {
    script: Arc<Script>,
    data: RequestData,
    vhost_args: HashMap<String, String>,
    start: Instant,
    timeout: Duration,
    stopped: AtomicBool,
    apply_main_stylesheet: AtomicBool,
    apply_perblock_stylesheet: AtomicBool,
    main_stylesheet_override: Mutex<Option<String>>,
    // lock order: params ≺ results ≺ nodes
    params: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    results: Mutex<Results>,
    barrier: Condvar,
    nodes: Mutex<Vec<Node>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("script", &self.script.name())
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Context {
    /// A context with the default request budget.
    pub fn new(script: Arc<Script>, data: RequestData) -> Arc<Self> {
        Self::with_timeout(script, data, DEFAULT_REQUEST_TIMEOUT)
    }

    /// A context with an explicit request budget.
    pub fn with_timeout(script: Arc<Script>, data: RequestData, timeout: Duration) -> Arc<Self> {
        Self::with_vhost_args(script, data, timeout, HashMap::new())
    }

    /// A context with vhost arguments (`XSCRIPT_*` process
    /// environment) attached.
    pub fn with_vhost_args(
        script: Arc<Script>,
        data: RequestData,
        timeout: Duration,
        vhost_args: HashMap<String, String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script,
            data,
            vhost_args,
            start: Instant::now(),
            timeout,
            stopped: AtomicBool::new(false),
            apply_main_stylesheet: AtomicBool::new(true),
            apply_perblock_stylesheet: AtomicBool::new(true),
            main_stylesheet_override: Mutex::new(None),
            params: Mutex::new(HashMap::new()),
            results: Mutex::new(Results {
                slots: Vec::new(),
                filled: 0,
            }),
            barrier: Condvar::new(),
            nodes: Mutex::new(Vec::new()),
        })
    }

    /// The script being executed.
    pub fn script(&self) -> &Arc<Script> {
        &self.script
    }

    /// The inbound request.
    pub fn request(&self) -> &Request {
        &self.data.request
    }

    /// The response under construction.
    pub fn response(&self) -> &Response {
        &self.data.response
    }

    /// Shared handle to the response.
    pub fn response_arc(&self) -> Arc<Response> {
        self.data.response.clone()
    }

    /// The request state.
    pub fn state(&self) -> &State {
        &self.data.state
    }

    /// Shared handle to the state.
    pub fn state_arc(&self) -> Arc<State> {
        self.data.state.clone()
    }

    /// A vhost argument. Only `XSCRIPT_*` names are served; anything
    /// else is a runtime error.
    pub fn vhost_arg(&self, name: &str) -> Result<String, InvokeError> {
        if !name.starts_with("XSCRIPT_") {
            return Err(InvokeError::new(format!(
                "vhost arg is not allowed: {name}"
            )));
        }
        Ok(self.vhost_args.get(name).cloned().unwrap_or_default())
    }

    /// When the request started.
    pub fn start(&self) -> Instant {
        self.start
    }

    /// The configured per-request budget.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The absolute request deadline.
    pub fn deadline(&self) -> Instant {
        self.start + self.timeout
    }

    /// Remaining request budget in milliseconds; non-positive when the
    /// budget is exhausted.
    pub fn remained_ms(&self) -> i64 {
        let elapsed = self.start.elapsed().as_millis() as i64;
        self.timeout.as_millis() as i64 - elapsed
    }

    /// Request cancellation. Observers re-check at each suspension
    /// point; in-flight work completes but its results are discarded.
    pub fn stop_blocks(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _guard = self.results.lock();
        self.barrier.notify_all();
    }

    /// Whether cancellation was requested.
    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Declare how many result slots the barrier waits for.
    pub fn expect(&self, count: usize) {
        let mut results = self.results.lock();
        results.slots = Vec::with_capacity(count);
        results.slots.resize_with(count, || None);
        results.filled = 0;
    }

    /// Publish the result of block `index`. Returns false (and keeps
    /// the first result) when the slot was already filled.
    pub fn result(&self, index: usize, invoke_ctx: InvokeContext) -> bool {
        let mut results = self.results.lock();
        match results.slots.get_mut(index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(invoke_ctx);
                results.filled += 1;
                self.barrier.notify_all();
                true
            }
            _ => false,
        }
    }

    /// Wait until every declared slot is filled or the deadline
    /// passes. True when all results are in.
    pub fn wait(&self, deadline: Instant) -> bool {
        let mut results = self.results.lock();
        loop {
            if results.filled == results.slots.len() {
                return true;
            }
            if self.stopped() {
                return false;
            }
            if self.barrier.wait_until(&mut results, deadline).timed_out() {
                return results.filled == results.slots.len();
            }
        }
    }

    /// Take the collected results out of the barrier.
    pub fn take_results(&self) -> Vec<Option<InvokeContext>> {
        let mut results = self.results.lock();
        results.filled = 0;
        std::mem::take(&mut results.slots)
    }

    /// A typed parameter from the context's extension bag.
    pub fn param<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let params = self.params.lock();
        let value = params.get(name)?.clone();
        value.downcast::<T>().ok()
    }

    /// Insert a typed parameter. Names are unique; a second insert
    /// under the same name fails.
    pub fn insert_param<T: Send + Sync + 'static>(
        &self,
        name: &str,
        value: T,
    ) -> Result<(), InvokeError> {
        let mut params = self.params.lock();
        if params.contains_key(name) {
            return Err(InvokeError::new(format!(
                "duplicate context param: {name}"
            )));
        }
        params.insert(name.to_owned(), Arc::new(value));
        Ok(())
    }

    /// Fetch a typed parameter, creating it with `factory` on first
    /// use.
    pub fn param_or_create<T, F>(&self, name: &str, factory: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut params = self.params.lock();
        if let Some(existing) = params.get(name) {
            if let Ok(typed) = existing.clone().downcast::<T>() {
                return typed;
            }
        }
        let created = Arc::new(factory());
        params.insert(name.to_owned(), created.clone());
        created
    }

    /// Arena-own a transient node produced by an extension function;
    /// released when the context drops. Returns the arena index.
    pub fn add_node(&self, node: Node) -> usize {
        let mut nodes = self.nodes.lock();
        nodes.push(node);
        nodes.len() - 1
    }

    /// A clone of an arena node.
    pub fn node(&self, index: usize) -> Option<Node> {
        self.nodes.lock().get(index).cloned()
    }

    /// Suppress or allow the script's main stylesheet.
    pub fn set_apply_main_stylesheet(&self, apply: bool) {
        self.apply_main_stylesheet.store(apply, Ordering::Relaxed);
    }

    /// Whether the main stylesheet should run.
    pub fn apply_main_stylesheet(&self) -> bool {
        self.apply_main_stylesheet.load(Ordering::Relaxed)
    }

    /// Suppress or allow per-block stylesheets.
    pub fn set_apply_perblock_stylesheet(&self, apply: bool) {
        self.apply_perblock_stylesheet
            .store(apply, Ordering::Relaxed);
    }

    /// Whether per-block stylesheets should run.
    pub fn apply_perblock_stylesheet(&self) -> bool {
        self.apply_perblock_stylesheet.load(Ordering::Relaxed)
    }

    /// Override the script's main stylesheet for this request.
    pub fn set_main_stylesheet(&self, name: impl Into<String>) {
        *self.main_stylesheet_override.lock() = Some(name.into());
    }

    /// The effective main stylesheet: the per-request override or the
    /// script's own.
    pub fn main_stylesheet(&self) -> Option<String> {
        self.main_stylesheet_override
            .lock()
            .clone()
            .or_else(|| self.script.stylesheet().map(str::to_owned))
    }
}

/// Scoped guard around a context: on drop it stops the context's
/// blocks and hands the context to the cleanup manager for deferred
/// destruction.
pub struct ContextStopper {
    ctx: Option<Arc<Context>>,
    cleanup: Option<Arc<CleanupManager<Context>>>,
}

impl std::fmt::Debug for ContextStopper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStopper").finish()
    }
}

impl ContextStopper {
    /// Guard `ctx`, releasing it through `cleanup` when dropped.
    pub fn new(ctx: Arc<Context>, cleanup: Option<Arc<CleanupManager<Context>>>) -> Self {
        Self {
            ctx: Some(ctx),
            cleanup,
        }
    }
}

impl Drop for ContextStopper {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            ctx.stop_blocks();
            if let Some(cleanup) = &self.cleanup {
                cleanup.push(ctx);
            }
        }
    }
}
