//! The block invocation pipeline.

use crate::block::invoke_with_retries;
use crate::{
    BlockHandler, Context, InvokeContext, InvokeError, InvokeErrorKind, Meta, SkipCache, Tag,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use xscript_http::{KnownHeaderName, Request};
use xscript_xml::{Document, Node};

/// A cached block result.
#[derive(Debug, Clone)]
pub struct CachedResult {
    /// The result document.
    pub doc: Document,
    /// The meta document stored alongside.
    pub meta: Meta,
    /// The producer's tag.
    pub tag: Tag,
}

/// The outcome of a cache probe.
#[derive(Debug)]
pub enum CacheLookup {
    /// A fresh entry: use it without invoking the block.
    Fresh(CachedResult),
    /// A stale entry: invoke conditionally, reuse on "not modified",
    /// fall back to the stale copy if the refresh fails.
    Revalidate(CachedResult),
    /// Nothing usable.
    Miss,
}

/// The document cache as seen by the pipeline.
pub trait BlockResultCache: Send + Sync {
    /// Probe for a usable entry.
    fn lookup(&self, strategy: Option<&str>, key: &str, request: &Request) -> CacheLookup;

    /// Store a produced result.
    fn store(
        &self,
        strategy: Option<&str>,
        key: &str,
        request: &Request,
        result: &CachedResult,
        cache_time: Option<Duration>,
    );

    /// Record a result that ran but was excluded from storage.
    fn note_excluded(&self) {}
}

/// The stylesheet stage as seen by the pipeline.
pub trait Transformer: Send + Sync {
    /// Apply the named stylesheet to `doc` within `ctx`.
    fn apply(
        &self,
        stylesheet: &str,
        ctx: &Arc<Context>,
        doc: Document,
    ) -> Result<Document, InvokeError>;
}

/// Drives one script invocation: fans threaded blocks out to the
/// worker pool, runs sequential blocks in document order, waits on the
/// context barrier, splices results, applies stylesheets and writes
/// the response.
pub struct Invoker {
    pool: Arc<crate::WorkerPool>,
    cache: Option<Arc<dyn BlockResultCache>>,
    transformer: Option<Arc<dyn Transformer>>,
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("cache", &self.cache.is_some())
            .field("transformer", &self.transformer.is_some())
            .finish()
    }
}

impl Invoker {
    /// An invoker over the given worker pool, with no cache and no
    /// stylesheet stage.
    pub fn new(pool: Arc<crate::WorkerPool>) -> Self {
        Self {
            pool,
            cache: None,
            transformer: None,
        }
    }

    /// Attach a document cache.
    pub fn with_cache(mut self, cache: Arc<dyn BlockResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach a stylesheet stage.
    pub fn with_transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Run the context's script to completion and serialize the result
    /// into the response. An error return is request-fatal (500).
    pub fn invoke(&self, ctx: &Arc<Context>) -> Result<(), InvokeError> {
        let script = ctx.script().clone();
        let blocks = script.blocks();
        ctx.expect(blocks.len());

        // fan out the threaded blocks first
        for (index, handler) in blocks.iter().enumerate() {
            if !is_threaded(handler.as_ref()) {
                continue;
            }
            let worker_ctx = ctx.clone();
            let worker_handler = handler.clone();
            let worker_cache = self.cache.clone();
            let scheduled = self.pool.execute(move || {
                let invoke_ctx =
                    run_block(&worker_ctx, worker_handler.as_ref(), worker_cache.as_deref());
                worker_ctx.result(index, invoke_ctx);
            });
            if !scheduled {
                let invoke_ctx = run_block(ctx, handler.as_ref(), self.cache.as_deref());
                ctx.result(index, invoke_ctx);
            }
        }

        // sequential blocks run on the request thread, in document order
        for (index, handler) in blocks.iter().enumerate() {
            if is_threaded(handler.as_ref()) {
                continue;
            }
            let invoke_ctx = run_block(ctx, handler.as_ref(), self.cache.as_deref());
            ctx.result(index, invoke_ctx);
        }

        ctx.wait(ctx.deadline());
        let mut results = ctx.take_results();

        // a slot still empty after the barrier is a timed-out block
        for (index, slot) in results.iter_mut().enumerate() {
            if slot.is_none() {
                let handler = &blocks[index];
                let mut invoke_ctx = InvokeContext::new();
                invoke_ctx.set_error(
                    InvokeError::new("block is timed out").with(
                        "timeout",
                        handler.core().invoke_timeout().as_millis().to_string(),
                    ),
                );
                *slot = Some(invoke_ctx);
            }
        }

        // a critical failure anywhere aborts the request
        for slot in results.iter().flatten() {
            if let Some(error) = slot.error() {
                if error.kind() == InvokeErrorKind::Critical {
                    return Err(error.clone());
                }
            }
        }

        let mut doc = script.doc().clone();
        self.splice_results(ctx, blocks, results, &mut doc)?;

        if ctx.apply_main_stylesheet() {
            if let (Some(transformer), Some(stylesheet)) =
                (&self.transformer, ctx.main_stylesheet())
            {
                doc = transformer.apply(&stylesheet, ctx, doc)?;
            }
        }

        self.write_response(ctx, &doc)?;
        Ok(())
    }

    fn splice_results(
        &self,
        ctx: &Arc<Context>,
        blocks: &[Arc<dyn BlockHandler>],
        results: Vec<Option<InvokeContext>>,
        doc: &mut Document,
    ) -> Result<(), InvokeError> {
        // splice in reverse document order so earlier placeholder
        // paths stay valid while later ones are replaced
        for (index, slot) in results.into_iter().enumerate().rev() {
            let handler = &blocks[index];
            let core = handler.core();
            let Some(mut invoke_ctx) = slot else { continue };

            let replacement: Vec<Node> = if invoke_ctx.guard_failed() || invoke_ctx.skipped() {
                Vec::new()
            } else if let Some(error) = invoke_ctx.error() {
                vec![error.error_document()]
            } else {
                let mut result_doc = invoke_ctx.take_doc().unwrap_or_else(Document::empty);
                if ctx.apply_perblock_stylesheet() {
                    if let (Some(transformer), Some(stylesheet)) =
                        (&self.transformer, &core.xslt_name)
                    {
                        result_doc = transformer.apply(stylesheet, ctx, result_doc)?;
                    }
                }
                let mut nodes = match result_doc.into_root() {
                    Some(root) => match &core.xpointer {
                        Some(selector) => {
                            selector.select(&root).into_iter().cloned().collect()
                        }
                        None => vec![root],
                    },
                    None => Vec::new(),
                };
                if core.want_meta && !invoke_ctx.meta().is_empty() {
                    nodes.push(invoke_ctx.meta().to_node());
                }
                nodes
            };

            doc.splice_at(&core.dom_path, replacement)
                .map_err(|e| InvokeError::critical(format!("splice failed: {e}")))?;
        }
        Ok(())
    }

    fn write_response(&self, ctx: &Arc<Context>, doc: &Document) -> Result<(), InvokeError> {
        let response = ctx.response();
        if response.headers_sent() {
            // a block already produced the body (binary pass-through)
            return Ok(());
        }
        // a redirect issued by a stylesheet ships without a body
        if matches!(response.status(), 301 | 302 | 303 | 307 | 308) {
            return Ok(());
        }
        if response.header(KnownHeaderName::ContentType).is_none() {
            response
                .set_header(KnownHeaderName::ContentType, "text/xml; charset=utf-8")
                .map_err(|e| InvokeError::new(e.to_string()))?;
        }
        response
            .write(doc.serialize().as_bytes())
            .map_err(|e| InvokeError::new(e.to_string()))?;
        Ok(())
    }
}

fn is_threaded(handler: &dyn BlockHandler) -> bool {
    // a guard may depend on state written by earlier blocks, which
    // forces document order
    let core = handler.core();
    core.threaded && core.guards.is_empty()
}

fn run_block(
    ctx: &Arc<Context>,
    handler: &dyn BlockHandler,
    cache: Option<&dyn BlockResultCache>,
) -> InvokeContext {
    let started = Instant::now();
    let mut invoke_ctx = InvokeContext::new();

    if ctx.stopped() {
        invoke_ctx.set_skipped(true);
        return invoke_ctx;
    }
    let core = handler.core();
    for guard in &core.guards {
        if !guard.check(ctx.state()) {
            invoke_ctx.set_guard_failed(true);
            return invoke_ctx;
        }
    }
    if let Err(error) = handler.create_arg_list(ctx, &mut invoke_ctx) {
        invoke_ctx.set_error(error);
        return invoke_ctx;
    }
    invoke_ctx.set_tagged(core.tagged.tagged);

    let mut cache_key: Option<String> = None;
    let mut stale: Option<CachedResult> = None;
    if let Some(cache) = cache {
        if core.tagged.tagged {
            match compose_cache_key(ctx, handler, &invoke_ctx) {
                Ok(key) => {
                    match cache.lookup(core.tagged.strategy.as_deref(), &key, ctx.request()) {
                        CacheLookup::Fresh(result) => {
                            log::debug!("cache hit for {}.{}", core.extension, core.method);
                            invoke_ctx.set_tag(result.tag);
                            *invoke_ctx.meta_mut() = result.meta.clone();
                            invoke_ctx.set_doc(result.doc);
                            return invoke_ctx;
                        }
                        CacheLookup::Revalidate(result) => {
                            invoke_ctx.set_have_cached_copy(true);
                            invoke_ctx.set_tag(Tag {
                                last_modified: result.tag.last_modified,
                                ..Tag::new()
                            });
                            stale = Some(result);
                        }
                        CacheLookup::Miss => {}
                    }
                    cache_key = Some(key);
                }
                Err(SkipCache(reason)) => {
                    log::debug!("skipping cache: {reason}");
                    cache.note_excluded();
                }
            }
        }
    }

    match invoke_with_retries(handler, ctx, &mut invoke_ctx) {
        Ok(doc) => {
            let reused_stale = invoke_ctx.have_cached_copy() && !invoke_ctx.tag().modified;
            if reused_stale {
                if let Some(result) = stale.take() {
                    invoke_ctx.set_tag(Tag {
                        modified: false,
                        ..result.tag
                    });
                    *invoke_ctx.meta_mut() = result.meta.clone();
                    invoke_ctx.set_doc(result.doc.clone());
                    store_result(cache, ctx, handler, &cache_key, &invoke_ctx);
                }
            } else {
                invoke_ctx.meta_mut().set_elapsed_time(
                    started.elapsed().as_millis().min(i32::MAX as u128) as i32,
                );
                invoke_ctx.set_doc(doc);
                store_result(cache, ctx, handler, &cache_key, &invoke_ctx);
            }
        }
        Err(error) if error.kind() == InvokeErrorKind::Skipped => {
            invoke_ctx.set_skipped(true);
        }
        Err(error) => {
            if let Some(result) = stale.take() {
                // stale-while-revalidate: the refresh failed, serve
                // the stale copy
                log::warn!(
                    "refresh failed, serving stale copy: {}",
                    error.what_info()
                );
                invoke_ctx.set_tag(result.tag);
                *invoke_ctx.meta_mut() = result.meta.clone();
                invoke_ctx.set_doc(result.doc);
            } else {
                log::error!(
                    "block {}.{} failed: {}",
                    core.extension,
                    core.method,
                    error.what_info()
                );
                invoke_ctx.set_error(error.demoted());
            }
        }
    }
    invoke_ctx
}

fn store_result(
    cache: Option<&dyn BlockResultCache>,
    ctx: &Arc<Context>,
    handler: &dyn BlockHandler,
    cache_key: &Option<String>,
    invoke_ctx: &InvokeContext,
) {
    let (Some(cache), Some(key)) = (cache, cache_key) else {
        return;
    };
    let Some(doc) = invoke_ctx.doc() else { return };
    let core = handler.core();
    let result = CachedResult {
        doc: doc.clone(),
        meta: invoke_ctx.meta().clone(),
        tag: invoke_ctx.tag(),
    };
    cache.store(
        core.tagged.strategy.as_deref(),
        key,
        ctx.request(),
        &result,
        core.tagged.cache_time,
    );
}

fn compose_cache_key(
    ctx: &Arc<Context>,
    handler: &dyn BlockHandler,
    invoke_ctx: &InvokeContext,
) -> Result<String, SkipCache> {
    let core = handler.core();
    let script = ctx.script();

    let mut key = String::new();
    key.push_str(&script.name());
    key.push('|');
    key.push_str(&core.index.to_string());
    key.push('|');
    key.push_str(&core.extension);
    key.push('.');
    key.push_str(&core.method);

    // stylesheet edits must invalidate cached results
    if let Some(modified) = script.modified() {
        key.push('|');
        key.push_str(&format_mtime(modified));
    }
    let main_stylesheet = ctx.main_stylesheet();
    for stylesheet in [core.xslt_name.as_deref(), main_stylesheet.as_deref()]
        .into_iter()
        .flatten()
    {
        key.push('|');
        key.push_str(stylesheet);
        key.push(':');
        key.push_str(&file_mtime_key(stylesheet));
    }

    key.push('|');
    let mut first = true;
    for arg in invoke_ctx.args().iter() {
        if !first {
            key.push(':');
        }
        first = false;
        key.push_str(arg);
    }

    key.push_str(&handler.cache_key_extra(ctx, invoke_ctx)?);
    Ok(key)
}

fn file_mtime_key(path: &str) -> String {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(format_mtime)
        .unwrap_or_default()
}

fn format_mtime(time: std::time::SystemTime) -> String {
    time.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_default()
}
