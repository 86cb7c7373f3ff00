//! The request-serving loop.

use crate::ServerSettings;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use xscript_core::{
    BlockResultCache, CleanupManager, Context, ContextStopper, Invoker, Registry, RequestData,
    Script, ScriptError, Transformer, WorkerPool,
};
use xscript_http::Encoder;

/// Drives one engine instance: a registry of block extensions, a
/// worker pool, the invocation pipeline and a parsed-script cache
/// keyed by path and mtime.
pub struct Server {
    registry: Arc<Registry>,
    settings: ServerSettings,
    encoder: Encoder,
    invoker: Invoker,
    cleanup: Arc<CleanupManager<Context>>,
    vhost_args: HashMap<String, String>,
    scripts: Mutex<HashMap<PathBuf, (Option<SystemTime>, Arc<Script>)>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("settings", &self.settings)
            .finish()
    }
}

impl Server {
    /// Assemble a server from its collaborators.
    pub fn new(
        settings: ServerSettings,
        registry: Registry,
        cache: Option<Arc<dyn BlockResultCache>>,
        transformer: Option<Arc<dyn Transformer>>,
    ) -> Self {
        let encoder = Encoder::new(&settings.legacy_encoding).unwrap_or_default();
        let pool = Arc::new(WorkerPool::new(settings.pool_size));
        let mut invoker = Invoker::new(pool);
        if let Some(cache) = cache {
            invoker = invoker.with_cache(cache);
        }
        if let Some(transformer) = transformer {
            invoker = invoker.with_transformer(transformer);
        }
        let vhost_args = std::env::vars()
            .filter(|(key, _)| key.starts_with("XSCRIPT_"))
            .collect();
        Self {
            registry: Arc::new(registry),
            cleanup: Arc::new(CleanupManager::new(settings.cleanup_queue_size)),
            settings,
            encoder,
            invoker,
            vhost_args,
            scripts: Mutex::new(HashMap::new()),
        }
    }

    /// The recovery encoder matching the configured legacy encoding.
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// The extension registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The settings this server runs with.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Resolve the script file serving a request: `SCRIPT_FILENAME`
    /// when absolute, otherwise `root_dir` + `SCRIPT_NAME`.
    pub fn resolve_script_path(&self, data: &RequestData) -> PathBuf {
        let filename = data.request.script_filename();
        if !filename.is_empty() && Path::new(filename).is_absolute() {
            return PathBuf::from(filename);
        }
        let name = data.request.script_name().trim_start_matches('/');
        self.settings.root_dir.join(name)
    }

    /// Fetch a parsed script, reloading when the file changed on disk.
    pub fn script(&self, path: &Path) -> Result<Arc<Script>, ScriptError> {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        {
            let scripts = self.scripts.lock();
            if let Some((cached_modified, script)) = scripts.get(path) {
                if *cached_modified == modified && modified.is_some() {
                    return Ok(script.clone());
                }
            }
        }
        let script = Script::load(&self.registry, path)?;
        self.scripts
            .lock()
            .insert(path.to_path_buf(), (modified, script.clone()));
        Ok(script)
    }

    /// Serve one request, leaving the rendered response in
    /// `data.response`. Returns the context for callers that inspect
    /// it (the offline runner's profile mode).
    ///
    /// `prepare` runs against the fresh context before invocation; the
    /// offline runner uses it to install stylesheet overrides.
    pub fn handle_with<F>(&self, data: RequestData, prepare: F) -> Result<Arc<Context>, ScriptError>
    where
        F: FnOnce(&Arc<Context>),
    {
        let path = self.resolve_script_path(&data);
        let response = data.response.clone();
        let script = match self.script(&path) {
            Ok(script) => script,
            Err(error) => {
                log::error!("cannot load script {}: {error}", path.display());
                let message = self
                    .registry
                    .mode()
                    .error_message(&error.to_string())
                    .to_owned();
                let _ = response.send_error(500, &message);
                return Err(error);
            }
        };

        let ctx = Context::with_vhost_args(
            script,
            data,
            self.settings.request_timeout,
            self.vhost_args.clone(),
        );
        let _stopper = ContextStopper::new(ctx.clone(), Some(self.cleanup.clone()));
        prepare(&ctx);

        if let Err(error) = self.invoker.invoke(&ctx) {
            log::error!("request failed: {}", error.what_info());
            let message = self
                .registry
                .mode()
                .error_message(&error.what_info())
                .to_owned();
            let _ = response.send_error(500, &message);
        }
        Ok(ctx)
    }

    /// Serve one request with no per-request preparation.
    pub fn handle(&self, data: RequestData) -> Result<Arc<Context>, ScriptError> {
        self.handle_with(data, |_| {})
    }
}
