//! Server settings.

use std::path::{Path, PathBuf};
use std::time::Duration;
use xscript_core::OperationMode;

/// Process-level knobs of the engine.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Document root scripts are resolved against.
    pub root_dir: PathBuf,
    /// Worker threads for threaded blocks.
    pub pool_size: usize,
    /// Capacity of each cleanup queue.
    pub cleanup_queue_size: usize,
    /// Local cache tier capacity (entries).
    pub cache_size: usize,
    /// Per-request budget.
    pub request_timeout: Duration,
    /// Legacy encoding for non-UTF-8 input recovery.
    pub legacy_encoding: String,
    /// Production or development error verbosity.
    pub mode: OperationMode,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/usr/local/www"),
            pool_size: 8,
            cleanup_queue_size: 64,
            cache_size: 256,
            request_timeout: Duration::from_secs(30),
            legacy_encoding: "cp1251".to_owned(),
            mode: OperationMode::Production,
        }
    }
}

impl ServerSettings {
    /// Read settings from a `key = value` file; unknown keys are
    /// ignored, malformed numbers are an error.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let mut settings = Self::default();
        let text = std::fs::read_to_string(path)?;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            let bad = |what: &str| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("bad {what} value: {value}"),
                )
            };
            match key {
                "root-dir" => settings.root_dir = PathBuf::from(value),
                "pool-size" => {
                    settings.pool_size = value.parse().map_err(|_| bad("pool-size"))?
                }
                "cleanup-queue-size" => {
                    settings.cleanup_queue_size =
                        value.parse().map_err(|_| bad("cleanup-queue-size"))?
                }
                "cache-size" => {
                    settings.cache_size = value.parse().map_err(|_| bad("cache-size"))?
                }
                "request-timeout-ms" => {
                    let millis: u64 = value.parse().map_err(|_| bad("request-timeout-ms"))?;
                    settings.request_timeout = Duration::from_millis(millis);
                }
                "legacy-encoding" => settings.legacy_encoding = value.to_owned(),
                "mode" => {
                    settings.mode = if value.eq_ignore_ascii_case("development") {
                        OperationMode::Development
                    } else {
                        OperationMode::Production
                    }
                }
                _ => {}
            }
        }
        Ok(settings)
    }
}
