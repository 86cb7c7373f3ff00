//! The offline runner: renders one URL against the local document
//! root and writes the wire-format response to stdout.

use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use xscript_cache::DocCache;
use xscript_core::{Registry, RequestData};
use xscript_http::Request;
use xscript_http_block::HttpExtension;
use xscript_mist::MistExtension;
use xscript_server::{Server, ServerSettings};
use xscript_xslt::{NullEngine, StylesheetCache};

/// Offline request runner for xscript pages.
#[derive(Parser, Debug)]
#[command(name = "xscript-proc", version, about)]
struct Cli {
    /// Settings file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// The URL (or root-relative path) to render.
    url: String,

    /// Extra request header, `Name: value`. Repeatable.
    #[arg(long = "header", value_name = "H:V")]
    headers: Vec<String>,

    /// Document root overriding the configured one.
    #[arg(long = "root-dir", value_name = "DIR")]
    root_dir: Option<PathBuf>,

    /// Skip the main stylesheet; pass `all` to skip per-block ones
    /// too.
    #[arg(long = "dont-apply-stylesheet", value_name = "SCOPE", num_args = 0..=1, default_missing_value = "main")]
    dont_apply_stylesheet: Option<String>,

    /// Fail remote (http block) calls instead of performing them.
    #[arg(long = "dont-use-remote-call")]
    dont_use_remote_call: bool,

    /// Print invocation timing to stderr (`text` or `xml`).
    #[arg(long, value_name = "FORMAT", num_args = 0..=1, default_missing_value = "text")]
    profile: Option<String>,

    /// Override the script's main stylesheet.
    #[arg(long, value_name = "PATH")]
    stylesheet: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("xscript-proc: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let profile = match cli.profile.as_deref() {
        None => None,
        Some("text") => Some(ProfileFormat::Text),
        Some("xml") => Some(ProfileFormat::Xml),
        Some(other) => return Err(format!("unknown value of profile argument: {other}")),
    };

    let mut settings = match &cli.config {
        Some(path) => ServerSettings::load(path).map_err(|e| e.to_string())?,
        None => ServerSettings::default(),
    };
    if let Some(root) = &cli.root_dir {
        settings.root_dir = root.clone();
    } else if !cli.url.starts_with('/') && !cli.url.contains("://") {
        // a relative URL renders against the working directory
        settings.root_dir =
            std::env::current_dir().map_err(|e| format!("cannot read working directory: {e}"))?;
    }

    let mut registry = Registry::new();
    let http = if cli.dont_use_remote_call {
        HttpExtension::new().with_connector(Arc::new(RefusingConnector))
    } else {
        HttpExtension::new()
    };
    registry
        .register(Arc::new(http))
        .map_err(|e| e.to_string())?;
    registry
        .register(Arc::new(MistExtension::new()))
        .map_err(|e| e.to_string())?;

    let cache = Arc::new(DocCache::new(settings.cache_size));
    let transformer = Arc::new(StylesheetCache::new(Arc::new(NullEngine)));
    let server = Server::new(settings, registry, Some(cache), Some(transformer));

    let request = build_request(&cli, &server)?;
    let data = RequestData::new(request);
    let response = data.response.clone();

    let started = Instant::now();
    let skip_main = cli.dont_apply_stylesheet.is_some();
    let skip_perblock = cli.dont_apply_stylesheet.as_deref() == Some("all");
    let stylesheet = cli.stylesheet.clone();
    server
        .handle_with(data, |ctx| {
            if skip_main {
                ctx.set_apply_main_stylesheet(false);
            }
            if skip_perblock {
                ctx.set_apply_perblock_stylesheet(false);
            }
            if let Some(stylesheet) = &stylesheet {
                ctx.set_main_stylesheet(stylesheet.display().to_string());
            }
        })
        .map_err(|e| e.to_string())?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    response.serialize(&mut out).map_err(|e| e.to_string())?;
    out.flush().map_err(|e| e.to_string())?;

    if let Some(format) = profile {
        report_profile(format, started.elapsed());
    }
    Ok(())
}

fn build_request(cli: &Cli, server: &Server) -> Result<Request, String> {
    let (path, query) = match cli.url.split_once("://") {
        Some((_, rest)) => {
            let path = rest.find('/').map(|pos| &rest[pos..]).unwrap_or("/");
            split_query(path)
        }
        None => split_query(&cli.url),
    };

    let script_name = if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    };
    let root = server.settings().root_dir.display().to_string();
    let filename = format!("{root}{script_name}");

    let mut lines = vec![
        "REQUEST_METHOD=GET".to_owned(),
        format!("QUERY_STRING={query}"),
        format!("SCRIPT_NAME={script_name}"),
        format!("SCRIPT_FILENAME={filename}"),
        format!("DOCUMENT_ROOT={root}"),
    ];
    for header in &cli.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("malformed header argument: {header}"))?;
        let name = name.trim().to_uppercase().replace('-', "_");
        lines.push(format!("HTTP_{}={}", name, value.trim_start()));
    }

    let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    Request::from_env_lines(&line_refs, Vec::new(), server.encoder()).map_err(|e| e.to_string())
}

fn split_query(path: &str) -> (&str, &str) {
    match path.split_once('?') {
        Some((path, query)) => (path, query),
        None => (path, ""),
    }
}

#[derive(Debug, Clone, Copy)]
enum ProfileFormat {
    Text,
    Xml,
}

fn report_profile(format: ProfileFormat, elapsed: Duration) {
    match format {
        ProfileFormat::Text => eprintln!("total: {} ms", elapsed.as_millis()),
        ProfileFormat::Xml => eprintln!(
            "<profile><total unit=\"ms\">{}</total></profile>",
            elapsed.as_millis()
        ),
    }
}

/// The connector installed by `--dont-use-remote-call`: every exchange
/// fails, so remote blocks degrade to their error documents.
struct RefusingConnector;

impl xscript_http_block::Connector for RefusingConnector {
    fn connect(
        &self,
        _url: &xscript_http_block::Url,
        _timeout: Duration,
    ) -> std::io::Result<Box<dyn xscript_http_block::Transport>> {
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "remote calls are disabled",
        ))
    }
}
