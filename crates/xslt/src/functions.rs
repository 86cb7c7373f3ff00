//! The extension-function surface scripts call back into the engine
//! with.

use crate::{TransformContext, XsltError, XsltValue};
use hashbrown::HashMap;
use md5::{Digest, Md5};
use xscript_core::protocol_arg;
use xscript_http::{urldecode, urlencode};
use xscript_xml::{escape_text, sanitize_html, Child, Document, Node};

type FunctionImpl =
    Box<dyn Fn(&TransformContext, &[XsltValue]) -> Result<XsltValue, XsltError> + Send + Sync>;

/// Extension functions by name, in a single namespace.
#[derive(Default)]
pub struct XsltFunctionRegistry {
    functions: HashMap<&'static str, FunctionImpl>,
}

impl std::fmt::Debug for XsltFunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XsltFunctionRegistry")
            .field("functions", &self.functions.len())
            .finish()
    }
}

impl XsltFunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the engine's fixed function set.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtin_functions(&mut registry);
        registry
    }

    /// Register a function; later registrations replace earlier ones.
    pub fn register<F>(&mut self, name: &'static str, function: F)
    where
        F: Fn(&TransformContext, &[XsltValue]) -> Result<XsltValue, XsltError>
            + Send
            + Sync
            + 'static,
    {
        self.functions.insert(name, Box::new(function));
    }

    /// Whether a function is registered.
    pub fn has(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Call a function; unknown names are an error.
    pub fn call(
        &self,
        tc: &TransformContext,
        name: &str,
        args: &[XsltValue],
    ) -> Result<XsltValue, XsltError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| XsltError::Function(format!("unknown extension function: {name}")))?;
        function(tc, args)
    }
}

fn expect(
    function: &'static str,
    args: &[XsltValue],
    min: usize,
    max: usize,
) -> Result<(), XsltError> {
    if args.len() < min || args.len() > max {
        return Err(XsltError::Arity {
            function,
            expected: if min == max {
                min.to_string()
            } else {
                format!("{min}..{max}")
            },
            got: args.len(),
        });
    }
    Ok(())
}

fn js_quote(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '/' => out.push_str("\\/"),
            c => out.push(c),
        }
    }
    out
}

fn json_quote(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    out.push('"');
    for c in input.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn wbr(text: &str, limit: usize) -> Vec<Child> {
    let mut out = Vec::new();
    let mut run = String::new();
    let mut run_len = 0usize;
    for c in text.chars() {
        if c.is_whitespace() {
            run_len = 0;
        } else {
            run_len += 1;
            if run_len > limit {
                out.push(Child::Text(std::mem::take(&mut run)));
                out.push(Child::Element(Node::new("wbr")));
                run_len = 1;
            }
        }
        run.push(c);
    }
    if !run.is_empty() {
        out.push(Child::Text(run));
    }
    out
}

fn nl2br(text: &str) -> Vec<Child> {
    let mut out = Vec::new();
    for (index, piece) in text.split('\n').enumerate() {
        if index > 0 {
            out.push(Child::Element(Node::new("br")));
        }
        let piece = piece.strip_suffix('\r').unwrap_or(piece);
        if !piece.is_empty() {
            out.push(Child::Text(piece.to_owned()));
        }
    }
    out
}

fn concat_args(args: &[XsltValue]) -> String {
    args.iter().map(XsltValue::as_str).collect()
}

/// Install the engine's fixed builtin function set into `registry`.
pub fn register_builtin_functions(registry: &mut XsltFunctionRegistry) {
    // response mutation
    registry.register("http-header-out", |tc, args| {
        expect("http-header-out", args, 2, 2)?;
        tc.context()
            .response()
            .set_header(args[0].as_str().as_str(), args[1].as_str())
            .map_err(|e| XsltError::Function(e.to_string()))?;
        Ok(XsltValue::Empty)
    });
    registry.register("http-redirect", |tc, args| {
        expect("http-redirect", args, 1, 1)?;
        tc.context()
            .response()
            .redirect(&args[0].as_str())
            .map_err(|e| XsltError::Function(e.to_string()))?;
        Ok(XsltValue::Empty)
    });
    registry.register("set-http-status", |tc, args| {
        expect("set-http-status", args, 1, 1)?;
        let status = args[0]
            .as_str()
            .parse::<u16>()
            .map_err(|_| XsltError::Function("bad status".into()))?;
        tc.context()
            .response()
            .set_status(status)
            .map_err(|e| XsltError::Function(e.to_string()))?;
        Ok(XsltValue::Number(f64::from(status)))
    });
    // request/state readers
    registry.register("get-state-arg", |tc, args| {
        expect("get-state-arg", args, 1, 1)?;
        Ok(XsltValue::String(
            tc.context().state().as_string(&args[0].as_str()),
        ))
    });
    registry.register("set-state-string", |tc, args| {
        expect("set-state-string", args, 2, 2)?;
        let value = args[1].as_str();
        tc.context()
            .state()
            .set_string(&args[0].as_str(), value.clone());
        Ok(XsltValue::String(value))
    });
    registry.register("get-local-arg", |tc, args| {
        expect("get-local-arg", args, 1, 1)?;
        Ok(XsltValue::String(
            tc.local_arg(&args[0].as_str()).unwrap_or_default(),
        ))
    });
    registry.register("get-protocol-arg", |tc, args| {
        expect("get-protocol-arg", args, 1, 1)?;
        Ok(XsltValue::String(protocol_arg(
            tc.context().request(),
            &args[0].as_str(),
        )))
    });
    registry.register("get-query-arg", |tc, args| {
        expect("get-query-arg", args, 1, 1)?;
        Ok(XsltValue::String(
            tc.context()
                .request()
                .arg(&args[0].as_str())
                .unwrap_or_default()
                .to_owned(),
        ))
    });
    registry.register("get-vhost-arg", |tc, args| {
        expect("get-vhost-arg", args, 1, 1)?;
        tc.context()
            .vhost_arg(&args[0].as_str())
            .map(XsltValue::String)
            .map_err(|e| XsltError::Function(e.to_string()))
    });
    registry.register("get-header", |tc, args| {
        expect("get-header", args, 1, 1)?;
        Ok(XsltValue::String(
            tc.context()
                .request()
                .header(args[0].as_str().as_str())
                .unwrap_or_default()
                .to_owned(),
        ))
    });
    registry.register("get-cookie", |tc, args| {
        expect("get-cookie", args, 1, 1)?;
        Ok(XsltValue::String(
            tc.context()
                .request()
                .cookie(&args[0].as_str())
                .unwrap_or_default()
                .to_owned(),
        ))
    });

    // transforms
    registry.register("urlencode", |_tc, args| {
        expect("urlencode", args, 1, 2)?;
        // an optional leading charset argument is accepted and ignored:
        // output is always utf-8
        let value = args.last().map(XsltValue::as_str).unwrap_or_default();
        Ok(XsltValue::String(urlencode(value.as_bytes())))
    });
    registry.register("urldecode", |_tc, args| {
        expect("urldecode", args, 1, 2)?;
        let value = args.last().map(XsltValue::as_str).unwrap_or_default();
        let decoded =
            urldecode(value.as_bytes()).map_err(|e| XsltError::Function(e.to_string()))?;
        Ok(XsltValue::String(
            String::from_utf8_lossy(&decoded).into_owned(),
        ))
    });
    registry.register("sanitize", |_tc, args| {
        expect("sanitize", args, 1, 3)?;
        Ok(XsltValue::String(sanitize_html(&args[0].as_str())))
    });
    registry.register("xmlparse", |tc, args| {
        expect("xmlparse", args, 1, 1)?;
        let doc = Document::parse(&args[0].as_str())
            .map_err(|e| XsltError::Function(e.to_string()))?;
        let Some(root) = doc.into_root() else {
            return Ok(XsltValue::Empty);
        };
        tc.context().add_node(root.clone());
        Ok(XsltValue::element(root))
    });
    registry.register("esc", |_tc, args| {
        expect("esc", args, 1, 1)?;
        let escaped = escape_text(&args[0].as_str()).into_owned();
        Ok(XsltValue::String(js_quote(&escaped)))
    });
    registry.register("js-quote", |_tc, args| {
        expect("js-quote", args, 1, 1)?;
        Ok(XsltValue::String(js_quote(&args[0].as_str())))
    });
    registry.register("json-quote", |_tc, args| {
        expect("json-quote", args, 1, 1)?;
        Ok(XsltValue::String(json_quote(&args[0].as_str())))
    });
    registry.register("md5", |_tc, args| {
        expect("md5", args, 1, 1)?;
        let digest = Md5::digest(args[0].as_str().as_bytes());
        let mut hex = String::with_capacity(32);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        Ok(XsltValue::String(hex))
    });
    registry.register("wbr", |tc, args| {
        expect("wbr", args, 2, 2)?;
        let limit = args[1]
            .as_str()
            .parse::<usize>()
            .map_err(|_| XsltError::Function("bad wbr length".into()))?;
        if limit == 0 {
            return Err(XsltError::Function("bad wbr length".into()));
        }
        let children = wbr(&args[0].as_str(), limit);
        for child in &children {
            if let Child::Element(node) = child {
                tc.context().add_node(node.clone());
            }
        }
        Ok(XsltValue::NodeSet(children))
    });
    registry.register("nl2br", |tc, args| {
        expect("nl2br", args, 1, 1)?;
        let children = nl2br(&args[0].as_str());
        for child in &children {
            if let Child::Element(node) = child {
                tc.context().add_node(node.clone());
            }
        }
        Ok(XsltValue::NodeSet(children))
    });
    registry.register("xmlescape", |_tc, args| {
        expect("xmlescape", args, 1, 1)?;
        Ok(XsltValue::String(
            escape_text(&args[0].as_str()).into_owned(),
        ))
    });

    // logging
    registry.register("log-info", |tc, args| {
        log::info!("{}: {}", tc.context().script().name(), concat_args(args));
        Ok(XsltValue::Empty)
    });
    registry.register("log-warn", |tc, args| {
        log::warn!("{}: {}", tc.context().script().name(), concat_args(args));
        Ok(XsltValue::Empty)
    });
    registry.register("log-error", |tc, args| {
        log::error!("{}: {}", tc.context().script().name(), concat_args(args));
        Ok(XsltValue::Empty)
    });

    // control
    registry.register("remained-depth", |tc, args| {
        expect("remained-depth", args, 0, 0)?;
        Ok(XsltValue::Number(tc.remained_depth() as f64))
    });
    registry.register("if", |_tc, args| {
        expect("if", args, 2, 3)?;
        if args[0].as_bool() {
            Ok(args[1].clone())
        } else {
            Ok(args.get(2).cloned().unwrap_or(XsltValue::Empty))
        }
    });
    registry.register("libxml-version", |_tc, args| {
        expect("libxml-version", args, 0, 0)?;
        Ok(XsltValue::String(env!("CARGO_PKG_VERSION").to_owned()))
    });
    registry.register("libxslt-version", |_tc, args| {
        expect("libxslt-version", args, 0, 0)?;
        Ok(XsltValue::String(env!("CARGO_PKG_VERSION").to_owned()))
    });
    registry.register("libexslt-version", |_tc, args| {
        expect("libexslt-version", args, 0, 0)?;
        Ok(XsltValue::String(env!("CARGO_PKG_VERSION").to_owned()))
    });
}
