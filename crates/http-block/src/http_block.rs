//! The concrete remote block.

use crate::{Connector, HttpHelper, QueryParamData, TcpConnector};
use std::sync::Arc;
use xscript_core::{
    ArgList, BlockCore, BlockExtension, BlockHandler, Context, InvokeContext, InvokeError,
    InvokeErrorKind, Param, Policy, ScriptError, SkipCache,
};
use xscript_http::{get_boundary, urlencode, BinaryWriter, KnownHeaderName};
use xscript_xml::{json_to_document, sanitize_html, Document, Node};

const STR_HEADERS: &str = "headers";
const STR_QUERY_PARAMS: &str = "query-params";
const XFF_HEADER_NAME: &str = "X-Forwarded-For";
const CONTENT_TYPE_HEADER_NAME: &str = "Content-Type";
const SKIP_CACHE_MESSAGE: &str = "can not cache post data with attached files";

/// The seven request shapes of the http extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET assembled from params.
    GetHttp,
    /// GET whose body is streamed to the client verbatim.
    GetBinaryPage,
    /// POST with form-encoded (or multipart) query params as body.
    Post,
    /// POST with the last param as raw body.
    PostHttp,
    /// POST forwarding the inbound request body.
    PostByRequest,
    /// GET forwarding the inbound arguments.
    GetByRequest,
    /// GET with the entire State appended as query.
    GetByState,
}

impl HttpMethod {
    fn parse(name: &str) -> Option<Self> {
        let name = name.strip_prefix("http.").unwrap_or(name);
        let normalized: String = name.chars().filter(|c| *c != '_').collect();
        let candidates = [
            ("gethttp", Self::GetHttp),
            ("getbinarypage", Self::GetBinaryPage),
            ("post", Self::Post),
            ("posthttp", Self::PostHttp),
            ("postbyrequest", Self::PostByRequest),
            ("getbyrequest", Self::GetByRequest),
            ("getbystate", Self::GetByState),
        ];
        candidates
            .into_iter()
            .find(|(token, _)| normalized.eq_ignore_ascii_case(token))
            .map(|(_, method)| method)
    }

}

/// The parse-time factory registered under the `http` element name.
pub struct HttpExtension {
    connector: Arc<dyn Connector>,
    policy: Arc<Policy>,
}

impl std::fmt::Debug for HttpExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExtension").finish()
    }
}

impl Default for HttpExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpExtension {
    /// An extension using the plain TCP connector and default policy.
    pub fn new() -> Self {
        Self {
            connector: Arc::new(TcpConnector),
            policy: Arc::new(Policy::new()),
        }
    }

    /// Replace the transport connector (tests inject scripted ones).
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Replace the policy.
    pub fn with_policy(mut self, policy: Arc<Policy>) -> Self {
        self.policy = policy;
        self
    }
}

impl BlockExtension for HttpExtension {
    fn name(&self) -> &'static str {
        "http"
    }

    fn create(
        &self,
        mut core: BlockCore,
        element: &Node,
        leftover: Vec<Node>,
    ) -> Result<Arc<dyn BlockHandler>, ScriptError> {
        let method = HttpMethod::parse(&core.method)
            .ok_or_else(|| ScriptError::UnknownMethod(core.method.clone()))?;

        let mut block = HttpBlock {
            connector: self.connector.clone(),
            policy: self.policy.clone(),
            method,
            proxy: false,
            xff: false,
            print_error: false,
            headers: Vec::new(),
            query_params: Vec::new(),
            core: BlockCore {
                // placeholder, replaced below once attributes are read
                index: 0,
                id: None,
                extension: String::new(),
                method: String::new(),
                params: Vec::new(),
                guards: Vec::new(),
                xslt_name: None,
                xpointer: None,
                threaded: false,
                timeout: None,
                tagged: Default::default(),
                remote: Default::default(),
                want_meta: false,
                dom_path: Vec::new(),
            },
        };

        for (name, value) in element.attrs() {
            match name.as_str() {
                "proxy" => block.proxy = value.eq_ignore_ascii_case("yes"),
                "x-forwarded-for" => block.xff = value.eq_ignore_ascii_case("yes"),
                "print-error-body" => block.print_error = value.eq_ignore_ascii_case("yes"),
                _ => {}
            }
        }

        for child in leftover {
            match child.local_name() {
                "header" => {
                    let param = Param::parse_with_default_type(&child, "string")?;
                    check_header_param_id(param.id())?;
                    block.headers.push(param);
                }
                "query-param" => {
                    let data = QueryParamData::parse(&child)?;
                    check_query_param_id(data.param().id())?;
                    block.query_params.push(data);
                }
                _ => {}
            }
        }

        if block.proxy && core.tagged.tagged {
            log::warn!("switching off tagging in proxy http block");
            core.tagged.tagged = false;
        }

        block.core = core;
        Ok(Arc::new(block))
    }
}

/// A parsed `<xscript:http>` block.
pub struct HttpBlock {
    core: BlockCore,
    connector: Arc<dyn Connector>,
    policy: Arc<Policy>,
    method: HttpMethod,
    proxy: bool,
    xff: bool,
    print_error: bool,
    headers: Vec<Param>,
    query_params: Vec<QueryParamData>,
}

impl std::fmt::Debug for HttpBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBlock")
            .field("method", &self.method)
            .field("proxy", &self.proxy)
            .field("headers", &self.headers.len())
            .field("query_params", &self.query_params.len())
            .finish()
    }
}

impl BlockHandler for HttpBlock {
    fn core(&self) -> &BlockCore {
        &self.core
    }

    fn create_arg_list(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<(), InvokeError> {
        let mut args = ArgList::new();
        for param in &self.core.params {
            param.add(ctx, &mut args)?;
        }
        invoke_ctx.set_args(args);

        if !self.headers.is_empty() {
            let mut header_args = ArgList::new();
            for param in &self.headers {
                let value = param.as_string(ctx).map_err(|error| {
                    wrap_param_error("header param", param.id(), error)
                })?;
                // CR/LF would split the outbound head
                let value = match value.find(['\r', '\n']) {
                    Some(pos) => value[..pos].to_owned(),
                    None => value,
                };
                header_args.add(value);
            }
            invoke_ctx.set_extra_args(STR_HEADERS, header_args);
        }

        if !self.query_params.is_empty() {
            if self.method == HttpMethod::Post {
                let multipart = self
                    .query_params
                    .iter()
                    .any(|data| data.has_files(ctx.request()));
                invoke_ctx.set_multipart(multipart);
            }
            let multipart = invoke_ctx.multipart();
            let mut query_args = ArgList::new();
            for data in &self.query_params {
                let value = data.as_string(ctx, multipart).map_err(|error| {
                    wrap_param_error("query param", data.param().id(), error)
                })?;
                query_args.add(value);
            }
            invoke_ctx.set_extra_args(STR_QUERY_PARAMS, query_args);
        }
        Ok(())
    }

    fn cache_key_extra(
        &self,
        _ctx: &Arc<Context>,
        invoke_ctx: &InvokeContext,
    ) -> Result<String, SkipCache> {
        let mut key = String::new();
        if !self.query_params.is_empty() {
            if invoke_ctx.multipart() {
                return Err(SkipCache(SKIP_CACHE_MESSAGE.to_owned()));
            }
            let query = self.query_string(invoke_ctx);
            if !query.is_empty() {
                key.push_str("|Query params:");
                key.push_str(&query);
            }
        }
        if !self.headers.is_empty() {
            if let Some(args) = invoke_ctx.extra_args(STR_HEADERS) {
                key.push_str("|Headers:");
                for (index, param) in self.headers.iter().enumerate() {
                    if index > 0 {
                        key.push(',');
                    }
                    key.push_str(param.id());
                    key.push('=');
                    key.push_str(args.at(index));
                }
            }
        }
        Ok(key)
    }

    fn invoke(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Document, InvokeError> {
        match self.method {
            HttpMethod::GetHttp => self.get_http(ctx, invoke_ctx),
            HttpMethod::GetBinaryPage => self.get_binary_page(ctx, invoke_ctx),
            HttpMethod::Post => self.post(ctx, invoke_ctx),
            HttpMethod::PostHttp => self.post_http(ctx, invoke_ctx),
            HttpMethod::PostByRequest => self.post_by_request(ctx, invoke_ctx),
            HttpMethod::GetByRequest => self.get_by_request(ctx, invoke_ctx),
            HttpMethod::GetByState => self.get_by_state(ctx, invoke_ctx),
        }
    }
}

impl HttpBlock {
    fn bad_arity(&self) -> InvokeError {
        InvokeError::critical(format!("bad arity in {}", self.core.method))
    }

    fn require_untagged(&self) -> Result<(), InvokeError> {
        if self.core.tagged.tagged {
            Err(InvokeError::critical("tag is not allowed"))
        } else {
            Ok(())
        }
    }

    fn get_url(&self, args: &ArgList, last: usize) -> Result<String, InvokeError> {
        let url = args.concat(0, last);
        if url.get(..7).is_some_and(|p| p.eq_ignore_ascii_case("file://")) {
            return Err(InvokeError::new("File scheme is not allowed").with("url", url));
        }
        Ok(url)
    }

    fn timeout_ms(&self, ctx: &Arc<Context>, url: &str) -> Result<i64, InvokeError> {
        let remained = self.core.remained_ms(ctx);
        if remained > 0 {
            return Ok(remained);
        }
        Err(InvokeError::new("block is timed out")
            .with("url", url)
            .with("timeout", ctx.timeout().as_millis().to_string()))
    }

    fn query_string(&self, invoke_ctx: &InvokeContext) -> String {
        let Some(args) = invoke_ctx.extra_args(STR_QUERY_PARAMS) else {
            return String::new();
        };
        let mut out = String::new();
        for (data, value) in self.query_params.iter().zip(args.iter()) {
            let fragment = data.query_string_value(value);
            if fragment.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('&');
            }
            out.push_str(&fragment);
        }
        out
    }

    fn append_query(url: &mut String, query: &str) {
        if query.is_empty() {
            return;
        }
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(query);
    }

    fn create_post_data(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &InvokeContext,
    ) -> Result<(bool, Vec<u8>), InvokeError> {
        if !invoke_ctx.multipart() {
            return Ok((false, self.query_string(invoke_ctx).into_bytes()));
        }
        let boundary = get_boundary(ctx.request().content_type())
            .map_err(|e| InvokeError::new(e.to_string()))?;
        let args = invoke_ctx
            .extra_args(STR_QUERY_PARAMS)
            .cloned()
            .unwrap_or_default();
        let mut body = String::new();
        for (data, value) in self.query_params.iter().zip(args.iter()) {
            body.push_str(&data.multipart_value(value, &boundary, ctx.request()));
        }
        body.push_str(&boundary);
        body.push_str("--\r\n");
        Ok((true, body.into_bytes()))
    }

    fn append_request_headers(
        &self,
        helper: &mut HttpHelper,
        ctx: &Arc<Context>,
        invoke_ctx: &InvokeContext,
        allow_tag: bool,
        pass_ctype: bool,
    ) {
        let request = ctx.request();
        let ip_header = self.policy.real_ip_header_name();
        let mut headers: Vec<String> = Vec::new();
        let mut real_ip_present = false;
        let mut xff_present = false;
        let mut ctype_pos: Option<usize> = None;

        if self.proxy {
            for (name, values) in request.headers().iter() {
                let display = name.display_name();
                for value in values.iter() {
                    if self
                        .headers
                        .iter()
                        .any(|p| p.id().eq_ignore_ascii_case(&display))
                    {
                        log::debug!("proxy header skipped (override) {display}: {value}");
                    } else if self.policy.is_skipped_proxy_header(&display) {
                        log::debug!("proxy header skipped (policy) {display}: {value}");
                    } else if display.eq_ignore_ascii_case(XFF_HEADER_NAME) {
                        log::debug!("proxy XFF header skipped (recalculated)");
                    } else {
                        if !real_ip_present
                            && ip_header.is_some_and(|ip| display.eq_ignore_ascii_case(ip))
                        {
                            real_ip_present = true;
                        } else if pass_ctype
                            && display.eq_ignore_ascii_case(CONTENT_TYPE_HEADER_NAME)
                        {
                            ctype_pos = Some(headers.len());
                        }
                        headers.push(format!("{display}: {value}"));
                    }
                }
            }
        }

        if let Some(args) = invoke_ctx.extra_args(STR_HEADERS) {
            for (param, value) in self.headers.iter().zip(args.iter()) {
                let name = param.id();
                if !real_ip_present && ip_header.is_some_and(|ip| name.eq_ignore_ascii_case(ip)) {
                    real_ip_present = true;
                } else if !xff_present && name.eq_ignore_ascii_case(XFF_HEADER_NAME) {
                    xff_present = true;
                } else if pass_ctype && name.eq_ignore_ascii_case(CONTENT_TYPE_HEADER_NAME) {
                    if let Some(pos) = ctype_pos {
                        headers[pos] = format!("{name}: {value}");
                        continue;
                    }
                    ctype_pos = Some(headers.len());
                }
                headers.push(format!("{name}: {value}"));
            }
        }

        if pass_ctype && ctype_pos.is_none() && !request.content_type().is_empty() {
            headers.push(format!(
                "{CONTENT_TYPE_HEADER_NAME}: {}",
                request.content_type()
            ));
        }
        if !real_ip_present {
            if let Some(ip_header) = ip_header {
                headers.push(format!("{ip_header}: {}", request.real_ip()));
            }
        }
        if !xff_present && self.xff {
            headers.push(format!("{XFF_HEADER_NAME}: {}", request.x_forwarded_for()));
        }

        let modified_since = if allow_tag && invoke_ctx.tagged() {
            invoke_ctx.tag().last_modified
        } else {
            None
        };
        helper.append_headers(&headers, modified_since);
    }

    fn http_call(&self, helper: &mut HttpHelper) -> Result<(), InvokeError> {
        helper.perform(self.connector.as_ref())?;
        Ok(())
    }

    fn check_status(&self, helper: &HttpHelper) -> Result<(), InvokeError> {
        match helper.check_status() {
            Ok(()) => Ok(()),
            Err(mut error) => {
                if self.print_error && helper.has_content() && !helper.is_html() {
                    if let Some(body) = self.error_body(helper) {
                        error.attach_body(body);
                    }
                }
                Err(error)
            }
        }
    }

    fn error_body(&self, helper: &HttpHelper) -> Option<Node> {
        let text = helper.content_string();
        if helper.is_xml() {
            return Document::parse(&text).ok().and_then(Document::into_root);
        }
        if helper.is_json() {
            return json_to_document(&text).ok().and_then(Document::into_root);
        }
        if helper.is_text() && !text.is_empty() {
            return Some(Node::new("text").with_text(text));
        }
        None
    }

    fn create_tag_info(&self, helper: &HttpHelper, invoke_ctx: &mut InvokeContext) {
        invoke_ctx.reset_tag();
        if self.core.tagged.tagged {
            invoke_ctx.set_tag(helper.create_tag());
        }
    }

    fn create_meta(&self, helper: &HttpHelper, invoke_ctx: &mut InvokeContext) {
        if !self.core.want_meta {
            return;
        }
        let mut seen: Vec<&str> = Vec::new();
        let headers: Vec<(String, String)> = helper.headers().to_vec();
        for (name, _) in &headers {
            if seen.contains(&name.as_str()) {
                continue;
            }
            seen.push(name);
            let values = helper.header_values(name);
            let meta_name = format!("HTTP_{}", name.to_ascii_uppercase().replace('-', "_"));
            if values.len() == 1 {
                invoke_ctx.meta_mut().set_string(&meta_name, values[0]);
            } else {
                invoke_ctx
                    .meta_mut()
                    .set_array(&meta_name, values.iter().map(|v| v.to_string()).collect());
            }
        }
        invoke_ctx.meta_mut().set_string("URL", helper.url());
    }

    fn response_document(&self, helper: &HttpHelper) -> Result<Document, InvokeError> {
        let text = helper.content_string();
        if helper.is_xml() {
            return Document::parse(&text).map_err(|e| {
                InvokeError::new(format!("invalid xml: {e}")).with("url", helper.url())
            });
        }
        if helper.is_json() {
            return json_to_document(&text).map_err(|e| {
                InvokeError::new(format!("invalid json: {e}")).with("url", helper.url())
            });
        }
        if helper.is_html() {
            let cleaned = sanitize_html(&text);
            if cleaned.is_empty() {
                return Err(InvokeError::new("Empty sanitized text/html document")
                    .with("url", helper.url()));
            }
            return Document::parse(&cleaned).map_err(|e| {
                InvokeError::new(format!("Invalid sanitized text/html document: {e}"))
                    .with("url", helper.url())
            });
        }
        if helper.is_text() {
            let mut node = Node::new("text");
            if !text.is_empty() {
                node.push_text(text);
            }
            return Ok(Document::with_root(node));
        }
        Err(
            InvokeError::new(format!("format is not recognized: {}", helper.content_type()))
                .with("url", helper.url()),
        )
    }

    fn get_http(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Document, InvokeError> {
        let args = invoke_ctx.args().clone();
        if args.is_empty() {
            return Err(self.bad_arity());
        }
        let mut url = self.get_url(&args, args.len() - 1)?;
        Self::append_query(&mut url, &self.query_string(invoke_ctx));

        let mut helper = HttpHelper::new(&url, self.timeout_ms(ctx, &url)?)?;
        self.append_request_headers(&mut helper, ctx, invoke_ctx, true, false);
        self.http_call(&mut helper)?;
        self.check_status(&helper)?;
        self.create_tag_info(&helper, invoke_ctx);

        if invoke_ctx.have_cached_copy() && !invoke_ctx.tag().modified {
            return Ok(Document::empty());
        }
        self.create_meta(&helper, invoke_ctx);
        self.response_document(&helper)
    }

    fn get_binary_page(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Document, InvokeError> {
        let args = invoke_ctx.args().clone();
        if args.is_empty() {
            return Err(self.bad_arity());
        }
        self.require_untagged()?;
        let mut url = self.get_url(&args, args.len() - 1)?;
        Self::append_query(&mut url, &self.query_string(invoke_ctx));

        let mut helper = HttpHelper::new(&url, self.timeout_ms(ctx, &url)?)?;
        self.append_request_headers(&mut helper, ctx, invoke_ctx, false, false);
        self.http_call(&mut helper)?;

        let status = helper.status();
        if !(200..300).contains(&status) && status != 0 {
            return Err(InvokeError::retry("Incorrect http status")
                .with("url", url)
                .with("status", status.to_string()));
        }
        self.create_meta(&helper, invoke_ctx);

        let content_type = helper.content_type().to_owned();
        let response = ctx.response();
        if !content_type.is_empty() {
            response
                .set_header(KnownHeaderName::ContentType, content_type.clone())
                .map_err(|e| InvokeError::new(e.to_string()))?;
        }
        response
            .detach(Box::new(ContentWriter(helper.content().to_vec())))
            .map_err(|e| InvokeError::new(e.to_string()))?;

        let mut node = Node::new("success").with_attr("url", url);
        if !content_type.is_empty() {
            node.set_attr("content-type", content_type);
        }
        node.push_text("1");
        Ok(Document::with_root(node))
    }

    fn post(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Document, InvokeError> {
        let args = invoke_ctx.args().clone();
        if args.is_empty() {
            return Err(self.bad_arity());
        }
        let url = self.get_url(&args, args.len() - 1)?;
        let (multipart, body) = self.create_post_data(ctx, invoke_ctx)?;

        let mut helper = HttpHelper::new(&url, self.timeout_ms(ctx, &url)?)?;
        self.append_request_headers(&mut helper, ctx, invoke_ctx, !multipart, multipart);
        helper.post_data(body);
        self.http_call(&mut helper)?;
        self.check_status(&helper)?;
        self.create_tag_info(&helper, invoke_ctx);

        if invoke_ctx.have_cached_copy() && !invoke_ctx.tag().modified {
            return Ok(Document::empty());
        }
        self.create_meta(&helper, invoke_ctx);
        self.response_document(&helper)
    }

    fn post_http(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Document, InvokeError> {
        let args = invoke_ctx.args().clone();
        if args.is_empty() {
            return Err(self.bad_arity());
        }
        let query = self.query_string(invoke_ctx);
        let (mut url, body) = if args.len() == 1 {
            (self.get_url(&args, 0)?, query.clone().into_bytes())
        } else {
            (
                self.get_url(&args, args.len() - 2)?,
                args.at(args.len() - 1).as_bytes().to_vec(),
            )
        };
        if args.len() > 1 {
            Self::append_query(&mut url, &query);
        }

        let mut helper = HttpHelper::new(&url, self.timeout_ms(ctx, &url)?)?;
        self.append_request_headers(&mut helper, ctx, invoke_ctx, true, false);
        helper.post_data(body);
        self.http_call(&mut helper)?;
        self.check_status(&helper)?;
        self.create_tag_info(&helper, invoke_ctx);

        if invoke_ctx.have_cached_copy() && !invoke_ctx.tag().modified {
            return Ok(Document::empty());
        }
        self.create_meta(&helper, invoke_ctx);
        self.response_document(&helper)
    }

    fn post_by_request(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Document, InvokeError> {
        let args = invoke_ctx.args().clone();
        if args.is_empty() {
            return Err(self.bad_arity());
        }
        self.require_untagged()?;
        let mut url = self.get_url(&args, args.len() - 1)?;

        let request = ctx.request();
        let method = request.method();
        let is_post =
            method.eq_ignore_ascii_case("POST") || method.eq_ignore_ascii_case("PUT");
        if is_post {
            Self::append_query(&mut url, request.query_string());
        }
        Self::append_query(&mut url, &self.query_string(invoke_ctx));

        let mut helper = HttpHelper::new(&url, self.timeout_ms(ctx, &url)?)?;
        self.append_request_headers(&mut helper, ctx, invoke_ctx, false, is_post);
        if is_post {
            helper.post_data(request.body().to_vec());
        } else {
            helper.post_data(request.query_string().as_bytes().to_vec());
        }
        self.http_call(&mut helper)?;
        self.check_status(&helper)?;
        self.create_meta(&helper, invoke_ctx);
        self.response_document(&helper)
    }

    fn get_by_request(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Document, InvokeError> {
        let args = invoke_ctx.args().clone();
        if args.is_empty() {
            return Err(self.bad_arity());
        }
        self.require_untagged()?;
        let mut url = self.get_url(&args, args.len() - 1)?;

        let request = ctx.request();
        let method = request.method();
        if method.eq_ignore_ascii_case("POST") || method.eq_ignore_ascii_case("PUT") {
            for (name, value) in request.args() {
                Self::append_query(
                    &mut url,
                    &format!("{name}={}", urlencode(value.as_bytes())),
                );
            }
        } else {
            Self::append_query(&mut url, request.query_string());
        }
        Self::append_query(&mut url, &self.query_string(invoke_ctx));

        let mut helper = HttpHelper::new(&url, self.timeout_ms(ctx, &url)?)?;
        self.append_request_headers(&mut helper, ctx, invoke_ctx, false, false);
        self.http_call(&mut helper)?;
        self.check_status(&helper)?;
        self.create_meta(&helper, invoke_ctx);
        self.response_document(&helper)
    }

    fn get_by_state(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Document, InvokeError> {
        let args = invoke_ctx.args().clone();
        if args.is_empty() {
            return Err(self.bad_arity());
        }
        self.require_untagged()?;
        let mut url = self.get_url(&args, args.len() - 1)?;
        Self::append_query(&mut url, &self.query_string(invoke_ctx));

        for (name, value) in ctx.state().values() {
            Self::append_query(&mut url, &format!("{name}={}", value.as_string()));
        }

        let mut helper = HttpHelper::new(&url, self.timeout_ms(ctx, &url)?)?;
        self.append_request_headers(&mut helper, ctx, invoke_ctx, false, false);
        self.http_call(&mut helper)?;
        self.check_status(&helper)?;
        self.create_meta(&helper, invoke_ctx);
        self.response_document(&helper)
    }
}

struct ContentWriter(Vec<u8>);

impl BinaryWriter for ContentWriter {
    fn size(&self) -> usize {
        self.0.len()
    }

    fn write_body(&self, out: &mut dyn std::io::Write) -> std::io::Result<()> {
        out.write_all(&self.0)
    }
}

fn wrap_param_error(repr: &str, id: &str, error: InvokeError) -> InvokeError {
    let wrapped = match error.kind() {
        InvokeErrorKind::Critical => {
            InvokeError::critical(format!("{repr} error: {}", error.message()))
        }
        _ => InvokeError::new(format!("{repr} error: {}", error.message())),
    };
    wrapped.with("param-id", id)
}

fn check_header_param_id(id: &str) -> Result<(), ScriptError> {
    if id.is_empty() {
        return Err(ScriptError::BadParamId("header param without id".into()));
    }
    if id.len() > 128 {
        return Err(ScriptError::BadParamId(format!(
            "header param with too big size id: {id}"
        )));
    }
    let mut chars = id.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(ScriptError::BadParamId(format!(
            "header param with incorrect first character in id: {id}"
        )));
    }
    if let Some(pos) = id.chars().position(|c| c != '-' && !c.is_ascii_alphanumeric()) {
        return Err(ScriptError::BadParamId(format!(
            "header param with incorrect character at {} in id: {id}",
            pos + 1
        )));
    }
    Ok(())
}

fn check_query_param_id(id: &str) -> Result<(), ScriptError> {
    if id.is_empty() {
        return Err(ScriptError::BadParamId("query param without id".into()));
    }
    if id.len() > 128 {
        return Err(ScriptError::BadParamId(format!(
            "query param with too big size id: {id}"
        )));
    }
    if let Some(pos) = id
        .chars()
        .position(|c| c != '-' && c != '_' && !c.is_ascii_alphanumeric())
    {
        return Err(ScriptError::BadParamId(format!(
            "query param with incorrect character at {} in id: {id}",
            pos + 1
        )));
    }
    Ok(())
}
