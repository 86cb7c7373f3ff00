//! The mist block methods.

use crate::PrefixNode;
use std::sync::Arc;
use xscript_core::{
    protocol_arg, BlockCore, BlockExtension, BlockHandler, Context, InvokeContext, InvokeError,
    ScriptError,
};
use xscript_http::{urldecode, urlencode, parse_query, Encoder};
use xscript_xml::{Document, Node};

/// The methods the mist extension serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MistMethod {
    SetStateString,
    SetStateLong,
    SetStateLongLong,
    SetStateDouble,
    SetStateRandom,
    SetStateUrlencode,
    SetStateUrldecode,
    SetStateByQuery,
    DropState,
    EchoQuery,
    EchoRequest,
    EchoHeaders,
    EchoCookies,
    EchoProtocol,
}

impl MistMethod {
    fn parse(name: &str) -> Option<Self> {
        let normalized: String = name.chars().filter(|c| *c != '_').collect();
        let candidates = [
            ("setstatestring", Self::SetStateString),
            ("setstatelong", Self::SetStateLong),
            ("setstatelonglong", Self::SetStateLongLong),
            ("setstatedouble", Self::SetStateDouble),
            ("setstaterandom", Self::SetStateRandom),
            ("setstateurlencode", Self::SetStateUrlencode),
            ("setstateurldecode", Self::SetStateUrldecode),
            ("setstatebyquery", Self::SetStateByQuery),
            ("dropstate", Self::DropState),
            ("echoquery", Self::EchoQuery),
            ("echorequest", Self::EchoRequest),
            ("echoheaders", Self::EchoHeaders),
            ("echocookies", Self::EchoCookies),
            ("echoprotocol", Self::EchoProtocol),
        ];
        candidates
            .into_iter()
            .find(|(token, _)| normalized.eq_ignore_ascii_case(token))
            .map(|(_, method)| method)
    }
}

/// The parse-time factory registered under the `mist` element name.
#[derive(Debug, Clone, Copy, Default)]
pub struct MistExtension;

impl MistExtension {
    /// A fresh extension instance.
    pub fn new() -> Self {
        Self
    }
}

impl BlockExtension for MistExtension {
    fn name(&self) -> &'static str {
        "mist"
    }

    fn create(
        &self,
        core: BlockCore,
        _element: &Node,
        _leftover: Vec<Node>,
    ) -> Result<Arc<dyn BlockHandler>, ScriptError> {
        let method = MistMethod::parse(&core.method)
            .ok_or_else(|| ScriptError::UnknownMethod(core.method.clone()))?;
        Ok(Arc::new(MistBlock { core, method }))
    }
}

/// A parsed `<xscript:mist>` block.
#[derive(Debug)]
pub struct MistBlock {
    core: BlockCore,
    method: MistMethod,
}

impl BlockHandler for MistBlock {
    fn core(&self) -> &BlockCore {
        &self.core
    }

    fn invoke(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Document, InvokeError> {
        log::debug!("mist.{} in {}", self.core.method, ctx.script().name());
        let node = match self.method {
            MistMethod::SetStateString => self.set_state_string(ctx, invoke_ctx)?,
            MistMethod::SetStateLong => self.set_state_long(ctx, invoke_ctx)?,
            MistMethod::SetStateLongLong => self.set_state_longlong(ctx, invoke_ctx)?,
            MistMethod::SetStateDouble => self.set_state_double(ctx, invoke_ctx)?,
            MistMethod::SetStateRandom => self.set_state_random(ctx, invoke_ctx)?,
            MistMethod::SetStateUrlencode => self.set_state_urlencode(ctx, invoke_ctx)?,
            MistMethod::SetStateUrldecode => self.set_state_urldecode(ctx, invoke_ctx)?,
            MistMethod::SetStateByQuery => self.set_state_by_query(ctx, invoke_ctx)?,
            MistMethod::DropState => self.drop_state(ctx, invoke_ctx)?,
            MistMethod::EchoQuery => self.echo_query(ctx, invoke_ctx)?,
            MistMethod::EchoRequest => self.echo_request(ctx, invoke_ctx)?,
            MistMethod::EchoHeaders => self.echo_headers(ctx, invoke_ctx)?,
            MistMethod::EchoCookies => self.echo_cookies(ctx, invoke_ctx)?,
            MistMethod::EchoProtocol => self.echo_protocol(ctx, invoke_ctx)?,
        };
        Ok(Document::with_root(node))
    }
}

impl MistBlock {
    fn arity(&self, invoke_ctx: &InvokeContext, expected: usize) -> Result<(), InvokeError> {
        if invoke_ctx.args().len() != expected {
            return Err(InvokeError::critical(format!(
                "{}: arity error",
                self.core.method
            )));
        }
        Ok(())
    }

    fn state_node(name: &str, kind: &str, value: &str) -> Node {
        Node::new("state")
            .with_attr("name", name)
            .with_attr("type", kind)
            .with_text(value)
    }

    fn set_state_string(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Node, InvokeError> {
        self.arity(invoke_ctx, 2)?;
        let name = invoke_ctx.args().at(0).to_owned();
        let value = invoke_ctx.args().at(1).to_owned();
        ctx.state().set_string(&name, value.clone());
        Ok(Self::state_node(&name, "String", &value))
    }

    fn set_state_long(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Node, InvokeError> {
        self.arity(invoke_ctx, 2)?;
        let name = invoke_ctx.args().at(0).to_owned();
        let raw = invoke_ctx.args().at(1);
        let value: i32 = raw
            .parse()
            .map_err(|_| InvokeError::new(format!("bad long value: {raw}")))?;
        ctx.state().set_long(&name, value);
        Ok(Self::state_node(&name, "Long", &value.to_string()))
    }

    fn set_state_longlong(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Node, InvokeError> {
        self.arity(invoke_ctx, 2)?;
        let name = invoke_ctx.args().at(0).to_owned();
        let raw = invoke_ctx.args().at(1);
        let value: i64 = raw
            .parse()
            .map_err(|_| InvokeError::new(format!("bad longlong value: {raw}")))?;
        ctx.state().set_longlong(&name, value);
        Ok(Self::state_node(&name, "LongLong", &value.to_string()))
    }

    fn set_state_double(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Node, InvokeError> {
        self.arity(invoke_ctx, 2)?;
        let name = invoke_ctx.args().at(0).to_owned();
        let raw = invoke_ctx.args().at(1);
        let value: f64 = raw
            .parse()
            .map_err(|_| InvokeError::new(format!("bad double value: {raw}")))?;
        ctx.state().set_double(&name, value);
        Ok(Self::state_node(&name, "Double", &value.to_string()))
    }

    fn set_state_random(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Node, InvokeError> {
        self.arity(invoke_ctx, 3)?;
        let name = invoke_ctx.args().at(0).to_owned();
        let low: i64 = invoke_ctx
            .args()
            .at(1)
            .parse()
            .map_err(|_| InvokeError::new("bad random lower bound"))?;
        let high: i64 = invoke_ctx
            .args()
            .at(2)
            .parse()
            .map_err(|_| InvokeError::new("bad random upper bound"))?;
        if low >= high {
            return Err(InvokeError::new("random range is empty"));
        }
        let value = fastrand::i64(low..high);
        ctx.state().set_longlong(&name, value);
        Ok(Self::state_node(&name, "LongLong", &value.to_string()))
    }

    fn set_state_urlencode(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Node, InvokeError> {
        self.arity(invoke_ctx, 2)?;
        let name = invoke_ctx.args().at(0).to_owned();
        let value = urlencode(invoke_ctx.args().at(1).as_bytes());
        ctx.state().set_string(&name, value.clone());
        Ok(Self::state_node(&name, "String", &value))
    }

    fn set_state_urldecode(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Node, InvokeError> {
        self.arity(invoke_ctx, 2)?;
        let name = invoke_ctx.args().at(0).to_owned();
        let decoded = urldecode(invoke_ctx.args().at(1).as_bytes())
            .map_err(|e| InvokeError::new(e.to_string()))?;
        let value = Encoder::cp1251().recover(&decoded);
        ctx.state().set_string(&name, value.clone());
        Ok(Self::state_node(&name, "String", &value))
    }

    fn set_state_by_query(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Node, InvokeError> {
        self.arity(invoke_ctx, 2)?;
        let prefix = invoke_ctx.args().at(0).to_owned();
        let query = invoke_ctx.args().at(1).to_owned();
        let args = parse_query(query.as_bytes(), &Encoder::cp1251())
            .map_err(|e| InvokeError::new(e.to_string()))?;
        let state = ctx.state_arc();
        let mut node = PrefixNode::new(&prefix, Some(state.as_ref()));
        for (name, value) in &args {
            node.set_parameter(name, value);
        }
        Ok(node.into_node())
    }

    fn drop_state(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Node, InvokeError> {
        if invoke_ctx.args().len() > 1 {
            return Err(InvokeError::critical(format!(
                "{}: arity error",
                self.core.method
            )));
        }
        let prefix = invoke_ctx.args().at(0).to_owned();
        if prefix.is_empty() {
            ctx.state().clear();
        } else {
            ctx.state().erase_prefix(&prefix);
        }
        Ok(Node::new("state")
            .with_attr("prefix", prefix)
            .with_text("dropped"))
    }

    fn echo_query(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Node, InvokeError> {
        let args = invoke_ctx.args();
        if args.is_empty() || args.len() > 2 {
            return Err(InvokeError::critical(format!(
                "{}: arity error",
                self.core.method
            )));
        }
        let prefix = args.at(0).to_owned();
        let mut node = PrefixNode::new(&prefix, None);
        if args.len() == 2 {
            // an explicit query string; scripts often pass entity-escaped
            // ampersands through
            let query = args.at(1).replace("&amp;", "&");
            let parsed = parse_query(query.as_bytes(), &Encoder::cp1251())
                .map_err(|e| InvokeError::new(e.to_string()))?;
            for (name, value) in &parsed {
                node.set_parameter(name, value);
            }
        } else {
            for name in ctx.request().arg_names() {
                let values = ctx.request().args_of(name);
                if values.len() == 1 {
                    node.set_parameter(name, values[0]);
                } else {
                    node.set_parameters(name, &values);
                }
            }
        }
        Ok(node.into_node())
    }

    fn echo_request(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Node, InvokeError> {
        self.arity(invoke_ctx, 1)?;
        let prefix = invoke_ctx.args().at(0).to_owned();
        let state = ctx.state_arc();
        let mut node = PrefixNode::new(&prefix, Some(state.as_ref()));
        for name in ctx.request().arg_names() {
            let values = ctx.request().args_of(name);
            if values.len() == 1 {
                node.set_parameter(name, values[0]);
            } else {
                node.set_parameters(name, &values);
            }
        }
        Ok(node.into_node())
    }

    fn echo_headers(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Node, InvokeError> {
        self.arity(invoke_ctx, 1)?;
        let prefix = invoke_ctx.args().at(0).to_owned();
        let mut node = PrefixNode::new(&prefix, None);
        for (name, values) in ctx.request().headers().iter() {
            let display = name.display_name();
            for value in values.iter() {
                node.set_parameter(&display, value);
            }
        }
        Ok(node.into_node())
    }

    fn echo_cookies(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Node, InvokeError> {
        self.arity(invoke_ctx, 1)?;
        let prefix = invoke_ctx.args().at(0).to_owned();
        let mut node = PrefixNode::new(&prefix, None);
        for (name, value) in ctx.request().cookies() {
            node.set_parameter(name, value);
        }
        Ok(node.into_node())
    }

    fn echo_protocol(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut InvokeContext,
    ) -> Result<Node, InvokeError> {
        self.arity(invoke_ctx, 1)?;
        let prefix = invoke_ctx.args().at(0).to_owned();
        let mut node = PrefixNode::new(&prefix, None);
        for key in [
            "path",
            "query",
            "uri",
            "host",
            "pathinfo",
            "realpath",
            "secure",
            "method",
            "http_user",
            "remote_ip",
            "content-length",
            "content-encoding",
            "content-type",
        ] {
            let value = protocol_arg(ctx.request(), key);
            if !value.is_empty() {
                node.set_parameter(key, &value);
            }
        }
        Ok(node.into_node())
    }
}
