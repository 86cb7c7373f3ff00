//! Block parameters.
//!
//! The original implementation models every parameter flavor as its own
//! class; here they are one struct dispatching on [`ParamKind`], which
//! keeps the closed set visible in one place and the registry for
//! plugin parameters unnecessary.

use crate::protocol::PROTOCOL_ARG_KEYS;
use crate::{protocol_arg, ArgList, Context, InvokeError, ScriptError, Validator};
use xscript_xml::Node;

/// The parameter flavors the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// A literal string (the default).
    String,
    /// A literal boolean.
    Boolean,
    /// A literal i32.
    Long,
    /// A literal u32.
    ULong,
    /// A literal i64.
    LongLong,
    /// A literal u64.
    ULongLong,
    /// A literal f64.
    Double,
    /// The first inbound query/body argument with the given name.
    QueryArg,
    /// Like [`ParamKind::QueryArg`] but multi-capable for outbound
    /// query params.
    RequestArg,
    /// A State entry.
    StateArg,
    /// An inbound cookie.
    Cookie,
    /// An inbound header.
    Header,
    /// A vhost argument (`XSCRIPT_*` process environment).
    VHostArg,
    /// A protocol property of the inbound request.
    ProtocolArg,
    /// The raw request body.
    RequestBody,
    /// The whole state bag; only blocks that accept objects may use it.
    StateBag,
    /// The request object; only blocks that accept objects may use it.
    Request,
    /// The request-data bundle; only blocks that accept objects may
    /// use it.
    RequestData,
}

impl ParamKind {
    fn parse(type_name: &str) -> Result<Self, ScriptError> {
        Ok(match type_name.to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "boolean" => Self::Boolean,
            "long" => Self::Long,
            "ulong" => Self::ULong,
            "longlong" => Self::LongLong,
            "ulonglong" => Self::ULongLong,
            "double" => Self::Double,
            "queryarg" => Self::QueryArg,
            "requestarg" => Self::RequestArg,
            "statearg" => Self::StateArg,
            "cookie" => Self::Cookie,
            "header" => Self::Header,
            "vhostarg" => Self::VHostArg,
            "protocolarg" => Self::ProtocolArg,
            "requestbody" => Self::RequestBody,
            "state" => Self::StateBag,
            "request" => Self::Request,
            "requestdata" => Self::RequestData,
            other => return Err(ScriptError::UnknownParamType(other.to_owned())),
        })
    }

    /// The canonical type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Long => "long",
            Self::ULong => "ulong",
            Self::LongLong => "longlong",
            Self::ULongLong => "ulonglong",
            Self::Double => "double",
            Self::QueryArg => "queryarg",
            Self::RequestArg => "requestarg",
            Self::StateArg => "statearg",
            Self::Cookie => "cookie",
            Self::Header => "header",
            Self::VHostArg => "vhostarg",
            Self::ProtocolArg => "protocolarg",
            Self::RequestBody => "requestbody",
            Self::StateBag => "state",
            Self::Request => "request",
            Self::RequestData => "requestdata",
        }
    }

    /// Whether the parameter value is known at parse time.
    pub fn constant(&self) -> bool {
        matches!(
            self,
            Self::String
                | Self::Boolean
                | Self::Long
                | Self::ULong
                | Self::LongLong
                | Self::ULongLong
                | Self::Double
        )
    }

    fn object_only(&self) -> bool {
        matches!(self, Self::StateBag | Self::Request | Self::RequestData)
    }
}

/// One parsed `<xscript:param>` (or header/query-param) element.
#[derive(Debug)]
pub struct Param {
    id: String,
    kind: ParamKind,
    value: String,
    default_value: Option<String>,
    as_hint: Option<String>,
    validator: Option<Validator>,
}

impl Param {
    /// Parse a parameter element. The default type is `string`.
    pub fn parse(node: &Node) -> Result<Self, ScriptError> {
        Self::parse_with_default_type(node, "string")
    }

    /// Parse a parameter element with an explicit fallback type.
    pub fn parse_with_default_type(
        node: &Node,
        default_type: &str,
    ) -> Result<Self, ScriptError> {
        let kind = ParamKind::parse(node.attr("type").unwrap_or(default_type))?;
        let value = node.text();
        if kind.constant() && kind != ParamKind::String {
            check_literal(kind, &value)?;
        }
        Ok(Self {
            id: node.attr("id").unwrap_or_default().to_owned(),
            kind,
            value,
            default_value: node.attr("default").map(str::to_owned),
            as_hint: node.attr("as").map(str::to_owned),
            validator: Validator::parse(node)?,
        })
    }

    /// The parameter id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The parameter kind.
    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    /// The raw value (text content of the element).
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The `as` conversion hint, if declared.
    pub fn as_hint(&self) -> Option<&str> {
        self.as_hint.as_deref()
    }

    /// The lookup key: the element value, or the id when empty.
    pub fn key(&self) -> &str {
        if self.value.is_empty() {
            &self.id
        } else {
            &self.value
        }
    }

    /// Evaluate to a string in the given context.
    pub fn as_string(&self, ctx: &Context) -> Result<String, InvokeError> {
        if self.kind.object_only() {
            return Err(InvokeError::critical(format!(
                "parameter type {} is disallowed here",
                self.kind.type_name()
            ))
            .with("param-id", self.id.clone()));
        }
        let value = match self.kind {
            ParamKind::String
            | ParamKind::Boolean
            | ParamKind::Long
            | ParamKind::ULong
            | ParamKind::LongLong
            | ParamKind::ULongLong
            | ParamKind::Double => self.value.clone(),
            ParamKind::QueryArg | ParamKind::RequestArg => ctx
                .request()
                .arg(self.key())
                .map(str::to_owned)
                .or_else(|| self.default_value.clone())
                .unwrap_or_default(),
            ParamKind::StateArg => {
                let default = self.default_value.clone().unwrap_or_default();
                ctx.state().as_string_or(self.key(), &default)
            }
            ParamKind::Cookie => ctx
                .request()
                .cookie(self.key())
                .map(str::to_owned)
                .or_else(|| self.default_value.clone())
                .unwrap_or_default(),
            ParamKind::Header => ctx
                .request()
                .header(self.key())
                .map(str::to_owned)
                .or_else(|| self.default_value.clone())
                .unwrap_or_default(),
            ParamKind::VHostArg => ctx.vhost_arg(self.key())?,
            ParamKind::ProtocolArg => protocol_arg(ctx.request(), self.key()),
            ParamKind::RequestBody => {
                String::from_utf8_lossy(ctx.request().body()).into_owned()
            }
            ParamKind::StateBag | ParamKind::Request | ParamKind::RequestData => unreachable!(),
        };
        if let Some(validator) = &self.validator {
            validator.check(ctx.state(), &self.id, &value)?;
        }
        Ok(value)
    }

    /// Evaluate and append to an argument list.
    pub fn add(&self, ctx: &Context, args: &mut ArgList) -> Result<(), InvokeError> {
        args.add(self.as_string(ctx)?);
        Ok(())
    }

    /// Validate a protocol-arg key at parse time.
    pub fn post_parse(&self) -> Result<(), ScriptError> {
        if self.kind == ParamKind::ProtocolArg && !PROTOCOL_ARG_KEYS.contains(&self.key()) {
            return Err(ScriptError::UnknownProtocolArg(self.key().to_owned()));
        }
        Ok(())
    }
}

fn check_literal(kind: ParamKind, value: &str) -> Result<(), ScriptError> {
    let ok = match kind {
        ParamKind::Boolean => matches!(value, "0" | "1")
            || value.eq_ignore_ascii_case("true")
            || value.eq_ignore_ascii_case("false"),
        ParamKind::Long => value.parse::<i32>().is_ok(),
        ParamKind::ULong => value.parse::<u32>().is_ok(),
        ParamKind::LongLong => value.parse::<i64>().is_ok(),
        ParamKind::ULongLong => value.parse::<u64>().is_ok(),
        ParamKind::Double => value.parse::<f64>().is_ok(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(ScriptError::BadParamValue {
            type_name: kind.type_name(),
            value: value.to_owned(),
        })
    }
}
