//! Outbound query parameters of http blocks.

use std::sync::Arc;
use xscript_core::{Context, InvokeError, Param, ParamKind, ScriptError};
use xscript_http::{urlencode, Encoder, Request};
use xscript_xml::Node;

/// One `<xscript:query-param>`: a parameter plus its encoding and
/// emptiness policy.
#[derive(Debug)]
pub struct QueryParamData {
    param: Param,
    urlencoding: bool,
    encoder: Option<Encoder>,
    allow_empty: bool,
    multi_request_arg: bool,
}

impl QueryParamData {
    /// Parse a query-param element.
    pub fn parse(node: &Node) -> Result<Self, ScriptError> {
        let param = Param::parse(node)?;
        if matches!(param.kind(), ParamKind::Request | ParamKind::RequestData) {
            return Err(ScriptError::BadParamId(format!(
                "query param {} disallowed in http block",
                param.kind().type_name()
            )));
        }
        let mut data = Self {
            multi_request_arg: param.kind() == ParamKind::RequestArg,
            param,
            urlencoding: true,
            encoder: None,
            allow_empty: false,
        };
        if let Some(value) = node.attr("allow-empty") {
            data.allow_empty = match value {
                v if v.eq_ignore_ascii_case("yes") => true,
                v if v.eq_ignore_ascii_case("no") => false,
                other => {
                    return Err(ScriptError::BadAttribute {
                        attribute: "allow-empty",
                        value: other.to_owned(),
                    })
                }
            };
        }
        if let Some(value) = node.attr("urlencode") {
            if value.eq_ignore_ascii_case("yes") || value.eq_ignore_ascii_case("utf-8") {
                data.urlencoding = true;
            } else if value.eq_ignore_ascii_case("no") {
                data.urlencoding = false;
            } else {
                data.encoder = Some(Encoder::new(value).ok_or(ScriptError::BadAttribute {
                    attribute: "urlencode",
                    value: value.to_owned(),
                })?);
                data.urlencoding = true;
            }
        }
        Ok(data)
    }

    /// The wrapped parameter.
    pub fn param(&self) -> &Param {
        &self.param
    }

    /// Whether the inbound request carries files under this param's
    /// key.
    pub fn has_files(&self, request: &Request) -> bool {
        self.multi_request_arg && request.files(self.param.key()).is_some()
    }

    /// Evaluate to the encoded query-string fragment value.
    ///
    /// Multi request-args expand to `v1&id=v2&id=v3...`; the leading
    /// `id=` is supplied by [`QueryParamData::query_string_value`].
    pub fn as_string(&self, ctx: &Arc<Context>, multipart: bool) -> Result<String, InvokeError> {
        let mut values: Vec<String> = if self.multi_request_arg {
            ctx.request()
                .args_of(self.param.key())
                .into_iter()
                .map(str::to_owned)
                .collect()
        } else {
            let value = self.param.as_string(ctx)?;
            if value.is_empty() {
                return Ok(String::new());
            }
            vec![value]
        };
        if values.is_empty() {
            return Ok(String::new());
        }

        for value in &mut values {
            if let Some(encoder) = &self.encoder {
                let encoded = encoder.encode_to_legacy(value);
                *value = if self.urlencoding && !multipart {
                    urlencode(&encoded)
                } else {
                    String::from_utf8_lossy(&encoded).into_owned()
                };
            } else if self.urlencoding && !multipart {
                *value = urlencode(value.as_bytes());
            }
        }

        let mut result = values.remove(0);
        for value in values {
            result.push('&');
            result.push_str(self.param.id());
            result.push('=');
            result.push_str(&value);
        }
        Ok(result)
    }

    /// The `id=value` query-string form of the evaluated value at
    /// `index`; an empty value yields the bare id when `allow-empty`
    /// is set and nothing otherwise.
    pub fn query_string_value(&self, evaluated: &str) -> String {
        if evaluated.is_empty() {
            if self.allow_empty {
                return self.param.id().to_owned();
            }
            return String::new();
        }
        format!("{}={}", self.param.id(), evaluated)
    }

    /// The multipart form of this parameter: one part per value, plus
    /// one part per uploaded file for multi request-args.
    pub fn multipart_value(
        &self,
        evaluated: &str,
        boundary: &str,
        request: &Request,
    ) -> String {
        let id = self.param.id();
        if !self.multi_request_arg {
            if evaluated.is_empty() && !self.allow_empty {
                return String::new();
            }
            return multipart_string(id, evaluated, boundary);
        }

        let mut out = String::new();
        let values = request.args_of(self.param.key());
        if values.len() != 1 || self.allow_empty || !values[0].is_empty() {
            for value in &values {
                out.push_str(&multipart_string(id, value, boundary));
            }
        }
        if let Some(files) = request.files(self.param.key()) {
            for file in files {
                out.push_str(boundary);
                out.push_str("\r\nContent-Disposition: form-data; name=\"");
                out.push_str(id);
                out.push_str("\"; filename=\"");
                out.push_str(file.remote_name());
                out.push_str("\"\r\nContent-Type: ");
                out.push_str(file.content_type());
                out.push_str("\r\n\r\n");
                out.push_str(&String::from_utf8_lossy(file.data(request.body())));
                out.push_str("\r\n");
            }
        }
        out
    }

    /// One-line description for block info logs.
    pub fn info(&self) -> String {
        let mut out = String::new();
        out.push(' ');
        out.push_str(self.param.id());
        out.push(':');
        out.push_str(self.param.kind().type_name());
        if !self.param.value().is_empty() {
            out.push('(');
            out.push_str(self.param.value());
            out.push(')');
        }
        out
    }
}

fn multipart_string(id: &str, value: &str, boundary: &str) -> String {
    format!("{boundary}\r\nContent-Disposition: form-data; name=\"{id}\"\r\n\r\n{value}\r\n")
}
