//! The parse-time block model.
//!
//! The original implementation expresses block capabilities through an
//! inheritance lattice (Block / ThreadedBlock / TaggedBlock /
//! RemoteTaggedBlock); here they are one [`BlockCore`] carrying the
//! common attributes plus two policy sub-structs, and the per-extension
//! behavior lives behind [`BlockHandler`].

use crate::{
    ArgList, Context, Guard, InvokeError, InvokeErrorKind, Param, ScriptError, SkipCache,
};
use std::sync::Arc;
use std::time::Duration;
use xscript_xml::{Document, Node, Selector};

/// Default per-block timeout when neither the block nor the request
/// declares one.
pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Cache participation of a block result.
#[derive(Debug, Clone, Default)]
pub struct TaggedPolicy {
    /// Whether the block carries a cache tag (`tag="yes"`).
    pub tagged: bool,
    /// Lifetime from the `strategy:seconds` part of `cache-strategy`.
    pub cache_time: Option<Duration>,
    /// Participate in the in-process cache tier.
    pub local: bool,
    /// Participate in the distributed cache tier.
    pub distributed: bool,
    /// The page strategy name, when one was declared.
    pub strategy: Option<String>,
}

impl TaggedPolicy {
    /// Parse the `cache-strategy` attribute value: any of `local` and
    /// `distributed`, plus at most one `name:seconds` token.
    pub fn parse_strategy(&mut self, value: &str) -> Result<(), ScriptError> {
        let mut explicit_tier = false;
        for token in value.split_whitespace() {
            if token.eq_ignore_ascii_case("local") {
                if !explicit_tier {
                    explicit_tier = true;
                    self.local = false;
                    self.distributed = false;
                }
                self.local = true;
            } else if token.eq_ignore_ascii_case("distributed") {
                if !explicit_tier {
                    explicit_tier = true;
                    self.local = false;
                    self.distributed = false;
                }
                self.distributed = true;
            } else {
                let (name, seconds) =
                    token
                        .split_once(':')
                        .ok_or_else(|| ScriptError::BadAttribute {
                            attribute: "cache-strategy",
                            value: token.to_owned(),
                        })?;
                if self.strategy.is_some() {
                    return Err(ScriptError::BadAttribute {
                        attribute: "cache-strategy",
                        value: "only one cache strategy allowed".to_owned(),
                    });
                }
                let seconds: u64 =
                    seconds
                        .parse()
                        .map_err(|_| ScriptError::BadAttribute {
                            attribute: "cache-strategy",
                            value: token.to_owned(),
                        })?;
                self.strategy = Some(name.to_owned());
                self.cache_time = Some(Duration::from_secs(seconds));
            }
        }
        Ok(())
    }
}

/// Remote invocation policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemotePolicy {
    /// `remote-timeout` in milliseconds, when declared.
    pub remote_timeout: Option<Duration>,
    /// Additional attempts on retryable errors.
    pub retry_count: u32,
}

/// The attributes common to every block flavor.
#[derive(Debug)]
pub struct BlockCore {
    /// Position of the block in the script's block list.
    pub index: usize,
    /// The `id` attribute, when present.
    pub id: Option<String>,
    /// The extension (element local name: `http`, `mist`, ...).
    pub extension: String,
    /// The method name.
    pub method: String,
    /// Positional parameters in document order.
    pub params: Vec<Param>,
    /// Guards, all of which must pass for the block to run.
    pub guards: Vec<Guard>,
    /// Per-block stylesheet path.
    pub xslt_name: Option<String>,
    /// Splice coordinate applied to the block result.
    pub xpointer: Option<Selector>,
    /// The `threaded="yes"` attribute.
    pub threaded: bool,
    /// Per-block timeout.
    pub timeout: Option<Duration>,
    /// Cache participation.
    pub tagged: TaggedPolicy,
    /// Remote-call policy.
    pub remote: RemotePolicy,
    /// Whether a `<xscript:meta>` child requests the meta document.
    pub want_meta: bool,
    /// Element-index path of the placeholder inside the script DOM.
    pub dom_path: Vec<usize>,
}

impl BlockCore {
    /// Parse the common attributes and children of a block element.
    ///
    /// Children in the xscript namespace that the common model does not
    /// understand (e.g. `<xscript:header>`) are returned for the
    /// extension to consume.
    pub fn parse(
        element: &Node,
        index: usize,
        dom_path: Vec<usize>,
        is_xscript: &dyn Fn(&Node) -> bool,
    ) -> Result<(Self, Vec<Node>), ScriptError> {
        let mut core = Self {
            index,
            id: element.attr("id").map(str::to_owned),
            extension: element.local_name().to_owned(),
            method: element.attr("method").unwrap_or_default().to_owned(),
            params: Vec::new(),
            guards: Vec::new(),
            xslt_name: None,
            xpointer: None,
            threaded: false,
            timeout: None,
            tagged: TaggedPolicy::default(),
            remote: RemotePolicy::default(),
            want_meta: false,
            dom_path,
        };
        core.tagged.local = true;

        for (name, value) in element.attrs() {
            match name.as_str() {
                "threaded" => core.threaded = value.eq_ignore_ascii_case("yes"),
                "tag" => core.tagged.tagged = value.eq_ignore_ascii_case("yes"),
                "cache-strategy" => core.tagged.parse_strategy(value)?,
                "retry-count" => {
                    core.remote.retry_count =
                        value.parse().map_err(|_| ScriptError::BadAttribute {
                            attribute: "retry-count",
                            value: value.clone(),
                        })?
                }
                "remote-timeout" => {
                    let millis: u64 = value.parse().map_err(|_| ScriptError::BadAttribute {
                        attribute: "remote-timeout",
                        value: value.clone(),
                    })?;
                    core.remote.remote_timeout = Some(Duration::from_millis(millis));
                }
                "timeout" => {
                    let millis: u64 = value.parse().map_err(|_| ScriptError::BadAttribute {
                        attribute: "timeout",
                        value: value.clone(),
                    })?;
                    core.timeout = Some(Duration::from_millis(millis));
                }
                "xpointer" => {
                    core.xpointer = Some(Selector::parse(value)?);
                }
                _ => {}
            }
        }

        let mut leftover = Vec::new();
        for child in element.elements() {
            if !is_xscript(child) {
                continue;
            }
            match child.local_name() {
                "param" => {
                    let param = Param::parse(child)?;
                    param.post_parse()?;
                    core.params.push(param);
                }
                "guard" => core.guards.push(Guard::parse(child)?),
                "xslt" => core.xslt_name = Some(child.text()),
                "meta" => core.want_meta = true,
                _ => leftover.push(child.clone()),
            }
        }
        Ok((core, leftover))
    }

    /// The invocation timeout: `max(remote-timeout, timeout)`, or the
    /// engine default when neither is declared.
    pub fn invoke_timeout(&self) -> Duration {
        match (self.remote.remote_timeout, self.timeout) {
            (Some(remote), Some(own)) => remote.max(own),
            (Some(remote), None) => remote,
            (None, Some(own)) => own,
            (None, None) => DEFAULT_BLOCK_TIMEOUT,
        }
    }

    /// The remote-call budget: `remote-timeout`, falling back to the
    /// block's own `timeout` when unset.
    pub fn remote_timeout_or_own(&self) -> Duration {
        self.remote
            .remote_timeout
            .or(self.timeout)
            .unwrap_or(DEFAULT_BLOCK_TIMEOUT)
    }

    /// Remaining budget for this block inside `ctx`, in milliseconds:
    /// the request's remaining time capped by the remote-call budget.
    /// Non-positive when the block is already out of time.
    pub fn remained_ms(&self, ctx: &Context) -> i64 {
        let cap = self.remote_timeout_or_own().as_millis() as i64;
        cap.min(ctx.remained_ms())
    }
}

/// Parse-time factory for one block extension, registered under the
/// element local name.
pub trait BlockExtension: Send + Sync {
    /// The element local name this extension serves.
    fn name(&self) -> &'static str;

    /// Build the block handler for one element. `core` has the common
    /// attributes parsed; `element` gives access to extension-specific
    /// attributes and the children in `leftover`.
    fn create(
        &self,
        core: BlockCore,
        element: &Node,
        leftover: Vec<Node>,
    ) -> Result<Arc<dyn BlockHandler>, ScriptError>;
}

/// The run-time contract of a parsed block.
pub trait BlockHandler: Send + Sync {
    /// The common attributes.
    fn core(&self) -> &BlockCore;

    /// Perform the block-specific invocation, producing the result
    /// document.
    fn invoke(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut crate::InvokeContext,
    ) -> Result<Document, InvokeError>;

    /// Evaluate parameters into the invoke context. The default
    /// evaluates the positional parameters only.
    fn create_arg_list(
        &self,
        ctx: &Arc<Context>,
        invoke_ctx: &mut crate::InvokeContext,
    ) -> Result<(), InvokeError> {
        let mut args = ArgList::new();
        for param in &self.core().params {
            param.add(ctx, &mut args)?;
        }
        invoke_ctx.set_args(args);
        Ok(())
    }

    /// Extension-specific cache key material (selected headers, query
    /// params). May refuse caching outright.
    fn cache_key_extra(
        &self,
        _ctx: &Arc<Context>,
        _invoke_ctx: &crate::InvokeContext,
    ) -> Result<String, SkipCache> {
        Ok(String::new())
    }
}

/// Run a block through its retry loop: retryable errors consume
/// attempts, anything else propagates immediately. Cancellation is
/// re-checked before every attempt.
pub fn invoke_with_retries(
    handler: &dyn BlockHandler,
    ctx: &Arc<Context>,
    invoke_ctx: &mut crate::InvokeContext,
) -> Result<Document, InvokeError> {
    let retries = handler.core().remote.retry_count;
    for remaining in (0..=retries).rev() {
        if ctx.stopped() {
            return Err(InvokeError::skipped("block is stopped"));
        }
        match handler.invoke(ctx, invoke_ctx) {
            Err(err) if err.kind() == InvokeErrorKind::Retry && remaining > 0 => {
                log::error!("retrying block: {}", err.what_info());
                continue;
            }
            other => return other,
        }
    }
    unreachable!("retry loop always returns")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_attribute() {
        let mut policy = TaggedPolicy {
            local: true,
            ..TaggedPolicy::default()
        };
        policy.parse_strategy("distributed local names:300").unwrap();
        assert!(policy.local);
        assert!(policy.distributed);
        assert_eq!(policy.strategy.as_deref(), Some("names"));
        assert_eq!(policy.cache_time, Some(Duration::from_secs(300)));

        let mut policy = TaggedPolicy::default();
        assert!(policy.parse_strategy("names").is_err());
        assert!(policy.parse_strategy("names:abc").is_err());
    }

    fn core_with_timeouts(remote: Option<u64>, own: Option<u64>) -> BlockCore {
        let mut remote_policy = RemotePolicy::default();
        remote_policy.remote_timeout = remote.map(Duration::from_millis);
        BlockCore {
            index: 0,
            id: None,
            extension: "http".into(),
            method: "getHttp".into(),
            params: Vec::new(),
            guards: Vec::new(),
            xslt_name: None,
            xpointer: None,
            threaded: false,
            timeout: own.map(Duration::from_millis),
            tagged: TaggedPolicy::default(),
            remote: remote_policy,
            want_meta: false,
            dom_path: Vec::new(),
        }
    }

    #[test]
    fn invoke_timeout_takes_the_larger() {
        let core = core_with_timeouts(Some(500), Some(1500));
        assert_eq!(core.invoke_timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn remote_timeout_caps_the_remaining_budget() {
        // a declared remote-timeout bounds the remote call even when
        // the block's own timeout is larger
        let core = core_with_timeouts(Some(500), Some(1500));
        assert_eq!(core.remote_timeout_or_own(), Duration::from_millis(500));

        let core = core_with_timeouts(None, Some(1500));
        assert_eq!(core.remote_timeout_or_own(), Duration::from_millis(1500));

        let core = core_with_timeouts(None, None);
        assert_eq!(core.remote_timeout_or_own(), DEFAULT_BLOCK_TIMEOUT);
    }

    #[test]
    fn remained_ms_uses_the_remote_cap() {
        use crate::{Registry, RequestData, Script};
        use xscript_http::{Encoder, Request};

        let registry = Registry::new();
        let script = Script::parse(&registry, "<page/>", "page.xml").unwrap();
        let request =
            Request::from_env_lines(&["REQUEST_METHOD=GET"], Vec::new(), &Encoder::cp1251())
                .unwrap();
        let ctx = Context::with_timeout(
            script,
            RequestData::new(request),
            Duration::from_secs(30),
        );

        let core = core_with_timeouts(Some(500), Some(1500));
        let remained = core.remained_ms(&ctx);
        assert!(remained > 0 && remained <= 500, "remained {remained}");
    }
}
