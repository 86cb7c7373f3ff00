#![forbid(unsafe_code)]
#![deny(nonstandard_style, unused_qualifications)]

/*!
The xscript request-execution engine.

A [`Script`] is parsed once and shared read-only across requests. For
every request a [`Context`] is created around the script, the inbound
[`Request`](xscript_http::Request) and the outbound
[`Response`](xscript_http::Response); the [`Invoker`] then runs the
script's blocks (threaded ones on a [`WorkerPool`], sequential ones in
document order), splices their results into a copy of the script DOM,
applies stylesheets through a pluggable [`Transformer`] and serializes
the outcome into the response. Completed contexts are handed to the
[`CleanupManager`] so their destruction does not lengthen request tail
latency.
*/

/// The namespace URI that marks script elements as xscript blocks.
pub const XSCRIPT_NAMESPACE: &str = "http://www.yandex.ru/xscript";

mod typed_value;
pub use typed_value::TypedValue;

mod typed_map;
pub use typed_map::TypedMap;

mod state;
pub use state::State;

mod tag;
pub use tag::Tag;

mod error;
pub use error::{InvokeError, InvokeErrorKind, ScriptError, SkipCache};

mod args;
pub use args::ArgList;

mod protocol;
pub use protocol::protocol_arg;

mod policy;
pub use policy::Policy;

mod operation_mode;
pub use operation_mode::OperationMode;

mod validator;
pub use validator::Validator;

mod param;
pub use param::{Param, ParamKind};

mod guard;
pub use guard::Guard;

mod meta;
pub use meta::Meta;

mod block;
pub use block::{BlockCore, BlockExtension, BlockHandler, RemotePolicy, TaggedPolicy};

mod script;
pub use script::Script;

mod registry;
pub use registry::Registry;

mod invoke_context;
pub use invoke_context::InvokeContext;

mod request_data;
pub use request_data::RequestData;

mod context;
pub use context::{Context, ContextStopper};

mod pool;
pub use pool::WorkerPool;

mod cleanup;
pub use cleanup::CleanupManager;

mod invoker;
pub use invoker::{BlockResultCache, CacheLookup, CachedResult, Invoker, Transformer};
