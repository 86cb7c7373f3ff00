//! The request/response/state bundle a context is built around.

use crate::State;
use std::sync::Arc;
use xscript_http::{Request, Response};

/// The per-request collaborators handed to [`Context::new`](crate::Context::new).
#[derive(Debug, Clone)]
pub struct RequestData {
    /// The parsed inbound request.
    pub request: Arc<Request>,
    /// The response under construction.
    pub response: Arc<Response>,
    /// The request-scoped state map.
    pub state: Arc<State>,
}

impl RequestData {
    /// Bundle a request with a fresh response and state.
    pub fn new(request: Request) -> Self {
        Self {
            request: Arc::new(request),
            response: Arc::new(Response::new()),
            state: Arc::new(State::new()),
        }
    }

    /// Bundle existing parts.
    pub fn from_parts(request: Arc<Request>, response: Arc<Response>, state: Arc<State>) -> Self {
        Self {
            request,
            response,
            state,
        }
    }
}
